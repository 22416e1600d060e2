use std::cmp::Ordering;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Country whose orders are listed ahead of all others.
pub const PRIORITY_COUNTRY: &str = "Estonia";

/// Order — persisted order record.
///
/// `id`, `created_at` and `updated_at` are owned by the store; `order_id` is
/// assigned once by the allocator before the first insert.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: i64,
    pub order_id: String,
    pub order_number: String,
    pub payment_description: Option<String>,
    pub street: Option<String>,
    pub town: Option<String>,
    pub country: Option<String>,
    pub amount: Option<Decimal>,
    pub currency: Option<String>,
    pub payment_due_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// NewOrder — client payload for order creation.
///
/// Every field is optional on the wire; the service rejects a missing
/// `orderNumber` before touching the store.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NewOrder {
    #[serde(default)]
    pub order_number: Option<String>,
    #[serde(default)]
    pub payment_description: Option<String>,
    #[serde(default)]
    pub street: Option<String>,
    #[serde(default)]
    pub town: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub payment_due_date: Option<NaiveDate>,
}

/// OrderDraft — a validated order with its allocated identifier, ready to insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderDraft {
    pub order_id: String,
    pub order_number: String,
    pub payment_description: Option<String>,
    pub street: Option<String>,
    pub town: Option<String>,
    pub country: Option<String>,
    pub amount: Option<Decimal>,
    pub currency: Option<String>,
    pub payment_due_date: Option<NaiveDate>,
}

impl OrderDraft {
    /// Merges client input with the allocated `order_id`.
    pub fn new(order_id: String, order_number: String, input: NewOrder) -> Self {
        Self {
            order_id,
            order_number,
            payment_description: input.payment_description,
            street: input.street,
            town: input.town,
            country: input.country,
            amount: input.amount,
            currency: input.currency,
            payment_due_date: input.payment_due_date,
        }
    }

    /// Materialises the draft with store-assigned fields.
    pub fn into_order(self, id: i64, now: DateTime<Utc>) -> Order {
        Order {
            id,
            order_id: self.order_id,
            order_number: self.order_number,
            payment_description: self.payment_description,
            street: self.street,
            town: self.town,
            country: self.country,
            amount: self.amount,
            currency: self.currency,
            payment_due_date: self.payment_due_date,
            created_at: now,
            updated_at: now,
        }
    }
}

/// The two independently unique columns of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniqueField {
    OrderId,
    OrderNumber,
}

/// OrderKey — count predicate over one unique column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderKey {
    OrderId(String),
    OrderNumber(String),
}

impl OrderKey {
    pub fn field(&self) -> UniqueField {
        match self {
            OrderKey::OrderId(_) => UniqueField::OrderId,
            OrderKey::OrderNumber(_) => UniqueField::OrderNumber,
        }
    }

    pub fn value(&self) -> &str {
        match self {
            OrderKey::OrderId(v) | OrderKey::OrderNumber(v) => v,
        }
    }

    pub fn matches(&self, order: &Order) -> bool {
        match self {
            OrderKey::OrderId(v) => order.order_id == *v,
            OrderKey::OrderNumber(v) => order.order_number == *v,
        }
    }
}

/// OrderFilter — optional listing filters, as received in the query string.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OrderFilter {
    /// Case-insensitive substring of `paymentDescription`.
    #[serde(default)]
    pub payment_description: Option<String>,
    /// Exact, case-sensitive `country`.
    #[serde(default)]
    pub country: Option<String>,
}

impl OrderFilter {
    /// Drops empty-string values. Anything else is matched exactly as given.
    pub fn normalized(self) -> Self {
        fn clean(value: Option<String>) -> Option<String> {
            value.filter(|v| !v.is_empty())
        }
        Self {
            payment_description: clean(self.payment_description),
            country: clean(self.country),
        }
    }

    pub fn matches(&self, order: &Order) -> bool {
        if let Some(needle) = &self.payment_description {
            let needle = needle.to_lowercase();
            match &order.payment_description {
                Some(desc) if desc.to_lowercase().contains(&needle) => {}
                _ => return false,
            }
        }
        if let Some(country) = &self.country {
            if order.country.as_deref() != Some(country.as_str()) {
                return false;
            }
        }
        true
    }
}

/// OrderSort — ordering applied to every listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderSort {
    /// Orders from `country` first, then `payment_due_date` ascending with
    /// nulls last, then `id` ascending.
    PriorityCountryThenDueDate { country: String },
}

impl Default for OrderSort {
    fn default() -> Self {
        OrderSort::PriorityCountryThenDueDate {
            country: PRIORITY_COUNTRY.to_string(),
        }
    }
}

impl OrderSort {
    pub fn compare(&self, a: &Order, b: &Order) -> Ordering {
        match self {
            OrderSort::PriorityCountryThenDueDate { country } => {
                let rank = |o: &Order| u8::from(o.country.as_deref() != Some(country.as_str()));
                rank(a)
                    .cmp(&rank(b))
                    .then_with(|| match (a.payment_due_date, b.payment_due_date) {
                        (Some(x), Some(y)) => x.cmp(&y),
                        (Some(_), None) => Ordering::Less,
                        (None, Some(_)) => Ordering::Greater,
                        (None, None) => Ordering::Equal,
                    })
                    .then_with(|| a.id.cmp(&b.id))
            }
        }
    }
}

/// OrderQuery — predicate plus sort specification handed to a repository.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderQuery {
    pub filter: OrderFilter,
    pub sort: OrderSort,
}

impl OrderQuery {
    /// Applies the query to an in-memory population.
    pub fn apply<'a, I>(&self, orders: I) -> Vec<Order>
    where
        I: IntoIterator<Item = &'a Order>,
    {
        let mut matched: Vec<Order> = orders
            .into_iter()
            .filter(|o| self.filter.matches(o))
            .cloned()
            .collect();
        matched.sort_by(|a, b| self.sort.compare(a, b));
        matched
    }
}
