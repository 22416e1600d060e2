//! In-memory [`OrdersRepository`] with thread-safe access.
//!
//! Mirrors the PostgreSQL table: surrogate ids from a counter, both unique
//! columns enforced on insert, and listing through the same [`OrderQuery`].

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use model::{Order, OrderDraft, OrderKey, OrderQuery, UniqueField};
use tokio::sync::RwLock;

use crate::{OrdersRepository, RepositoryError};

#[derive(Debug, Default)]
struct State {
    orders: Vec<Order>,
    last_id: i64,
}

/// Thread-safe in-memory orders table. Clones share the same data.
#[derive(Debug, Clone, Default)]
pub struct InMemoryOrdersRepository {
    inner: Arc<RwLock<State>>,
}

impl InMemoryOrdersRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every stored order in insertion order.
    pub async fn all(&self) -> Vec<Order> {
        self.inner.read().await.orders.clone()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.orders.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl OrdersRepository for InMemoryOrdersRepository {
    async fn insert(&self, draft: &OrderDraft) -> Result<Order, RepositoryError> {
        let mut state = self.inner.write().await;

        if state.orders.iter().any(|o| o.order_id == draft.order_id) {
            return Err(RepositoryError::UniqueViolation(UniqueField::OrderId));
        }
        if state
            .orders
            .iter()
            .any(|o| o.order_number == draft.order_number)
        {
            return Err(RepositoryError::UniqueViolation(UniqueField::OrderNumber));
        }

        state.last_id += 1;
        let order = draft.clone().into_order(state.last_id, Utc::now());
        state.orders.push(order.clone());
        Ok(order)
    }

    async fn count(&self, key: &OrderKey) -> Result<i64, RepositoryError> {
        let state = self.inner.read().await;
        Ok(state.orders.iter().filter(|o| key.matches(o)).count() as i64)
    }

    async fn query(&self, query: &OrderQuery) -> Result<Vec<Order>, RepositoryError> {
        let state = self.inner.read().await;
        Ok(query.apply(&state.orders))
    }

    async fn distinct_countries(&self) -> Result<Vec<String>, RepositoryError> {
        let state = self.inner.read().await;
        let countries: BTreeSet<&str> = state
            .orders
            .iter()
            .filter_map(|o| o.country.as_deref())
            .filter(|c| !c.is_empty())
            .collect();
        Ok(countries.into_iter().map(str::to_string).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(order_id: &str, order_number: &str, country: Option<&str>) -> OrderDraft {
        OrderDraft {
            order_id: order_id.to_string(),
            order_number: order_number.to_string(),
            payment_description: None,
            street: None,
            town: None,
            country: country.map(str::to_string),
            amount: None,
            currency: None,
            payment_due_date: None,
        }
    }

    #[tokio::test]
    async fn test_insert_assigns_surrogate_ids() {
        let repo = InMemoryOrdersRepository::new();
        let first = repo.insert(&draft("AAAA", "ON-1", None)).await.unwrap();
        let second = repo.insert(&draft("BBBB", "ON-2", None)).await.unwrap();
        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        assert_eq!(first.created_at, first.updated_at);
    }

    #[tokio::test]
    async fn test_insert_enforces_unique_columns() {
        let repo = InMemoryOrdersRepository::new();
        repo.insert(&draft("AAAA", "ON-1", None)).await.unwrap();

        let err = repo.insert(&draft("AAAA", "ON-2", None)).await.unwrap_err();
        assert!(matches!(err, RepositoryError::UniqueViolation(UniqueField::OrderId)));

        let err = repo.insert(&draft("BBBB", "ON-1", None)).await.unwrap_err();
        assert!(matches!(err, RepositoryError::UniqueViolation(UniqueField::OrderNumber)));

        assert_eq!(repo.len().await, 1);
    }

    #[tokio::test]
    async fn test_count_by_key() {
        let repo = InMemoryOrdersRepository::new();
        repo.insert(&draft("AAAA", "ON-1", None)).await.unwrap();

        assert_eq!(repo.count(&OrderKey::OrderId("AAAA".into())).await.unwrap(), 1);
        assert_eq!(repo.count(&OrderKey::OrderId("ON-1".into())).await.unwrap(), 0);
        assert_eq!(repo.count(&OrderKey::OrderNumber("ON-1".into())).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_distinct_countries_skips_null_and_empty() {
        let repo = InMemoryOrdersRepository::new();
        let countries = [Some("Estonia"), Some(""), None, Some("Latvia"), Some("Estonia")];
        for (i, country) in countries.into_iter().enumerate() {
            repo.insert(&draft(&format!("ID{i}"), &format!("ON-{i}"), country))
                .await
                .unwrap();
        }
        assert_eq!(
            repo.distinct_countries().await.unwrap(),
            vec!["Estonia".to_string(), "Latvia".to_string()]
        );
    }
}
