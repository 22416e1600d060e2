//! # Data Repository Layer
//!
//! This module provides the [`OrdersRepository`] persistence boundary and
//! its PostgreSQL implementation. An in-memory implementation with the same
//! unique-key semantics lives in [`memory`].

use async_trait::async_trait;
use deadpool_postgres::{Pool, PoolError};
use model::{Order, OrderDraft, OrderKey, OrderQuery, OrderSort, UniqueField};
use thiserror::Error;
use tokio_postgres::error::SqlState;
use tokio_postgres::types::ToSql;
use tokio_postgres::Row;
use tracing::debug;

pub mod memory;

pub use memory::InMemoryOrdersRepository;

/// Unique constraint on `orders.order_id`.
pub const ORDER_ID_CONSTRAINT: &str = "uq_orders_order_id";
/// Unique constraint on `orders.order_number`.
pub const ORDER_NUMBER_CONSTRAINT: &str = "uq_orders_order_number";

const ORDER_COLUMNS: &str = "id, order_id, order_number, payment_description, street, town, \
    country, amount, currency, payment_due_date, created_at, updated_at";

/// # RepositoryError
///
/// Error types that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database-related errors, wrapping the underlying PostgreSQL error
    #[error("Database error: {0}")]
    Db(#[from] tokio_postgres::Error),
    /// Failed to obtain a connection from the pool.
    #[error("Pool error: {0}")]
    Pool(#[from] PoolError),
    /// The store rejected a write because a unique column already holds the value.
    #[error("Unique constraint violated on {0:?}")]
    UniqueViolation(UniqueField),
}

/// # OrdersRepository
///
/// Repository interface for the `orders` table.
///
/// Implementations must enforce uniqueness of `order_id` and `order_number`
/// themselves and report a violation as [`RepositoryError::UniqueViolation`].
#[async_trait]
pub trait OrdersRepository: Send + Sync {
    /// Insert a new order and return it with store-assigned fields.
    async fn insert(&self, draft: &OrderDraft) -> Result<Order, RepositoryError>;

    /// Count orders whose unique column equals the key value.
    async fn count(&self, key: &OrderKey) -> Result<i64, RepositoryError>;

    /// Run a filtered, sorted listing.
    async fn query(&self, query: &OrderQuery) -> Result<Vec<Order>, RepositoryError>;

    /// Distinct non-empty countries, ascending.
    async fn distinct_countries(&self) -> Result<Vec<String>, RepositoryError>;
}

/// PostgreSQL implementation of the OrdersRepository trait.
#[derive(Clone)]
pub struct PgOrdersRepository {
    pool: Pool,
}

impl PgOrdersRepository {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrdersRepository for PgOrdersRepository {
    async fn insert(&self, draft: &OrderDraft) -> Result<Order, RepositoryError> {
        let query = format!(
            r#"
            INSERT INTO orders (
                order_id, order_number, payment_description, street, town,
                country, amount, currency, payment_due_date
            ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9)
            RETURNING {ORDER_COLUMNS}
            "#
        );
        let client = self.pool.get().await?;
        let row = client
            .query_one(
                query.as_str(),
                &[
                    &draft.order_id,
                    &draft.order_number,
                    &draft.payment_description,
                    &draft.street,
                    &draft.town,
                    &draft.country,
                    &draft.amount,
                    &draft.currency,
                    &draft.payment_due_date,
                ],
            )
            .await
            .map_err(map_insert_error)?;
        Ok(row_to_order(&row))
    }

    async fn count(&self, key: &OrderKey) -> Result<i64, RepositoryError> {
        let query = match key.field() {
            UniqueField::OrderId => "SELECT COUNT(*) FROM orders WHERE order_id = $1",
            UniqueField::OrderNumber => "SELECT COUNT(*) FROM orders WHERE order_number = $1",
        };
        let client = self.pool.get().await?;
        let row = client.query_one(query, &[&key.value()]).await?;
        Ok(row.get(0))
    }

    async fn query(&self, query: &OrderQuery) -> Result<Vec<Order>, RepositoryError> {
        let (sql, params) = build_list_sql(query);
        debug!(sql = %sql, params = ?params, "Listing orders");
        let params: Vec<&(dyn ToSql + Sync)> =
            params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

        let client = self.pool.get().await?;
        let rows = client.query(sql.as_str(), &params).await?;
        Ok(rows.iter().map(row_to_order).collect())
    }

    async fn distinct_countries(&self) -> Result<Vec<String>, RepositoryError> {
        let query = r#"
            SELECT DISTINCT country FROM orders
            WHERE country IS NOT NULL AND country <> ''
            ORDER BY country COLLATE "C" ASC
        "#;
        let client = self.pool.get().await?;
        let rows = client.query(query, &[]).await?;
        Ok(rows.iter().map(|row| row.get("country")).collect())
    }
}

/// Builds the listing SQL and its positional parameters for `query`.
pub fn build_list_sql(query: &OrderQuery) -> (String, Vec<String>) {
    let mut sql = format!("SELECT {ORDER_COLUMNS} FROM orders");
    let mut params: Vec<String> = Vec::new();
    let mut conditions: Vec<String> = Vec::new();

    if let Some(desc) = &query.filter.payment_description {
        params.push(format!("%{}%", escape_like(desc)));
        conditions.push(format!(
            "LOWER(payment_description) LIKE LOWER(${})",
            params.len()
        ));
    }
    if let Some(country) = &query.filter.country {
        params.push(country.clone());
        conditions.push(format!("country = ${}", params.len()));
    }
    if !conditions.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&conditions.join(" AND "));
    }

    match &query.sort {
        OrderSort::PriorityCountryThenDueDate { country } => {
            params.push(country.clone());
            sql.push_str(&format!(
                " ORDER BY CASE WHEN country = ${} THEN 0 ELSE 1 END ASC, \
                 payment_due_date ASC NULLS LAST, id ASC",
                params.len()
            ));
        }
    }

    (sql, params)
}

/// Escapes LIKE wildcards so the value matches literally.
fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn map_insert_error(err: tokio_postgres::Error) -> RepositoryError {
    let violated = err
        .as_db_error()
        .filter(|db| *db.code() == SqlState::UNIQUE_VIOLATION)
        .and_then(|db| match db.constraint() {
            Some(ORDER_ID_CONSTRAINT) => Some(UniqueField::OrderId),
            Some(ORDER_NUMBER_CONSTRAINT) => Some(UniqueField::OrderNumber),
            _ => None,
        });
    match violated {
        Some(field) => RepositoryError::UniqueViolation(field),
        None => RepositoryError::Db(err),
    }
}

fn row_to_order(row: &Row) -> Order {
    Order {
        id: row.get("id"),
        order_id: row.get("order_id"),
        order_number: row.get("order_number"),
        payment_description: row.get("payment_description"),
        street: row.get("street"),
        town: row.get("town"),
        country: row.get("country"),
        amount: row.get("amount"),
        currency: row.get("currency"),
        payment_due_date: row.get("payment_due_date"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::OrderFilter;

    #[test]
    fn test_list_sql_without_filters() {
        let (sql, params) = build_list_sql(&OrderQuery::default());
        assert!(!sql.contains("WHERE"));
        assert!(sql.ends_with(
            "ORDER BY CASE WHEN country = $1 THEN 0 ELSE 1 END ASC, \
             payment_due_date ASC NULLS LAST, id ASC"
        ));
        assert_eq!(params, vec!["Estonia".to_string()]);
    }

    #[test]
    fn test_list_sql_with_both_filters() {
        let query = OrderQuery {
            filter: OrderFilter {
                payment_description: Some("test".into()),
                country: Some("Estonia".into()),
            },
            ..OrderQuery::default()
        };
        let (sql, params) = build_list_sql(&query);
        assert!(sql.contains(
            "WHERE LOWER(payment_description) LIKE LOWER($1) AND country = $2"
        ));
        assert!(sql.contains("CASE WHEN country = $3"));
        assert_eq!(params, vec!["%test%", "Estonia", "Estonia"]);
    }

    #[test]
    fn test_list_sql_country_only() {
        let query = OrderQuery {
            filter: OrderFilter {
                payment_description: None,
                country: Some("Latvia".into()),
            },
            ..OrderQuery::default()
        };
        let (sql, params) = build_list_sql(&query);
        assert!(sql.contains("WHERE country = $1"));
        assert!(!sql.contains("LIKE"));
        assert_eq!(params, vec!["Latvia", "Estonia"]);
    }

    #[test]
    fn test_escape_like_wildcards() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
        assert_eq!(escape_like("plain"), "plain");
    }
}
