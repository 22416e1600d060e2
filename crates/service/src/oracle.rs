//! Read-only existence checks over the order population.

use model::OrderKey;
use repository::{OrdersRepository, RepositoryError};

/// Answers "is this value already taken?" for the two unique order columns.
pub struct UniquenessOracle<'a, R: ?Sized> {
    repo: &'a R,
}

impl<'a, R> UniquenessOracle<'a, R>
where
    R: OrdersRepository + ?Sized,
{
    pub fn new(repo: &'a R) -> Self {
        Self { repo }
    }

    pub async fn exists(&self, key: &OrderKey) -> Result<bool, RepositoryError> {
        Ok(self.repo.count(key).await? > 0)
    }

    pub async fn order_number_exists(&self, order_number: &str) -> Result<bool, RepositoryError> {
        self.exists(&OrderKey::OrderNumber(order_number.to_string()))
            .await
    }

    pub async fn order_id_exists(&self, order_id: &str) -> Result<bool, RepositoryError> {
        self.exists(&OrderKey::OrderId(order_id.to_string())).await
    }
}
