//! Business logic layer for order management.
//!
//! This module defines the [`OrderService`] trait and its async implementation [`OrderServiceImpl`].
//! The service owns the order creation workflow (business-key check, identifier
//! allocation, persistence) and the filtered listing and country facet queries.
//!
//! # Features
//! - Store-wide unique `order_id` allocation with an escalating-length retry policy.
//! - Friendly duplicate-key errors, backed by the store's own unique constraints.
//! - Repository abstraction so the same logic runs against PostgreSQL or memory.
//! - Well-typed error handling via [`ServiceError`].

use async_trait::async_trait;
use idgen::{AllocationPolicy, IdGenerator, SecureIdGenerator};
use model::{NewOrder, Order, OrderDraft, OrderFilter, OrderQuery, OrderSort, UniqueField};
use repository::{OrdersRepository, RepositoryError};
use rust_decimal::RoundingStrategy;
use thiserror::Error;
use tracing::{error, info, instrument, warn};

pub mod allocator;
pub mod oracle;

pub use allocator::IdAllocator;
pub use oracle::UniquenessOracle;

/// The main error type for all operations in [`OrderService`] and [`OrderServiceImpl`].
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The provided order is structurally invalid.
    #[error("Invalid order: {0}")]
    InvalidOrder(String),
    /// The client-supplied order number is already taken.
    #[error("Order number '{0}' already exists")]
    DuplicateOrderNumber(String),
    /// The allocated order ID was taken between the check and the insert.
    #[error("Order ID '{0}' already exists")]
    DuplicateOrderId(String),
    /// Every candidate within the attempt budget collided.
    #[error("Failed to generate unique order ID after {max_attempts} attempts")]
    IdAllocationExhausted { max_attempts: u32 },
    /// A repository (database) operation failed.
    #[error("Database error: {0}")]
    Db(#[from] RepositoryError),
}

/// Trait describing business operations for order management.
#[async_trait]
pub trait OrderService: Send + Sync {
    /// Creates an order with a freshly allocated, store-wide unique `order_id`.
    ///
    /// # Errors
    /// Returns [`ServiceError::InvalidOrder`] if `order_number` is missing,
    /// [`ServiceError::DuplicateOrderNumber`] if it is taken,
    /// [`ServiceError::IdAllocationExhausted`] if no free ID was found, and
    /// [`ServiceError::Db`] for store failures. Nothing is written on error.
    async fn create_order(&self, input: NewOrder) -> Result<Order, ServiceError>;

    /// Lists orders matching `filter`, priority country first, then by due date.
    async fn list_orders(&self, filter: OrderFilter) -> Result<Vec<Order>, ServiceError>;

    /// Distinct non-empty countries across all orders, ascending.
    async fn filter_countries(&self) -> Result<Vec<String>, ServiceError>;
}

/// Async implementation of [`OrderService`] using repository pattern.
pub struct OrderServiceImpl<R, G = SecureIdGenerator> {
    orders_repo: R,
    allocator: IdAllocator<G>,
}

impl<R> OrderServiceImpl<R, SecureIdGenerator>
where
    R: OrdersRepository,
{
    /// Service with the OS-backed generator and the default allocation policy.
    pub fn with_defaults(orders_repo: R) -> Self {
        Self::new(
            orders_repo,
            SecureIdGenerator::default(),
            AllocationPolicy::default(),
        )
    }
}

impl<R, G> OrderServiceImpl<R, G>
where
    R: OrdersRepository,
    G: IdGenerator,
{
    /// Constructs a new [`OrderServiceImpl`] from the provided dependencies.
    ///
    /// # Arguments
    /// * `orders_repo` - The repository for order data.
    /// * `generator` - Source of candidate order IDs.
    /// * `policy` - Base length and attempt budget for ID allocation.
    pub fn new(orders_repo: R, generator: G, policy: AllocationPolicy) -> Self {
        Self {
            orders_repo,
            allocator: IdAllocator::new(generator, policy),
        }
    }

    /// Validates the required fields and returns the order number.
    fn validate_order(&self, input: &NewOrder) -> Result<String, ServiceError> {
        match &input.order_number {
            Some(number) if !number.trim().is_empty() => Ok(number.clone()),
            Some(_) => Err(ServiceError::InvalidOrder("orderNumber is empty".into())),
            None => Err(ServiceError::InvalidOrder("orderNumber is required".into())),
        }
    }
}

#[async_trait]
impl<R, G> OrderService for OrderServiceImpl<R, G>
where
    R: OrdersRepository,
    G: IdGenerator,
{
    #[instrument(skip(self, input), fields(order_number = ?input.order_number))]
    async fn create_order(&self, input: NewOrder) -> Result<Order, ServiceError> {
        let order_number = self.validate_order(&input)?;
        let oracle = UniquenessOracle::new(&self.orders_repo);

        if oracle.order_number_exists(&order_number).await? {
            warn!("Order number '{}' already exists", order_number);
            return Err(ServiceError::DuplicateOrderNumber(order_number));
        }

        let order_id = self.allocator.allocate(&oracle).await?;

        let mut draft = OrderDraft::new(order_id.clone(), order_number.clone(), input);
        draft.amount = draft.amount.map(|amount| {
            let mut amount =
                amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
            amount.rescale(2);
            amount
        });

        // The pre-checks above are advisory; the store's unique constraints decide.
        match self.orders_repo.insert(&draft).await {
            Ok(order) => {
                info!("Created order with ID: {}", order.order_id);
                Ok(order)
            }
            Err(RepositoryError::UniqueViolation(UniqueField::OrderNumber)) => {
                warn!("Order number '{}' taken concurrently", order_number);
                Err(ServiceError::DuplicateOrderNumber(order_number))
            }
            Err(RepositoryError::UniqueViolation(UniqueField::OrderId)) => {
                error!("Order ID {} taken concurrently", order_id);
                Err(ServiceError::DuplicateOrderId(order_id))
            }
            Err(e) => {
                error!("Error creating order: {}", e);
                Err(e.into())
            }
        }
    }

    #[instrument(skip(self))]
    async fn list_orders(&self, filter: OrderFilter) -> Result<Vec<Order>, ServiceError> {
        let query = OrderQuery {
            filter: filter.normalized(),
            sort: OrderSort::default(),
        };
        Ok(self.orders_repo.query(&query).await?)
    }

    #[instrument(skip(self))]
    async fn filter_countries(&self) -> Result<Vec<String>, ServiceError> {
        Ok(self.orders_repo.distinct_countries().await?)
    }
}
