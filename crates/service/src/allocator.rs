//! Store-wide unique identifier allocation.

use idgen::{AllocationPolicy, IdGenerator};
use repository::OrdersRepository;
use tracing::{error, warn};

use crate::ServiceError;
use crate::oracle::UniquenessOracle;

/// Generates candidates and checks them against the store until one is free
/// or the attempt budget runs out.
pub struct IdAllocator<G> {
    generator: G,
    policy: AllocationPolicy,
}

impl<G> IdAllocator<G>
where
    G: IdGenerator,
{
    pub fn new(generator: G, policy: AllocationPolicy) -> Self {
        Self { generator, policy }
    }

    /// Returns the first candidate the oracle reports as unused.
    ///
    /// # Errors
    /// [`ServiceError::IdAllocationExhausted`] once `max_attempts` candidates
    /// have collided, or [`ServiceError::Db`] if an existence check fails.
    pub async fn allocate<R>(&self, oracle: &UniquenessOracle<'_, R>) -> Result<String, ServiceError>
    where
        R: OrdersRepository + ?Sized,
    {
        let max_attempts = self.policy.max_attempts;

        for attempt in 0..max_attempts {
            let candidate = self
                .generator
                .generate(self.policy.length_for_attempt(attempt));

            if !oracle.order_id_exists(&candidate).await? {
                return Ok(candidate);
            }

            warn!(
                "Order ID {} already exists, retry attempt {}/{}",
                candidate,
                attempt + 1,
                max_attempts
            );
        }

        error!("Failed to generate unique order ID after {} attempts", max_attempts);
        Err(ServiceError::IdAllocationExhausted { max_attempts })
    }
}
