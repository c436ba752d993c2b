use crate::errors::AppError;
use failsafe::backoff::{self, Exponential};
use failsafe::failure_policy::{self, ConsecutiveFailures};
use failsafe::{Config, StateMachine};
use std::future::Future;
use std::time::Duration;

/// Circuit breaker guarding the Postgres cache, ledger and credential tables.
pub type StoreCircuitBreaker = StateMachine<ConsecutiveFailures<Exponential>, ()>;

/// Creates a circuit breaker for store operations to prevent cascading failures.
///
/// # Configuration
///
/// - **Failure threshold**: 5 consecutive failures triggers OPEN state.
/// - **Backoff**: Exponential backoff from 10s to 60s before attempting recovery.
///
/// While OPEN every store call fails fast with [`AppError::StoreUnavailable`].
pub fn create_store_circuit_breaker() -> StoreCircuitBreaker {
    let backoff_strategy = backoff::exponential(
        Duration::from_secs(10), // Initial delay
        Duration::from_secs(60), // Maximum delay
    );

    let failure_policy = failure_policy::consecutive_failures(5, backoff_strategy);

    Config::new().failure_policy(failure_policy).build()
}

/// Runs a database future through the breaker.
pub async fn guarded<T, F>(breaker: &StoreCircuitBreaker, query: F) -> Result<T, AppError>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    match failsafe::futures::CircuitBreaker::call(breaker, query).await {
        Ok(value) => Ok(value),
        Err(failsafe::Error::Inner(e)) => Err(AppError::DatabaseError(e)),
        Err(failsafe::Error::Rejected) => Err(AppError::StoreUnavailable(
            "too many consecutive database failures".to_string(),
        )),
    }
}
