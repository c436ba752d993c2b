//! Per-user, per-provider call budget.
//!
//! The ledger is append-only. Only successful calls inside the trailing
//! window count toward the budget, so failed attempts never consume it.

use crate::errors::AppError;
use crate::models::{CallLogEntry, ProviderKind, ProviderUsage};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

/// Successful calls allowed per user and provider inside one window.
pub const MAX_CALLS_PER_WINDOW: i64 = 10;

/// Length of the trailing window, in hours.
pub const WINDOW_HOURS: i64 = 24;

#[async_trait]
pub trait CallLedger: Send + Sync {
    async fn record(&self, entry: CallLogEntry) -> Result<(), AppError>;

    /// Counts successful calls made at or after `since`.
    async fn count_successful_since(
        &self,
        user_id: i64,
        provider: ProviderKind,
        since: DateTime<Utc>,
    ) -> Result<i64, AppError>;
}

#[derive(Clone)]
pub struct RateLimiter {
    ledger: Arc<dyn CallLedger>,
    window: Duration,
    max_calls: i64,
}

impl RateLimiter {
    pub fn new(ledger: Arc<dyn CallLedger>) -> Self {
        Self {
            ledger,
            window: Duration::hours(WINDOW_HOURS),
            max_calls: MAX_CALLS_PER_WINDOW,
        }
    }

    pub async fn is_limited(&self, user_id: i64, provider: ProviderKind) -> Result<bool, AppError> {
        Ok(self.calls_in_window(user_id, provider).await? >= self.max_calls)
    }

    pub async fn usage(&self, user_id: i64, provider: ProviderKind) -> Result<ProviderUsage, AppError> {
        let calls_today = self.calls_in_window(user_id, provider).await?;
        Ok(ProviderUsage {
            calls_today,
            remaining_today: (self.max_calls - calls_today).max(0),
            rate_limited: calls_today >= self.max_calls,
        })
    }

    async fn calls_in_window(&self, user_id: i64, provider: ProviderKind) -> Result<i64, AppError> {
        let since = Utc::now() - self.window;
        self.ledger
            .count_successful_since(user_id, provider, since)
            .await
    }
}
