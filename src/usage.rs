//! Per-user search bookkeeping.
//!
//! Every search handled by the API leaves one row behind, including the
//! ones that were rejected. Totals are derived from those rows.

use crate::errors::AppError;
use crate::models::{SearchRecord, UsageTotals};
use async_trait::async_trait;

#[async_trait]
pub trait SearchLog: Send + Sync {
    async fn record_search(&self, record: SearchRecord) -> Result<(), AppError>;

    async fn usage_totals(&self, user_id: i64) -> Result<UsageTotals, AppError>;
}

/// Folds a user's search rows into lifetime counters.
pub fn totals_from<'a>(records: impl IntoIterator<Item = &'a SearchRecord>) -> UsageTotals {
    records
        .into_iter()
        .fold(UsageTotals::default(), |mut totals, record| {
            if record.success {
                totals.total_searches += 1;
                totals.total_leads += i64::from(record.lead_count);
            } else {
                totals.failed_searches += 1;
            }
            totals
        })
}
