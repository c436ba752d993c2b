//! Process-local cache, call ledger and search log.
//!
//! Used when no database is configured and by the test-suite. Mirrors the
//! Postgres store: rows are only ever appended.

use crate::cache::{contacts_from_entry, new_cache_entry, LeadCache};
use crate::errors::AppError;
use crate::models::{CacheEntry, CallLogEntry, Contact, ProviderKind, SearchRecord, UsageTotals};
use crate::rate_limit::CallLedger;
use crate::usage::{totals_from, SearchLog};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Default)]
struct Tables {
    cache: Vec<CacheEntry>,
    calls: Vec<CallLogEntry>,
    searches: Vec<SearchRecord>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, AppError> {
        self.tables
            .lock()
            .map_err(|_| AppError::InternalError("memory store lock poisoned".to_string()))
    }

    /// Appends a pre-built cache entry, e.g. one that is already expired.
    pub fn insert_cache_entry(&self, entry: CacheEntry) -> Result<(), AppError> {
        self.lock()?.cache.push(entry);
        Ok(())
    }

    /// Snapshot of every ledger row, oldest first.
    pub fn call_log(&self) -> Vec<CallLogEntry> {
        self.lock().map(|t| t.calls.clone()).unwrap_or_default()
    }

    pub fn cache_entry_count(&self) -> usize {
        self.lock().map(|t| t.cache.len()).unwrap_or_default()
    }

    /// Snapshot of every search row, oldest first.
    pub fn searches(&self) -> Vec<SearchRecord> {
        self.lock().map(|t| t.searches.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LeadCache for MemoryStore {
    async fn get(&self, domain: &str, category: &str) -> Result<Option<Vec<Contact>>, AppError> {
        let tables = self.lock()?;
        // Latest insert wins; created_at ties fall back to insertion order.
        let newest = tables
            .cache
            .iter()
            .enumerate()
            .filter(|(_, e)| e.domain == domain && e.category == category)
            .max_by_key(|(idx, e)| (e.created_at, *idx))
            .map(|(_, e)| e);

        Ok(newest.and_then(|entry| contacts_from_entry(entry, Utc::now())))
    }

    async fn put(
        &self,
        domain: &str,
        category: &str,
        contacts: &[Contact],
        provider: ProviderKind,
    ) -> Result<(), AppError> {
        let entry = new_cache_entry(domain, category, contacts, provider, Utc::now())?;
        self.lock()?.cache.push(entry);
        Ok(())
    }
}

#[async_trait]
impl CallLedger for MemoryStore {
    async fn record(&self, entry: CallLogEntry) -> Result<(), AppError> {
        self.lock()?.calls.push(entry);
        Ok(())
    }

    async fn count_successful_since(
        &self,
        user_id: i64,
        provider: ProviderKind,
        since: DateTime<Utc>,
    ) -> Result<i64, AppError> {
        let count = self
            .lock()?
            .calls
            .iter()
            .filter(|c| {
                c.user_id == user_id && c.provider == provider && c.success && c.created_at >= since
            })
            .count();
        Ok(count as i64)
    }
}

#[async_trait]
impl SearchLog for MemoryStore {
    async fn record_search(&self, record: SearchRecord) -> Result<(), AppError> {
        self.lock()?.searches.push(record);
        Ok(())
    }

    async fn usage_totals(&self, user_id: i64) -> Result<UsageTotals, AppError> {
        let tables = self.lock()?;
        Ok(totals_from(
            tables.searches.iter().filter(|s| s.user_id == user_id),
        ))
    }
}
