//! Result cache seam.
//!
//! Entries are keyed by `(domain, category)` and are append-only: every
//! `put` inserts a fresh entry that expires [`CACHE_TTL_DAYS`] later, and
//! `get` only ever looks at the newest entry for a key. Expired entries
//! are left in place and ignored.
//!
//! [`CACHE_TTL_DAYS`]: crate::models::CACHE_TTL_DAYS

use crate::cache_validator::ValidatedLeads;
use crate::errors::AppError;
use crate::models::{CacheEntry, Contact, ProviderKind};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[async_trait]
pub trait LeadCache: Send + Sync {
    /// Returns the newest valid result set for the key.
    ///
    /// A missing key, an expired newest entry and a corrupted payload all
    /// look the same to the caller: `Ok(None)`.
    async fn get(&self, domain: &str, category: &str) -> Result<Option<Vec<Contact>>, AppError>;

    /// Stores a new entry for the key. Never updates an existing one.
    async fn put(
        &self,
        domain: &str,
        category: &str,
        contacts: &[Contact],
        provider: ProviderKind,
    ) -> Result<(), AppError>;
}

/// Builds the entry a `put` at `now` should insert.
pub fn new_cache_entry(
    domain: &str,
    category: &str,
    contacts: &[Contact],
    provider: ProviderKind,
    now: DateTime<Utc>,
) -> Result<CacheEntry, AppError> {
    let payload = ValidatedLeads::encode(contacts)?;
    Ok(CacheEntry {
        domain: domain.to_string(),
        category: category.to_string(),
        leads_data: payload.data,
        checksum: payload.checksum,
        lead_count: contacts.len() as i32,
        provider,
        created_at: now,
        expires_at: now + CacheEntry::ttl(),
    })
}

/// Reads the contacts out of the newest entry, if it is still usable at `now`.
pub fn contacts_from_entry(entry: &CacheEntry, now: DateTime<Utc>) -> Option<Vec<Contact>> {
    if !entry.is_valid_at(now) {
        tracing::debug!(
            "Cache entry for {}/{} expired at {}",
            entry.domain,
            entry.category,
            entry.expires_at
        );
        return None;
    }
    ValidatedLeads::decode(&entry.leads_data, &entry.checksum)
}
