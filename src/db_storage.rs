use crate::cache::{contacts_from_entry, new_cache_entry, LeadCache};
use crate::circuit_breaker::{create_store_circuit_breaker, guarded, StoreCircuitBreaker};
use crate::credentials::{CredentialCipher, CredentialError, CredentialKey, CredentialStore};
use crate::errors::{AppError, ResultExt};
use crate::models::{CacheEntry, CallLogEntry, Contact, ProviderKind, SearchRecord, UsageTotals};
use crate::rate_limit::CallLedger;
use crate::usage::SearchLog;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

type CacheRow = (
    String,
    String,
    String,
    String,
    i32,
    String,
    DateTime<Utc>,
    DateTime<Utc>,
);

/// Postgres-backed lead cache, call ledger and search log.
///
/// Both tables are append-only, so concurrent requests only ever race on
/// inserts and need no locking beyond what Postgres gives a single row.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    breaker: StoreCircuitBreaker,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            breaker: create_store_circuit_breaker(),
        }
    }

    async fn newest_entry(&self, domain: &str, category: &str) -> Result<Option<CacheEntry>, AppError> {
        let row = guarded(
            &self.breaker,
            sqlx::query_as::<_, CacheRow>(
                r#"
                SELECT domain, domain_type, leads_data, checksum, lead_count, provider,
                       created_at, expires_at
                FROM lead_cache
                WHERE domain = $1 AND domain_type = $2
                ORDER BY created_at DESC, id DESC
                LIMIT 1
                "#,
            )
            .bind(domain)
            .bind(category)
            .fetch_optional(&self.pool),
        )
        .await
        .with_context(|| format!("reading lead cache for {}/{}", domain, category))?;

        let Some((domain, category, leads_data, checksum, lead_count, provider, created_at, expires_at)) =
            row
        else {
            return Ok(None);
        };

        let provider = match provider.parse::<ProviderKind>() {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!("Ignoring cache row for {}/{}: {}", domain, category, e);
                return Ok(None);
            }
        };

        Ok(Some(CacheEntry {
            domain,
            category,
            leads_data,
            checksum,
            lead_count,
            provider,
            created_at,
            expires_at,
        }))
    }
}

#[async_trait]
impl LeadCache for PgStore {
    async fn get(&self, domain: &str, category: &str) -> Result<Option<Vec<Contact>>, AppError> {
        let entry = self.newest_entry(domain, category).await?;
        Ok(entry.and_then(|e| contacts_from_entry(&e, Utc::now())))
    }

    async fn put(
        &self,
        domain: &str,
        category: &str,
        contacts: &[Contact],
        provider: ProviderKind,
    ) -> Result<(), AppError> {
        let entry = new_cache_entry(domain, category, contacts, provider, Utc::now())?;

        guarded(
            &self.breaker,
            sqlx::query(
                r#"
                INSERT INTO lead_cache
                    (domain, domain_type, leads_data, checksum, lead_count, provider, created_at, expires_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(&entry.domain)
            .bind(&entry.category)
            .bind(&entry.leads_data)
            .bind(&entry.checksum)
            .bind(entry.lead_count)
            .bind(entry.provider.as_str())
            .bind(entry.created_at)
            .bind(entry.expires_at)
            .execute(&self.pool),
        )
        .await
        .context("inserting lead cache entry")?;

        tracing::debug!(
            "Cached {} leads for {}/{} from {}",
            entry.lead_count,
            domain,
            category,
            provider
        );
        Ok(())
    }
}

#[async_trait]
impl CallLedger for PgStore {
    async fn record(&self, entry: CallLogEntry) -> Result<(), AppError> {
        guarded(
            &self.breaker,
            sqlx::query(
                r#"
                INSERT INTO api_call_logs (user_id, provider, domain, success, credits_used, created_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(entry.user_id)
            .bind(entry.provider.as_str())
            .bind(&entry.domain)
            .bind(entry.success)
            .bind(entry.credits_used)
            .bind(entry.created_at)
            .execute(&self.pool),
        )
        .await
        .with_context(|| format!("recording {} call", entry.provider))?;
        Ok(())
    }

    async fn count_successful_since(
        &self,
        user_id: i64,
        provider: ProviderKind,
        since: DateTime<Utc>,
    ) -> Result<i64, AppError> {
        guarded(
            &self.breaker,
            sqlx::query_scalar::<_, i64>(
                r#"
                SELECT COUNT(*) FROM api_call_logs
                WHERE user_id = $1 AND provider = $2 AND success AND created_at >= $3
                "#,
            )
            .bind(user_id)
            .bind(provider.as_str())
            .bind(since)
            .fetch_one(&self.pool),
        )
        .await
        .with_context(|| format!("counting {} calls", provider))
    }
}

#[async_trait]
impl SearchLog for PgStore {
    async fn record_search(&self, record: SearchRecord) -> Result<(), AppError> {
        guarded(
            &self.breaker,
            sqlx::query(
                r#"
                INSERT INTO searches
                    (user_id, domain, domain_type, lead_count, success, error_message, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(record.user_id)
            .bind(&record.domain)
            .bind(&record.category)
            .bind(record.lead_count)
            .bind(record.success)
            .bind(&record.error_message)
            .bind(record.created_at)
            .execute(&self.pool),
        )
        .await
        .with_context(|| format!("recording search for user {}", record.user_id))?;
        Ok(())
    }

    async fn usage_totals(&self, user_id: i64) -> Result<UsageTotals, AppError> {
        let (total_searches, failed_searches, total_leads) = guarded(
            &self.breaker,
            sqlx::query_as::<_, (i64, i64, i64)>(
                r#"
                SELECT COUNT(*) FILTER (WHERE success),
                       COUNT(*) FILTER (WHERE NOT success),
                       COALESCE(SUM(lead_count) FILTER (WHERE success), 0)
                FROM searches
                WHERE user_id = $1
                "#,
            )
            .bind(user_id)
            .fetch_one(&self.pool),
        )
        .await
        .context("reading usage totals")?;

        Ok(UsageTotals {
            total_searches,
            failed_searches,
            total_leads,
        })
    }
}

/// Encrypted credential rows in `user_credentials`.
#[derive(Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
    cipher: CredentialCipher,
    breaker: StoreCircuitBreaker,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool, cipher: CredentialCipher) -> Self {
        Self {
            pool,
            cipher,
            breaker: create_store_circuit_breaker(),
        }
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn get(&self, user_id: i64, key: CredentialKey) -> Result<Option<String>, CredentialError> {
        let stored = guarded(
            &self.breaker,
            sqlx::query_scalar::<_, String>(
                "SELECT ciphertext FROM user_credentials WHERE user_id = $1 AND credential = $2",
            )
            .bind(user_id)
            .bind(key.storage_name())
            .fetch_optional(&self.pool),
        )
        .await
        .context("reading credential")
        .map_err(|e| CredentialError::Storage(e.to_string()))?;

        stored.map(|s| self.cipher.decrypt(&s)).transpose()
    }

    async fn set(&self, user_id: i64, key: CredentialKey, value: &str) -> Result<(), CredentialError> {
        let value = value.trim();
        if value.is_empty() {
            return Ok(());
        }
        let sealed = self.cipher.encrypt(value)?;

        guarded(
            &self.breaker,
            sqlx::query(
                r#"
                INSERT INTO user_credentials (user_id, credential, ciphertext, updated_at)
                VALUES ($1, $2, $3, now())
                ON CONFLICT (user_id, credential) DO UPDATE
                SET ciphertext = EXCLUDED.ciphertext,
                    updated_at = now()
                "#,
            )
            .bind(user_id)
            .bind(key.storage_name())
            .bind(&sealed)
            .execute(&self.pool),
        )
        .await
        .context("storing credential")
        .map_err(|e| CredentialError::Storage(e.to_string()))?;

        tracing::info!("Stored {} for user {}", key.storage_name(), user_id);
        Ok(())
    }
}
