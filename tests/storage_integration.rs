use chrono::{Duration, Utc};
use std::env;

use pm_outreach::cache::LeadCache;
use pm_outreach::credentials::{CredentialCipher, CredentialKey, CredentialStore};
use pm_outreach::db::Database;
use pm_outreach::db_storage::{PgCredentialStore, PgStore};
use pm_outreach::models::{CallLogEntry, Contact, ProviderKind, SearchRecord};
use pm_outreach::rate_limit::CallLedger;
use pm_outreach::usage::SearchLog;

async fn connect() -> anyhow::Result<Database> {
    let db_url = env::var("TEST_DATABASE_URL")
        .or_else(|_| env::var("DATABASE_URL"))
        .map_err(|_| anyhow::anyhow!("Set TEST_DATABASE_URL or DATABASE_URL to run this test"))?;
    Database::new(&db_url).await
}

fn unique_suffix() -> String {
    format!("{}", Utc::now().timestamp_nanos_opt().unwrap_or_default())
}

/// Cache round trip against Postgres: newest write wins.
/// Marked ignored to avoid running against production by accident; set TEST_DATABASE_URL to run.
#[tokio::test]
#[ignore]
async fn lead_cache_smoke_test() -> anyhow::Result<()> {
    let db = connect().await?;
    let store = PgStore::new(db.pool.clone());

    let domain = format!("smoke-{}.example.com", unique_suffix());
    assert!(store.get(&domain, "pm").await?.is_none());

    let first = vec![Contact::new("A", "", "PM", "a@example.com", 90, "Example").unwrap()];
    let second = vec![Contact::new("B", "", "PM", "b@example.com", 91, "Example").unwrap()];
    store.put(&domain, "pm", &first, ProviderKind::Hunter).await?;
    store.put(&domain, "pm", &second, ProviderKind::Apollo).await?;

    let cached = store.get(&domain, "pm").await?.unwrap_or_default();
    assert_eq!(cached, second);
    assert!(store.get(&domain, "consulting").await?.is_none());
    Ok(())
}

/// Ledger counts only successful calls inside the window.
#[tokio::test]
#[ignore]
async fn call_ledger_smoke_test() -> anyhow::Result<()> {
    let db = connect().await?;
    let store = PgStore::new(db.pool.clone());
    let user_id = Utc::now().timestamp_micros();

    store
        .record(CallLogEntry::new(user_id, ProviderKind::Snov, "example.com", true))
        .await?;
    store
        .record(CallLogEntry::new(user_id, ProviderKind::Snov, "example.com", false))
        .await?;

    let since = Utc::now() - Duration::hours(24);
    assert_eq!(
        store
            .count_successful_since(user_id, ProviderKind::Snov, since)
            .await?,
        1
    );
    assert_eq!(
        store
            .count_successful_since(user_id, ProviderKind::Hunter, since)
            .await?,
        0
    );
    Ok(())
}

/// Credentials are stored encrypted and read back in clear.
#[tokio::test]
#[ignore]
async fn credential_store_smoke_test() -> anyhow::Result<()> {
    let db = connect().await?;
    let store = PgCredentialStore::new(db.pool.clone(), CredentialCipher::new([9u8; 32]));
    let user_id = Utc::now().timestamp_micros();

    let key = CredentialKey::ApiKey(ProviderKind::FindThatLead);
    store.set(user_id, key, "ftl-secret").await?;
    store.set(user_id, key, "ftl-rotated").await?;

    assert_eq!(store.get(user_id, key).await?.as_deref(), Some("ftl-rotated"));
    assert!(!store.has(user_id, CredentialKey::SnovSecret).await);
    Ok(())
}

/// Search rows roll up into per-user totals; failures add no leads.
#[tokio::test]
#[ignore]
async fn search_log_smoke_test() -> anyhow::Result<()> {
    let db = connect().await?;
    let store = PgStore::new(db.pool.clone());
    let user_id = Utc::now().timestamp_micros();

    store
        .record_search(SearchRecord::succeeded(user_id, "example.com", "pm", 3))
        .await?;
    store
        .record_search(SearchRecord::failed(user_id, "not a domain", "pm", "invalid domain"))
        .await?;

    let totals = store.usage_totals(user_id).await?;
    assert_eq!(totals.total_searches, 1);
    assert_eq!(totals.failed_searches, 1);
    assert_eq!(totals.total_leads, 3);
    Ok(())
}
