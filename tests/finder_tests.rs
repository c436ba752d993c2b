/// Orchestration tests for the lead finder
/// Uses scripted in-process providers and the in-memory store so every
/// ledger and cache side effect can be asserted
use async_trait::async_trait;
use chrono::{Duration, Utc};
use pm_outreach::cache::new_cache_entry;
use pm_outreach::credentials::{CredentialCipher, CredentialKey, CredentialStore, MemoryCredentialStore};
use pm_outreach::finder::{LeadFinder, LeadSource};
use pm_outreach::lead_filter::{filter_contacts, rank_contacts};
use pm_outreach::memory_store::MemoryStore;
use pm_outreach::models::{CallLogEntry, Contact, ProviderConfig, ProviderKind};
use pm_outreach::providers::{HunterProvider, LeadProvider, ProviderError, ProviderRegistry};
use pm_outreach::rate_limit::{CallLedger, MAX_CALLS_PER_WINDOW};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const USER: i64 = 42;

#[derive(Clone)]
enum Outcome {
    Contacts(Vec<Contact>),
    Fail,
}

struct ScriptedProvider {
    kind: ProviderKind,
    outcome: Outcome,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    fn new(kind: ProviderKind, outcome: Outcome) -> Arc<Self> {
        Arc::new(Self {
            kind,
            outcome,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LeadProvider for ScriptedProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn fetch(
        &self,
        _domain: &str,
        _category: &str,
        config: &ProviderConfig,
    ) -> Result<Vec<Contact>, ProviderError> {
        assert!(config.enabled, "disabled provider must never be called");
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.outcome {
            Outcome::Contacts(contacts) => Ok(contacts.clone()),
            Outcome::Fail => Err(ProviderError::Status {
                status: 500,
                body: "upstream exploded".to_string(),
            }),
        }
    }
}

fn contact(role: &str, email: &str, confidence: u8) -> Contact {
    Contact::new("Sam", "Lee", role, email, confidence, "Acme").unwrap()
}

struct Harness {
    finder: LeadFinder,
    store: MemoryStore,
    credentials: Arc<MemoryCredentialStore>,
}

impl Harness {
    fn new(providers: &[Arc<ScriptedProvider>]) -> Self {
        let mut registry = ProviderRegistry::new();
        for provider in providers {
            registry.register(provider.clone());
        }
        Self::with_registry(registry)
    }

    fn with_registry(registry: ProviderRegistry) -> Self {
        let store = MemoryStore::new();
        let credentials = Arc::new(MemoryCredentialStore::new(CredentialCipher::new([7u8; 32])));
        let finder = LeadFinder::new(
            registry,
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            credentials.clone(),
        );
        Self {
            finder,
            store,
            credentials,
        }
    }

    async fn enable(&self, kind: ProviderKind) {
        self.credentials
            .set(USER, CredentialKey::ApiKey(kind), "test-key")
            .await
            .unwrap();
        if kind == ProviderKind::Snov {
            self.credentials
                .set(USER, CredentialKey::SnovSecret, "test-secret")
                .await
                .unwrap();
        }
    }

    fn ledger(&self) -> Vec<(ProviderKind, bool)> {
        self.store
            .call_log()
            .into_iter()
            .map(|e| (e.provider, e.success))
            .collect()
    }
}

#[tokio::test]
async fn test_no_enabled_providers_makes_no_attempts() {
    let hunter = ScriptedProvider::new(ProviderKind::Hunter, Outcome::Contacts(vec![contact("PM", "a@acme.com", 90)]));
    let harness = Harness::new(&[hunter.clone()]);

    let lookup = harness.finder.lookup("acme.com", "pm", USER).await;

    assert_eq!(lookup.source, LeadSource::NoProviders);
    assert!(lookup.contacts.is_empty());
    assert_eq!(hunter.calls(), 0);
    assert!(harness.ledger().is_empty());
    assert_eq!(harness.store.cache_entry_count(), 0);
}

#[tokio::test]
async fn test_failure_falls_back_to_next_provider() {
    let hunter = ScriptedProvider::new(ProviderKind::Hunter, Outcome::Fail);
    let apollo = ScriptedProvider::new(
        ProviderKind::Apollo,
        Outcome::Contacts(vec![contact("PM", "pm@acme.com", 80)]),
    );
    let snov = ScriptedProvider::new(ProviderKind::Snov, Outcome::Contacts(vec![contact("PM", "x@acme.com", 99)]));
    let harness = Harness::new(&[hunter.clone(), apollo.clone(), snov.clone()]);
    for kind in [ProviderKind::Hunter, ProviderKind::Apollo, ProviderKind::Snov] {
        harness.enable(kind).await;
    }

    let lookup = harness.finder.lookup("acme.com", "pm", USER).await;

    assert_eq!(lookup.source, LeadSource::Provider(ProviderKind::Apollo));
    assert_eq!(lookup.contacts.len(), 1);
    assert_eq!(
        harness.ledger(),
        vec![(ProviderKind::Hunter, false), (ProviderKind::Apollo, true)]
    );
    // First non-empty success ends the search
    assert_eq!(snov.calls(), 0);
    assert_eq!(harness.store.cache_entry_count(), 1);
}

#[tokio::test]
async fn test_timed_out_provider_is_logged_and_next_one_wins() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/domain-search"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"data": {"emails": [{"value": "late@acme.com"}]}}))
                .set_delay(StdDuration::from_secs(3)),
        )
        .mount(&mock_server)
        .await;

    let slow_hunter =
        HunterProvider::with_base_url(mock_server.uri(), StdDuration::from_millis(300)).unwrap();
    let apollo = ScriptedProvider::new(
        ProviderKind::Apollo,
        Outcome::Contacts(vec![contact("PM", "pm@acme.com", 80)]),
    );
    let mut registry = ProviderRegistry::new();
    registry.register(Arc::new(slow_hunter));
    registry.register(apollo.clone());

    let harness = Harness::with_registry(registry);
    harness.enable(ProviderKind::Hunter).await;
    harness.enable(ProviderKind::Apollo).await;

    let lookup = harness.finder.lookup("acme.com", "pm", USER).await;

    assert_eq!(lookup.source, LeadSource::Provider(ProviderKind::Apollo));
    assert_eq!(lookup.contacts[0].email, "pm@acme.com");
    assert_eq!(
        harness.ledger(),
        vec![(ProviderKind::Hunter, false), (ProviderKind::Apollo, true)]
    );
    assert_eq!(apollo.calls(), 1);
}

#[tokio::test]
async fn test_second_lookup_is_served_from_cache() {
    let hunter = ScriptedProvider::new(
        ProviderKind::Hunter,
        Outcome::Contacts(vec![contact("PM", "pm@acme.com", 90)]),
    );
    let harness = Harness::new(&[hunter.clone()]);
    harness.enable(ProviderKind::Hunter).await;

    let first = harness.finder.lookup("acme.com", "pm", USER).await;
    let second = harness.finder.lookup("acme.com", "pm", USER).await;

    assert_eq!(first.source, LeadSource::Provider(ProviderKind::Hunter));
    assert_eq!(second.source, LeadSource::Cache);
    assert_eq!(second.contacts, first.contacts);
    assert_eq!(hunter.calls(), 1);
    assert_eq!(harness.ledger().len(), 1);

    // A different category is a different cache key
    let other = harness.finder.lookup("acme.com", "consulting", USER).await;
    assert_eq!(other.source, LeadSource::Provider(ProviderKind::Hunter));
    assert_eq!(hunter.calls(), 2);
}

#[tokio::test]
async fn test_expired_cache_entry_is_ignored() {
    let hunter = ScriptedProvider::new(
        ProviderKind::Hunter,
        Outcome::Contacts(vec![contact("PM", "fresh@acme.com", 90)]),
    );
    let harness = Harness::new(&[hunter.clone()]);
    harness.enable(ProviderKind::Hunter).await;

    let stale = new_cache_entry(
        "acme.com",
        "pm",
        &[contact("PM", "stale@acme.com", 90)],
        ProviderKind::Apollo,
        Utc::now() - Duration::days(8),
    )
    .unwrap();
    harness.store.insert_cache_entry(stale).unwrap();

    let lookup = harness.finder.lookup("acme.com", "pm", USER).await;

    assert_eq!(lookup.source, LeadSource::Provider(ProviderKind::Hunter));
    assert_eq!(lookup.contacts[0].email, "fresh@acme.com");
}

#[tokio::test]
async fn test_rate_limited_provider_is_skipped_without_logging() {
    let hunter = ScriptedProvider::new(ProviderKind::Hunter, Outcome::Contacts(vec![contact("PM", "h@acme.com", 90)]));
    let apollo = ScriptedProvider::new(ProviderKind::Apollo, Outcome::Contacts(vec![contact("PM", "a@acme.com", 90)]));
    let harness = Harness::new(&[hunter.clone(), apollo.clone()]);
    harness.enable(ProviderKind::Hunter).await;
    harness.enable(ProviderKind::Apollo).await;

    for _ in 0..MAX_CALLS_PER_WINDOW {
        harness
            .store
            .record(CallLogEntry::new(USER, ProviderKind::Hunter, "other.com", true))
            .await
            .unwrap();
    }

    let lookup = harness.finder.lookup("acme.com", "pm", USER).await;

    assert_eq!(lookup.source, LeadSource::Provider(ProviderKind::Apollo));
    assert_eq!(hunter.calls(), 0);
    let hunter_entries = harness
        .ledger()
        .iter()
        .filter(|(kind, _)| *kind == ProviderKind::Hunter)
        .count();
    assert_eq!(hunter_entries, MAX_CALLS_PER_WINDOW as usize);
}

#[tokio::test]
async fn test_failed_calls_never_consume_the_budget() {
    let hunter = ScriptedProvider::new(ProviderKind::Hunter, Outcome::Contacts(vec![contact("PM", "h@acme.com", 90)]));
    let harness = Harness::new(&[hunter.clone()]);
    harness.enable(ProviderKind::Hunter).await;

    for _ in 0..(MAX_CALLS_PER_WINDOW * 2) {
        harness
            .store
            .record(CallLogEntry::new(USER, ProviderKind::Hunter, "acme.com", false))
            .await
            .unwrap();
    }

    let lookup = harness.finder.lookup("acme.com", "pm", USER).await;
    assert_eq!(lookup.source, LeadSource::Provider(ProviderKind::Hunter));
    assert_eq!(hunter.calls(), 1);
}

#[tokio::test]
async fn test_empty_success_is_logged_and_falls_through() {
    let hunter = ScriptedProvider::new(ProviderKind::Hunter, Outcome::Contacts(vec![]));
    let ftl = ScriptedProvider::new(ProviderKind::FindThatLead, Outcome::Contacts(vec![]));
    let harness = Harness::new(&[hunter.clone(), ftl.clone()]);
    harness.enable(ProviderKind::Hunter).await;
    harness.enable(ProviderKind::FindThatLead).await;

    let lookup = harness.finder.lookup("acme.com", "pm", USER).await;

    assert_eq!(lookup.source, LeadSource::Exhausted);
    assert!(lookup.contacts.is_empty());
    assert_eq!(
        harness.ledger(),
        vec![(ProviderKind::Hunter, true), (ProviderKind::FindThatLead, true)]
    );
    assert_eq!(harness.store.cache_entry_count(), 0);
    assert!(harness.finder.find_leads("acme.com", "pm", USER).await.is_empty());
}

#[tokio::test]
async fn test_blank_company_is_backfilled_with_domain() {
    let nameless = Contact::new("Ana", "", "PM", "ana@acme.com", 90, "").unwrap();
    let hunter = ScriptedProvider::new(ProviderKind::Hunter, Outcome::Contacts(vec![nameless]));
    let harness = Harness::new(&[hunter]);
    harness.enable(ProviderKind::Hunter).await;

    let contacts = harness.finder.find_leads("acme.com", "pm", USER).await;
    assert_eq!(contacts[0].company, "acme.com");

    // The cached copy carries the back-filled company too
    let cached = harness.finder.lookup("acme.com", "pm", USER).await;
    assert_eq!(cached.contacts[0].company, "acme.com");
}

#[tokio::test]
async fn test_provider_configs_are_read_per_user() {
    let harness = Harness::new(&[]);
    harness
        .credentials
        .set(USER, CredentialKey::ApiKey(ProviderKind::Snov), "id-only")
        .await
        .unwrap();
    harness.enable(ProviderKind::FindThatLead).await;

    let configs = harness.finder.provider_configs(USER).await;
    let snov = &configs[&ProviderKind::Snov];
    assert!(snov.enabled);
    assert!(snov.secondary_secret.is_none());
    assert!(!configs[&ProviderKind::Hunter].enabled);

    assert_eq!(
        harness.finder.enabled_providers(USER).await,
        vec![ProviderKind::Snov, ProviderKind::FindThatLead]
    );
}

#[tokio::test]
async fn test_provider_status_reports_usage() {
    let hunter = ScriptedProvider::new(ProviderKind::Hunter, Outcome::Contacts(vec![contact("PM", "h@acme.com", 90)]));
    let harness = Harness::new(&[hunter]);
    harness.enable(ProviderKind::Hunter).await;

    harness.finder.lookup("acme.com", "pm", USER).await;
    harness.finder.lookup("beta.io", "pm", USER).await;

    let statuses = harness.finder.provider_status(USER).await;
    assert_eq!(statuses.len(), 4);

    let hunter_status = &statuses[0];
    assert_eq!(hunter_status.provider, ProviderKind::Hunter);
    assert!(hunter_status.enabled);
    assert_eq!(hunter_status.credits_per_month, 50);
    assert_eq!(hunter_status.usage.calls_today, 2);
    assert_eq!(hunter_status.usage.remaining_today, MAX_CALLS_PER_WINDOW - 2);
    assert!(!hunter_status.usage.rate_limited);

    assert!(!statuses[1].enabled);
    assert_eq!(statuses[1].usage.calls_today, 0);
}

#[tokio::test]
async fn test_end_to_end_filter_and_rank() {
    let hunter = ScriptedProvider::new(
        ProviderKind::Hunter,
        Outcome::Contacts(vec![
            contact("Senior Product Manager", "one@example.com", 95),
            contact("Sales Rep", "two@example.com", 60),
            contact("Product Manager", "three@example.com", 88),
        ]),
    );
    let harness = Harness::new(&[hunter]);
    harness.enable(ProviderKind::Hunter).await;

    let contacts = harness.finder.find_leads("example.com", "pm", USER).await;
    let no_exclusions: [&str; 0] = [];
    let filtered = filter_contacts(&contacts, &["product manager"], &no_exclusions, 80);
    let ranked = rank_contacts(&filtered);

    let order: Vec<(&str, u8)> = ranked
        .iter()
        .map(|r| (r.contact.role.as_str(), r.contact.confidence))
        .collect();
    assert_eq!(
        order,
        vec![("Senior Product Manager", 95), ("Product Manager", 88)]
    );
}
