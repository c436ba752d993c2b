//! Multi-provider lead search.
//!
//! A search for `(domain, category)` on behalf of a user:
//! 1. Resolve the user's enabled providers (fresh on every call)
//! 2. Serve a valid cached result if there is one
//! 3. Try providers in fixed order, skipping rate-limited ones
//! 4. Record every attempt in the call ledger
//! 5. Cache and return the first non-empty result
use crate::cache::LeadCache;
use crate::credentials::{CredentialStore, UserCredentials};
use crate::models::{CallLogEntry, Contact, ProviderConfig, ProviderKind, ProviderStatus};
use crate::providers::ProviderRegistry;
use crate::rate_limit::{CallLedger, RateLimiter};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Monthly credit allowance advertised for every provider's free tier.
pub const CREDITS_PER_MONTH: u32 = 50;

/// Where the contacts of a lookup came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "provider", rename_all = "snake_case")]
pub enum LeadSource {
    /// The user has no provider credentials configured.
    NoProviders,
    Cache,
    Provider(ProviderKind),
    /// Every enabled provider was skipped, failed or came back empty.
    Exhausted,
}

#[derive(Debug, Clone)]
pub struct LeadLookup {
    pub contacts: Vec<Contact>,
    pub source: LeadSource,
}

pub struct LeadFinder {
    registry: ProviderRegistry,
    cache: Arc<dyn LeadCache>,
    ledger: Arc<dyn CallLedger>,
    limiter: RateLimiter,
    credentials: Arc<dyn CredentialStore>,
}

impl LeadFinder {
    pub fn new(
        registry: ProviderRegistry,
        cache: Arc<dyn LeadCache>,
        ledger: Arc<dyn CallLedger>,
        credentials: Arc<dyn CredentialStore>,
    ) -> Self {
        Self {
            registry,
            cache,
            limiter: RateLimiter::new(ledger.clone()),
            ledger,
            credentials,
        }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Current per-provider configuration for a user. Never cached.
    pub async fn provider_configs(&self, user_id: i64) -> HashMap<ProviderKind, ProviderConfig> {
        let creds = UserCredentials::new(user_id, self.credentials.as_ref());
        let mut configs = HashMap::with_capacity(ProviderKind::ALL.len());
        for kind in ProviderKind::ALL {
            configs.insert(kind, creds.provider_config(kind).await);
        }
        configs
    }

    /// Enabled providers in preference order.
    pub async fn enabled_providers(&self, user_id: i64) -> Vec<ProviderKind> {
        let configs = self.provider_configs(user_id).await;
        ProviderKind::ALL
            .into_iter()
            .filter(|kind| configs.get(kind).is_some_and(|c| c.enabled))
            .collect()
    }

    pub async fn find_leads(&self, domain: &str, category: &str, user_id: i64) -> Vec<Contact> {
        self.lookup(domain, category, user_id).await.contacts
    }

    pub async fn lookup(&self, domain: &str, category: &str, user_id: i64) -> LeadLookup {
        let configs = self.provider_configs(user_id).await;
        if !configs.values().any(|c| c.enabled) {
            tracing::info!("User {} has no lead providers configured", user_id);
            return LeadLookup {
                contacts: Vec::new(),
                source: LeadSource::NoProviders,
            };
        }

        match self.cache.get(domain, category).await {
            Ok(Some(contacts)) => {
                tracing::info!(
                    "Cache hit for {} / {} ({} contacts)",
                    domain,
                    category,
                    contacts.len()
                );
                return LeadLookup {
                    contacts,
                    source: LeadSource::Cache,
                };
            }
            Ok(None) => tracing::debug!("Cache miss for {} / {}", domain, category),
            Err(e) => tracing::warn!("Cache read failed for {}, treating as miss: {}", domain, e),
        }

        for provider in self.registry.ordered() {
            let kind = provider.kind();
            let Some(config) = configs.get(&kind).filter(|c| c.enabled) else {
                continue;
            };

            match self.limiter.is_limited(user_id, kind).await {
                Ok(false) => {}
                Ok(true) => {
                    tracing::warn!("Rate limit reached for {} (user {}), trying next provider", kind, user_id);
                    continue;
                }
                Err(e) => {
                    tracing::warn!("Could not read call ledger for {}, skipping: {}", kind, e);
                    continue;
                }
            }

            tracing::debug!("Trying {} for {}", kind, domain);
            let mut contacts = match provider.fetch(domain, category, config).await {
                Ok(contacts) => contacts,
                Err(e) => {
                    tracing::warn!("{} failed for {}: {}", kind, domain, e);
                    self.record(user_id, kind, domain, false).await;
                    continue;
                }
            };

            self.record(user_id, kind, domain, true).await;
            if contacts.is_empty() {
                tracing::info!("{} returned no contacts for {}", kind, domain);
                continue;
            }

            for contact in contacts.iter_mut().filter(|c| c.company.trim().is_empty()) {
                contact.company = domain.to_string();
            }

            tracing::info!("Found {} contacts for {} via {}", contacts.len(), domain, kind);
            if let Err(e) = self.cache.put(domain, category, &contacts, kind).await {
                tracing::warn!("Failed to cache results for {}: {}", domain, e);
            }

            return LeadLookup {
                contacts,
                source: LeadSource::Provider(kind),
            };
        }

        tracing::warn!("No leads found for {} from any enabled provider", domain);
        LeadLookup {
            contacts: Vec::new(),
            source: LeadSource::Exhausted,
        }
    }

    /// Enablement and current-window usage for every provider.
    pub async fn provider_status(&self, user_id: i64) -> Vec<ProviderStatus> {
        let configs = self.provider_configs(user_id).await;
        let mut statuses = Vec::with_capacity(ProviderKind::ALL.len());

        for kind in ProviderKind::ALL {
            let usage = match self.limiter.usage(user_id, kind).await {
                Ok(usage) => usage,
                Err(e) => {
                    tracing::warn!("Could not read usage for {}: {}", kind, e);
                    Default::default()
                }
            };
            statuses.push(ProviderStatus {
                provider: kind,
                enabled: configs.get(&kind).is_some_and(|c| c.enabled),
                credits_per_month: CREDITS_PER_MONTH,
                usage,
            });
        }

        statuses
    }

    async fn record(&self, user_id: i64, provider: ProviderKind, domain: &str, success: bool) {
        let entry = CallLogEntry::new(user_id, provider, domain, success);
        if let Err(e) = self.ledger.record(entry).await {
            tracing::error!("Failed to record {} call for user {}: {}", provider, user_id, e);
        }
    }
}
