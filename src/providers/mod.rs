//! Lead-data provider adapters.
//!
//! Each adapter turns `(domain, category)` into one provider-specific HTTP
//! exchange and maps the response into normalized [`Contact`]s. A transport
//! or status failure fails the whole fetch; a single bad item is skipped.

pub mod apollo;
pub mod findthatlead;
pub mod hunter;
pub mod snov;

use crate::models::{Contact, ProviderConfig, ProviderKind};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub use apollo::ApolloProvider;
pub use findthatlead::FindThatLeadProvider;
pub use hunter::HunterProvider;
pub use snov::SnovProvider;

/// Timeout for lead searches.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for credential validation pings.
pub const VALIDATION_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    Timeout(String),
    /// Connection-level failure before a status was received.
    Transport(String),
    /// Provider answered with a non-2xx status.
    Status { status: u16, body: String },
    /// Response body as a whole could not be understood.
    Malformed(String),
    /// Credentials for this provider are incomplete.
    Configuration(String),
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::Timeout(msg) => write!(f, "request timed out: {}", msg),
            ProviderError::Transport(msg) => write!(f, "transport error: {}", msg),
            ProviderError::Status { status, body } => {
                write!(f, "provider returned status {}: {}", status, body)
            }
            ProviderError::Malformed(msg) => write!(f, "malformed response: {}", msg),
            ProviderError::Configuration(msg) => write!(f, "configuration error: {}", msg),
        }
    }
}

impl std::error::Error for ProviderError {}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        // Strip the URL: several providers take the key as a query parameter.
        let err = err.without_url();
        if err.is_timeout() {
            ProviderError::Timeout(err.to_string())
        } else if err.is_decode() {
            ProviderError::Malformed(err.to_string())
        } else {
            ProviderError::Transport(err.to_string())
        }
    }
}

/// Outcome of a credential check against a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum KeyValidation {
    Verified,
    Invalid,
    /// Provider could not be reached or has no check endpoint; key is accepted.
    Unverified(String),
}

impl KeyValidation {
    pub fn accepts_key(&self) -> bool {
        !matches!(self, KeyValidation::Invalid)
    }
}

#[async_trait]
pub trait LeadProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    async fn fetch(
        &self,
        domain: &str,
        category: &str,
        config: &ProviderConfig,
    ) -> Result<Vec<Contact>, ProviderError>;

    async fn validate_key(&self, _config: &ProviderConfig) -> KeyValidation {
        KeyValidation::Unverified("no validation endpoint".to_string())
    }
}

/// Explicit provider registry keyed by [`ProviderKind`].
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<ProviderKind, Arc<dyn LeadProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the four HTTP adapters pointed at the real hosts.
    pub fn with_defaults(fetch_timeout: Duration) -> Result<Self, ProviderError> {
        let mut registry = Self::new();
        registry.register(Arc::new(HunterProvider::new(fetch_timeout)?));
        registry.register(Arc::new(ApolloProvider::new(fetch_timeout)?));
        registry.register(Arc::new(SnovProvider::new(fetch_timeout)?));
        registry.register(Arc::new(FindThatLeadProvider::new(fetch_timeout)?));
        Ok(registry)
    }

    /// Adds a provider, replacing any previous one of the same kind.
    pub fn register(&mut self, provider: Arc<dyn LeadProvider>) -> &mut Self {
        self.providers.insert(provider.kind(), provider);
        self
    }

    pub fn get(&self, kind: ProviderKind) -> Option<Arc<dyn LeadProvider>> {
        self.providers.get(&kind).cloned()
    }

    /// Registered providers in fixed preference order.
    pub fn ordered(&self) -> Vec<Arc<dyn LeadProvider>> {
        ProviderKind::ALL
            .iter()
            .filter_map(|kind| self.get(*kind))
            .collect()
    }
}

// ============ Shared HTTP helpers ============

pub(crate) fn build_http_client(timeout: Duration) -> Result<Client, ProviderError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ProviderError::Transport(format!("failed to build HTTP client: {}", e)))
}

/// Sends the request and turns non-2xx answers into [`ProviderError::Status`].
pub(crate) async fn send_checked(request: RequestBuilder) -> Result<Response, ProviderError> {
    let response = request.send().await?;

    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(ProviderError::Status { status, body });
    }

    Ok(response)
}

pub(crate) async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, ProviderError> {
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| ProviderError::Malformed(e.to_string()))
}

/// Deserializes each raw item independently, dropping the ones that fail.
pub(crate) fn parse_items<T: DeserializeOwned>(provider: ProviderKind, items: Vec<Value>) -> Vec<T> {
    items
        .into_iter()
        .enumerate()
        .filter_map(|(idx, item)| match serde_json::from_value::<T>(item) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                tracing::warn!("{}: skipping malformed item #{}: {}", provider, idx, e);
                None
            }
        })
        .collect()
}

/// Trims an optional string field, mapping blank to empty.
pub(crate) fn text(value: Option<String>) -> String {
    value.map(|v| v.trim().to_string()).unwrap_or_default()
}

/// Drops contacts without an email, logging how many were lost.
pub(crate) fn keep_with_email(provider: ProviderKind, contacts: Vec<Option<Contact>>) -> Vec<Contact> {
    let total = contacts.len();
    let kept: Vec<Contact> = contacts.into_iter().flatten().collect();
    if kept.len() < total {
        tracing::debug!("{}: dropped {} items without email", provider, total - kept.len());
    }
    kept
}

/// Maps a ping response onto a [`KeyValidation`].
pub(crate) fn validation_from(result: Result<Response, reqwest::Error>) -> KeyValidation {
    match result {
        Ok(response) if response.status().is_success() => KeyValidation::Verified,
        Ok(response)
            if matches!(
                response.status(),
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
            ) =>
        {
            tracing::debug!("Key validation rejected with status {}", response.status());
            KeyValidation::Invalid
        }
        Ok(response) => KeyValidation::Unverified(format!(
            "validation endpoint answered {}",
            response.status()
        )),
        Err(e) => KeyValidation::Unverified(format!(
            "could not verify: {}",
            e.without_url()
        )),
    }
}
