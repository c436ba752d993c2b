use super::{
    build_http_client, keep_with_email, parse_items, read_json, send_checked, text, LeadProvider,
    ProviderError,
};
use crate::models::{Contact, ProviderConfig, ProviderKind, DEFAULT_CONFIDENCE};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.snov.io";
const RESULT_LIMIT: u32 = 25;

/// Snov.io domain emails.
///
/// The stored api key is the OAuth client id and the secondary secret is
/// the client secret; every fetch first exchanges them for a bearer token.
pub struct SnovProvider {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DomainEmailsResponse {
    #[serde(default)]
    emails: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SnovEmail {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
    #[serde(default)]
    position: Option<String>,
    #[serde(default)]
    social_url: Option<String>,
}

impl SnovProvider {
    pub fn new(timeout: Duration) -> Result<Self, ProviderError> {
        Self::with_base_url(DEFAULT_BASE_URL, timeout)
    }

    pub fn with_base_url(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ProviderError> {
        Ok(Self {
            client: build_http_client(timeout)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn access_token(&self, config: &ProviderConfig) -> Result<String, ProviderError> {
        let secret = config.secondary_secret.as_deref().ok_or_else(|| {
            ProviderError::Configuration("Snov client secret is not configured".to_string())
        })?;

        let request = self
            .client
            .post(format!("{}/v1/get-access-token", self.base_url))
            .json(&json!({
                "client_id": config.api_key,
                "client_secret": secret,
                "grant_type": "client_credentials",
            }));

        let token: TokenResponse = read_json(send_checked(request).await?).await?;
        token
            .access_token
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| ProviderError::Malformed("token response has no access_token".to_string()))
    }
}

#[async_trait]
impl LeadProvider for SnovProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Snov
    }

    async fn fetch(
        &self,
        domain: &str,
        _category: &str,
        config: &ProviderConfig,
    ) -> Result<Vec<Contact>, ProviderError> {
        let token = self.access_token(config).await?;

        tracing::debug!("Snov domain emails for {}", domain);
        let limit = RESULT_LIMIT.to_string();
        let request = self
            .client
            .get(format!("{}/v1/get-domain-emails-with-info", self.base_url))
            .bearer_auth(token)
            .query(&[("domain", domain), ("limit", limit.as_str())]);

        let response: DomainEmailsResponse = read_json(send_checked(request).await?).await?;

        let items: Vec<SnovEmail> = parse_items(ProviderKind::Snov, response.emails);
        let contacts = items
            .into_iter()
            .map(|item| {
                Contact::new(
                    text(item.first_name),
                    text(item.last_name),
                    text(item.position),
                    text(item.email),
                    DEFAULT_CONFIDENCE,
                    String::new(),
                )
                .map(|c| c.with_linkedin(item.social_url))
            })
            .collect();

        Ok(keep_with_email(ProviderKind::Snov, contacts))
    }
}
