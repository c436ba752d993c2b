use super::{
    build_http_client, keep_with_email, parse_items, read_json, send_checked, text,
    validation_from, KeyValidation, LeadProvider, ProviderError, VALIDATION_TIMEOUT,
};
use crate::models::{confidence_from_percent, Contact, ProviderConfig, ProviderKind};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.hunter.io";
const SEARCH_LIMIT: u32 = 100;
/// Lower limit accepted by entry-level plans.
const FALLBACK_LIMIT: u32 = 10;

/// Hunter.io domain search. Confidence is published as a 0-100 integer.
pub struct HunterProvider {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Option<SearchData>,
}

#[derive(Debug, Deserialize)]
struct SearchData {
    #[serde(default)]
    organization: Option<String>,
    #[serde(default)]
    emails: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct HunterEmail {
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
    #[serde(default)]
    position: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    linkedin: Option<String>,
    #[serde(default)]
    confidence: Option<i64>,
}

impl HunterProvider {
    pub fn new(timeout: Duration) -> Result<Self, ProviderError> {
        Self::with_base_url(DEFAULT_BASE_URL, timeout)
    }

    pub fn with_base_url(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ProviderError> {
        Ok(Self {
            client: build_http_client(timeout)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn domain_search(
        &self,
        domain: &str,
        api_key: &str,
        limit: u32,
    ) -> Result<SearchResponse, ProviderError> {
        tracing::debug!("Hunter domain search for {} (limit {})", domain, limit);
        let limit = limit.to_string();
        let request = self
            .client
            .get(format!("{}/v2/domain-search", self.base_url))
            .query(&[
                ("domain", domain),
                ("api_key", api_key),
                ("limit", limit.as_str()),
            ]);

        let response = send_checked(request).await?;
        read_json(response).await
    }
}

/// Hunter reports plan limits as an error with id `pagination_error`.
fn is_pagination_error(body: &str) -> bool {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("errors").and_then(Value::as_array).cloned())
        .map(|errors| {
            errors
                .iter()
                .any(|e| e.get("id").and_then(Value::as_str) == Some("pagination_error"))
        })
        .unwrap_or(false)
}

#[async_trait]
impl LeadProvider for HunterProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Hunter
    }

    async fn fetch(
        &self,
        domain: &str,
        _category: &str,
        config: &ProviderConfig,
    ) -> Result<Vec<Contact>, ProviderError> {
        let response = match self.domain_search(domain, &config.api_key, SEARCH_LIMIT).await {
            Err(ProviderError::Status { body, .. }) if is_pagination_error(&body) => {
                tracing::warn!(
                    "Hunter plan limit detected for {}, retrying with limit={}",
                    domain,
                    FALLBACK_LIMIT
                );
                self.domain_search(domain, &config.api_key, FALLBACK_LIMIT)
                    .await?
            }
            other => other?,
        };

        let Some(data) = response.data else {
            return Ok(vec![]);
        };
        let company = text(data.organization);

        let items: Vec<HunterEmail> = parse_items(ProviderKind::Hunter, data.emails);
        let contacts = items
            .into_iter()
            .map(|item| {
                Contact::new(
                    text(item.first_name),
                    text(item.last_name),
                    text(
                        item.position
                            .filter(|p| !p.trim().is_empty())
                            .or(item.title),
                    ),
                    text(item.value),
                    confidence_from_percent(item.confidence.unwrap_or(0)),
                    company.clone(),
                )
                .map(|c| c.with_linkedin(item.linkedin))
            })
            .collect();

        Ok(keep_with_email(ProviderKind::Hunter, contacts))
    }

    async fn validate_key(&self, config: &ProviderConfig) -> KeyValidation {
        let result = self
            .client
            .get(format!("{}/v2/account", self.base_url))
            .query(&[("api_key", config.api_key.as_str())])
            .timeout(VALIDATION_TIMEOUT)
            .send()
            .await;
        validation_from(result)
    }
}
