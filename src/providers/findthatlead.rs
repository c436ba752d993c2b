use super::{
    build_http_client, keep_with_email, parse_items, read_json, send_checked, text, LeadProvider,
    ProviderError,
};
use crate::models::{confidence_from_fraction, Contact, ProviderConfig, ProviderKind, DEFAULT_CONFIDENCE};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.findthatlead.com";

/// FindThatLead domain emails. Scores, when present, are 0-1 probabilities.
pub struct FindThatLeadProvider {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct EmailsResponse {
    #[serde(default)]
    data: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct FtlEmail {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
    #[serde(default)]
    position: Option<String>,
    #[serde(default)]
    company: Option<String>,
    #[serde(default)]
    linkedin: Option<String>,
    #[serde(default)]
    score: Option<f64>,
}

impl FindThatLeadProvider {
    pub fn new(timeout: Duration) -> Result<Self, ProviderError> {
        Self::with_base_url(DEFAULT_BASE_URL, timeout)
    }

    pub fn with_base_url(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ProviderError> {
        Ok(Self {
            client: build_http_client(timeout)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl LeadProvider for FindThatLeadProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::FindThatLead
    }

    async fn fetch(
        &self,
        domain: &str,
        _category: &str,
        config: &ProviderConfig,
    ) -> Result<Vec<Contact>, ProviderError> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| ProviderError::Configuration(format!("bad base url: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| ProviderError::Configuration("base url cannot carry path segments".to_string()))?
            .pop_if_empty()
            .extend(["v1", "domains", domain, "emails"]);

        tracing::debug!("FindThatLead domain emails for {}", domain);
        let request = self.client.get(url).bearer_auth(&config.api_key);
        let response: EmailsResponse = read_json(send_checked(request).await?).await?;

        let items: Vec<FtlEmail> = parse_items(ProviderKind::FindThatLead, response.data);
        let contacts = items
            .into_iter()
            .map(|item| {
                let confidence = item
                    .score
                    .map(confidence_from_fraction)
                    .unwrap_or(DEFAULT_CONFIDENCE);
                Contact::new(
                    text(item.first_name),
                    text(item.last_name),
                    text(item.position),
                    text(item.email),
                    confidence,
                    text(item.company),
                )
                .map(|c| c.with_linkedin(item.linkedin))
            })
            .collect();

        Ok(keep_with_email(ProviderKind::FindThatLead, contacts))
    }
}
