use super::{
    build_http_client, keep_with_email, parse_items, read_json, send_checked, text,
    validation_from, KeyValidation, LeadProvider, ProviderError, VALIDATION_TIMEOUT,
};
use crate::models::{Contact, ProviderConfig, ProviderKind, DEFAULT_CONFIDENCE};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.apollo.io";
const PAGE_SIZE: u32 = 25;

/// Apollo.io people search. Apollo publishes no confidence score.
pub struct ApolloProvider {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    people: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct ApolloPerson {
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
    /// Only used when first/last are both missing.
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    linkedin_url: Option<String>,
    #[serde(default)]
    organization: Option<ApolloOrganization>,
}

#[derive(Debug, Deserialize)]
struct ApolloOrganization {
    #[serde(default)]
    name: Option<String>,
}

impl ApolloPerson {
    fn name_parts(&mut self) -> (String, String) {
        let first = text(self.first_name.take());
        let last = text(self.last_name.take());
        if !first.is_empty() || !last.is_empty() {
            return (first, last);
        }

        let full = text(self.name.take());
        match full.split_once(' ') {
            Some((first, last)) => (first.to_string(), last.trim().to_string()),
            None => (full, String::new()),
        }
    }
}

impl ApolloProvider {
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
impl LeadProvider for ApolloProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Apollo
    }

    async fn fetch(
        &self,
        domain: &str,
        _category: &str,
        config: &ProviderConfig,
    ) -> Result<Vec<Contact>, ProviderError> {
        tracing::debug!("Apollo people search for {}", domain);
        let request = self
            .client
            .post(format!("{}/v1/mixed_people/search", self.base_url))
            .header("X-Api-Key", &config.api_key)
            .json(&json!({
                "organization_domains": [domain],
                "page": 1,
                "per_page": PAGE_SIZE,
            }));

        let response: SearchResponse = read_json(send_checked(request).await?).await?;

        let people: Vec<ApolloPerson> = parse_items(ProviderKind::Apollo, response.people);
        let contacts = people
            .into_iter()
            .map(|mut person| {
                let (first, last) = person.name_parts();
                let company = text(person.organization.and_then(|o| o.name));
                Contact::new(
                    first,
                    last,
                    text(person.title),
                    text(person.email),
                    DEFAULT_CONFIDENCE,
                    company,
                )
                .map(|c| c.with_linkedin(person.linkedin_url))
            })
            .collect();

        Ok(keep_with_email(ProviderKind::Apollo, contacts))
    }

    async fn validate_key(&self, config: &ProviderConfig) -> KeyValidation {
        let result = self
            .client
            .get(format!("{}/v1/auth/health", self.base_url))
            .header("X-Api-Key", &config.api_key)
            .timeout(VALIDATION_TIMEOUT)
            .send()
            .await;
        validation_from(result)
    }
}
