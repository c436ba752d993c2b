use crate::config::Config;
use crate::credentials::{CredentialError, CredentialKey, CredentialStore};
use crate::drafts::{format_summary, generate_drafts, DraftSettings, EmailDraft};
use crate::errors::AppError;
use crate::finder::{LeadFinder, LeadSource};
use crate::lead_filter::{dedupe_contacts, filter_contacts, rank_contacts};
use crate::models::{
    ProviderConfig, ProviderKind, ProviderStatus, RankedContact, SearchRecord, UsageTotals,
};
use crate::outreach_config::OutreachConfig;
use crate::providers::KeyValidation;
use crate::usage::SearchLog;
use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    routing::{get, post, put},
    Json, Router,
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

pub const DEFAULT_CATEGORY: &str = "product_management";
pub const DEFAULT_RESULT_LIMIT: usize = 10;
pub const MAX_BATCH_DOMAINS: usize = 50;

/// Dot-separated DNS labels, at least two of them.
static HOSTNAME_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?(?:\.[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?)+$")
        .expect("valid hostname regex")
});

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub finder: Arc<LeadFinder>,
    /// Write side of the credential store; the finder only reads.
    pub credentials: Arc<dyn CredentialStore>,
    pub searches: Arc<dyn SearchLog>,
    pub outreach: Arc<OutreachConfig>,
}

#[derive(Debug, Deserialize)]
pub struct LeadSearchRequest {
    pub domain: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub custom_subject: Option<String>,
    #[serde(default)]
    pub resume_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LeadSearchResponse {
    pub domain: String,
    pub category: String,
    pub source: LeadSource,
    pub total_found: usize,
    pub after_filter: usize,
    pub leads: Vec<RankedContact>,
    pub drafts: Vec<EmailDraft>,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advisory: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BatchSearchRequest {
    pub domains: Vec<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub custom_subject: Option<String>,
    #[serde(default)]
    pub resume_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BatchSkip {
    pub domain: String,
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct BatchSearchResponse {
    pub category: String,
    pub domains_requested: usize,
    pub results: Vec<LeadSearchResponse>,
    pub skipped: Vec<BatchSkip>,
    /// Drafted leads across every domain.
    pub total_leads: usize,
}

#[derive(Debug, Deserialize)]
pub struct CredentialRequest {
    pub api_key: String,
    /// Client secret, only meaningful for Snov.
    #[serde(default)]
    pub secret: Option<String>,
}

/// API routes without transport middleware. `main` adds rate limiting,
/// body limits, tracing and CORS on top.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(api_routes())
        .with_state(state)
}

pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/v1/users/:user_id/leads", post(search_leads))
        .route("/api/v1/users/:user_id/leads/batch", post(batch_search))
        .route("/api/v1/users/:user_id/providers", get(provider_status))
        .route("/api/v1/users/:user_id/usage", get(usage_totals))
        .route(
            "/api/v1/users/:user_id/credentials/:provider",
            put(store_credential),
        )
}

/// Health check endpoint.
pub async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "pm-outreach",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

/// Settings shared by every domain of one search request.
struct SearchOptions {
    category: String,
    limit: usize,
    custom_subject: Option<String>,
    resume_url: Option<String>,
}

impl SearchOptions {
    fn new(
        category: Option<&str>,
        limit: Option<usize>,
        custom_subject: Option<String>,
        resume_url: Option<String>,
    ) -> Self {
        Self {
            category: category
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .unwrap_or(DEFAULT_CATEGORY)
                .to_string(),
            limit: limit.unwrap_or(DEFAULT_RESULT_LIMIT).clamp(1, 100),
            custom_subject,
            resume_url,
        }
    }
}

/// POST /api/v1/users/:user_id/leads
///
/// Finds contacts for a company domain, filters them against the category's
/// roles, ranks by seniority and drafts an email for each of the top results.
pub async fn search_leads(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<i64>,
    headers: HeaderMap,
    Json(request): Json<LeadSearchRequest>,
) -> Result<Json<LeadSearchResponse>, AppError> {
    authorize(&state, &headers)?;

    let options = SearchOptions::new(
        request.category.as_deref(),
        request.limit,
        request.custom_subject,
        request.resume_url,
    );
    let response = search_domain(&state, user_id, &request.domain, &options).await?;
    Ok(Json(response))
}

/// POST /api/v1/users/:user_id/leads/batch
///
/// Runs the single-domain search for each domain in turn. Domains that
/// fail are logged and reported under `skipped`; the rest still run.
pub async fn batch_search(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<i64>,
    headers: HeaderMap,
    Json(request): Json<BatchSearchRequest>,
) -> Result<Json<BatchSearchResponse>, AppError> {
    authorize(&state, &headers)?;

    let domains: Vec<&str> = request
        .domains
        .iter()
        .map(|d| d.trim())
        .filter(|d| !d.is_empty())
        .collect();
    if domains.is_empty() {
        return Err(AppError::BadRequest(
            "Provide at least one company domain".to_string(),
        ));
    }
    if domains.len() > MAX_BATCH_DOMAINS {
        return Err(AppError::BadRequest(format!(
            "A batch accepts at most {} domains",
            MAX_BATCH_DOMAINS
        )));
    }

    let options = SearchOptions::new(
        request.category.as_deref(),
        request.limit,
        request.custom_subject,
        request.resume_url,
    );
    tracing::info!(
        "Batch search of {} domains ({}) by user {}",
        domains.len(),
        options.category,
        user_id
    );

    let mut results = Vec::with_capacity(domains.len());
    let mut skipped = Vec::new();
    for domain in &domains {
        match search_domain(&state, user_id, domain, &options).await {
            Ok(response) => results.push(response),
            Err(e) => {
                tracing::warn!("Skipping {} in batch for user {}: {}", domain, user_id, e);
                skipped.push(BatchSkip {
                    domain: domain.to_string(),
                    error: e.to_string(),
                });
            }
        }
    }

    let total_leads = results.iter().map(|r| r.drafts.len()).sum();
    tracing::info!(
        "Batch complete for user {}: {} leads from {} domains, {} skipped",
        user_id,
        total_leads,
        results.len(),
        skipped.len()
    );

    Ok(Json(BatchSearchResponse {
        category: options.category,
        domains_requested: domains.len(),
        results,
        skipped,
        total_leads,
    }))
}

/// Runs one search and leaves a row in the search log whatever the outcome.
async fn search_domain(
    state: &AppState,
    user_id: i64,
    input: &str,
    options: &SearchOptions,
) -> Result<LeadSearchResponse, AppError> {
    let result = run_search(state, user_id, input, options).await;

    let record = match &result {
        Ok(response) => SearchRecord::succeeded(
            user_id,
            &response.domain,
            &options.category,
            response.drafts.len(),
        ),
        Err(e) => SearchRecord::failed(user_id, input.trim(), &options.category, e.to_string()),
    };
    if let Err(e) = state.searches.record_search(record).await {
        tracing::error!("Failed to record search for user {}: {}", user_id, e);
    }

    result
}

async fn run_search(
    state: &AppState,
    user_id: i64,
    input: &str,
    options: &SearchOptions,
) -> Result<LeadSearchResponse, AppError> {
    let domain = normalize_domain(input)?;
    let category = options.category.clone();

    tracing::info!("Lead search for {} ({}) by user {}", domain, category, user_id);

    let lookup = state.finder.lookup(&domain, &category, user_id).await;
    let found = dedupe_contacts(lookup.contacts);
    let total_found = found.len();

    let outreach = &state.outreach;
    let filtered = filter_contacts(
        &found,
        outreach.roles_for(&category),
        &outreach.excluded_roles,
        outreach.min_email_confidence,
    );
    let after_filter = filtered.len();

    let mut ranked = rank_contacts(&filtered);
    let summary = format_summary(total_found, after_filter, &ranked, options.limit);
    ranked.truncate(options.limit);

    let mut settings = DraftSettings::from_config(outreach, &category);
    settings.custom_subject = options.custom_subject.clone();
    settings.resume_url = options.resume_url.clone();
    let drafts = generate_drafts(&ranked, &settings);

    let advisory = match lookup.source {
        LeadSource::NoProviders => Some(
            "No lead providers configured. Add an API key for hunter, apollo, snov or findthatlead."
                .to_string(),
        ),
        LeadSource::Exhausted => {
            let enabled = state.finder.enabled_providers(user_id).await;
            let names: Vec<&str> = enabled.iter().map(|k| k.as_str()).collect();
            Some(format!(
                "No leads found for {} using providers: {}. The domain may have no public contacts, \
                 the providers may be rate limited, or more API keys could be added.",
                domain,
                names.join(", ")
            ))
        }
        _ if total_found > 0 && after_filter == 0 => Some(format!(
            "Found {} contacts but none matched the target roles for {}",
            total_found, category
        )),
        _ => None,
    };

    Ok(LeadSearchResponse {
        domain,
        category,
        source: lookup.source,
        total_found,
        after_filter,
        leads: ranked,
        drafts,
        summary,
        advisory,
    })
}

/// GET /api/v1/users/:user_id/providers
pub async fn provider_status(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<i64>,
    headers: HeaderMap,
) -> Result<Json<Vec<ProviderStatus>>, AppError> {
    authorize(&state, &headers)?;
    Ok(Json(state.finder.provider_status(user_id).await))
}

/// GET /api/v1/users/:user_id/usage
pub async fn usage_totals(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<i64>,
    headers: HeaderMap,
) -> Result<Json<UsageTotals>, AppError> {
    authorize(&state, &headers)?;
    Ok(Json(state.searches.usage_totals(user_id).await?))
}

/// PUT /api/v1/users/:user_id/credentials/:provider
///
/// Checks the key against the provider before storing it. Keys the provider
/// explicitly rejects are refused; keys that cannot be checked are stored.
pub async fn store_credential(
    State(state): State<Arc<AppState>>,
    Path((user_id, provider)): Path<(i64, String)>,
    headers: HeaderMap,
    Json(request): Json<CredentialRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    authorize(&state, &headers)?;

    let kind: ProviderKind = provider.parse().map_err(AppError::BadRequest)?;
    let config = ProviderConfig::new(Some(request.api_key), request.secret);
    if !config.enabled {
        return Err(AppError::BadRequest("api_key cannot be blank".to_string()));
    }
    if kind == ProviderKind::Snov && config.secondary_secret.is_none() {
        return Err(AppError::BadRequest("snov requires a client secret".to_string()));
    }

    let validation = match state.finder.registry().get(kind) {
        Some(adapter) => adapter.validate_key(&config).await,
        None => KeyValidation::Unverified("provider not registered".to_string()),
    };
    match &validation {
        KeyValidation::Invalid => {
            tracing::warn!("Rejected {} key for user {}", kind, user_id);
            return Err(AppError::BadRequest(format!("The {} API key was rejected", kind)));
        }
        KeyValidation::Unverified(reason) => {
            tracing::info!("Storing unverified {} key for user {}: {}", kind, user_id, reason)
        }
        KeyValidation::Verified => tracing::info!("Verified {} key for user {}", kind, user_id),
    }

    let store_error = |e: CredentialError| {
        tracing::error!("Failed to store {} credentials for user {}: {}", kind, user_id, e);
        AppError::InternalError("Failed to store credentials".to_string())
    };
    state
        .credentials
        .set(user_id, CredentialKey::ApiKey(kind), &config.api_key)
        .await
        .map_err(store_error)?;
    if let (ProviderKind::Snov, Some(secret)) = (kind, config.secondary_secret.as_deref()) {
        state
            .credentials
            .set(user_id, CredentialKey::SnovSecret, secret)
            .await
            .map_err(store_error)?;
    }

    Ok(Json(json!({
        "provider": kind,
        "stored": true,
        "verified": matches!(validation, KeyValidation::Verified),
    })))
}

/// Validates the `Authorization: Bearer` header against the configured token.
fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), AppError> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::Unauthorized("Missing bearer token".to_string()))?;

    if !constant_time_compare(token.trim(), &state.config.api_token) {
        tracing::warn!("Invalid API token received");
        return Err(AppError::Unauthorized("Invalid API token".to_string()));
    }

    Ok(())
}

fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.as_bytes()
        .iter()
        .zip(b.as_bytes().iter())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

/// Reduces user input such as `https://www.Acme.com/about` to a bare
/// lower-case hostname (`www.acme.com`).
pub fn normalize_domain(input: &str) -> Result<String, AppError> {
    let compact: String = input.split_whitespace().collect::<String>().to_lowercase();

    let host = if compact.contains("://") {
        url::Url::parse(&compact)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_default()
    } else {
        compact
            .split(['/', '?', '#'])
            .next()
            .unwrap_or_default()
            .to_string()
    };
    let host = host.trim_end_matches('.').to_string();

    if !HOSTNAME_REGEX.is_match(&host) {
        return Err(AppError::BadRequest(format!(
            "'{}' is not a valid company domain",
            input.trim()
        )));
    }

    Ok(host)
}
