use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Confidence assigned to contacts from providers that publish no score.
pub const DEFAULT_CONFIDENCE: u8 = 80;

/// How long a cached provider result stays valid.
pub const CACHE_TTL_DAYS: i64 = 7;

/// Placeholder used by [`Contact::full_name`] when no name parts are known.
pub const UNKNOWN_NAME: &str = "Unknown";

// ============ Providers ============

/// The lead-data providers the finder knows how to query.
///
/// Declaration order is the fixed preference order used during fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Hunter,
    Apollo,
    Snov,
    FindThatLead,
}

impl ProviderKind {
    /// Every provider, highest preference first.
    pub const ALL: [ProviderKind; 4] = [
        ProviderKind::Hunter,
        ProviderKind::Apollo,
        ProviderKind::Snov,
        ProviderKind::FindThatLead,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Hunter => "hunter",
            ProviderKind::Apollo => "apollo",
            ProviderKind::Snov => "snov",
            ProviderKind::FindThatLead => "findthatlead",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "hunter" => Ok(ProviderKind::Hunter),
            "apollo" => Ok(ProviderKind::Apollo),
            "snov" => Ok(ProviderKind::Snov),
            "findthatlead" => Ok(ProviderKind::FindThatLead),
            other => Err(format!("unknown provider '{}'", other)),
        }
    }
}

/// Per-user credentials for a single provider, resolved fresh on every search.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ProviderConfig {
    pub api_key: String,
    /// Second secret for providers with a key/secret pair (Snov client secret).
    pub secondary_secret: Option<String>,
    pub enabled: bool,
}

impl ProviderConfig {
    pub fn new(api_key: Option<String>, secondary_secret: Option<String>) -> Self {
        let api_key = api_key.map(|k| k.trim().to_string()).unwrap_or_default();
        Self {
            enabled: !api_key.is_empty(),
            api_key,
            secondary_secret: secondary_secret.filter(|s| !s.trim().is_empty()),
        }
    }

    pub fn disabled() -> Self {
        Self::default()
    }
}

// Keys must never end up in logs.
impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &"[REDACTED]")
            .field(
                "secondary_secret",
                &self.secondary_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("enabled", &self.enabled)
            .finish()
    }
}

// ============ Contacts ============

/// A normalized lead as produced by every provider adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub first_name: String,
    pub last_name: String,
    pub role: String,
    pub email: String,
    /// Estimated correctness of `email` on a 0..=100 scale.
    pub confidence: u8,
    pub company: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linkedin: Option<String>,
}

impl Contact {
    /// Builds a contact, or `None` when the email is blank.
    pub fn new(
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        role: impl Into<String>,
        email: impl Into<String>,
        confidence: u8,
        company: impl Into<String>,
    ) -> Option<Self> {
        let email = email.into().trim().to_string();
        if email.is_empty() {
            return None;
        }

        Some(Self {
            first_name: first_name.into().trim().to_string(),
            last_name: last_name.into().trim().to_string(),
            role: role.into().trim().to_string(),
            email,
            confidence: confidence.min(100),
            company: company.into().trim().to_string(),
            linkedin: None,
        })
    }

    pub fn with_linkedin(mut self, linkedin: Option<String>) -> Self {
        self.linkedin = linkedin.filter(|l| !l.trim().is_empty());
        self
    }

    pub fn full_name(&self) -> String {
        let full = format!("{} {}", self.first_name, self.last_name);
        let full = full.trim();
        if full.is_empty() {
            UNKNOWN_NAME.to_string()
        } else {
            full.to_string()
        }
    }

    /// Key used for identity comparisons between contacts.
    pub fn identity_key(&self) -> String {
        self.email.trim().to_lowercase()
    }
}

/// Maps a 0-100 integer score onto the contact scale.
pub fn confidence_from_percent(value: i64) -> u8 {
    value.clamp(0, 100) as u8
}

/// Maps a 0-1 probability onto the contact scale.
///
/// Values above 1 are assumed to already be percentages.
pub fn confidence_from_fraction(value: f64) -> u8 {
    if !value.is_finite() {
        return 0;
    }
    let percent = if value <= 1.0 { value * 100.0 } else { value };
    confidence_from_percent(percent.round() as i64)
}

/// A contact with the score it was ordered by.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankedContact {
    pub contact: Contact,
    pub score: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rank_reason: Option<String>,
}

// ============ Persistence records ============

/// One cached provider result for a `(domain, category)` pair.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub domain: String,
    pub category: String,
    /// JSON array of [`Contact`].
    pub leads_data: String,
    /// SHA-256 of `leads_data`, hex encoded.
    pub checksum: String,
    pub lead_count: i32,
    pub provider: ProviderKind,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    pub fn ttl() -> Duration {
        Duration::days(CACHE_TTL_DAYS)
    }
}

/// One provider invocation attempt, as written to the call ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallLogEntry {
    pub user_id: i64,
    pub provider: ProviderKind,
    pub domain: String,
    pub success: bool,
    pub credits_used: i32,
    pub created_at: DateTime<Utc>,
}

impl CallLogEntry {
    pub fn new(user_id: i64, provider: ProviderKind, domain: &str, success: bool) -> Self {
        Self {
            user_id,
            provider,
            domain: domain.to_string(),
            success,
            credits_used: 1,
            created_at: Utc::now(),
        }
    }
}

/// One lead search as seen by the caller, successful or not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchRecord {
    pub user_id: i64,
    pub domain: String,
    pub category: String,
    /// Contacts handed back (one draft each).
    pub lead_count: i32,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SearchRecord {
    pub fn succeeded(user_id: i64, domain: &str, category: &str, lead_count: usize) -> Self {
        Self {
            user_id,
            domain: domain.to_string(),
            category: category.to_string(),
            lead_count: i32::try_from(lead_count).unwrap_or(i32::MAX),
            success: true,
            error_message: None,
            created_at: Utc::now(),
        }
    }

    pub fn failed(user_id: i64, domain: &str, category: &str, error: impl Into<String>) -> Self {
        Self {
            user_id,
            domain: domain.to_string(),
            category: category.to_string(),
            lead_count: 0,
            success: false,
            error_message: Some(error.into()),
            created_at: Utc::now(),
        }
    }
}

// ============ Status ============

/// Lifetime search counters for one user. Only successful searches add leads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UsageTotals {
    pub total_searches: i64,
    pub failed_searches: i64,
    pub total_leads: i64,
}

/// Per-provider usage for one user in the current rate-limit window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProviderUsage {
    pub calls_today: i64,
    pub remaining_today: i64,
    pub rate_limited: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderStatus {
    pub provider: ProviderKind,
    pub enabled: bool,
    pub credits_per_month: u32,
    #[serde(flatten)]
    pub usage: ProviderUsage,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_email_is_rejected() {
        assert!(Contact::new("Ada", "Lovelace", "CTO", "   ", 90, "acme").is_none());
        assert!(Contact::new("Ada", "Lovelace", "CTO", "", 90, "acme").is_none());
    }

    #[test]
    fn test_full_name_falls_back_to_placeholder() {
        let contact = Contact::new("", "", "PM", "pm@acme.com", 90, "acme").unwrap();
        assert_eq!(contact.full_name(), UNKNOWN_NAME);

        let contact = Contact::new("Ada", "", "PM", "ada@acme.com", 90, "acme").unwrap();
        assert_eq!(contact.full_name(), "Ada");

        let contact = Contact::new(" Ada ", "Lovelace", "PM", "ada@acme.com", 90, "acme").unwrap();
        assert_eq!(contact.full_name(), "Ada Lovelace");
    }

    #[test]
    fn test_identity_key_is_lowercase() {
        let contact = Contact::new("Ada", "L", "PM", " Ada@Acme.COM ", 90, "acme").unwrap();
        assert_eq!(contact.identity_key(), "ada@acme.com");
    }

    #[test]
    fn test_confidence_normalization() {
        assert_eq!(confidence_from_percent(150), 100);
        assert_eq!(confidence_from_percent(-4), 0);
        assert_eq!(confidence_from_percent(88), 88);
        assert_eq!(confidence_from_fraction(0.93), 93);
        assert_eq!(confidence_from_fraction(0.0), 0);
        assert_eq!(confidence_from_fraction(72.0), 72);
        assert_eq!(confidence_from_fraction(f64::NAN), 0);
    }

    #[test]
    fn test_provider_kind_round_trip_names() {
        for kind in ProviderKind::ALL {
            assert_eq!(kind.as_str().parse::<ProviderKind>().unwrap(), kind);
        }
        assert!("clearbit".parse::<ProviderKind>().is_err());
        assert_eq!("FindThatLead".parse::<ProviderKind>(), Ok(ProviderKind::FindThatLead));
    }

    #[test]
    fn test_provider_config_enabled_only_with_key() {
        assert!(!ProviderConfig::new(None, None).enabled);
        assert!(!ProviderConfig::new(Some("  ".into()), None).enabled);
        let config = ProviderConfig::new(Some("key".into()), Some(" ".into()));
        assert!(config.enabled);
        assert!(config.secondary_secret.is_none());
    }

    #[test]
    fn test_provider_config_debug_redacts_keys() {
        let config = ProviderConfig::new(Some("super-secret".into()), Some("other".into()));
        let printed = format!("{:?}", config);
        assert!(!printed.contains("super-secret"));
        assert!(!printed.contains("other"));
    }

    #[test]
    fn test_cache_entry_validity_boundary() {
        let now = Utc::now();
        let entry = CacheEntry {
            domain: "acme.com".into(),
            category: "pm".into(),
            leads_data: "[]".into(),
            checksum: String::new(),
            lead_count: 0,
            provider: ProviderKind::Hunter,
            created_at: now - Duration::days(7),
            expires_at: now,
        };
        assert!(!entry.is_valid_at(now));
        assert!(entry.is_valid_at(now - Duration::seconds(1)));
    }
}
