use serde::Deserialize;

#[derive(Clone, Deserialize)]
pub struct Config {
    /// Postgres URL; the in-memory store is used when absent.
    pub database_url: Option<String>,
    pub port: u16,
    /// Bearer token required on every `/api` route.
    pub api_token: String,
    pub encryption_key: Option<String>,
    pub secret_key: Option<String>,
    pub outreach_config_path: String,
    pub provider_timeout_secs: u64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: std::env::var("DB_URL")
                .or_else(|_| std::env::var("DATABASE_URL"))
                .ok()
                .filter(|url| !url.trim().is_empty())
                .map(|url| {
                    if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
                        anyhow::bail!("DATABASE_URL must start with postgresql:// or postgres://");
                    }
                    Ok(url)
                })
                .transpose()?,
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            api_token: std::env::var("API_TOKEN")
                .map_err(|_| anyhow::anyhow!("API_TOKEN environment variable required"))
                .and_then(|token| {
                    if token.trim().is_empty() {
                        anyhow::bail!("API_TOKEN cannot be empty");
                    }
                    Ok(token)
                })?,
            encryption_key: std::env::var("ENCRYPTION_KEY")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            secret_key: std::env::var("SECRET_KEY")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            outreach_config_path: std::env::var("OUTREACH_CONFIG")
                .unwrap_or_else(|_| "outreach.toml".to_string()),
            provider_timeout_secs: std::env::var("PROVIDER_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PROVIDER_TIMEOUT_SECS must be a positive number"))?,
        };

        if config.encryption_key.is_none() && config.secret_key.is_none() {
            anyhow::bail!("ENCRYPTION_KEY or SECRET_KEY environment variable required");
        }
        if config.provider_timeout_secs == 0 {
            anyhow::bail!("PROVIDER_TIMEOUT_SECS must be greater than zero");
        }

        // Log successful configuration load (without sensitive values)
        tracing::info!("Configuration loaded successfully");
        match config.database_url {
            Some(ref url) => tracing::debug!(
                "Database host: {}",
                database_host(url).unwrap_or_else(|| "<unparsed>".to_string())
            ),
            None => tracing::warn!("No DATABASE_URL set; cache and call ledger are in-memory"),
        }
        tracing::debug!("Outreach config path: {}", config.outreach_config_path);
        tracing::debug!("Provider timeout: {}s", config.provider_timeout_secs);
        tracing::debug!("Server Port: {}", config.port);

        Ok(config)
    }
}

/// Host part of a database URL. Credentials and path never leave this function.
fn database_host(url: &str) -> Option<String> {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
}
