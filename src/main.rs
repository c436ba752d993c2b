use axum::{routing::get, Router};
use pm_outreach::cache::LeadCache;
use pm_outreach::config::Config;
use pm_outreach::credentials::{CredentialCipher, CredentialStore, MemoryCredentialStore};
use pm_outreach::db::Database;
use pm_outreach::db_storage::{PgCredentialStore, PgStore};
use pm_outreach::finder::LeadFinder;
use pm_outreach::handlers::{self, AppState};
use pm_outreach::memory_store::MemoryStore;
use pm_outreach::outreach_config::OutreachConfig;
use pm_outreach::providers::ProviderRegistry;
use pm_outreach::rate_limit::CallLedger;
use pm_outreach::usage::SearchLog;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main entry point for the application.
///
/// Initializes tracing, configuration, the stores (Postgres when
/// `DATABASE_URL` is set, in-memory otherwise), the provider registry and
/// the HTTP routes, then starts the Axum server.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pm_outreach=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let outreach = OutreachConfig::load(Path::new(&config.outreach_config_path))?;

    let cipher = CredentialCipher::from_key_material(
        config.encryption_key.as_deref(),
        config.secret_key.as_deref(),
    )?;

    let cache: Arc<dyn LeadCache>;
    let ledger: Arc<dyn CallLedger>;
    let credentials: Arc<dyn CredentialStore>;
    let searches: Arc<dyn SearchLog>;
    match config.database_url.as_deref() {
        Some(url) => {
            let db = Database::new(url).await?;
            tracing::info!("Database connection pool established");
            let store = Arc::new(PgStore::new(db.pool.clone()));
            cache = store.clone();
            ledger = store.clone();
            searches = store;
            credentials = Arc::new(PgCredentialStore::new(db.pool, cipher));
        }
        None => {
            let store = Arc::new(MemoryStore::new());
            cache = store.clone();
            ledger = store.clone();
            searches = store;
            credentials = Arc::new(MemoryCredentialStore::new(cipher));
        }
    }

    let registry =
        ProviderRegistry::with_defaults(Duration::from_secs(config.provider_timeout_secs))?;
    tracing::info!("Lead providers registered: hunter, apollo, snov, findthatlead");

    let finder = Arc::new(LeadFinder::new(
        registry,
        cache,
        ledger,
        credentials.clone(),
    ));

    let app_state = Arc::new(AppState {
        config: config.clone(),
        finder,
        credentials,
        searches,
        outreach: Arc::new(outreach),
    });

    // Configure rate limiter: 10 requests/second per IP, burst of 20
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(10)
            .burst_size(20)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .ok_or_else(|| anyhow::anyhow!("invalid rate limiter configuration"))?,
    );

    let protected_routes = handlers::api_routes().layer(
        ServiceBuilder::new()
            // Request size limit: 1MB max payload
            .layer(RequestBodyLimitLayer::new(1024 * 1024))
            .layer(GovernorLayer {
                config: governor_conf,
            }),
    );

    // Health check bypasses rate limiting
    let app = Router::new()
        .route("/health", get(handlers::health))
        .merge(protected_routes)
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?;

    Ok(())
}
