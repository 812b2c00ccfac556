use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::{HeaderValue, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use be_email_service::{EmailConfig, HttpMailer, LoggingNotifier, Notifier};
use be_payment_service::{PaymentBridge, init_payment_service};
use be_remote_db::{DatabaseManager, MemorySiteStore, SiteStore};
use be_site_service::SiteService;
use be_storage::StorageService;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::services::ServeDir;

/// Configuration for running the monolith server.
pub struct ServerConfig {
    /// `None` runs on the non-persistent in-memory store.
    pub database_url: Option<String>,
    pub http_addr: SocketAddr,
    /// Origin allowed by CORS, the public site.
    pub site_base_url: String,
    /// Period of the in-process reconciliation sweep, off when `None`.
    pub sweep_interval: Option<Duration>,
    /// When this receiver gets a value, the server shuts down gracefully.
    pub shutdown: tokio::sync::watch::Receiver<()>,
}

impl ServerConfig {
    pub fn from_env(shutdown: tokio::sync::watch::Receiver<()>) -> Result<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|s| !s.is_empty());

        let http_addr = std::env::var("HTTP_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:3000".to_string())
            .parse::<SocketAddr>()
            .context("Invalid HTTP_ADDR format")?;

        let site_base_url = std::env::var("SITE_BASE_URL")
            .context("SITE_BASE_URL environment variable must be set")?
            .trim_end_matches('/')
            .to_string();

        let sweep_interval = parse_sweep_interval(std::env::var("SWEEP_INTERVAL_SECS").ok())?;

        Ok(Self {
            database_url,
            http_addr,
            site_base_url,
            sweep_interval,
            shutdown,
        })
    }
}

fn parse_sweep_interval(raw: Option<String>) -> Result<Option<Duration>> {
    match raw.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(raw) => {
            let secs = raw
                .parse::<u64>()
                .with_context(|| format!("SWEEP_INTERVAL_SECS '{raw}' is not a number"))?;
            Ok((secs > 0).then(|| Duration::from_secs(secs)))
        }
    }
}

fn build_cors(site_base_url: &str) -> Result<CorsLayer> {
    let origin = site_base_url
        .parse::<HeaderValue>()
        .with_context(|| format!("SITE_BASE_URL '{site_base_url}' is not a valid origin"))?;

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::exact(origin))
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request()))
}

async fn health(State(store): State<Arc<dyn SiteStore>>) -> impl IntoResponse {
    match store.ping().await {
        Ok(()) => (StatusCode::OK, Json(serde_json::json!({ "status": "ok" }))),
        Err(e) => {
            tracing::warn!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({ "status": "unavailable" })),
            )
        }
    }
}

fn health_router(store: Arc<dyn SiteStore>) -> Router {
    Router::new()
        .route("/health", get(health))
        .with_state(store)
}

/// Merges the service routers behind one CORS policy.
pub fn build_http_router(
    store: Arc<dyn SiteStore>,
    site_router: Router,
    payment_router: Router,
    site_base_url: &str,
) -> Result<Router> {
    Ok(site_router
        .merge(payment_router)
        .merge(health_router(store))
        .layer(build_cors(site_base_url)?))
}

async fn connect_store(database_url: Option<&str>) -> Result<Arc<dyn SiteStore>> {
    match database_url {
        Some(url) => {
            let db = DatabaseManager::connect()
                .database_url(url)
                .call()
                .await
                .context("Failed to connect to the database")?;
            tracing::info!("Connected to Postgres");
            Ok(Arc::new(db))
        }
        None => {
            tracing::warn!(
                "DATABASE_URL not set, using the in-memory store; sites will not survive a restart"
            );
            Ok(Arc::new(MemorySiteStore::new()))
        }
    }
}

fn build_notifier() -> Result<Arc<dyn Notifier>> {
    match EmailConfig::from_env().context("Invalid email configuration")? {
        Some(config) => {
            tracing::info!("Site ready emails go through {}", config.api_url);
            Ok(Arc::new(
                HttpMailer::new(config).context("Failed to build email client")?,
            ))
        }
        None => {
            tracing::info!("EMAIL_API_KEY not set, site ready emails are only logged");
            Ok(Arc::new(LoggingNotifier))
        }
    }
}

/// Runs the reconciliation sweep every `period` until shutdown.
pub fn spawn_sweep(
    bridge: Arc<PaymentBridge>,
    period: Duration,
    mut shutdown: tokio::sync::watch::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately; skip it so startup is not slowed.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match bridge.sweep_expired().await {
                        Ok(report) => tracing::debug!(
                            checked = report.checked,
                            recovered = report.recovered,
                            "Periodic sweep finished"
                        ),
                        Err(e) => tracing::error!("Periodic sweep failed: {}", e),
                    }
                }
                _ = shutdown.changed() => {
                    tracing::info!("Stopping periodic sweep...");
                    break;
                }
            }
        }
    })
}

pub async fn run_server(config: ServerConfig) -> Result<()> {
    if let Some(posthog_key) = std::env::var("POSTHOG_API_KEY")
        .ok()
        .filter(|s| !s.is_empty())
    {
        match posthog_rs::init_global(posthog_key.as_str()).await {
            Ok(()) => tracing::info!("PostHog analytics initialized"),
            Err(e) => tracing::warn!("Failed to initialize PostHog: {}", e),
        }
    } else {
        tracing::info!("POSTHOG_API_KEY not set, analytics disabled");
    }

    let store = connect_store(config.database_url.as_deref()).await?;
    let notifier = build_notifier()?;

    let storage = Arc::new(StorageService::from_env().context("Failed to initialize storage")?);

    let (bridge, payment_router) = init_payment_service(store.clone(), notifier)
        .context("Failed to initialize payment service")?;

    let site_service = Arc::new(
        SiteService::builder()
            .store(store.clone())
            .bridge(bridge.clone())
            .storage(storage.clone())
            .build(),
    );
    let site_router = be_site_service::create_router(site_service);

    let mut http_router =
        build_http_router(store, site_router, payment_router, &config.site_base_url)?;

    if let Some(root) = storage.fs_root() {
        tracing::info!("Serving uploaded images from {}", root);
        http_router = http_router.nest_service("/uploads", ServeDir::new(root));
    }

    let sweep_task = config
        .sweep_interval
        .map(|period| {
            tracing::info!("Periodic sweep every {:?}", period);
            spawn_sweep(bridge.clone(), period, config.shutdown.clone())
        });

    tracing::info!("Starting HTTP server at {}", config.http_addr);

    let mut http_shutdown = config.shutdown.clone();
    let http_listener = tokio::net::TcpListener::bind(config.http_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.http_addr))?;

    axum::serve(
        http_listener,
        http_router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        let _ = http_shutdown.changed().await;
        tracing::info!("Shutting down HTTP server...");
    })
    .await
    .context("HTTP server error")?;

    if let Some(task) = sweep_task
        && let Err(e) = task.await
    {
        tracing::warn!("Periodic sweep task ended abnormally: {}", e);
    }

    Ok(())
}
