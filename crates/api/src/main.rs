//! # Channelsync API Server
//!
//! HTTP entry point for the product & inventory synchronization engine:
//!
//! - **Webhook surface**: `POST /webhook/{platform}` — verified, routed and
//!   acknowledged synchronously; processed asynchronously.
//! - **Connection lifecycle**: `/sync/connections/{id}/*` — start scans,
//!   read summaries and suggestions, confirm mappings, trigger
//!   reconciliation.
//! - **Health**: `/health`, `/ready` for probes.
//!
//! Startup builds the process-wide services once — config, Postgres pool,
//! Redis queue, credential vault, adapter registry — then starts one worker
//! pool per queue and serves until SIGTERM/ctrl-c, draining in-flight jobs
//! on the way down.

use axum::{http::StatusCode, response::IntoResponse, Json, Router};
use channelsync_catalog::store::{CatalogStore, PgCatalogStore};
use channelsync_core::activity::{ActivityLogger, ActivitySink, PgActivityRepository};
use channelsync_core::jobs::{JobQueue, RedisJobQueue};
use channelsync_core::security::CredentialVault;
use channelsync_core::{Config, CorsConfig, DatabasePool};
use channelsync_platforms::adapter::{AdapterRegistry, PlatformAdapter};
use channelsync_platforms::{CloverAdapter, ShopifyAdapter, SquareAdapter};
use channelsync_sync::{jobs as sync_jobs, queues, PushCoordinator, SyncContext, WebhookIngestor};
use redis::aio::ConnectionManager;
use std::{net::SocketAddr, sync::Arc};
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use axum::http::{HeaderName, HeaderValue, Method};
use tracing::{info, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod api_middleware;
mod error;
mod handlers;
mod health;
mod state;

use crate::handlers::{connections, webhooks};
use crate::state::AppState;

/// Builds a CORS layer from configuration settings.
fn build_cors_layer(cors_config: &CorsConfig) -> Result<CorsLayer, Box<dyn std::error::Error>> {
    let mut cors = CorsLayer::new();

    if cors_config.allowed_origins.contains(&"*".to_string()) {
        cors = cors.allow_origin(Any);
    } else {
        let origins: Result<Vec<HeaderValue>, _> = cors_config
            .allowed_origins
            .iter()
            .map(|origin| origin.parse())
            .collect();
        cors = cors.allow_origin(origins?);
    }

    if cors_config.allowed_methods.contains(&"*".to_string()) {
        cors = cors.allow_methods(Any);
    } else {
        let methods: Result<Vec<Method>, _> = cors_config
            .allowed_methods
            .iter()
            .map(|method| method.parse())
            .collect();
        cors = cors.allow_methods(methods?);
    }

    if cors_config.allowed_headers.contains(&"*".to_string()) {
        cors = cors.allow_headers(Any);
    } else {
        let headers: Result<Vec<HeaderName>, _> = cors_config
            .allowed_headers
            .iter()
            .map(|header| header.parse())
            .collect();
        cors = cors.allow_headers(headers?);
    }

    cors = cors.allow_credentials(cors_config.allow_credentials);

    if let Some(max_age) = cors_config.max_age {
        cors = cors.max_age(std::time::Duration::from_secs(max_age));
    }

    Ok(cors)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    info!("Starting Channelsync Server...");

    let config = Config::load()?;
    info!("Configuration loaded successfully");

    validate_configuration(&config)?;
    info!("Configuration validation passed");

    let db = DatabasePool::new(config.database.clone()).await?;
    info!("Database pool initialized");

    run_migrations(&db).await?;
    info!("Database migrations completed");

    let redis = init_redis(&config.redis.url).await?;
    info!("Redis connection established");

    // Process-wide services.
    let vault = Arc::new(CredentialVault::new(&config.security)?);
    let store: Arc<dyn CatalogStore> = Arc::new(PgCatalogStore::new(db.clone()));
    let activity_sink: Arc<dyn ActivitySink> =
        Arc::new(PgActivityRepository::new(db.pool.clone()));
    let activity = ActivityLogger::new(activity_sink);

    let mut adapters = AdapterRegistry::new();
    adapters.register(Arc::new(ShopifyAdapter::new(config.platforms.shopify.clone())?)
        as Arc<dyn PlatformAdapter>);
    adapters.register(Arc::new(SquareAdapter::new(config.platforms.square.clone())?)
        as Arc<dyn PlatformAdapter>);
    adapters.register(Arc::new(CloverAdapter::new(config.platforms.clover.clone())?)
        as Arc<dyn PlatformAdapter>);
    info!("Platform adapters registered");

    let sync_context = SyncContext::new(store, adapters, vault, activity);
    let queue: Arc<dyn JobQueue> = Arc::new(RedisJobQueue::new(redis.clone()));

    let coordinator = Arc::new(PushCoordinator::new(
        Arc::clone(&sync_context),
        Arc::clone(&queue),
        queues::push_operations_spec(&config.queues),
    ));
    let ingestor = Arc::new(WebhookIngestor::new(
        Arc::clone(&sync_context),
        Arc::clone(&queue),
        queues::webhook_processing_spec(&config.queues),
    ));

    // One worker pool per queue.
    let mut executors = sync_jobs::start_workers(
        Arc::clone(&sync_context),
        Arc::clone(&queue),
        Arc::clone(&coordinator),
        &config.queues,
    );
    info!("Queue workers started");

    let app_state = AppState {
        config: config.clone(),
        db,
        sync: sync_context,
        queue,
        coordinator,
        ingestor,
        scan_spec: queues::initial_scan_spec(&config.queues),
        reconciliation_spec: queues::reconciliation_spec(&config.queues),
    };

    let app = create_app(app_state)?;

    let addr = SocketAddr::new(config.server.host.parse()?, config.server.port);
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Drain the queues before exit.
    for executor in &mut executors {
        executor.stop().await;
    }

    info!("Server shutdown complete");
    Ok(())
}

fn create_app(state: AppState) -> Result<Router, Box<dyn std::error::Error>> {
    #[derive(OpenApi)]
    #[openapi(
        paths(
            health::health_check,
            health::readiness_check,
        ),
        tags(
            (name = "health", description = "Health check endpoints"),
            (name = "webhooks", description = "Platform webhook ingestion"),
            (name = "connections", description = "Connection lifecycle"),
        )
    )]
    struct ApiDoc;

    // The /sync surface requires a gateway-asserted user identity; the
    // webhook surface authenticates by signature instead.
    let sync_routes = Router::new()
        .nest("/connections", connections::connection_routes())
        .layer(axum::middleware::from_fn(
            api_middleware::user_context::user_context_middleware,
        ));

    let router = Router::new()
        .nest("/webhook", webhooks::webhook_routes())
        .nest("/sync", sync_routes)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", axum::routing::get(health::health_check))
        .route("/ready", axum::routing::get(health::readiness_check))
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn(
                    api_middleware::security_headers::security_headers_middleware,
                ))
                .layer(axum::middleware::from_fn(
                    api_middleware::request_id::request_id_middleware,
                ))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                        .on_request(DefaultOnRequest::new().level(Level::INFO))
                        .on_response(DefaultOnResponse::new().level(Level::INFO)),
                )
                .layer(CompressionLayer::new())
                .layer(build_cors_layer(&state.config.cors)?),
        )
        .with_state(state)
        .fallback(handler_404);

    Ok(router)
}

async fn handler_404() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({
            "error": "Resource not found"
        })),
    )
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "channelsync_api=debug,channelsync_sync=debug,channelsync_core=debug,tower_http=debug"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn init_redis(url: &str) -> Result<ConnectionManager, redis::RedisError> {
    let client = redis::Client::open(url)?;
    ConnectionManager::new(client).await
}

async fn run_migrations(db: &DatabasePool) -> Result<(), sqlx::Error> {
    info!("Running database migrations...");

    let migrator = sqlx::migrate!("../../migrations");
    migrator.run(&db.pool).await?;

    info!("Migrations completed successfully");
    Ok(())
}

/// Refuse to boot with insecure or malformed settings. The one place a
/// startup failure is allowed to kill the process.
fn validate_configuration(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    const DEFAULT_SECRETS: &[&str] = &[
        "change_me_in_production",
        "placeholder",
        "default",
        "secret",
    ];

    let mut errors = Vec::new();

    let is_production = Config::environment().to_lowercase() == "production";

    if config.security.credential_encryption_key.len() != 32 {
        errors.push("credential encryption key must be exactly 32 characters long".to_string());
    }
    if DEFAULT_SECRETS
        .iter()
        .any(|&s| config.security.credential_encryption_key.contains(s))
    {
        errors.push("credential encryption key contains a default/insecure value".to_string());
    }

    for (platform, endpoint) in [
        ("shopify", &config.platforms.shopify),
        ("square", &config.platforms.square),
        ("clover", &config.platforms.clover),
    ] {
        if endpoint.webhook_secret.is_empty() {
            errors.push(format!("{} webhook secret is empty", platform));
        }
        if DEFAULT_SECRETS
            .iter()
            .any(|&s| endpoint.webhook_secret == s)
        {
            errors.push(format!(
                "{} webhook secret contains a default/insecure value",
                platform
            ));
        }
    }

    if is_production && config.cors.allowed_origins.contains(&"*".to_string()) {
        errors.push("CORS allowed origins contains wildcard (*) in production".to_string());
    }

    if !errors.is_empty() {
        eprintln!("\nCONFIGURATION ISSUES DETECTED");
        eprintln!("==============================");
        for (i, error) in errors.iter().enumerate() {
            eprintln!("{}. {}", i + 1, error);
        }
        eprintln!("==============================");

        if is_production {
            return Err("configuration validation failed".into());
        }
        eprintln!("WARNING: continuing with insecure configuration in development mode\n");
    }

    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }
}
