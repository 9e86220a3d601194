use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lead_intake_api::config::Config;
use lead_intake_api::db::Database;
use lead_intake_api::handlers::{self, AppState};
use lead_intake_api::kv::MokaKvStore;
use lead_intake_api::lead_store::PgLeadStore;
use lead_intake_api::notifications::{AirtableClient, EmailNotifier};
use lead_intake_api::rate_limit::RateLimitConfig;
use lead_intake_api::retry_client::RetryClient;
use lead_intake_api::submission::SubmissionPipeline;
use lead_intake_api::turnstile::TurnstileClient;

/// Main entry point for the application.
///
/// Initializes logging, configuration, the database pool, the rate-limit
/// store, the external API clients, and the HTTP routes, then starts the
/// Axum server.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lead_intake_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize database connection pool and run migrations
    let db = Database::new(&config.database_url).await?;
    tracing::info!("Database connection pool established");

    // Rate-limit counter store (per-entry TTL, one entry per identifier)
    let kv = Arc::new(MokaKvStore::new(100_000));
    tracing::info!("Rate limit store initialized");

    let retry = RetryClient::new();

    let turnstile = TurnstileClient::new(retry.clone(), config.turnstile_verify_url.clone());

    let mut pipeline = SubmissionPipeline::new(turnstile, Arc::new(PgLeadStore::new(db.pool.clone())))
        .with_kv(kv)
        .with_rate_limit(RateLimitConfig {
            window_secs: config.rate_limit_window_secs,
            max_requests: config.rate_limit_max_requests,
        });

    if let Some(ref secret) = config.turnstile_secret_key {
        pipeline = pipeline.with_turnstile_secret(secret.clone());
    }

    if config.email_configured() {
        let email = EmailNotifier::new(
            retry.clone(),
            config.resend_api_url.clone(),
            config.resend_api_key.clone().unwrap_or_default(),
            config.resend_from_email.clone().unwrap_or_default(),
            config.resend_to_email.clone().unwrap_or_default(),
        );
        pipeline = pipeline.with_email(email);
        tracing::info!("Resend notifier initialized");
    }

    if config.airtable_configured() {
        let airtable = AirtableClient::new(
            retry.clone(),
            config.airtable_api_url.clone(),
            config.airtable_api_key.clone().unwrap_or_default(),
            config.airtable_base_id.clone().unwrap_or_default(),
            config.airtable_table_name.clone().unwrap_or_default(),
        );
        pipeline = pipeline.with_airtable(airtable);
        tracing::info!("Airtable sync initialized");
    }

    let app_state = Arc::new(AppState { pipeline });

    // Configure IP throttling: 10 requests/second per IP, burst of 20
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(10)
            .burst_size(20)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .unwrap(),
    );

    // Build protected routes with security layers
    let protected_routes = Router::new()
        .route("/api/v1/:locale/leads", post(handlers::submit_lead))
        .layer(
            ServiceBuilder::new()
                // Request size limit: 64KB max payload (form posts are small)
                .layer(RequestBodyLimitLayer::new(64 * 1024))
                // IP throttling in front of the per-email rate limiter
                .layer(GovernorLayer {
                    config: governor_conf,
                }),
        );

    // Build final app with health check (bypasses IP throttling)
    let app = Router::new()
        .route("/health", get(handlers::health))
        .merge(protected_routes)
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
