use std::sync::Arc;

use anyhow::Result;
use axum::http::HeaderValue;
use opensase_storefront::config::Config;
use opensase_storefront::integrations::{
    DelayedDispatch, EmailJsClient, EventBus, NoopDispatcher, ObjectStorage, QstashClient, S3Storage, SignatureVerifier,
    UnconfiguredStorage,
};
use opensase_storefront::services::{Collaborators, ReminderSettings, Services, TokenService};
use opensase_storefront::store::Repositories;
use opensase_storefront::{router, AppState};
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn cors(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }
    let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| HeaderValue::from_str(o).ok()).collect();
    CorsLayer::new().allow_origin(allowed).allow_methods(Any).allow_headers(Any)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())).with(tracing_subscriber::fmt::layer()).init();
    let config = Config::from_env()?;

    let db = PgPoolOptions::new().max_connections(10).connect(&config.database_url).await?;
    sqlx::migrate!("./migrations").run(&db).await?;
    let repos = Repositories::postgres(db);

    let dispatcher: Arc<dyn DelayedDispatch> = match (QstashClient::from_config(&config.qstash), &config.app_base_url) {
        (Some(client), Some(_)) => Arc::new(client),
        _ => {
            tracing::warn!("QSTASH_TOKEN or APP_BASE_URL missing, payment reminders disabled");
            Arc::new(NoopDispatcher)
        }
    };
    let storage: Arc<dyn ObjectStorage> = match S3Storage::from_config(&config.s3).await {
        Some(s3) => Arc::new(s3),
        None => {
            tracing::warn!("S3 bucket not configured, uploads disabled");
            Arc::new(UnconfiguredStorage)
        }
    };
    let collaborators = Collaborators {
        dispatcher,
        email: Arc::new(EmailJsClient::new(config.emailjs.clone())),
        storage,
        events: EventBus::connect(config.nats_url.as_deref()).await,
    };
    let reminders = ReminderSettings { app_base_url: config.app_base_url.clone(), delays_secs: config.reminder_delays_secs.clone() };
    let services = Services::new(repos, collaborators, TokenService::new(&config.jwt_secret, config.jwt_ttl_secs), reminders);

    services.catalog.ensure_default_categories().await?;

    let verifier = SignatureVerifier::from_config(&config.qstash);
    if !verifier.is_enabled() {
        tracing::warn!("QStash signing keys not configured, webhook signatures are not checked");
    }

    let app = router(AppState::new(services, verifier)).layer(cors(&config.cors_origins));

    tracing::info!("OpenSASE Storefront listening on 0.0.0.0:{}", config.port);
    axum::serve(tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?, app).await?;
    Ok(())
}
