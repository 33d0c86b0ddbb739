use actix_web::{middleware, web, App, HttpServer};
use anyhow::{Context, Result};
use ingestion_service::config::Config;
use ingestion_service::services::{
    policy_from_config, start_from_config, DaprPublisher, GuardedForwarder, IngestPipeline,
};
use ingestion_service::{handlers, metrics, AppState};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[actix_web::main]
async fn main() -> Result<()> {
    // Initialize tracing
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,actix_web=info,ingestion_service=debug".into()),
        )
        .with(json_logs.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json_logs).then(tracing_subscriber::fmt::layer))
        .init();

    tracing::info!("Starting Ingestion Service...");

    let config = Config::from_env().context("Failed to load configuration")?;
    config.log_config();
    metrics::init();

    let publisher = DaprPublisher::from_config(&config).context("Failed to create publisher")?;
    let policy = policy_from_config(&config, &publisher).context("Invalid delivery policy")?;
    tracing::info!(
        policy = policy.name(),
        publish_url = %publisher.publish_url(),
        "Dapr publisher configured"
    );

    let forwarder = Arc::new(GuardedForwarder::new(Arc::new(publisher), policy));
    let pipeline = Arc::new(IngestPipeline::new(forwarder));

    let consumer = start_from_config(&config, pipeline.clone())
        .context("Failed to start Event Hub consumer")?;

    let state = web::Data::new(AppState::new(pipeline, &config));
    let port = config.port;

    tracing::info!("HTTP server listening on 0.0.0.0:{}", port);

    let server = HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(middleware::Logger::default())
            .configure(handlers::configure)
    })
    .bind(("0.0.0.0", port))
    .with_context(|| format!("Failed to bind HTTP server to port {}", port))?
    .run();

    let result = server.await.context("HTTP server error");

    if let Some(consumer) = consumer {
        consumer.shutdown().await;
    }
    tracing::info!("Ingestion Service stopped");

    result
}
