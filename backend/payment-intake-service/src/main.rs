use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use event_log::{EventPublisher, KafkaPublisher};
use payment_intake_service::{configure, AppState, IntakeConfig};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[actix_web::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,payment_intake_service=debug,event_log=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting payment-intake-service");

    let config = IntakeConfig::from_env().context("Failed to load configuration")?;

    let publisher: Arc<dyn EventPublisher> = Arc::new(
        KafkaPublisher::new(config.producer_config()).context("Failed to create Kafka publisher")?,
    );
    let state = web::Data::new(AppState::new(Arc::clone(&publisher)));

    tracing::info!("Starting HTTP server on {}:{}", config.host, config.port);

    // actix handles SIGINT/SIGTERM and returns once workers have stopped
    let served = HttpServer::new(move || {
        App::new()
            .wrap(tracing_actix_web::TracingLogger::default())
            .app_data(state.clone())
            .configure(configure)
    })
    .bind((config.host.as_str(), config.port))
    .context("Failed to bind HTTP server")?
    .run()
    .await;

    if let Err(e) = publisher.close().await {
        tracing::warn!(error = %e, "Publisher did not close cleanly");
    }

    tracing::info!("payment-intake-service stopped");
    served.context("HTTP server error")
}
