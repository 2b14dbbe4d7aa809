use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use db_pool::{create_pool, DbConfig};
use event_log::KafkaRecordSource;
use payment_ledger_service::{
    configure, ConsumerMetrics, LedgerConfig, PaymentConsumer, PaymentWriter, PgPaymentWriter,
};
use prometheus::Registry;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = terminate.recv() => {},
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::warn!(error = %e, "Failed to install Ctrl+C handler");
                }
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to install Ctrl+C handler");
        }
    }
}

#[actix_web::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,payment_ledger_service=debug,event_log=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting payment-ledger");

    let config = LedgerConfig::from_env().context("Failed to load configuration")?;

    let db_config = DbConfig::from_env("payment-ledger");
    db_config.log_config();
    let pool = create_pool(db_config)
        .await
        .context("Failed to create database pool")?;
    let writer: Arc<dyn PaymentWriter> = Arc::new(PgPaymentWriter::new(pool.clone()));

    let registry = Registry::new();
    let metrics = ConsumerMetrics::new(&registry).context("Failed to register consumer metrics")?;

    // Every member must be connected before any loop starts
    let kafka_config = config.kafka_consumer_config();
    let mut sources = Vec::with_capacity(config.instances());
    for instance in 0..config.instances() {
        let source = KafkaRecordSource::connect(&kafka_config)
            .await
            .with_context(|| format!("Failed to connect consumer instance {instance}"))?;
        sources.push(source);
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let signal_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("Shutdown signal received");
        let _ = signal_tx.send(true);
    });

    let mut loops = Vec::with_capacity(sources.len());
    for (instance, source) in sources.into_iter().enumerate() {
        let consumer = PaymentConsumer::new(
            source,
            Arc::clone(&writer),
            metrics.clone(),
            config.consumer_config(),
        );
        let shutdown_rx = shutdown_rx.clone();
        let stop_all = shutdown_tx.clone();

        loops.push(tokio::spawn(async move {
            let result = consumer.run(shutdown_rx).await;
            if let Err(e) = &result {
                tracing::error!(instance, error = %e, "Consumer loop failed");
                let _ = stop_all.send(true);
            }
            result
        }));
    }

    tracing::info!(
        instances = loops.len(),
        topic = %config.kafka_topic,
        group_id = %config.kafka_group_id,
        "Consumer loops started"
    );

    let registry = web::Data::new(registry);
    let server = HttpServer::new(move || {
        App::new()
            .wrap(tracing_actix_web::TracingLogger::default())
            .app_data(registry.clone())
            .configure(configure)
    })
    .bind(("0.0.0.0", config.ledger_http_port))
    .context("Failed to bind HTTP server")?
    .disable_signals()
    .run();
    let server_handle = server.handle();
    let http = tokio::spawn(server);

    tracing::info!("HTTP server listening on 0.0.0.0:{}", config.ledger_http_port);

    let mut failed = false;
    for (instance, handle) in loops.into_iter().enumerate() {
        match handle.await {
            Ok(Ok(report)) => tracing::info!(instance, ?report, "Consumer loop finished"),
            Ok(Err(_)) => failed = true,
            Err(e) => {
                tracing::error!(instance, error = %e, "Consumer task panicked");
                failed = true;
            }
        }
    }

    server_handle.stop(true).await;
    let _ = http.await;
    pool.close().await;

    tracing::info!("payment-ledger stopped");

    if failed {
        anyhow::bail!("one or more consumer loops failed");
    }
    Ok(())
}
