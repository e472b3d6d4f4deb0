use actix::prelude::*;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod actors;
mod api;
mod config;
mod domain;
mod messaging;
mod metrics;
mod pipeline;
mod store;
mod utils;

use actors::{DlqActor, GetDlqStats, HealthMonitorActor};
use api::AppState;
use config::AppConfig;
use messaging::{Broker, Dispatcher, MessageHandler, OrderPublisher, RedpandaClient, RedpandaSubscription, SubscriptionSettings};
use pipeline::ConsumerPipeline;
use store::{DocumentStoreAdapter, ObjectStoreAdapter};

#[actix::main]
async fn main() -> anyhow::Result<()> {
    // Default to INFO, crate at DEBUG; override with RUST_LOG
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,order_fanout=debug")))
        .init();

    let config = AppConfig::from_env()?;
    tracing::info!(
        topic = %config.broker.topic,
        subscriptions = ?[&config.consumers.document_subscription, &config.consumers.object_subscription],
        "Starting order fan-out"
    );

    // === 1. Metrics ===
    let metrics = Arc::new(metrics::Metrics::new()?);
    tracing::info!("Metrics registry created with {} metrics", metrics.registry().gather().len());

    // === 2. Broker producer (with circuit breaker) ===
    let redpanda = Arc::new(RedpandaClient::new(&config.broker)?);
    let broker: Arc<dyn Broker> = redpanda.clone();

    // === 3. Stores ===
    let documents = store::connect_document_store(&config.document_store).await?;
    let blobs = store::connect_blob_store(&config.object_store).await?;

    // === 4. Infrastructure actors ===
    let health = HealthMonitorActor::new()
        .watch_broker(redpanda.clone())
        .with_metrics(metrics.clone())
        .start();
    let dlq = DlqActor::new(broker.clone()).with_metrics(metrics.clone()).start();

    // === 5. Consumer pipelines, one per subscription ===
    let document_subscription = config.consumers.document_subscription.clone();
    let object_subscription = config.consumers.object_subscription.clone();

    let document_pipeline: Arc<dyn MessageHandler> = Arc::new(
        ConsumerPipeline::new(&document_subscription, DocumentStoreAdapter::new(documents))
            .with_metrics(metrics.clone()),
    );
    let object_pipeline: Arc<dyn MessageHandler> = Arc::new(
        ConsumerPipeline::new(&object_subscription, ObjectStoreAdapter::new(blobs)).with_metrics(metrics.clone()),
    );

    let subscription_a = RedpandaSubscription::new(
        SubscriptionSettings::from_config(&config, &document_subscription),
        dlq.clone(),
    )
    .with_health_monitor(health.clone());
    let subscription_b = RedpandaSubscription::new(
        SubscriptionSettings::from_config(&config, &object_subscription),
        dlq.clone(),
    )
    .with_health_monitor(health.clone());

    // === 6. Publish endpoint ===
    let publisher = Arc::new(OrderPublisher::new(broker, config.broker.topic.clone()).with_metrics(metrics.clone()));
    let state = AppState {
        publisher,
        health,
        metrics,
    };

    let outcome: anyhow::Result<()> = tokio::select! {
        result = subscription_a.serve(document_pipeline) => {
            result.map_err(|e| anyhow::anyhow!("{} stopped: {}", subscription_a.subscription(), e))
        }
        result = subscription_b.serve(object_pipeline) => {
            result.map_err(|e| anyhow::anyhow!("{} stopped: {}", subscription_b.subscription(), e))
        }
        result = api::start_http_server(state, &config.http.host, config.http.port) => {
            result.map_err(anyhow::Error::from)
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown requested");
            Ok(())
        }
    };

    match dlq.send(GetDlqStats).await {
        Ok(stats) => tracing::info!(
            dead_lettered = stats.total_messages,
            by_subscription = ?stats.by_subscription,
            "Shutting down"
        ),
        Err(e) => tracing::warn!(error = %e, "DLQ actor unavailable at shutdown"),
    }

    outcome
}
