//! Lifecycle coordinator: wires config, store, cache, use-case,
//! consumers, and the HTTP/metrics listeners together, then runs
//! until SIGINT/SIGTERM and winds everything down under a bounded
//! deadline.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::{routing::get, Router};
use futures::future::join_all;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use order_saver::api;
use order_saver::cache::{OrderCache, RedisClient};
use order_saver::config::{AppConfig, AppEnv};
use order_saver::db::Database;
use order_saver::kafka::{MessageHandler, OrderConsumer};
use order_saver::metrics;
use order_saver::services::{
    order::DEFAULT_RETRY_COUNT, CachedOrderRepo, OrderService, OrderStore, WarmupConfig,
};
use order_saver::AppState;

const CACHE_PREFIX: &str = "order:";
const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::load().context("failed to load configuration")?;

    init_tracing(config.env);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        env = config.env.as_str(),
        "starting order service"
    );

    let metrics_handle = metrics::init_metrics()
        .map_err(|e| anyhow::anyhow!("failed to install metrics recorder: {e}"))?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Authoritative store; a connect failure is fatal.
    let db = Database::connect(&config.db, shutdown_rx.clone())
        .await
        .context("failed to connect to database")?;

    // Cache is optional: on failure, degrade to serving directly from
    // the store.
    let store: Arc<dyn OrderStore> = Arc::new(db.clone());
    let repo: Arc<dyn OrderStore> = match RedisClient::connect(config.cache.client.clone()).await {
        Ok(client) => {
            let cache = Arc::new(OrderCache::new(
                Arc::new(client),
                CACHE_PREFIX,
                config.cache.capacity,
            ));
            tracing::info!(
                capacity = config.cache.capacity,
                warmup = config.cache.warmup,
                "cache connected"
            );
            Arc::new(CachedOrderRepo::new(
                store.clone(),
                cache,
                WarmupConfig {
                    enabled: config.cache.warmup,
                },
                shutdown_rx.clone(),
            ))
        }
        Err(e) => {
            tracing::warn!(error = %e, "cache unavailable, serving directly from store");
            store.clone()
        }
    };

    let orders = Arc::new(OrderService::new(repo, DEFAULT_RETRY_COUNT));

    // Consumer workers; a create failure is fatal.
    let handler = Arc::new(MessageHandler::new(orders.clone(), shutdown_rx.clone()));
    let mut consumer_tasks = Vec::with_capacity(config.kafka.consumers);
    for worker_id in 1..=config.kafka.consumers {
        let consumer = OrderConsumer::new(&config.kafka, handler.clone(), worker_id, shutdown_rx.clone())
            .context("failed to create consumer")?;
        consumer_tasks.push(tokio::spawn(consumer.run()));
    }
    tracing::info!(workers = config.kafka.consumers, topic = %config.kafka.topic, "consumers started");

    // Read endpoint listener.
    let state = Arc::new(AppState {
        orders: orders.clone(),
    });
    let app = api::routes::create_router(state, &config.http);
    let http_addr = SocketAddr::from(([0, 0, 0, 0], config.http.port));
    let http_listener = tokio::net::TcpListener::bind(http_addr)
        .await
        .with_context(|| format!("failed to bind HTTP listener on {http_addr}"))?;
    tracing::info!(addr = %http_addr, "HTTP listener started");
    let http_task = tokio::spawn(serve_with_shutdown(http_listener, app, shutdown_rx.clone()));

    // Metrics listener.
    let metrics_app = Router::new().route(
        "/metrics",
        get(move || {
            let handle = metrics_handle.clone();
            async move { handle.render() }
        }),
    );
    let metrics_addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
    let metrics_listener = tokio::net::TcpListener::bind(metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {metrics_addr}"))?;
    tracing::info!(addr = %metrics_addr, "metrics listener started");
    let metrics_task = tokio::spawn(serve_with_shutdown(
        metrics_listener,
        metrics_app,
        shutdown_rx.clone(),
    ));

    wait_for_signal().await?;
    tracing::info!("stopping services");
    let _ = shutdown_tx.send(true);

    let wind_down = async {
        let mut tasks = consumer_tasks;
        tasks.push(http_task);
        tasks.push(metrics_task);
        let (_, disconnect) = tokio::join!(join_all(tasks), db.disconnect(SHUTDOWN_DEADLINE));
        if let Err(e) = disconnect {
            tracing::error!(error = %e, "failed to disconnect store");
        }
    };

    match tokio::time::timeout(SHUTDOWN_DEADLINE, wind_down).await {
        Ok(()) => tracing::info!("all services correctly stopped"),
        Err(_) => tracing::warn!("shutdown deadline exceeded, forced stop"),
    }

    Ok(())
}

async fn serve_with_shutdown(
    listener: tokio::net::TcpListener,
    app: Router,
    mut shutdown: watch::Receiver<bool>,
) {
    let result = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        })
        .await;
    if let Err(e) = result {
        tracing::error!(error = %e, "HTTP server terminated with error");
    }
}

/// Level and format follow the environment: debug and human-readable
/// output for `local`/`dev`, info and JSON for `prod`.
fn init_tracing(env: AppEnv) {
    let default_filter = match env {
        AppEnv::Local | AppEnv::Dev => "order_saver=debug,tower_http=debug",
        AppEnv::Prod => "order_saver=info",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    match env {
        AppEnv::Prod => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        AppEnv::Local | AppEnv::Dev => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }
}

async fn wait_for_signal() -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt()).context("failed to install SIGINT handler")?;
    let mut sigterm =
        signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;

    tokio::select! {
        _ = sigint.recv() => tracing::info!("received SIGINT"),
        _ = sigterm.recv() => tracing::info!("received SIGTERM"),
    }
    Ok(())
}
