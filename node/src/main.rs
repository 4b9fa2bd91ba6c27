// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use std::collections::HashMap;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use eventagg::aggregator::{Aggregator, Collector, Registry};
use eventagg::mq::Queue;
use eventagg::persistence::file::{Config as PersistenceConfig, FilePersistence};

use eventagg_node::config::NodeConfig;
use eventagg_node::server::{build_router, AppState};
use eventagg_node::telemetry;

#[tokio::main]
async fn main() {
    telemetry::init_telemetry();

    let cfg = NodeConfig::from_env();
    tracing::info!(?cfg, "initializing eventagg node");

    std::fs::create_dir_all(&cfg.data_dir).expect("failed to create data directory");
    let persistence = Arc::new(
        FilePersistence::new(PersistenceConfig {
            data_dir: cfg.data_dir.clone(),
            count: cfg.shard_count,
        })
        .expect("failed to set up persistence"),
    );

    let queue = Arc::new(Queue::new());
    queue
        .subscribe(persistence.clone())
        .expect("failed to subscribe persistence");

    let registry = Registry::with_builtins().expect("failed to build aggregator registry");
    let mut views: HashMap<String, Arc<dyn Aggregator>> = HashMap::new();
    let mut aggregators: Vec<Arc<dyn Aggregator>> = Vec::new();
    for spec in &cfg.aggregators {
        let aggregator = registry
            .create(&spec.name, &spec.params)
            .expect("failed to create aggregator");
        queue
            .subscribe(aggregator.clone())
            .expect("failed to subscribe aggregator");
        if views.insert(spec.alias.clone(), aggregator.clone()).is_some() {
            panic!("duplicate view alias: {}", spec.alias);
        }
        aggregators.push(aggregator);
    }

    let shutdown = CancellationToken::new();
    let consumer = {
        let queue = Arc::clone(&queue);
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(err) = queue.run(shutdown).await {
                tracing::error!(%err, "dispatch queue stopped");
            }
        })
    };

    let state = Arc::new(AppState {
        queue: Arc::clone(&queue),
        views,
    });
    let app = build_router(state);

    tracing::info!("listening on {}", cfg.bind_addr);
    let listener = TcpListener::bind(cfg.bind_addr)
        .await
        .expect("failed to bind");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await
        .expect("server failed");

    // drain: stop dispatch first, then cascade-close the write path
    shutdown.cancel();
    if let Err(err) = consumer.await {
        tracing::error!(%err, "dispatch consumer panicked");
    }
    if let Err(err) = persistence.close().await {
        tracing::warn!(%err, "failed to close persistence");
    }
    for aggregator in aggregators {
        if let Err(err) = aggregator.close().await {
            tracing::warn!(%err, "failed to close aggregator");
        }
    }
}

async fn shutdown_signal(shutdown: CancellationToken) {
    if tokio::signal::ctrl_c().await.is_err() {
        tracing::warn!("failed to listen for shutdown signal");
        return;
    }
    shutdown.cancel();
}
