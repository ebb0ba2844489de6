//! Slipway server: explicit construction of every component in
//! dependency order, then the worker pool and the HTTP listener.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use slipway_api::{AppState, RateLimiter};
use slipway_builder::{ContainerBuilder, GitFetcher, WorkspaceManager};
use slipway_config::Config;
use slipway_core::{DeploymentState, StatePatch};
use slipway_engine::{Engine, EngineDeps};
use slipway_logbus::LogBus;
use slipway_providers::ProviderRegistry;
use slipway_queue::{JobQueue, QueueConfig};
use slipway_store::{
    DeploymentStore, FileCredentialStore, FileDeploymentStore, FileLogStore,
};
use slipway_vault::Vault;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env().context("loading configuration")?;
    info!(
        data_dir = %config.storage.data_dir.display(),
        workers = config.worker.count,
        "starting slipway"
    );

    // Durable stores.
    let store: Arc<dyn DeploymentStore> =
        Arc::new(FileDeploymentStore::new(&config.storage.data_dir));
    let credential_store = Arc::new(FileCredentialStore::new(&config.storage.data_dir));
    let log_store = Arc::new(FileLogStore::new(&config.storage.data_dir));

    // Log bus, adapters, vault.
    let bus = Arc::new(LogBus::new(log_store));
    let registry = Arc::new(ProviderRegistry::standard());
    let vault = Arc::new(Vault::new(
        credential_store,
        registry.clone(),
        config.vault.encryption_key.as_deref(),
    ));

    // Queue, with journal recovery.
    let queue_config = QueueConfig::with_policy(
        config.worker.max_attempts,
        config.worker.job_timeout,
        config.queue.high_water,
    );
    let (queue, recovery) = JobQueue::open(
        config.storage.data_dir.join("queue.journal"),
        queue_config,
    )
    .context("opening job queue")?;
    let queue = Arc::new(queue);
    for item in &recovery.cancelled {
        // Cancel intent recorded before a crash: close the record now.
        if let Err(error) = store
            .update_state(
                item.deployment_id,
                DeploymentState::Cancelled,
                StatePatch::none(),
            )
            .await
        {
            warn!(deployment_id = %item.deployment_id, %error, "recovery cancel failed");
        }
    }

    // Builder stages and workspace hygiene.
    let workspaces = WorkspaceManager::new(&config.storage.workspace_root);
    match workspaces.sweep_orphans().await {
        Ok(0) => {}
        Ok(swept) => info!(swept, "removed orphaned workspaces"),
        Err(error) => warn!(%error, "orphan workspace sweep failed"),
    }

    // The engine, wired explicitly.
    let engine = Arc::new(Engine::new(EngineDeps {
        store: store.clone(),
        vault: vault.clone(),
        registry,
        queue: queue.clone(),
        bus: bus.clone(),
        fetcher: Arc::new(GitFetcher::new(workspaces.clone())),
        builder: Arc::new(ContainerBuilder::new(config.container.host.clone())),
        workspaces,
    }));

    let shutdown = CancellationToken::new();
    let workers = engine.spawn_workers(config.worker.count, shutdown.clone());

    // The HTTP surface.
    let state = AppState {
        store,
        bus,
        queue,
        vault,
        engine,
        limiter: Arc::new(RateLimiter::new(config.api.rate_limit_per_minute)),
    };
    let router = slipway_api::router(state);

    let addr = format!("{}:{}", config.http.host, config.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server failed")?;

    // Stop leasing, cancel in-flight pipelines, and give them a moment
    // to unwind (containers get killed on the way out).
    info!("shutting down");
    shutdown.cancel();
    if tokio::time::timeout(Duration::from_secs(30), futures::future::join_all(workers))
        .await
        .is_err()
    {
        warn!("workers did not drain in time");
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
