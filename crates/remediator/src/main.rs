//! kube-remediator - cluster-side pod remediation agent
//!
//! Runs one task per enabled remediator, each sweeping and then polling or
//! watching the cluster, plus an HTTP listener for health and metrics.
//! Everything cooperates through one broadcast shutdown signal.

use anyhow::{Context, Result};
use remediator_lib::config::{RemediatorPolicy, Settings};
use remediator_lib::health::HealthRegistry;
use remediator_lib::k8s::{KubeClient, PodClient};
use remediator_lib::observability::RemediatorMetrics;
use remediator_lib::remediator::{Remediator, RemediatorKind};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting kube-remediator");

    let agent_config = config::AgentConfig::load()?;
    let settings = Settings::new(&agent_config.config_dir);
    let policy = RemediatorPolicy::load(&settings).context("loading remediator policy")?;

    let client: Arc<dyn PodClient> = Arc::new(
        KubeClient::try_default()
            .await
            .context("connecting to cluster")?,
    );
    let health_registry = HealthRegistry::new();
    let metrics = RemediatorMetrics::new();

    let (shutdown_tx, _) = broadcast::channel(1);
    let mut tasks = Vec::new();
    for kind in RemediatorKind::ALL {
        if policy.is_disabled(kind.name()) {
            info!(remediator = kind.name(), "Disabled by policy, skipping");
            continue;
        }
        health_registry.register(kind.name()).await;

        // A misconfigured remediator aborts startup rather than running.
        let remediator = Remediator::setup(
            kind,
            &settings,
            client.clone(),
            health_registry.clone(),
            metrics.clone(),
        )
        .await
        .with_context(|| format!("initializing {}", kind.name()))?;

        tasks.push(tokio::spawn(remediator.run(shutdown_tx.subscribe())));
    }
    if tasks.is_empty() {
        warn!("All remediators are disabled by policy");
    }

    health_registry.set_ready(true).await;

    let app_state = Arc::new(api::AppState::new(health_registry.clone(), metrics.clone()));
    let api_task = tokio::spawn(api::serve(
        agent_config.api_port,
        app_state,
        shutdown_tx.subscribe(),
    ));

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    info!(reason = "signal", "Shutting down");
    let _ = shutdown_tx.send(());

    // Remediator tasks observe the signal at their next suspension point.
    for task in tasks {
        let _ = task.await;
    }

    // Only the HTTP listener gets a bounded grace period.
    match tokio::time::timeout(
        Duration::from_secs(agent_config.shutdown_grace_secs),
        api_task,
    )
    .await
    {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(error))) => warn!(error = %error, "API server exited with error"),
        Ok(Err(error)) => warn!(error = %error, "API server task failed"),
        Err(_) => warn!("API server did not stop within grace period"),
    }

    info!("Shutdown complete");
    Ok(())
}
