//! Remediator composition and lifecycle
//!
//! A `Remediator` binds one health policy to an executor and a reconcile
//! driver. `setup` is fatal on misconfiguration so the process aborts rather
//! than running a misconfigured remediator; `run` always returns on shutdown,
//! which is the completion signal the orchestrator joins on.

use crate::config::Settings;
use crate::driver::{ReconcileDriver, ReconcileMode};
use crate::executor::ActionExecutor;
use crate::health::HealthRegistry;
use crate::k8s::PodClient;
use crate::observability::RemediatorMetrics;
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::broadcast;

/// The closed set of remediators this agent can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemediatorKind {
    OldPodDeleter,
    CompletedPodDeleter,
    CrashLoopBackOffRescheduler,
    FailedPodRescheduler,
}

impl RemediatorKind {
    pub const ALL: [RemediatorKind; 4] = [
        RemediatorKind::OldPodDeleter,
        RemediatorKind::CompletedPodDeleter,
        RemediatorKind::CrashLoopBackOffRescheduler,
        RemediatorKind::FailedPodRescheduler,
    ];

    /// Stable name used for logging, metric labels, health components and
    /// the disable policy.
    pub fn name(self) -> &'static str {
        match self {
            RemediatorKind::OldPodDeleter => "OldPodDeleter",
            RemediatorKind::CompletedPodDeleter => "CompletedPodDeleter",
            RemediatorKind::CrashLoopBackOffRescheduler => "CrashLoopBackOffRescheduler",
            RemediatorKind::FailedPodRescheduler => "FailedPodRescheduler",
        }
    }

    /// Config file stem under the configuration directory.
    pub fn config_file(self) -> &'static str {
        match self {
            RemediatorKind::OldPodDeleter => "old_pod_deleter",
            RemediatorKind::CompletedPodDeleter => "completed_pod_deleter",
            RemediatorKind::CrashLoopBackOffRescheduler => "crash_loop_back_off_rescheduler",
            RemediatorKind::FailedPodRescheduler => "failed_pod_rescheduler",
        }
    }

    /// Environment variable segment for config overrides.
    pub fn env_segment(self) -> &'static str {
        match self {
            RemediatorKind::OldPodDeleter => "OLD_POD_DELETER",
            RemediatorKind::CompletedPodDeleter => "COMPLETED_POD_DELETER",
            RemediatorKind::CrashLoopBackOffRescheduler => "CRASH_LOOP_BACK_OFF_RESCHEDULER",
            RemediatorKind::FailedPodRescheduler => "FAILED_POD_RESCHEDULER",
        }
    }
}

pub struct Remediator {
    kind: RemediatorKind,
    driver: ReconcileDriver,
}

impl Remediator {
    /// Load configuration, validate it, and construct the watch subscription
    /// for event-driven remediators. Any error here is fatal to startup.
    pub async fn setup(
        kind: RemediatorKind,
        settings: &Settings,
        client: Arc<dyn PodClient>,
        health: HealthRegistry,
        metrics: RemediatorMetrics,
    ) -> Result<Self> {
        let policy = settings.load_policy(kind)?;

        let watch = match policy.mode() {
            ReconcileMode::Watch => Some(
                client
                    .watch_pods(policy.namespace())
                    .await
                    .with_context(|| format!("subscribing to pod updates for {}", kind.name()))?,
            ),
            ReconcileMode::Poll(_) => None,
        };

        let executor = ActionExecutor::new(client.clone(), kind.name(), metrics.clone());
        let driver = ReconcileDriver::new(
            client,
            policy,
            executor,
            health,
            metrics,
            kind.name(),
            watch,
        );
        Ok(Self { kind, driver })
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    /// Drive the reconcile loop until shutdown. Intended to be spawned as an
    /// independent task; returns on every exit path.
    pub async fn run(self, shutdown: broadcast::Receiver<()>) {
        self.driver.run(shutdown).await;
    }
}
