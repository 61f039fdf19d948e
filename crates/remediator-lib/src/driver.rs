//! Reconciliation driver
//!
//! Runs one remediator's scheduling model: an immediate full sweep at
//! startup, then either a fixed-interval poll loop or a continuous watch
//! subscription, until the shared shutdown signal fires. All evaluation and
//! action application is strictly sequential within one driver.

use crate::executor::ActionExecutor;
use crate::health::HealthRegistry;
use crate::k8s::{PodClient, PodStream};
use crate::models::{PodView, RemediationAction};
use crate::observability::RemediatorMetrics;
use crate::policy::HealthPolicy;
use chrono::Utc;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

/// How a remediator is re-driven after its initial sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileMode {
    Poll(Duration),
    Watch,
}

pub struct ReconcileDriver {
    client: Arc<dyn PodClient>,
    policy: HealthPolicy,
    executor: ActionExecutor,
    health: HealthRegistry,
    metrics: RemediatorMetrics,
    name: &'static str,
    /// Watch subscription constructed during setup; `None` for poll mode.
    /// Wrapped in a `Mutex` only so the driver is `Sync` despite holding a
    /// `Send`-only stream; it is never locked, only taken.
    watch: Option<tokio::sync::Mutex<PodStream>>,
}

impl ReconcileDriver {
    pub fn new(
        client: Arc<dyn PodClient>,
        policy: HealthPolicy,
        executor: ActionExecutor,
        health: HealthRegistry,
        metrics: RemediatorMetrics,
        name: &'static str,
        watch: Option<PodStream>,
    ) -> Self {
        Self {
            client,
            policy,
            executor,
            health,
            metrics,
            name,
            watch: watch.map(tokio::sync::Mutex::new),
        }
    }

    /// Blocking entry point; returning is the done signal the orchestrator
    /// joins on. Sweeps once immediately so pre-existing bad state is
    /// remediated before any tick or event is processed.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!(remediator = self.name, "Starting");

        self.sweep().await;

        let reason = match self.policy.mode() {
            ReconcileMode::Poll(every) => self.poll_loop(every, &mut shutdown).await,
            ReconcileMode::Watch => {
                let stream = match self.watch.take() {
                    Some(stream) => stream.into_inner(),
                    None => match self.client.watch_pods(self.policy.namespace()).await {
                        Ok(stream) => stream,
                        Err(err) => {
                            error!(remediator = self.name, error = format!("{err:#}"), "Error subscribing to pod updates");
                            self.health.set_unhealthy(self.name, "watch subscription failed").await;
                            let _ = shutdown.recv().await;
                            info!(remediator = self.name, reason = "signal", "Stopping");
                            return;
                        }
                    },
                };
                self.watch_loop(stream, &mut shutdown).await
            }
        };

        info!(remediator = self.name, reason, "Stopping");
    }

    async fn poll_loop(
        &self,
        every: Duration,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> &'static str {
        let mut ticker = interval(every);
        // The first tick fires immediately; the startup sweep already ran.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => self.sweep().await,
                _ = shutdown.recv() => return "signal",
            }
        }
    }

    async fn watch_loop(
        &self,
        mut stream: PodStream,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> &'static str {
        loop {
            tokio::select! {
                event = stream.next() => match event {
                    Some(Ok(pod)) => self.evaluate(&pod).await,
                    Some(Err(err)) => {
                        warn!(remediator = self.name, error = format!("{err:#}"), "Skipping bad pod update");
                    }
                    None => {
                        warn!(remediator = self.name, "Pod update stream ended");
                        self.health
                            .set_unhealthy(self.name, "pod update stream ended")
                            .await;
                        return "stream-ended";
                    }
                },
                _ = shutdown.recv() => return "signal",
            }
        }
    }

    /// One full listing and evaluation of all in-scope pods. A failed list
    /// abandons the sweep; the next cycle retries.
    async fn sweep(&self) {
        debug!(remediator = self.name, "Reconcile");
        self.metrics.inc_sweep(self.name);

        let pods = match self
            .client
            .list_pods(self.policy.namespace(), &self.policy.sweep_filter())
            .await
        {
            Ok(pods) => pods,
            Err(err) => {
                error!(remediator = self.name, error = format!("{err:#}"), "Error getting pod list");
                self.health
                    .set_degraded(self.name, format!("pod list failed: {err:#}"))
                    .await;
                return;
            }
        };
        self.health.set_healthy(self.name).await;

        for pod in &pods {
            self.evaluate(pod).await;
        }
    }

    async fn evaluate(&self, pod: &PodView) {
        if let Some(kind) = self.policy.evaluate(pod, Utc::now()) {
            let action = RemediationAction {
                pod: pod.clone(),
                kind,
            };
            self.executor.apply(&action).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::ComponentStatus;
    use crate::policy::{CompletedPodConfig, CrashLoopConfig};
    use crate::testutil::{crash_looping_pod, running_pod, MockPodClient};
    use futures::stream;
    use tokio::time::timeout;

    fn driver_for(
        client: Arc<MockPodClient>,
        policy: HealthPolicy,
        health: HealthRegistry,
    ) -> ReconcileDriver {
        let metrics = RemediatorMetrics::new();
        let executor = ActionExecutor::new(client.clone(), "TestDriver", metrics.clone());
        ReconcileDriver::new(client, policy, executor, health, metrics, "TestDriver", None)
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not met within timeout");
    }

    #[tokio::test]
    async fn test_sweep_deletes_exactly_the_unhealthy_pod() {
        let client = Arc::new(MockPodClient::with_pods(vec![
            running_pod("healthy", "default"),
            crash_looping_pod("crashing", "default", 6),
        ]));
        let policy = HealthPolicy::CrashLoop(CrashLoopConfig::default());
        let driver = driver_for(client.clone(), policy, HealthRegistry::new());

        driver.sweep().await;

        assert_eq!(
            client.deleted(),
            vec![("default".to_string(), "crashing".to_string())]
        );
    }

    #[tokio::test]
    async fn test_sweep_failure_marks_degraded_and_continues() {
        let client = Arc::new(MockPodClient::default());
        client.fail_lists();
        let health = HealthRegistry::new();
        health.register("TestDriver").await;

        let policy = HealthPolicy::CrashLoop(CrashLoopConfig::default());
        let driver = driver_for(client.clone(), policy, health.clone());
        driver.sweep().await;

        let response = health.health().await;
        assert_eq!(
            response.components["TestDriver"].status,
            ComponentStatus::Degraded
        );
        assert!(client.deleted().is_empty());
    }

    #[tokio::test]
    async fn test_poll_mode_stops_on_shutdown() {
        let client = Arc::new(MockPodClient::default());
        let policy = HealthPolicy::CompletedPod(CompletedPodConfig::default());
        let driver = driver_for(client.clone(), policy, HealthRegistry::new());

        let (tx, rx) = broadcast::channel(1);
        let handle = tokio::spawn(driver.run(rx));
        tx.send(()).unwrap();

        timeout(Duration::from_secs(1), handle)
            .await
            .expect("driver did not stop on shutdown")
            .unwrap();
    }

    #[tokio::test]
    async fn test_watch_event_triggers_action() {
        let client = Arc::new(MockPodClient::default());
        client.set_watch_stream(
            stream::iter(vec![
                Ok(running_pod("healthy", "default")),
                Ok(crash_looping_pod("crashing", "kube-system", 8)),
            ])
            .chain(stream::pending())
            .boxed(),
        );

        let policy = HealthPolicy::CrashLoop(CrashLoopConfig::default());
        let driver = driver_for(client.clone(), policy, HealthRegistry::new());

        let (tx, rx) = broadcast::channel(1);
        let handle = tokio::spawn(driver.run(rx));

        let observer = client.clone();
        wait_until(move || observer.deleted().len() == 1).await;
        assert_eq!(
            client.deleted(),
            vec![("kube-system".to_string(), "crashing".to_string())]
        );

        tx.send(()).unwrap();
        timeout(Duration::from_secs(1), handle)
            .await
            .expect("driver did not stop on shutdown")
            .unwrap();
        // No further actions after shutdown.
        assert_eq!(client.deleted().len(), 1);
    }

    #[tokio::test]
    async fn test_watch_error_is_skipped() {
        let client = Arc::new(MockPodClient::default());
        client.set_watch_stream(
            stream::iter(vec![
                Err(anyhow::anyhow!("malformed event")),
                Ok(crash_looping_pod("crashing", "default", 8)),
            ])
            .chain(stream::pending())
            .boxed(),
        );

        let policy = HealthPolicy::CrashLoop(CrashLoopConfig::default());
        let driver = driver_for(client.clone(), policy, HealthRegistry::new());

        let (tx, rx) = broadcast::channel(1);
        let handle = tokio::spawn(driver.run(rx));

        let observer = client.clone();
        wait_until(move || observer.deleted().len() == 1).await;

        tx.send(()).unwrap();
        timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_watch_stream_end_marks_unhealthy_and_stops() {
        let client = Arc::new(MockPodClient::default());
        client.set_watch_stream(stream::iter(Vec::new()).boxed());
        let health = HealthRegistry::new();
        health.register("TestDriver").await;

        let policy = HealthPolicy::CrashLoop(CrashLoopConfig::default());
        let driver = driver_for(client.clone(), policy, health.clone());

        // No shutdown is ever sent; the driver must return on its own when
        // the subscription runs dry, and flag itself instead of dying quiet.
        let (_tx, rx) = broadcast::channel(1);
        timeout(Duration::from_secs(1), tokio::spawn(driver.run(rx)))
            .await
            .expect("driver did not stop when the stream ended")
            .unwrap();

        let response = health.health().await;
        assert_eq!(
            response.components["TestDriver"].status,
            ComponentStatus::Unhealthy
        );
    }

    #[tokio::test]
    async fn test_cancelling_mid_watch_returns_promptly() {
        let client = Arc::new(MockPodClient::default());
        let policy = HealthPolicy::CrashLoop(CrashLoopConfig::default());
        let driver = driver_for(client.clone(), policy, HealthRegistry::new());

        let (tx, rx) = broadcast::channel(1);
        let handle = tokio::spawn(driver.run(rx));
        // Let the driver reach its watch suspension point, then cancel.
        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send(()).unwrap();

        timeout(Duration::from_secs(1), handle)
            .await
            .expect("driver did not stop within bounded timeout")
            .unwrap();
        assert!(client.deleted().is_empty());
    }
}
