//! Prometheus metrics for the remediation agent
//!
//! Counters live in the global prometheus registry so the `/metrics` endpoint
//! can expose them with `prometheus::gather()`. Registered once; handles are
//! cheap clones.

use prometheus::{register_int_counter_vec, IntCounterVec};
use std::sync::OnceLock;

static GLOBAL_METRICS: OnceLock<RemediatorMetricsInner> = OnceLock::new();

struct RemediatorMetricsInner {
    pods_remediated: IntCounterVec,
    remediation_errors: IntCounterVec,
    sweeps: IntCounterVec,
}

impl RemediatorMetricsInner {
    fn new() -> Self {
        Self {
            pods_remediated: register_int_counter_vec!(
                "kube_remediator_pods_remediated_total",
                "Pods remediated, labeled by remediator and action kind",
                &["remediator", "action"]
            )
            .expect("Failed to register pods_remediated_total"),

            remediation_errors: register_int_counter_vec!(
                "kube_remediator_remediation_errors_total",
                "Remediation attempts that failed and will be retried next cycle",
                &["remediator"]
            )
            .expect("Failed to register remediation_errors_total"),

            sweeps: register_int_counter_vec!(
                "kube_remediator_sweeps_total",
                "Full reconciliation sweeps started, labeled by remediator",
                &["remediator"]
            )
            .expect("Failed to register sweeps_total"),
        }
    }
}

/// Lightweight handle to the global metrics instance.
#[derive(Clone)]
pub struct RemediatorMetrics {
    _private: (),
}

impl Default for RemediatorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl RemediatorMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(RemediatorMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &RemediatorMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    pub fn inc_remediated(&self, remediator: &str, action: &str) {
        self.inner()
            .pods_remediated
            .with_label_values(&[remediator, action])
            .inc();
    }

    pub fn inc_error(&self, remediator: &str) {
        self.inner()
            .remediation_errors
            .with_label_values(&[remediator])
            .inc();
    }

    pub fn inc_sweep(&self, remediator: &str) {
        self.inner().sweeps.with_label_values(&[remediator]).inc();
    }

    /// Current remediated count for one remediator/action pair. Test hook.
    pub fn remediated_count(&self, remediator: &str, action: &str) -> u64 {
        self.inner()
            .pods_remediated
            .with_label_values(&[remediator, action])
            .get()
    }
}
