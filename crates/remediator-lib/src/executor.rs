//! Applies remediation actions through the cluster client
//!
//! Failures are logged and counted but never escalated: the next sweep or
//! watch event for the same pod is the retry mechanism.

use crate::k8s::PodClient;
use crate::models::{ActionKind, RemediationAction};
use crate::observability::RemediatorMetrics;
use std::sync::Arc;
use tracing::{info, warn};

pub struct ActionExecutor {
    client: Arc<dyn PodClient>,
    remediator: &'static str,
    metrics: RemediatorMetrics,
}

impl ActionExecutor {
    pub fn new(
        client: Arc<dyn PodClient>,
        remediator: &'static str,
        metrics: RemediatorMetrics,
    ) -> Self {
        Self {
            client,
            remediator,
            metrics,
        }
    }

    /// Apply one corrective action. Logs intent before the call and outcome
    /// after; increments the remediated counter only on success.
    pub async fn apply(&self, action: &RemediationAction) {
        let pod = &action.pod;
        info!(
            remediator = self.remediator,
            name = %pod.name,
            namespace = %pod.namespace,
            action = action.kind.as_str(),
            "Remediating pod"
        );

        let result = match action.kind {
            ActionKind::Delete => self.client.delete_pod(&pod.namespace, &pod.name).await,
            ActionKind::DeleteAndRecreate => {
                self.client.recreate_pod(&pod.namespace, &pod.name).await
            }
        };

        match result {
            Ok(()) => {
                self.metrics
                    .inc_remediated(self.remediator, action.kind.as_str());
            }
            Err(error) => {
                warn!(
                    remediator = self.remediator,
                    name = %pod.name,
                    namespace = %pod.namespace,
                    action = action.kind.as_str(),
                    error = format!("{error:#}"),
                    "Error remediating pod"
                );
                self.metrics.inc_error(self.remediator);
            }
        }
    }
}
