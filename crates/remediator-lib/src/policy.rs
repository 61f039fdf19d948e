//! Health-evaluation policies
//!
//! Each remediator binds one policy: a pure predicate over a single pod
//! observation plus the server-side selectors used for its full sweep.
//! Evaluation is stateless; a pod flapping between Terminated-with-error and
//! Waiting-with-CrashLoopBackOff is simply judged per observation.

use crate::driver::ReconcileMode;
use crate::models::{ActionKind, ListFilter, PodPhase, PodView};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::time::Duration as StdDuration;

const CRASH_LOOP_BACK_OFF: &str = "CrashLoopBackOff";

/// Pod failure reasons caused by node-level resource exhaustion. Compared
/// case-insensitively because clusters report OutOfCPU, OutOfcpu, Outofmemory.
const EXHAUSTION_REASONS: [&str; 2] = ["outofcpu", "outofmemory"];

fn default_opt_in_label() -> String {
    "kube-remediator/OldPodDeleter".to_string()
}

fn default_opt_out_annotation() -> String {
    "kube-remediator/CrashLoopBackOffRemediator".to_string()
}

fn default_max_age_hours() -> i64 {
    24
}

fn default_interval_secs() -> u64 {
    3600
}

fn default_failure_threshold() -> i32 {
    5
}

fn default_grace_minutes() -> i64 {
    5
}

/// Config for deleting old pods that opted in via label.
#[derive(Debug, Clone, Deserialize)]
pub struct OldPodConfig {
    #[serde(default = "default_opt_in_label")]
    pub label: String,
    #[serde(default = "default_max_age_hours")]
    pub max_age_hours: i64,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default)]
    pub namespace: String,
}

impl Default for OldPodConfig {
    fn default() -> Self {
        Self {
            label: default_opt_in_label(),
            max_age_hours: default_max_age_hours(),
            interval_secs: default_interval_secs(),
            namespace: String::new(),
        }
    }
}

/// Config for deleting stale completed pods.
#[derive(Debug, Clone, Deserialize)]
pub struct CompletedPodConfig {
    #[serde(default = "default_max_age_hours")]
    pub max_age_hours: i64,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default)]
    pub namespace: String,
}

impl Default for CompletedPodConfig {
    fn default() -> Self {
        Self {
            max_age_hours: default_max_age_hours(),
            interval_secs: default_interval_secs(),
            namespace: String::new(),
        }
    }
}

/// Config for rescheduling pods stuck in CrashLoopBackOff.
///
/// The annotation is an opt-out: pods are remediated unless they carry it
/// with the value `"false"`.
#[derive(Debug, Clone, Deserialize)]
pub struct CrashLoopConfig {
    #[serde(default = "default_opt_out_annotation")]
    pub annotation: String,
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: i32,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub recreate: bool,
}

impl Default for CrashLoopConfig {
    fn default() -> Self {
        Self {
            annotation: default_opt_out_annotation(),
            failure_threshold: default_failure_threshold(),
            namespace: String::new(),
            recreate: false,
        }
    }
}

/// Config for rescheduling pods failed by node resource exhaustion.
#[derive(Debug, Clone, Deserialize)]
pub struct FailedPodConfig {
    #[serde(default = "default_grace_minutes")]
    pub grace_minutes: i64,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub recreate: bool,
}

impl Default for FailedPodConfig {
    fn default() -> Self {
        Self {
            grace_minutes: default_grace_minutes(),
            namespace: String::new(),
            recreate: false,
        }
    }
}

/// Closed set of health policies, one per remediator kind.
#[derive(Debug, Clone)]
pub enum HealthPolicy {
    OldPod(OldPodConfig),
    CompletedPod(CompletedPodConfig),
    CrashLoop(CrashLoopConfig),
    FailedPod(FailedPodConfig),
}

impl HealthPolicy {
    /// Namespace scope; empty string means all namespaces.
    pub fn namespace(&self) -> &str {
        match self {
            HealthPolicy::OldPod(c) => &c.namespace,
            HealthPolicy::CompletedPod(c) => &c.namespace,
            HealthPolicy::CrashLoop(c) => &c.namespace,
            HealthPolicy::FailedPod(c) => &c.namespace,
        }
    }

    /// Server-side selectors for the full sweep. Cuts the candidate set down
    /// before the client-side predicate runs.
    pub fn sweep_filter(&self) -> ListFilter {
        match self {
            HealthPolicy::OldPod(c) => ListFilter::labels(format!("{}=true", c.label)),
            HealthPolicy::CompletedPod(_) => ListFilter::fields("status.phase=Completed"),
            HealthPolicy::CrashLoop(_) => ListFilter::default(),
            HealthPolicy::FailedPod(_) => ListFilter::fields("status.phase=Failed"),
        }
    }

    /// How the driver schedules re-evaluation after the initial sweep.
    pub fn mode(&self) -> ReconcileMode {
        match self {
            HealthPolicy::OldPod(c) => ReconcileMode::Poll(StdDuration::from_secs(c.interval_secs)),
            HealthPolicy::CompletedPod(c) => {
                ReconcileMode::Poll(StdDuration::from_secs(c.interval_secs))
            }
            HealthPolicy::CrashLoop(_) | HealthPolicy::FailedPod(_) => ReconcileMode::Watch,
        }
    }

    /// Reject configurations that would make the policy inert or unsafe.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            HealthPolicy::OldPod(c) => {
                if c.label.is_empty() {
                    return Err("label must not be empty".to_string());
                }
                if c.max_age_hours <= 0 {
                    return Err("max_age_hours must be positive".to_string());
                }
                if c.interval_secs == 0 {
                    return Err("interval_secs must be positive".to_string());
                }
            }
            HealthPolicy::CompletedPod(c) => {
                if c.max_age_hours <= 0 {
                    return Err("max_age_hours must be positive".to_string());
                }
                if c.interval_secs == 0 {
                    return Err("interval_secs must be positive".to_string());
                }
            }
            HealthPolicy::CrashLoop(c) => {
                if c.annotation.is_empty() {
                    return Err("annotation must not be empty".to_string());
                }
                if c.failure_threshold < 1 {
                    return Err("failure_threshold must be at least 1".to_string());
                }
            }
            HealthPolicy::FailedPod(c) => {
                if c.grace_minutes < 0 {
                    return Err("grace_minutes must not be negative".to_string());
                }
            }
        }
        Ok(())
    }

    /// The pure predicate: decide whether this observation warrants action.
    pub fn evaluate(&self, pod: &PodView, now: DateTime<Utc>) -> Option<ActionKind> {
        match self {
            HealthPolicy::OldPod(c) => {
                let opted_in = pod.label(&c.label) == Some("true");
                if opted_in && pod.older_than(now, Duration::hours(c.max_age_hours)) {
                    Some(ActionKind::Delete)
                } else {
                    None
                }
            }
            HealthPolicy::CompletedPod(c) => {
                if pod.phase == PodPhase::Completed
                    && pod.older_than(now, Duration::hours(c.max_age_hours))
                {
                    Some(ActionKind::Delete)
                } else {
                    None
                }
            }
            HealthPolicy::CrashLoop(c) => {
                if pod.annotation(&c.annotation) == Some("false") {
                    return None; // explicitly opted out
                }
                // Deleting an unowned pod destroys it with no replacement.
                if !pod.has_owner() {
                    return None;
                }
                let crash_looping = pod.containers.iter().any(|container| {
                    container.restart_count >= c.failure_threshold
                        && container.is_waiting_with_reason(CRASH_LOOP_BACK_OFF)
                });
                if crash_looping {
                    Some(recreate_or_delete(c.recreate))
                } else {
                    None
                }
            }
            HealthPolicy::FailedPod(c) => {
                if pod.phase != PodPhase::Failed {
                    return None;
                }
                let reason = pod.reason.as_deref().unwrap_or("").to_lowercase();
                if !EXHAUSTION_REASONS.contains(&reason.as_str()) {
                    return None;
                }
                if !pod.has_owner() {
                    return None;
                }
                // Kubernetes garbage-collects failed Job pods itself.
                if pod.owned_by_kind("Job") {
                    return None;
                }
                // Grace window for manual inspection and log collection.
                if !pod.older_than(now, Duration::minutes(c.grace_minutes)) {
                    return None;
                }
                Some(recreate_or_delete(c.recreate))
            }
        }
    }
}

fn recreate_or_delete(recreate: bool) -> ActionKind {
    if recreate {
        ActionKind::DeleteAndRecreate
    } else {
        ActionKind::Delete
    }
}
