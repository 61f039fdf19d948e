//! Core data model: pod observations and remediation actions

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Pod lifecycle phase as reported by the API server.
///
/// `Completed` is not a phase the API documents, but clusters report it for
/// finished batch pods and the completed-pod sweep selects on it server-side,
/// so it is kept as a first-class variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Completed,
    Unknown,
}

impl From<&str> for PodPhase {
    fn from(phase: &str) -> Self {
        match phase {
            "Pending" => PodPhase::Pending,
            "Running" => PodPhase::Running,
            "Succeeded" => PodPhase::Succeeded,
            "Failed" => PodPhase::Failed,
            "Completed" => PodPhase::Completed,
            _ => PodPhase::Unknown,
        }
    }
}

/// One entry of a pod's owner chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerRef {
    pub kind: String,
    pub name: String,
    pub controller: bool,
}

/// Current state of a single container within a pod.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContainerStateView {
    Waiting { reason: Option<String> },
    Running,
    Terminated { reason: Option<String> },
    Unknown,
}

/// Per-container status snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerView {
    pub name: String,
    pub restart_count: i32,
    pub state: ContainerStateView,
}

impl ContainerView {
    /// True when the container is waiting with exactly the given reason.
    pub fn is_waiting_with_reason(&self, expected: &str) -> bool {
        matches!(&self.state, ContainerStateView::Waiting { reason: Some(r) } if r == expected)
    }
}

/// Read-only value snapshot of one pod observation.
///
/// A new `PodView` supersedes the old one on every poll tick or watch event;
/// nothing in the core retains state across observations. `containers` lists
/// init containers first, then regular containers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodView {
    pub name: String,
    pub namespace: String,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub created: Option<DateTime<Utc>>,
    pub phase: PodPhase,
    pub reason: Option<String>,
    pub owner_references: Vec<OwnerRef>,
    pub containers: Vec<ContainerView>,
}

impl PodView {
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations.get(key).map(String::as_str)
    }

    pub fn has_owner(&self) -> bool {
        !self.owner_references.is_empty()
    }

    pub fn owned_by_kind(&self, kind: &str) -> bool {
        self.owner_references.iter().any(|o| o.kind == kind)
    }

    /// True when the pod is older than `cutoff`. Pods with no creation
    /// timestamp are never considered old.
    pub fn older_than(&self, now: DateTime<Utc>, cutoff: Duration) -> bool {
        self.created.is_some_and(|created| now - created > cutoff)
    }
}

/// Server-side selectors for a pod list call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListFilter {
    pub label_selector: Option<String>,
    pub field_selector: Option<String>,
}

impl ListFilter {
    pub fn labels(selector: impl Into<String>) -> Self {
        Self {
            label_selector: Some(selector.into()),
            field_selector: None,
        }
    }

    pub fn fields(selector: impl Into<String>) -> Self {
        Self {
            label_selector: None,
            field_selector: Some(selector.into()),
        }
    }
}

/// Corrective step taken against a matched pod.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionKind {
    Delete,
    DeleteAndRecreate,
}

impl ActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::Delete => "delete",
            ActionKind::DeleteAndRecreate => "recreate",
        }
    }
}

/// Transient remediation request: produced by a policy match, consumed
/// immediately by the executor, never queued or deduplicated.
#[derive(Debug, Clone)]
pub struct RemediationAction {
    pub pod: PodView,
    pub kind: ActionKind,
}
