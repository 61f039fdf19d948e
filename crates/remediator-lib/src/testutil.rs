//! Shared test doubles for the remediation core.

use crate::k8s::{PodClient, PodStream};
use crate::models::{ListFilter, PodPhase, PodView};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use futures::stream;
use futures::StreamExt;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// In-memory `PodClient` that records every destructive call.
#[derive(Default)]
pub struct MockPodClient {
    pods: Mutex<Vec<PodView>>,
    deleted: Mutex<Vec<(String, String)>>,
    recreated: Mutex<Vec<(String, String)>>,
    fail_deletes: AtomicBool,
    fail_lists: AtomicBool,
    watch: Mutex<Option<PodStream>>,
    last_filter: Mutex<Option<ListFilter>>,
}

impl MockPodClient {
    pub fn with_pods(pods: Vec<PodView>) -> Self {
        Self {
            pods: Mutex::new(pods),
            ..Self::default()
        }
    }

    pub fn deleted(&self) -> Vec<(String, String)> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn recreated(&self) -> Vec<(String, String)> {
        self.recreated.lock().unwrap().clone()
    }

    pub fn fail_deletes(&self) {
        self.fail_deletes.store(true, Ordering::SeqCst);
    }

    pub fn fail_lists(&self) {
        self.fail_lists.store(true, Ordering::SeqCst);
    }

    /// Stream handed out by the next `watch_pods` call; afterwards the watch
    /// never yields (like a quiet cluster).
    pub fn set_watch_stream(&self, stream: PodStream) {
        *self.watch.lock().unwrap() = Some(stream);
    }

    pub fn last_filter(&self) -> Option<ListFilter> {
        self.last_filter.lock().unwrap().clone()
    }
}

#[async_trait]
impl PodClient for MockPodClient {
    async fn list_pods(&self, _namespace: &str, filter: &ListFilter) -> Result<Vec<PodView>> {
        if self.fail_lists.load(Ordering::SeqCst) {
            return Err(anyhow!("list rejected"));
        }
        *self.last_filter.lock().unwrap() = Some(filter.clone());
        Ok(self.pods.lock().unwrap().clone())
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(anyhow!("delete rejected"));
        }
        self.deleted
            .lock()
            .unwrap()
            .push((namespace.to_string(), name.to_string()));
        Ok(())
    }

    async fn recreate_pod(&self, namespace: &str, name: &str) -> Result<()> {
        self.recreated
            .lock()
            .unwrap()
            .push((namespace.to_string(), name.to_string()));
        Ok(())
    }

    async fn watch_pods(&self, _namespace: &str) -> Result<PodStream> {
        match self.watch.lock().unwrap().take() {
            Some(stream) => Ok(stream),
            None => Ok(stream::pending().boxed()),
        }
    }
}

pub fn running_pod(name: &str, namespace: &str) -> PodView {
    PodView {
        name: name.to_string(),
        namespace: namespace.to_string(),
        labels: BTreeMap::new(),
        annotations: BTreeMap::new(),
        created: Some(Utc::now() - Duration::hours(1)),
        phase: PodPhase::Running,
        reason: None,
        owner_references: vec![],
        containers: vec![],
    }
}

pub fn crash_looping_pod(name: &str, namespace: &str, restart_count: i32) -> PodView {
    use crate::models::{ContainerStateView, ContainerView, OwnerRef};
    let mut pod = running_pod(name, namespace);
    pod.owner_references = vec![OwnerRef {
        kind: "ReplicaSet".to_string(),
        name: "controller".to_string(),
        controller: true,
    }];
    pod.containers = vec![ContainerView {
        name: "app".to_string(),
        restart_count,
        state: ContainerStateView::Waiting {
            reason: Some("CrashLoopBackOff".to_string()),
        },
    }];
    pod
}
