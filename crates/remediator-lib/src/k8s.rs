//! Kubernetes client boundary
//!
//! `PodClient` is the seam between the remediation core and the cluster:
//! everything above it works on `PodView` snapshots, everything below it is
//! `kube`. Tests swap in hand-rolled mocks.

use crate::models::{ContainerStateView, ContainerView, ListFilter, OwnerRef, PodPhase, PodView};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use k8s_openapi::api::core::v1::{ContainerStatus, Pod};
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::runtime::{watcher, WatchStreamExt};
use kube::Client;
use tracing::warn;

/// Unbounded, cancellable sequence of pod-update observations. Errors are
/// per-event; the underlying watcher reconnects on its own.
pub type PodStream = BoxStream<'static, Result<PodView>>;

#[async_trait]
pub trait PodClient: Send + Sync {
    /// List pods in the namespace scope (empty = all namespaces), filtered
    /// server-side. Pods missing identity fields are skipped.
    async fn list_pods(&self, namespace: &str, filter: &ListFilter) -> Result<Vec<PodView>>;

    /// Delete a pod. Deleting an already-deleted pod is not an error.
    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<()>;

    /// Delete a pod and resubmit its manifest. A pod that no longer exists
    /// is treated as already remediated.
    async fn recreate_pod(&self, namespace: &str, name: &str) -> Result<()>;

    /// Subscribe to pod updates in the namespace scope.
    async fn watch_pods(&self, namespace: &str) -> Result<PodStream>;
}

/// `PodClient` backed by a real cluster connection. Infers in-cluster config
/// or the local kubeconfig.
#[derive(Clone)]
pub struct KubeClient {
    client: Client,
}

impl KubeClient {
    pub async fn try_default() -> Result<Self> {
        let client = Client::try_default()
            .await
            .context("initializing kubernetes client")?;
        Ok(Self { client })
    }

    /// Wrap an existing connection, e.g. one backed by a mock service.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        if namespace.is_empty() {
            Api::all(self.client.clone())
        } else {
            Api::namespaced(self.client.clone(), namespace)
        }
    }
}

#[async_trait]
impl PodClient for KubeClient {
    async fn list_pods(&self, namespace: &str, filter: &ListFilter) -> Result<Vec<PodView>> {
        let mut params = ListParams::default();
        if let Some(labels) = &filter.label_selector {
            params = params.labels(labels);
        }
        if let Some(fields) = &filter.field_selector {
            params = params.fields(fields);
        }

        let pods = self
            .pods(namespace)
            .list(&params)
            .await
            .context("listing pods")?;

        let mut views = Vec::with_capacity(pods.items.len());
        for pod in &pods.items {
            match pod_view(pod) {
                Ok(view) => views.push(view),
                Err(error) => warn!(error = %error, "Skipping malformed pod in list response"),
            }
        }
        Ok(views)
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<()> {
        match self
            .pods(namespace)
            .delete(name, &DeleteParams::default())
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(response)) if response.code == 404 => Ok(()),
            Err(error) => Err(error).context("deleting pod"),
        }
    }

    async fn recreate_pod(&self, namespace: &str, name: &str) -> Result<()> {
        let api = self.pods(namespace);
        let mut pod = match api.get(name).await {
            Ok(pod) => pod,
            Err(kube::Error::Api(response)) if response.code == 404 => return Ok(()),
            Err(error) => return Err(error).context("fetching pod for recreate"),
        };

        self.delete_pod(namespace, name).await?;

        // Strip server-populated fields so the manifest is admissible again.
        pod.metadata.uid = None;
        pod.metadata.resource_version = None;
        pod.metadata.creation_timestamp = None;
        pod.metadata.deletion_timestamp = None;
        pod.metadata.deletion_grace_period_seconds = None;
        pod.metadata.managed_fields = None;
        pod.status = None;

        api.create(&PostParams::default(), &pod)
            .await
            .context("recreating pod")?;
        Ok(())
    }

    async fn watch_pods(&self, namespace: &str) -> Result<PodStream> {
        let api = self.pods(namespace);
        let stream = watcher(api, watcher::Config::default())
            .applied_objects()
            .map(|event| match event {
                Ok(pod) => pod_view(&pod),
                Err(error) => Err(anyhow::Error::new(error).context("pod watch event")),
            })
            .boxed();
        Ok(stream)
    }
}

/// Build an immutable `PodView` snapshot from an API pod object. Fails on
/// observations missing name or namespace, which callers skip with a warning.
pub fn pod_view(pod: &Pod) -> Result<PodView> {
    let name = pod
        .metadata
        .name
        .clone()
        .ok_or_else(|| anyhow!("pod observation missing name"))?;
    let namespace = pod
        .metadata
        .namespace
        .clone()
        .ok_or_else(|| anyhow!("pod observation missing namespace"))?;

    let owner_references = pod
        .metadata
        .owner_references
        .clone()
        .unwrap_or_default()
        .into_iter()
        .map(|owner| OwnerRef {
            kind: owner.kind,
            name: owner.name,
            controller: owner.controller.unwrap_or(false),
        })
        .collect();

    let status = pod.status.as_ref();
    let phase = status
        .and_then(|s| s.phase.as_deref())
        .map(PodPhase::from)
        .unwrap_or(PodPhase::Unknown);

    // Init containers first, then regular containers.
    let mut containers = Vec::new();
    for list in [
        status.and_then(|s| s.init_container_statuses.as_ref()),
        status.and_then(|s| s.container_statuses.as_ref()),
    ] {
        for container_status in list.into_iter().flatten() {
            containers.push(container_view(container_status));
        }
    }

    Ok(PodView {
        name,
        namespace,
        labels: pod.metadata.labels.clone().unwrap_or_default(),
        annotations: pod.metadata.annotations.clone().unwrap_or_default(),
        created: pod.metadata.creation_timestamp.as_ref().map(|t| t.0),
        phase,
        reason: status.and_then(|s| s.reason.clone()),
        owner_references,
        containers,
    })
}

fn container_view(status: &ContainerStatus) -> ContainerView {
    let state = match status.state.as_ref() {
        Some(state) if state.waiting.is_some() => ContainerStateView::Waiting {
            reason: state.waiting.as_ref().and_then(|w| w.reason.clone()),
        },
        Some(state) if state.running.is_some() => ContainerStateView::Running,
        Some(state) if state.terminated.is_some() => ContainerStateView::Terminated {
            reason: state.terminated.as_ref().and_then(|t| t.reason.clone()),
        },
        _ => ContainerStateView::Unknown,
    };
    ContainerView {
        name: status.name.clone(),
        restart_count: status.restart_count,
        state,
    }
}
