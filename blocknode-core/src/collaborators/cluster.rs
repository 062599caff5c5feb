use super::CollaboratorError;
use crate::wait::{poll_until, DEFAULT_POLL_INTERVAL};
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Identifies a single cluster resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRef {
    /// Resource kind as understood by the API (`pvc`, `pv`, `pod`, `statefulset`, ...)
    pub kind: String,
    /// Namespace, `None` for cluster-scoped kinds such as persistent volumes
    pub namespace: Option<String>,
    pub name: String,
}

impl ResourceRef {
    pub fn namespaced(
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            namespace: Some(namespace.into()),
            name: name.into(),
        }
    }

    pub fn cluster_scoped(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            namespace: None,
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{} {}/{}", self.kind, ns, self.name),
            None => write!(f, "{} {}", self.kind, self.name),
        }
    }
}

/// Identifies a set of resources by label
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceSelector {
    pub kind: String,
    pub namespace: String,
    /// Label selector, e.g. `app.kubernetes.io/instance=block-node`
    pub labels: String,
}

impl fmt::Display for ResourceSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} in {} matching '{}'", self.kind, self.namespace, self.labels)
    }
}

/// Condition a wait polls for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceCondition {
    /// The resource exists
    Exists,
    /// The resource no longer exists
    Deleted,
    /// A persistent volume claim reports `status.phase == Bound`
    PvcBound,
    /// A pod reports a `Ready` condition with status `True`
    PodReady,
}

impl ResourceCondition {
    /// Evaluates the condition against one resource lookup (`None` = not found).
    pub fn is_met(&self, resource: Option<&Value>) -> bool {
        match (self, resource) {
            (ResourceCondition::Deleted, None) => true,
            (ResourceCondition::Deleted, Some(_)) => false,
            (_, None) => false,
            (ResourceCondition::Exists, Some(_)) => true,
            (ResourceCondition::PvcBound, Some(obj)) => {
                obj.pointer("/status/phase").and_then(Value::as_str) == Some("Bound")
            }
            (ResourceCondition::PodReady, Some(obj)) => obj
                .pointer("/status/conditions")
                .and_then(Value::as_array)
                .is_some_and(|conditions| {
                    conditions.iter().any(|c| {
                        c.get("type").and_then(Value::as_str) == Some("Ready")
                            && c.get("status").and_then(Value::as_str) == Some("True")
                    })
                }),
        }
    }

    /// Evaluates the condition against every resource matched by a selector.
    ///
    /// `Deleted` holds when nothing matches; any other condition needs at least
    /// one match and every match satisfying it.
    pub fn is_met_by_all(&self, resources: &[Value]) -> bool {
        match self {
            ResourceCondition::Deleted => resources.is_empty(),
            _ => !resources.is_empty() && resources.iter().all(|r| self.is_met(Some(r))),
        }
    }
}

impl fmt::Display for ResourceCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ResourceCondition::Exists => "exists",
            ResourceCondition::Deleted => "deleted",
            ResourceCondition::PvcBound => "bound",
            ResourceCondition::PodReady => "ready",
        };
        f.write_str(label)
    }
}

/// Cluster API client
///
/// Implementors provide lookups and mutations; the bounded waits are provided
/// on top of [`get_resource`](ClusterClient::get_resource) and
/// [`list_resources`](ClusterClient::list_resources).
#[async_trait]
pub trait ClusterClient: Send + Sync {
    async fn apply_manifest(&self, manifest: &str) -> Result<(), CollaboratorError>;

    /// Deletes every resource in the manifest. Resources that are already gone
    /// are not an error.
    async fn delete_manifest(&self, manifest: &str) -> Result<(), CollaboratorError>;

    /// Fetches one resource as JSON, `Ok(None)` if it does not exist.
    async fn get_resource(&self, resource: &ResourceRef) -> Result<Option<Value>, CollaboratorError>;

    async fn list_resources(
        &self,
        selector: &ResourceSelector,
    ) -> Result<Vec<Value>, CollaboratorError>;

    async fn scale_stateful_set(
        &self,
        namespace: &str,
        name: &str,
        replicas: u32,
    ) -> Result<(), CollaboratorError>;

    async fn annotate_resource(
        &self,
        resource: &ResourceRef,
        key: &str,
        value: &str,
    ) -> Result<(), CollaboratorError>;

    /// How often the provided waits poll
    fn poll_interval(&self) -> Duration {
        DEFAULT_POLL_INTERVAL
    }

    /// Polls one resource until `condition` holds, the timeout expires, or
    /// `cancel` fires.
    async fn wait_for_resource(
        &self,
        resource: &ResourceRef,
        condition: ResourceCondition,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<(), CollaboratorError> {
        let what = format!("{} to be {}", resource, condition);
        let client = self;
        poll_until(&what, timeout, self.poll_interval(), cancel, move || async move {
            let current = client.get_resource(resource).await?;
            Ok(condition.is_met(current.as_ref()))
        })
        .await
    }

    /// Polls a label selector until every match satisfies `condition`.
    async fn wait_for_resources(
        &self,
        selector: &ResourceSelector,
        condition: ResourceCondition,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<(), CollaboratorError> {
        let what = format!("{} to be {}", selector, condition);
        let client = self;
        poll_until(&what, timeout, self.poll_interval(), cancel, move || async move {
            let current = client.list_resources(selector).await?;
            Ok(condition.is_met_by_all(&current))
        })
        .await
    }
}
