use super::CollaboratorError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;

/// Where a chart is fetched from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartRef {
    /// Chart name or full reference (e.g. `oci://ghcr.io/org/charts/block-node-server`)
    pub name: String,
    /// Repository URL, when the chart is not a full reference
    #[serde(default)]
    pub repository: Option<String>,
}

impl ChartRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            repository: None,
        }
    }

    pub fn with_repository(mut self, repository: impl Into<String>) -> Self {
        self.repository = Some(repository.into());
        self
    }
}

/// The release a run operates on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseTarget {
    pub release_name: String,
    pub namespace: String,
    pub chart: ChartRef,
}

impl ReleaseTarget {
    /// Builds an install/upgrade request for this release at `version`.
    pub fn request(&self, version: impl Into<String>, values: ChartValues) -> ReleaseRequest {
        ReleaseRequest {
            release_name: self.release_name.clone(),
            namespace: self.namespace.clone(),
            chart: self.chart.clone(),
            version: version.into(),
            values,
        }
    }
}

/// Configuration values handed to the release manager
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ChartValues {
    /// Chart defaults only
    #[default]
    None,
    /// A values file on disk (already sanitized)
    File(PathBuf),
    /// An in-memory values document
    Inline(Value),
}

impl ChartValues {
    pub fn is_none(&self) -> bool {
        matches!(self, ChartValues::None)
    }
}

/// A request to install or upgrade a release
#[derive(Debug, Clone, PartialEq)]
pub struct ReleaseRequest {
    pub release_name: String,
    pub namespace: String,
    pub chart: ChartRef,
    pub version: String,
    pub values: ChartValues,
}

/// A deployed release as reported by the release manager
#[derive(Debug, Clone, PartialEq)]
pub struct ReleaseInfo {
    pub name: String,
    pub namespace: String,
    /// Version of the chart the release was deployed from
    pub chart_version: String,
    /// Values the user supplied at install/upgrade time (not the merged result)
    pub user_values: Value,
}

/// Package/release manager (Helm-like)
#[async_trait]
pub trait ReleaseManager: Send + Sync {
    /// Returns true if a release with this name exists in the namespace.
    async fn is_installed(&self, release: &str, namespace: &str) -> Result<bool, CollaboratorError>;

    async fn install_chart(&self, request: &ReleaseRequest) -> Result<(), CollaboratorError>;

    async fn upgrade_chart(&self, request: &ReleaseRequest) -> Result<(), CollaboratorError>;

    async fn uninstall_chart(&self, release: &str, namespace: &str) -> Result<(), CollaboratorError>;

    /// Looks up a release. `Ok(None)` means nothing is deployed under that name.
    async fn get_release(
        &self,
        release: &str,
        namespace: &str,
    ) -> Result<Option<ReleaseInfo>, CollaboratorError>;
}
