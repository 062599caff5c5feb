//! `blocknode.toml` loading
//!
//! ```toml
//! [release]
//! name = "block-node"
//! namespace = "block-node"
//! chart = "oci://ghcr.io/hiero-ledger/hiero-block-node/block-node-server"
//!
//! [storage]
//! base_path = "${BLOCK_NODE_DATA:-/mnt/block-node}"
//!
//! [upgrade]
//! target_version = "0.26.2"
//! profile = "production"
//! reuse_values = true
//!
//! [timeouts]
//! pvc_bound = 300
//! ```
//!
//! The file contents support `${VAR}` and `${VAR:-default}` expansion, and
//! path settings may start with `~`.

use blocknode_core::{ChartRef, ReleaseTarget, StorageConfig, WaitTimeouts};
use blocknode_tools::UpgradeRequest;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default configuration file, relative to the working directory
pub const DEFAULT_CONFIG_FILE: &str = "blocknode.toml";

const DEFAULT_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ReleaseSection {
    pub name: String,
    pub namespace: String,
    pub chart: String,
    #[serde(default)]
    pub repository: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct UpgradeSection {
    pub target_version: Option<String>,
    pub profile: Option<String>,
    pub values_file: Option<PathBuf>,
    pub reuse_values: bool,
}

/// Wait deadlines in seconds
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TimeoutSection {
    pub pvc_bound: u64,
    pub pod_ready: u64,
    pub pod_terminated: u64,
}

impl Default for TimeoutSection {
    fn default() -> Self {
        Self {
            pvc_bound: DEFAULT_TIMEOUT_SECS,
            pod_ready: DEFAULT_TIMEOUT_SECS,
            pod_terminated: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl From<TimeoutSection> for WaitTimeouts {
    fn from(section: TimeoutSection) -> Self {
        WaitTimeouts {
            pvc_bound: Duration::from_secs(section.pvc_bound),
            pod_ready: Duration::from_secs(section.pod_ready),
            pod_terminated: Duration::from_secs(section.pod_terminated),
        }
    }
}

/// External binaries and how to reach the cluster
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ToolsSection {
    pub helm: String,
    pub kubectl: String,
    /// Kubeconfig context passed to both tools
    pub kube_context: Option<String>,
    /// Upper bound for a single helm/kubectl invocation, in seconds
    pub command_timeout: Option<u64>,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            helm: "helm".to_string(),
            kubectl: "kubectl".to_string(),
            kube_context: None,
            command_timeout: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub release: ReleaseSection,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub upgrade: UpgradeSection,
    #[serde(default)]
    pub timeouts: TimeoutSection,
    #[serde(default)]
    pub tools: ToolsSection,
}

impl Config {
    /// Loads and validates a configuration file. `~` in `path` is expanded.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        let expanded = PathBuf::from(shellexpand::tilde(&path_str).as_ref());

        let content = tokio::fs::read_to_string(&expanded)
            .await
            .map_err(|source| ConfigError::Read {
                path: expanded.clone(),
                source,
            })?;

        log::debug!("loaded configuration from {}", expanded.display());
        Self::parse(&content)
    }

    /// Parses configuration text, expanding environment variables first.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let mut config: Config = toml::from_str(&expand_env_vars(content))?;
        config.expand_paths();
        config.validate()?;
        Ok(config)
    }

    fn expand_paths(&mut self) {
        let storage = &mut self.storage;
        for path in [
            &mut storage.base_path,
            &mut storage.archive_path,
            &mut storage.live_path,
            &mut storage.log_path,
            &mut storage.verification_path,
        ] {
            *path = expand_tilde(path);
        }

        if let Some(file) = self.upgrade.values_file.take() {
            self.upgrade.values_file = Some(PathBuf::from(expand_tilde(&file.to_string_lossy())));
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (key, value) in [
            ("release.name", &self.release.name),
            ("release.namespace", &self.release.namespace),
            ("release.chart", &self.release.chart),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{} must not be empty", key)));
            }
        }
        Ok(())
    }

    pub fn release_target(&self) -> ReleaseTarget {
        let mut chart = ChartRef::new(self.release.chart.clone());
        if let Some(repository) = &self.release.repository {
            chart = chart.with_repository(repository.clone());
        }
        ReleaseTarget {
            release_name: self.release.name.clone(),
            namespace: self.release.namespace.clone(),
            chart,
        }
    }

    /// Builds the upgrade request for `target_version` from the file settings.
    pub fn upgrade_request(&self, target_version: impl Into<String>) -> UpgradeRequest {
        let mut request = UpgradeRequest::new(self.release_target(), target_version);
        request.storage = self.storage.clone();
        request.profile = self.upgrade.profile.clone();
        request.values_file = self.upgrade.values_file.clone();
        request.reuse_values = self.upgrade.reuse_values;
        request.timeouts = self.timeouts.into();
        request
    }
}

fn expand_tilde(path: &str) -> String {
    shellexpand::tilde(path).into_owned()
}

/// Expand environment variables in a string
///
/// Supports:
/// - `${VAR}` - expands to the value of VAR, or empty string if not set
/// - `${VAR:-default}` - expands to the value of VAR, or "default" if not set
fn expand_env_vars(input: &str) -> String {
    let mut result = String::new();
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '$' || chars.peek() != Some(&'{') {
            result.push(ch);
            continue;
        }
        chars.next();

        let mut var_name = String::new();
        let mut default_value: Option<String> = None;

        while let Some(next_ch) = chars.next() {
            match next_ch {
                '}' => break,
                ':' if chars.peek() == Some(&'-') => {
                    chars.next();
                    let mut default = String::new();
                    for default_ch in chars.by_ref() {
                        if default_ch == '}' {
                            break;
                        }
                        default.push(default_ch);
                    }
                    default_value = Some(default);
                    break;
                }
                other => var_name.push(other),
            }
        }

        match std::env::var(&var_name) {
            Ok(value) => result.push_str(&value),
            Err(_) => result.push_str(default_value.as_deref().unwrap_or_default()),
        }
    }

    result
}
