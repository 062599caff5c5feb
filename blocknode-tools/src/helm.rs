//! [`ReleaseManager`] backed by the `helm` CLI

use crate::command::{CommandRunner, ProcessRunner};
use async_trait::async_trait;
use blocknode_core::{
    ChartValues, CollaboratorError, ReleaseInfo, ReleaseManager, ReleaseRequest,
};
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

lazy_static::lazy_static! {
    /// Splits `helm list`'s `chart` column (`<name>-<version>`) at the version
    static ref CHART_VERSION: Regex =
        Regex::new(r"^.+?-(v?\d+\.\d+\.\d+(?:[-+][0-9A-Za-z.+-]+)?)$").expect("Invalid chart regex");
}

/// One row of `helm list -o json`
#[derive(Debug, Deserialize)]
struct ListEntry {
    name: String,
    namespace: String,
    chart: String,
    #[serde(default)]
    app_version: String,
}

/// Extracts the chart version from a `<chart-name>-<version>` string.
pub fn chart_version(chart: &str) -> Option<&str> {
    CHART_VERSION
        .captures(chart)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Helm release manager
///
/// Values are passed as a file (`--values <path>`) or, for inline documents,
/// as JSON on stdin (`--values -`).
#[derive(Clone)]
pub struct HelmCli {
    runner: Arc<dyn CommandRunner>,
    binary: String,
    kube_context: Option<String>,
}

impl Default for HelmCli {
    fn default() -> Self {
        Self::new()
    }
}

impl HelmCli {
    /// Uses `helm` from `PATH`
    pub fn new() -> Self {
        Self::with_runner(Arc::new(ProcessRunner::new()))
    }

    pub fn with_runner(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            binary: "helm".to_string(),
            kube_context: None,
        }
    }

    pub fn binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn kube_context(mut self, context: impl Into<String>) -> Self {
        self.kube_context = Some(context.into());
        self
    }

    /// Arguments (and stdin) for `helm install` / `helm upgrade`
    pub fn release_args(&self, verb: &str, request: &ReleaseRequest) -> (Vec<String>, Option<String>) {
        let mut args = vec![
            verb.to_string(),
            request.release_name.clone(),
            request.chart.name.clone(),
            "--version".to_string(),
            request.version.clone(),
            "--namespace".to_string(),
            request.namespace.clone(),
        ];
        if verb == "install" {
            args.push("--create-namespace".to_string());
        }
        if let Some(repo) = &request.chart.repository {
            args.push("--repo".to_string());
            args.push(repo.clone());
        }

        let stdin = match &request.values {
            ChartValues::None => None,
            ChartValues::File(path) => {
                args.push("--values".to_string());
                args.push(path.display().to_string());
                None
            }
            ChartValues::Inline(values) => {
                args.push("--values".to_string());
                args.push("-".to_string());
                Some(values.to_string())
            }
        };

        (self.with_context(args), stdin)
    }

    fn with_context(&self, mut args: Vec<String>) -> Vec<String> {
        if let Some(context) = &self.kube_context {
            args.push("--kube-context".to_string());
            args.push(context.clone());
        }
        args
    }

    async fn helm(
        &self,
        operation: &str,
        args: Vec<String>,
        stdin: Option<&str>,
    ) -> Result<String, CollaboratorError> {
        let output = self.runner.run(&self.binary, &args, stdin).await?;
        Ok(output.check(operation)?.stdout)
    }

    async fn find(&self, release: &str, namespace: &str) -> Result<Option<ListEntry>, CollaboratorError> {
        let args = self.with_context(vec![
            "list".to_string(),
            "--namespace".to_string(),
            namespace.to_string(),
            "--filter".to_string(),
            format!("^{}$", regex::escape(release)),
            "--output".to_string(),
            "json".to_string(),
        ]);
        let stdout = self.helm("helm list", args, None).await?;
        let entries: Vec<ListEntry> = if stdout.trim().is_empty() {
            Vec::new()
        } else {
            serde_json::from_str(&stdout)?
        };
        Ok(entries
            .into_iter()
            .find(|e| e.name == release && e.namespace == namespace))
    }
}

#[async_trait]
impl ReleaseManager for HelmCli {
    async fn is_installed(&self, release: &str, namespace: &str) -> Result<bool, CollaboratorError> {
        Ok(self.find(release, namespace).await?.is_some())
    }

    async fn install_chart(&self, request: &ReleaseRequest) -> Result<(), CollaboratorError> {
        log::info!(
            "installing {} {} into {}",
            request.release_name,
            request.version,
            request.namespace
        );
        let (args, stdin) = self.release_args("install", request);
        self.helm("helm install", args, stdin.as_deref()).await?;
        Ok(())
    }

    async fn upgrade_chart(&self, request: &ReleaseRequest) -> Result<(), CollaboratorError> {
        log::info!(
            "upgrading {} to {} in {}",
            request.release_name,
            request.version,
            request.namespace
        );
        let (args, stdin) = self.release_args("upgrade", request);
        self.helm("helm upgrade", args, stdin.as_deref()).await?;
        Ok(())
    }

    async fn uninstall_chart(&self, release: &str, namespace: &str) -> Result<(), CollaboratorError> {
        log::info!("uninstalling {} from {}", release, namespace);
        let args = self.with_context(vec![
            "uninstall".to_string(),
            release.to_string(),
            "--namespace".to_string(),
            namespace.to_string(),
            "--wait".to_string(),
        ]);
        self.helm("helm uninstall", args, None).await?;
        Ok(())
    }

    async fn get_release(
        &self,
        release: &str,
        namespace: &str,
    ) -> Result<Option<ReleaseInfo>, CollaboratorError> {
        let Some(entry) = self.find(release, namespace).await? else {
            return Ok(None);
        };

        let chart_version = match chart_version(&entry.chart) {
            Some(version) => version.to_string(),
            None if !entry.app_version.is_empty() => entry.app_version.clone(),
            None => {
                return Err(CollaboratorError::failed(
                    "helm list",
                    format!("cannot determine chart version from '{}'", entry.chart),
                ))
            }
        };

        let args = self.with_context(vec![
            "get".to_string(),
            "values".to_string(),
            release.to_string(),
            "--namespace".to_string(),
            namespace.to_string(),
            "--output".to_string(),
            "json".to_string(),
        ]);
        let stdout = self.helm("helm get values", args, None).await?;
        let user_values = match stdout.trim() {
            "" | "null" => Value::Null,
            json => serde_json::from_str(json)?,
        };

        Ok(Some(ReleaseInfo {
            name: entry.name,
            namespace: entry.namespace,
            chart_version,
            user_values,
        }))
    }
}
