//! [`ClusterClient`] backed by the `kubectl` CLI

use crate::command::{CommandOutput, CommandRunner, ProcessRunner};
use async_trait::async_trait;
use blocknode_core::{ClusterClient, CollaboratorError, ResourceRef, ResourceSelector};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// kubectl cluster client
#[derive(Clone)]
pub struct KubectlCli {
    runner: Arc<dyn CommandRunner>,
    binary: String,
    context: Option<String>,
    poll_interval: Duration,
}

impl Default for KubectlCli {
    fn default() -> Self {
        Self::new()
    }
}

impl KubectlCli {
    /// Uses `kubectl` from `PATH`
    pub fn new() -> Self {
        Self::with_runner(Arc::new(ProcessRunner::new()))
    }

    pub fn with_runner(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            binary: "kubectl".to_string(),
            context: None,
            poll_interval: blocknode_core::DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    async fn kubectl(
        &self,
        mut args: Vec<String>,
        stdin: Option<&str>,
    ) -> Result<CommandOutput, CollaboratorError> {
        if let Some(context) = &self.context {
            args.push("--context".to_string());
            args.push(context.clone());
        }
        self.runner.run(&self.binary, &args, stdin).await
    }
}

/// Server-side `NotFound` only; client errors such as an unknown context also
/// say "not found" and must stay errors.
fn is_not_found(output: &CommandOutput) -> bool {
    output.stderr.contains("(NotFound)")
}

fn namespace_args(namespace: Option<&str>) -> Vec<String> {
    match namespace {
        Some(ns) => vec!["--namespace".to_string(), ns.to_string()],
        None => Vec::new(),
    }
}

#[async_trait]
impl ClusterClient for KubectlCli {
    async fn apply_manifest(&self, manifest: &str) -> Result<(), CollaboratorError> {
        let args = vec!["apply".to_string(), "-f".to_string(), "-".to_string()];
        self.kubectl(args, Some(manifest))
            .await?
            .check("kubectl apply")?;
        Ok(())
    }

    async fn delete_manifest(&self, manifest: &str) -> Result<(), CollaboratorError> {
        let args = vec![
            "delete".to_string(),
            "-f".to_string(),
            "-".to_string(),
            "--ignore-not-found=true".to_string(),
        ];
        self.kubectl(args, Some(manifest))
            .await?
            .check("kubectl delete")?;
        Ok(())
    }

    async fn get_resource(&self, resource: &ResourceRef) -> Result<Option<Value>, CollaboratorError> {
        let mut args = vec![
            "get".to_string(),
            resource.kind.clone(),
            resource.name.clone(),
        ];
        args.extend(namespace_args(resource.namespace.as_deref()));
        args.extend(["--output".to_string(), "json".to_string()]);

        let output = self.kubectl(args, None).await?;
        if !output.success() && is_not_found(&output) {
            return Ok(None);
        }
        let output = output.check("kubectl get")?;
        Ok(Some(serde_json::from_str(&output.stdout)?))
    }

    async fn list_resources(
        &self,
        selector: &ResourceSelector,
    ) -> Result<Vec<Value>, CollaboratorError> {
        let mut args = vec!["get".to_string(), selector.kind.clone()];
        args.extend(namespace_args(Some(&selector.namespace)));
        args.extend([
            "--selector".to_string(),
            selector.labels.clone(),
            "--output".to_string(),
            "json".to_string(),
        ]);

        let output = self.kubectl(args, None).await?.check("kubectl get")?;
        let list: Value = serde_json::from_str(&output.stdout)?;
        Ok(match list.get("items") {
            Some(Value::Array(items)) => items.clone(),
            _ => Vec::new(),
        })
    }

    async fn scale_stateful_set(
        &self,
        namespace: &str,
        name: &str,
        replicas: u32,
    ) -> Result<(), CollaboratorError> {
        log::info!("scaling statefulset {}/{} to {}", namespace, name, replicas);
        let mut args = vec![
            "scale".to_string(),
            "statefulset".to_string(),
            name.to_string(),
            format!("--replicas={}", replicas),
        ];
        args.extend(namespace_args(Some(namespace)));
        self.kubectl(args, None).await?.check("kubectl scale")?;
        Ok(())
    }

    async fn annotate_resource(
        &self,
        resource: &ResourceRef,
        key: &str,
        value: &str,
    ) -> Result<(), CollaboratorError> {
        let mut args = vec![
            "annotate".to_string(),
            resource.kind.clone(),
            resource.name.clone(),
            format!("{}={}", key, value),
            "--overwrite".to_string(),
        ];
        args.extend(namespace_args(resource.namespace.as_deref()));
        self.kubectl(args, None).await?.check("kubectl annotate")?;
        Ok(())
    }

    fn poll_interval(&self) -> Duration {
        self.poll_interval
    }
}
