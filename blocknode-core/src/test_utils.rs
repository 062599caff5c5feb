//! Test utilities for blocknode-core.
//!
//! In-memory fakes for every collaborator trait plus a scripted migration, so
//! migrations and the manager can be exercised without a cluster.
//!
//! Enable with the `test-utils` feature:
//!
//! ```toml
//! [dev-dependencies]
//! blocknode-core = { version = "...", features = ["test-utils"] }
//! ```
//!
//! # Example
//!
//! ```rust
//! use blocknode_core::collaborators::ReleaseManager;
//! use blocknode_core::test_utils::FakeReleaseManager;
//!
//! # tokio_test::block_on(async {
//! let helm = FakeReleaseManager::new().with_release("block-node", "solo", "0.25.0");
//!
//! let release = helm.get_release("block-node", "solo").await.unwrap().unwrap();
//! assert_eq!(release.chart_version, "0.25.0");
//! assert_eq!(helm.calls(), vec!["get_release block-node"]);
//! # });
//! ```

use std::collections::{HashMap, HashSet};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::collaborators::{
    ChartValues, ClusterClient, CollaboratorError, FilesystemManager, PathSanitizer, ReleaseInfo,
    ReleaseManager, ReleaseRequest, ResourceRef, ResourceSelector, TemplateRenderer,
};
use crate::error::MigrationError;
use crate::migration::{Migration, MigrationContext, MigrationMetadata};

/// Operation names understood by the `fail_on` helpers of every fake
fn injected(failures: &Mutex<HashSet<String>>, operation: &str) -> Result<(), CollaboratorError> {
    if failures.lock().contains(operation) {
        Err(CollaboratorError::failed(operation, "injected failure"))
    } else {
        Ok(())
    }
}

// ===== Release manager =====

/// A release manager holding at most one release per `(name, namespace)`.
///
/// Every call is recorded as `"<operation> <release>"`; install and upgrade
/// requests are kept in full. Operations listed with
/// [`fail_on`](FakeReleaseManager::fail_on) are recorded and then fail.
#[derive(Default)]
pub struct FakeReleaseManager {
    releases: Mutex<HashMap<(String, String), ReleaseInfo>>,
    calls: Mutex<Vec<String>>,
    requests: Mutex<Vec<ReleaseRequest>>,
    failures: Mutex<HashSet<String>>,
    single_failures: Mutex<HashSet<String>>,
}

impl FakeReleaseManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a deployed release with no user values.
    pub fn with_release(self, name: &str, namespace: &str, version: &str) -> Self {
        self.with_release_values(name, namespace, version, Value::Null)
    }

    /// Seeds a deployed release with user-supplied values.
    pub fn with_release_values(
        self,
        name: &str,
        namespace: &str,
        version: &str,
        user_values: Value,
    ) -> Self {
        self.releases.lock().insert(
            (name.to_string(), namespace.to_string()),
            ReleaseInfo {
                name: name.to_string(),
                namespace: namespace.to_string(),
                chart_version: version.to_string(),
                user_values,
            },
        );
        self
    }

    /// Makes `operation` (`install_chart`, `upgrade_chart`, `uninstall_chart`,
    /// `get_release`, `is_installed`) fail.
    pub fn fail_on(self, operation: &str) -> Self {
        self.failures.lock().insert(operation.to_string());
        self
    }

    /// Makes `operation` fail from now on.
    pub fn set_failing(&self, operation: &str) {
        self.failures.lock().insert(operation.to_string());
    }

    /// Makes only the next call of `operation` fail.
    pub fn fail_once_on(self, operation: &str) -> Self {
        self.single_failures.lock().insert(operation.to_string());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    /// Install and upgrade requests, in order
    pub fn requests(&self) -> Vec<ReleaseRequest> {
        self.requests.lock().clone()
    }

    /// The chart version currently deployed for `name`, if any
    pub fn deployed_version(&self, name: &str, namespace: &str) -> Option<String> {
        self.releases
            .lock()
            .get(&(name.to_string(), namespace.to_string()))
            .map(|r| r.chart_version.clone())
    }

    fn record(&self, operation: &str, release: &str) -> Result<(), CollaboratorError> {
        self.calls.lock().push(format!("{} {}", operation, release));
        if self.single_failures.lock().remove(operation) {
            return Err(CollaboratorError::failed(operation, "injected failure"));
        }
        injected(&self.failures, operation)
    }

    fn store(&self, request: &ReleaseRequest) {
        let user_values = match &request.values {
            ChartValues::Inline(values) => values.clone(),
            ChartValues::File(path) => json!({ "valuesFile": path.display().to_string() }),
            ChartValues::None => Value::Null,
        };
        self.releases.lock().insert(
            (request.release_name.clone(), request.namespace.clone()),
            ReleaseInfo {
                name: request.release_name.clone(),
                namespace: request.namespace.clone(),
                chart_version: request.version.clone(),
                user_values,
            },
        );
    }
}

#[async_trait]
impl ReleaseManager for FakeReleaseManager {
    async fn is_installed(&self, release: &str, namespace: &str) -> Result<bool, CollaboratorError> {
        self.record("is_installed", release)?;
        Ok(self.deployed_version(release, namespace).is_some())
    }

    async fn install_chart(&self, request: &ReleaseRequest) -> Result<(), CollaboratorError> {
        self.requests.lock().push(request.clone());
        self.record("install_chart", &request.release_name)?;
        self.store(request);
        Ok(())
    }

    async fn upgrade_chart(&self, request: &ReleaseRequest) -> Result<(), CollaboratorError> {
        self.requests.lock().push(request.clone());
        self.record("upgrade_chart", &request.release_name)?;
        if self
            .deployed_version(&request.release_name, &request.namespace)
            .is_none()
        {
            return Err(CollaboratorError::failed(
                "upgrade_chart",
                format!("release {} has no deployed revision", request.release_name),
            ));
        }
        self.store(request);
        Ok(())
    }

    async fn uninstall_chart(&self, release: &str, namespace: &str) -> Result<(), CollaboratorError> {
        self.record("uninstall_chart", release)?;
        self.releases
            .lock()
            .remove(&(release.to_string(), namespace.to_string()));
        Ok(())
    }

    async fn get_release(
        &self,
        release: &str,
        namespace: &str,
    ) -> Result<Option<ReleaseInfo>, CollaboratorError> {
        self.record("get_release", release)?;
        Ok(self
            .releases
            .lock()
            .get(&(release.to_string(), namespace.to_string()))
            .cloned())
    }
}

// ===== Cluster client =====

/// A cluster where every single resource lookup succeeds as ready/bound
/// unless overridden, and every selector matches nothing unless overridden.
///
/// With the defaults, `PvcBound`, `PodReady`, `Exists` and selector-based
/// `Deleted` waits succeed on the first poll.
#[derive(Default)]
pub struct FakeClusterClient {
    resources: Mutex<HashMap<String, Option<Value>>>,
    selections: Mutex<HashMap<String, Vec<Value>>>,
    applied: Mutex<Vec<String>>,
    deleted: Mutex<Vec<String>>,
    calls: Mutex<Vec<String>>,
    failures: Mutex<HashSet<String>>,
}

impl FakeClusterClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// A resource that looks bound and ready
    pub fn ready_resource() -> Value {
        json!({
            "status": {
                "phase": "Bound",
                "conditions": [{ "type": "Ready", "status": "True" }]
            }
        })
    }

    /// Overrides the lookup result for one resource (`None` = not found).
    pub fn with_resource(self, resource: &ResourceRef, value: Option<Value>) -> Self {
        self.resources.lock().insert(resource.to_string(), value);
        self
    }

    /// Overrides what a label selector matches.
    pub fn with_selection(self, labels: &str, matches: Vec<Value>) -> Self {
        self.selections.lock().insert(labels.to_string(), matches);
        self
    }

    /// Makes `operation` fail (`apply_manifest`, `delete_manifest`,
    /// `get_resource`, `list_resources`, `scale_stateful_set`,
    /// `annotate_resource`).
    pub fn fail_on(self, operation: &str) -> Self {
        self.failures.lock().insert(operation.to_string());
        self
    }

    pub fn applied(&self) -> Vec<String> {
        self.applied.lock().clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().clone()
    }

    /// Every call as `"<operation> <subject>"`
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn record(&self, operation: &str, subject: &str) -> Result<(), CollaboratorError> {
        self.calls.lock().push(format!("{} {}", operation, subject));
        injected(&self.failures, operation)
    }
}

#[async_trait]
impl ClusterClient for FakeClusterClient {
    async fn apply_manifest(&self, manifest: &str) -> Result<(), CollaboratorError> {
        self.record("apply_manifest", &manifest_name(manifest))?;
        self.applied.lock().push(manifest.to_string());
        Ok(())
    }

    async fn delete_manifest(&self, manifest: &str) -> Result<(), CollaboratorError> {
        self.record("delete_manifest", &manifest_name(manifest))?;
        self.deleted.lock().push(manifest.to_string());
        Ok(())
    }

    async fn get_resource(&self, resource: &ResourceRef) -> Result<Option<Value>, CollaboratorError> {
        let key = resource.to_string();
        self.record("get_resource", &key)?;
        Ok(self
            .resources
            .lock()
            .get(&key)
            .cloned()
            .unwrap_or_else(|| Some(Self::ready_resource())))
    }

    async fn list_resources(
        &self,
        selector: &ResourceSelector,
    ) -> Result<Vec<Value>, CollaboratorError> {
        self.record("list_resources", &selector.labels)?;
        Ok(self
            .selections
            .lock()
            .get(&selector.labels)
            .cloned()
            .unwrap_or_default())
    }

    async fn scale_stateful_set(
        &self,
        namespace: &str,
        name: &str,
        replicas: u32,
    ) -> Result<(), CollaboratorError> {
        self.record(
            "scale_stateful_set",
            &format!("{}/{}={}", namespace, name, replicas),
        )
    }

    async fn annotate_resource(
        &self,
        resource: &ResourceRef,
        key: &str,
        value: &str,
    ) -> Result<(), CollaboratorError> {
        self.record("annotate_resource", &format!("{} {}={}", resource, key, value))
    }

    fn poll_interval(&self) -> Duration {
        Duration::from_millis(5)
    }
}

/// First `name:` value of a manifest, for readable call logs
fn manifest_name(manifest: &str) -> String {
    manifest
        .lines()
        .filter_map(|line| line.trim().strip_prefix("name:"))
        .map(|name| name.trim().trim_matches('"').to_string())
        .next()
        .unwrap_or_default()
}

// ===== Filesystem =====

/// An in-memory set of existing paths
#[derive(Default)]
pub struct FakeFilesystem {
    existing: Mutex<HashSet<PathBuf>>,
    calls: Mutex<Vec<String>>,
    failures: Mutex<HashSet<String>>,
}

impl FakeFilesystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_existing(self, path: impl Into<PathBuf>) -> Self {
        self.existing.lock().insert(path.into());
        self
    }

    /// Makes `operation` fail (`path_exists`, `create_directory`,
    /// `write_permissions`, `remove_contents`).
    pub fn fail_on(self, operation: &str) -> Self {
        self.failures.lock().insert(operation.to_string());
        self
    }

    pub fn exists(&self, path: impl AsRef<Path>) -> bool {
        self.existing.lock().contains(path.as_ref())
    }

    /// Every mutating call as `"<operation> <path>"`
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn record(&self, operation: &str, detail: String) -> Result<(), CollaboratorError> {
        self.calls.lock().push(format!("{} {}", operation, detail));
        injected(&self.failures, operation)
    }
}

#[async_trait]
impl FilesystemManager for FakeFilesystem {
    async fn path_exists(&self, path: &Path) -> Result<bool, CollaboratorError> {
        injected(&self.failures, "path_exists")?;
        Ok(self.exists(path))
    }

    async fn create_directory(&self, path: &Path, _recursive: bool) -> Result<(), CollaboratorError> {
        self.record("create_directory", path.display().to_string())?;
        self.existing.lock().insert(path.to_path_buf());
        Ok(())
    }

    async fn write_permissions(
        &self,
        path: &Path,
        mode: u32,
        _recursive: bool,
    ) -> Result<(), CollaboratorError> {
        self.record("write_permissions", format!("{} {:o}", path.display(), mode))
    }

    async fn remove_contents(&self, path: &Path) -> Result<(), CollaboratorError> {
        self.record("remove_contents", path.display().to_string())
    }
}

// ===== Path sanitizer =====

/// Accepts absolute, lexically clean paths free of shell metacharacters.
#[derive(Debug, Clone, Copy, Default)]
pub struct FakeSanitizer;

impl FakeSanitizer {
    pub fn new() -> Self {
        Self
    }
}

impl PathSanitizer for FakeSanitizer {
    fn sanitize_path(&self, path: &str) -> Result<PathBuf, CollaboratorError> {
        if path.is_empty() {
            return Err(CollaboratorError::invalid_path(path, "path is empty"));
        }
        if path.contains(|c: char| ";|&$`<>*?(){}[]!\\'\"\n".contains(c)) {
            return Err(CollaboratorError::invalid_path(path, "shell metacharacter"));
        }

        let candidate = Path::new(path);
        if !candidate.is_absolute() {
            return Err(CollaboratorError::invalid_path(path, "path must be absolute"));
        }
        if candidate
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::CurDir))
        {
            return Err(CollaboratorError::invalid_path(path, "path traversal"));
        }

        let clean: PathBuf = candidate.components().collect();
        if clean.as_os_str() != candidate.as_os_str() {
            return Err(CollaboratorError::invalid_path(path, "path is not clean"));
        }

        Ok(clean)
    }

    fn validate_input_file(&self, path: &str) -> Result<PathBuf, CollaboratorError> {
        let clean = self.sanitize_path(path)?;
        if !clean.is_file() {
            return Err(CollaboratorError::invalid_path(path, "not a regular file"));
        }
        Ok(clean)
    }
}

// ===== Templates =====

/// Renders `<template>` as a small YAML document listing the data keys.
///
/// Output for template `pvc` and data `{"name": "live"}`:
///
/// ```text
/// template: pvc
/// name: live
/// ```
#[derive(Default)]
pub struct FakeTemplates {
    rendered: Mutex<Vec<String>>,
}

impl FakeTemplates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Template names rendered so far, in order
    pub fn rendered(&self) -> Vec<String> {
        self.rendered.lock().clone()
    }
}

impl TemplateRenderer for FakeTemplates {
    fn render(&self, template: &str, data: &Value) -> Result<String, CollaboratorError> {
        let object = data
            .as_object()
            .ok_or_else(|| CollaboratorError::Template("data must be an object".to_string()))?;

        self.rendered.lock().push(template.to_string());

        let mut output = format!("template: {}\n", template);
        for (key, value) in object {
            let value = value
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| value.to_string());
            output.push_str(&format!("{}: {}\n", key, value));
        }
        Ok(output)
    }

    fn read(&self, template: &str) -> Result<Vec<u8>, CollaboratorError> {
        Ok(format!("template: {}\n", template).into_bytes())
    }
}

// ===== Migrations =====

/// Shared, ordered record of migration calls
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().push(entry.into());
    }

    pub fn calls(&self) -> Vec<String> {
        self.0.lock().clone()
    }
}

/// A migration that logs `execute:<id>` / `rollback:<id>` and fails on demand
pub struct RecordingMigration {
    metadata: MigrationMetadata,
    log: CallLog,
    fail_execute: bool,
    fail_rollback: bool,
}

impl RecordingMigration {
    pub fn new(id: impl Into<String>, min_version: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            metadata: MigrationMetadata::new(id.clone(), format!("{} (test)", id), min_version),
            log: CallLog::default(),
            fail_execute: false,
            fail_rollback: false,
        }
    }

    /// Shorthand for `Arc::new(RecordingMigration::new(id, min_version))`
    pub fn arc(id: impl Into<String>, min_version: impl Into<String>) -> Arc<Self> {
        Arc::new(Self::new(id, min_version))
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.metadata = MigrationMetadata::new(
            self.metadata.id(),
            description,
            self.metadata.min_version(),
        );
        self
    }

    /// Records into a log shared with other migrations
    pub fn with_log(mut self, log: &CallLog) -> Self {
        self.log = log.clone();
        self
    }

    pub fn failing_execute(mut self) -> Self {
        self.fail_execute = true;
        self
    }

    pub fn failing_rollback(mut self) -> Self {
        self.fail_rollback = true;
        self
    }

    pub fn log(&self) -> &CallLog {
        &self.log
    }
}

#[async_trait]
impl Migration for RecordingMigration {
    fn metadata(&self) -> &MigrationMetadata {
        &self.metadata
    }

    async fn execute(&self, _ctx: &mut MigrationContext) -> Result<(), MigrationError> {
        self.log.push(format!("execute:{}", self.id()));
        if self.fail_execute {
            return Err(MigrationError::execution(format!("{} execute failed", self.id())));
        }
        Ok(())
    }

    async fn rollback(&self, _ctx: &mut MigrationContext) -> Result<(), MigrationError> {
        self.log.push(format!("rollback:{}", self.id()));
        if self.fail_rollback {
            return Err(MigrationError::execution(format!("{} rollback failed", self.id())));
        }
        Ok(())
    }
}
