//! Per-run migration context
//!
//! A [`MigrationContext`] is built by the caller before a run and discarded
//! afterwards. Versions and the component are fixed at construction; everything
//! else travels in [`ContextData`], the single place where collaborator
//! handles and run flags are stored and read back.
//!
//! Values that every run may need have dedicated typed slots (release manager,
//! cluster client, profile, captured values, ...). Anything else can be stored
//! under a string key with [`ContextData::insert_extension`] and read back with
//! a type check via [`ContextData::extension`].

use crate::collaborators::{
    ClusterClient, FilesystemManager, PathSanitizer, ReleaseManager, ReleaseTarget,
    TemplateRenderer,
};
use crate::storage::StorageConfig;
use crate::wait::DEFAULT_WAIT_TIMEOUT;
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Errors raised by context accessors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContextError {
    /// A required value was never populated
    #[error("migration context is missing {0}")]
    Missing(String),

    /// An extension exists but holds a different type
    #[error("migration context value '{key}' is not a {expected}")]
    WrongType { key: String, expected: &'static str },
}

/// Snapshot of a release's user-supplied values
///
/// Captured from the release manager immediately before a destructive step so
/// the reinstall can reuse what the operator configured.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedValues {
    values: Value,
}

impl CapturedValues {
    pub fn new(values: Value) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &Value {
        &self.values
    }

    /// True for `null` and for an empty object
    pub fn is_empty(&self) -> bool {
        match &self.values {
            Value::Null => true,
            Value::Object(map) => map.is_empty(),
            _ => false,
        }
    }

    pub fn into_values(self) -> Value {
        self.values
    }
}

/// Deadlines for the cluster waits a migration performs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitTimeouts {
    pub pvc_bound: Duration,
    pub pod_ready: Duration,
    pub pod_terminated: Duration,
}

impl Default for WaitTimeouts {
    fn default() -> Self {
        Self {
            pvc_bound: DEFAULT_WAIT_TIMEOUT,
            pod_ready: DEFAULT_WAIT_TIMEOUT,
            pod_terminated: DEFAULT_WAIT_TIMEOUT,
        }
    }
}

/// Collaborator handles and run-scoped flags
#[derive(Default)]
pub struct ContextData {
    release_manager: Option<Arc<dyn ReleaseManager>>,
    cluster: Option<Arc<dyn ClusterClient>>,
    filesystem: Option<Arc<dyn FilesystemManager>>,
    templates: Option<Arc<dyn TemplateRenderer>>,
    sanitizer: Option<Arc<dyn PathSanitizer>>,
    release: Option<ReleaseTarget>,
    storage: Option<StorageConfig>,
    profile: Option<String>,
    values_file: Option<PathBuf>,
    reuse_values: bool,
    captured_values: Option<CapturedValues>,
    timeouts: WaitTimeouts,
    extensions: HashMap<String, Arc<dyn Any + Send + Sync>>,
}

fn missing(what: &str) -> ContextError {
    ContextError::Missing(what.to_string())
}

impl ContextData {
    pub fn set_release_manager(&mut self, manager: Arc<dyn ReleaseManager>) {
        self.release_manager = Some(manager);
    }

    pub fn release_manager(&self) -> Result<&Arc<dyn ReleaseManager>, ContextError> {
        self.release_manager
            .as_ref()
            .ok_or_else(|| missing("a release manager"))
    }

    pub fn set_cluster(&mut self, cluster: Arc<dyn ClusterClient>) {
        self.cluster = Some(cluster);
    }

    pub fn cluster(&self) -> Result<&Arc<dyn ClusterClient>, ContextError> {
        self.cluster
            .as_ref()
            .ok_or_else(|| missing("a cluster client"))
    }

    pub fn set_filesystem(&mut self, filesystem: Arc<dyn FilesystemManager>) {
        self.filesystem = Some(filesystem);
    }

    pub fn filesystem(&self) -> Result<&Arc<dyn FilesystemManager>, ContextError> {
        self.filesystem
            .as_ref()
            .ok_or_else(|| missing("a filesystem manager"))
    }

    pub fn set_templates(&mut self, templates: Arc<dyn TemplateRenderer>) {
        self.templates = Some(templates);
    }

    pub fn templates(&self) -> Result<&Arc<dyn TemplateRenderer>, ContextError> {
        self.templates
            .as_ref()
            .ok_or_else(|| missing("a template renderer"))
    }

    pub fn set_sanitizer(&mut self, sanitizer: Arc<dyn PathSanitizer>) {
        self.sanitizer = Some(sanitizer);
    }

    pub fn sanitizer(&self) -> Result<&Arc<dyn PathSanitizer>, ContextError> {
        self.sanitizer
            .as_ref()
            .ok_or_else(|| missing("a path sanitizer"))
    }

    pub fn set_release(&mut self, release: ReleaseTarget) {
        self.release = Some(release);
    }

    pub fn release(&self) -> Result<&ReleaseTarget, ContextError> {
        self.release
            .as_ref()
            .ok_or_else(|| missing("the release target"))
    }

    pub fn set_storage(&mut self, storage: StorageConfig) {
        self.storage = Some(storage);
    }

    pub fn storage(&self) -> Result<&StorageConfig, ContextError> {
        self.storage
            .as_ref()
            .ok_or_else(|| missing("the storage configuration"))
    }

    /// Sets the deployment profile. Empty names are treated as unset.
    pub fn set_profile(&mut self, profile: impl Into<String>) {
        let profile = profile.into();
        self.profile = if profile.trim().is_empty() {
            None
        } else {
            Some(profile)
        };
    }

    pub fn profile(&self) -> Option<&str> {
        self.profile.as_deref()
    }

    pub fn set_values_file(&mut self, path: impl Into<PathBuf>) {
        self.values_file = Some(path.into());
    }

    pub fn values_file(&self) -> Option<&Path> {
        self.values_file.as_deref()
    }

    pub fn set_reuse_values(&mut self, reuse: bool) {
        self.reuse_values = reuse;
    }

    pub fn reuse_values(&self) -> bool {
        self.reuse_values
    }

    pub fn set_captured_values(&mut self, values: CapturedValues) {
        self.captured_values = Some(values);
    }

    pub fn captured_values(&self) -> Option<&CapturedValues> {
        self.captured_values.as_ref()
    }

    pub fn take_captured_values(&mut self) -> Option<CapturedValues> {
        self.captured_values.take()
    }

    pub fn set_timeouts(&mut self, timeouts: WaitTimeouts) {
        self.timeouts = timeouts;
    }

    pub fn timeouts(&self) -> WaitTimeouts {
        self.timeouts
    }

    /// Stores an arbitrary value under `key`, replacing any previous value.
    pub fn insert_extension<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) {
        self.extensions.insert(key.into(), Arc::new(value));
    }

    /// Reads back a value stored with [`insert_extension`](Self::insert_extension).
    pub fn extension<T: Any + Send + Sync>(&self, key: &str) -> Result<&T, ContextError> {
        let value = self
            .extensions
            .get(key)
            .ok_or_else(|| ContextError::Missing(format!("'{}'", key)))?;
        value
            .downcast_ref::<T>()
            .ok_or_else(|| ContextError::WrongType {
                key: key.to_string(),
                expected: std::any::type_name::<T>(),
            })
    }

    pub fn has_extension(&self, key: &str) -> bool {
        self.extensions.contains_key(key)
    }
}

impl std::fmt::Debug for ContextData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextData")
            .field("release_manager", &self.release_manager.is_some())
            .field("cluster", &self.cluster.is_some())
            .field("filesystem", &self.filesystem.is_some())
            .field("templates", &self.templates.is_some())
            .field("sanitizer", &self.sanitizer.is_some())
            .field("release", &self.release)
            .field("storage", &self.storage)
            .field("profile", &self.profile)
            .field("values_file", &self.values_file)
            .field("reuse_values", &self.reuse_values)
            .field("captured_values", &self.captured_values.is_some())
            .field("timeouts", &self.timeouts)
            .field("extensions", &self.extensions.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Everything a migration run knows about itself
#[derive(Debug)]
pub struct MigrationContext {
    run_id: Uuid,
    component: String,
    installed_version: String,
    target_version: String,
    cancel: CancellationToken,
    data: ContextData,
}

impl MigrationContext {
    /// Creates a context. `installed_version` is empty when nothing is deployed.
    pub fn new(
        component: impl Into<String>,
        installed_version: impl Into<String>,
        target_version: impl Into<String>,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            component: component.into(),
            installed_version: installed_version.into(),
            target_version: target_version.into(),
            cancel: CancellationToken::new(),
            data: ContextData::default(),
        }
    }

    /// Uses `cancel` for every wait performed during the run
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Unique ID of this run, for correlating log lines
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn component(&self) -> &str {
        &self.component
    }

    pub fn installed_version(&self) -> &str {
        &self.installed_version
    }

    pub fn target_version(&self) -> &str {
        &self.target_version
    }

    /// True when nothing was deployed at the start of the run
    pub fn is_fresh_install(&self) -> bool {
        self.installed_version.trim().is_empty()
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn data(&self) -> &ContextData {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut ContextData {
        &mut self.data
    }
}
