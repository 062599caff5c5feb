// Integration tests for blocknode-tools
//
// These run whole upgrades through the Upgrader with the real filesystem,
// sanitizer and templates, and in-memory release manager and cluster.

use async_trait::async_trait;
use blocknode_core::test_utils::{FakeClusterClient, FakeReleaseManager, RecordingMigration};
use blocknode_core::{
    ChartRef, ChartValues, Manager, Migration, MigrationContext, MigrationError,
    MigrationMetadata, Registry, ReleaseTarget, StorageConfig,
};
use blocknode_tools::{
    default_registry, Collaborators, LocalFilesystem, ManifestTemplates, StrictPathSanitizer,
    UpgradeOutcome, UpgradeRequest, Upgrader, VerificationStorageMigration, BLOCK_NODE_COMPONENT,
};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

struct Harness {
    _temp: TempDir,
    base: PathBuf,
    helm: Arc<FakeReleaseManager>,
    cluster: Arc<FakeClusterClient>,
}

impl Harness {
    fn new(installed: &str) -> Self {
        let temp = TempDir::new().unwrap();
        let base = temp.path().canonicalize().unwrap().join("block-node");
        Self {
            _temp: temp,
            base,
            helm: Arc::new(FakeReleaseManager::new().with_release_values(
                "block-node",
                "solo",
                installed,
                json!({"blockNode": {"resources": {"cpu": "4"}}}),
            )),
            cluster: Arc::new(FakeClusterClient::new()),
        }
    }

    fn upgrader(&self, registry: Registry) -> Upgrader {
        let collaborators = Collaborators {
            release_manager: self.helm.clone(),
            cluster: self.cluster.clone(),
            filesystem: Arc::new(LocalFilesystem::new()),
            templates: Arc::new(ManifestTemplates::new()),
            sanitizer: Arc::new(StrictPathSanitizer::new()),
        };
        Upgrader::new(Manager::new(Arc::new(registry)), collaborators)
    }

    fn request(&self, target: &str) -> UpgradeRequest {
        let mut request = UpgradeRequest::new(
            ReleaseTarget {
                release_name: "block-node".into(),
                namespace: "solo".into(),
                chart: ChartRef::new("oci://ghcr.io/hiero-ledger/charts/block-node-server"),
            },
            target,
        );
        request.storage = StorageConfig::with_base(self.base.to_string_lossy());
        request.profile = Some("production".into());
        request.reuse_values = true;
        request
    }

    fn deployed(&self) -> Option<String> {
        self.helm.deployed_version("block-node", "solo")
    }
}

/// Fails after arranging for every later chart install to fail too
struct SabotageMigration {
    metadata: MigrationMetadata,
    helm: Arc<FakeReleaseManager>,
}

#[async_trait]
impl Migration for SabotageMigration {
    fn metadata(&self) -> &MigrationMetadata {
        &self.metadata
    }

    async fn execute(&self, _ctx: &mut MigrationContext) -> Result<(), MigrationError> {
        self.helm.set_failing("install_chart");
        Err(MigrationError::execution("index rebuild failed"))
    }

    async fn rollback(&self, _ctx: &mut MigrationContext) -> Result<(), MigrationError> {
        Ok(())
    }
}

#[tokio::test]
async fn test_upgrade_across_boundary_creates_verification_storage() {
    let harness = Harness::new("0.25.0");
    let upgrader = harness.upgrader(default_registry().unwrap());

    let outcome = upgrader
        .run(&harness.request("0.26.2"), CancellationToken::new())
        .await
        .unwrap();

    assert!(matches!(outcome, UpgradeOutcome::Migrated { .. }));
    assert_eq!(harness.deployed().as_deref(), Some("0.26.2"));
    assert!(harness.base.join("verification").is_dir());

    let applied = harness.cluster.applied();
    let verification_pv = format!("path: {}", harness.base.join("verification").display());
    assert!(applied.iter().any(|m| m.contains(&verification_pv)));
    assert!(applied.iter().any(|m| m.contains("name: block-node-verification-pvc")));

    assert_eq!(
        harness.helm.requests().last().unwrap().values,
        ChartValues::Inline(json!({"blockNode": {"resources": {"cpu": "4"}}}))
    );
}

#[tokio::test]
async fn test_second_run_is_idempotent() {
    let harness = Harness::new("0.25.0");
    let upgrader = harness.upgrader(default_registry().unwrap());
    let request = harness.request("0.26.2");

    upgrader.run(&request, CancellationToken::new()).await.unwrap();
    let requests_after_first = harness.helm.requests().len();

    let plan = upgrader.plan(&request).await.unwrap();
    assert!(plan.is_empty());
    let outcome = upgrader.run(&request, CancellationToken::new()).await.unwrap();
    assert!(matches!(outcome, UpgradeOutcome::UpToDate { .. }));
    assert_eq!(harness.helm.requests().len(), requests_after_first);
}

#[tokio::test]
async fn test_later_failure_restores_previous_version() {
    let harness = Harness::new("0.25.0");
    let registry = default_registry()
        .unwrap()
        .with(
            BLOCK_NODE_COMPONENT,
            Arc::new(RecordingMigration::new("reindex-v0.26.2", "0.26.2").failing_execute()),
        )
        .unwrap();
    let upgrader = harness.upgrader(registry);

    let err = upgrader
        .run(&harness.request("0.26.2"), CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.failed_migration(), Some("reindex-v0.26.2"));
    assert!(!err.requires_manual_intervention());
    assert!(err.to_string().contains("system restored by rollback"));
    assert_eq!(harness.deployed().as_deref(), Some("0.25.0"));
}

#[tokio::test]
async fn test_failed_rollback_needs_manual_intervention() {
    let harness = Harness::new("0.25.0");
    let registry = Registry::new()
        .with(BLOCK_NODE_COMPONENT, Arc::new(VerificationStorageMigration::new()))
        .unwrap()
        .with(
            BLOCK_NODE_COMPONENT,
            Arc::new(SabotageMigration {
                metadata: MigrationMetadata::new("reindex-v0.26.2", "Rebuild indexes", "0.26.2"),
                helm: harness.helm.clone(),
            }),
        )
        .unwrap();
    let upgrader = harness.upgrader(registry);

    let err = upgrader
        .run(&harness.request("0.26.2"), CancellationToken::new())
        .await
        .unwrap_err();

    assert!(err.requires_manual_intervention());
    let message = err.to_string();
    assert!(message.contains("index rebuild failed"));
    assert!(message.contains("verification-storage-v0.26.2"));
    assert!(harness.deployed().is_none());
}

#[tokio::test]
async fn test_reinstall_failure_after_uninstall_needs_manual_intervention() {
    let harness = Harness::new("0.25.0");
    harness.helm.set_failing("install_chart");
    let upgrader = harness.upgrader(default_registry().unwrap());

    let err = upgrader
        .run(&harness.request("0.26.2"), CancellationToken::new())
        .await
        .unwrap_err();

    assert!(err.requires_manual_intervention());
    assert_eq!(err.failed_migration(), Some("verification-storage-v0.26.2"));
    let message = err.to_string();
    assert!(message.contains("rollback ALSO failed"));
    assert!(!message.contains("system restored by rollback"));
    assert!(harness.deployed().is_none());
}

#[tokio::test]
async fn test_install_failure_after_uninstall_restores_previous_version() {
    let harness = Harness::new("0.25.0");
    let helm = Arc::new(
        FakeReleaseManager::new()
            .with_release_values(
                "block-node",
                "solo",
                "0.25.0",
                json!({"blockNode": {"resources": {"cpu": "4"}}}),
            )
            .fail_once_on("install_chart"),
    );
    let harness = Harness { helm, ..harness };
    let upgrader = harness.upgrader(default_registry().unwrap());

    let err = upgrader
        .run(&harness.request("0.26.2"), CancellationToken::new())
        .await
        .unwrap_err();

    assert!(!err.requires_manual_intervention());
    assert!(err.to_string().contains("system restored by rollback"));
    assert_eq!(harness.deployed().as_deref(), Some("0.25.0"));
    assert_eq!(
        harness.helm.requests().last().unwrap().values,
        ChartValues::Inline(json!({"blockNode": {"resources": {"cpu": "4"}}}))
    );
}

#[tokio::test]
async fn test_unsafe_base_path_rejected_before_any_change() {
    let harness = Harness::new("0.25.0");
    let upgrader = harness.upgrader(default_registry().unwrap());
    let mut request = harness.request("0.26.2");
    request.storage = StorageConfig::with_base("/mnt/data;rm -rf /");

    let err = upgrader
        .run(&request, CancellationToken::new())
        .await
        .unwrap_err();

    assert!(err.is_argument());
    assert_eq!(harness.deployed().as_deref(), Some("0.25.0"));
    assert!(harness.cluster.calls().is_empty());
}
