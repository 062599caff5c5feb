//! Upgrade orchestration
//!
//! [`Upgrader`] is the entry point for one upgrade attempt. It asks the
//! release manager which chart version is deployed right now, builds a
//! [`MigrationContext`] from the request, and then either runs the applicable
//! migrations or performs an ordinary in-place chart upgrade.
//!
//! Nothing is persisted between runs: a run that already completed finds the
//! new version deployed and therefore has nothing left to migrate.

use crate::fs::LocalFilesystem;
use crate::helm::HelmCli;
use crate::kubectl::KubectlCli;
use crate::registry::BLOCK_NODE_COMPONENT;
use crate::sanitize::StrictPathSanitizer;
use crate::templates::ManifestTemplates;
use crate::{pods, values};
use blocknode_core::{
    parse_version, ClusterClient, ExecutionReport, FilesystemManager, Manager, MigrationContext,
    MigrationError, MigrationPlan, PathSanitizer, ReleaseInfo, ReleaseManager, ReleaseTarget,
    StorageConfig, StorageLayoutResolver, TemplateRenderer, VersionField, WaitTimeouts,
};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Handles to everything a run talks to
#[derive(Clone)]
pub struct Collaborators {
    pub release_manager: Arc<dyn ReleaseManager>,
    pub cluster: Arc<dyn ClusterClient>,
    pub filesystem: Arc<dyn FilesystemManager>,
    pub templates: Arc<dyn TemplateRenderer>,
    pub sanitizer: Arc<dyn PathSanitizer>,
}

impl Collaborators {
    /// Helm and kubectl on the `PATH`, with local storage directories
    pub fn local(helm: HelmCli, kubectl: KubectlCli) -> Self {
        Self {
            release_manager: Arc::new(helm),
            cluster: Arc::new(kubectl),
            filesystem: Arc::new(LocalFilesystem::new()),
            templates: Arc::new(ManifestTemplates::new()),
            sanitizer: Arc::new(StrictPathSanitizer::new()),
        }
    }
}

/// What the caller wants deployed
#[derive(Debug, Clone)]
pub struct UpgradeRequest {
    pub release: ReleaseTarget,
    pub target_version: String,
    pub storage: StorageConfig,
    /// Packaged profile whose defaults are used when no other values apply
    pub profile: Option<String>,
    /// Explicit values file, highest priority
    pub values_file: Option<PathBuf>,
    /// Reinstall with the values currently deployed
    pub reuse_values: bool,
    pub timeouts: WaitTimeouts,
}

impl UpgradeRequest {
    pub fn new(release: ReleaseTarget, target_version: impl Into<String>) -> Self {
        Self {
            release,
            target_version: target_version.into(),
            storage: StorageConfig::default(),
            profile: None,
            values_file: None,
            reuse_values: false,
            timeouts: WaitTimeouts::default(),
        }
    }
}

/// How a completed run got to the target version
#[derive(Debug)]
pub enum UpgradeOutcome {
    /// The target was already deployed; nothing was changed
    UpToDate { version: String },
    /// Migrations ran and deployed the target
    Migrated {
        from: String,
        to: String,
        report: ExecutionReport,
    },
    /// No migration applied; the chart was upgraded in place
    Upgraded { from: String, to: String },
}

impl fmt::Display for UpgradeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpgradeOutcome::UpToDate { version } => write!(f, "already at {}", version),
            UpgradeOutcome::Migrated { from, to, report } => write!(
                f,
                "migrated {} -> {} ({}) in {:.1}s",
                from,
                to,
                report.executed.join(", "),
                report.duration.as_secs_f64()
            ),
            UpgradeOutcome::Upgraded { from, to } => write!(f, "upgraded {} -> {}", from, to),
        }
    }
}

/// Runs upgrades against one set of collaborators
#[derive(Clone)]
pub struct Upgrader {
    manager: Manager,
    collaborators: Collaborators,
}

impl Upgrader {
    pub fn new(manager: Manager, collaborators: Collaborators) -> Self {
        Self {
            manager,
            collaborators,
        }
    }

    pub fn manager(&self) -> &Manager {
        &self.manager
    }

    /// The release as deployed right now
    pub async fn deployed(&self, release: &ReleaseTarget) -> Result<ReleaseInfo, MigrationError> {
        self.collaborators
            .release_manager
            .get_release(&release.release_name, &release.namespace)
            .await?
            .ok_or_else(|| {
                MigrationError::state(format!(
                    "{} is not installed in {}; install it before upgrading",
                    release.release_name, release.namespace
                ))
            })
    }

    /// Builds the context for `request` from the live installed version.
    pub async fn context(
        &self,
        request: &UpgradeRequest,
        cancel: CancellationToken,
    ) -> Result<MigrationContext, MigrationError> {
        let deployed = self.deployed(&request.release).await?;

        let mut ctx = MigrationContext::new(
            BLOCK_NODE_COMPONENT,
            deployed.chart_version,
            request.target_version.clone(),
        )
        .with_cancellation(cancel);

        let data = ctx.data_mut();
        data.set_release_manager(self.collaborators.release_manager.clone());
        data.set_cluster(self.collaborators.cluster.clone());
        data.set_filesystem(self.collaborators.filesystem.clone());
        data.set_templates(self.collaborators.templates.clone());
        data.set_sanitizer(self.collaborators.sanitizer.clone());
        data.set_release(request.release.clone());
        data.set_storage(request.storage.clone());
        data.set_reuse_values(request.reuse_values);
        data.set_timeouts(request.timeouts);
        if let Some(profile) = &request.profile {
            data.set_profile(profile.clone());
        }
        if let Some(file) = &request.values_file {
            data.set_values_file(file.clone());
        }

        Ok(ctx)
    }

    /// The migrations `request` would run. Changes nothing.
    pub async fn plan(&self, request: &UpgradeRequest) -> Result<MigrationPlan, MigrationError> {
        let ctx = self.context(request, CancellationToken::new()).await?;
        self.manager.plan(&ctx)
    }

    /// Brings the release to the requested version.
    pub async fn run(
        &self,
        request: &UpgradeRequest,
        cancel: CancellationToken,
    ) -> Result<UpgradeOutcome, MigrationError> {
        let mut ctx = self.context(request, cancel).await?;
        let from = ctx.installed_version().to_string();
        let to = ctx.target_version().to_string();

        let plan = self.manager.plan(&ctx)?;
        if plan.is_empty()
            && parse_version(&from, VersionField::Installed)?
                == parse_version(&to, VersionField::Target)?
        {
            log::info!("{} is already at {}", request.release.release_name, to);
            return Ok(UpgradeOutcome::UpToDate { version: to });
        }

        if ctx.data().reuse_values() {
            values::capture(&mut ctx).await?;
        }

        // Unusable input must surface before anything is uninstalled
        let (chart_values, source) = values::select(&ctx, &to)?;

        if !plan.is_empty() {
            StorageLayoutResolver::new(self.collaborators.sanitizer.clone())
                .resolve(&request.storage, &to)?;
            log::info!("{}", plan);
            let report = self.manager.execute(&mut ctx).await?;
            return Ok(UpgradeOutcome::Migrated { from, to, report });
        }

        log::info!(
            "upgrading {} {} -> {} with {:?} values",
            request.release.release_name,
            from,
            to,
            source
        );
        self.collaborators
            .release_manager
            .upgrade_chart(&request.release.request(to.clone(), chart_values))
            .await?;
        pods::wait_ready(&ctx).await?;

        Ok(UpgradeOutcome::Upgraded { from, to })
    }
}
