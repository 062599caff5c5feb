//! Introduces the verification storage volume
//!
//! Charts from [`VERIFICATION_MIN_VERSION`] onward mount a fourth persistent
//! volume. The existing claims cannot be amended in place, so the release is
//! uninstalled, every volume is recreated and the chart is installed again with
//! the user's values.
//!
//! Once the release is gone, any later failure reinstalls the previous version
//! before the error is returned. If that reinstall fails as well the error is a
//! [`MigrationError::RollbackFailed`].

use crate::{pods, values, volumes};
use async_trait::async_trait;
use blocknode_core::{
    Migration, MigrationContext, MigrationError, MigrationMetadata, RollbackFailure,
    StorageCategory, StorageLayout, StorageLayoutResolver, VERIFICATION_MIN_VERSION,
};
use std::path::Path;

/// Mode applied to a newly created verification directory
const VERIFICATION_DIR_MODE: u32 = 0o777;

pub struct VerificationStorageMigration {
    metadata: MigrationMetadata,
}

impl Default for VerificationStorageMigration {
    fn default() -> Self {
        Self::new()
    }
}

impl VerificationStorageMigration {
    pub fn new() -> Self {
        Self {
            metadata: MigrationMetadata::new(
                format!("verification-storage-v{}", VERIFICATION_MIN_VERSION),
                "Recreate persistent volumes to add verification storage (reinstalls the release)",
                VERIFICATION_MIN_VERSION,
            ),
        }
    }

    async fn prepare_directory(
        &self,
        ctx: &MigrationContext,
        path: &Path,
    ) -> Result<(), MigrationError> {
        let filesystem = ctx.data().filesystem()?;
        if filesystem.path_exists(path).await? {
            log::debug!("[{}] {} already exists", self.id(), path.display());
            return Ok(());
        }

        filesystem.create_directory(path, true).await?;
        filesystem
            .write_permissions(path, VERIFICATION_DIR_MODE, true)
            .await?;
        log::info!("[{}] created {}", self.id(), path.display());
        Ok(())
    }

    async fn uninstall_chart(&self, ctx: &MigrationContext) -> Result<(), MigrationError> {
        let release = ctx.data().release()?;
        log::info!("[{}] uninstalling {}", self.id(), release.release_name);
        ctx.data()
            .release_manager()?
            .uninstall_chart(&release.release_name, &release.namespace)
            .await?;
        Ok(())
    }

    async fn uninstall(&self, ctx: &MigrationContext) -> Result<(), MigrationError> {
        self.uninstall_chart(ctx).await?;
        pods::wait_terminated(ctx).await
    }

    /// Everything after the chart was uninstalled
    async fn replace(
        &self,
        ctx: &MigrationContext,
        layout: &StorageLayout,
        target: &str,
    ) -> Result<(), MigrationError> {
        pods::wait_terminated(ctx).await?;
        volumes::recreate(ctx, layout).await?;
        self.install(ctx, target).await
    }

    /// Installs `version` again, removing whatever is deployed first.
    async fn restore(&self, ctx: &MigrationContext, version: &str) -> Result<(), MigrationError> {
        let release = ctx.data().release()?;
        if ctx
            .data()
            .release_manager()?
            .is_installed(&release.release_name, &release.namespace)
            .await?
        {
            self.uninstall(ctx).await?;
        }
        self.install(ctx, version).await
    }

    /// Reinstalls the previous version after `error` left the release uninstalled.
    async fn recover(&self, ctx: &MigrationContext, error: MigrationError) -> MigrationError {
        let previous = ctx.installed_version().to_string();
        log::warn!("[{}] {}; reinstalling {}", self.id(), error, previous);

        match self.restore(ctx, &previous).await {
            Ok(()) => {
                log::info!("[{}] {} reinstalled", self.id(), previous);
                error
            }
            Err(restore_error) => {
                log::error!("[{}] reinstalling {} failed: {}", self.id(), previous, restore_error);
                MigrationError::RollbackFailed {
                    id: self.id().to_string(),
                    source: Box::new(error),
                    rollback_failures: vec![RollbackFailure {
                        id: self.id().to_string(),
                        error: restore_error,
                    }],
                }
            }
        }
    }

    async fn install(&self, ctx: &MigrationContext, version: &str) -> Result<(), MigrationError> {
        let release = ctx.data().release()?;
        let (chart_values, source) = values::select(ctx, version)?;
        log::info!(
            "[{}] installing {} {} with {:?} values",
            self.id(),
            release.release_name,
            version,
            source
        );
        ctx.data()
            .release_manager()?
            .install_chart(&release.request(version, chart_values))
            .await?;
        pods::wait_ready(ctx).await
    }
}

#[async_trait]
impl Migration for VerificationStorageMigration {
    fn metadata(&self) -> &MigrationMetadata {
        &self.metadata
    }

    async fn execute(&self, ctx: &mut MigrationContext) -> Result<(), MigrationError> {
        let release = ctx.data().release()?.clone();
        let target = ctx.target_version().to_string();

        let installed = ctx
            .data()
            .release_manager()?
            .get_release(&release.release_name, &release.namespace)
            .await?;
        if installed.is_none() {
            return Err(MigrationError::state(format!(
                "{} is not installed in {}; nothing to migrate",
                release.release_name, release.namespace
            )));
        }

        let resolver = StorageLayoutResolver::new(ctx.data().sanitizer()?.clone());
        let layout = resolver.resolve(ctx.data().storage()?, &target)?;
        if let Some(path) = layout.path(StorageCategory::Verification) {
            self.prepare_directory(ctx, path).await?;
        }

        if ctx.data().reuse_values() && ctx.data().captured_values().is_none() {
            values::capture(ctx).await?;
        }

        self.uninstall_chart(ctx).await?;
        if let Err(error) = self.replace(ctx, &layout, &target).await {
            return Err(self.recover(ctx, error).await);
        }

        log::info!("[{}] {} is running {}", self.id(), release.release_name, target);
        Ok(())
    }

    async fn rollback(&self, ctx: &mut MigrationContext) -> Result<(), MigrationError> {
        let release = ctx.data().release()?.clone();
        let previous = ctx.installed_version().to_string();
        log::warn!(
            "[{}] restoring {} to {}; volume contents are not restored",
            self.id(),
            release.release_name,
            previous
        );
        self.restore(ctx, &previous).await
    }
}
