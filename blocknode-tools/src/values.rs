//! Preserving user-supplied chart values across a destructive reinstall
//!
//! Before a release is uninstalled its user-supplied values are captured into
//! the migration context. When the release is installed again the values are
//! chosen in strict priority:
//!
//! 1. an explicit values file
//! 2. the captured snapshot, when reuse was requested and one exists
//! 3. the packaged defaults of the selected profile, for the version being installed

use crate::profiles;
use blocknode_core::{CapturedValues, ChartValues, MigrationContext, MigrationError};

/// Where reinstall values came from, for logs and dry runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValuesSource {
    File,
    Captured,
    Profile,
}

/// Snapshots the release's user-supplied values into `ctx`.
///
/// Returns whether a non-empty snapshot was stored. A release with no user
/// values, or no release at all, stores nothing.
pub async fn capture(ctx: &mut MigrationContext) -> Result<bool, MigrationError> {
    let release = ctx.data().release()?.clone();
    let manager = ctx.data().release_manager()?.clone();

    let Some(info) = manager
        .get_release(&release.release_name, &release.namespace)
        .await?
    else {
        log::debug!("{} is not installed; nothing to capture", release.release_name);
        return Ok(false);
    };

    let captured = CapturedValues::new(info.user_values);
    if captured.is_empty() {
        log::info!("{} has no user-supplied values", release.release_name);
        return Ok(false);
    }

    log::info!(
        "captured user-supplied values of {} at {}",
        release.release_name,
        info.chart_version
    );
    ctx.data_mut().set_captured_values(captured);
    Ok(true)
}

/// Chooses the values to install `version` with, see the module docs.
pub fn select(
    ctx: &MigrationContext,
    version: &str,
) -> Result<(ChartValues, ValuesSource), MigrationError> {
    let data = ctx.data();

    if let Some(file) = data.values_file() {
        let path = data
            .sanitizer()?
            .validate_input_file(&file.to_string_lossy())?;
        return Ok((ChartValues::File(path), ValuesSource::File));
    }

    if data.reuse_values() {
        if let Some(captured) = data.captured_values().filter(|c| !c.is_empty()) {
            return Ok((
                ChartValues::Inline(captured.values().clone()),
                ValuesSource::Captured,
            ));
        }
    }

    if let Some(profile) = data.profile() {
        let release = data.release()?;
        let defaults = profiles::defaults_for(profile, version, &release.release_name)?;
        return Ok((ChartValues::Inline(defaults), ValuesSource::Profile));
    }

    if data.reuse_values() {
        return Err(MigrationError::state(
            "reuse of existing values was requested but none were captured, \
             and neither a values file nor a profile was given",
        ));
    }

    Err(MigrationError::argument(
        "no chart values source: set a values file, a profile, or reuse existing values",
    ))
}
