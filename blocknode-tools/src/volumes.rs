//! Persistent volume recreation
//!
//! Every storage category of a [`StorageLayout`] is backed by a host-path
//! `PersistentVolume` and a `PersistentVolumeClaim` bound to it. Recreating
//! deletes the claim and the volume, applies them again from the packaged
//! templates, and waits for each claim to bind.

use crate::templates::{PVC_TEMPLATE, PV_TEMPLATE};
use blocknode_core::{
    MigrationContext, MigrationError, ResourceCondition, ResourceRef, StorageCategory,
    StorageLayout,
};
use serde_json::json;
use std::path::Path;

/// Requested size of every volume
pub const DEFAULT_VOLUME_SIZE: &str = "10Gi";
/// Storage class shared by the volumes and their claims
pub const STORAGE_CLASS: &str = "block-node-manual";

/// Name of the claim backing `category` for `release`
pub fn claim_name(release: &str, category: StorageCategory) -> String {
    format!("{}-{}-pvc", release, category.name())
}

/// Name of the volume backing `category` for `release`
pub fn volume_name(release: &str, category: StorageCategory) -> String {
    format!("{}-{}-pv", release, category.name())
}

/// Rendered PV and PVC manifests for one category
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeManifests {
    pub category: StorageCategory,
    pub claim: ResourceRef,
    pub volume_manifest: String,
    pub claim_manifest: String,
}

fn render(
    ctx: &MigrationContext,
    category: StorageCategory,
    path: &Path,
) -> Result<VolumeManifests, MigrationError> {
    let release = ctx.data().release()?;
    let templates = ctx.data().templates()?;

    let claim = claim_name(&release.release_name, category);
    let volume = volume_name(&release.release_name, category);
    let data = json!({
        "name": volume,
        "claim": claim,
        "namespace": release.namespace,
        "release": release.release_name,
        "category": category.name(),
        "size": DEFAULT_VOLUME_SIZE,
        "storage_class": STORAGE_CLASS,
        "path": path.display().to_string(),
    });

    Ok(VolumeManifests {
        category,
        claim: ResourceRef::namespaced("pvc", release.namespace.clone(), claim),
        volume_manifest: templates.render(PV_TEMPLATE, &data)?,
        claim_manifest: templates.render(PVC_TEMPLATE, &data)?,
    })
}

/// Recreates the PV/PVC pair of every category in `layout` and waits for the
/// claims to bind.
///
/// Returns the categories that were recreated, in layout order.
pub async fn recreate(
    ctx: &MigrationContext,
    layout: &StorageLayout,
) -> Result<Vec<StorageCategory>, MigrationError> {
    let cluster = ctx.data().cluster()?.clone();
    let timeout = ctx.data().timeouts().pvc_bound;

    let mut manifests = Vec::new();
    for (category, path) in layout.entries() {
        manifests.push(render(ctx, category, path)?);
    }

    for m in &manifests {
        log::info!("recreating {} volume ({})", m.category, m.claim);
        cluster.delete_manifest(&m.claim_manifest).await?;
        cluster.delete_manifest(&m.volume_manifest).await?;
        cluster.apply_manifest(&m.volume_manifest).await?;
        cluster.apply_manifest(&m.claim_manifest).await?;
    }

    for m in &manifests {
        cluster
            .wait_for_resource(
                &m.claim,
                ResourceCondition::PvcBound,
                timeout,
                ctx.cancellation(),
            )
            .await?;
        log::info!("{} is bound", m.claim);
    }

    Ok(manifests.iter().map(|m| m.category).collect())
}
