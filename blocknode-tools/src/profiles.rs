//! Packaged chart values per deployment profile
//!
//! Each profile ships two documents: one for targets below the verification
//! storage boundary and one for targets at or above it. The latter declares
//! the verification volume as externally provisioned, matching the claims
//! created by [`crate::volumes`].

use blocknode_core::{MigrationError, StorageCategory};
use serde_json::Value;

struct PackagedProfile {
    name: &'static str,
    before_verification: &'static str,
    with_verification: &'static str,
}

const PACKAGED: &[PackagedProfile] = &[
    PackagedProfile {
        name: "local",
        before_verification: include_str!("../profiles/local.json"),
        with_verification: include_str!("../profiles/local-verification.json"),
    },
    PackagedProfile {
        name: "production",
        before_verification: include_str!("../profiles/production.json"),
        with_verification: include_str!("../profiles/production-verification.json"),
    },
];

/// Names of the packaged profiles
pub fn available() -> Vec<&'static str> {
    PACKAGED.iter().map(|p| p.name).collect()
}

/// Default values for `profile` when deploying `release` at `target_version`.
pub fn defaults_for(
    profile: &str,
    target_version: &str,
    release: &str,
) -> Result<Value, MigrationError> {
    let packaged = PACKAGED
        .iter()
        .find(|p| p.name == profile)
        .ok_or_else(|| {
            MigrationError::argument(format!(
                "unknown profile '{}' (available: {})",
                profile,
                available().join(", ")
            ))
        })?;

    let document = if StorageCategory::Verification.is_required_for(target_version)? {
        packaged.with_verification
    } else {
        packaged.before_verification
    };

    let rendered = document.replace("{{ release }}", release);
    serde_json::from_str(&rendered).map_err(|e| {
        MigrationError::execution(format!("packaged profile '{}' is invalid: {}", profile, e))
    })
}
