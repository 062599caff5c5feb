//! Collaborators and migrations for upgrading a Block Node deployment
//!
//! The engine in `blocknode-core` only knows the collaborator traits. This
//! crate implements them on top of the `helm` and `kubectl` command line tools
//! and the local filesystem, ships the verification storage migration, and
//! wires everything together in [`Upgrader`].

pub mod command;
pub mod fs;
pub mod helm;
pub mod kubectl;
pub mod migrations;
pub mod pods;
pub mod profiles;
pub mod registry;
pub mod sanitize;
pub mod templates;
pub mod upgrade;
pub mod values;
pub mod volumes;

pub use command::{CommandOutput, CommandRunner, ProcessRunner};
pub use fs::LocalFilesystem;
pub use helm::HelmCli;
pub use kubectl::KubectlCli;
pub use migrations::VerificationStorageMigration;
pub use registry::{default_registry, BLOCK_NODE_COMPONENT};
pub use sanitize::StrictPathSanitizer;
pub use templates::ManifestTemplates;
pub use upgrade::{Collaborators, UpgradeOutcome, UpgradeRequest, Upgrader};
pub use values::ValuesSource;

/// Re-export commonly used types for convenience
pub mod prelude {
    pub use crate::{default_registry, Collaborators, UpgradeOutcome, UpgradeRequest, Upgrader};
    pub use blocknode_core::{
        ChartRef, Manager, MigrationError, ReleaseTarget, StorageConfig, WaitTimeouts,
    };
}
