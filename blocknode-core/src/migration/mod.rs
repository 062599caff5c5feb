//! Versioned migrations
//!
//! A [`Migration`] is a named remediation procedure tied to the version that
//! introduced a breaking change. Migrations are registered per component in a
//! [`Registry`] at startup and driven by a [`Manager`], which selects the ones
//! an upgrade crosses, runs them in registration order, and rolls completed
//! ones back in reverse order if a later one fails.
//!
//! # Implementing a migration
//!
//! Hold a [`MigrationMetadata`] and return it from
//! [`Migration::metadata`]; identity and applicability come for free.
//!
//! ```
//! use async_trait::async_trait;
//! use blocknode_core::migration::{Migration, MigrationContext, MigrationMetadata};
//! use blocknode_core::MigrationError;
//!
//! struct RenameLabels {
//!     metadata: MigrationMetadata,
//! }
//!
//! impl RenameLabels {
//!     fn new() -> Self {
//!         Self {
//!             metadata: MigrationMetadata::new(
//!                 "rename-labels-v0.30.0",
//!                 "Relabel pods for the 0.30 selector change",
//!                 "0.30.0",
//!             ),
//!         }
//!     }
//! }
//!
//! #[async_trait]
//! impl Migration for RenameLabels {
//!     fn metadata(&self) -> &MigrationMetadata {
//!         &self.metadata
//!     }
//!
//!     async fn execute(&self, _ctx: &mut MigrationContext) -> Result<(), MigrationError> {
//!         Ok(())
//!     }
//!
//!     async fn rollback(&self, _ctx: &mut MigrationContext) -> Result<(), MigrationError> {
//!         Ok(())
//!     }
//! }
//!
//! let migration = RenameLabels::new();
//! assert!(migration.applies("0.29.0", "0.30.1").unwrap());
//! ```

mod context;
mod manager;
mod registry;

pub use context::{CapturedValues, ContextData, ContextError, MigrationContext, WaitTimeouts};
pub use manager::{Manager, MigrationPlan};
pub use registry::{Registry, RegistryError};

use crate::error::MigrationError;
use crate::version::{self, VersionError};
use async_trait::async_trait;

/// Identity and version boundary of a migration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationMetadata {
    id: String,
    description: String,
    min_version: String,
}

impl MigrationMetadata {
    /// `id` should follow the `<feature>-v<min_version>` convention.
    pub fn new(
        id: impl Into<String>,
        description: impl Into<String>,
        min_version: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            min_version: min_version.into(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn min_version(&self) -> &str {
        &self.min_version
    }

    /// See [`version::applies`]
    pub fn applies(&self, installed: &str, target: &str) -> Result<bool, VersionError> {
        version::applies(installed, target, &self.min_version)
    }
}

/// A version-scoped remediation procedure
///
/// Implementations are stateless: anything a run needs lives in the
/// [`MigrationContext`]. `rollback` is only ever called after `execute`
/// returned `Ok` in the same run; partial progress inside a failed `execute`
/// is the implementation's own responsibility.
#[async_trait]
pub trait Migration: Send + Sync {
    fn metadata(&self) -> &MigrationMetadata;

    fn id(&self) -> &str {
        self.metadata().id()
    }

    fn description(&self) -> &str {
        self.metadata().description()
    }

    fn min_version(&self) -> &str {
        self.metadata().min_version()
    }

    /// Whether an upgrade from `installed` to `target` crosses this migration's boundary
    fn applies(&self, installed: &str, target: &str) -> Result<bool, VersionError> {
        self.metadata().applies(installed, target)
    }

    async fn execute(&self, ctx: &mut MigrationContext) -> Result<(), MigrationError>;

    /// Best-effort undo of a successful `execute`
    async fn rollback(&self, ctx: &mut MigrationContext) -> Result<(), MigrationError>;
}
