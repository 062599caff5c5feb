//! # blocknode-core
//!
//! Versioned migration engine for upgrading Block Node deployments across
//! releases that change their persistent resources.
//!
//! An upgrade from an installed version to a target version may cross one or
//! more *boundaries*: versions that introduced a breaking change. Each
//! boundary has a [`Migration`] that knows how to remediate it. The engine
//! decides which migrations an upgrade crosses, runs them once each in
//! registration order, and rolls back the completed ones in reverse order if
//! a later one fails.
//!
//! ## Quick Start
//!
//! ```ignore
//! use blocknode_core::{Manager, MigrationContext, Registry};
//! use std::sync::Arc;
//!
//! # async fn example(registry: Registry) -> blocknode_core::Result<()> {
//! let manager = Manager::new(Arc::new(registry));
//!
//! // Installed version is queried live from the release manager
//! let mut ctx = MigrationContext::new("block-node", "0.25.0", "0.26.2");
//! ctx.data_mut().set_release_manager(helm);
//!
//! let plan = manager.plan(&ctx)?;
//! println!("{}", plan);
//!
//! manager.execute(&mut ctx).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Observing a run
//!
//! Register a [`MigrationHook`] (any `Fn(&MigrationEvent)` closure works) to
//! follow step and rollback progress:
//!
//! ```
//! use blocknode_core::{Manager, MigrationEvent, Registry};
//! use std::sync::Arc;
//!
//! let manager = Manager::new(Arc::new(Registry::new()));
//! manager.add_hook(|event: &MigrationEvent| println!("{:?}", event));
//! ```
//!
//! ## Feature Flags
//!
//! - `test-utils` - in-memory collaborator fakes and a scripted migration

pub mod collaborators;
pub mod error;
pub mod events;
pub mod migration;
pub mod step;
pub mod storage;
pub mod version;
pub mod wait;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use collaborators::{
    ChartRef, ChartValues, ClusterClient, CollaboratorError, FilesystemManager, PathSanitizer,
    ReleaseInfo, ReleaseManager, ReleaseRequest, ReleaseTarget, ResourceCondition, ResourceRef,
    ResourceSelector, TemplateRenderer,
};
pub use error::{MigrationError, Result, RollbackFailure};
pub use events::{MigrationEvent, MigrationHook};
pub use migration::{
    CapturedValues, ContextData, ContextError, Manager, Migration, MigrationContext,
    MigrationMetadata, MigrationPlan, Registry, RegistryError, WaitTimeouts,
};
pub use step::{ExecutionFailure, ExecutionReport, SequentialExecutor, Step};
pub use storage::{
    StorageCategory, StorageConfig, StorageError, StorageLayout, StorageLayoutResolver,
    VERIFICATION_MIN_VERSION,
};
pub use version::{applies, parse_version, VersionError, VersionField};
pub use wait::{poll_until, DEFAULT_POLL_INTERVAL, DEFAULT_WAIT_TIMEOUT};
