//! Capabilities the migration engine consumes but does not implement.
//!
//! Migrations reach the outside world only through these traits. Concrete
//! implementations (Helm and kubectl wrappers, the local filesystem, the
//! packaged manifest templates) live in `blocknode-tools`; in-memory fakes live
//! in [`crate::test_utils`].
//!
//! | Trait | Backs |
//! |-------|-------|
//! | [`ReleaseManager`] | Chart install/upgrade/uninstall and release history |
//! | [`ClusterClient`] | Manifest apply/delete, resource waits, scaling, annotations |
//! | [`FilesystemManager`] | Directory creation and permissions on storage hosts |
//! | [`TemplateRenderer`] | Rendering packaged manifest templates |
//! | [`PathSanitizer`] | Rejecting unsafe user-supplied paths |

mod cluster;
mod filesystem;
mod release;
mod sanitizer;
mod template;

pub use cluster::{ClusterClient, ResourceCondition, ResourceRef, ResourceSelector};
pub use filesystem::FilesystemManager;
pub use release::{
    ChartRef, ChartValues, ReleaseInfo, ReleaseManager, ReleaseRequest, ReleaseTarget,
};
pub use sanitizer::PathSanitizer;
pub use template::TemplateRenderer;

use std::time::Duration;

/// Errors reported by collaborator implementations
#[derive(Debug, thiserror::Error)]
pub enum CollaboratorError {
    /// An external operation ran and reported failure
    #[error("{operation} failed: {message}")]
    Failed { operation: String, message: String },

    /// A bounded wait expired before its condition held
    #[error("timed out after {}s waiting for {what}", timeout.as_secs())]
    Timeout { what: String, timeout: Duration },

    /// A wait was cancelled by the caller
    #[error("cancelled while waiting for {0}")]
    Cancelled(String),

    /// A path failed sanitization
    #[error("invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    /// A template could not be found or rendered
    #[error("template error: {0}")]
    Template(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CollaboratorError {
    /// Shorthand for [`CollaboratorError::Failed`]
    pub fn failed(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failed {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Shorthand for [`CollaboratorError::InvalidPath`]
    pub fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Returns true if this error came from an expired wait
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Returns true if this error came from cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }
}
