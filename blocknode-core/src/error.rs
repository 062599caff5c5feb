//! Top-level error type for the migration engine
//!
//! [`MigrationError`] wraps the lower-level errors of each module and adds the
//! two compound outcomes of a failed run. Callers usually only need the
//! classification helpers:
//!
//! - [`MigrationError::is_argument`] - bad input, nothing was changed
//! - [`MigrationError::is_state`] - the deployment is not in a state the upgrade can start from
//! - [`MigrationError::is_execution`] - a migration failed while changing the system
//! - [`MigrationError::requires_manual_intervention`] - rollback failed too

use std::fmt;
use thiserror::Error;

use crate::collaborators::CollaboratorError;
use crate::migration::{ContextError, RegistryError};
use crate::storage::StorageError;
use crate::version::VersionError;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error(transparent)]
    Version(#[from] VersionError),

    /// Unusable caller input (missing profile, unreadable values file, ...)
    #[error("invalid argument: {0}")]
    Argument(String),

    /// The live deployment cannot be upgraded as requested
    #[error("invalid state: {0}")]
    State(String),

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),

    /// A migration step failed for a reason not covered above
    #[error("execution failed: {0}")]
    Execution(String),

    /// A migration failed and every earlier migration was rolled back
    #[error(
        "migration '{id}' failed: {source}; system restored by rollback{}; investigate before retrying",
        format_rolled_back(rolled_back)
    )]
    RolledBack {
        id: String,
        source: Box<MigrationError>,
        rolled_back: Vec<String>,
    },

    /// A migration failed and at least one rollback failed too
    #[error(
        "migration '{id}' failed: {source}; rollback ALSO failed ({}); manual intervention required",
        format_failures(rollback_failures)
    )]
    RollbackFailed {
        id: String,
        source: Box<MigrationError>,
        rollback_failures: Vec<RollbackFailure>,
    },
}

/// One migration whose rollback failed
#[derive(Debug)]
pub struct RollbackFailure {
    pub id: String,
    pub error: MigrationError,
}

impl fmt::Display for RollbackFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.id, self.error)
    }
}

fn format_rolled_back(ids: &[String]) -> String {
    if ids.is_empty() {
        String::new()
    } else {
        format!(" of {}", ids.join(", "))
    }
}

fn format_failures(failures: &[RollbackFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl MigrationError {
    /// Shorthand for [`MigrationError::Argument`]
    pub fn argument(message: impl Into<String>) -> Self {
        Self::Argument(message.into())
    }

    /// Shorthand for [`MigrationError::State`]
    pub fn state(message: impl Into<String>) -> Self {
        Self::State(message.into())
    }

    /// Shorthand for [`MigrationError::Execution`]
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution(message.into())
    }

    /// Returns true if the input was unusable and nothing was mutated
    pub fn is_argument(&self) -> bool {
        match self {
            Self::Version(_) | Self::Argument(_) | Self::Storage(_) | Self::Context(_) => true,
            Self::Registry(RegistryError::Applicability { .. }) => true,
            Self::Collaborator(CollaboratorError::InvalidPath { .. }) => true,
            _ => false,
        }
    }

    /// Returns true if the live deployment was not in an upgradable state
    pub fn is_state(&self) -> bool {
        matches!(self, Self::State(_))
    }

    /// Returns true if a migration failed while changing the system
    pub fn is_execution(&self) -> bool {
        match self {
            Self::Execution(_) | Self::RolledBack { .. } | Self::RollbackFailed { .. } => true,
            Self::Collaborator(e) => !matches!(e, CollaboratorError::InvalidPath { .. }),
            _ => false,
        }
    }

    /// Returns true if rollback failed and the system may be half-migrated
    pub fn requires_manual_intervention(&self) -> bool {
        matches!(self, Self::RollbackFailed { .. })
    }

    /// ID of the migration whose execute failed, for compound errors
    pub fn failed_migration(&self) -> Option<&str> {
        match self {
            Self::RolledBack { id, .. } | Self::RollbackFailed { id, .. } => Some(id),
            _ => None,
        }
    }

    /// The error that started a failed run, unwrapping compound errors
    pub fn original(&self) -> &MigrationError {
        match self {
            Self::RolledBack { source, .. } | Self::RollbackFailed { source, .. } => {
                source.original()
            }
            other => other,
        }
    }
}

/// Result type for migration operations
pub type Result<T> = std::result::Result<T, MigrationError>;
