use super::CollaboratorError;
use std::path::PathBuf;

/// Rejects unsafe user-supplied paths
///
/// Implementations decide what "unsafe" means; the engine only relies on a
/// successful result being a clean path it may hand to other collaborators.
pub trait PathSanitizer: Send + Sync {
    /// Validates a path that will be created or written to.
    fn sanitize_path(&self, path: &str) -> Result<PathBuf, CollaboratorError>;

    /// Validates a path that must name an existing, readable regular file.
    fn validate_input_file(&self, path: &str) -> Result<PathBuf, CollaboratorError>;
}
