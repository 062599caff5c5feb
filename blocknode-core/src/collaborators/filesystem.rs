use super::CollaboratorError;
use async_trait::async_trait;
use std::path::Path;

/// Filesystem operations on the host backing the storage volumes
#[async_trait]
pub trait FilesystemManager: Send + Sync {
    async fn path_exists(&self, path: &Path) -> Result<bool, CollaboratorError>;

    /// Creates a directory, including missing parents when `recursive` is set.
    async fn create_directory(&self, path: &Path, recursive: bool) -> Result<(), CollaboratorError>;

    /// Sets unix permission bits (e.g. `0o777`) on `path`.
    async fn write_permissions(
        &self,
        path: &Path,
        mode: u32,
        recursive: bool,
    ) -> Result<(), CollaboratorError>;

    /// Deletes everything inside `path`, keeping the directory itself.
    async fn remove_contents(&self, path: &Path) -> Result<(), CollaboratorError>;
}
