use async_trait::async_trait;
use blocknode_core::{CollaboratorError, FilesystemManager};
use std::path::{Path, PathBuf};
use tokio::fs;

/// [`FilesystemManager`] for storage directories on the local host
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFilesystem;

impl LocalFilesystem {
    pub fn new() -> Self {
        Self
    }
}

fn io_failure(operation: &str, path: &Path, e: std::io::Error) -> CollaboratorError {
    CollaboratorError::failed(operation, format!("{}: {}", path.display(), e))
}

#[cfg(unix)]
async fn set_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).await
}

#[cfg(not(unix))]
async fn set_mode(path: &Path, _mode: u32) -> std::io::Result<()> {
    log::warn!(
        "permission bits are not supported on this platform; leaving {} unchanged",
        path.display()
    );
    Ok(())
}

#[async_trait]
impl FilesystemManager for LocalFilesystem {
    async fn path_exists(&self, path: &Path) -> Result<bool, CollaboratorError> {
        fs::try_exists(path)
            .await
            .map_err(|e| io_failure("check path", path, e))
    }

    async fn create_directory(&self, path: &Path, recursive: bool) -> Result<(), CollaboratorError> {
        log::info!("creating directory {}", path.display());
        let result = if recursive {
            fs::create_dir_all(path).await
        } else {
            fs::create_dir(path).await
        };
        result.map_err(|e| io_failure("create directory", path, e))
    }

    async fn write_permissions(
        &self,
        path: &Path,
        mode: u32,
        recursive: bool,
    ) -> Result<(), CollaboratorError> {
        log::debug!("chmod {:o} {}", mode, path.display());
        let mut pending: Vec<PathBuf> = vec![path.to_path_buf()];

        while let Some(current) = pending.pop() {
            set_mode(&current, mode)
                .await
                .map_err(|e| io_failure("set permissions", &current, e))?;

            let metadata = fs::symlink_metadata(&current)
                .await
                .map_err(|e| io_failure("set permissions", &current, e))?;
            if recursive && metadata.is_dir() {
                let mut entries = fs::read_dir(&current)
                    .await
                    .map_err(|e| io_failure("set permissions", &current, e))?;
                while let Some(entry) = entries
                    .next_entry()
                    .await
                    .map_err(|e| io_failure("set permissions", &current, e))?
                {
                    pending.push(entry.path());
                }
            }
        }
        Ok(())
    }

    async fn remove_contents(&self, path: &Path) -> Result<(), CollaboratorError> {
        log::info!("clearing {}", path.display());
        let mut entries = fs::read_dir(path)
            .await
            .map_err(|e| io_failure("remove contents", path, e))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| io_failure("remove contents", path, e))?
        {
            let child = entry.path();
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| io_failure("remove contents", &child, e))?;
            let result = if file_type.is_dir() {
                fs::remove_dir_all(&child).await
            } else {
                fs::remove_file(&child).await
            };
            result.map_err(|e| io_failure("remove contents", &child, e))?;
        }
        Ok(())
    }
}
