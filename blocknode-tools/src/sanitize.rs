//! Path sanitization for user-supplied storage paths and input files.
//!
//! Paths given on the command line or in the configuration file end up in
//! Kubernetes manifests and in `helm`/`kubectl` arguments, so they are held to
//! a strict shape before use:
//!
//! - non-empty and absolute
//! - no `..` or `.` segments, no repeated or trailing separators
//! - no shell metacharacters
//! - optionally confined to a root directory, checked after canonicalizing
//!   the nearest existing ancestor so symlinks cannot escape it
//!
//! # Example
//!
//! ```
//! use blocknode_core::PathSanitizer;
//! use blocknode_tools::StrictPathSanitizer;
//!
//! let sanitizer = StrictPathSanitizer::new();
//! assert!(sanitizer.sanitize_path("/mnt/block-node/live").is_ok());
//! assert!(sanitizer.sanitize_path("/mnt/../etc").is_err());
//! assert!(sanitizer.sanitize_path("/mnt/data; rm -rf /").is_err());
//! ```

use blocknode_core::{CollaboratorError, PathSanitizer};
use regex::Regex;
use std::path::{Component, Path, PathBuf};

lazy_static::lazy_static! {
    /// Characters a shell would interpret
    static ref SHELL_METACHARACTERS: Regex =
        Regex::new(r#"[;&|`$<>(){}\[\]*?!~'"\\\s]"#).expect("Invalid metacharacter regex");
}

/// The production [`PathSanitizer`]
#[derive(Debug, Clone, Default)]
pub struct StrictPathSanitizer {
    root: Option<PathBuf>,
}

impl StrictPathSanitizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Additionally requires every path to stay inside `root`.
    pub fn within(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    fn check_shape(&self, path: &str) -> Result<PathBuf, CollaboratorError> {
        if path.is_empty() {
            return Err(CollaboratorError::invalid_path(path, "path is empty"));
        }
        if let Some(found) = SHELL_METACHARACTERS.find(path) {
            return Err(CollaboratorError::invalid_path(
                path,
                format!("contains shell metacharacter '{}'", found.as_str()),
            ));
        }

        let candidate = Path::new(path);
        if !candidate.is_absolute() {
            return Err(CollaboratorError::invalid_path(path, "path must be absolute"));
        }
        if candidate
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(CollaboratorError::invalid_path(path, "contains '..' segment"));
        }

        // `components()` drops `.` segments and duplicate separators
        let clean: PathBuf = candidate.components().collect();
        if clean.as_os_str() != candidate.as_os_str() {
            return Err(CollaboratorError::invalid_path(
                path,
                format!("path is not clean (expected '{}')", clean.display()),
            ));
        }

        Ok(clean)
    }

    fn check_root(&self, path: &Path) -> Result<(), CollaboratorError> {
        let Some(root) = &self.root else {
            return Ok(());
        };

        let canonical_root = root.canonicalize().map_err(|e| {
            CollaboratorError::invalid_path(
                root.display().to_string(),
                format!("cannot resolve root: {}", e),
            )
        })?;

        // For paths that don't exist yet, validate the nearest existing ancestor
        let mut existing = path;
        while !existing.exists() {
            existing = existing.parent().ok_or_else(|| {
                CollaboratorError::invalid_path(
                    path.display().to_string(),
                    "no existing ancestor",
                )
            })?;
        }

        let canonical = existing.canonicalize().map_err(|e| {
            CollaboratorError::invalid_path(path.display().to_string(), e.to_string())
        })?;

        if !canonical.starts_with(&canonical_root) {
            return Err(CollaboratorError::invalid_path(
                path.display().to_string(),
                format!(
                    "escapes '{}' (resolved to '{}')",
                    canonical_root.display(),
                    canonical.display()
                ),
            ));
        }
        Ok(())
    }
}

impl PathSanitizer for StrictPathSanitizer {
    fn sanitize_path(&self, path: &str) -> Result<PathBuf, CollaboratorError> {
        let clean = self.check_shape(path)?;
        self.check_root(&clean)?;
        Ok(clean)
    }

    fn validate_input_file(&self, path: &str) -> Result<PathBuf, CollaboratorError> {
        let clean = self.sanitize_path(path)?;

        let metadata = std::fs::metadata(&clean).map_err(|e| {
            CollaboratorError::invalid_path(path, format!("cannot read file: {}", e))
        })?;
        if !metadata.is_file() {
            return Err(CollaboratorError::invalid_path(path, "not a regular file"));
        }
        std::fs::File::open(&clean).map_err(|e| {
            CollaboratorError::invalid_path(path, format!("cannot open file: {}", e))
        })?;

        Ok(clean)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_accepts_clean_absolute_paths() {
        let sanitizer = StrictPathSanitizer::new();
        for good in ["/mnt/data", "/var/lib/block-node/archive_01", "/"] {
            assert_eq!(
                sanitizer.sanitize_path(good).unwrap(),
                PathBuf::from(good),
                "Rejected {}",
                good
            );
        }
    }

    #[test]
    fn test_rejects_unsafe_paths() {
        let sanitizer = StrictPathSanitizer::new();
        let cases = [
            ("", "empty"),
            ("relative/dir", "absolute"),
            ("/mnt/../etc", ".."),
            ("/mnt/./data", "not clean"),
            ("/mnt//data", "not clean"),
            ("/mnt/data/", "not clean"),
            ("/mnt/data;reboot", "metacharacter"),
            ("/mnt/$HOME", "metacharacter"),
            ("/mnt/my data", "metacharacter"),
            ("~/data", "metacharacter"),
        ];

        for (path, reason) in cases {
            let err = sanitizer.sanitize_path(path).unwrap_err();
            assert!(
                err.to_string().contains(reason),
                "'{}' rejected for the wrong reason: {}",
                path,
                err
            );
        }
    }

    #[test]
    fn test_root_confinement() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().canonicalize().unwrap();
        let sanitizer = StrictPathSanitizer::within(&root);

        let inside = root.join("volumes/live");
        assert!(sanitizer.sanitize_path(inside.to_str().unwrap()).is_ok());

        let err = sanitizer.sanitize_path("/etc").unwrap_err();
        assert!(err.to_string().contains("escapes"));
    }

    #[cfg(unix)]
    #[test]
    fn test_root_confinement_follows_symlinks() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().canonicalize().unwrap();
        std::os::unix::fs::symlink("/etc", root.join("escape")).unwrap();

        let sanitizer = StrictPathSanitizer::within(&root);
        let target = root.join("escape/passwd");
        assert!(sanitizer.sanitize_path(target.to_str().unwrap()).is_err());
    }

    #[test]
    fn test_validate_input_file() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().canonicalize().unwrap();
        let file = root.join("values.yaml");
        std::fs::write(&file, "replicas: 1\n").unwrap();

        let sanitizer = StrictPathSanitizer::new();
        assert_eq!(
            sanitizer.validate_input_file(file.to_str().unwrap()).unwrap(),
            file
        );

        let err = sanitizer
            .validate_input_file(root.to_str().unwrap())
            .unwrap_err();
        assert!(err.to_string().contains("not a regular file"));

        let missing = root.join("missing.yaml");
        let err = sanitizer
            .validate_input_file(missing.to_str().unwrap())
            .unwrap_err();
        assert!(err.to_string().contains("cannot read file"));
    }
}
