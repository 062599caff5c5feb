//! Storage layout resolution
//!
//! A Block Node keeps its data in up to four host directories, one per
//! [`StorageCategory`]. Each is either configured explicitly or derived as
//! `base_path/<dir>`. Which categories are *required* depends on the target
//! version: the verification category only exists from
//! [`VERIFICATION_MIN_VERSION`] onward.
//!
//! Every resolved path is run through the configured [`PathSanitizer`] before
//! it is returned, so callers never see an unchecked path.

use crate::collaborators::{CollaboratorError, PathSanitizer};
use crate::version::{at_or_above, VersionError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// First release that requires verification storage
pub const VERIFICATION_MIN_VERSION: &str = "0.26.2";

/// Logical storage categories of a Block Node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageCategory {
    Archive,
    Live,
    Log,
    Verification,
}

impl StorageCategory {
    /// All categories, in resolution order
    pub const ALL: [StorageCategory; 4] = [
        StorageCategory::Archive,
        StorageCategory::Live,
        StorageCategory::Log,
        StorageCategory::Verification,
    ];

    /// Category name used in errors, logs and manifest names
    pub fn name(&self) -> &'static str {
        match self {
            StorageCategory::Archive => "archive",
            StorageCategory::Live => "live",
            StorageCategory::Log => "log",
            StorageCategory::Verification => "verification",
        }
    }

    /// Directory created under the base path when no explicit path is set
    pub fn dir_name(&self) -> &'static str {
        match self {
            StorageCategory::Archive => "archive",
            StorageCategory::Live => "live",
            StorageCategory::Log => "logs",
            StorageCategory::Verification => "verification",
        }
    }

    /// Version that introduced the category, `None` if it always existed
    pub fn min_version(&self) -> Option<&'static str> {
        match self {
            StorageCategory::Verification => Some(VERIFICATION_MIN_VERSION),
            _ => None,
        }
    }

    /// Whether a deployment at `target_version` needs this category
    pub fn is_required_for(&self, target_version: &str) -> Result<bool, VersionError> {
        match self.min_version() {
            Some(min) => at_or_above(target_version, min),
            None => Ok(true),
        }
    }
}

impl fmt::Display for StorageCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// User-facing storage settings. Empty strings mean "not set".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub base_path: String,
    pub archive_path: String,
    pub live_path: String,
    pub log_path: String,
    pub verification_path: String,
}

impl StorageConfig {
    /// Config with only a base path
    pub fn with_base(base_path: impl Into<String>) -> Self {
        Self {
            base_path: base_path.into(),
            ..Default::default()
        }
    }

    /// The explicitly configured path for a category (possibly empty)
    pub fn explicit(&self, category: StorageCategory) -> &str {
        match category {
            StorageCategory::Archive => &self.archive_path,
            StorageCategory::Live => &self.live_path,
            StorageCategory::Log => &self.log_path,
            StorageCategory::Verification => &self.verification_path,
        }
    }
}

/// Resolved, sanitized storage paths
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageLayout {
    pub archive: PathBuf,
    pub live: PathBuf,
    pub log: PathBuf,
    /// `None` when the target does not need verification storage and none was set
    pub verification: Option<PathBuf>,
}

impl StorageLayout {
    pub fn path(&self, category: StorageCategory) -> Option<&Path> {
        match category {
            StorageCategory::Archive => Some(&self.archive),
            StorageCategory::Live => Some(&self.live),
            StorageCategory::Log => Some(&self.log),
            StorageCategory::Verification => self.verification.as_deref(),
        }
    }

    /// Every resolved category with its path, in [`StorageCategory::ALL`] order
    pub fn entries(&self) -> Vec<(StorageCategory, &Path)> {
        StorageCategory::ALL
            .iter()
            .filter_map(|c| self.path(*c).map(|p| (*c, p)))
            .collect()
    }
}

/// Errors produced while resolving storage paths
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("invalid storage base path: {0}")]
    InvalidBasePath(#[source] CollaboratorError),

    /// A required category has neither an explicit path nor a base path to derive one from
    #[error("{0} storage path is required but neither it nor a base path is configured")]
    Unresolved(StorageCategory),

    #[error("invalid {category} storage path: {source}")]
    InvalidPath {
        category: StorageCategory,
        #[source]
        source: CollaboratorError,
    },

    #[error(transparent)]
    Version(#[from] VersionError),
}

/// Resolves a [`StorageConfig`] into a [`StorageLayout`] for a target version
#[derive(Clone)]
pub struct StorageLayoutResolver {
    sanitizer: Arc<dyn PathSanitizer>,
}

impl StorageLayoutResolver {
    pub fn new(sanitizer: Arc<dyn PathSanitizer>) -> Self {
        Self { sanitizer }
    }

    /// Resolves all categories.
    ///
    /// Explicit paths always win over derived ones. Categories the target does
    /// not require are only populated when set explicitly, and are still
    /// sanitized in that case.
    pub fn resolve(
        &self,
        config: &StorageConfig,
        target_version: &str,
    ) -> Result<StorageLayout, StorageError> {
        let base = self.sanitized_base(config)?;

        // Every required category must be resolvable before any path is sanitized
        let mut candidates = Vec::with_capacity(StorageCategory::ALL.len());
        for category in StorageCategory::ALL {
            let candidate = self.candidate(config, base.as_deref(), target_version, category)?;
            candidates.push((category, candidate));
        }

        let mut layout = StorageLayout::default();
        for (category, candidate) in candidates {
            let resolved = self.sanitize(category, candidate)?;
            match category {
                StorageCategory::Archive => layout.archive = resolved.unwrap_or_default(),
                StorageCategory::Live => layout.live = resolved.unwrap_or_default(),
                StorageCategory::Log => layout.log = resolved.unwrap_or_default(),
                StorageCategory::Verification => layout.verification = resolved,
            }
        }

        Ok(layout)
    }

    /// Resolves a single category. `Ok(None)` means the category is not
    /// required by `target_version` and was not set.
    pub fn resolve_category(
        &self,
        config: &StorageConfig,
        target_version: &str,
        category: StorageCategory,
    ) -> Result<Option<PathBuf>, StorageError> {
        let base = self.sanitized_base(config)?;
        let candidate = self.candidate(config, base.as_deref(), target_version, category)?;
        self.sanitize(category, candidate)
    }

    fn sanitized_base(&self, config: &StorageConfig) -> Result<Option<PathBuf>, StorageError> {
        if config.base_path.is_empty() {
            return Ok(None);
        }
        self.sanitizer
            .sanitize_path(&config.base_path)
            .map(Some)
            .map_err(StorageError::InvalidBasePath)
    }

    /// The unsanitized path for `category`, or `None` when it is neither
    /// required nor set.
    fn candidate(
        &self,
        config: &StorageConfig,
        base: Option<&Path>,
        target_version: &str,
        category: StorageCategory,
    ) -> Result<Option<String>, StorageError> {
        let required = category.is_required_for(target_version)?;
        let explicit = config.explicit(category);

        if !explicit.is_empty() {
            Ok(Some(explicit.to_string()))
        } else if !required {
            Ok(None)
        } else if let Some(base) = base {
            Ok(Some(base.join(category.dir_name()).to_string_lossy().into_owned()))
        } else {
            Err(StorageError::Unresolved(category))
        }
    }

    fn sanitize(
        &self,
        category: StorageCategory,
        candidate: Option<String>,
    ) -> Result<Option<PathBuf>, StorageError> {
        let Some(candidate) = candidate else {
            return Ok(None);
        };
        self.sanitizer
            .sanitize_path(&candidate)
            .map(Some)
            .map_err(|source| StorageError::InvalidPath { category, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::FakeSanitizer;

    fn resolver() -> StorageLayoutResolver {
        StorageLayoutResolver::new(Arc::new(FakeSanitizer::new()))
    }

    #[test]
    fn test_base_path_derives_all_categories_at_boundary() {
        let layout = resolver()
            .resolve(&StorageConfig::with_base("/mnt/base"), "0.26.2")
            .unwrap();

        assert_eq!(layout.archive, PathBuf::from("/mnt/base/archive"));
        assert_eq!(layout.live, PathBuf::from("/mnt/base/live"));
        assert_eq!(layout.log, PathBuf::from("/mnt/base/logs"));
        assert_eq!(
            layout.verification,
            Some(PathBuf::from("/mnt/base/verification"))
        );
    }

    #[test]
    fn test_verification_omitted_below_boundary() {
        let layout = resolver()
            .resolve(&StorageConfig::with_base("/mnt/base"), "0.26.1")
            .unwrap();

        assert_eq!(layout.verification, None);
        assert_eq!(layout.entries().len(), 3);
    }

    #[test]
    fn test_explicit_path_wins_over_base() {
        let config = StorageConfig {
            base_path: "/mnt/base".into(),
            archive_path: "/mnt/custom-archive".into(),
            ..Default::default()
        };

        let layout = resolver().resolve(&config, "0.27.0").unwrap();

        assert_eq!(layout.archive, PathBuf::from("/mnt/custom-archive"));
        assert_eq!(layout.live, PathBuf::from("/mnt/base/live"));
        assert_eq!(layout.log, PathBuf::from("/mnt/base/logs"));
        assert_eq!(
            layout.verification,
            Some(PathBuf::from("/mnt/base/verification"))
        );
    }

    #[test]
    fn test_empty_config_fails_below_and_above_boundary() {
        let config = StorageConfig::default();

        let err = resolver().resolve(&config, "0.25.0").unwrap_err();
        assert!(matches!(err, StorageError::Unresolved(StorageCategory::Archive)));

        let err = resolver().resolve(&config, "0.26.2").unwrap_err();
        assert!(matches!(err, StorageError::Unresolved(_)));
    }

    #[test]
    fn test_missing_verification_without_base_fails_above_boundary() {
        let config = StorageConfig {
            archive_path: "/data/archive".into(),
            live_path: "/data/live".into(),
            log_path: "/data/logs".into(),
            ..Default::default()
        };

        let below = resolver().resolve(&config, "0.26.0").unwrap();
        assert_eq!(below.verification, None);

        let err = resolver().resolve(&config, "0.26.2").unwrap_err();
        assert!(matches!(
            err,
            StorageError::Unresolved(StorageCategory::Verification)
        ));
        assert!(err.to_string().contains("verification"));
    }

    #[test]
    fn test_unrequired_explicit_verification_is_still_sanitized() {
        let config = StorageConfig {
            base_path: "/mnt/base".into(),
            verification_path: "/mnt/../etc".into(),
            ..Default::default()
        };

        let err = resolver().resolve(&config, "0.25.0").unwrap_err();
        match err {
            StorageError::InvalidPath { category, .. } => {
                assert_eq!(category, StorageCategory::Verification)
            }
            other => panic!("Expected InvalidPath, got {:?}", other),
        }
    }

    #[test]
    fn test_unrequired_explicit_verification_is_kept() {
        let config = StorageConfig {
            base_path: "/mnt/base".into(),
            verification_path: "/mnt/verify".into(),
            ..Default::default()
        };

        let layout = resolver().resolve(&config, "0.25.0").unwrap();
        assert_eq!(layout.verification, Some(PathBuf::from("/mnt/verify")));
    }

    #[test]
    fn test_invalid_base_path_reported() {
        let err = resolver()
            .resolve(&StorageConfig::with_base("/mnt/../base"), "0.26.2")
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidBasePath(_)));
    }

    #[test]
    fn test_first_failing_category_is_reported() {
        let config = StorageConfig {
            base_path: "/mnt/base".into(),
            live_path: "/mnt/../live".into(),
            log_path: "/mnt/../logs".into(),
            ..Default::default()
        };

        let err = resolver().resolve(&config, "0.26.2").unwrap_err();
        assert!(err.to_string().starts_with("invalid live storage path"));
    }

    #[test]
    fn test_unresolved_reported_before_unsafe_path() {
        let config = StorageConfig {
            archive_path: "/mnt/../archive".into(),
            live_path: "/data/live".into(),
            log_path: "/data/logs".into(),
            ..Default::default()
        };

        let err = resolver().resolve(&config, "0.26.2").unwrap_err();
        assert!(matches!(
            err,
            StorageError::Unresolved(StorageCategory::Verification)
        ));

        let err = resolver().resolve(&config, "0.26.0").unwrap_err();
        assert!(matches!(
            err,
            StorageError::InvalidPath {
                category: StorageCategory::Archive,
                ..
            }
        ));
    }

    #[test]
    fn test_invalid_target_version() {
        let err = resolver()
            .resolve(&StorageConfig::with_base("/mnt/base"), "latest")
            .unwrap_err();
        assert!(matches!(err, StorageError::Version(_)));
    }

    #[test]
    fn test_resolve_category() {
        let r = resolver();
        let config = StorageConfig::with_base("/mnt/base");

        assert_eq!(
            r.resolve_category(&config, "0.26.2", StorageCategory::Verification)
                .unwrap(),
            Some(PathBuf::from("/mnt/base/verification"))
        );
        assert_eq!(
            r.resolve_category(&config, "0.26.1", StorageCategory::Verification)
                .unwrap(),
            None
        );
    }

    #[test]
    fn test_category_names() {
        let cases = [
            (StorageCategory::Archive, "archive", "archive"),
            (StorageCategory::Live, "live", "live"),
            (StorageCategory::Log, "log", "logs"),
            (StorageCategory::Verification, "verification", "verification"),
        ];

        for (category, name, dir) in cases {
            assert_eq!(category.name(), name);
            assert_eq!(category.dir_name(), dir);
        }
    }
}
