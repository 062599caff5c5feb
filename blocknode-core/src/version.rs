//! Version-boundary rule
//!
//! A breaking change is tied to the version that introduces it (its
//! *boundary*). An upgrade crosses the boundary when it starts strictly below
//! it and lands at or above it. Everything in this module is pure: no I/O and
//! no shared state, so callers may evaluate it speculatively (dry runs) as
//! often as they like.

use semver::Version;
use std::fmt;

/// Which argument of [`applies`] a version string was supplied as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionField {
    Installed,
    Target,
    MinVersion,
}

impl fmt::Display for VersionField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionField::Installed => write!(f, "installed version"),
            VersionField::Target => write!(f, "target version"),
            VersionField::MinVersion => write!(f, "minimum version"),
        }
    }
}

/// Errors produced while evaluating version boundaries
#[derive(Debug, Clone, thiserror::Error)]
pub enum VersionError {
    /// A version string could not be parsed as a semantic version
    #[error("invalid {field} '{value}': {message}")]
    Parse {
        field: VersionField,
        value: String,
        message: String,
    },
}

impl VersionError {
    /// The argument that failed to parse
    pub fn field(&self) -> VersionField {
        match self {
            VersionError::Parse { field, .. } => *field,
        }
    }
}

/// Parses a semantic version, tolerating surrounding whitespace and a leading `v`.
pub fn parse_version(value: &str, field: VersionField) -> Result<Version, VersionError> {
    let trimmed = value.trim();
    let stripped = trimmed.strip_prefix('v').unwrap_or(trimmed);
    Version::parse(stripped).map_err(|e| VersionError::Parse {
        field,
        value: value.to_string(),
        message: e.to_string(),
    })
}

/// Decides whether a change introduced at `min_version` applies to an upgrade
/// from `installed` to `target`.
///
/// Returns `Ok(false)` when `installed` is empty: a fresh install starts
/// directly at the target configuration and never needs migrating. Otherwise
/// the change applies exactly when `installed < min_version` and
/// `target >= min_version`.
///
/// ```
/// use blocknode_core::version::applies;
///
/// assert!(applies("0.25.0", "0.26.2", "0.26.2").unwrap());
/// assert!(!applies("0.26.2", "0.26.3", "0.26.2").unwrap());
/// assert!(!applies("", "0.26.2", "0.26.2").unwrap());
/// assert!(applies("invalid", "0.26.2", "0.26.2").is_err());
/// ```
pub fn applies(installed: &str, target: &str, min_version: &str) -> Result<bool, VersionError> {
    if installed.trim().is_empty() {
        return Ok(false);
    }

    let installed = parse_version(installed, VersionField::Installed)?;
    let target = parse_version(target, VersionField::Target)?;
    let min_version = parse_version(min_version, VersionField::MinVersion)?;

    Ok(installed < min_version && !(target < min_version))
}

/// Returns true when `version` is at or above `min_version`.
///
/// Used where only the destination matters, e.g. deciding which storage
/// categories a target release requires.
pub fn at_or_above(version: &str, min_version: &str) -> Result<bool, VersionError> {
    let version = parse_version(version, VersionField::Target)?;
    let min_version = parse_version(min_version, VersionField::MinVersion)?;
    Ok(version >= min_version)
}

/// Parses a version constant compiled into the binary.
///
/// # Panics
///
/// Panics if `value` is not a valid semantic version. Constants are fixed at
/// build time, so a failure here is a programming error.
pub fn compiled_version(value: &'static str) -> Version {
    match parse_version(value, VersionField::MinVersion) {
        Ok(version) => version,
        Err(e) => panic!("compiled-in version constant is invalid: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_applies_crossing_boundary() {
        assert!(applies("0.25.0", "0.26.2", "0.26.2").unwrap());
        assert!(applies("0.25.0", "0.30.0", "0.26.2").unwrap());
        assert!(applies("0.26.1", "0.26.2", "0.26.2").unwrap());
    }

    #[test]
    fn test_applies_already_past_boundary() {
        assert!(!applies("0.26.2", "0.26.3", "0.26.2").unwrap());
        assert!(!applies("0.27.0", "0.28.0", "0.26.2").unwrap());
    }

    #[test]
    fn test_applies_entirely_below_boundary() {
        assert!(!applies("0.24.0", "0.25.0", "0.26.2").unwrap());
        assert!(!applies("0.24.0", "0.26.1", "0.26.2").unwrap());
    }

    #[test]
    fn test_applies_downgrade_and_same_version() {
        assert!(!applies("0.26.2", "0.25.0", "0.26.2").unwrap());
        assert!(!applies("0.25.0", "0.25.0", "0.26.2").unwrap());
        assert!(!applies("0.26.2", "0.26.2", "0.26.2").unwrap());
    }

    #[test]
    fn test_applies_fresh_install() {
        assert!(!applies("", "0.26.2", "0.26.2").unwrap());
        assert!(!applies("   ", "0.26.2", "0.26.2").unwrap());
        // Fresh installs are never parsed, even with a bad target
        assert!(!applies("", "not-a-version", "0.26.2").unwrap());
    }

    #[test]
    fn test_applies_reports_failing_field() {
        let err = applies("invalid", "0.26.2", "0.26.2").unwrap_err();
        assert_eq!(err.field(), VersionField::Installed);
        assert!(err.to_string().contains("installed version 'invalid'"));

        let err = applies("0.26.0", "invalid", "0.26.2").unwrap_err();
        assert_eq!(err.field(), VersionField::Target);
        assert!(err.to_string().contains("target version"));

        let err = applies("0.26.0", "0.26.2", "x.y").unwrap_err();
        assert_eq!(err.field(), VersionField::MinVersion);
    }

    #[test]
    fn test_applies_matches_interval_definition() {
        let versions = ["0.1.0", "0.25.0", "0.26.1", "0.26.2", "0.26.3", "1.0.0"];
        let min = "0.26.2";
        let min_v = Version::parse(min).unwrap();

        for installed in versions {
            for target in versions {
                let i = Version::parse(installed).unwrap();
                let t = Version::parse(target).unwrap();
                let expected = i < min_v && !(t < min_v);
                assert_eq!(
                    applies(installed, target, min).unwrap(),
                    expected,
                    "installed={}, target={}",
                    installed,
                    target
                );
            }
        }
    }

    #[test]
    fn test_parse_version_accepts_v_prefix() {
        let v = parse_version("v0.26.2", VersionField::Target).unwrap();
        assert_eq!(v, Version::new(0, 26, 2));
        assert!(applies("v0.25.0", "v0.26.2", "0.26.2").unwrap());
    }

    #[test]
    fn test_prerelease_sorts_below_release() {
        assert!(applies("0.26.2-rc.1", "0.26.2", "0.26.2").unwrap());
        assert!(!applies("0.25.0", "0.26.2-rc.1", "0.26.2").unwrap());
    }

    #[test]
    fn test_at_or_above() {
        assert!(at_or_above("0.26.2", "0.26.2").unwrap());
        assert!(at_or_above("0.27.0", "0.26.2").unwrap());
        assert!(!at_or_above("0.26.1", "0.26.2").unwrap());
        assert!(at_or_above("bogus", "0.26.2").is_err());
    }

    #[test]
    #[should_panic(expected = "compiled-in version constant is invalid")]
    fn test_compiled_version_panics_on_bad_constant() {
        compiled_version("not.a.version");
    }
}
