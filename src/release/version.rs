//! Version resolution
//!
//! The declared package version is read from the source tree, in order of
//! preference:
//!
//! | File | Form |
//! |------|------|
//! | `<package>/version.py` | `__version__ = "1.7.3"` |
//! | `setup.cfg` | `version = 1.7.3` |
//! | `pyproject.toml` | `version = "1.7.3"` |
//!
//! The source revision comes from `git rev-parse --short HEAD`.

use crate::executor::{CommandRunner, ProcessCommand};
use crate::pipeline::{ReleaseError, ReleaseResult};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};

static VERSION_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+(\.\d+)*").expect("version pattern is valid"));

static PY_VERSION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^__version__\s*=\s*['"]([^'"]+)['"]"#).expect("python pattern is valid")
});

static CFG_VERSION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^version\s*=\s*['"]?([^'"\s]+)['"]?\s*$"#).expect("cfg pattern is valid")
});

/// Returns true if `version` starts with a dot-separated numeric part
#[must_use]
pub fn is_valid_version(version: &str) -> bool {
    VERSION_PATTERN.is_match(version)
}

/// First two numeric components of a version
///
/// `1.7.3` gives `1.7`, `2.0` gives `2.0` and `1.7rc1` gives `1.7`.
#[must_use]
pub fn short_version(version: &str) -> String {
    let numeric = VERSION_PATTERN.find(version).map_or(version, |m| m.as_str());
    numeric.splitn(3, '.').take(2).collect::<Vec<_>>().join(".")
}

/// Reads the declared version of a source tree
#[derive(Debug, Clone)]
pub struct VersionResolver {
    source_dir: PathBuf,
    package: String,
}

impl VersionResolver {
    /// Creates a resolver for the given source tree and package directory
    #[must_use]
    pub fn new(source_dir: impl Into<PathBuf>, package: impl Into<String>) -> Self {
        Self {
            source_dir: source_dir.into(),
            package: package.into(),
        }
    }

    fn candidates(&self) -> [(PathBuf, &'static Lazy<Regex>); 3] {
        [
            (
                self.source_dir.join(&self.package).join("version.py"),
                &PY_VERSION,
            ),
            (self.source_dir.join("setup.cfg"), &CFG_VERSION),
            (self.source_dir.join("pyproject.toml"), &CFG_VERSION),
        ]
    }

    /// Resolves the declared version
    ///
    /// # Errors
    ///
    /// Returns [`ReleaseError::VersionUnavailable`] when no metadata file
    /// declares a version, or the declared one is not numeric.
    pub fn resolve(&self) -> ReleaseResult<String> {
        for (path, pattern) in self.candidates() {
            let Some(version) = read_declared(&path, pattern)? else {
                continue;
            };
            if !is_valid_version(&version) {
                return Err(ReleaseError::VersionUnavailable {
                    reason: format!("'{version}' in {} is not a numeric version", path.display()),
                });
            }
            tracing::debug!(version = %version, source = %path.display(), "Resolved version");
            return Ok(version);
        }

        Err(ReleaseError::VersionUnavailable {
            reason: format!(
                "no version declared under {} (looked for {}/version.py, setup.cfg, pyproject.toml)",
                self.source_dir.display(),
                self.package
            ),
        })
    }

    /// Short source-control revision of the tree
    ///
    /// # Errors
    ///
    /// Returns [`ReleaseError::CommandFailed`] if git fails, or
    /// [`ReleaseError::VersionUnavailable`] if it prints nothing.
    pub fn commit_id(&self, runner: &dyn CommandRunner) -> ReleaseResult<String> {
        let output = runner.run_checked(
            &ProcessCommand::new("git")
                .args(["rev-parse", "--short", "HEAD"])
                .current_dir(&self.source_dir),
        )?;
        let commit = output.stdout_trimmed();
        if commit.is_empty() {
            return Err(ReleaseError::VersionUnavailable {
                reason: "git returned an empty revision".to_string(),
            });
        }
        Ok(commit.to_string())
    }
}

fn read_declared(path: &Path, pattern: &Regex) -> ReleaseResult<Option<String>> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(ReleaseError::VersionUnavailable {
                reason: format!("cannot read {}: {e}", path.display()),
            });
        }
    };
    Ok(pattern
        .captures(&text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ScriptedRunner;
    use proptest::prelude::*;
    use std::fs;
    use tempfile::TempDir;

    fn tree_with(files: &[(&str, &str)]) -> TempDir {
        let temp_dir = TempDir::new().unwrap();
        for (name, content) in files {
            let path = temp_dir.path().join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
        temp_dir
    }

    #[test]
    fn test_resolve_from_version_py() {
        let tree = tree_with(&[("pyqgiswps/version.py", "__version__ = '1.7.3'\n")]);
        let resolver = VersionResolver::new(tree.path(), "pyqgiswps");

        assert_eq!(resolver.resolve().unwrap(), "1.7.3");
    }

    #[test]
    fn test_resolve_prefers_version_py_over_setup_cfg() {
        let tree = tree_with(&[
            ("pyqgiswps/version.py", "__version__ = \"1.8.0\"\n"),
            ("setup.cfg", "[metadata]\nversion = 1.7.0\n"),
        ]);
        let resolver = VersionResolver::new(tree.path(), "pyqgiswps");

        assert_eq!(resolver.resolve().unwrap(), "1.8.0");
    }

    #[test]
    fn test_resolve_from_pyproject() {
        let tree = tree_with(&[(
            "pyproject.toml",
            "[project]\nname = \"py-qgis-wps\"\nversion = \"1.9.2\"\n",
        )]);
        let resolver = VersionResolver::new(tree.path(), "pyqgiswps");

        assert_eq!(resolver.resolve().unwrap(), "1.9.2");
    }

    #[test]
    fn test_resolve_is_deterministic() {
        let tree = tree_with(&[("pyqgiswps/version.py", "__version__ = '1.7.3'\n")]);
        let resolver = VersionResolver::new(tree.path(), "pyqgiswps");

        assert_eq!(resolver.resolve().unwrap(), resolver.resolve().unwrap());
    }

    #[test]
    fn test_resolve_missing_metadata() {
        let tree = tree_with(&[]);
        let resolver = VersionResolver::new(tree.path(), "pyqgiswps");

        assert!(matches!(
            resolver.resolve(),
            Err(ReleaseError::VersionUnavailable { .. })
        ));
    }

    #[test]
    fn test_resolve_rejects_non_numeric() {
        let tree = tree_with(&[("pyqgiswps/version.py", "__version__ = 'dev'\n")]);
        let resolver = VersionResolver::new(tree.path(), "pyqgiswps");

        assert!(matches!(
            resolver.resolve(),
            Err(ReleaseError::VersionUnavailable { .. })
        ));
    }

    #[test]
    fn test_commit_id() {
        let runner = ScriptedRunner::new().reply("rev-parse", "abc1234\n");
        let resolver = VersionResolver::new(".", "pyqgiswps");

        assert_eq!(resolver.commit_id(&runner).unwrap(), "abc1234");
    }

    #[test]
    fn test_commit_id_outside_repository() {
        let runner = ScriptedRunner::new().fail_on("rev-parse", 128, "not a git repository");
        let resolver = VersionResolver::new(".", "pyqgiswps");

        assert!(matches!(
            resolver.commit_id(&runner),
            Err(ReleaseError::CommandFailed { code: 128, .. })
        ));
    }

    #[test]
    fn test_short_version_examples() {
        assert_eq!(short_version("1.7.3"), "1.7");
        assert_eq!(short_version("2.0"), "2.0");
        assert_eq!(short_version("3"), "3");
        assert_eq!(short_version("1.8.0rc1"), "1.8");
    }

    #[test]
    fn test_short_version_drops_pre_release_suffix() {
        assert_eq!(short_version("1.7rc1"), "1.7");
        assert_eq!(short_version("2.0.dev3"), "2.0");
        assert_eq!(short_version("3b1"), "3");
    }

    #[test]
    fn test_is_valid_version() {
        assert!(is_valid_version("1.7.3"));
        assert!(is_valid_version("1.8.0rc1"));
        assert!(!is_valid_version(""));
        assert!(!is_valid_version("v1.7"));
    }

    proptest! {
        #[test]
        fn prop_short_version_is_first_two_components(
            parts in proptest::collection::vec(0u32..1000, 2..6)
        ) {
            let version = parts.iter().map(ToString::to_string).collect::<Vec<_>>().join(".");
            let short = short_version(&version);

            prop_assert_eq!(short.clone(), format!("{}.{}", parts[0], parts[1]));
            prop_assert!(version.starts_with(&short));
        }
    }
}
