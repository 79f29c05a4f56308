//! Build manifest
//!
//! The manifest is the only state handed from the build stage to the
//! promotion stage. It is a UTF-8 file of `key=value` lines:
//!
//! ```text
//! name=qgis-wps
//! version=1.7.3
//! version_short=1.7
//! release_tag=ltr
//! buildid=202610161204
//! commitid=abc1234
//! ```
//!
//! All six keys must be present and non-empty. Blank lines and `#` comments
//! are ignored; unknown keys are tolerated.

use super::version::{is_valid_version, short_version};
use crate::infrastructure::VersionReporter;
use crate::pipeline::{ReleaseError, ReleaseResult, ValidationError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

const KEYS: [&str; 6] = [
    "name",
    "version",
    "version_short",
    "release_tag",
    "buildid",
    "commitid",
];

/// Identity of one build
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildManifest {
    /// Logical artifact name
    pub name: String,
    /// Full version reported by the built image
    pub version: String,
    /// First two components of `version`
    pub version_short: String,
    /// Flavor/channel the build was produced for
    pub release_tag: String,
    /// Build timestamp token
    pub buildid: String,
    /// Short source revision
    pub commitid: String,
}

impl BuildManifest {
    /// Creates a manifest, deriving `version_short` from `version`
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        release_tag: impl Into<String>,
        buildid: impl Into<String>,
        commitid: impl Into<String>,
    ) -> Self {
        let version = version.into();
        Self {
            name: name.into(),
            version_short: short_version(&version),
            version,
            release_tag: release_tag.into(),
            buildid: buildid.into(),
            commitid: commitid.into(),
        }
    }

    /// Local image this manifest describes: `<name>:<release_tag>-<commitid>`
    #[must_use]
    pub fn build_image(&self) -> String {
        format!("{}:{}-{}", self.name, self.release_tag, self.commitid)
    }

    fn fields(&self) -> [(&'static str, &str); 6] {
        [
            ("name", self.name.as_str()),
            ("version", self.version.as_str()),
            ("version_short", self.version_short.as_str()),
            ("release_tag", self.release_tag.as_str()),
            ("buildid", self.buildid.as_str()),
            ("commitid", self.commitid.as_str()),
        ]
    }

    /// Serializes to the `key=value` format
    #[must_use]
    pub fn to_text(&self) -> String {
        self.fields()
            .iter()
            .map(|(k, v)| format!("{k}={v}\n"))
            .collect()
    }

    /// Parses and validates the `key=value` format
    ///
    /// # Errors
    ///
    /// Returns the first schema violation found.
    pub fn parse(text: &str) -> Result<Self, ValidationError> {
        let mut values: BTreeMap<&str, String> = BTreeMap::new();

        for (number, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                return Err(ValidationError::MalformedLine(number + 1));
            };
            let key = key.trim();
            if let Some(known) = KEYS.iter().find(|k| **k == key) {
                values.insert(*known, value.trim().to_string());
            }
        }

        let missing: Vec<String> = KEYS
            .iter()
            .filter(|k| values.get(*k).is_none_or(String::is_empty))
            .map(|k| (*k).to_string())
            .collect();
        if !missing.is_empty() {
            return Err(ValidationError::MissingKeys(missing));
        }

        let mut take = |key: &str| values.remove(key).unwrap_or_default();
        let manifest = Self {
            name: take("name"),
            version: take("version"),
            version_short: take("version_short"),
            release_tag: take("release_tag"),
            buildid: take("buildid"),
            commitid: take("commitid"),
        };

        if !is_valid_version(&manifest.version) {
            return Err(ValidationError::InvalidVersion(manifest.version));
        }
        if manifest.version_short != short_version(&manifest.version) {
            return Err(ValidationError::ShortVersionMismatch {
                short: manifest.version_short,
                version: manifest.version,
            });
        }
        Ok(manifest)
    }
}

impl fmt::Display for BuildManifest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_text())
    }
}

/// Reads and writes the manifest file
#[derive(Debug, Clone)]
pub struct ManifestStore {
    path: PathBuf,
}

impl ManifestStore {
    /// Creates a store for the given manifest path
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Manifest path
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes a manifest, replacing any previous one
    ///
    /// # Errors
    ///
    /// Returns an IO error if the file cannot be written.
    pub fn write(&self, manifest: &BuildManifest) -> ReleaseResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, manifest.to_text())?;
        tracing::info!(
            path = %self.path.display(),
            version = %manifest.version,
            release_tag = %manifest.release_tag,
            "Manifest written"
        );
        Ok(())
    }

    /// Reads the manifest back
    ///
    /// # Errors
    ///
    /// Returns [`ReleaseError::ManifestMissing`] if there is no file and
    /// [`ReleaseError::ManifestCorrupt`] if it does not validate.
    pub fn read(&self) -> ReleaseResult<BuildManifest> {
        let display = self.path.display().to_string();
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ReleaseError::ManifestMissing { path: display });
            }
            Err(e) => {
                return Err(ReleaseError::ManifestCorrupt {
                    path: display,
                    reason: e.to_string(),
                });
            }
        };
        BuildManifest::parse(&text).map_err(|err| ReleaseError::ManifestCorrupt {
            path: display,
            reason: err.to_string(),
        })
    }

    /// Queries the built image for its version and records the build
    ///
    /// The version reported by the artifact is authoritative; the declared
    /// source version is not consulted here.
    ///
    /// # Errors
    ///
    /// Fails if the image cannot be queried, reports a non-numeric version,
    /// or the file cannot be written.
    pub fn record(
        &self,
        reporter: &dyn VersionReporter,
        image: &str,
        name: &str,
        release_tag: &str,
        commit_id: &str,
        build_id: &str,
    ) -> ReleaseResult<BuildManifest> {
        let version = reporter.report_version(image)?;
        if !is_valid_version(&version) {
            return Err(ReleaseError::VersionUnavailable {
                reason: format!("image {image} reported version '{version}'"),
            });
        }

        let manifest = BuildManifest::new(name, version, release_tag, build_id, commit_id);
        self.write(&manifest)?;
        Ok(manifest)
    }
}

/// Build id token for the current time (`%Y%m%d%H%M`, UTC)
#[must_use]
pub fn current_build_id() -> String {
    chrono::Utc::now().format("%Y%m%d%H%M").to_string()
}
