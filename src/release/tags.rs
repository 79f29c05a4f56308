//! Alias planning
//!
//! One build is promoted under three aliases: full version, short version
//! and release tag. Planning is a pure function of manifest and prefix.

use super::manifest::BuildManifest;
use crate::pipeline::ValidationError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

static TAG_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.-]{0,127}$").expect("tag pattern is valid"));

/// Returns true if `tag` is a valid image tag
#[must_use]
pub fn is_valid_tag(tag: &str) -> bool {
    TAG_PATTERN.is_match(tag)
}

/// A pushable `(repository, tag)` pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageReference {
    /// Registry-qualified repository, e.g. `acme/app`
    pub repository: String,
    /// Tag within the repository
    pub tag: String,
}

impl ImageReference {
    /// Creates a reference, checking the tag syntax
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidReference`] for an invalid tag or
    /// an empty repository.
    pub fn new(
        repository: impl Into<String>,
        tag: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let repository = repository.into();
        let tag = tag.into();
        if repository.is_empty() || repository.ends_with('/') {
            return Err(ValidationError::InvalidReference {
                component: "repository".to_string(),
                value: repository,
            });
        }
        if !is_valid_tag(&tag) {
            return Err(ValidationError::InvalidReference {
                component: "tag".to_string(),
                value: tag,
            });
        }
        Ok(Self { repository, tag })
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.repository, self.tag)
    }
}

/// Computes the aliases of one build
#[derive(Debug, Clone, Default)]
pub struct TagPlanner {
    prefix: String,
}

impl TagPlanner {
    /// Creates a planner for a registry prefix (`""` or ending with `/`)
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Plans `version`, `version_short` and `release_tag` aliases, in that order
    ///
    /// Aliases that coincide (e.g. version `2.0` and short version `2.0`)
    /// are planned once.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidReference`] if a manifest value is
    /// not a valid tag.
    pub fn plan(&self, manifest: &BuildManifest) -> Result<Vec<ImageReference>, ValidationError> {
        let repository = format!("{}{}", self.prefix, manifest.name);
        let mut references: Vec<ImageReference> = Vec::with_capacity(3);
        for tag in [
            &manifest.version,
            &manifest.version_short,
            &manifest.release_tag,
        ] {
            let reference = ImageReference::new(repository.clone(), tag.clone())?;
            if !references.contains(&reference) {
                references.push(reference);
            }
        }
        Ok(references)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashSet;

    fn manifest(version: &str, tag: &str) -> BuildManifest {
        BuildManifest::new("app", version, tag, "202610161204", "abc1234")
    }

    #[test]
    fn test_plan_three_aliases() {
        let planner = TagPlanner::new("acme/");
        let refs = planner.plan(&manifest("1.7.3", "ltr")).unwrap();

        let rendered: Vec<String> = refs.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, vec!["acme/app:1.7.3", "acme/app:1.7", "acme/app:ltr"]);

        let as_set: HashSet<String> = rendered.into_iter().collect();
        assert_eq!(as_set.len(), 3);
    }

    #[test]
    fn test_plan_without_prefix() {
        let refs = TagPlanner::default().plan(&manifest("1.7.3", "ltr")).unwrap();
        assert_eq!(refs[0].to_string(), "app:1.7.3");
    }

    #[test]
    fn test_plan_collapses_identical_aliases() {
        let refs = TagPlanner::new("acme/").plan(&manifest("2.0", "ltr")).unwrap();
        let rendered: Vec<String> = refs.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, vec!["acme/app:2.0", "acme/app:ltr"]);
    }

    #[test]
    fn test_plan_is_pure() {
        let planner = TagPlanner::new("acme/");
        let m = manifest("1.7.3", "ltr");
        assert_eq!(planner.plan(&m).unwrap(), planner.plan(&m).unwrap());
    }

    #[test]
    fn test_plan_rejects_invalid_tag() {
        let result = TagPlanner::new("acme/").plan(&manifest("1.7.3", "bad tag"));
        assert!(matches!(
            result,
            Err(ValidationError::InvalidReference { .. })
        ));
    }

    #[test]
    fn test_is_valid_tag() {
        assert!(is_valid_tag("ltr"));
        assert!(is_valid_tag("1.7.3"));
        assert!(is_valid_tag("3.28_nightly"));
        assert!(!is_valid_tag(".hidden"));
        assert!(!is_valid_tag("a:b"));
        assert!(!is_valid_tag(""));
    }
}
