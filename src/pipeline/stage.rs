//! Release stages
//!
//! The set of stages is closed; composite targets expand to an ordered
//! list of stages.

use crate::pipeline::errors::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One step of the release process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    /// Build the flavor image for the current commit
    Build,
    /// Record the build manifest
    Manifest,
    /// Apply the planned aliases locally
    Tag,
    /// Push the planned aliases
    Push,
    /// Remove the build image
    Clean,
    /// Remove every local image of this build
    CleanAll,
    /// Start the compose environment
    Run,
    /// Stop the compose environment
    Stop,
    /// Run the flavor test matrix
    Test,
}

impl Stage {
    /// All stages, in declaration order
    pub const ALL: [Self; 9] = [
        Self::Build,
        Self::Manifest,
        Self::Tag,
        Self::Push,
        Self::Clean,
        Self::CleanAll,
        Self::Run,
        Self::Stop,
        Self::Test,
    ];

    /// Command-line name of the stage
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Build => "build",
            Self::Manifest => "manifest",
            Self::Tag => "tag",
            Self::Push => "push",
            Self::Clean => "clean",
            Self::CleanAll => "clean-all",
            Self::Run => "run",
            Self::Stop => "stop",
            Self::Test => "test",
        }
    }

    /// Error kind reported when the stage fails
    #[must_use]
    pub fn failure_kind(self) -> &'static str {
        match self {
            Self::Build => "BuildFailed",
            Self::Manifest => "VersionUnavailable",
            Self::Tag | Self::Push => "PushFailed",
            Self::Clean | Self::CleanAll | Self::Run | Self::Stop => "CommandFailed",
            Self::Test => "TestsFailed",
        }
    }

    /// Expands a target name into its stages
    ///
    /// `deliver` is tag then push; `release` is build, manifest, tag, push.
    /// Any stage name expands to itself.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::UnknownStage`] for an unknown name.
    pub fn target(name: &str) -> Result<Vec<Self>, ValidationError> {
        match name {
            "deliver" => Ok(vec![Self::Tag, Self::Push]),
            "release" => Ok(vec![Self::Build, Self::Manifest, Self::Tag, Self::Push]),
            other => other.parse().map(|stage| vec![stage]),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Stage {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|stage| stage.name() == s)
            .ok_or_else(|| ValidationError::UnknownStage(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_names_round_trip() {
        for stage in Stage::ALL {
            assert_eq!(stage.name().parse::<Stage>().unwrap(), stage);
        }
    }

    #[test]
    fn test_unknown_stage() {
        assert_eq!(
            "deploy".parse::<Stage>().unwrap_err(),
            ValidationError::UnknownStage("deploy".to_string())
        );
    }

    #[test]
    fn test_composite_targets() {
        assert_eq!(
            Stage::target("deliver").unwrap(),
            vec![Stage::Tag, Stage::Push]
        );
        assert_eq!(
            Stage::target("release").unwrap(),
            vec![Stage::Build, Stage::Manifest, Stage::Tag, Stage::Push]
        );
        assert_eq!(Stage::target("clean-all").unwrap(), vec![Stage::CleanAll]);
    }

    #[test]
    fn test_serde_kebab_case() {
        assert_eq!(
            serde_json::to_string(&Stage::CleanAll).unwrap(),
            "\"clean-all\""
        );
    }
}
