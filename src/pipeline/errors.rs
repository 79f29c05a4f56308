//! Error types for the release pipeline

use thiserror::Error;

/// Errors that can occur while building and promoting an image
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReleaseError {
    /// Validation failed with specified reason
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// The declared package version could not be located or parsed
    #[error("Version unavailable: {reason}")]
    VersionUnavailable {
        /// Why the version could not be resolved.
        reason: String,
    },

    /// The container build backend reported a failure
    #[error("Build of image '{image}' failed: {reason}")]
    BuildFailed {
        /// Local image name that was being built.
        image: String,
        /// Error message reported by the backend.
        reason: String,
    },

    /// No manifest exists at the expected path
    #[error("Manifest not found at '{path}', run the manifest stage first")]
    ManifestMissing {
        /// Path that was looked up.
        path: String,
    },

    /// The manifest exists but does not carry all required keys
    #[error("Manifest at '{path}' is corrupt ({reason}), run the manifest stage again")]
    ManifestCorrupt {
        /// Path of the manifest.
        path: String,
        /// What is wrong with it.
        reason: String,
    },

    /// One alias could not be tagged or pushed
    #[error("Push of '{reference}' failed: {reason}")]
    PushFailed {
        /// Fully qualified reference that failed.
        reference: String,
        /// Error message from the registry client.
        reason: String,
    },

    /// Command execution failed
    #[error("Command '{program}' failed with exit code {code}: {stderr}")]
    CommandFailed {
        /// Program that was invoked.
        program: String,
        /// Exit code returned by the command.
        code: i32,
        /// Standard error output from the command.
        stderr: String,
    },

    /// A test report could not be read back
    #[error("Test report '{path}' unreadable: {reason}")]
    ReportUnreadable {
        /// Report path.
        path: String,
        /// Parse or IO error.
        reason: String,
    },

    /// At least one flavor of the test matrix failed
    #[error("Tests failed for flavor(s): {}", .flavors.join(", "))]
    TestsFailed {
        /// Flavors that did not pass.
        flavors: Vec<String>,
    },

    /// A pipeline stage failed
    #[error("Stage '{stage}' failed: {source}")]
    StageFailed {
        /// Name of the stage that failed.
        stage: String,
        /// Underlying failure.
        #[source]
        source: Box<ReleaseError>,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error occurred
    #[error("IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for ReleaseError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl ReleaseError {
    /// Wraps this error as the failure of a named stage
    #[must_use]
    pub fn in_stage(self, stage: impl Into<String>) -> Self {
        Self::StageFailed {
            stage: stage.into(),
            source: Box::new(self),
        }
    }

    /// Returns the innermost error, unwrapping stage failures
    #[must_use]
    pub fn root_cause(&self) -> &Self {
        match self {
            Self::StageFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// Validation errors for configuration, manifests and test reports
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A required field is empty
    #[error("Field '{field}' cannot be empty")]
    EmptyField {
        /// Name of the empty field.
        field: String,
    },

    /// Version string is not dot-separated numeric
    #[error("Invalid version: '{0}'")]
    InvalidVersion(String),

    /// Invalid characters in an image reference component
    #[error("Invalid characters in {component}: '{value}'")]
    InvalidReference {
        /// Which component (repository, tag, ...).
        component: String,
        /// The offending value.
        value: String,
    },

    /// Pipeline must have at least one stage
    #[error("Pipeline must have at least one stage")]
    EmptyPipeline,

    /// The same stage appears twice
    #[error("Stage '{stage}' appears more than once")]
    DuplicateStage {
        /// Name of the repeated stage.
        stage: String,
    },

    /// Name is neither a stage nor a composite target
    #[error("Unknown stage or target: '{0}'")]
    UnknownStage(String),

    /// Test matrix must name at least one flavor
    #[error("Test matrix must have at least one flavor")]
    EmptyMatrix,

    /// The same flavor appears twice in the test matrix
    #[error("Flavor '{flavor}' appears more than once in the test matrix")]
    DuplicateFlavor {
        /// Name of the repeated flavor.
        flavor: String,
    },

    /// A manifest line has no `=` separator
    #[error("Line {0} is not key=value")]
    MalformedLine(usize),

    /// Required manifest keys are absent or empty
    #[error("Missing or empty keys: {}", .0.join(", "))]
    MissingKeys(Vec<String>),

    /// `version_short` is not derived from `version`
    #[error("Short version '{short}' does not match version '{version}'")]
    ShortVersionMismatch {
        /// Recorded short version.
        short: String,
        /// Recorded full version.
        version: String,
    },

    /// Document has no JUnit suite element
    #[error("No <testsuite> element found")]
    NoTestSuite,

    /// A JUnit suite element carries none of the expected counters
    #[error("Test suite carries no counters: {0}")]
    MissingCounters(String),
}

impl ValidationError {
    /// Creates an empty field error
    pub fn empty(field: impl Into<String>) -> Self {
        Self::EmptyField {
            field: field.into(),
        }
    }
}
