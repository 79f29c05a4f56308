//! Release stages
//!
//! Version resolution, image build, build manifest, alias planning,
//! promotion and the flavor test matrix, plus the runner that drives them.

mod builder;
mod manifest;
mod matrix;
mod pusher;
mod runner;
mod tags;
mod version;

pub use builder::{BuiltImage, ImageBuilder};
pub use manifest::{BuildManifest, ManifestStore, current_build_id};
pub use matrix::{
    FlavorResult, MatrixOutcome, TEST_COMMAND, TestMatrixRunner, TestReport, validate_flavors,
};
pub use pusher::{PushReport, Pusher};
pub use runner::{COMPOSE_DIR, PipelineRunner, ReleaseStatus};
pub use tags::{ImageReference, TagPlanner, is_valid_tag};
pub use version::{VersionResolver, is_valid_version, short_version};
