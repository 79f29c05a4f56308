//! wps-release - build, test and publish the WPS service image
//!
//! ## Commands
//!
//! - `wps-release build` - Build `<name>:<flavor>-<commitid>`
//! - `wps-release manifest` - Record the version reported by the image
//! - `wps-release deliver` - Tag and push the manifest aliases
//! - `wps-release release` - All of the above
//! - `wps-release test` - Run the suite for each flavor
//! - `wps-release run` / `stop` - Start or stop the service with Redis
//! - `wps-release clean` / `clean-all` - Remove local images
//! - `wps-release status` - Show the manifest and planned aliases
//! - `wps-release completions` - Generate shell completions
//!
//! ## Quick Start
//!
//! ```bash
//! # Build and record the manifest for the ltr flavor
//! FLAVOR=ltr wps-release build
//! wps-release manifest
//!
//! # Promote it, possibly from another job
//! REGISTRY_URL=registry.example.org/3liz wps-release deliver
//!
//! # See what would run
//! wps-release release --dry-run
//! ```

use std::process::ExitCode;

mod cli;

fn main() -> ExitCode {
    match cli::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "wps-release failed");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
