//! Command-line front-end for wps-release
//!
//! Every stage is a subcommand; `deliver` and `release` run the composite
//! targets. Configuration comes from the environment, with flags taking
//! precedence.

pub mod completions;

use anyhow::{Context, Result};
use clap::{Args as ClapArgs, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use wps_release::executor::{CommandRunner, LocalRunner, PipelineExecutor, ScriptedRunner};
use wps_release::infrastructure::{Config, ContainerRuntime, init_logging};
use wps_release::pipeline::{Pipeline, Validate};
use wps_release::release::PipelineRunner;

/// CLI arguments for wps-release
#[derive(Parser, Debug)]
#[command(name = "wps-release")]
#[command(author, version, about = "Build, test and publish the WPS service image", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    global: GlobalArgs,
}

#[derive(ClapArgs, Debug)]
struct GlobalArgs {
    /// Platform flavor to build against
    #[arg(long, env = "FLAVOR", global = true)]
    flavor: Option<String>,

    /// Registry namespace aliases are pushed to
    #[arg(long, env = "REGISTRY_URL", global = true)]
    registry_url: Option<String>,

    /// Container runtime (docker or podman)
    #[arg(long, global = true)]
    runtime: Option<String>,

    /// Manifest file path
    #[arg(long, global = true)]
    manifest: Option<PathBuf>,

    /// Log commands instead of running them
    #[arg(long, global = true)]
    dry_run: bool,

    /// Stream command output to the log
    #[arg(long, global = true)]
    stream: bool,

    /// Log level filter
    #[arg(long, env = "WPS_RELEASE_LOG", default_value = "info", global = true)]
    log_level: String,

    /// Shortcut for --log-level debug
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build the flavor image for the current commit
    Build,
    /// Record the build manifest from the built image
    Manifest,
    /// Apply the release aliases locally
    Tag,
    /// Push the release aliases
    Push,
    /// Tag then push
    Deliver,
    /// Build, manifest, tag and push
    Release,
    /// Remove the build image
    Clean,
    /// Remove every local image of this build and its aliases
    CleanAll,
    /// Start the service with its dependencies
    Run,
    /// Stop the service
    Stop,
    /// Run the test suite for each flavor
    Test {
        /// Flavors to test (comma separated, defaults to TEST_FLAVORS)
        #[arg(long, value_delimiter = ',')]
        flavors: Vec<String>,
    },
    /// Show the current manifest and its aliases
    Status,
    /// Generate shell completions
    Completions {
        /// Shell type
        #[arg(value_enum)]
        shell: Shell,
        /// Output file (stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

impl Command {
    fn target(&self) -> Option<&'static str> {
        match self {
            Self::Build => Some("build"),
            Self::Manifest => Some("manifest"),
            Self::Tag => Some("tag"),
            Self::Push => Some("push"),
            Self::Deliver => Some("deliver"),
            Self::Release => Some("release"),
            Self::Clean => Some("clean"),
            Self::CleanAll => Some("clean-all"),
            Self::Run => Some("run"),
            Self::Stop => Some("stop"),
            Self::Test { .. } => Some("test"),
            Self::Status | Self::Completions { .. } => None,
        }
    }
}

/// Build the CLI command for completion generation
pub fn build_cli() -> clap::Command {
    Args::command()
}

fn load_config(global: &GlobalArgs, flavors: &[String]) -> Result<Config> {
    let mut config = Config::from_env().context("Failed to read configuration")?;
    if let Some(flavor) = &global.flavor {
        config.flavor.clone_from(flavor);
    }
    if let Some(url) = &global.registry_url {
        config.registry_url = Some(url.clone()).filter(|u| !u.is_empty());
    }
    if let Some(runtime) = &global.runtime {
        config.runtime = runtime.parse::<ContainerRuntime>()?;
    }
    if let Some(manifest) = &global.manifest {
        config.manifest_path.clone_from(manifest);
    }
    if !flavors.is_empty() {
        config.flavors = flavors.to_vec();
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn runner(global: &GlobalArgs) -> Box<dyn CommandRunner> {
    if global.dry_run {
        Box::new(
            ScriptedRunner::new()
                .reply("rev-parse", "0000000\n")
                .reply(" version", "0.0.0\n"),
        )
    } else {
        Box::new(LocalRunner::new().with_streaming(global.stream))
    }
}

/// Parse and execute CLI arguments
pub fn run() -> Result<()> {
    let args = Args::parse();

    let level = if args.global.verbose {
        "debug"
    } else {
        args.global.log_level.as_str()
    };
    init_logging(level);

    if let Command::Completions { shell, output } = &args.command {
        let completions = completions::generate_completions(*shell)?;
        if let Some(output_path) = output {
            completions::save_completions(&completions, output_path)?;
        } else {
            println!("{completions}");
        }
        return Ok(());
    }

    let flavors = match &args.command {
        Command::Test { flavors } => flavors.clone(),
        _ => Vec::new(),
    };
    let config = load_config(&args.global, &flavors)?;
    let runner = runner(&args.global);
    let release = PipelineRunner::new(&config, runner.as_ref()).with_dry_run(args.global.dry_run);

    let Some(target) = args.command.target() else {
        let status = release.status()?;
        print!("{status}");
        return Ok(());
    };

    let health = release.health_check();
    if !health.is_operational() {
        tracing::warn!(status = ?health, "Container runtime is not operational");
    }

    let pipeline = Pipeline::from_targets([target])?;
    let report = release
        .execute(&pipeline)
        .with_context(|| format!("'{target}' failed"))?;
    tracing::info!(
        run_id = %report.run_id,
        stages = report.stages.len(),
        "Done"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        build_cli().debug_assert();
    }

    #[test]
    fn test_parse_test_flavors() {
        let args = Args::try_parse_from(["wps-release", "test", "--flavors", "ltr,release"]).unwrap();
        match args.command {
            Command::Test { flavors } => assert_eq!(flavors, vec!["ltr", "release"]),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args =
            Args::try_parse_from(["wps-release", "push", "--dry-run", "--manifest", "m.txt"]).unwrap();
        assert!(args.global.dry_run);
        assert_eq!(args.global.manifest, Some(PathBuf::from("m.txt")));
        assert_eq!(args.command.target(), Some("push"));
    }

    #[test]
    fn test_clean_all_is_kebab_case() {
        let args = Args::try_parse_from(["wps-release", "clean-all"]).unwrap();
        assert_eq!(args.command.target(), Some("clean-all"));
    }

    #[test]
    fn test_dry_run_runner_answers_version() {
        let args = Args::try_parse_from(["wps-release", "manifest", "--dry-run"]).unwrap();
        let runner = runner(&args.global);
        let output = runner
            .run(&wps_release::executor::ProcessCommand::new("docker").args(["run", "--rm", "img", "version"]))
            .unwrap();
        assert_eq!(output.stdout_trimmed(), "0.0.0");
    }
}
