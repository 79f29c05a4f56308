//! Process commands and their captured output
//!
//! Every external tool the pipeline drives (the container CLI, git, compose)
//! is described as a [`ProcessCommand`]: an argv with an optional working
//! directory. No shell is involved, so arguments never need
//! quoting.
//!
//! ## Variable Expansion
//!
//! Values handed to the service container may refer to other configured
//! values using the `${VAR_NAME}` syntax:
//!
//! ```rust
//! use std::collections::HashMap;
//! use wps_release::expand_variables;
//!
//! let env = HashMap::from([("WORKDIR".to_string(), "/srv/data".to_string())]);
//! assert_eq!(expand_variables("${WORKDIR}/cache", &env), "/srv/data/cache");
//! ```

use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// An external program invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessCommand {
    /// Program to execute
    pub program: String,

    /// Arguments, passed verbatim
    pub args: Vec<String>,

    /// Working directory (inherits the caller's when unset)
    pub cwd: Option<PathBuf>,
}

impl ProcessCommand {
    /// Creates a command for the given program
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
        }
    }

    /// Appends one argument
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets the working directory
    #[must_use]
    pub fn current_dir(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Returns the full argv, program first
    #[must_use]
    pub fn argv(&self) -> Vec<&str> {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect()
    }
}

impl fmt::Display for ProcessCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", shell_words::join(self.argv()))
    }
}

/// Captured result of a finished process
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProcessOutput {
    /// Standard output
    pub stdout: String,

    /// Standard error
    pub stderr: String,

    /// Exit code (-1 when killed by a signal)
    pub exit_code: i32,

    /// Wall-clock duration
    pub duration: Duration,
}

impl ProcessOutput {
    /// A successful output carrying the given stdout
    #[must_use]
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            ..Self::default()
        }
    }

    /// A failed output with the given exit code and stderr
    #[must_use]
    pub fn failure(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            stderr: stderr.into(),
            exit_code,
            ..Self::default()
        }
    }

    /// Returns true if command succeeded (exit code 0)
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }

    /// Returns true if command failed
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.exit_code != 0
    }

    /// Standard output without surrounding whitespace
    #[must_use]
    pub fn stdout_trimmed(&self) -> &str {
        self.stdout.trim()
    }
}

/// Expands `${VAR_NAME}` references in a string
///
/// Unknown variables are left untouched.
pub fn expand_variables<S: std::hash::BuildHasher>(
    input: &str,
    env: &HashMap<String, String, S>,
) -> String {
    static VAR_PATTERN: once_cell::sync::Lazy<Regex> = once_cell::sync::Lazy::new(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("variable pattern is valid")
    });

    VAR_PATTERN
        .replace_all(input, |caps: &regex::Captures| {
            let var_name = caps.get(1).map_or("", |m| m.as_str());
            env.get(var_name).cloned().unwrap_or_else(|| {
                caps.get(0)
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_default()
            })
        })
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_display_quotes_arguments() {
        let cmd = ProcessCommand::new("docker")
            .arg("run")
            .arg("--rm")
            .arg("qgis-wps:ltr-abc1234")
            .arg("a b");

        assert_eq!(cmd.to_string(), "docker run --rm qgis-wps:ltr-abc1234 'a b'");
    }

    #[test]
    fn test_command_argv() {
        let cmd = ProcessCommand::new("git").args(["rev-parse", "--short", "HEAD"]);
        assert_eq!(cmd.argv(), vec!["git", "rev-parse", "--short", "HEAD"]);
    }

    #[test]
    fn test_command_cwd() {
        let cmd = ProcessCommand::new("true").current_dir("/tmp");

        assert_eq!(cmd.cwd, Some(PathBuf::from("/tmp")));
    }

    #[test]
    fn test_output_status() {
        assert!(ProcessOutput::success("1.7.3\n").is_success());
        assert_eq!(ProcessOutput::success("1.7.3\n").stdout_trimmed(), "1.7.3");

        let failed = ProcessOutput::failure(125, "no such image");
        assert!(failed.is_failure());
        assert_eq!(failed.exit_code, 125);
    }

    #[test]
    fn test_expand_variables_simple() {
        let env = HashMap::from([("WORKDIR".to_string(), "/srv/data".to_string())]);
        assert_eq!(expand_variables("${WORKDIR}/out", &env), "/srv/data/out");
    }

    #[test]
    fn test_expand_variables_not_found() {
        let env = HashMap::from([("FOO".to_string(), "bar".to_string())]);
        assert_eq!(expand_variables("echo ${UNKNOWN}", &env), "echo ${UNKNOWN}");
    }

    #[test]
    fn test_expand_variables_mixed() {
        let env = HashMap::from([
            ("HOST".to_string(), "redis".to_string()),
            ("FOO".to_string(), "bar".to_string()),
        ]);

        let expanded = expand_variables("${HOST} and ${UNKNOWN} and ${FOO}", &env);
        assert_eq!(expanded, "redis and ${UNKNOWN} and bar");
    }
}
