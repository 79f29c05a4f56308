//! Registry promotion
//!
//! Tags the local build under each planned alias and pushes the aliases.
//! Aliases are independent: a failing one is recorded and the remaining
//! ones are still attempted. Nothing already pushed is rolled back; the
//! manifest stays on disk so the push stage can simply be re-run.

use super::tags::ImageReference;
use crate::infrastructure::ContainerCli;
use crate::pipeline::{ReleaseError, ReleaseResult};

/// Outcome of a tag or push pass over all aliases
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushReport {
    /// Aliases that succeeded, in order
    pub succeeded: Vec<ImageReference>,
    /// Aliases that failed with the reason, in order
    pub failed: Vec<(ImageReference, String)>,
}

impl PushReport {
    /// Returns true if no alias failed
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Turns the first failure into [`ReleaseError::PushFailed`]
    ///
    /// # Errors
    ///
    /// Returns the first failing alias.
    pub fn into_result(self) -> ReleaseResult<Vec<ImageReference>> {
        match self.failed.into_iter().next() {
            Some((reference, reason)) => Err(ReleaseError::PushFailed {
                reference: reference.to_string(),
                reason,
            }),
            None => Ok(self.succeeded),
        }
    }
}

/// Applies and pushes aliases through the container CLI
#[derive(Debug, Clone, Copy)]
pub struct Pusher<'a> {
    cli: ContainerCli<'a>,
}

impl<'a> Pusher<'a> {
    /// Creates a pusher
    #[must_use]
    pub fn new(cli: ContainerCli<'a>) -> Self {
        Self { cli }
    }

    /// Tags `source` locally under every reference
    #[must_use]
    pub fn tag_all(&self, source: &str, references: &[ImageReference]) -> PushReport {
        self.each(references, "Tagging", |reference| {
            self.cli.tag(source, reference)
        })
    }

    /// Pushes every reference to the registry
    #[must_use]
    pub fn push_all(&self, references: &[ImageReference]) -> PushReport {
        self.each(references, "Pushing", |reference| self.cli.push(reference))
    }

    fn each<F>(&self, references: &[ImageReference], action: &str, op: F) -> PushReport
    where
        F: Fn(&str) -> ReleaseResult<()>,
    {
        let mut report = PushReport::default();
        for reference in references {
            let rendered = reference.to_string();
            tracing::info!(reference = %rendered, "{action}");
            match op(&rendered) {
                Ok(()) => report.succeeded.push(reference.clone()),
                Err(err) => {
                    let reason = match err {
                        ReleaseError::CommandFailed { stderr, code, .. } if stderr.is_empty() => {
                            format!("exit code {code}")
                        }
                        ReleaseError::CommandFailed { stderr, .. } => stderr,
                        other => other.to_string(),
                    };
                    tracing::error!(reference = %rendered, reason = %reason, "{action} failed");
                    report.failed.push((reference.clone(), reason));
                }
            }
        }
        report
    }
}
