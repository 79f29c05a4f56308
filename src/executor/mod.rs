//! Process execution layer
//!
//! This module contains the process-invocation abstraction every stage goes
//! through, with a host implementation and a scripted one.

mod command;
mod local;
mod scripted;
mod traits;

pub use command::{ProcessCommand, ProcessOutput, expand_variables};
pub use local::LocalRunner;
pub use scripted::ScriptedRunner;
pub use traits::{CommandRunner, HealthStatus, PipelineExecutor};
