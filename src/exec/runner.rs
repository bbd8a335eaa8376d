//! Command runner abstraction
//!
//! Provides a trait for subprocess execution so the pipeline can be driven
//! by the real process layer or by a scripted runner in tests.

use crate::error::RbpackResult;
use crate::exec::{CommandOutput, CommandSpec};
use async_trait::async_trait;

/// Abstract process execution interface
///
/// A non-zero exit is reported through [`CommandOutput::code`], not as an
/// error; `Err` is reserved for failing to launch the command at all.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run a command to completion and capture its output
    async fn run(&self, spec: &CommandSpec) -> RbpackResult<CommandOutput>;

    /// Run a command, forwarding its output live to the build log, and
    /// return the combined output
    async fn run_streaming(&self, spec: &CommandSpec) -> RbpackResult<CommandOutput>;
}
