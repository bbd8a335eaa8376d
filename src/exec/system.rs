//! Process runner backed by `tokio::process`

use crate::error::{RbpackError, RbpackResult};
use crate::exec::runner::CommandRunner;
use crate::exec::{stream_child_output, CommandOutput, CommandSpec};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Indentation used for subprocess output in the build log
const LOG_INDENT: &str = "       ";

/// Runs commands as real child processes
#[derive(Debug, Clone)]
pub struct SystemRunner {
    echo: bool,
}

impl SystemRunner {
    /// Create a runner that echoes streamed output to stdout
    pub fn new() -> Self {
        Self { echo: true }
    }

    /// Create a runner that only logs streamed output at debug level
    pub fn quiet() -> Self {
        Self { echo: false }
    }

    fn command(spec: &CommandSpec) -> Command {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args).env_clear().envs(&spec.env);
        if let Some(ref dir) = spec.cwd {
            cmd.current_dir(dir);
        }
        cmd
    }
}

impl Default for SystemRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, spec: &CommandSpec) -> RbpackResult<CommandOutput> {
        debug!("Executing: {}", spec);

        let output = Self::command(spec)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| RbpackError::command_failed(spec.to_string(), e))?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    async fn run_streaming(&self, spec: &CommandSpec) -> RbpackResult<CommandOutput> {
        debug!("Executing (streaming): {}", spec);

        let mut child = Self::command(spec)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| RbpackError::command_failed(spec.to_string(), e))?;

        let echo = self.echo;
        let lines = stream_child_output(&mut child, &move |line: String| {
            if echo {
                println!("{}{}", LOG_INDENT, line);
            } else {
                debug!("{}", line);
            }
        })
        .await;

        let status = child
            .wait()
            .await
            .map_err(|e| RbpackError::command_failed(spec.to_string(), e))?;

        Ok(CommandOutput {
            code: status.code(),
            stdout: lines.join("\n"),
            stderr: String::new(),
        })
    }
}
