//! Command executor trait

use std::time::Duration;

use async_trait::async_trait;

use crate::error::ExecError;
use crate::result::CommandResult;

/// Runs a program with an argument vector and collects its output
///
/// Arguments are passed verbatim, never through a shell. `env` entries are
/// set on top of the inherited environment.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run `program` with `args`, failing with `ExecError::Timeout` after `timeout`
    async fn run_with_timeout(
        &self,
        program: &str,
        args: &[String],
        env: &[(&str, &str)],
        timeout: Duration,
    ) -> Result<CommandResult, ExecError>;
}
