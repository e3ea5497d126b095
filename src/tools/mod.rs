pub mod certs;
pub mod compose;
pub mod prereq;
pub mod proxy;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command as TokioCommand;
use tracing::{debug, info};

/// Captured result of one external command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn ok(stdout: &str) -> Self {
        Self {
            success: true,
            code: Some(0),
            stdout: stdout.to_string(),
            stderr: String::new(),
        }
    }

    pub fn failed(code: i32, stderr: &str) -> Self {
        Self {
            success: false,
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.to_string(),
        }
    }
}

/// Runs the container runtime, web server and certificate client.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ToolRunner: Send + Sync {
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput>;

    /// Whether `program` resolves on PATH.
    async fn exists(&self, program: &str) -> bool;
}

/// Run a command and turn a non-zero exit into an error carrying stderr.
pub async fn run_checked(runner: &dyn ToolRunner, program: &str, args: &[String]) -> Result<CommandOutput> {
    let output = runner
        .run(program, args)
        .await
        .with_context(|| format!("Failed to execute {}", program))?;

    if !output.success {
        return Err(anyhow!(
            "{} {} failed ({}): {}",
            program,
            args.join(" "),
            output
                .code
                .map(|c| format!("exit code {}", c))
                .unwrap_or_else(|| "killed by signal".to_string()),
            output.stderr.trim()
        ));
    }

    Ok(output)
}

pub fn args<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    items.into_iter().map(Into::into).collect()
}

pub struct SystemRunner;

impl SystemRunner {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SystemRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolRunner for SystemRunner {
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput> {
        debug!("Running: {} {}", program, args.join(" "));

        let output = TokioCommand::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .with_context(|| format!("Failed to spawn {}", program))?;

        Ok(CommandOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    async fn exists(&self, program: &str) -> bool {
        TokioCommand::new("which")
            .arg(program)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false)
    }
}

/// Logs each command instead of running it.
pub struct DryRunRunner;

#[async_trait]
impl ToolRunner for DryRunRunner {
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput> {
        info!("[dry-run] {} {}", program, args.join(" "));
        Ok(CommandOutput::ok(""))
    }

    async fn exists(&self, _program: &str) -> bool {
        true
    }
}
