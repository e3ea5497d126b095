use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::{args, run_checked, CommandOutput, ToolRunner};

/// How the compose CLI is invoked on this host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComposeFlavor {
    /// `docker compose` (v2 plugin)
    Plugin,
    /// `docker-compose` (standalone v1)
    Standalone,
}

impl ComposeFlavor {
    pub async fn detect(runner: &dyn ToolRunner) -> Result<Self> {
        let plugin = runner.run("docker", &args(["compose", "version"])).await;
        if matches!(plugin, Ok(ref output) if output.success) {
            debug!("Using docker compose plugin");
            return Ok(ComposeFlavor::Plugin);
        }

        if runner.exists("docker-compose").await {
            debug!("Using standalone docker-compose");
            return Ok(ComposeFlavor::Standalone);
        }

        Err(anyhow!(
            "Neither 'docker compose' nor 'docker-compose' is available; install the Docker Compose plugin"
        ))
    }

    fn program(&self) -> &'static str {
        match self {
            ComposeFlavor::Plugin => "docker",
            ComposeFlavor::Standalone => "docker-compose",
        }
    }
}

/// One compose project defined by a manifest on disk.
pub struct Compose<'a> {
    runner: &'a dyn ToolRunner,
    flavor: ComposeFlavor,
    project: String,
    file: PathBuf,
}

impl<'a> Compose<'a> {
    pub fn new(runner: &'a dyn ToolRunner, flavor: ComposeFlavor, project: &str, file: &Path) -> Self {
        Self {
            runner,
            flavor,
            project: project.to_string(),
            file: file.to_path_buf(),
        }
    }

    fn command(&self, tail: &[&str]) -> Vec<String> {
        let mut command = Vec::new();
        if self.flavor == ComposeFlavor::Plugin {
            command.push("compose".to_string());
        }
        command.extend([
            "-p".to_string(),
            self.project.clone(),
            "-f".to_string(),
            self.file.to_string_lossy().into_owned(),
        ]);
        command.extend(args(tail.iter().copied()));
        command
    }

    async fn invoke(&self, tail: &[&str]) -> Result<CommandOutput> {
        run_checked(self.runner, self.flavor.program(), &self.command(tail)).await
    }

    pub async fn pull(&self) -> Result<()> {
        info!("Pulling grid images");
        self.invoke(&["pull", "--quiet"]).await.map(|_| ())
    }

    pub async fn up(&self) -> Result<()> {
        info!("Starting grid containers");
        self.invoke(&["up", "-d", "--remove-orphans"]).await.map(|_| ())
    }

    pub async fn down(&self) -> Result<()> {
        info!("Stopping grid containers");
        self.invoke(&["down", "--remove-orphans"]).await.map(|_| ())
    }
}
