use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::info;

use super::{args, run_checked, ToolRunner};
use crate::config::schema::ProxyConfig;

/// nginx site management. Every change to system directories goes through
/// the runner so a dry run touches nothing.
pub struct Proxy<'a> {
    runner: &'a dyn ToolRunner,
    available: PathBuf,
    enabled: PathBuf,
}

impl<'a> Proxy<'a> {
    pub fn new(runner: &'a dyn ToolRunner, config: &ProxyConfig, site_file_name: &str) -> Self {
        Self {
            runner,
            available: config.sites_available.join(site_file_name),
            enabled: config.sites_enabled.join(site_file_name),
        }
    }

    /// Copy the rendered site into place, enable it, check the whole nginx
    /// configuration and reload.
    pub async fn install_site(&self, rendered: &Path) -> Result<()> {
        info!("Installing nginx site {}", self.available.display());

        run_checked(
            self.runner,
            "install",
            &args([
                "-m".to_string(),
                "0644".to_string(),
                rendered.to_string_lossy().into_owned(),
                self.available.to_string_lossy().into_owned(),
            ]),
        )
        .await
        .context("Failed to copy site configuration")?;

        run_checked(
            self.runner,
            "ln",
            &args([
                "-sf".to_string(),
                self.available.to_string_lossy().into_owned(),
                self.enabled.to_string_lossy().into_owned(),
            ]),
        )
        .await
        .context("Failed to enable site")?;

        self.test_config().await?;
        self.reload().await
    }

    pub async fn remove_site(&self) -> Result<()> {
        info!("Removing nginx site {}", self.available.display());

        run_checked(
            self.runner,
            "rm",
            &args([
                "-f".to_string(),
                self.enabled.to_string_lossy().into_owned(),
                self.available.to_string_lossy().into_owned(),
            ]),
        )
        .await
        .context("Failed to remove site configuration")?;

        self.test_config().await?;
        self.reload().await
    }

    pub async fn test_config(&self) -> Result<()> {
        run_checked(self.runner, "nginx", &args(["-t"]))
            .await
            .context("nginx rejected the configuration")
            .map(|_| ())
    }

    pub async fn reload(&self) -> Result<()> {
        run_checked(self.runner, "systemctl", &args(["reload", "nginx"]))
            .await
            .context("Failed to reload nginx")
            .map(|_| ())
    }
}
