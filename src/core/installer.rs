use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::schema::ProxyConfig;
use crate::config::InstallConfig;
use crate::core::health;
use crate::core::plan::PortPlan;
use crate::render::{GridDescriptor, Renderer, COMPOSE_FILE, SITE_FILE};
use crate::tools::compose::{Compose, ComposeFlavor};
use crate::tools::proxy::Proxy;
use crate::tools::{args, certs, prereq, run_checked, ToolRunner};
use crate::utils::checksum::{ChecksumVerifier, Drift, MANIFEST_FILE};
use crate::utils::fs::FileSystemManager;
use crate::utils::net::{self, PortProbe, ReclaimingProbe};

#[derive(Debug, Clone)]
pub struct InstallOptions {
    /// Overwrite artifacts that were edited by hand.
    pub force: bool,
    pub skip_pull: bool,
    pub dry_run: bool,
    pub ready_timeout: Duration,
}

impl Default for InstallOptions {
    fn default() -> Self {
        Self {
            force: false,
            skip_pull: false,
            dry_run: false,
            ready_timeout: Duration::from_secs(120),
        }
    }
}

/// What an `install` run produced.
#[derive(Debug, Clone)]
pub struct InstallSummary {
    pub plan: PortPlan,
    pub public_url: String,
    pub artifacts: Vec<PathBuf>,
    pub ready_nodes: Option<usize>,
}

pub struct Installer {
    config: InstallConfig,
    options: InstallOptions,
    runner: Box<dyn ToolRunner>,
    fs_manager: FileSystemManager,
    checksum_verifier: ChecksumVerifier,
    renderer: Renderer,
}

impl Installer {
    pub fn new(config: InstallConfig, options: InstallOptions, runner: Box<dyn ToolRunner>) -> Result<Self> {
        let fs_manager = FileSystemManager::new(config.install_dir.clone());

        Ok(Self {
            config,
            options,
            runner,
            fs_manager,
            checksum_verifier: ChecksumVerifier::new(),
            renderer: Renderer::new()?,
        })
    }

    pub fn config(&self) -> &InstallConfig {
        &self.config
    }

    /// Allocate ports for the grid. Ports held by the grid already installed
    /// in this directory count as free, so re-rendering a running grid keeps
    /// its ports.
    pub fn plan_ports(&self, probe: &dyn PortProbe) -> Result<PortPlan> {
        let own_ports = self
            .previous_install()
            .map(|previous| previous.ports())
            .unwrap_or_default();
        if !own_ports.is_empty() {
            debug!("Ports {:?} belong to the installed grid", own_ports);
        }
        let probe = ReclaimingProbe::new(probe, own_ports);

        let plan = PortPlan::allocate(&self.config, &probe)?;
        info!(
            "Hub on port {}, {} nodes with noVNC ports {}",
            plan.hub_port,
            plan.nodes.len(),
            plan.nodes
                .iter()
                .map(|node| node.vnc_port.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );
        Ok(plan)
    }

    /// Write every artifact for `plan` into the installation directory.
    ///
    /// Files are rendered into a staging directory first, so a render error
    /// leaves the previous set untouched.
    pub fn write_artifacts(&self, plan: &PortPlan) -> Result<Vec<PathBuf>> {
        info!("Writing artifacts to {}", self.fs_manager.root().display());

        self.fs_manager.create_root()?;
        self.fs_manager.remove_stale_staging()?;
        self.check_unedited()?;

        let artifacts = self.renderer.render(&self.config, plan, Utc::now())?;

        let staging = self.fs_manager.create_staging_dir()?;
        let mut entries = BTreeMap::new();
        for artifact in &artifacts {
            let path = staging.join(artifact.name);
            self.fs_manager.write_file(&path, artifact.contents.as_bytes())?;
            if artifact.executable {
                self.fs_manager.make_executable(&path)?;
            }
            entries.insert(
                artifact.name.to_string(),
                self.checksum_verifier.hash_bytes(artifact.contents.as_bytes()),
            );
        }

        let names: Vec<&str> = artifacts.iter().map(|artifact| artifact.name).collect();
        // The old manifest must not describe a half-promoted set.
        self.checksum_verifier
            .remove_manifest(self.fs_manager.root())?;
        self.fs_manager
            .promote(&staging, &names)
            .context("Failed to move rendered artifacts into place")?;
        self.checksum_verifier
            .write_manifest(self.fs_manager.root(), &entries)?;

        Ok(names.iter().map(|name| self.fs_manager.path(name)).collect())
    }

    /// Refuse to replace generated files that were edited by hand, unless
    /// forced. Files that are gone are regenerated.
    fn check_unedited(&self) -> Result<()> {
        if self.options.force {
            return Ok(());
        }

        let edited: Vec<String> = self
            .checksum_verifier
            .verify_manifest(self.fs_manager.root())?
            .into_iter()
            .filter_map(|drift| match drift {
                Drift::Modified { name } => Some(name),
                Drift::Missing { .. } => None,
            })
            .collect();
        if !edited.is_empty() {
            return Err(anyhow!(
                "{} changed since gridup generated them; rerun with --force to overwrite",
                edited.join(", ")
            ));
        }
        Ok(())
    }

    /// The grid already installed in this directory, if any. A descriptor
    /// that exists but cannot be read is reported and ignored.
    fn previous_install(&self) -> Option<GridDescriptor> {
        let path = self.fs_manager.path(GridDescriptor::FILE);
        if !path.exists() {
            return None;
        }

        match GridDescriptor::load(self.fs_manager.root()) {
            Ok(descriptor) => Some(descriptor),
            Err(e) => {
                warn!(
                    "Ignoring unreadable {} ({:#}); containers from the earlier install may still hold their ports",
                    path.display(),
                    e
                );
                None
            }
        }
    }

    /// Allocate ports and write artifacts. No external tool runs.
    pub fn render(&self, probe: &dyn PortProbe) -> Result<(PortPlan, Vec<PathBuf>)> {
        let plan = self.plan_ports(probe)?;
        let artifacts = self.write_artifacts(&plan)?;
        Ok((plan, artifacts))
    }

    pub async fn install(&self) -> Result<InstallSummary> {
        info!("Installing Selenium Grid for {}", self.config.domain);
        let runner = self.runner.as_ref();

        if self.options.dry_run {
            info!("Dry run: external commands are logged, not executed");
        } else {
            prereq::check_root()?;
        }
        prereq::check_tools(runner, &prereq::required_tools(&self.config)).await?;
        // Before anything is stopped.
        self.check_unedited()?;
        let flavor = ComposeFlavor::detect(runner).await?;

        self.stop_existing(runner, &flavor).await?;

        // Snapshot the port table only now, after our own containers are gone.
        let plan = {
            let probe = net::system_probe();
            self.plan_ports(probe.as_ref())?
        };
        let artifacts = self.write_artifacts(&plan)?;

        let compose = Compose::new(
            runner,
            flavor,
            &self.config.compose_project,
            &self.fs_manager.path(COMPOSE_FILE),
        );
        if !self.options.skip_pull {
            compose.pull().await.context("Failed to pull grid images")?;
        }
        compose.up().await.context("Failed to start the grid")?;

        let proxy = Proxy::new(runner, &self.config.proxy, &self.config.site_file_name());
        proxy
            .install_site(&self.fs_manager.path(SITE_FILE))
            .await?;

        certs::issue_certificate(runner, &self.config).await?;

        let ready_nodes = if self.options.dry_run {
            None
        } else {
            let status = health::wait_until_ready(
                &self.config.hub_url(plan.hub_port),
                self.options.ready_timeout,
                Duration::from_secs(2),
            )
            .await?;
            Some(status.node_count())
        };

        info!("Selenium Grid installed at {}", self.config.public_url());
        Ok(InstallSummary {
            public_url: self.config.public_url(),
            plan,
            artifacts,
            ready_nodes,
        })
    }

    /// Bring down a grid installed earlier into the same directory so its
    /// ports are free for allocation again.
    async fn stop_existing(&self, runner: &dyn ToolRunner, flavor: &ComposeFlavor) -> Result<()> {
        let Some(previous) = self.previous_install() else {
            return Ok(());
        };
        if !previous.compose_file.exists() {
            return Ok(());
        }

        info!(
            "Existing installation for {} found, stopping it before allocating ports",
            previous.domain
        );
        Compose::new(runner, flavor.clone(), &previous.compose_project, &previous.compose_file)
            .down()
            .await
            .context("Failed to stop the existing grid")
    }

    /// Stop the grid and remove its nginx site. With `purge`, also delete
    /// the certificate and the installation directory.
    pub async fn uninstall(
        install_dir: &Path,
        runner: &dyn ToolRunner,
        proxy_config: &ProxyConfig,
        purge: bool,
        dry_run: bool,
    ) -> Result<()> {
        let descriptor = GridDescriptor::load(install_dir)?;
        info!("Uninstalling Selenium Grid for {}", descriptor.domain);

        if !dry_run {
            prereq::check_root()?;
        }

        let flavor = ComposeFlavor::detect(runner).await?;
        Compose::new(runner, flavor, &descriptor.compose_project, &descriptor.compose_file)
            .down()
            .await?;

        Proxy::new(runner, proxy_config, &descriptor.site_file_name)
            .remove_site()
            .await?;

        if purge {
            if descriptor.tls {
                run_checked(
                    runner,
                    "certbot",
                    &args(["delete", "--non-interactive", "--cert-name", descriptor.domain.as_str()]),
                )
                .await
                .context("Failed to delete certificate")?;
            }
            if dry_run {
                info!("[dry-run] would remove {}", install_dir.display());
            } else {
                FileSystemManager::new(install_dir.to_path_buf()).remove_dir(install_dir)?;
            }
        } else {
            warn!(
                "Kept {} and the certificate for {}; pass --purge to remove them",
                install_dir.display(),
                descriptor.domain
            );
        }

        Ok(())
    }

    /// Generated files that changed on disk, plus files in the directory that
    /// gridup did not generate.
    pub fn verify_artifacts(install_dir: &Path) -> Result<(Vec<Drift>, Vec<String>)> {
        let verifier = ChecksumVerifier::new();
        let manifest = verifier.read_manifest(install_dir)?;
        if manifest.is_empty() {
            return Err(anyhow!(
                "No {} in {}; nothing to verify",
                MANIFEST_FILE,
                install_dir.display()
            ));
        }

        let drift = verifier.verify_manifest(install_dir)?;
        let untracked = FileSystemManager::new(install_dir.to_path_buf())
            .list_files()?
            .into_iter()
            .filter(|name| name != MANIFEST_FILE && !manifest.contains_key(name))
            .collect();

        Ok((drift, untracked))
    }
}
