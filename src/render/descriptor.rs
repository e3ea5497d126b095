use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::config::InstallConfig;
use crate::core::plan::{NodeSlot, PortPlan};

/// `grid.json`: what was installed and where. Read back by `status`,
/// `smoke` and `uninstall`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridDescriptor {
    pub gridup_version: String,
    pub generated_at: DateTime<Utc>,
    pub domain: String,
    pub public_url: String,
    pub hub_url: String,
    pub hub_port: u16,
    pub selenium_version: String,
    pub compose_project: String,
    pub compose_file: PathBuf,
    pub site_file_name: String,
    pub tls: bool,
    pub max_sessions: u8,
    pub nodes: Vec<NodeSlot>,
}

impl GridDescriptor {
    pub const FILE: &'static str = "grid.json";

    pub fn new(config: &InstallConfig, plan: &PortPlan, generated_at: DateTime<Utc>) -> Self {
        Self {
            gridup_version: env!("CARGO_PKG_VERSION").to_string(),
            generated_at,
            domain: config.domain.clone(),
            public_url: config.public_url(),
            hub_url: config.hub_url(plan.hub_port),
            hub_port: plan.hub_port,
            selenium_version: config.selenium_version.clone(),
            compose_project: config.compose_project.clone(),
            compose_file: config.install_dir.join(super::COMPOSE_FILE),
            site_file_name: config.site_file_name(),
            tls: config.tls.enabled,
            max_sessions: config.max_sessions,
            nodes: plan.nodes.clone(),
        }
    }

    pub fn load(install_dir: &Path) -> Result<Self> {
        let path = install_dir.join(Self::FILE);
        let content = fs::read_to_string(&path).with_context(|| {
            format!(
                "Failed to read {}; is the grid installed in {}?",
                path.display(),
                install_dir.display()
            )
        })?;

        let descriptor: GridDescriptor = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        debug!(
            "Loaded descriptor for {} with {} nodes",
            descriptor.domain,
            descriptor.nodes.len()
        );
        Ok(descriptor)
    }

    /// Host ports the installed grid listens on: the hub, then each node's
    /// noVNC port.
    pub fn ports(&self) -> Vec<u16> {
        std::iter::once(self.hub_port)
            .chain(self.nodes.iter().map(|node| node.vnc_port))
            .collect()
    }

    pub fn to_json(&self) -> Result<String> {
        let mut json = serde_json::to_string_pretty(self).context("Failed to serialize grid descriptor")?;
        json.push('\n');
        Ok(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::allocator::AllocationResult;
    use tempfile::TempDir;

    #[test]
    fn test_written_descriptor_loads_back() {
        let config = InstallConfig {
            domain: "grid.example.com".to_string(),
            email: "ops@example.com".to_string(),
            ..InstallConfig::default()
        };
        let plan = PortPlan::from_allocation(
            &config,
            &AllocationResult {
                base_port: 4445,
                range_start: 7900,
                range_size: 2,
            },
        );
        let descriptor = GridDescriptor::new(&config, &plan, Utc::now());

        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(GridDescriptor::FILE), descriptor.to_json().unwrap()).unwrap();

        let loaded = GridDescriptor::load(dir.path()).unwrap();
        assert_eq!(loaded, descriptor);
        assert_eq!(loaded.hub_url, "http://127.0.0.1:4445");
        assert_eq!(loaded.public_url, "https://grid.example.com");
        assert_eq!(loaded.ports(), vec![4445, 7900, 7901]);
    }

    #[test]
    fn test_missing_descriptor_names_directory() {
        let dir = TempDir::new().unwrap();
        let err = GridDescriptor::load(dir.path()).unwrap_err();
        assert!(err.to_string().contains("is the grid installed"));
    }
}
