use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::{Browser, InstallConfig};
use crate::core::allocator::{AllocationResult, PortAllocator, PortRequest};
use crate::utils::net::PortProbe;

/// One browser node container and the host port its noVNC view is published on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSlot {
    pub name: String,
    pub browser: Browser,
    pub vnc_port: u16,
}

/// Host ports for one installation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortPlan {
    pub hub_port: u16,
    pub nodes: Vec<NodeSlot>,
}

impl PortPlan {
    /// Allocate the hub port and one noVNC port per node against the host's
    /// current bindings.
    pub fn allocate(config: &InstallConfig, probe: &dyn PortProbe) -> Result<Self> {
        let allocator = PortAllocator::new(config.allocator)?;
        let request = PortRequest::new(config.hub_port, config.vnc_base_port, config.nodes.total());

        let allocation = allocator
            .allocate(&request, probe)
            .context("Failed to allocate host ports")?;

        if allocation.base_port != config.hub_port {
            info!(
                "Hub port {} is in use, using {} instead",
                config.hub_port, allocation.base_port
            );
        }
        if allocation.range_size > 0 && allocation.range_start != config.vnc_base_port {
            info!(
                "noVNC ports from {} are in use, using {} instead",
                config.vnc_base_port, allocation.range_start
            );
        }

        Ok(Self::from_allocation(config, &allocation))
    }

    /// Lay the allocated range out over the nodes: chrome, then firefox,
    /// then edge.
    pub fn from_allocation(config: &InstallConfig, allocation: &AllocationResult) -> Self {
        let mut ports = allocation.range_ports();
        let mut nodes = Vec::with_capacity(usize::from(allocation.range_size));

        for (browser, count) in config.nodes.families() {
            for index in 1..=count {
                // The range is sized to the node total, so it cannot run dry.
                let Some(vnc_port) = ports.next() else {
                    break;
                };
                nodes.push(NodeSlot {
                    name: format!("{}-{}", browser.name(), index),
                    browser,
                    vnc_port,
                });
            }
        }

        Self {
            hub_port: allocation.base_port,
            nodes,
        }
    }

    pub fn browsers(&self) -> Vec<Browser> {
        let mut browsers: Vec<Browser> = Vec::new();
        for node in &self.nodes {
            if !browsers.contains(&node.browser) {
                browsers.push(node.browser);
            }
        }
        browsers
    }
}
