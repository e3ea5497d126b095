//! Generated installation artifacts.

pub mod descriptor;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::config::InstallConfig;
use crate::core::plan::PortPlan;
use crate::utils::template::TemplateEngine;

pub use descriptor::GridDescriptor;

pub const COMPOSE_FILE: &str = "docker-compose.yml";
pub const SITE_FILE: &str = "nginx-site.conf";
pub const MANAGE_SCRIPT: &str = "manage.sh";
pub const SMOKE_TEST: &str = "smoke_test.py";

const TEMPLATES: [(&str, &str); 4] = [
    (COMPOSE_FILE, include_str!("../../templates/docker-compose.yml.hbs")),
    (SITE_FILE, include_str!("../../templates/nginx-site.conf.hbs")),
    (MANAGE_SCRIPT, include_str!("../../templates/manage.sh.hbs")),
    (SMOKE_TEST, include_str!("../../templates/smoke_test.py.hbs")),
];

/// Seconds nginx waits on the hub. New-session requests queue at the hub
/// for up to the session timeout, so the proxy must outlast it.
fn proxy_timeout(config: &InstallConfig) -> u32 {
    config.session_timeout_secs.saturating_add(60)
}

/// A rendered file, not yet on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub name: &'static str,
    pub contents: String,
    pub executable: bool,
}

#[derive(Serialize)]
struct NodeContext<'a> {
    name: &'a str,
    image: &'static str,
    vnc_port: u16,
}

#[derive(Serialize)]
struct BrowserContext {
    name: &'static str,
    options_class: &'static str,
}

#[derive(Serialize)]
struct RenderContext<'a> {
    gridup_version: &'static str,
    generated_at: String,
    domain: &'a str,
    public_url: String,
    hub_url: String,
    hub_port: u16,
    selenium_version: &'a str,
    project: &'a str,
    compose_file: String,
    max_sessions: u8,
    session_timeout: u32,
    proxy_timeout: u32,
    nodes: Vec<NodeContext<'a>>,
    browsers: Vec<BrowserContext>,
}

pub struct Renderer {
    engine: TemplateEngine,
}

impl Renderer {
    pub fn new() -> Result<Self> {
        let mut engine = TemplateEngine::new();
        for (name, template) in TEMPLATES {
            engine.register_template(name, template)?;
        }
        Ok(Self { engine })
    }

    /// Render every artifact. `grid.json` comes last.
    pub fn render(
        &self,
        config: &InstallConfig,
        plan: &PortPlan,
        generated_at: DateTime<Utc>,
    ) -> Result<Vec<Artifact>> {
        let descriptor = GridDescriptor::new(config, plan, generated_at);
        let context = RenderContext {
            gridup_version: env!("CARGO_PKG_VERSION"),
            generated_at: generated_at.to_rfc3339(),
            domain: &config.domain,
            public_url: descriptor.public_url.clone(),
            hub_url: descriptor.hub_url.clone(),
            hub_port: plan.hub_port,
            selenium_version: &config.selenium_version,
            project: &config.compose_project,
            compose_file: descriptor.compose_file.to_string_lossy().into_owned(),
            max_sessions: config.max_sessions,
            session_timeout: config.session_timeout_secs,
            proxy_timeout: proxy_timeout(config),
            nodes: plan
                .nodes
                .iter()
                .map(|node| NodeContext {
                    name: &node.name,
                    image: node.browser.image(),
                    vnc_port: node.vnc_port,
                })
                .collect(),
            browsers: plan
                .browsers()
                .into_iter()
                .map(|browser| BrowserContext {
                    name: browser.name(),
                    options_class: browser.options_class(),
                })
                .collect(),
        };

        let mut artifacts = Vec::with_capacity(TEMPLATES.len() + 1);
        for (name, _) in TEMPLATES {
            debug!("Rendering {}", name);
            artifacts.push(Artifact {
                name,
                contents: self.engine.render_registered(name, &context)?,
                executable: name == MANAGE_SCRIPT || name == SMOKE_TEST,
            });
        }

        artifacts.push(Artifact {
            name: GridDescriptor::FILE,
            contents: descriptor.to_json()?,
            executable: false,
        });

        Ok(artifacts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NodeCounts;
    use crate::core::allocator::AllocationResult;

    fn rendered(nodes: NodeCounts, tls: bool) -> Vec<Artifact> {
        let mut config = InstallConfig {
            domain: "grid.example.com".to_string(),
            email: "ops@example.com".to_string(),
            nodes,
            max_sessions: 3,
            ..InstallConfig::default()
        };
        config.tls.enabled = tls;
        let plan = PortPlan::from_allocation(
            &config,
            &AllocationResult {
                base_port: 4445,
                range_start: 7910,
                range_size: nodes.total(),
            },
        );
        Renderer::new().unwrap().render(&config, &plan, Utc::now()).unwrap()
    }

    fn find<'a>(artifacts: &'a [Artifact], name: &str) -> &'a Artifact {
        artifacts.iter().find(|a| a.name == name).unwrap()
    }

    #[test]
    fn test_all_artifacts_rendered() {
        let artifacts = rendered(NodeCounts::default(), true);
        let names: Vec<&str> = artifacts.iter().map(|a| a.name).collect();

        assert_eq!(
            names,
            vec![COMPOSE_FILE, SITE_FILE, MANAGE_SCRIPT, SMOKE_TEST, GridDescriptor::FILE]
        );
        assert!(find(&artifacts, MANAGE_SCRIPT).executable);
        assert!(find(&artifacts, SMOKE_TEST).executable);
        assert!(!find(&artifacts, COMPOSE_FILE).executable);
    }

    #[test]
    fn test_compose_has_service_per_node() {
        let artifacts = rendered(
            NodeCounts {
                chrome: 2,
                firefox: 0,
                edge: 1,
            },
            true,
        );
        let compose = &find(&artifacts, COMPOSE_FILE).contents;

        assert!(compose.contains("image: selenium/hub:4.21.0"));
        assert!(compose.contains("\"127.0.0.1:4445:4444\""));
        assert!(compose.contains("  chrome-1:\n"));
        assert!(compose.contains("  chrome-2:\n"));
        assert!(compose.contains("  edge-1:\n"));
        assert!(!compose.contains("firefox"));
        assert!(compose.contains("\"127.0.0.1:7910:7900\""));
        assert!(compose.contains("\"127.0.0.1:7912:7900\""));
        assert!(compose.contains("SE_NODE_MAX_SESSIONS=3"));
        assert!(compose.contains("image: selenium/node-edge:4.21.0"));
    }

    #[test]
    fn test_site_proxies_hub_and_vnc() {
        let artifacts = rendered(NodeCounts::default(), true);
        let site = &find(&artifacts, SITE_FILE).contents;

        assert!(site.contains("server_name grid.example.com;"));
        assert!(site.contains("proxy_pass http://127.0.0.1:4445;"));
        assert!(site.contains("location /vnc/chrome-1/"));
        assert!(site.contains("proxy_pass http://127.0.0.1:7911/;"));
        assert!(site.contains("proxy_read_timeout 360s;"));
    }

    #[test]
    fn test_smoke_test_lists_browsers() {
        let artifacts = rendered(NodeCounts::default(), false);
        let smoke = &find(&artifacts, SMOKE_TEST).contents;

        assert!(smoke.starts_with("#!/usr/bin/env python3"));
        assert!(smoke.contains("(\"chrome\", webdriver.ChromeOptions)"));
        assert!(smoke.contains("(\"firefox\", webdriver.FirefoxOptions)"));
        assert!(smoke.contains("else \"http://grid.example.com\""));
    }

    #[test]
    fn test_manage_script_points_at_compose_file() {
        let artifacts = rendered(NodeCounts::default(), true);
        let script = &find(&artifacts, MANAGE_SCRIPT).contents;

        assert!(script.starts_with("#!/usr/bin/env bash"));
        assert!(script.contains("COMPOSE_FILE=\"/opt/selenium-grid/docker-compose.yml\""));
        assert!(script.contains("PROJECT=\"selenium-grid\""));
        assert!(script.contains("HUB_URL=\"http://127.0.0.1:4445\""));
    }

    #[test]
    fn test_descriptor_is_json() {
        let artifacts = rendered(NodeCounts::default(), true);
        let descriptor: GridDescriptor =
            serde_json::from_str(&find(&artifacts, GridDescriptor::FILE).contents).unwrap();

        assert_eq!(descriptor.hub_port, 4445);
        assert_eq!(descriptor.nodes.len(), 2);
    }
}
