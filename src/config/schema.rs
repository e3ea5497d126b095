use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::core::allocator::AllocatorLimits;

/// Everything an installation run needs. Built once, validated, then only
/// borrowed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallConfig {
    pub domain: String,
    pub email: String,
    pub install_dir: PathBuf,
    pub selenium_version: String,
    pub hub_port: u16,
    pub vnc_base_port: u16,
    pub nodes: NodeCounts,
    pub max_sessions: u8,
    pub session_timeout_secs: u32,
    pub tls: TlsConfig,
    pub proxy: ProxyConfig,
    pub compose_project: String,
    pub allocator: AllocatorLimits,
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            domain: String::new(),
            email: String::new(),
            install_dir: PathBuf::from("/opt/selenium-grid"),
            selenium_version: default_selenium_version(),
            hub_port: 4444,
            vnc_base_port: 7900,
            nodes: NodeCounts::default(),
            max_sessions: 1,
            session_timeout_secs: 300,
            tls: TlsConfig::default(),
            proxy: ProxyConfig::default(),
            compose_project: "selenium-grid".to_string(),
            allocator: AllocatorLimits::default(),
        }
    }
}

fn default_selenium_version() -> String {
    "4.21.0".to_string()
}

/// Number of node containers per browser family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeCounts {
    pub chrome: u8,
    pub firefox: u8,
    pub edge: u8,
}

impl Default for NodeCounts {
    fn default() -> Self {
        Self {
            chrome: 1,
            firefox: 1,
            edge: 0,
        }
    }
}

impl NodeCounts {
    pub fn total(&self) -> u16 {
        u16::from(self.chrome) + u16::from(self.firefox) + u16::from(self.edge)
    }

    /// Families in the order their containers are laid out.
    pub fn families(&self) -> [(Browser, u8); 3] {
        [
            (Browser::Chrome, self.chrome),
            (Browser::Firefox, self.firefox),
            (Browser::Edge, self.edge),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Browser {
    Chrome,
    Firefox,
    Edge,
}

impl Browser {
    pub fn name(&self) -> &'static str {
        match self {
            Browser::Chrome => "chrome",
            Browser::Firefox => "firefox",
            Browser::Edge => "edge",
        }
    }

    pub fn image(&self) -> &'static str {
        match self {
            Browser::Chrome => "selenium/node-chrome",
            Browser::Firefox => "selenium/node-firefox",
            Browser::Edge => "selenium/node-edge",
        }
    }

    /// Browser name as the Python bindings' options class expects it.
    pub fn options_class(&self) -> &'static str {
        match self {
            Browser::Chrome => "ChromeOptions",
            Browser::Firefox => "FirefoxOptions",
            Browser::Edge => "EdgeOptions",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    pub enabled: bool,
    /// Use the certificate authority's staging endpoint.
    pub staging: bool,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            staging: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    pub sites_available: PathBuf,
    pub sites_enabled: PathBuf,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            sites_available: PathBuf::from("/etc/nginx/sites-available"),
            sites_enabled: PathBuf::from("/etc/nginx/sites-enabled"),
        }
    }
}

impl InstallConfig {
    pub fn hub_url(&self, hub_port: u16) -> String {
        format!("http://127.0.0.1:{}", hub_port)
    }

    pub fn public_url(&self) -> String {
        let scheme = if self.tls.enabled { "https" } else { "http" };
        format!("{}://{}", scheme, self.domain)
    }

    pub fn site_file_name(&self) -> String {
        format!("{}.conf", self.domain)
    }
}
