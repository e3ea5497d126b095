use anyhow::{anyhow, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Body of the hub's `GET /status`.
#[derive(Debug, Clone, Deserialize)]
pub struct HubStatus {
    pub value: StatusValue,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusValue {
    pub ready: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub nodes: Vec<NodeStatus>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeStatus {
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub availability: String,
    #[serde(default)]
    pub slots: Vec<serde_json::Value>,
}

impl HubStatus {
    pub fn parse(body: &str) -> Result<Self> {
        serde_json::from_str(body).context("Hub returned an unexpected /status body")
    }

    pub fn node_count(&self) -> usize {
        self.value.nodes.len()
    }

    pub fn slot_count(&self) -> usize {
        self.value.nodes.iter().map(|node| node.slots.len()).sum()
    }
}

pub fn status_url(hub_url: &str) -> Result<url::Url> {
    let base = url::Url::parse(hub_url).with_context(|| format!("Invalid hub URL: {}", hub_url))?;
    base.join("/status")
        .with_context(|| format!("Invalid hub URL: {}", hub_url))
}

/// One blocking request to the hub.
pub fn fetch_status(hub_url: &str) -> Result<HubStatus> {
    let url = status_url(hub_url)?;
    let agent: ureq::Agent = ureq::Agent::config_builder()
        .timeout_global(Some(Duration::from_secs(5)))
        .build()
        .into();

    let mut response = agent
        .get(url.as_str())
        .call()
        .with_context(|| format!("No answer from {}", url))?;
    let body = response
        .body_mut()
        .read_to_string()
        .with_context(|| format!("Failed to read response from {}", url))?;

    HubStatus::parse(&body)
}

/// Poll the hub until it reports ready or `timeout` passes.
pub async fn wait_until_ready(hub_url: &str, timeout: Duration, interval: Duration) -> Result<HubStatus> {
    info!("Waiting for the hub at {} to become ready", hub_url);

    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg} [{elapsed}]") {
        spinner.set_style(style);
    }
    spinner.set_message("Waiting for Selenium Grid");
    spinner.enable_steady_tick(Duration::from_millis(120));

    let started = Instant::now();

    loop {
        let url = hub_url.to_string();
        let attempt = tokio::task::spawn_blocking(move || fetch_status(&url))
            .await
            .context("Status check task failed")?;

        let last_message = match attempt {
            Ok(status) if status.value.ready => {
                spinner.finish_with_message(format!(
                    "Selenium Grid ready with {} nodes",
                    status.node_count()
                ));
                return Ok(status);
            }
            Ok(status) => {
                debug!("Hub not ready: {}", status.value.message);
                status.value.message
            }
            Err(e) => {
                debug!("Hub status failed: {:#}", e);
                format!("{:#}", e)
            }
        };

        if started.elapsed() >= timeout {
            spinner.abandon_with_message("Selenium Grid did not become ready");
            return Err(anyhow!(
                "Hub at {} not ready after {}s (last status: {}); inspect it with manage.sh logs",
                hub_url,
                timeout.as_secs(),
                last_message
            ));
        }

        spinner.set_message(format!("Waiting for Selenium Grid: {}", last_message));
        tokio::time::sleep(interval).await;
    }
}
