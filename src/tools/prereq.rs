use anyhow::{anyhow, Result};
use tracing::{debug, info};

use super::ToolRunner;
use crate::config::InstallConfig;

/// Tools `install` cannot work without.
pub fn required_tools(config: &InstallConfig) -> Vec<&'static str> {
    let mut tools = vec!["docker", "nginx", "systemctl"];
    if config.tls.enabled {
        tools.push("certbot");
    }
    tools
}

/// Report every missing tool at once rather than failing on the first.
pub async fn check_tools(runner: &dyn ToolRunner, tools: &[&str]) -> Result<()> {
    let mut missing = Vec::new();
    for tool in tools {
        if runner.exists(tool).await {
            debug!("Found {}", tool);
        } else {
            missing.push(*tool);
        }
    }

    if missing.is_empty() {
        info!("All required tools present");
        Ok(())
    } else {
        Err(anyhow!(
            "Missing required tools: {}. Install them and run again.",
            missing.join(", ")
        ))
    }
}

/// Writing nginx sites and running certbot needs root.
pub fn check_root() -> Result<()> {
    if is_root() {
        Ok(())
    } else {
        Err(anyhow!("This command must be run as root (try sudo)"))
    }
}

#[cfg(unix)]
fn is_root() -> bool {
    nix::unistd::Uid::effective().is_root()
}

#[cfg(not(unix))]
fn is_root() -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::MockToolRunner;

    #[test]
    fn test_certbot_only_with_tls() {
        let mut config = InstallConfig::default();
        assert!(required_tools(&config).contains(&"certbot"));

        config.tls.enabled = false;
        assert!(!required_tools(&config).contains(&"certbot"));
    }

    #[tokio::test]
    async fn test_lists_all_missing_tools() {
        let mut runner = MockToolRunner::new();
        runner
            .expect_exists()
            .returning(|program| program == "docker");

        let err = check_tools(&runner, &["docker", "nginx", "certbot"])
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Missing required tools: nginx, certbot. Install them and run again."
        );
    }

    #[tokio::test]
    async fn test_all_present() {
        let mut runner = MockToolRunner::new();
        runner.expect_exists().times(2).returning(|_| true);

        check_tools(&runner, &["docker", "nginx"]).await.unwrap();
    }
}
