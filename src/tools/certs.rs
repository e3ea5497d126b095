use anyhow::{Context, Result};
use tracing::{info, warn};

use super::{run_checked, ToolRunner};
use crate::config::InstallConfig;

/// certbot arguments for issuing through the nginx plugin. The plugin
/// rewrites the installed site for TLS and adds the HTTP redirect.
pub fn certbot_args(config: &InstallConfig) -> Vec<String> {
    let mut args = vec![
        "--nginx".to_string(),
        "--non-interactive".to_string(),
        "--agree-tos".to_string(),
        "--redirect".to_string(),
        "-m".to_string(),
        config.email.clone(),
        "-d".to_string(),
        config.domain.clone(),
    ];
    if config.tls.staging {
        args.push("--staging".to_string());
    }
    args
}

pub async fn issue_certificate(runner: &dyn ToolRunner, config: &InstallConfig) -> Result<()> {
    if !config.tls.enabled {
        warn!("TLS disabled, the grid will be served over plain HTTP");
        return Ok(());
    }

    info!("Requesting certificate for {}", config.domain);
    if config.tls.staging {
        info!("Using the staging certificate authority; browsers will not trust this certificate");
    }

    run_checked(runner, "certbot", &certbot_args(config))
        .await
        .with_context(|| {
            format!(
                "Certificate issuance for {} failed; check that its DNS record points at this host and port 80 is reachable",
                config.domain
            )
        })?;

    Ok(())
}
