use anyhow::{anyhow, Result};
use log::{debug, warn};
use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

use super::schema::InstallConfig;
use crate::core::allocator::PortAllocator;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid field value: {0}")]
    InvalidValue(String),

    #[error("Unsupported value: {0}")]
    UnsupportedValue(String),
}

pub const MAX_SESSIONS_PER_NODE: u8 = 32;

fn domain_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?i)([a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?\.)+[a-z]{2,63}$")
            .expect("domain pattern compiles")
    })
}

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern compiles")
    })
}

fn tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.-]{0,127}$").expect("tag pattern compiles"))
}

fn project_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-z0-9][a-z0-9_-]*$").expect("project pattern compiles"))
}

pub fn is_valid_domain(domain: &str) -> bool {
    domain.len() <= 253 && domain_pattern().is_match(domain)
}

pub fn is_valid_email(email: &str) -> bool {
    email_pattern().is_match(email)
}

/// Validate the structure of an installation config
pub fn validate_config_structure(config: &InstallConfig) -> Result<()> {
    debug!("Validating configuration structure");

    if config.domain.is_empty() {
        return Err(anyhow!(ValidationError::MissingField("domain".to_string())));
    }
    if !is_valid_domain(&config.domain) {
        return Err(anyhow!(ValidationError::InvalidValue(format!(
            "domain '{}' is not a valid host name",
            config.domain
        ))));
    }

    if config.tls.enabled {
        if config.email.is_empty() {
            return Err(anyhow!(ValidationError::MissingField(
                "email (required for certificate registration)".to_string()
            )));
        }
        if !is_valid_email(&config.email) {
            return Err(anyhow!(ValidationError::InvalidValue(format!(
                "email '{}' is not a valid address",
                config.email
            ))));
        }
    } else if config.tls.staging {
        warn!("tls.staging has no effect while tls.enabled is false");
    }

    if config.hub_port == 0 {
        return Err(anyhow!(ValidationError::InvalidValue(
            "hub_port must be in 1-65535".to_string()
        )));
    }
    if config.vnc_base_port == 0 {
        return Err(anyhow!(ValidationError::InvalidValue(
            "vnc_base_port must be in 1-65535".to_string()
        )));
    }

    if config.nodes.total() == 0 {
        return Err(anyhow!(ValidationError::InvalidValue(
            "at least one browser node is required".to_string()
        )));
    }

    if config.max_sessions == 0 || config.max_sessions > MAX_SESSIONS_PER_NODE {
        return Err(anyhow!(ValidationError::InvalidValue(format!(
            "max_sessions must be in 1-{}, got {}",
            MAX_SESSIONS_PER_NODE, config.max_sessions
        ))));
    }

    if config.session_timeout_secs == 0 {
        return Err(anyhow!(ValidationError::InvalidValue(
            "session_timeout_secs must be positive".to_string()
        )));
    }

    if !tag_pattern().is_match(&config.selenium_version) {
        return Err(anyhow!(ValidationError::UnsupportedValue(format!(
            "selenium_version '{}' is not a valid image tag",
            config.selenium_version
        ))));
    }

    if !project_pattern().is_match(&config.compose_project) {
        return Err(anyhow!(ValidationError::InvalidValue(format!(
            "compose_project '{}' must be lowercase letters, digits, '-' or '_'",
            config.compose_project
        ))));
    }

    if config.install_dir.as_os_str().is_empty() {
        return Err(anyhow!(ValidationError::MissingField("install_dir".to_string())));
    }

    PortAllocator::new(config.allocator)
        .map_err(|e| anyhow!(ValidationError::InvalidValue(format!("allocator: {}", e))))?;

    debug!("Configuration structure validation passed");
    Ok(())
}
