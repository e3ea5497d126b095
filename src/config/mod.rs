use anyhow::{anyhow, Context, Result};
use log::{debug, info};
use std::fs;
use std::path::Path;

pub mod prompt;
pub mod schema;
pub mod validation;

pub use schema::{Browser, InstallConfig, NodeCounts};

use prompt::Prompter;
use validation::ValidationError;

/// Load and validate a configuration file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<InstallConfig> {
    let config = read_config(path.as_ref())?;

    validation::validate_config_structure(&config)
        .with_context(|| format!("Invalid configuration in file: {}", path.as_ref().display()))?;

    debug!("Successfully loaded config: {:#?}", config);
    Ok(config)
}

/// Parse a configuration file without validating it. Missing fields take
/// their defaults.
pub fn read_config(path: &Path) -> Result<InstallConfig> {
    info!("Loading configuration from {}", path.display());

    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse JSON in config file: {}", path.display()))
}

/// Build the config for a run: file (or defaults), then prompts for whatever
/// is still missing, then validation.
pub fn resolve_config(
    path: Option<&Path>,
    interactive: bool,
    prompter: &mut dyn Prompter,
) -> Result<InstallConfig> {
    let mut config = match path {
        Some(path) => read_config(path)?,
        None => InstallConfig::default(),
    };

    if interactive {
        fill_missing(&mut config, prompter, path.is_none())?;
    } else if config.domain.is_empty() {
        return Err(anyhow!(ValidationError::MissingField(
            "domain (pass --config or run interactively)".to_string()
        )));
    }

    validation::validate_config_structure(&config).context("Invalid installation settings")?;
    Ok(config)
}

/// Ask for required values that are unset. Without a config file the node
/// layout is asked for as well.
fn fill_missing(config: &mut InstallConfig, prompter: &mut dyn Prompter, ask_layout: bool) -> Result<()> {
    if config.domain.is_empty() {
        config.domain = prompter.ask_validated(
            "Domain name for the grid",
            None,
            &|value| validation::is_valid_domain(value),
        )?;
    }

    if config.tls.enabled && config.email.is_empty() {
        config.email = prompter.ask_validated(
            "Email for certificate registration",
            None,
            &|value| validation::is_valid_email(value),
        )?;
    }

    if ask_layout {
        config.nodes.chrome = prompter.ask_number("Chrome nodes", config.nodes.chrome)?;
        config.nodes.firefox = prompter.ask_number("Firefox nodes", config.nodes.firefox)?;
        config.nodes.edge = prompter.ask_number("Edge nodes", config.nodes.edge)?;
        config.max_sessions = prompter.ask_number("Sessions per node", config.max_sessions)?;
        config.hub_port = prompter.ask_number("Hub port", config.hub_port)?;
        config.vnc_base_port = prompter.ask_number("First noVNC port", config.vnc_base_port)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use prompt::ScriptedPrompter;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(json: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let file = write_config(r#"{"domain": "grid.example.com", "email": "ops@example.com"}"#);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.hub_port, 4444);
        assert_eq!(config.vnc_base_port, 7900);
        assert_eq!(config.nodes, NodeCounts::default());
        assert_eq!(config.compose_project, "selenium-grid");
    }

    #[test]
    fn test_nested_fields() {
        let file = write_config(
            r#"{
                "domain": "grid.example.com",
                "tls": {"enabled": false},
                "nodes": {"chrome": 3},
                "allocator": {"stride": 20}
            }"#,
        );
        let config = load_config(file.path()).unwrap();

        assert!(!config.tls.enabled);
        assert_eq!(config.nodes.chrome, 3);
        assert_eq!(config.nodes.firefox, 1);
        assert_eq!(config.allocator.stride, 20);
        assert_eq!(config.allocator.max_base_attempts, 100);
    }

    #[test]
    fn test_invalid_json() {
        let file = write_config("{ domain: ");
        let err = load_config(file.path()).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to parse JSON"));
    }

    #[test]
    fn test_non_interactive_requires_domain() {
        let mut prompter = ScriptedPrompter::new(Vec::<&str>::new());
        assert!(resolve_config(None, false, &mut prompter).is_err());
    }

    #[test]
    fn test_prompts_fill_missing_values() {
        let mut prompter = ScriptedPrompter::new([
            "not a domain",
            "grid.example.com",
            "ops@example.com",
            "2",
            "",
            "1",
            "4",
            "",
            "",
        ]);
        let config = resolve_config(None, true, &mut prompter).unwrap();

        assert_eq!(config.domain, "grid.example.com");
        assert_eq!(config.email, "ops@example.com");
        assert_eq!(config.nodes.chrome, 2);
        assert_eq!(config.nodes.firefox, 1);
        assert_eq!(config.nodes.edge, 1);
        assert_eq!(config.max_sessions, 4);
        assert_eq!(config.hub_port, 4444);
    }

    #[test]
    fn test_file_values_are_not_prompted() {
        let file = write_config(r#"{"domain": "grid.example.com", "email": "ops@example.com"}"#);
        let mut prompter = ScriptedPrompter::new(Vec::<&str>::new());
        let config = resolve_config(Some(file.path()), true, &mut prompter).unwrap();

        assert_eq!(config.domain, "grid.example.com");
    }
}
