//! Deployment and service YAML parsing with environment variable substitution.

use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;

use crate::config::types::{DeploymentConfig, ServiceDefinition};

static ENV_VAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid env var regex"));

/// Substitute `${VAR_NAME}` patterns with environment variable values.
///
/// # Errors
///
/// Returns an error if any referenced environment variable is not set.
pub fn substitute_env_vars(input: &str) -> Result<String> {
    let mut result = input.to_string();
    let mut errors = Vec::new();

    for cap in ENV_VAR_RE.captures_iter(input) {
        let var_name = &cap[1];
        match std::env::var(var_name) {
            Ok(val) => {
                result = result.replace(&cap[0], &val);
            }
            Err(_) => {
                if !errors.iter().any(|e| e == var_name) {
                    errors.push(var_name.to_string());
                }
            }
        }
    }

    if !errors.is_empty() {
        anyhow::bail!("Missing environment variable(s): {}", errors.join(", "));
    }

    Ok(result)
}

/// Parse a deployment YAML string (after env var substitution).
///
/// # Errors
///
/// Returns an error if env var substitution fails or the YAML is invalid.
pub fn parse_deployment_str(yaml_str: &str) -> Result<DeploymentConfig> {
    let substituted = substitute_env_vars(yaml_str)?;
    let config: DeploymentConfig =
        serde_yaml::from_str(&substituted).context("Failed to parse deployment YAML")?;
    Ok(config)
}

/// Parse a deployment YAML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the YAML is invalid.
pub fn parse_deployment(path: &Path) -> Result<DeploymentConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read deployment file: {}", path.display()))?;
    parse_deployment_str(&content)
}

/// Parse a service definition YAML string (after env var substitution).
///
/// # Errors
///
/// Returns an error if env var substitution fails or the YAML is invalid.
pub fn parse_service_str(yaml_str: &str) -> Result<ServiceDefinition> {
    let substituted = substitute_env_vars(yaml_str)?;
    let definition: ServiceDefinition =
        serde_yaml::from_str(&substituted).context("Failed to parse service definition YAML")?;
    Ok(definition)
}

/// Parse a service definition file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the YAML is invalid.
pub fn parse_service(path: &Path) -> Result<ServiceDefinition> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read service definition: {}", path.display()))?;
    parse_service_str(&content).with_context(|| format!("in {}", path.display()))
}
