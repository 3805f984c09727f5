//! Semantic validation for parsed deployment and service configuration.

use anyhow::{bail, Result};

use crate::config::types::{DeploymentConfig, Parallelism, ServiceDefinition};
use crate::credentials::CredentialRule;

/// Flag rules that can never match because an earlier account-wide
/// fallback for the same account always wins.
fn validate_rule_order(rules: &[CredentialRule], errors: &mut Vec<String>) {
    for (i, rule) in rules.iter().enumerate() {
        if rule.account.trim().is_empty() {
            errors.push(format!("credentials.rules[{i}]: account must not be empty"));
        }
        if rule.credential.as_str().trim().is_empty() {
            errors.push(format!("credentials.rules[{i}]: credential must not be empty"));
        }
        let shadowed_by = rules[..i]
            .iter()
            .position(|earlier| earlier.is_fallback() && earlier.same_account(rule));
        if let Some(j) = shadowed_by {
            errors.push(format!(
                "credentials.rules[{i}] for account '{}' is unreachable: rules[{j}] already matches every server",
                rule.account
            ));
        }
    }
}

/// Validate a parsed deployment configuration.
///
/// # Errors
///
/// Returns an error listing all validation failures found in the config.
pub fn validate_deployment(config: &DeploymentConfig) -> Result<()> {
    let mut errors = Vec::new();

    if config.version != "1.0" {
        errors.push(format!(
            "Unsupported deployment version '{}', expected '1.0'",
            config.version
        ));
    }

    if matches!(config.resources.parallelism, Parallelism::Manual(0)) {
        errors.push("parallelism must be at least 1".to_string());
    }

    if config.resources.retry.max_attempts == 0 {
        errors.push("retry.max_attempts must be at least 1".to_string());
    }

    if config.credentials.directory.as_os_str().is_empty() {
        errors.push("credentials.directory must not be empty".to_string());
    }

    if config.credentials.rules.is_empty() {
        errors.push("credentials.rules must contain at least one rule".to_string());
    }
    validate_rule_order(&config.credentials.rules, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        bail!("Deployment validation failed:\n  - {}", errors.join("\n  - "));
    }
}

/// Validate a parsed service definition.
///
/// # Errors
///
/// Returns an error listing all validation failures found in the definition.
pub fn validate_service(definition: &ServiceDefinition) -> Result<()> {
    let mut errors = Vec::new();

    if definition.service_name.trim().is_empty() {
        errors.push("service_name must not be empty".to_string());
    }
    if definition
        .service_name
        .chars()
        .any(|c| c == '/' || c == '\\')
    {
        errors.push(format!(
            "service_name '{}' must not contain path separators",
            definition.service_name
        ));
    }
    if definition.project.as_os_str().is_empty() {
        errors.push("project must not be empty".to_string());
    }
    if definition.portal_url.trim().is_empty() {
        errors.push("portal_url must not be empty".to_string());
    }
    if definition.admin_user.trim().is_empty() {
        errors.push("admin_user must not be empty".to_string());
    }
    if let Some(scale) = definition.max_cached_scale {
        if !scale.is_finite() || scale <= 0.0 {
            errors.push(format!("max_cached_scale must be positive, got {scale}"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        bail!(
            "Service definition '{}' failed validation:\n  - {}",
            definition.service_name,
            errors.join("\n  - ")
        );
    }
}
