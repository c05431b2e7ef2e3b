//! Placeholder resolver for application settings values
//!
//! Handles `${KEY}` and `${KEY:-default}` in application settings, resolved
//! against the installation defaults map first and the process environment
//! second.

use crate::{ApplicationOption, ConfigError, InstallationSettings, Result};
use regex::Regex;
use std::collections::HashMap;

/// Context for resolving placeholders
#[derive(Debug, Clone)]
pub struct ResolutionContext {
    /// Values looked up before the process environment
    pub values: HashMap<String, String>,
}

impl ResolutionContext {
    /// Create a context seeded from the installation defaults
    pub fn from_settings(settings: &InstallationSettings) -> Self {
        Self {
            values: settings.defaults.clone(),
        }
    }

    /// Add or override a value
    pub fn set(&mut self, key: String, value: String) {
        self.values.insert(key, value);
    }
}

/// Resolve all placeholders in a single string
pub fn resolve_string(input: &str, context: &ResolutionContext) -> Result<String> {
    let re = Regex::new(r"\$\{([^}]+)\}").unwrap();
    let mut result = input.to_string();
    let mut errors = Vec::new();

    for cap in re.captures_iter(input) {
        let full_match = &cap[0];
        let expr = &cap[1];

        // Handle default values: ${KEY:-default}
        let (key, default_value) = if let Some(pos) = expr.find(":-") {
            (&expr[..pos], Some(&expr[pos + 2..]))
        } else {
            (expr, None)
        };

        if let Some(value) = context.values.get(key) {
            result = result.replace(full_match, value);
        } else if let Ok(value) = std::env::var(key) {
            result = result.replace(full_match, &value);
        } else if let Some(default) = default_value {
            result = result.replace(full_match, default);
        } else {
            errors.push(key.to_string());
        }
    }

    if !errors.is_empty() {
        return Err(ConfigError::PlaceholderNotFound(errors.join(", ")));
    }

    Ok(result)
}

/// Resolve placeholders in every application settings value.
///
/// Unresolved names across all applications collect into a single error so
/// the operator sees the full list at once.
pub fn resolve_placeholders(
    settings: &InstallationSettings,
    context: &ResolutionContext,
) -> Result<InstallationSettings> {
    let mut resolved = settings.clone();
    let mut missing = Vec::new();

    for app in &mut resolved.applications {
        if let Err(ConfigError::PlaceholderNotFound(names)) = resolve_app(app, context) {
            missing.push(format!("{}: {}", app.name, names));
        }
    }

    if !missing.is_empty() {
        return Err(ConfigError::PlaceholderNotFound(missing.join("; ")));
    }

    Ok(resolved)
}

fn resolve_app(app: &mut ApplicationOption, context: &ResolutionContext) -> Result<()> {
    let mut missing = Vec::new();

    for value in app.settings.values_mut() {
        match resolve_string(value, context) {
            Ok(resolved) => *value = resolved,
            Err(ConfigError::PlaceholderNotFound(names)) => missing.push(names),
            Err(e) => return Err(e),
        }
    }

    if !missing.is_empty() {
        return Err(ConfigError::PlaceholderNotFound(missing.join(", ")));
    }

    Ok(())
}
