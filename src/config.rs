// src/config.rs
//
// TOML configuration with `CADENCE_`-prefixed environment overrides
// (spec §6). Parsed into a typed `Config`, then an untyped `toml::Value`
// overlay lets env vars override arbitrary dotted keys without every
// section needing its own override wiring.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::CadenceError;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub thresholds: HashMap<String, f64>,
    #[serde(default)]
    pub exclude_files: Vec<String>,
    #[serde(default)]
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub ai: AiConfig,
    #[serde(default)]
    pub strategies: HashMap<String, bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub secret: String,
    pub max_workers: usize,
    pub read_timeout: u64,
    pub write_timeout: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: "0.0.0.0".to_string(),
            port: 8000,
            secret: String::new(),
            max_workers: 4,
            read_timeout: 30,
            write_timeout: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AiConfig {
    pub enabled: bool,
    pub provider: String,
    pub api_key: String,
    pub model: String,
}

impl Config {
    pub fn load(path: Option<&Path>) -> Result<Self, CadenceError> {
        let mut config = match path {
            Some(p) => {
                let raw = std::fs::read_to_string(p)
                    .map_err(|e| CadenceError::io(format!("reading config {}: {e}", p.display())))?;
                toml::from_str(&raw).map_err(|e| CadenceError::validation(format!("invalid config TOML: {e}")))?
            }
            None => Config::default(),
        };
        apply_env_overrides(&mut config)?;
        Ok(config)
    }

    /// Disabled set consulted by detectors: names with an explicit `false`.
    pub fn disabled_strategies(&self) -> std::collections::HashSet<String> {
        self.strategies
            .iter()
            .filter(|(_, enabled)| !**enabled)
            .map(|(name, _)| name.clone())
            .collect()
    }
}

/// Maps `CADENCE_`-prefixed env vars to dotted config keys, e.g.
/// `CADENCE_AI_KEY` ⇒ `ai.api_key`, `CADENCE_WEBHOOK_PORT` ⇒ `webhook.port`.
fn apply_env_overrides(config: &mut Config) -> Result<(), CadenceError> {
    for (key, value) in std::env::vars() {
        let Some(suffix) = key.strip_prefix("CADENCE_") else {
            continue;
        };
        let dotted = suffix.to_lowercase();
        match dotted.as_str() {
            "webhook_enabled" => config.webhook.enabled = parse_bool(&value),
            "webhook_host" => config.webhook.host = value,
            "webhook_port" => {
                config.webhook.port = value
                    .parse()
                    .map_err(|_| CadenceError::validation(format!("CADENCE_WEBHOOK_PORT invalid: {value}")))?
            }
            "webhook_secret" => config.webhook.secret = value,
            "webhook_max_workers" => {
                config.webhook.max_workers = value
                    .parse()
                    .map_err(|_| CadenceError::validation(format!("CADENCE_WEBHOOK_MAX_WORKERS invalid: {value}")))?
            }
            "ai_enabled" => config.ai.enabled = parse_bool(&value),
            "ai_provider" => config.ai.provider = value,
            "ai_key" | "ai_api_key" => config.ai.api_key = value,
            "ai_model" => config.ai.model = value,
            _ => {} // unrecognized dotted key; silently ignored, matches permissive config surface
        }
    }
    Ok(())
}

fn parse_bool(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_strategies_includes_only_explicit_false() {
        let mut config = Config::default();
        config.strategies.insert("suspicious_additions".to_string(), false);
        config.strategies.insert("bulk_rewrite".to_string(), true);
        let disabled = config.disabled_strategies();
        assert!(disabled.contains("suspicious_additions"));
        assert!(!disabled.contains("bulk_rewrite"));
    }

    #[test]
    fn parses_toml_document() {
        let toml_src = r#"
            exclude_files = ["*.lock"]

            [webhook]
            enabled = true
            host = "0.0.0.0"
            port = 9000
            secret = "s3cr3t"
            max_workers = 2
            read_timeout = 10
            write_timeout = 10

            [strategies]
            generic_commit_message = false
        "#;
        let config: Config = toml::from_str(toml_src).unwrap();
        assert_eq!(config.webhook.port, 9000);
        assert_eq!(config.exclude_files, vec!["*.lock".to_string()]);
        assert!(!config.strategies["generic_commit_message"]);
    }
}
