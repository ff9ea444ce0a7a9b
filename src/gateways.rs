//! Gateway selection and bootstrap configuration.
//!
//! Startup picks a gateway explicitly through the environment; there is no
//! implicit fallback to a live model server. The Ollama gateway is
//! configured from a JSON file so every knob is visible construction state.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use model_gateway::ModelGateway;
use model_gateway_mock::MockGateway;
use model_gateway_ollama::{OllamaGateway, OllamaGatewayConfig};
use serde::Deserialize;

pub const DEFAULT_GATEWAY_ID: &str = "mock";
pub const GATEWAY_ENV_VAR: &str = "CODELOOM_GATEWAY";
pub const OLLAMA_CONFIG_ENV_VAR: &str = "CODELOOM_OLLAMA_CONFIG_PATH";

pub fn gateway_from_env() -> Result<Arc<dyn ModelGateway>, String> {
    let gateway_id = std::env::var(GATEWAY_ENV_VAR)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty());

    gateway_for_id(gateway_id.as_deref().unwrap_or(DEFAULT_GATEWAY_ID))
}

pub fn gateway_for_id(gateway_id: &str) -> Result<Arc<dyn ModelGateway>, String> {
    match gateway_id {
        DEFAULT_GATEWAY_ID => Ok(Arc::new(MockGateway::default())),
        "ollama" => {
            let config_path = std::env::var(OLLAMA_CONFIG_ENV_VAR)
                .ok()
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty());

            let config = match config_path {
                Some(path) => load_ollama_config(Path::new(&path))?,
                None => OllamaGatewayConfig::new(String::new()),
            };

            Ok(Arc::new(
                OllamaGateway::new(config).map_err(|error| error.to_string())?,
            ))
        }
        unknown => Err(format!(
            "Unsupported gateway '{unknown}'. Available gateways: {DEFAULT_GATEWAY_ID}, ollama"
        )),
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct OllamaConfigFile {
    model: String,
    #[serde(default)]
    base_url: Option<String>,
    #[serde(default)]
    keep_alive: Option<String>,
    #[serde(default)]
    timeout_sec: Option<u64>,
    #[serde(default)]
    temperature: Option<f64>,
    #[serde(default)]
    enabled: Option<bool>,
}

/// Loads the Ollama gateway configuration from a JSON file.
///
/// Contract: `model` is required and non-empty; `timeout_sec` must be > 0
/// when provided; unknown fields are rejected.
pub fn load_ollama_config(path: &Path) -> Result<OllamaGatewayConfig, String> {
    let raw = std::fs::read_to_string(path)
        .map_err(|error| format!("Failed to read Ollama config {}: {error}", path.display()))?;
    let parsed: OllamaConfigFile = serde_json::from_str(&raw)
        .map_err(|error| format!("Failed to parse Ollama config {}: {error}", path.display()))?;

    if parsed.model.trim().is_empty() {
        return Err(format!(
            "Ollama config {} must name a non-empty 'model'",
            path.display()
        ));
    }

    let mut config = OllamaGatewayConfig::new(parsed.model);

    if let Some(base_url) = parsed.base_url {
        config = config.with_base_url(base_url);
    }

    if let Some(keep_alive) = parsed.keep_alive {
        config = config.with_keep_alive(keep_alive);
    }

    if let Some(timeout_sec) = parsed.timeout_sec {
        if timeout_sec == 0 {
            return Err(format!(
                "Ollama config {} has 'timeout_sec' of 0; expected > 0",
                path.display()
            ));
        }
        config = config.with_timeout(Duration::from_secs(timeout_sec));
    }

    if let Some(temperature) = parsed.temperature {
        config = config.with_temperature(temperature);
    }

    if let Some(enabled) = parsed.enabled {
        config = config.with_enabled(enabled);
    }

    Ok(config)
}
