//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.relay/config.json`) and environment.
//! Two sections: the gateway (bind, port, auth) and the hosted agent service
//! (project endpoint, agent id, credentials, polling).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Gateway server settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Hosted agent service settings.
    #[serde(default)]
    pub agent: AgentServiceConfig,
}

/// Gateway bind, port, and auth settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Port for HTTP and WebSocket (default 15152).
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bind address (default "127.0.0.1").
    #[serde(default = "default_gateway_bind")]
    pub bind: String,

    /// Auth settings. When absent, defaults to no auth for loopback bind.
    #[serde(default)]
    pub auth: GatewayAuthConfig,
}

/// Gateway auth: token or none (loopback-only when none).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayAuthConfig {
    /// "none" = no shared secret (only safe when bind is loopback). "token" = require connect.auth.token.
    #[serde(default)]
    pub mode: GatewayAuthMode,

    /// Shared secret for WebSocket connect. Overridden by RELAY_GATEWAY_TOKEN env.
    pub token: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayAuthMode {
    /// No auth; allow only when bind is loopback.
    #[default]
    None,

    /// Require connect.auth.token to match configured token.
    Token,
}

fn default_gateway_port() -> u16 {
    15152
}

fn default_gateway_bind() -> String {
    "127.0.0.1".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            bind: default_gateway_bind(),
            auth: GatewayAuthConfig::default(),
        }
    }
}

/// Hosted agent service: project endpoint, agent to run, bearer credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentServiceConfig {
    /// Project endpoint, e.g. `https://<resource>.services.ai.azure.com/api/projects/<project>`.
    /// Overridden by RELAY_AGENT_ENDPOINT env.
    pub endpoint: Option<String>,

    /// Agent (assistant) id to run against each thread. Overridden by RELAY_AGENT_ID env.
    pub agent_id: Option<String>,

    /// Value sent as the `api-version` query parameter (default "v1").
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Bearer token for the service. Overridden by RELAY_AGENT_TOKEN env.
    pub token: Option<String>,

    /// Delay between run status polls in milliseconds (default 1000).
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Author name shown on assistant replies.
    #[serde(default = "default_display_name")]
    pub display_name: String,
}

fn default_api_version() -> String {
    "v1".to_string()
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_display_name() -> String {
    "Azure AI Assistant".to_string()
}

impl Default for AgentServiceConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            agent_id: None,
            api_version: default_api_version(),
            token: None,
            poll_interval_ms: default_poll_interval_ms(),
            display_name: default_display_name(),
        }
    }
}

/// Non-empty trimmed value of an environment variable.
fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|s| {
        let t = s.trim();
        if t.is_empty() {
            None
        } else {
            Some(t.to_string())
        }
    })
}

/// Non-empty trimmed value of an optional config string.
fn config_non_empty(value: Option<&String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Resolve the gateway token: env RELAY_GATEWAY_TOKEN overrides config.
pub fn resolve_gateway_token(config: &Config) -> Option<String> {
    env_non_empty("RELAY_GATEWAY_TOKEN").or_else(|| config_non_empty(config.gateway.auth.token.as_ref()))
}

/// Resolve the agent service endpoint (trailing slash removed): env RELAY_AGENT_ENDPOINT overrides config.
pub fn resolve_agent_endpoint(config: &Config) -> Option<String> {
    env_non_empty("RELAY_AGENT_ENDPOINT")
        .or_else(|| config_non_empty(config.agent.endpoint.as_ref()))
        .map(|u| u.trim_end_matches('/').to_string())
}

/// Resolve the agent id: env RELAY_AGENT_ID overrides config.
pub fn resolve_agent_id(config: &Config) -> Option<String> {
    env_non_empty("RELAY_AGENT_ID").or_else(|| config_non_empty(config.agent.agent_id.as_ref()))
}

/// Resolve the agent service bearer token: env RELAY_AGENT_TOKEN overrides config.
pub fn resolve_agent_token(config: &Config) -> Option<String> {
    env_non_empty("RELAY_AGENT_TOKEN").or_else(|| config_non_empty(config.agent.token.as_ref()))
}

/// True if the bind address is loopback (127.0.0.1, ::1, etc.).
pub fn is_loopback_bind(bind: &str) -> bool {
    let b = bind.trim();
    b == "127.0.0.1" || b == "::1" || b == "localhost"
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("RELAY_CONFIG_PATH").map(PathBuf::from).unwrap_or_else(|_| {
        dirs::home_dir()
            .map(|h| h.join(".relay").join("config.json"))
            .unwrap_or_else(|| PathBuf::from("config.json"))
    })
}

/// Load config from the given path, the default path, or RELAY_CONFIG_PATH. Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}
