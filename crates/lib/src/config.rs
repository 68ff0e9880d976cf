//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.agent-bridge/config.json`) and environment.
//! Upstream credentials are resolved once at startup into [`UpstreamSettings`] and passed
//! by value into the bridge; nothing below the gateway reads the environment.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default upstream domain; hosts are `https://api-<label>.<domain>`.
pub const DEFAULT_UPSTREAM_DOMAIN: &str = "stack.tryrelevance.com";

pub const ENV_REGION: &str = "RELEVANCE_REGION";
pub const ENV_CLUSTER: &str = "RELEVANCE_CLUSTER";
pub const ENV_PROJECT_ID: &str = "RELEVANCE_PROJECT_ID";
pub const ENV_API_KEY: &str = "RELEVANCE_API_KEY";
pub const ENV_AGENT_ID: &str = "RELEVANCE_AGENT_ID";

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Gateway server settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Upstream agent service: hosts and credentials.
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Poll loop bounds.
    #[serde(default)]
    pub poll: PollConfig,

    /// What to do when the trigger answers 409 (already running).
    #[serde(default)]
    pub conflict_policy: ConflictPolicy,
}

/// Gateway bind, port and chat path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Port for HTTP (default 8787).
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bind address (default "127.0.0.1").
    #[serde(default = "default_gateway_bind")]
    pub bind: String,

    /// Path of the chat endpoint (default "/api/chat").
    #[serde(default = "default_gateway_path")]
    pub path: String,
}

fn default_gateway_port() -> u16 {
    8787
}

fn default_gateway_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_gateway_path() -> String {
    "/api/chat".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            bind: default_gateway_bind(),
            path: default_gateway_path(),
        }
    }
}

/// Upstream agent service settings. Every credential field is overridden by its env var when set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamConfig {
    /// Region label, e.g. "bcbe5a" (must match the webhook subdomain). Overridden by RELEVANCE_REGION.
    pub region: Option<String>,
    /// Optional cluster label; yields an extra host when it differs from the region. Overridden by RELEVANCE_CLUSTER.
    pub cluster: Option<String>,
    /// Project (tenant) id; NOT the region. Overridden by RELEVANCE_PROJECT_ID.
    pub project_id: Option<String>,
    /// API key. Overridden by RELEVANCE_API_KEY.
    pub api_key: Option<String>,
    /// Agent id (UUID). Overridden by RELEVANCE_AGENT_ID.
    pub agent_id: Option<String>,
    /// Upstream domain (default "stack.tryrelevance.com").
    #[serde(default = "default_upstream_domain")]
    pub domain: String,
    /// Explicit hosts (protocol + domain). When non-empty they replace the `api-<label>` scheme.
    #[serde(default)]
    pub hosts: Vec<String>,
    /// Per-request timeout for upstream calls in milliseconds (default 15000).
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_upstream_domain() -> String {
    DEFAULT_UPSTREAM_DOMAIN.to_string()
}

fn default_request_timeout_ms() -> u64 {
    15_000
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            region: None,
            cluster: None,
            project_id: None,
            api_key: None,
            agent_id: None,
            domain: default_upstream_domain(),
            hosts: Vec::new(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

/// Poll deadline flavour: wall clock (bounded long-poll) or sweep count (bounded short-poll).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PollMode {
    #[default]
    LongPoll,
    ShortPoll,
}

/// Poll loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollConfig {
    #[serde(default)]
    pub mode: PollMode,
    /// Hard deadline for a whole call, counted from its arrival, in milliseconds (default 20000).
    /// longPoll polls until it; shortPoll also stops after `maxAttempts` sweeps.
    #[serde(default = "default_poll_deadline_ms")]
    pub deadline_ms: u64,
    /// Sweep budget for shortPoll (default 3). 0 means return pending right after the trigger.
    #[serde(default = "default_poll_max_attempts")]
    pub max_attempts: u32,
    /// Fixed pause between sweeps in milliseconds (default 1500).
    #[serde(default = "default_poll_interval_ms")]
    pub interval_ms: u64,
    /// Sweeps performed by a status-only call (default 1).
    #[serde(default = "default_status_only_attempts")]
    pub status_only_attempts: u32,
}

fn default_poll_deadline_ms() -> u64 {
    20_000
}

fn default_poll_max_attempts() -> u32 {
    3
}

fn default_poll_interval_ms() -> u64 {
    1_500
}

fn default_status_only_attempts() -> u32 {
    1
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            mode: PollMode::default(),
            deadline_ms: default_poll_deadline_ms(),
            max_attempts: default_poll_max_attempts(),
            interval_ms: default_poll_interval_ms(),
            status_only_attempts: default_status_only_attempts(),
        }
    }
}

impl PollConfig {
    /// Fixed backoff between sweeps.
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Handling of a 409 "already running" trigger answer that carries no inline reply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum ConflictPolicy {
    /// Enter the poll loop right away.
    #[default]
    ImmediatePoll,
    /// Sleep `pauseMs`, then poll.
    #[serde(rename_all = "camelCase")]
    DelayedPoll { pause_ms: u64 },
    /// Answer pending without polling; the caller re-invokes in status-only mode.
    Pending,
}

/// Upstream values after applying env overrides. Built once at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpstreamSettings {
    pub region: Option<String>,
    pub cluster: Option<String>,
    pub project_id: Option<String>,
    pub api_key: Option<String>,
    pub agent_id: Option<String>,
    pub domain: String,
    pub hosts: Vec<String>,
    pub request_timeout: Duration,
}

/// Trimmed non-empty env var, if set.
fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|s| {
        let t = s.trim();
        if t.is_empty() {
            None
        } else {
            Some(t.to_string())
        }
    })
}

fn config_value(value: &Option<String>) -> Option<String> {
    value
        .as_ref()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Resolve upstream settings: each env var overrides its config field.
pub fn resolve_upstream(config: &Config) -> UpstreamSettings {
    resolve_upstream_with(config, env_value)
}

/// Same as [`resolve_upstream`] with an injectable lookup (tests).
pub fn resolve_upstream_with<F>(config: &Config, lookup: F) -> UpstreamSettings
where
    F: Fn(&str) -> Option<String>,
{
    let up = &config.upstream;
    let hosts = up
        .hosts
        .iter()
        .map(|h| h.trim().trim_end_matches('/').to_string())
        .filter(|h| !h.is_empty())
        .collect();
    UpstreamSettings {
        region: lookup(ENV_REGION).or_else(|| config_value(&up.region)),
        cluster: lookup(ENV_CLUSTER).or_else(|| config_value(&up.cluster)),
        project_id: lookup(ENV_PROJECT_ID).or_else(|| config_value(&up.project_id)),
        api_key: lookup(ENV_API_KEY).or_else(|| config_value(&up.api_key)),
        agent_id: lookup(ENV_AGENT_ID).or_else(|| config_value(&up.agent_id)),
        domain: {
            let d = up.domain.trim().trim_matches('.');
            if d.is_empty() {
                DEFAULT_UPSTREAM_DOMAIN.to_string()
            } else {
                d.to_string()
            }
        },
        hosts,
        request_timeout: Duration::from_millis(up.request_timeout_ms),
    }
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("BRIDGE_CONFIG_PATH").map(PathBuf::from).unwrap_or_else(|_| {
        dirs::home_dir()
            .map(|h| h.join(".agent-bridge").join("config.json"))
            .unwrap_or_else(|| PathBuf::from("config.json"))
    })
}

/// Load config from the given path (or the default path). Missing file => default config.
/// BRIDGE_GATEWAY_PORT overrides the gateway port.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let mut config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    if let Some(port) = env_value("BRIDGE_GATEWAY_PORT") {
        config.gateway.port = port
            .parse()
            .with_context(|| format!("parsing BRIDGE_GATEWAY_PORT={}", port))?;
    }
    Ok((config, path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_gateway_port_bind_and_path() {
        let g = GatewayConfig::default();
        assert_eq!(g.port, 8787);
        assert_eq!(g.bind, "127.0.0.1");
        assert_eq!(g.path, "/api/chat");
    }

    #[test]
    fn parses_camel_case_sections() {
        let config: Config = serde_json::from_str(
            r#"{
                "upstream": { "region": "bcbe5a", "projectId": "p1", "apiKey": "k", "agentId": "a" },
                "poll": { "mode": "shortPoll", "maxAttempts": 0 },
                "conflictPolicy": { "kind": "delayedPoll", "pauseMs": 250 }
            }"#,
        )
        .expect("parse config");
        assert_eq!(config.upstream.project_id.as_deref(), Some("p1"));
        assert_eq!(config.upstream.domain, DEFAULT_UPSTREAM_DOMAIN);
        assert_eq!(config.poll.mode, PollMode::ShortPoll);
        assert_eq!(config.poll.max_attempts, 0);
        assert_eq!(config.poll.interval_ms, 1_500);
        assert_eq!(
            config.conflict_policy,
            ConflictPolicy::DelayedPoll { pause_ms: 250 }
        );
    }

    #[test]
    fn env_overrides_config_values() {
        let mut config = Config::default();
        config.upstream.region = Some("from-file".to_string());
        config.upstream.api_key = Some("  file-key  ".to_string());
        let env: HashMap<&str, &str> = [(ENV_REGION, "from-env")].into_iter().collect();
        let settings = resolve_upstream_with(&config, |k| env.get(k).map(|v| v.to_string()));
        assert_eq!(settings.region.as_deref(), Some("from-env"));
        assert_eq!(settings.api_key.as_deref(), Some("file-key"));
        assert_eq!(settings.agent_id, None);
    }

    #[test]
    fn blank_values_are_unset_and_hosts_are_normalized() {
        let mut config = Config::default();
        config.upstream.project_id = Some("   ".to_string());
        config.upstream.hosts = vec!["http://127.0.0.1:9000/".to_string(), " ".to_string()];
        let settings = resolve_upstream_with(&config, |_| None);
        assert_eq!(settings.project_id, None);
        assert_eq!(settings.hosts, vec!["http://127.0.0.1:9000".to_string()]);
    }
}
