//! Server configuration, loaded the way `tron-settings::loader` does:
//! compiled defaults, deep-merged with an optional JSON file, then
//! overridden by a handful of `GASOLINE_*` environment variables.

use std::path::{Path, PathBuf};

use gasoline_capture::store::Capacities;
use gasoline_commands::queue::CommandQueueConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Configuration for the gasoline daemon's HTTP server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`; the daemon is extension-local,
    /// never meant to listen on a public interface).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Shared-secret expected in the `X-Gasoline-Extension-Token` header on
    /// `/sync` and `/clear`. `None` disables the check (local development).
    #[serde(default)]
    pub extension_token: Option<String>,
    /// Max request body size in bytes.
    pub max_body_bytes: usize,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            extension_token: None,
            max_body_bytes: 8 * 1024 * 1024, // 8 MB; network_bodies payloads can be large
            request_timeout_secs: 30,
        }
    }
}

/// The daemon's full configuration: the HTTP-server section plus the two
/// library-level config structs the ring buffers and command queue take.
///
/// Each section is independently deep-mergeable, so a settings file only
/// needs to name the keys it wants to override.
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct GasolineConfig {
    /// `POST /sync`, `POST /clear`, auth, body-size, timeout settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Per-stream ring capacities.
    #[serde(default)]
    pub capture: Capacities,
    /// Backlog cap, claim limit, default command deadlines.
    #[serde(default)]
    pub commands: CommandQueueConfig,
}

/// Resolve the path to the daemon's settings file (`~/.gasoline/settings.json`).
#[must_use]
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".gasoline").join("settings.json")
}

/// Load config from the default path with env var overrides.
#[must_use]
pub fn load() -> GasolineConfig {
    load_from_path(&settings_path())
}

/// Load config from a specific path with env var overrides.
///
/// A missing file falls back silently to compiled defaults; invalid JSON
/// also falls back silently (logged at `warn`) rather than aborting
/// startup over a malformed settings file.
#[must_use]
pub fn load_from_path(path: &Path) -> GasolineConfig {
    let defaults = serde_json::to_value(GasolineConfig::default())
        .expect("GasolineConfig::default() always serializes");

    let merged = if path.exists() {
        match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str::<Value>(&content) {
                Ok(user) => {
                    debug!(?path, "loaded daemon config from file");
                    deep_merge(defaults, user)
                }
                Err(err) => {
                    tracing::warn!(?path, error = %err, "invalid config JSON, using defaults");
                    defaults
                }
            },
            Err(err) => {
                tracing::warn!(?path, error = %err, "failed to read config file, using defaults");
                defaults
            }
        }
    } else {
        debug!(?path, "no config file found, using defaults");
        defaults
    };

    let mut config: GasolineConfig = serde_json::from_value(merged).unwrap_or_default();
    apply_env_overrides(&mut config);
    config
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key).
/// - Arrays and primitives are replaced entirely by source.
/// - Null values in source are skipped (preserving target).
#[must_use]
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `GASOLINE_*` environment variable overrides — the handful of
/// values an operator would plausibly tune without hand-editing the
/// settings file.
fn apply_env_overrides(config: &mut GasolineConfig) {
    if let Some(v) = read_env_string("GASOLINE_HOST") {
        config.server.host = v;
    }
    if let Some(v) = read_env_u16("GASOLINE_PORT", 0, 65535) {
        config.server.port = v;
    }
    if let Some(v) = read_env_string("GASOLINE_EXTENSION_TOKEN") {
        config.server.extension_token = Some(v);
    }
    if let Some(v) = read_env_usize("GASOLINE_RING_CAPACITY", 1, 1_000_000) {
        config.capture.logs = v;
        config.capture.actions = v;
        config.capture.websocket_events = v;
        config.capture.network_waterfall = v;
        config.capture.extension_logs = v;
    }
    if let Some(v) = read_env_usize("GASOLINE_NETWORK_BODIES_CAPACITY", 1, 1_000_000) {
        config.capture.network_bodies = v;
    }
    if let Some(v) = read_env_usize("GASOLINE_PERFORMANCE_SNAPSHOTS_CAPACITY", 1, 1_000_000) {
        config.capture.performance_snapshots = v;
    }
    if let Some(v) = read_env_usize("GASOLINE_COMMAND_BACKLOG_CAP", 1, 10_000) {
        config.commands.backlog_cap = v;
    }
    if let Some(v) = read_env_usize("GASOLINE_COMMAND_CLAIM_LIMIT", 1, 10_000) {
        config.commands.claim_limit = v;
    }
    if let Some(v) = read_env_u64("GASOLINE_DEFAULT_DEADLINE_MS", 1, 3_600_000) {
        config.commands.default_deadline_ms = v;
    }
}

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_u16(name: &str, min: u16, max: u16) -> Option<u16> {
    let val = std::env::var(name).ok()?;
    let parsed: u16 = val.parse().ok()?;
    if parsed < min || parsed > max {
        tracing::warn!(key = name, value = %val, "env var out of range, ignoring");
        return None;
    }
    Some(parsed)
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    let val = std::env::var(name).ok()?;
    let parsed: u64 = val.parse().ok()?;
    if parsed < min || parsed > max {
        tracing::warn!(key = name, value = %val, "env var out of range, ignoring");
        return None;
    }
    Some(parsed)
}

fn read_env_usize(name: &str, min: usize, max: usize) -> Option<usize> {
    let val = std::env::var(name).ok()?;
    let parsed: usize = val.parse().ok()?;
    if parsed < min || parsed > max {
        tracing::warn!(key = name, value = %val, "env var out of range, ignoring");
        return None;
    }
    Some(parsed)
}
