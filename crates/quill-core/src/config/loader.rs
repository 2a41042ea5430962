//! Config loader — reads `~/.quill/config.json` and merges env vars.
//!
//! # Loading precedence
//! 1. Defaults (from `Config::default()`)
//! 2. JSON file at `~/.quill/config.json`
//! 3. Environment variables `QUILL_<SECTION>__<FIELD>` (override JSON)

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::schema::Config;

/// Default config file path.
pub fn get_config_path() -> PathBuf {
    crate::utils::get_data_path().join("config.json")
}

/// Load configuration from the given path (or the default one) + env vars.
///
/// Falls back to `Config::default()` if the file doesn't exist or can't be parsed.
pub fn load_config(path: Option<&Path>) -> Config {
    let config_path = path.map(PathBuf::from).unwrap_or_else(get_config_path);
    load_config_from_path(&config_path)
}

fn load_config_from_path(path: &Path) -> Config {
    if !path.exists() {
        info!("No config file found at {}, using defaults", path.display());
        return apply_env_overrides(Config::default());
    }

    debug!("Loading config from {}", path.display());

    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to read config file {}: {}", path.display(), e);
            return apply_env_overrides(Config::default());
        }
    };

    let config: Config = match serde_json::from_str(&content) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to parse config JSON: {}", e);
            return apply_env_overrides(Config::default());
        }
    };

    apply_env_overrides(config)
}

/// Save configuration to disk (pretty-printed JSON with camelCase keys).
pub fn save_config(config: &Config, path: Option<&Path>) -> anyhow::Result<()> {
    let config_path = path.map(PathBuf::from).unwrap_or_else(get_config_path);

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(&config_path, json)?;
    debug!("Config saved to {}", config_path.display());
    Ok(())
}

/// Apply environment variable overrides on top of a loaded config.
///
/// Supported overrides:
/// - `QUILL_AGENT__MODEL`, `QUILL_AGENT__MODE`, `QUILL_AGENT__WORKSPACE`
/// - `QUILL_AGENT__MAX_TOKENS`, `QUILL_AGENT__TEMPERATURE`
/// - `QUILL_AGENT__MAX_CONSECUTIVE_ERRORS`, `QUILL_AGENT__MAX_TURNS`
/// - `QUILL_PROVIDER__API_KEY`, `QUILL_PROVIDER__API_BASE`
/// - `QUILL_TOOLS__AUTO_APPROVE`
fn apply_env_overrides(mut config: Config) -> Config {
    if let Ok(val) = std::env::var("QUILL_AGENT__MODEL") {
        config.agent.model = val;
    }
    if let Ok(val) = std::env::var("QUILL_AGENT__MODE") {
        config.agent.mode = val;
    }
    if let Ok(val) = std::env::var("QUILL_AGENT__WORKSPACE") {
        config.agent.workspace = val;
    }
    if let Some(n) = env_parse::<u32>("QUILL_AGENT__MAX_TOKENS") {
        config.agent.max_tokens = n;
    }
    if let Some(t) = env_parse::<f64>("QUILL_AGENT__TEMPERATURE") {
        config.agent.temperature = t;
    }
    if let Some(n) = env_parse::<u32>("QUILL_AGENT__MAX_CONSECUTIVE_ERRORS") {
        config.agent.max_consecutive_errors = n;
    }
    if let Some(n) = env_parse::<u32>("QUILL_AGENT__MAX_TURNS") {
        config.agent.max_turns = n;
    }

    if let Ok(val) = std::env::var("QUILL_PROVIDER__API_KEY") {
        config.provider.api_key = val;
    }
    if let Ok(val) = std::env::var("QUILL_PROVIDER__API_BASE") {
        config.provider.api_base = Some(val);
    }

    if let Ok(val) = std::env::var("QUILL_TOOLS__AUTO_APPROVE") {
        config.tools.auto_approve = val == "true" || val == "1";
    }

    config
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(var = key, value = %raw, "ignoring unparsable env override");
            None
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
