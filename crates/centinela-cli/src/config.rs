//! Bridge configuration – reads `~/.centinela/config.toml`.
//!
//! Precedence, lowest to highest: built-in defaults, the TOML file, then
//! environment variables.

use std::fs;
use std::path::{Path, PathBuf};

use centinela_server::DEFAULT_PORT;
use centinela_types::{CentinelaError, SecurityMode};
use serde::{Deserialize, Serialize};

/// Effective configuration of the `centinela` binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// TCP port shared by the polling API and the WebSocket gateway.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Arming mode at process start.
    #[serde(default)]
    pub initial_security_mode: SecurityMode,

    /// Broadcast buffer of the in-process bus.
    #[serde(default = "default_bus_capacity")]
    pub bus_capacity: usize,

    /// Publish the retained security/alarm status once at startup.
    #[serde(default = "default_announce")]
    pub announce_on_start: bool,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bus_capacity() -> usize {
    256
}
fn default_announce() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            initial_security_mode: SecurityMode::default(),
            bus_capacity: default_bus_capacity(),
            announce_on_start: default_announce(),
        }
    }
}

/// `$CENTINELA_CONFIG`, or `~/.centinela/config.toml`.
pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var("CENTINELA_CONFIG")
        && !path.trim().is_empty()
    {
        return PathBuf::from(path);
    }
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".centinela").join("config.toml")
}

/// Load the config from [`config_path`] and apply environment overrides.
pub fn load() -> Result<Config, CentinelaError> {
    let mut cfg = load_from(&config_path())?;
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

/// Load the config from `path`. A missing file yields the defaults; a
/// zero `bus_capacity` is rejected.
pub(crate) fn load_from(path: &Path) -> Result<Config, CentinelaError> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| CentinelaError::Io(format!("failed to read config at {}: {e}", path.display())))?;
    let cfg: Config = toml::from_str(&raw)
        .map_err(|e| CentinelaError::Config(format!("failed to parse {}: {e}", path.display())))?;
    if cfg.bus_capacity == 0 {
        return Err(CentinelaError::Config(format!(
            "{}: bus_capacity must be at least 1",
            path.display()
        )));
    }
    Ok(cfg)
}

/// Apply environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `PORT` | `port` |
/// | `CENTINELA_PORT` | `port` (wins over `PORT`) |
/// | `CENTINELA_INITIAL_MODE` | `initial_security_mode` |
/// | `CENTINELA_BUS_CAPACITY` | `bus_capacity` |
///
/// Values that do not parse are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    apply_overrides_from(cfg, |key| std::env::var(key).ok());
}

fn apply_overrides_from(cfg: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    for key in ["PORT", "CENTINELA_PORT"] {
        if let Some(port) = lookup(key).and_then(|v| v.trim().parse::<u16>().ok()) {
            cfg.port = port;
        }
    }
    if let Some(mode) = lookup("CENTINELA_INITIAL_MODE").and_then(|v| v.parse::<SecurityMode>().ok()) {
        cfg.initial_security_mode = mode;
    }
    if let Some(capacity) = lookup("CENTINELA_BUS_CAPACITY")
        .and_then(|v| v.trim().parse::<usize>().ok())
        .filter(|&c| c > 0)
    {
        cfg.bus_capacity = capacity;
    }
}

/// Render `cfg` as TOML, as printed by `--print-config`.
pub fn to_toml(cfg: &Config) -> Result<String, CentinelaError> {
    toml::to_string_pretty(cfg).map_err(|e| CentinelaError::Config(format!("failed to serialize config: {e}")))
}
