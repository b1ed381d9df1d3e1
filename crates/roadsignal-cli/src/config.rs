//! Relay configuration – reads/writes `~/.roadsignal/config.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Persisted relay configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Controller device node (e.g. `/dev/ttyUSB0`). When absent the relay
    /// runs against the built-in mock controller.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_path: Option<PathBuf>,

    /// Second device that receives a copy of every controller line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forward_path: Option<PathBuf>,

    /// Line speed for both the controller and the forwarding port.
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Interface the WebSocket server binds to.
    #[serde(default = "default_ws_host")]
    pub ws_host: String,

    #[serde(default = "default_ws_port")]
    pub ws_port: u16,

    /// Upper bound on one device read, so shutdown is noticed promptly.
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// Upper bound on one send to one subscriber.
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,

    /// Payloads a subscriber may lag behind before it is dropped.
    #[serde(default = "default_outbox_capacity")]
    pub outbox_capacity: usize,

    /// Emission period of the mock controller.
    #[serde(default = "default_mock_interval_ms")]
    pub mock_interval_ms: u64,

    /// Draw the light panel in the terminal.
    #[serde(default = "default_display")]
    pub display: bool,
}

fn default_baud_rate() -> u32 {
    roadsignal_hal::DEFAULT_BAUD_RATE
}
fn default_ws_host() -> String {
    "localhost".to_string()
}
fn default_ws_port() -> u16 {
    8765
}
fn default_read_timeout_ms() -> u64 {
    1000
}
fn default_send_timeout_ms() -> u64 {
    5000
}
fn default_outbox_capacity() -> usize {
    32
}
fn default_mock_interval_ms() -> u64 {
    5000
}
fn default_display() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device_path: None,
            forward_path: None,
            baud_rate: default_baud_rate(),
            ws_host: default_ws_host(),
            ws_port: default_ws_port(),
            read_timeout_ms: default_read_timeout_ms(),
            send_timeout_ms: default_send_timeout_ms(),
            outbox_capacity: default_outbox_capacity(),
            mock_interval_ms: default_mock_interval_ms(),
            display: default_display(),
        }
    }
}

impl Config {
    /// `host:port` for the WebSocket listener.
    pub fn ws_addr(&self) -> String {
        format!("{}:{}", self.ws_host, self.ws_port)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn mock_interval(&self) -> Duration {
        Duration::from_millis(self.mock_interval_ms)
    }
}

/// Return `$ROADSIGNAL_CONFIG`, or `~/.roadsignal/config.toml`.
pub fn config_path() -> PathBuf {
    if let Ok(p) = std::env::var("ROADSIGNAL_CONFIG") {
        return PathBuf::from(p);
    }
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".roadsignal").join("config.toml")
}

/// Load the config and apply environment overrides.
///
/// When no file exists yet the defaults are written there first; the
/// returned flag is `true` in that case.
pub fn load_or_init() -> Result<(Config, bool), String> {
    let path = config_path();
    let (mut cfg, created) = match load_from(&path)? {
        Some(cfg) => (cfg, false),
        None => {
            let cfg = Config::default();
            save_to(&cfg, &path)?;
            (cfg, true)
        }
    };
    apply_env_overrides(&mut cfg);
    Ok((cfg, created))
}

/// Load the config from a specific path. Returns `None` if it does not exist.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    Ok(Some(cfg))
}

/// Apply `ROADSIGNAL_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `ROADSIGNAL_DEVICE` | `device_path` |
/// | `ROADSIGNAL_FORWARD` | `forward_path` |
/// | `ROADSIGNAL_BAUD` | `baud_rate` |
/// | `ROADSIGNAL_WS_HOST` | `ws_host` |
/// | `ROADSIGNAL_WS_PORT` | `ws_port` |
/// | `ROADSIGNAL_DISPLAY` | `display` (`1`/`true`/`on`, `0`/`false`/`off`) |
///
/// Unparseable values are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("ROADSIGNAL_DEVICE") {
        cfg.device_path = Some(PathBuf::from(v));
    }
    if let Ok(v) = std::env::var("ROADSIGNAL_FORWARD") {
        cfg.forward_path = Some(PathBuf::from(v));
    }
    if let Ok(v) = std::env::var("ROADSIGNAL_BAUD")
        && let Ok(baud) = v.parse::<u32>()
    {
        cfg.baud_rate = baud;
    }
    if let Ok(v) = std::env::var("ROADSIGNAL_WS_HOST") {
        cfg.ws_host = v;
    }
    if let Ok(v) = std::env::var("ROADSIGNAL_WS_PORT")
        && let Ok(port) = v.parse::<u16>()
    {
        cfg.ws_port = port;
    }
    if let Ok(v) = std::env::var("ROADSIGNAL_DISPLAY")
        && let Some(on) = parse_switch(&v)
    {
        cfg.display = on;
    }
}

fn parse_switch(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}

/// Save the config to a specific path, creating its directory if necessary.
pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_bench_setup() {
        let cfg = Config::default();
        assert_eq!(cfg.ws_addr(), "localhost:8765");
        assert_eq!(cfg.read_timeout(), Duration::from_secs(1));
        assert_eq!(cfg.send_timeout(), Duration::from_secs(5));
        assert_eq!(cfg.mock_interval(), Duration::from_secs(5));
        assert_eq!(cfg.outbox_capacity, 32);
        assert_eq!(cfg.baud_rate, 9600);
        assert!(cfg.device_path.is_none());
        assert!(cfg.display);
    }

    #[test]
    fn roundtrip_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        let cfg = Config {
            device_path: Some(PathBuf::from("/dev/ttyUSB0")),
            ws_port: 9001,
            ..Config::default()
        };
        save_to(&cfg, &path).expect("save");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "ws_port = 9100\nforward_path = \"/dev/ttyUSB1\"\n").unwrap();

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.ws_port, 9100);
        assert_eq!(loaded.forward_path, Some(PathBuf::from("/dev/ttyUSB1")));
        assert_eq!(loaded.ws_host, "localhost");
        assert_eq!(loaded.send_timeout_ms, 5000);
        assert_eq!(loaded.baud_rate, 9600);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "ws_port = \"not a port\"").unwrap();

        let err = load_from(&path).unwrap_err();
        assert!(err.starts_with("Failed to parse config"));
    }

    #[test]
    fn config_path_points_to_roadsignal_dir() {
        let p = config_path_for_home("/home/testuser");
        assert_eq!(p, PathBuf::from("/home/testuser/.roadsignal/config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn apply_env_overrides_changes_device() {
        // SAFETY: no other test reads this variable.
        unsafe { std::env::set_var("ROADSIGNAL_DEVICE", "/dev/ttyACM0") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.device_path, Some(PathBuf::from("/dev/ttyACM0")));
        unsafe { std::env::remove_var("ROADSIGNAL_DEVICE") };
    }

    #[test]
    fn apply_env_overrides_changes_ws_port() {
        // SAFETY: no other test reads this variable.
        unsafe { std::env::set_var("ROADSIGNAL_WS_PORT", "9999") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.ws_port, 9999);
        unsafe { std::env::remove_var("ROADSIGNAL_WS_PORT") };
    }

    #[test]
    fn apply_env_overrides_changes_baud_rate() {
        // SAFETY: no other test reads this variable.
        unsafe { std::env::set_var("ROADSIGNAL_BAUD", "115200") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.baud_rate, 115_200);
        unsafe { std::env::remove_var("ROADSIGNAL_BAUD") };
    }

    #[test]
    fn apply_env_overrides_ignores_invalid_switch() {
        // SAFETY: no other test reads this variable.
        unsafe { std::env::set_var("ROADSIGNAL_DISPLAY", "maybe") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert!(cfg.display);
        unsafe { std::env::remove_var("ROADSIGNAL_DISPLAY") };
    }

    #[test]
    fn switch_values() {
        assert_eq!(parse_switch("OFF"), Some(false));
        assert_eq!(parse_switch(" 1 "), Some(true));
        assert_eq!(parse_switch("2"), None);
    }
}
