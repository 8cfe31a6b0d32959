//! Runtime configuration from environment variables

use crate::proctor::ProctorTimings;
use crate::unlock::DEFAULT_UNLOCK_CODE;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_DEVICE_STATE: &str = "wren-manor-device.json";
pub const DEFAULT_STATIC_DIR: &str = "static";

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub bind_addr: SocketAddr,
    /// Device-local storage file (lock flag, session flag, cached player)
    pub device_state: PathBuf,
    pub unlock_code: String,
    pub static_dir: PathBuf,
    pub timings: ProctorTimings,
    /// Delay between unlocking and reloading the page
    pub unlock_reload: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            device_state: PathBuf::from(DEFAULT_DEVICE_STATE),
            unlock_code: DEFAULT_UNLOCK_CODE.to_string(),
            static_dir: PathBuf::from(DEFAULT_STATIC_DIR),
            timings: ProctorTimings::default(),
            unlock_reload: Duration::from_secs(1),
        }
    }
}

impl RuntimeConfig {
    /// Load config from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let bind_addr = std::env::var("WREN_BIND_ADDR")
            .ok()
            .and_then(|v| match v.parse() {
                Ok(addr) => Some(addr),
                Err(e) => {
                    tracing::warn!("Invalid WREN_BIND_ADDR {:?}: {}, using default", v, e);
                    None
                }
            })
            .unwrap_or(defaults.bind_addr);

        let device_state = std::env::var("WREN_DEVICE_STATE")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.device_state);

        let unlock_code = std::env::var("WREN_UNLOCK_CODE")
            .ok()
            .map(|v| v.trim().to_lowercase())
            .filter(|v| !v.is_empty())
            .unwrap_or(defaults.unlock_code);

        let lock_poll = std::env::var("WREN_LOCK_POLL_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(defaults.timings.lock_poll);

        let static_dir = std::env::var("WREN_STATIC_DIR")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.static_dir);

        tracing::info!(
            %bind_addr,
            device_state = %device_state.display(),
            static_dir = %static_dir.display(),
            lock_poll_secs = lock_poll.as_secs(),
            "Runtime config loaded"
        );

        Self {
            bind_addr,
            device_state,
            unlock_code,
            static_dir,
            timings: ProctorTimings {
                lock_poll,
                ..defaults.timings
            },
            unlock_reload: defaults.unlock_reload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: [&str; 5] = [
        "WREN_BIND_ADDR",
        "WREN_DEVICE_STATE",
        "WREN_UNLOCK_CODE",
        "WREN_LOCK_POLL_SECS",
        "WREN_STATIC_DIR",
    ];

    fn clear_env() {
        for var in VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_defaults() {
        clear_env();
        let config = RuntimeConfig::from_env();
        assert_eq!(config.bind_addr.to_string(), DEFAULT_BIND_ADDR);
        assert_eq!(config.device_state, PathBuf::from(DEFAULT_DEVICE_STATE));
        assert_eq!(config.unlock_code, DEFAULT_UNLOCK_CODE);
        assert_eq!(config.timings.lock_poll, Duration::from_secs(5));
        assert_eq!(config.static_dir, PathBuf::from("static"));
    }

    #[test]
    #[serial]
    fn test_overrides() {
        clear_env();
        std::env::set_var("WREN_BIND_ADDR", "127.0.0.1:9000");
        std::env::set_var("WREN_UNLOCK_CODE", " OpenSesame ");
        std::env::set_var("WREN_LOCK_POLL_SECS", "2");
        std::env::set_var("WREN_DEVICE_STATE", "/tmp/device.json");

        let config = RuntimeConfig::from_env();
        assert_eq!(config.bind_addr.port(), 9000);
        assert_eq!(config.unlock_code, "opensesame");
        assert_eq!(config.timings.lock_poll, Duration::from_secs(2));
        assert_eq!(config.device_state, PathBuf::from("/tmp/device.json"));
        // Untouched timings keep their defaults
        assert_eq!(config.timings.disqualify_grace, Duration::from_secs(3));
        clear_env();
    }

    #[test]
    #[serial]
    fn test_invalid_values_fall_back() {
        clear_env();
        std::env::set_var("WREN_BIND_ADDR", "not-an-address");
        std::env::set_var("WREN_LOCK_POLL_SECS", "0");
        std::env::set_var("WREN_UNLOCK_CODE", "   ");

        let config = RuntimeConfig::from_env();
        assert_eq!(config.bind_addr.to_string(), DEFAULT_BIND_ADDR);
        assert_eq!(config.timings.lock_poll, Duration::from_secs(5));
        assert_eq!(config.unlock_code, DEFAULT_UNLOCK_CODE);
        clear_env();
    }
}
