//! API server configuration

use std::env;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::sync::SyncConfig;

/// API server configuration loaded from environment variables
///
/// Everything has a development default; nothing here is security-critical,
/// so unset variables never abort startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port (default: 8080)
    pub port: u16,

    /// YouTube Data API key for catalog lookups (optional; the catalog
    /// endpoints report a configuration error without it)
    pub youtube_api_key: Option<String>,

    /// CORS allowed origins (optional; permissive when unset)
    pub cors_allowed_origins: Option<Vec<String>>,

    /// Reconciliation tuning
    pub sync: SyncConfig,

    /// Expected client heartbeat interval (default: 30s)
    pub heartbeat_interval: Duration,

    /// Consecutive missed heartbeats before a connection is reaped
    /// (default: 2)
    pub heartbeat_misses: u32,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = SyncConfig::default();

        Ok(Self {
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("Invalid PORT value")?,

            youtube_api_key: env::var("YOUTUBE_API_KEY").ok().filter(|s| !s.is_empty()),

            cors_allowed_origins: env::var("CORS_ORIGINS").ok().map(|s| {
                s.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            }),

            sync: SyncConfig {
                seek_threshold: parse_f64("SYNC_SEEK_THRESHOLD_SECS", defaults.seek_threshold)?,
                cooldown_window: parse_millis("SYNC_COOLDOWN_MS", defaults.cooldown_window)?,
                grace_window: parse_millis("SYNC_PAUSE_GRACE_MS", defaults.grace_window)?,
                playing_heartbeat: parse_millis(
                    "SYNC_PLAYING_HEARTBEAT_MS",
                    defaults.playing_heartbeat,
                )?,
                idle_heartbeat: parse_millis("SYNC_IDLE_HEARTBEAT_MS", defaults.idle_heartbeat)?,
            },

            heartbeat_interval: parse_millis(
                "HEARTBEAT_INTERVAL_MS",
                Duration::from_secs(30),
            )?,

            heartbeat_misses: env::var("HEARTBEAT_MISSES")
                .unwrap_or_else(|_| "2".to_string())
                .parse()
                .context("Invalid HEARTBEAT_MISSES value")?,
        })
    }

    /// Idle budget after which a connection counts as dead
    pub fn connection_idle_timeout(&self) -> Duration {
        self.heartbeat_interval * self.heartbeat_misses
    }

    pub fn has_catalog(&self) -> bool {
        self.youtube_api_key.is_some()
    }
}

fn parse_f64(name: &'static str, default: f64) -> Result<f64> {
    match env::var(name) {
        Ok(value) => value
            .parse()
            .with_context(|| format!("Invalid {} value", name)),
        Err(_) => Ok(default),
    }
}

fn parse_millis(name: &'static str, default: Duration) -> Result<Duration> {
    match env::var(name) {
        Ok(value) => {
            let ms: u64 = value
                .parse()
                .with_context(|| format!("Invalid {} value", name))?;
            Ok(Duration::from_millis(ms))
        }
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Tests mutate process environment; keep them serialized
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Helper to temporarily set environment variables for a test
    struct EnvGuard {
        vars: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new(vars: &[(&str, &str)]) -> Self {
            let saved: Vec<_> = vars
                .iter()
                .map(|(k, v)| {
                    let old = env::var(*k).ok();
                    env::set_var(*k, *v);
                    (k.to_string(), old)
                })
                .collect();
            Self { vars: saved }
        }

        fn remove_vars(vars: &[&str]) -> Self {
            let saved: Vec<_> = vars
                .iter()
                .map(|k| {
                    let old = env::var(*k).ok();
                    env::remove_var(*k);
                    (k.to_string(), old)
                })
                .collect();
            Self { vars: saved }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (k, v) in &self.vars {
                match v {
                    Some(val) => env::set_var(k, val),
                    None => env::remove_var(k),
                }
            }
        }
    }

    const ALL_VARS: &[&str] = &[
        "PORT",
        "YOUTUBE_API_KEY",
        "CORS_ORIGINS",
        "SYNC_SEEK_THRESHOLD_SECS",
        "SYNC_COOLDOWN_MS",
        "SYNC_PAUSE_GRACE_MS",
        "SYNC_PLAYING_HEARTBEAT_MS",
        "SYNC_IDLE_HEARTBEAT_MS",
        "HEARTBEAT_INTERVAL_MS",
        "HEARTBEAT_MISSES",
    ];

    #[test]
    fn test_defaults_without_environment() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let _guard = EnvGuard::remove_vars(ALL_VARS);

        let config = Config::from_env().unwrap();
        assert_eq!(config.port, 8080);
        assert!(config.youtube_api_key.is_none());
        assert!(config.cors_allowed_origins.is_none());
        assert_eq!(config.sync.seek_threshold, 2.5);
        assert_eq!(config.sync.cooldown_window, Duration::from_millis(500));
        assert_eq!(config.connection_idle_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_sync_tuning_from_env() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let _guard = EnvGuard::new(&[
            ("SYNC_SEEK_THRESHOLD_SECS", "3.0"),
            ("SYNC_COOLDOWN_MS", "750"),
            ("SYNC_PAUSE_GRACE_MS", "2000"),
        ]);

        let config = Config::from_env().unwrap();
        assert_eq!(config.sync.seek_threshold, 3.0);
        assert_eq!(config.sync.cooldown_window, Duration::from_millis(750));
        assert_eq!(config.sync.grace_window, Duration::from_secs(2));
    }

    #[test]
    fn test_invalid_port_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let _guard = EnvGuard::new(&[("PORT", "not-a-port")]);

        let result = Config::from_env();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("PORT"));
    }

    #[test]
    fn test_cors_origins_parsed_and_trimmed() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let _guard = EnvGuard::new(&[(
            "CORS_ORIGINS",
            "http://localhost:3000, https://rooms.example.com ,",
        )]);

        let config = Config::from_env().unwrap();
        assert_eq!(
            config.cors_allowed_origins,
            Some(vec![
                "http://localhost:3000".to_string(),
                "https://rooms.example.com".to_string(),
            ])
        );
    }

    #[test]
    fn test_empty_api_key_treated_as_unset() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let _guard = EnvGuard::new(&[("YOUTUBE_API_KEY", "")]);

        let config = Config::from_env().unwrap();
        assert!(!config.has_catalog());
    }
}
