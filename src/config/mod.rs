//! Configuration module for Wolfden.
//!
//! Supports JSON configuration files, environment variable overrides and
//! compiled-in defaults. See [`loader::load`] for the precedence rules.

pub mod defaults;
pub mod loader;
pub mod logging;

pub use loader::load;
pub use logging::{LogFormat, LogLevel, LoggingConfig, Rotation};

use defaults::{
    default_cors_origins, default_event_buffer_size, default_lock_timeout_ms,
    default_max_sessions, default_port, default_voice_token_ttl_secs,
};
use serde::{Deserialize, Serialize};

use crate::game::state::SessionConfig;

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub port: u16,
    pub server: ServerTuning,
    /// Defaults applied to sessions whose start command omits a config
    pub game: SessionConfig,
    pub security: SecurityConfig,
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            server: ServerTuning::default(),
            game: SessionConfig::default(),
            security: SecurityConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Operational tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerTuning {
    /// How long a request may wait on a session lock before `Busy`
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
    /// Replay buffer length per session (clamped to at least 64)
    #[serde(default = "default_event_buffer_size")]
    pub event_buffer_size: usize,
    /// Cap on concurrently retained sessions
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
}

impl Default for ServerTuning {
    fn default() -> Self {
        Self {
            lock_timeout_ms: default_lock_timeout_ms(),
            event_buffer_size: default_event_buffer_size(),
            max_sessions: default_max_sessions(),
        }
    }
}

/// Security-sensitive settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Comma-separated CORS origins, or "*"
    #[serde(default = "default_cors_origins")]
    pub cors_origins: String,
    /// HMAC secret for voice-channel tokens; required in production
    #[serde(default)]
    pub voice_token_secret: Option<String>,
    #[serde(default = "default_voice_token_ttl_secs")]
    pub voice_token_ttl_secs: u64,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            cors_origins: default_cors_origins(),
            voice_token_secret: None,
            voice_token_ttl_secs: default_voice_token_ttl_secs(),
        }
    }
}

/// True when the deployment declares itself production.
pub fn is_production_mode() -> bool {
    std::env::var("WOLFDEN_ENV")
        .map(|v| v.eq_ignore_ascii_case("production"))
        .unwrap_or(false)
}

/// Hard validation of security-sensitive settings. The loader only warns;
/// `main` propagates this as a startup failure.
pub fn validate_config_security(config: &Config) -> Result<(), String> {
    if config.port == 0 {
        return Err("port must be non-zero".to_string());
    }
    match &config.security.voice_token_secret {
        Some(secret) if secret.len() < 16 => {
            Err("voice_token_secret must be at least 16 bytes".to_string())
        }
        None if is_production_mode() => {
            Err("voice_token_secret is required in production".to_string())
        }
        _ => Ok(()),
    }
}
