//! Signaling service configuration.
//!
//! Configuration is loaded from environment variables. All sensitive
//! fields are redacted in Debug output.

use common::secret::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use thiserror::Error;

/// Default bind address for the WebSocket and REST listener.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Default health endpoint bind address.
pub const DEFAULT_HEALTH_BIND_ADDRESS: &str = "0.0.0.0:8081";

/// Default cap on concurrently active screen shares per session.
pub const DEFAULT_MAX_CONCURRENT_SCREENS: usize = 4;

/// Default per-connection outbound queue length.
pub const DEFAULT_OUTBOUND_BUFFER: usize = 256;

/// Default TTL for persisted session records (one day).
pub const DEFAULT_SESSION_TTL_SECONDS: u64 = 86_400;

/// Default STUN servers handed to clients.
pub const DEFAULT_STUN_SERVERS: &str = "stun:stun.l.google.com:19302,stun:stun1.l.google.com:19302";

/// Default instance ID prefix.
pub const DEFAULT_INSTANCE_ID_PREFIX: &str = "sig";

/// Signaling service configuration.
///
/// Loaded from environment variables with sensible defaults.
/// Sensitive fields are redacted in Debug output.
#[derive(Clone)]
pub struct Config {
    /// WebSocket + REST bind address (default: "0.0.0.0:8080").
    pub bind_address: String,

    /// Health endpoint bind address (default: "0.0.0.0:8081").
    pub health_bind_address: String,

    /// Redis connection URL for session durability. When absent, session
    /// records are kept in process memory only.
    /// Protected by `SecretString` to prevent accidental logging.
    pub redis_url: Option<SecretString>,

    /// TTL applied to persisted session records.
    pub session_ttl_seconds: u64,

    /// Maximum concurrently active screen shares per session.
    pub max_concurrent_screens: usize,

    /// Bounded outbound queue length per connection.
    pub outbound_buffer: usize,

    /// STUN server URLs.
    pub stun_servers: Vec<String>,

    /// TURN server URLs (may be empty).
    pub turn_servers: Vec<String>,

    /// TURN username shared by all TURN servers.
    pub turn_username: String,

    /// TURN credential shared by all TURN servers.
    pub turn_credential: SecretString,

    /// Whether connections without an identity get a generated guest ID.
    pub allow_guests: bool,

    /// Whether `PUT /api/v1/rooms/:room_id/roles` is served. The endpoint
    /// is unauthenticated, so it is off unless an operator enables it.
    pub roles_api_enabled: bool,

    /// Unique identifier for this instance.
    pub instance_id: String,
}

/// Custom Debug implementation that redacts sensitive fields.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("bind_address", &self.bind_address)
            .field("health_bind_address", &self.health_bind_address)
            .field(
                "redis_url",
                &self.redis_url.as_ref().map(|_| "[REDACTED]"),
            )
            .field("session_ttl_seconds", &self.session_ttl_seconds)
            .field("max_concurrent_screens", &self.max_concurrent_screens)
            .field("outbound_buffer", &self.outbound_buffer)
            .field("stun_servers", &self.stun_servers)
            .field("turn_servers", &self.turn_servers)
            .field("turn_username", &self.turn_username)
            .field("turn_credential", &"[REDACTED]")
            .field("allow_guests", &self.allow_guests)
            .field("roles_api_enabled", &self.roles_api_enabled)
            .field("instance_id", &self.instance_id)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let bind_address = vars
            .get("SIG_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let health_bind_address = vars
            .get("SIG_HEALTH_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_HEALTH_BIND_ADDRESS.to_string());

        let redis_url = vars
            .get("REDIS_URL")
            .filter(|url| !url.trim().is_empty())
            .map(|url| SecretString::from(url.clone()));

        let session_ttl_seconds = vars
            .get("SIG_SESSION_TTL_SECONDS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_SESSION_TTL_SECONDS);

        let max_concurrent_screens = parse_positive(
            vars,
            "SIG_MAX_CONCURRENT_SCREENS",
            DEFAULT_MAX_CONCURRENT_SCREENS,
        )?;

        let outbound_buffer =
            parse_positive(vars, "SIG_OUTBOUND_BUFFER", DEFAULT_OUTBOUND_BUFFER)?;

        let stun_servers = split_list(
            vars.get("SIG_STUN_SERVERS")
                .map_or(DEFAULT_STUN_SERVERS, String::as_str),
        );

        let turn_servers = split_list(vars.get("SIG_TURN_SERVERS").map_or("", String::as_str));

        let turn_username = vars.get("SIG_TURN_USERNAME").cloned().unwrap_or_default();

        let turn_credential = SecretString::from(
            vars.get("SIG_TURN_CREDENTIAL")
                .cloned()
                .unwrap_or_default(),
        );

        let allow_guests = parse_bool(vars, "SIG_ALLOW_GUESTS", true)?;

        let roles_api_enabled = parse_bool(vars, "SIG_ENABLE_ROLES_API", false)?;

        // Generate instance ID
        let instance_id = vars.get("SIG_INSTANCE_ID").cloned().unwrap_or_else(|| {
            let hostname = std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string());
            let uuid_suffix = uuid::Uuid::new_v4().to_string();
            let short_suffix = uuid_suffix.get(..8).unwrap_or("00000000");
            format!("{DEFAULT_INSTANCE_ID_PREFIX}-{hostname}-{short_suffix}")
        });

        Ok(Config {
            bind_address,
            health_bind_address,
            redis_url,
            session_ttl_seconds,
            max_concurrent_screens,
            outbound_buffer,
            stun_servers,
            turn_servers,
            turn_username,
            turn_credential,
            allow_guests,
            roles_api_enabled,
            instance_id,
        })
    }
}

fn parse_bool(vars: &HashMap<String, String>, key: &str, default: bool) -> Result<bool, ConfigError> {
    match vars.get(key).map(String::as_str) {
        None => Ok(default),
        Some("true" | "1" | "yes") => Ok(true),
        Some("false" | "0" | "no") => Ok(false),
        Some(other) => Err(ConfigError::InvalidValue(format!(
            "{key} must be true or false, got {other}"
        ))),
    }
}

fn parse_positive(
    vars: &HashMap<String, String>,
    key: &str,
    default: usize,
) -> Result<usize, ConfigError> {
    match vars.get(key) {
        None => Ok(default),
        Some(raw) => match raw.trim().parse::<usize>() {
            Ok(value) if value > 0 => Ok(value),
            _ => Err(ConfigError::InvalidValue(format!(
                "{key} must be a positive integer, got {raw}"
            ))),
        },
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use common::secret::ExposeSecret;

    fn base_vars() -> HashMap<String, String> {
        HashMap::new()
    }

    #[test]
    fn test_from_vars_success_with_defaults() {
        let config = Config::from_vars(&base_vars()).expect("Config should load successfully");

        assert_eq!(config.bind_address, DEFAULT_BIND_ADDRESS);
        assert_eq!(config.health_bind_address, DEFAULT_HEALTH_BIND_ADDRESS);
        assert!(config.redis_url.is_none());
        assert_eq!(config.session_ttl_seconds, DEFAULT_SESSION_TTL_SECONDS);
        assert_eq!(config.max_concurrent_screens, 4);
        assert_eq!(config.outbound_buffer, DEFAULT_OUTBOUND_BUFFER);
        assert_eq!(
            config.stun_servers,
            vec![
                "stun:stun.l.google.com:19302".to_string(),
                "stun:stun1.l.google.com:19302".to_string()
            ]
        );
        assert!(config.turn_servers.is_empty());
        assert!(config.allow_guests);
        assert!(!config.roles_api_enabled);
        assert!(config.instance_id.starts_with("sig-"));
    }

    #[test]
    fn test_from_vars_success_with_custom_values() {
        let mut vars = base_vars();
        vars.insert("SIG_BIND_ADDRESS".to_string(), "127.0.0.1:9000".to_string());
        vars.insert(
            "SIG_HEALTH_BIND_ADDRESS".to_string(),
            "127.0.0.1:9001".to_string(),
        );
        vars.insert(
            "REDIS_URL".to_string(),
            "redis://:pw@localhost:6379".to_string(),
        );
        vars.insert("SIG_SESSION_TTL_SECONDS".to_string(), "600".to_string());
        vars.insert("SIG_MAX_CONCURRENT_SCREENS".to_string(), "2".to_string());
        vars.insert("SIG_OUTBOUND_BUFFER".to_string(), "32".to_string());
        vars.insert(
            "SIG_TURN_SERVERS".to_string(),
            "turn:turn.example.com:3478, turns:turn.example.com:5349".to_string(),
        );
        vars.insert("SIG_TURN_USERNAME".to_string(), "turn-user".to_string());
        vars.insert("SIG_TURN_CREDENTIAL".to_string(), "turn-pass".to_string());
        vars.insert("SIG_ALLOW_GUESTS".to_string(), "false".to_string());
        vars.insert("SIG_INSTANCE_ID".to_string(), "sig-custom-001".to_string());

        let config = Config::from_vars(&vars).expect("Config should load successfully");

        assert_eq!(config.bind_address, "127.0.0.1:9000");
        assert_eq!(config.health_bind_address, "127.0.0.1:9001");
        assert_eq!(
            config.redis_url.as_ref().unwrap().expose_secret(),
            "redis://:pw@localhost:6379"
        );
        assert_eq!(config.session_ttl_seconds, 600);
        assert_eq!(config.max_concurrent_screens, 2);
        assert_eq!(config.outbound_buffer, 32);
        assert_eq!(
            config.turn_servers,
            vec![
                "turn:turn.example.com:3478".to_string(),
                "turns:turn.example.com:5349".to_string()
            ]
        );
        assert_eq!(config.turn_username, "turn-user");
        assert_eq!(config.turn_credential.expose_secret(), "turn-pass");
        assert!(!config.allow_guests);
        assert_eq!(config.instance_id, "sig-custom-001");
    }

    #[test]
    fn test_blank_redis_url_means_in_memory() {
        let mut vars = base_vars();
        vars.insert("REDIS_URL".to_string(), "  ".to_string());

        let config = Config::from_vars(&vars).unwrap();
        assert!(config.redis_url.is_none());
    }

    #[test]
    fn test_zero_screen_cap_rejected() {
        let mut vars = base_vars();
        vars.insert("SIG_MAX_CONCURRENT_SCREENS".to_string(), "0".to_string());

        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn test_non_numeric_outbound_buffer_rejected() {
        let mut vars = base_vars();
        vars.insert("SIG_OUTBOUND_BUFFER".to_string(), "lots".to_string());

        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::InvalidValue(msg)) if msg.contains("SIG_OUTBOUND_BUFFER"))
        );
    }

    #[test]
    fn test_roles_api_opt_in() {
        let mut vars = base_vars();
        vars.insert("SIG_ENABLE_ROLES_API".to_string(), "true".to_string());
        assert!(Config::from_vars(&vars).unwrap().roles_api_enabled);

        vars.insert("SIG_ENABLE_ROLES_API".to_string(), "sometimes".to_string());
        assert!(
            matches!(Config::from_vars(&vars), Err(ConfigError::InvalidValue(msg)) if msg.contains("SIG_ENABLE_ROLES_API"))
        );
    }

    #[test]
    fn test_invalid_allow_guests_rejected() {
        let mut vars = base_vars();
        vars.insert("SIG_ALLOW_GUESTS".to_string(), "maybe".to_string());

        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_debug_redacts_sensitive_fields() {
        let mut vars = base_vars();
        vars.insert(
            "REDIS_URL".to_string(),
            "redis://:hunter2@localhost:6379".to_string(),
        );
        vars.insert("SIG_TURN_CREDENTIAL".to_string(), "turn-pass".to_string());
        let config = Config::from_vars(&vars).expect("Config should load successfully");

        let debug_output = format!("{config:?}");

        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("hunter2"));
        assert!(!debug_output.contains("turn-pass"));
    }
}
