//! Relay configuration.
//!
//! Settings come from an optional TOML file and are then overridden by
//! `TEAM_RELAY_*` environment variables. Missing required settings are a
//! fatal startup error.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable names.
pub mod env {
    pub const CONFIG_FILE: &str = "TEAM_RELAY_CONFIG";
    pub const POLL_INTERVAL_MINUTES: &str = "TEAM_RELAY_POLL_INTERVAL_MINUTES";
    pub const INITIAL_POLL_DELAY_SECS: &str = "TEAM_RELAY_INITIAL_POLL_DELAY_SECS";
    pub const RECIPIENT: &str = "TEAM_RELAY_RECIPIENT";
    pub const CREDENTIALS_DIR: &str = "TEAM_RELAY_CREDENTIALS_DIR";
    pub const STORE_URL: &str = "TEAM_RELAY_STORE_URL";
    pub const STORE_KEY: &str = "TEAM_RELAY_STORE_KEY";
    pub const BRIDGE_URL: &str = "TEAM_RELAY_BRIDGE_URL";
    pub const PRESENTER: &str = "TEAM_RELAY_PRESENTER";
    pub const RECONNECT_BACKOFF_SECS: &str = "TEAM_RELAY_RECONNECT_BACKOFF_SECS";
    pub const RECONNECT_BACKOFF_MAX_SECS: &str = "TEAM_RELAY_RECONNECT_BACKOFF_MAX_SECS";
    pub const PAIRING_TIMEOUT_SECS: &str = "TEAM_RELAY_PAIRING_TIMEOUT_SECS";
    pub const SEND_INTERVAL_MS: &str = "TEAM_RELAY_SEND_INTERVAL_MS";
    pub const HTTP_HOST: &str = "TEAM_RELAY_HTTP_HOST";
    pub const HTTP_PORT: &str = "TEAM_RELAY_HTTP_PORT";
    /// Fallback port variable set by common hosting platforms.
    pub const PORT: &str = "PORT";
    pub const LOG_DIR: &str = "TEAM_RELAY_LOG_DIR";
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub poll: PollConfig,
    pub store: StoreConfig,
    pub session: SessionConfig,
    pub dispatch: DispatchConfig,
    pub http: HttpConfig,
    pub logging: LoggingConfig,
    /// Display-name overrides keyed by member identifier.
    pub members: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Poll period in minutes. Also the width of the recency window.
    pub interval_minutes: u64,
    /// Delay before the first cycle after startup.
    pub initial_delay_secs: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_minutes: 5,
            initial_delay_secs: 10,
        }
    }
}

/// Record store REST endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub url: String,
    pub api_key: String,
    pub timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_key: String::new(),
            timeout_secs: 30,
        }
    }
}

/// How pairing codes reach the operator.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenterKind {
    /// Print instructions and the code to the terminal.
    #[default]
    Terminal,
    /// Emit the code as a log line.
    Log,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Group conversation handle that receives every notification.
    pub recipient: String,
    /// Where session credentials are kept. Defaults to the data dir.
    pub credentials_dir: Option<PathBuf>,
    /// Messaging bridge websocket URL.
    pub bridge_url: String,
    pub presenter: PresenterKind,
    pub reconnect_backoff_secs: u64,
    /// When set, backoff doubles per attempt up to this cap.
    pub reconnect_backoff_max_secs: Option<u64>,
    /// When set, pairing that takes longer is abandoned.
    pub pairing_timeout_secs: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            recipient: String::new(),
            credentials_dir: None,
            bridge_url: "ws://127.0.0.1:3001/session".to_owned(),
            presenter: PresenterKind::Terminal,
            reconnect_backoff_secs: 5,
            reconnect_backoff_max_secs: None,
            pairing_timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Minimum spacing between consecutive sends.
    pub send_interval_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            send_interval_ms: 1000,
        }
    }
}

/// Read-only health/status HTTP surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "0.0.0.0".to_owned(),
            port: 3000,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Also write daily-rotated log files here.
    pub log_dir: Option<PathBuf>,
}

impl RelayConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::File(format!("{}: {e}", path.display())))?;
        toml::from_str(&content).map_err(|e| ConfigError::File(format!("{}: {e}", path.display())))
    }

    /// Resolve the full configuration from the process environment.
    ///
    /// The file named by `TEAM_RELAY_CONFIG` is loaded first (it must
    /// exist); without it the default config file is used when present.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// [`RelayConfig::load`] with an injectable variable lookup.
    pub fn load_with<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Self::resolve_with(lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Layer the config file and environment without checking that the
    /// relay could run. Tools that only talk to the bridge start here.
    pub fn resolve_with<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match lookup(env::CONFIG_FILE).filter(|p| !p.trim().is_empty()) {
            Some(path) => Self::from_file(Path::new(path.trim()))?,
            None => {
                let default_path = crate::relay_dirs::config_file();
                if default_path.exists() {
                    Self::from_file(&default_path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env(lookup)?;
        Ok(config)
    }

    /// Overlay environment variables on top of the current values.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_owned())
                .filter(|v| !v.is_empty())
        };

        if let Some(v) = get(env::POLL_INTERVAL_MINUTES) {
            self.poll.interval_minutes = parse_number(env::POLL_INTERVAL_MINUTES, &v)?;
        }
        if let Some(v) = get(env::INITIAL_POLL_DELAY_SECS) {
            self.poll.initial_delay_secs = parse_number(env::INITIAL_POLL_DELAY_SECS, &v)?;
        }
        if let Some(v) = get(env::RECIPIENT) {
            self.session.recipient = v;
        }
        if let Some(v) = get(env::CREDENTIALS_DIR) {
            self.session.credentials_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = get(env::STORE_URL) {
            self.store.url = v;
        }
        if let Some(v) = get(env::STORE_KEY) {
            self.store.api_key = v;
        }
        if let Some(v) = get(env::BRIDGE_URL) {
            self.session.bridge_url = v;
        }
        if let Some(v) = get(env::PRESENTER) {
            self.session.presenter = match v.to_ascii_lowercase().as_str() {
                "terminal" => PresenterKind::Terminal,
                "log" => PresenterKind::Log,
                other => {
                    return Err(ConfigError::Invalid {
                        key: env::PRESENTER,
                        reason: format!("unknown presenter `{other}` (expected terminal or log)"),
                    });
                }
            };
        }
        if let Some(v) = get(env::RECONNECT_BACKOFF_SECS) {
            self.session.reconnect_backoff_secs = parse_number(env::RECONNECT_BACKOFF_SECS, &v)?;
        }
        if let Some(v) = get(env::RECONNECT_BACKOFF_MAX_SECS) {
            self.session.reconnect_backoff_max_secs =
                Some(parse_number(env::RECONNECT_BACKOFF_MAX_SECS, &v)?);
        }
        if let Some(v) = get(env::PAIRING_TIMEOUT_SECS) {
            self.session.pairing_timeout_secs = Some(parse_number(env::PAIRING_TIMEOUT_SECS, &v)?);
        }
        if let Some(v) = get(env::SEND_INTERVAL_MS) {
            self.dispatch.send_interval_ms = parse_number(env::SEND_INTERVAL_MS, &v)?;
        }
        if let Some(v) = get(env::HTTP_HOST) {
            self.http.host = v;
        }
        if let Some(v) = get(env::HTTP_PORT) {
            self.http.port = parse_number(env::HTTP_PORT, &v)?;
        } else if let Some(v) = get(env::PORT) {
            self.http.port = parse_number(env::PORT, &v)?;
        }
        if let Some(v) = get(env::LOG_DIR) {
            self.logging.log_dir = Some(PathBuf::from(v));
        }
        Ok(())
    }

    /// Check required settings and value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.recipient.trim().is_empty() {
            return Err(ConfigError::Missing(env::RECIPIENT));
        }
        if self.store.url.trim().is_empty() {
            return Err(ConfigError::Missing(env::STORE_URL));
        }
        if self.store.api_key.trim().is_empty() {
            return Err(ConfigError::Missing(env::STORE_KEY));
        }
        if self.poll.interval_minutes == 0 {
            return Err(ConfigError::Invalid {
                key: env::POLL_INTERVAL_MINUTES,
                reason: "must be at least 1".to_owned(),
            });
        }
        check_url(env::STORE_URL, &self.store.url, &["http", "https"])?;
        self.validate_bridge()
    }

    /// Check only the bridge URL.
    pub fn validate_bridge(&self) -> Result<(), ConfigError> {
        check_url(env::BRIDGE_URL, &self.session.bridge_url, &["ws", "wss"])
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll.interval_minutes.saturating_mul(60))
    }

    #[must_use]
    pub fn credentials_dir(&self) -> PathBuf {
        self.session
            .credentials_dir
            .clone()
            .unwrap_or_else(crate::relay_dirs::session_dir)
    }
}

fn parse_number<T: std::str::FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.parse().map_err(|_| ConfigError::Invalid {
        key,
        reason: format!("`{raw}` is not a valid number"),
    })
}

fn check_url(key: &'static str, raw: &str, schemes: &[&str]) -> Result<(), ConfigError> {
    let parsed = url::Url::parse(raw).map_err(|e| ConfigError::Invalid {
        key,
        reason: e.to_string(),
    })?;
    if !schemes.contains(&parsed.scheme()) {
        return Err(ConfigError::Invalid {
            key,
            reason: format!("scheme must be one of {}", schemes.join(", ")),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    fn required() -> Vec<(&'static str, &'static str)> {
        vec![
            (env::RECIPIENT, "120363000000@g.us"),
            (env::STORE_URL, "https://project.supabase.co"),
            (env::STORE_KEY, "anon-key"),
        ]
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = RelayConfig::default();
        assert_eq!(config.poll.interval_minutes, 5);
        assert_eq!(config.poll.initial_delay_secs, 10);
        assert_eq!(config.dispatch.send_interval_ms, 1000);
        assert_eq!(config.session.reconnect_backoff_secs, 5);
        assert!(config.session.reconnect_backoff_max_secs.is_none());
        assert!(config.session.pairing_timeout_secs.is_none());
        assert_eq!(config.http.port, 3000);
        assert_eq!(config.poll_interval(), Duration::from_secs(300));
    }

    #[test]
    fn env_overrides_apply() {
        let mut vars = required();
        vars.extend([
            (env::POLL_INTERVAL_MINUTES, "2"),
            (env::CREDENTIALS_DIR, "/var/lib/relay/session"),
            (env::PRESENTER, "LOG"),
            (env::RECONNECT_BACKOFF_MAX_SECS, "120"),
            (env::PORT, "8080"),
        ]);
        let mut config = RelayConfig::default();
        config.apply_env(lookup(&vars)).unwrap();
        config.validate().unwrap();

        assert_eq!(config.poll_interval(), Duration::from_secs(120));
        assert_eq!(
            config.credentials_dir(),
            PathBuf::from("/var/lib/relay/session")
        );
        assert_eq!(config.session.presenter, PresenterKind::Log);
        assert_eq!(config.session.reconnect_backoff_max_secs, Some(120));
        assert_eq!(config.http.port, 8080);
    }

    #[test]
    fn explicit_http_port_wins_over_port() {
        let mut vars = required();
        vars.extend([(env::HTTP_PORT, "9000"), (env::PORT, "8080")]);
        let mut config = RelayConfig::default();
        config.apply_env(lookup(&vars)).unwrap();
        assert_eq!(config.http.port, 9000);
    }

    #[test]
    fn missing_required_settings_are_reported() {
        let mut config = RelayConfig::default();
        config.apply_env(lookup(&[])).unwrap();
        assert_eq!(config.validate(), Err(ConfigError::Missing(env::RECIPIENT)));

        let mut config = RelayConfig::default();
        config
            .apply_env(lookup(&[(env::RECIPIENT, "group@g.us")]))
            .unwrap();
        assert_eq!(config.validate(), Err(ConfigError::Missing(env::STORE_URL)));
    }

    #[test]
    fn bad_numbers_and_urls_are_invalid() {
        let mut config = RelayConfig::default();
        let err = config
            .apply_env(lookup(&[(env::POLL_INTERVAL_MINUTES, "five")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                key: env::POLL_INTERVAL_MINUTES,
                ..
            }
        ));

        let mut vars = required();
        vars.push((env::BRIDGE_URL, "http://127.0.0.1:3001"));
        let mut config = RelayConfig::default();
        config.apply_env(lookup(&vars)).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                key: env::BRIDGE_URL,
                ..
            })
        ));

        let mut config = RelayConfig::default();
        config.apply_env(lookup(&required())).unwrap();
        config.poll.interval_minutes = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn file_then_env_layering() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.toml");
        std::fs::write(
            &path,
            r#"
[poll]
interval_minutes = 10

[store]
url = "https://file.supabase.co"
api_key = "file-key"

[session]
recipient = "file-group@g.us"
pairing_timeout_secs = 300

[members]
zoe = "Zoe"
"#,
        )
        .unwrap();

        let path_str = path.to_string_lossy().into_owned();
        let config = RelayConfig::load_with(lookup(&[
            (env::CONFIG_FILE, path_str.as_str()),
            (env::RECIPIENT, "env-group@g.us"),
        ]))
        .unwrap();

        assert_eq!(config.poll.interval_minutes, 10);
        assert_eq!(config.store.api_key, "file-key");
        assert_eq!(config.session.recipient, "env-group@g.us");
        assert_eq!(config.session.pairing_timeout_secs, Some(300));
        assert_eq!(config.members.get("zoe").map(String::as_str), Some("Zoe"));
    }

    #[test]
    fn resolve_skips_relay_requirements() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bridge-only.toml");
        std::fs::write(&path, "[session]\nbridge_url = \"ws://10.0.0.5:3001/session\"\n").unwrap();
        let path_str = path.to_string_lossy().into_owned();

        let config = RelayConfig::resolve_with(lookup(&[(env::CONFIG_FILE, path_str.as_str())]))
            .unwrap();
        assert!(config.session.recipient.is_empty());
        assert_eq!(config.session.bridge_url, "ws://10.0.0.5:3001/session");
        config.validate_bridge().unwrap();
        assert_eq!(config.validate(), Err(ConfigError::Missing(env::RECIPIENT)));

        let config = RelayConfig::resolve_with(lookup(&[
            (env::CONFIG_FILE, path_str.as_str()),
            (env::BRIDGE_URL, "https://bridge.local"),
        ]))
        .unwrap();
        assert!(config.validate_bridge().is_err());
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let result = RelayConfig::load_with(lookup(&[(
            env::CONFIG_FILE,
            "/nonexistent/path/relay.toml",
        )]));
        assert!(matches!(result, Err(ConfigError::File(_))));
    }

    #[test]
    fn invalid_toml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "this is not valid toml {{{").unwrap();
        assert!(RelayConfig::from_file(&path).is_err());
    }
}
