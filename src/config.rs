//! Configuration types for the chat front-end.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RobotChatConfig {
    /// Boundary HTTP server settings.
    pub server: ServerConfig,
    /// Chat collaborator (Dify) settings.
    pub chat: ChatConfig,
    /// Robot-control collaborator settings.
    pub action: ActionConfig,
    /// Event stream reader settings.
    pub stream: StreamConfig,
    /// Speech input/output settings.
    pub speech: SpeechConfig,
    /// Log output settings.
    pub logging: LoggingConfig,
}

/// Boundary HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind.
    pub host: String,
    /// Port to bind (`0` = auto-assign).
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 3000,
        }
    }
}

/// Chat collaborator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// API root, without the trailing `/chat-messages`.
    pub base_url: String,
    /// Value sent as the `user` field of every request.
    pub user: String,
    /// Environment variable holding the bearer credential.
    pub api_key_env: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.dify.ai/v1".to_owned(),
            user: "robotarm-frontend".to_owned(),
            api_key_env: "DIFY_ROBOTCHAT_API_KEY".to_owned(),
            timeout_secs: 60,
        }
    }
}

impl ChatConfig {
    /// Request timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Robot-control collaborator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionConfig {
    /// Root of the robot-control server (`/action`, `/action_status`).
    pub base_url: String,
    /// Interval between status queries while an action is pending.
    pub poll_interval_ms: u64,
}

impl Default for ActionConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_owned(),
            poll_interval_ms: 2000,
        }
    }
}

impl ActionConfig {
    /// Poll interval as a [`Duration`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Event stream reader configuration.
///
/// The boundary server does not serve these endpoints. `base_url` must point
/// at a separate streaming chat proxy that exposes `POST <base_url>/chat`
/// and `POST <base_url>/workflow`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Root of the external streaming chat proxy (not the boundary server).
    pub base_url: String,
    /// Endpoint name appended to `base_url` (`chat` or `workflow`).
    pub endpoint: String,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:3000/api".to_owned(),
            endpoint: "chat".to_owned(),
        }
    }
}

/// Speech input/output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// BCP-47 language tag for recognition and synthesis.
    pub lang: String,
    /// Quiet period after a recognition result before it is auto-submitted.
    pub auto_submit_delay_ms: u64,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            lang: "ja-JP".to_owned(),
            auto_submit_delay_ms: 500,
        }
    }
}

impl SpeechConfig {
    /// Auto-submit delay as a [`Duration`].
    pub fn auto_submit_delay(&self) -> Duration {
        Duration::from_millis(self.auto_submit_delay_ms)
    }
}

/// Log output configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Directory for daily-rolling log files. `None` logs to stderr only.
    pub directory: Option<PathBuf>,
}

impl RobotChatConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            crate::error::ChatError::ConfigError(format!("cannot read {}: {e}", path.display()))
        })?;
        toml::from_str(&content).map_err(|e| crate::error::ChatError::ConfigError(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> crate::error::Result<()> {
        let io_err =
            |e: std::io::Error| crate::error::ChatError::ConfigError(format!("{}: {e}", path.display()));
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::ChatError::ConfigError(e.to_string()))?;
        std::fs::write(path, content).map_err(io_err)?;
        Ok(())
    }

    /// Returns the default config file path: `<config dir>/robotchat/config.toml`.
    ///
    /// `ROBOTCHAT_CONFIG_DIR` overrides the directory.
    pub fn default_config_path() -> PathBuf {
        if let Some(dir) = std::env::var_os("ROBOTCHAT_CONFIG_DIR") {
            return PathBuf::from(dir).join("config.toml");
        }
        dirs::config_dir()
            .map(|d| d.join("robotchat"))
            .unwrap_or_else(|| PathBuf::from("/tmp/robotchat-config"))
            .join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = RobotChatConfig::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert!(config.server.port > 0);
        assert_eq!(config.chat.api_key_env, "DIFY_ROBOTCHAT_API_KEY");
        assert_eq!(config.chat.user, "robotarm-frontend");
        assert_eq!(config.action.poll_interval(), Duration::from_millis(2000));
        assert_eq!(config.speech.auto_submit_delay(), Duration::from_millis(500));
        assert_eq!(config.stream.endpoint, "chat");
        assert!(config.logging.directory.is_none());
    }

    #[test]
    fn stream_section_points_at_external_proxy() {
        let config: RobotChatConfig = toml::from_str(
            "[stream]\nbase_url = \"https://chat-proxy.example/api\"\nendpoint = \"workflow\"\n",
        )
        .unwrap();
        assert_eq!(config.stream.base_url, "https://chat-proxy.example/api");
        assert_eq!(config.stream.endpoint, "workflow");
        assert_eq!(config.server.port, ServerConfig::default().port);

        let defaults = StreamConfig::default();
        assert!(defaults.base_url.ends_with("/api"));
        assert_eq!(defaults.endpoint, "chat");
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = RobotChatConfig::default();
        config.server.port = 8088;
        config.action.base_url = "http://robot.local:9000".to_owned();
        config.logging.directory = Some(dir.path().join("logs"));
        config.save_to_file(&path).unwrap();

        let loaded = RobotChatConfig::from_file(&path).unwrap();
        assert_eq!(loaded.server.port, 8088);
        assert_eq!(loaded.action.base_url, "http://robot.local:9000");
        assert_eq!(loaded.logging.directory, Some(dir.path().join("logs")));
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let toml_str = r#"
[action]
poll_interval_ms = 250
"#;
        let config: RobotChatConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.action.poll_interval_ms, 250);
        assert_eq!(config.action.base_url, "http://localhost:8000");
        assert_eq!(config.chat.base_url, "https://api.dify.ai/v1");
    }

    #[test]
    fn empty_toml_is_default() {
        let config: RobotChatConfig = toml::from_str("").unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.speech.lang, "ja-JP");
    }

    #[test]
    fn missing_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = RobotChatConfig::from_file(&dir.path().join("absent.toml")).unwrap_err();
        assert_eq!(err.code(), crate::error::error_codes::CONFIG_INVALID);
    }

    #[test]
    fn invalid_toml_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[server\nport = ").unwrap();
        assert!(RobotChatConfig::from_file(&path).is_err());
    }

    #[test]
    fn default_config_path_ends_with_config_toml() {
        let path = RobotChatConfig::default_config_path();
        assert!(path.ends_with("config.toml"));
    }
}
