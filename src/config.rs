//! TOML configuration.
//!
//! Every section and field is optional; a missing file section falls back
//! to the defaults below. CLI flags override whatever the file sets.
//!
//! ```toml
//! log_filter = "relay_webchat=debug"
//!
//! [server]
//! base_url = "http://127.0.0.1:5000"
//!
//! [live]
//! initial_channel = "#lobby"
//!
//! [legacy]
//! channel = "#lobby"
//! poll_policy = "always"
//! ```

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::error::{Result, WebchatError};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// `tracing_subscriber::EnvFilter` directive used when `RUST_LOG` is unset.
    pub log_filter: String,
    pub server: ServerConfig,
    pub live: LiveConfig,
    pub legacy: LegacyConfig,
    pub dashboard: DashboardConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_filter: "relay_webchat=info".to_string(),
            server: ServerConfig::default(),
            live: LiveConfig::default(),
            legacy: LegacyConfig::default(),
            dashboard: DashboardConfig::default(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| WebchatError::ConfigIo {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that parse but cannot drive a view.
    pub fn validate(&self) -> Result<()> {
        for (key, value) in [
            ("legacy.messages_interval_ms", self.legacy.messages_interval_ms),
            ("legacy.users_interval_ms", self.legacy.users_interval_ms),
        ] {
            if value == 0 {
                return Err(WebchatError::ConfigInvalid(format!("{key} must be at least 1")));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// `http(s)://host:port` of the relay.
    pub base_url: String,
    pub socketio_path: String,
    /// 0 disables reconnecting.
    pub reconnect_delay_ms: u64,
    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5000".to_string(),
            socketio_path: "/socket.io/".to_string(),
            reconnect_delay_ms: 2_000,
            connect_timeout_ms: 3_000,
            request_timeout_ms: 10_000,
        }
    }
}

impl ServerConfig {
    pub fn reconnect_delay(&self) -> Option<Duration> {
        (self.reconnect_delay_ms > 0).then(|| Duration::from_millis(self.reconnect_delay_ms))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// reqwest client with the configured timeouts.
    pub fn http_client(&self) -> reqwest::Client {
        // Builder failure falls back to a default client instead of panicking.
        reqwest::Client::builder()
            .connect_timeout(self.connect_timeout())
            .timeout(self.request_timeout())
            .build()
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    /// Channel joined as soon as the bot reports connected.
    pub initial_channel: Option<String>,
}

/// When the legacy view polls the HTTP API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PollPolicy {
    /// Poll only while the push channel is down.
    #[default]
    Fallback,
    /// Poll continuously alongside push updates.
    Always,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LegacyConfig {
    pub channel: Option<String>,
    pub messages_interval_ms: u64,
    pub users_interval_ms: u64,
    pub max_messages: usize,
    pub poll_policy: PollPolicy,
}

impl Default for LegacyConfig {
    fn default() -> Self {
        Self {
            channel: None,
            messages_interval_ms: 1_500,
            users_interval_ms: 2_000,
            max_messages: 100,
            poll_policy: PollPolicy::Fallback,
        }
    }
}

impl LegacyConfig {
    // tokio intervals panic on a zero period, so both accessors floor at 1 ms.
    pub fn messages_interval(&self) -> Duration {
        Duration::from_millis(self.messages_interval_ms.max(1))
    }

    pub fn users_interval(&self) -> Duration {
        Duration::from_millis(self.users_interval_ms.max(1))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub flash_dismiss_ms: u64,
    /// Forms on the page that get a submit spinner.
    pub forms: Vec<String>,
    /// Flash banners shown on load, dismissed after `flash_dismiss_ms`.
    pub flashes: usize,
    /// Provider sent with the test-connection request, if any.
    pub test_provider: Option<String>,
    pub test_api_key: Option<String>,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            flash_dismiss_ms: 5_000,
            forms: Vec::new(),
            flashes: 0,
            test_provider: None,
            test_api_key: None,
        }
    }
}

impl DashboardConfig {
    pub fn flash_dismiss(&self) -> Duration {
        Duration::from_millis(self.flash_dismiss_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let c = Config::default();
        assert_eq!(c.server.base_url, "http://127.0.0.1:5000");
        assert_eq!(c.legacy.messages_interval(), Duration::from_millis(1500));
        assert_eq!(c.legacy.users_interval(), Duration::from_secs(2));
        assert_eq!(c.legacy.max_messages, 100);
        assert_eq!(c.legacy.poll_policy, PollPolicy::Fallback);
        assert_eq!(c.dashboard.flash_dismiss(), Duration::from_secs(5));
        assert_eq!(c.server.reconnect_delay(), Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_empty_file_is_default() {
        let c = Config::parse("").unwrap();
        assert_eq!(c.log_filter, "relay_webchat=info");
        assert!(c.live.initial_channel.is_none());
    }

    #[test]
    fn test_partial_sections_keep_other_defaults() {
        let c = Config::parse(
            r##"
            [server]
            base_url = "https://chat.example.org"
            reconnect_delay_ms = 0

            [legacy]
            channel = "#lobby"
            poll_policy = "always"
            "##,
        )
        .unwrap();
        assert_eq!(c.server.base_url, "https://chat.example.org");
        assert_eq!(c.server.socketio_path, "/socket.io/");
        assert_eq!(c.server.reconnect_delay(), None);
        assert_eq!(c.legacy.channel.as_deref(), Some("#lobby"));
        assert_eq!(c.legacy.poll_policy, PollPolicy::Always);
        assert_eq!(c.legacy.users_interval_ms, 2_000);
    }

    #[test]
    fn test_bad_policy_is_parse_error() {
        let err = Config::parse("[legacy]\npoll_policy = \"sometimes\"").unwrap_err();
        assert!(matches!(err, WebchatError::ConfigParse(_)));
    }

    #[test]
    fn test_zero_poll_interval_is_rejected() {
        let err = Config::parse("[legacy]\nmessages_interval_ms = 0").unwrap_err();
        assert!(matches!(err, WebchatError::ConfigInvalid(_)));
        assert!(err.to_string().contains("legacy.messages_interval_ms"));

        let err = Config::parse("[legacy]\nusers_interval_ms = 0").unwrap_err();
        assert!(err.to_string().contains("legacy.users_interval_ms"));
    }

    #[test]
    fn test_zero_interval_accessors_floor_at_one_ms() {
        let legacy = LegacyConfig {
            messages_interval_ms: 0,
            users_interval_ms: 0,
            ..LegacyConfig::default()
        };
        assert_eq!(legacy.messages_interval(), Duration::from_millis(1));
        assert_eq!(legacy.users_interval(), Duration::from_millis(1));
    }

    #[test]
    fn test_dashboard_page_elements() {
        let c = Config::parse(
            r#"
            [dashboard]
            forms = ["ai-settings", "irc-settings"]
            flashes = 2
            "#,
        )
        .unwrap();
        assert_eq!(c.dashboard.forms, vec!["ai-settings", "irc-settings"]);
        assert_eq!(c.dashboard.flashes, 2);
        assert_eq!(c.dashboard.flash_dismiss(), Duration::from_secs(5));
    }

    #[test]
    fn test_load_from_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "[live]\ninitial_channel = \"#rust\"").unwrap();
        let c = Config::load(f.path()).unwrap();
        assert_eq!(c.live.initial_channel.as_deref(), Some("#rust"));
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, WebchatError::ConfigIo { .. }));
    }
}
