use crate::config::{Config, PollPolicy};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ViewKind {
    /// Push-driven channel/query chat
    Live,
    /// Deprecated single-channel polling view
    Legacy,
    /// Bot status dashboard
    Dashboard,
}

#[derive(Parser, Debug)]
#[command(name = "relay-webchat")]
#[command(version)]
#[command(about = "Terminal client for an IRC relay's webchat")]
pub struct Args {
    /// Relay base URL (overrides `server.base_url`)
    #[arg(long)]
    pub server: Option<String>,

    /// TOML config file
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Channel to join on startup (live) or to poll (legacy)
    #[arg(long)]
    pub channel: Option<String>,

    /// Which view to drive
    #[arg(long, value_enum, default_value = "live")]
    pub view: ViewKind,

    /// When the legacy view polls
    #[arg(long, value_enum)]
    pub poll_policy: Option<PollPolicy>,

    /// Print escaped HTML fragments instead of terminal lines
    #[arg(long)]
    pub html: bool,
}

impl Args {
    /// Fold CLI overrides into a loaded config.
    pub fn apply(&self, config: &mut Config) {
        if let Some(server) = &self.server {
            config.server.base_url = server.clone();
        }
        if let Some(channel) = &self.channel {
            config.live.initial_channel = Some(channel.clone());
            config.legacy.channel = Some(channel.clone());
        }
        if let Some(policy) = self.poll_policy {
            config.legacy.poll_policy = policy;
        }
    }
}

// ---------------------------------------------------------------------------
// Stdin commands
// ---------------------------------------------------------------------------

/// One line typed at the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputCommand {
    Say(String),
    Join(String),
    Part,
    Query(String),
    Switch(String),
    Topic(String),
    Test,
    /// Submit a dashboard form by name.
    Submit(String),
    Quit,
    Unknown(String),
}

impl InputCommand {
    /// Lines that don't start with `/` are chat text. `//` escapes a
    /// leading slash.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            return None;
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Some(InputCommand::Say(line.to_string()));
        };
        if rest.starts_with('/') {
            return Some(InputCommand::Say(rest.to_string()));
        }

        let (cmd, arg) = match rest.split_once(char::is_whitespace) {
            Some((c, a)) => (c, a.trim()),
            None => (rest, ""),
        };
        let cmd = match cmd.to_ascii_lowercase().as_str() {
            "join" | "j" if !arg.is_empty() => InputCommand::Join(arg.to_string()),
            "part" | "leave" => InputCommand::Part,
            "query" | "msg" if !arg.is_empty() => InputCommand::Query(arg.to_string()),
            "switch" | "s" if !arg.is_empty() => InputCommand::Switch(arg.to_string()),
            "topic" => InputCommand::Topic(arg.to_string()),
            "test" => InputCommand::Test,
            "submit" if !arg.is_empty() => InputCommand::Submit(arg.to_string()),
            "quit" | "exit" => InputCommand::Quit,
            _ => InputCommand::Unknown(rest.to_string()),
        };
        Some(cmd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parse_minimal() {
        let args = Args::parse_from(["relay-webchat"]);
        assert_eq!(args.view, ViewKind::Live);
        assert!(args.server.is_none());
        assert!(args.config.is_none());
        assert!(args.channel.is_none());
        assert!(args.poll_policy.is_none());
        assert!(!args.html);
    }

    #[test]
    fn test_args_parse_full() {
        let args = Args::parse_from([
            "relay-webchat",
            "--server",
            "http://relay:5000",
            "--config",
            "webchat.toml",
            "--channel",
            "#rust",
            "--view",
            "legacy",
            "--poll-policy",
            "always",
            "--html",
        ]);
        assert_eq!(args.server.as_deref(), Some("http://relay:5000"));
        assert_eq!(args.config, Some(PathBuf::from("webchat.toml")));
        assert_eq!(args.channel.as_deref(), Some("#rust"));
        assert_eq!(args.view, ViewKind::Legacy);
        assert_eq!(args.poll_policy, Some(PollPolicy::Always));
        assert!(args.html);
    }

    #[test]
    fn test_args_reject_unknown_view() {
        assert!(Args::try_parse_from(["relay-webchat", "--view", "admin"]).is_err());
    }

    #[test]
    fn test_apply_overrides_config() {
        let args = Args::parse_from([
            "relay-webchat",
            "--server",
            "http://relay:5000",
            "--channel",
            "#rust",
            "--poll-policy",
            "always",
        ]);
        let mut config = Config::default();
        args.apply(&mut config);
        assert_eq!(config.server.base_url, "http://relay:5000");
        assert_eq!(config.live.initial_channel.as_deref(), Some("#rust"));
        assert_eq!(config.legacy.channel.as_deref(), Some("#rust"));
        assert_eq!(config.legacy.poll_policy, PollPolicy::Always);
    }

    #[test]
    fn test_apply_without_flags_keeps_config() {
        let args = Args::parse_from(["relay-webchat"]);
        let mut config = Config::default();
        config.live.initial_channel = Some("#lobby".into());
        args.apply(&mut config);
        assert_eq!(config.live.initial_channel.as_deref(), Some("#lobby"));
        assert_eq!(config.server.base_url, "http://127.0.0.1:5000");
    }

    #[test]
    fn test_input_plain_text_is_say() {
        assert_eq!(
            InputCommand::parse("hello there\n"),
            Some(InputCommand::Say("hello there".into()))
        );
    }

    #[test]
    fn test_input_blank_is_none() {
        assert_eq!(InputCommand::parse("   \n"), None);
    }

    #[test]
    fn test_input_double_slash_escapes() {
        assert_eq!(
            InputCommand::parse("//shrug"),
            Some(InputCommand::Say("/shrug".into()))
        );
    }

    #[test]
    fn test_input_commands() {
        assert_eq!(
            InputCommand::parse("/join #rust"),
            Some(InputCommand::Join("#rust".into()))
        );
        assert_eq!(InputCommand::parse("/PART"), Some(InputCommand::Part));
        assert_eq!(
            InputCommand::parse("/query amy"),
            Some(InputCommand::Query("amy".into()))
        );
        assert_eq!(
            InputCommand::parse("/switch #b"),
            Some(InputCommand::Switch("#b".into()))
        );
        assert_eq!(
            InputCommand::parse("/topic  be nice "),
            Some(InputCommand::Topic("be nice".into()))
        );
        assert_eq!(InputCommand::parse("/test"), Some(InputCommand::Test));
        assert_eq!(
            InputCommand::parse("/submit ai-settings"),
            Some(InputCommand::Submit("ai-settings".into()))
        );
        assert_eq!(InputCommand::parse("/quit"), Some(InputCommand::Quit));
    }

    #[test]
    fn test_input_join_without_channel_is_unknown() {
        assert_eq!(
            InputCommand::parse("/join"),
            Some(InputCommand::Unknown("join".into()))
        );
        assert_eq!(
            InputCommand::parse("/submit"),
            Some(InputCommand::Unknown("submit".into()))
        );
    }
}
