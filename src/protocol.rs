//! Data model and the named event vocabulary shared by every view.
//!
//! Client actions are [`ClientEvent`]s; everything the relay pushes back is
//! decoded into a [`ServerEvent`]. Payload shapes mirror the relay's JSON.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use std::cmp::Ordering;

use crate::error::{Result, WebchatError};

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// One chat line. `nick == None` marks a system message (join/part, URL info).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub nick: Option<String>,
    pub message: String,
    #[serde(default)]
    pub timestamp: String,
}

impl Message {
    pub fn new(nick: Option<&str>, message: impl Into<String>, timestamp: impl Into<String>) -> Self {
        Message {
            nick: nick.map(str::to_string),
            message: message.into(),
            timestamp: timestamp.into(),
        }
    }

    pub fn is_system(&self) -> bool {
        self.nick.is_none()
    }
}

/// A `webchat_message` push: a message plus the channel it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushedMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(default)]
    pub nick: Option<String>,
    pub message: String,
    #[serde(default)]
    pub timestamp: String,
}

impl PushedMessage {
    pub fn into_parts(self) -> (Option<String>, Message) {
        (
            self.channel,
            Message {
                nick: self.nick,
                message: self.message,
                timestamp: self.timestamp,
            },
        )
    }
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

/// IRC channel privilege tier, as carried in the `mode` field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum UserMode {
    Owner,
    Admin,
    Operator,
    HalfOp,
    Voice,
    #[default]
    None,
    /// A prefix the client does not know; sorts after every known tier.
    Unknown(String),
}

impl UserMode {
    /// Display priority; lower sorts first.
    pub fn priority(&self) -> u8 {
        match self {
            UserMode::Owner => 0,
            UserMode::Admin => 1,
            UserMode::Operator => 2,
            UserMode::HalfOp => 3,
            UserMode::Voice => 4,
            UserMode::None => 5,
            UserMode::Unknown(_) => 99,
        }
    }

    /// CSS class of the badge rendered before the nick.
    pub fn badge_class(&self) -> &'static str {
        match self {
            UserMode::Owner => "badge-owner",
            UserMode::Admin => "badge-admin",
            UserMode::Operator => "badge-op",
            UserMode::HalfOp => "badge-halfop",
            UserMode::Voice => "badge-voice",
            UserMode::None | UserMode::Unknown(_) => "badge-none",
        }
    }

    pub fn prefix(&self) -> &str {
        match self {
            UserMode::Owner => "~",
            UserMode::Admin => "&",
            UserMode::Operator => "@",
            UserMode::HalfOp => "%",
            UserMode::Voice => "+",
            UserMode::None => "",
            UserMode::Unknown(s) => s,
        }
    }
}

impl From<String> for UserMode {
    fn from(s: String) -> Self {
        match s.as_str() {
            "~" => UserMode::Owner,
            "&" => UserMode::Admin,
            "@" => UserMode::Operator,
            "%" => UserMode::HalfOp,
            "+" => UserMode::Voice,
            "" => UserMode::None,
            _ => UserMode::Unknown(s),
        }
    }
}

impl From<UserMode> for String {
    fn from(mode: UserMode) -> Self {
        mode.prefix().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub nick: String,
    #[serde(default)]
    pub mode: UserMode,
}

impl User {
    pub fn new(nick: impl Into<String>, mode: &str) -> Self {
        User {
            nick: nick.into(),
            mode: UserMode::from(mode.to_string()),
        }
    }
}

/// Mode priority first, then case-insensitive nick.
pub fn compare_users(a: &User, b: &User) -> Ordering {
    a.mode
        .priority()
        .cmp(&b.mode.priority())
        .then_with(|| a.nick.to_lowercase().cmp(&b.nick.to_lowercase()))
}

/// Sort a user list into display order. The sort is stable.
pub fn sort_users(users: &mut [User]) {
    users.sort_by(compare_users);
}

// ---------------------------------------------------------------------------
// Client -> server
// ---------------------------------------------------------------------------

/// A fire-and-forget action sent to the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    Init,
    JoinChannel { channel: String },
    PartChannel { channel: String },
    GetTopic { channel: String },
    UsersRequest { channel: String },
    MessagesRequest { channel: String },
    SendMessage { channel: String, message: String },
    OpenQuery { nick: String },
    SetTopic { channel: String, topic: String },
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::Init => "webchat_init",
            ClientEvent::JoinChannel { .. } => "webchat_join_channel",
            ClientEvent::PartChannel { .. } => "webchat_part_channel",
            ClientEvent::GetTopic { .. } => "webchat_get_topic",
            ClientEvent::UsersRequest { .. } => "webchat_users_request",
            ClientEvent::MessagesRequest { .. } => "webchat_messages_request",
            ClientEvent::SendMessage { .. } => "webchat_send_message",
            ClientEvent::OpenQuery { .. } => "webchat_open_query",
            ClientEvent::SetTopic { .. } => "webchat_set_topic",
        }
    }

    /// JSON argument for the event, or `None` for argument-less events.
    pub fn payload(&self) -> Option<Value> {
        match self {
            ClientEvent::Init => None,
            ClientEvent::JoinChannel { channel }
            | ClientEvent::PartChannel { channel }
            | ClientEvent::GetTopic { channel }
            | ClientEvent::UsersRequest { channel }
            | ClientEvent::MessagesRequest { channel } => Some(json!({ "channel": channel })),
            ClientEvent::SendMessage { channel, message } => {
                Some(json!({ "channel": channel, "message": message }))
            }
            ClientEvent::OpenQuery { nick } => Some(json!({ "nick": nick })),
            ClientEvent::SetTopic { channel, topic } => {
                Some(json!({ "channel": channel, "topic": topic }))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Server -> client
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WebchatStatus {
    pub connected: bool,
    #[serde(default)]
    pub nick: Option<String>,
}

/// Dashboard `status_update`. `server` and `port` arrive as strings or
/// numbers depending on whether settings exist.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BotStatus {
    pub connected: bool,
    #[serde(default, deserialize_with = "loose_string")]
    pub server: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub port: Option<String>,
}

fn loose_string<'de, D>(de: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(de)? {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChannelList {
    pub channels: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UserList {
    pub users: Vec<User>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MessageSnapshot {
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Topic {
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub topic: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct JoinedChannel {
    pub channel: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OpenedQuery {
    pub nick: String,
    #[serde(default)]
    pub messages: Option<Vec<Message>>,
}

/// A legacy user entry: a bare nick, or a full `{nick, mode}` record from
/// newer relays.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum LegacyNick {
    Bare(String),
    Full(User),
}

impl LegacyNick {
    pub fn into_nick(self) -> String {
        match self {
            LegacyNick::Bare(nick) => nick,
            LegacyNick::Full(user) => user.nick,
        }
    }
}

/// Legacy `user_list_update`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LegacyUserUpdate {
    pub channel: String,
    pub users: Vec<LegacyNick>,
}

impl LegacyUserUpdate {
    pub fn nicks(self) -> Vec<String> {
        self.users.into_iter().map(LegacyNick::into_nick).collect()
    }
}

/// Legacy `message_update`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LegacyMessageUpdate {
    pub channel: String,
    pub message: Message,
}

/// A decoded event pushed by the relay.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    Status(WebchatStatus),
    Channels(ChannelList),
    Users(UserList),
    Messages(MessageSnapshot),
    Message(PushedMessage),
    Topic(Topic),
    JoinedChannel(JoinedChannel),
    OpenedQuery(OpenedQuery),
    UserListUpdate(LegacyUserUpdate),
    MessageUpdate(LegacyMessageUpdate),
    StatusUpdate(BotStatus),
    /// Any event name this client does not handle.
    Other { name: String, payload: Value },
}

impl ServerEvent {
    /// Decode a named event with its (possibly absent) JSON argument.
    pub fn decode(name: &str, payload: Value) -> Result<Self> {
        fn parse<T: serde::de::DeserializeOwned>(name: &str, payload: Value) -> Result<T> {
            serde_json::from_value(payload).map_err(|e| WebchatError::json(name, e))
        }

        Ok(match name {
            "webchat_status" => ServerEvent::Status(parse(name, payload)?),
            "webchat_channels" => ServerEvent::Channels(parse(name, payload)?),
            "webchat_users" => ServerEvent::Users(parse(name, payload)?),
            "webchat_messages" => ServerEvent::Messages(parse(name, payload)?),
            "webchat_message" => ServerEvent::Message(parse(name, payload)?),
            "webchat_topic" => ServerEvent::Topic(parse(name, payload)?),
            "webchat_joined_channel" => ServerEvent::JoinedChannel(parse(name, payload)?),
            "webchat_opened_query" => ServerEvent::OpenedQuery(parse(name, payload)?),
            "user_list_update" => ServerEvent::UserListUpdate(parse(name, payload)?),
            "message_update" => ServerEvent::MessageUpdate(parse(name, payload)?),
            "status_update" => ServerEvent::StatusUpdate(parse(name, payload)?),
            _ => ServerEvent::Other {
                name: name.to_string(),
                payload,
            },
        })
    }

    pub fn name(&self) -> &str {
        match self {
            ServerEvent::Status(_) => "webchat_status",
            ServerEvent::Channels(_) => "webchat_channels",
            ServerEvent::Users(_) => "webchat_users",
            ServerEvent::Messages(_) => "webchat_messages",
            ServerEvent::Message(_) => "webchat_message",
            ServerEvent::Topic(_) => "webchat_topic",
            ServerEvent::JoinedChannel(_) => "webchat_joined_channel",
            ServerEvent::OpenedQuery(_) => "webchat_opened_query",
            ServerEvent::UserListUpdate(_) => "user_list_update",
            ServerEvent::MessageUpdate(_) => "message_update",
            ServerEvent::StatusUpdate(_) => "status_update",
            ServerEvent::Other { name, .. } => name,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
