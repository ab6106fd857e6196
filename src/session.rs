//! Explicit per-page session state for the live chat view.
//!
//! One [`Session`] is owned by one controller. It holds the displayed target
//! and the bot's nick alongside the per-channel message cache.

use std::collections::HashMap;

use crate::protocol::Message;

/// What the message pane is showing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Channel(String),
    /// Private chat, keyed by the other party's nick.
    Query(String),
}

impl Target {
    pub fn name(&self) -> &str {
        match self {
            Target::Channel(name) | Target::Query(name) => name,
        }
    }
}

/// Result of appending a pushed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Appended {
    /// Cache key the message went into.
    pub key: String,
    /// Whether that key is the displayed target (the pane needs a redraw).
    pub displayed: bool,
}

#[derive(Debug, Default, Clone)]
pub struct Session {
    target: Option<Target>,
    bot_nick: Option<String>,
    cache: HashMap<String, Vec<Message>>,
}

impl Session {
    pub fn new(initial_channel: Option<String>) -> Self {
        Session {
            target: initial_channel.map(Target::Channel),
            ..Default::default()
        }
    }

    /// Name of the displayed channel or query nick.
    pub fn current(&self) -> Option<&str> {
        self.target.as_ref().map(Target::name)
    }

    /// The displayed channel, or `None` while a private query is open.
    pub fn current_channel(&self) -> Option<&str> {
        match &self.target {
            Some(Target::Channel(name)) => Some(name),
            _ => None,
        }
    }

    pub fn select_channel(&mut self, name: impl Into<String>) {
        self.target = Some(Target::Channel(name.into()));
    }

    pub fn open_query(&mut self, nick: impl Into<String>) {
        self.target = Some(Target::Query(nick.into()));
    }

    pub fn bot_nick(&self) -> Option<&str> {
        self.bot_nick.as_deref()
    }

    pub fn set_bot_nick(&mut self, nick: impl Into<String>) {
        self.bot_nick = Some(nick.into());
    }

    pub fn is_bot(&self, nick: &str) -> bool {
        self.bot_nick.as_deref() == Some(nick)
    }

    /// Replace the displayed target's cache with a server snapshot.
    /// Returns `false` (and stores nothing) when nothing is displayed.
    pub fn replace_current(&mut self, messages: Vec<Message>) -> bool {
        let Some(key) = self.current().map(str::to_string) else {
            return false;
        };
        self.cache.insert(key, messages);
        true
    }

    /// Seed the cache for `key` wholesale.
    pub fn store(&mut self, key: impl Into<String>, messages: Vec<Message>) {
        self.cache.insert(key.into(), messages);
    }

    /// Append a pushed message. `channel == None` means the displayed
    /// target. Pushes that arrive before anything is displayed are dropped.
    pub fn append(&mut self, channel: Option<String>, message: Message) -> Option<Appended> {
        let current = self.current()?.to_string();
        let key = channel.unwrap_or_else(|| current.clone());
        self.cache.entry(key.clone()).or_default().push(message);
        Some(Appended {
            displayed: key == current,
            key,
        })
    }

    /// Cached messages for `key`; empty when never fetched.
    pub fn messages(&self, key: &str) -> &[Message] {
        self.cache.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn current_messages(&self) -> &[Message] {
        self.current().map(|c| self.messages(c)).unwrap_or(&[])
    }

    pub fn is_cached(&self, key: &str) -> bool {
        self.cache.contains_key(key)
    }
}
