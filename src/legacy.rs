//! Legacy polling chat view.
//!
//! Deprecated: superseded by [`crate::live`]. Kept so pages still wired to
//! the old JSON API keep working.
//!
//! ## Sources
//! - HTTP polls of `/api/get_messages` (1.5 s) and `/api/get_users` (2.0 s).
//! - `user_list_update` / `message_update` pushes on the event channel.
//!
//! Push is the source of truth. Under [`PollPolicy::Fallback`] the poll
//! timers only fire requests while the push channel is down;
//! [`PollPolicy::Always`] restores the old always-on parallel polling.
//!
//! Poll failures are logged and dropped until the next tick. There is no
//! retry or backoff.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::{LegacyConfig, PollPolicy};
use crate::error::{Result, WebchatError};
use crate::protocol::{LegacyNick, Message, ServerEvent};
use crate::render::{View, ViewUpdate};
use crate::socketio::Inbound;

// ---------------------------------------------------------------------------
// HTTP API
// ---------------------------------------------------------------------------

/// `{success, messages?, users?, error?}` envelope shared by the API.
#[derive(Debug, Deserialize)]
struct Envelope {
    success: bool,
    #[serde(default)]
    messages: Option<Vec<Message>>,
    #[serde(default)]
    users: Option<Vec<LegacyNick>>,
    #[serde(default)]
    error: Option<String>,
}

impl Envelope {
    fn into_result(mut self) -> Result<Self> {
        if self.success {
            Ok(self)
        } else {
            Err(WebchatError::Api(
                self.error.take().unwrap_or_else(|| "Unknown error".to_string()),
            ))
        }
    }
}

#[derive(Debug, Serialize)]
struct SendBody<'a> {
    message: &'a str,
    channel: &'a str,
}

/// Thin client for the legacy JSON endpoints. Cheap to clone.
#[derive(Debug, Clone)]
pub struct LegacyApi {
    base_url: String,
    client: reqwest::Client,
}

impl LegacyApi {
    pub fn new(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    async fn get(&self, path: &str, channel: &str) -> Result<Envelope> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .get(&url)
            .query(&[("channel", channel)])
            .send()
            .await
            .map_err(|e| WebchatError::Connect {
                url: url.clone(),
                detail: e.to_string(),
            })?;
        Self::decode(url, resp).await
    }

    async fn decode(url: String, resp: reqwest::Response) -> Result<Envelope> {
        if !resp.status().is_success() {
            return Err(WebchatError::Http {
                status: resp.status().as_u16(),
                url,
            });
        }
        let bytes = resp.bytes().await.map_err(|e| WebchatError::Connect {
            url: url.clone(),
            detail: e.to_string(),
        })?;
        let env: Envelope = serde_json::from_slice(&bytes).map_err(|e| WebchatError::json(url, e))?;
        env.into_result()
    }

    /// `GET /api/get_messages?channel=`
    pub async fn fetch_messages(&self, channel: &str) -> Result<Vec<Message>> {
        let env = self.get("/api/get_messages", channel).await?;
        let messages = env.messages.unwrap_or_default();
        debug!(channel, count = messages.len(), "fetched messages");
        Ok(messages)
    }

    /// `GET /api/get_users?channel=`
    pub async fn fetch_users(&self, channel: &str) -> Result<Vec<String>> {
        let env = self.get("/api/get_users", channel).await?;
        let users: Vec<String> = env
            .users
            .unwrap_or_default()
            .into_iter()
            .map(LegacyNick::into_nick)
            .collect();
        debug!(channel, count = users.len(), "fetched users");
        Ok(users)
    }

    /// `POST /api/send_message`
    pub async fn send_message(&self, channel: &str, message: &str) -> Result<()> {
        let url = format!("{}/api/send_message", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(&SendBody { message, channel })
            .send()
            .await
            .map_err(|e| WebchatError::Connect {
                url: url.clone(),
                detail: e.to_string(),
            })?;
        Self::decode(url, resp).await.map(|_| ())
    }
}

// ---------------------------------------------------------------------------
// Change detection and the bounded log
// ---------------------------------------------------------------------------

/// Remembers the last rendered payload and reports whether a new one
/// differs by structural equality.
#[derive(Debug, Clone, Default)]
pub struct ChangeDetector<T> {
    last: T,
}

impl<T: PartialEq> ChangeDetector<T> {
    pub fn new(initial: T) -> Self {
        Self { last: initial }
    }

    /// Store `next` and return `true` if it differs from the last payload.
    pub fn observe(&mut self, next: T) -> bool {
        if next == self.last {
            return false;
        }
        self.last = next;
        true
    }

    /// Store `next` unconditionally (push updates always render).
    pub fn set(&mut self, next: T) {
        self.last = next;
    }

    pub fn last(&self) -> &T {
        &self.last
    }
}

/// Message log capped at `cap` entries; the oldest entry is evicted first.
#[derive(Debug, Clone)]
pub struct MessageLog {
    entries: VecDeque<Message>,
    cap: usize,
}

impl MessageLog {
    pub fn new(cap: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(cap.min(1024)),
            cap,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn push(&mut self, message: Message) {
        if self.cap == 0 {
            return;
        }
        if self.entries.len() == self.cap {
            self.entries.pop_front();
        }
        self.entries.push_back(message);
    }

    /// Replace the log with the tail of `fetched` if it differs from what is
    /// stored. Returns whether anything changed.
    pub fn replace_if_changed(&mut self, fetched: Vec<Message>) -> bool {
        let skip = fetched.len().saturating_sub(self.cap);
        let tail = &fetched[skip..];
        if self.entries.iter().eq(tail.iter()) {
            return false;
        }
        self.entries = tail.iter().cloned().collect();
        true
    }

    pub fn to_vec(&self) -> Vec<Message> {
        self.entries.iter().cloned().collect()
    }
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

pub struct LegacyChat<V> {
    channel: Option<String>,
    log: MessageLog,
    users: ChangeDetector<Vec<String>>,
    policy: PollPolicy,
    push_connected: bool,
    view: V,
}

impl<V: View> LegacyChat<V> {
    pub fn new(channel: Option<String>, config: &LegacyConfig, view: V) -> Self {
        warn!("legacy chat view is deprecated; use the live view instead");
        debug!(channel = ?channel, "legacy chat initialized");
        Self {
            channel,
            log: MessageLog::new(config.max_messages),
            users: ChangeDetector::default(),
            policy: config.poll_policy,
            push_connected: false,
            view,
        }
    }

    pub fn channel(&self) -> Option<&str> {
        self.channel.as_deref()
    }

    pub fn log(&self) -> &MessageLog {
        &self.log
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    pub fn set_push_connected(&mut self, connected: bool) {
        if self.push_connected != connected {
            info!(connected, "legacy push channel state changed");
        }
        self.push_connected = connected;
    }

    /// Whether a poll tick should issue a request.
    pub fn should_poll(&self) -> bool {
        if self.channel.is_none() {
            debug!("no channel selected, skipping fetch");
            return false;
        }
        match self.policy {
            PollPolicy::Always => true,
            PollPolicy::Fallback => !self.push_connected,
        }
    }

    pub fn on_messages_fetched(&mut self, result: Result<Vec<Message>>) {
        match result {
            Ok(messages) => {
                if self.log.replace_if_changed(messages) {
                    self.render_messages();
                }
            }
            Err(e) => error!(error = %e, "failed to fetch messages"),
        }
    }

    pub fn on_users_fetched(&mut self, result: Result<Vec<String>>) {
        match result {
            Ok(users) => {
                if self.users.observe(users) {
                    self.render_users();
                }
            }
            Err(e) => error!(error = %e, "failed to fetch users"),
        }
    }

    /// Push updates for this view's channel; everything else is ignored.
    pub fn handle(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::UserListUpdate(update) if self.is_current(&update.channel) => {
                debug!(channel = %update.channel, "user list push");
                self.users.set(update.nicks());
                self.render_users();
            }
            ServerEvent::MessageUpdate(update) if self.is_current(&update.channel) => {
                debug!(channel = %update.channel, "message push");
                self.log.push(update.message);
                self.render_messages();
            }
            other => debug!(event = other.name(), "legacy view ignoring event"),
        }
    }

    fn is_current(&self, channel: &str) -> bool {
        self.channel.as_deref() == Some(channel)
    }

    fn render_messages(&mut self) {
        self.view.apply(ViewUpdate::LegacyMessages(self.log.to_vec()));
    }

    fn render_users(&mut self) {
        let mut nicks = self.users.last().clone();
        nicks.sort();
        self.view.apply(ViewUpdate::PlainUsers(nicks));
    }

    /// Validate a form submit. Returns `(channel, message)` to post, or
    /// `None` when nothing should be sent.
    pub fn prepare_send(&mut self, text: &str) -> Option<(String, String)> {
        let text = text.trim();
        let channel = self.channel.clone()?;
        if text.is_empty() {
            return None;
        }
        self.view.apply(ViewUpdate::InputCleared);
        Some((channel, text.to_string()))
    }

    pub fn on_send_result(&mut self, result: Result<()>) {
        match result {
            Ok(()) => {}
            Err(WebchatError::Api(msg)) => {
                error!(error = %msg, "failed to send message");
                self.view
                    .apply(ViewUpdate::Alert(format!("Failed to send message: {msg}")));
            }
            Err(e) => {
                error!(error = %e, "error sending message");
                self.view
                    .apply(ViewUpdate::Alert(format!("Error sending message: {e}")));
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

enum Fetched {
    Messages(Result<Vec<Message>>),
    Users(Result<Vec<String>>),
    Sent(Result<()>),
}

/// Drive a [`LegacyChat`] until `input` closes.
///
/// Requests run as detached tasks and report back through a channel, so a
/// slow fetch never delays push handling. Overlapping fetches are harmless:
/// each result is a full replace.
pub async fn run<V: View>(
    mut chat: LegacyChat<V>,
    api: LegacyApi,
    config: &LegacyConfig,
    mut inbound: mpsc::UnboundedReceiver<Inbound>,
    mut input: mpsc::UnboundedReceiver<String>,
) -> LegacyChat<V> {
    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<Fetched>();

    let mut messages_tick = tokio::time::interval(config.messages_interval());
    messages_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut users_tick = tokio::time::interval(config.users_interval());
    users_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut inbound_open = true;

    loop {
        tokio::select! {
            _ = messages_tick.tick() => {
                if chat.should_poll() {
                    if let Some(channel) = chat.channel().map(str::to_string) {
                        let api = api.clone();
                        let tx = done_tx.clone();
                        tokio::spawn(async move {
                            let _ = tx.send(Fetched::Messages(api.fetch_messages(&channel).await));
                        });
                    }
                }
            }
            _ = users_tick.tick() => {
                if chat.should_poll() {
                    if let Some(channel) = chat.channel().map(str::to_string) {
                        let api = api.clone();
                        let tx = done_tx.clone();
                        tokio::spawn(async move {
                            let _ = tx.send(Fetched::Users(api.fetch_users(&channel).await));
                        });
                    }
                }
            }
            Some(done) = done_rx.recv() => match done {
                Fetched::Messages(r) => chat.on_messages_fetched(r),
                Fetched::Users(r) => chat.on_users_fetched(r),
                Fetched::Sent(r) => chat.on_send_result(r),
            },
            msg = inbound.recv(), if inbound_open => match msg {
                Some(Inbound::Connected) => chat.set_push_connected(true),
                Some(Inbound::Disconnected) => chat.set_push_connected(false),
                Some(Inbound::Event(ev)) => chat.handle(ev),
                None => {
                    inbound_open = false;
                    chat.set_push_connected(false);
                }
            },
            line = input.recv() => match line {
                Some(text) => {
                    if let Some((channel, message)) = chat.prepare_send(&text) {
                        let api = api.clone();
                        let tx = done_tx.clone();
                        tokio::spawn(async move {
                            let _ = tx.send(Fetched::Sent(api.send_message(&channel, &message).await));
                        });
                    }
                }
                None => break,
            },
        }
    }

    chat
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
