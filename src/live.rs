//! Live chat view: the push-driven channel/query client.
//!
//! [`LiveChat`] owns the [`Session`] and turns relay events and user
//! actions into [`ViewUpdate`]s and [`ClientEvent`]s. Every emission is
//! fire-and-forget; local state only follows confirmations from the relay,
//! except for the join dialog which switches immediately.

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::cli::InputCommand;
use crate::protocol::{
    sort_users, ChannelList, ClientEvent, JoinedChannel, MessageSnapshot, OpenedQuery,
    PushedMessage, ServerEvent, Topic, UserList, WebchatStatus,
};
use crate::render::{View, ViewUpdate};
use crate::session::Session;
use crate::socketio::{Emit, Inbound};

pub const STATUS_CONNECTED: &str = "Bot connected. You can chat!";
pub const STATUS_UNAVAILABLE: &str = "Bot is not connected. Webchat is unavailable.";
pub const NO_TOPIC: &str = "No topic set";

pub struct LiveChat<E, V> {
    session: Session,
    emitter: E,
    view: V,
}

impl<E: Emit, V: View> LiveChat<E, V> {
    pub fn new(emitter: E, view: V, initial_channel: Option<String>) -> Self {
        LiveChat {
            session: Session::new(initial_channel),
            emitter,
            view,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    /// Ask the relay for the initial state.
    pub fn start(&self) {
        self.emitter.emit(ClientEvent::Init);
    }

    pub fn handle(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::Status(s) => self.on_status(s),
            ServerEvent::Channels(c) => self.on_channels(c),
            ServerEvent::Users(u) => self.on_users(u),
            ServerEvent::Messages(m) => self.on_messages(m),
            ServerEvent::Message(m) => self.on_push(m),
            ServerEvent::Topic(t) => self.on_topic(t),
            ServerEvent::JoinedChannel(j) => self.on_joined(j),
            ServerEvent::OpenedQuery(q) => self.on_query(q),
            other => debug!(event = other.name(), "live view ignoring event"),
        }
    }

    fn on_status(&mut self, status: WebchatStatus) {
        if !status.connected {
            self.view.apply(ViewUpdate::Status(STATUS_UNAVAILABLE.to_string()));
            return;
        }
        self.view.apply(ViewUpdate::Status(STATUS_CONNECTED.to_string()));
        if let Some(nick) = status.nick {
            self.session.set_bot_nick(nick);
        }
        if let Some(channel) = self.session.current_channel() {
            info!(channel, "joining initial channel");
            self.emitter.emit(ClientEvent::JoinChannel {
                channel: channel.to_string(),
            });
        }
    }

    fn on_channels(&mut self, list: ChannelList) {
        debug!(count = list.channels.len(), "channel list update");
        self.view.apply(ViewUpdate::Channels {
            names: list.channels,
            highlighted: self.session.current_channel().map(str::to_string),
        });
    }

    fn on_users(&mut self, list: UserList) {
        let mut users = list.users;
        debug!(count = users.len(), "user list update");
        sort_users(&mut users);
        self.view.apply(ViewUpdate::Users(users));
    }

    fn on_messages(&mut self, snapshot: MessageSnapshot) {
        if self.session.replace_current(snapshot.messages) {
            self.render_messages();
        }
    }

    fn on_push(&mut self, pushed: PushedMessage) {
        let (channel, message) = pushed.into_parts();
        if let Some(appended) = self.session.append(channel, message) {
            if appended.displayed {
                self.render_messages();
            }
        }
    }

    fn on_topic(&mut self, topic: Topic) {
        let current = self.session.current_channel();
        if current.is_none() || topic.channel.as_deref() != current {
            return;
        }
        let text = topic
            .topic
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| NO_TOPIC.to_string());
        self.view.apply(ViewUpdate::Topic(text));
    }

    fn on_joined(&mut self, joined: JoinedChannel) {
        info!(channel = %joined.channel, "joined channel");
        self.switch_to(joined.channel);
    }

    fn on_query(&mut self, query: OpenedQuery) {
        info!(nick = %query.nick, "opened private query");
        self.session.open_query(query.nick.clone());
        self.view.apply(ViewUpdate::Highlight(None));
        self.view
            .apply(ViewUpdate::Topic(format!("Private chat with {}", query.nick)));
        self.session
            .store(query.nick, query.messages.unwrap_or_default());
        self.render_messages();
    }

    /// Channel click: switch and refresh everything from the relay.
    pub fn select_channel(&mut self, name: &str) {
        self.switch_to(name.to_string());
    }

    fn switch_to(&mut self, channel: String) {
        self.session.select_channel(channel.clone());
        self.view.apply(ViewUpdate::Highlight(Some(channel.clone())));
        self.request_channel_state(&channel);
        self.render_messages();
    }

    fn request_channel_state(&self, channel: &str) {
        self.emitter.emit(ClientEvent::GetTopic {
            channel: channel.to_string(),
        });
        self.emitter.emit(ClientEvent::UsersRequest {
            channel: channel.to_string(),
        });
        self.emitter.emit(ClientEvent::MessagesRequest {
            channel: channel.to_string(),
        });
    }

    fn render_messages(&mut self) {
        let msgs = self.session.current_messages().to_vec();
        self.view.apply(ViewUpdate::Messages(msgs));
    }

    /// Send `text` to the displayed channel or query. Returns whether
    /// anything was emitted.
    pub fn send_message(&mut self, text: &str) -> bool {
        let text = text.trim();
        let Some(target) = self.session.current() else {
            return false;
        };
        if text.is_empty() {
            return false;
        }
        self.emitter.emit(ClientEvent::SendMessage {
            channel: target.to_string(),
            message: text.to_string(),
        });
        self.view.apply(ViewUpdate::InputCleared);
        true
    }

    /// Join dialog confirm. Switches the highlight right away; the relay's
    /// `webchat_joined_channel` does the rest.
    pub fn confirm_join(&mut self, input: &str) -> bool {
        let channel = input.trim();
        if channel.is_empty() {
            return false;
        }
        self.emitter.emit(ClientEvent::JoinChannel {
            channel: channel.to_string(),
        });
        self.session.select_channel(channel);
        self.view
            .apply(ViewUpdate::Highlight(Some(channel.to_string())));
        true
    }

    pub fn part_current(&self) -> bool {
        match self.session.current() {
            Some(channel) => {
                self.emitter.emit(ClientEvent::PartChannel {
                    channel: channel.to_string(),
                });
                true
            }
            None => false,
        }
    }

    /// User list click. Clicking the bot itself does nothing.
    pub fn open_query(&self, nick: &str) -> bool {
        if self.session.is_bot(nick) {
            return false;
        }
        self.emitter.emit(ClientEvent::OpenQuery {
            nick: nick.to_string(),
        });
        true
    }

    /// Set the topic of the displayed channel. Queries have no topic.
    pub fn set_topic(&self, topic: &str) -> bool {
        let Some(channel) = self.session.current_channel() else {
            return false;
        };
        self.emitter.emit(ClientEvent::SetTopic {
            channel: channel.to_string(),
            topic: topic.trim().to_string(),
        });
        true
    }
}

/// Drive a [`LiveChat`] until `input` closes.
///
/// `webchat_init` goes out immediately and is queued until the channel
/// connects. A reconnect asks for the full state again.
pub async fn run<E: Emit, V: View>(
    mut chat: LiveChat<E, V>,
    mut inbound: mpsc::UnboundedReceiver<Inbound>,
    mut input: mpsc::UnboundedReceiver<InputCommand>,
) -> LiveChat<E, V> {
    chat.start();
    // Only a drop after the first connect calls for a resync; the start
    // above already covers a channel that comes up late.
    let mut seen_connected = false;
    let mut dropped = false;
    let mut inbound_open = true;

    loop {
        tokio::select! {
            msg = inbound.recv(), if inbound_open => match msg {
                Some(Inbound::Connected) if dropped => {
                    info!("event channel reconnected, resyncing");
                    dropped = false;
                    chat.start();
                }
                Some(Inbound::Connected) => {
                    debug!("event channel connected");
                    seen_connected = true;
                }
                Some(Inbound::Disconnected) => {
                    warn!("event channel lost");
                    dropped = seen_connected;
                }
                Some(Inbound::Event(ev)) => chat.handle(ev),
                None => inbound_open = false,
            },
            cmd = input.recv() => match cmd {
                Some(cmd) => dispatch(&mut chat, cmd),
                None => break,
            },
        }
    }

    chat
}

fn dispatch<E: Emit, V: View>(chat: &mut LiveChat<E, V>, cmd: InputCommand) {
    let handled = match &cmd {
        InputCommand::Say(text) => chat.send_message(text),
        InputCommand::Join(channel) => chat.confirm_join(channel),
        InputCommand::Part => chat.part_current(),
        InputCommand::Query(nick) => chat.open_query(nick),
        InputCommand::Switch(channel) => {
            chat.select_channel(channel);
            true
        }
        InputCommand::Topic(topic) => chat.set_topic(topic),
        InputCommand::Test
        | InputCommand::Submit(_)
        | InputCommand::Quit
        | InputCommand::Unknown(_) => false,
    };
    if !handled {
        debug!(?cmd, "command had no effect");
    }
}
