//! Declarative view layer.
//!
//! Controllers never build markup. They describe what a pane should show as
//! a [`ViewUpdate`] and hand it to a [`View`]. Two sinks ship with the crate:
//! [`HtmlView`] produces escaped HTML fragments per pane, [`TerminalView`]
//! writes colored lines to a terminal.

use colored::*;
use maud::{html, Markup, Render};
use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;

use crate::protocol::{Message, User};

// ---------------------------------------------------------------------------
// Nick colors
// ---------------------------------------------------------------------------

/// An HSL color; saturation and lightness are percentages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Hsl {
    pub hue: u16,
    pub saturation: u8,
    pub lightness: u8,
}

impl Hsl {
    pub fn to_rgb(self) -> (u8, u8, u8) {
        let h = f64::from(self.hue) / 360.0;
        let s = f64::from(self.saturation) / 100.0;
        let l = f64::from(self.lightness) / 100.0;

        let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
        let p = 2.0 * l - q;
        let channel = |mut t: f64| {
            if t < 0.0 {
                t += 1.0;
            }
            if t > 1.0 {
                t -= 1.0;
            }
            let v = if t < 1.0 / 6.0 {
                p + (q - p) * 6.0 * t
            } else if t < 0.5 {
                q
            } else if t < 2.0 / 3.0 {
                p + (q - p) * (2.0 / 3.0 - t) * 6.0
            } else {
                p
            };
            (v * 255.0).round().clamp(0.0, 255.0) as u8
        };
        (channel(h + 1.0 / 3.0), channel(h), channel(h - 1.0 / 3.0))
    }
}

impl fmt::Display for Hsl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "hsl({}, {}%, {}%)", self.hue, self.saturation, self.lightness)
    }
}

/// Rolling hash over UTF-16 code units: `hash = c + (hash << 5) - hash`,
/// where the shift operates on the low 32 bits.
pub fn nick_hash(nick: &str) -> i64 {
    nick.encode_utf16().fold(0i64, |hash, unit| {
        let shifted = i64::from((hash as i32).wrapping_shl(5));
        i64::from(unit).wrapping_add(shifted.wrapping_sub(hash))
    })
}

/// Deterministic color for a nick. Different nicks may collide.
pub fn nick_color(nick: &str) -> Hsl {
    let hash = nick_hash(nick);
    Hsl {
        hue: (hash % 360).unsigned_abs() as u16,
        saturation: 70 + (hash % 30).unsigned_abs() as u8,
        lightness: 40 + (hash % 20).unsigned_abs() as u8,
    }
}

// ---------------------------------------------------------------------------
// View model
// ---------------------------------------------------------------------------

/// One declarative change to a pane.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewUpdate {
    /// Connection status line of the live view.
    Status(String),
    /// Full channel list plus the highlighted entry.
    Channels {
        names: Vec<String>,
        highlighted: Option<String>,
    },
    /// Re-highlight the existing channel list; `None` clears it.
    Highlight(Option<String>),
    /// User list, already in display order.
    Users(Vec<User>),
    /// Full message pane replace. Sinks pin the pane to the bottom.
    Messages(Vec<Message>),
    Topic(String),
    /// Clear the chat input after a send.
    InputCleared,

    /// Legacy view: plain nick list.
    PlainUsers(Vec<String>),
    /// Legacy view: message log.
    LegacyMessages(Vec<Message>),
    /// Blocking notice for a failed user action.
    Alert(String),

    /// Dashboard: every status indicator.
    Connection { connected: bool },
    /// Dashboard: every `server:port` display.
    ServerAddress(String),
    /// Dashboard: connect/disconnect pair. Exactly one is enabled.
    ConnectButtons {
        connect_enabled: bool,
        disconnect_enabled: bool,
    },
    /// Dashboard: a form's submit button switched to its busy state.
    SubmitBusy { form: String },
    /// Dashboard: flash banner `id` hidden.
    FlashHidden { id: usize },
    /// Dashboard: test-connection button busy (`true`) or restored.
    TestPending(bool),
    TestResult { success: bool, message: String },
}

/// Pane a [`ViewUpdate`] targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Pane {
    Status,
    ChannelList,
    UserList,
    Messages,
    Topic,
    Input,
    Alert,
    Indicators,
    Server,
    Buttons,
    Forms,
    Flash,
    TestButton,
    TestResult,
}

impl ViewUpdate {
    pub fn pane(&self) -> Pane {
        match self {
            ViewUpdate::Status(_) => Pane::Status,
            ViewUpdate::Channels { .. } | ViewUpdate::Highlight(_) => Pane::ChannelList,
            ViewUpdate::Users(_) | ViewUpdate::PlainUsers(_) => Pane::UserList,
            ViewUpdate::Messages(_) | ViewUpdate::LegacyMessages(_) => Pane::Messages,
            ViewUpdate::Topic(_) => Pane::Topic,
            ViewUpdate::InputCleared => Pane::Input,
            ViewUpdate::Alert(_) => Pane::Alert,
            ViewUpdate::Connection { .. } => Pane::Indicators,
            ViewUpdate::ServerAddress(_) => Pane::Server,
            ViewUpdate::ConnectButtons { .. } => Pane::Buttons,
            ViewUpdate::SubmitBusy { .. } => Pane::Forms,
            ViewUpdate::FlashHidden { .. } => Pane::Flash,
            ViewUpdate::TestPending(_) => Pane::TestButton,
            ViewUpdate::TestResult { .. } => Pane::TestResult,
        }
    }
}

/// A render sink.
pub trait View {
    fn apply(&mut self, update: ViewUpdate);
}

/// Records updates in order; handy for assertions and replay.
impl View for Vec<ViewUpdate> {
    fn apply(&mut self, update: ViewUpdate) {
        self.push(update);
    }
}

// ---------------------------------------------------------------------------
// HTML
// ---------------------------------------------------------------------------

const CHANNEL_ITEM: &str = "cursor-pointer px-4 py-2 hover:bg-indigo-100";
const CHANNEL_ACTIVE: &str = "bg-indigo-200";
const USER_ITEM: &str = "px-4 py-1 cursor-pointer hover:bg-indigo-100 user-list-item";

impl Render for Hsl {
    fn render_to(&self, buffer: &mut String) {
        buffer.push_str(&self.to_string());
    }
}

fn channel_items(names: &[String], highlighted: Option<&str>) -> Markup {
    html! {
        @for name in names {
            @let class = if highlighted == Some(name.as_str()) {
                format!("{CHANNEL_ITEM} {CHANNEL_ACTIVE}")
            } else {
                CHANNEL_ITEM.to_string()
            };
            li class=(class) data-channel=(name) { (name) }
        }
    }
}

fn message_line(msg: &Message) -> Markup {
    html! {
        div {
            span class="text-xs text-gray-400" { "[" (msg.timestamp) "]" }
            " "
            @match &msg.nick {
                None => {
                    span class="italic text-gray-500" { (msg.message) }
                }
                Some(nick) => {
                    span class="font-bold" style={ "color: " (nick_color(nick)) } { (nick) }
                    ": "
                    span { (msg.message) }
                }
            }
        }
    }
}

fn legacy_line(msg: &Message) -> Markup {
    html! {
        div class="mb-2" {
            span class="text-muted small" { "[" (msg.timestamp) "]" }
            " "
            @if let Some(nick) = &msg.nick {
                strong { (nick) }
                ": "
            }
            (msg.message)
        }
    }
}

fn button(label: &str, enabled: bool, active_class: &str) -> Markup {
    html! {
        @if enabled {
            button class=(active_class) { (label) }
        } @else {
            button class="bg-gray-400 cursor-not-allowed" disabled { (label) }
        }
    }
}

/// Markup for one update. Interpolated relay text is escaped by `maud`.
impl Render for ViewUpdate {
    fn render(&self) -> Markup {
        match self {
            ViewUpdate::Status(text) | ViewUpdate::Topic(text) | ViewUpdate::ServerAddress(text) => {
                html! { (text) }
            }
            ViewUpdate::Channels { names, highlighted } => channel_items(names, highlighted.as_deref()),
            ViewUpdate::Highlight(name) => html! {
                li data-highlight=(name.as_deref().unwrap_or("")) {}
            },
            ViewUpdate::Users(users) => html! {
                @for u in users {
                    li class=(USER_ITEM) data-nick=(u.nick) {
                        span class={ "badge " (u.mode.badge_class()) } {}
                        (u.nick)
                    }
                }
            },
            ViewUpdate::Messages(msgs) => html! {
                div id="chat-messages" data-scroll="bottom" {
                    @for msg in msgs { (message_line(msg)) }
                }
            },
            ViewUpdate::InputCleared => html! {},
            ViewUpdate::PlainUsers(nicks) => html! {
                @if nicks.is_empty() {
                    li class="list-group-item text-muted text-center" { "No users" }
                } @else {
                    @for nick in nicks {
                        li class="list-group-item" { (nick) }
                    }
                }
            },
            ViewUpdate::LegacyMessages(msgs) => html! {
                @if msgs.is_empty() {
                    div class="text-muted text-center p-3" { "No messages yet" }
                } @else {
                    div id="chat-messages" data-scroll="bottom" {
                        @for msg in msgs { (legacy_line(msg)) }
                    }
                }
            },
            ViewUpdate::Alert(text) => html! { div role="alert" { (text) } },
            ViewUpdate::Connection { connected } => html! {
                @if *connected {
                    span class="text-green-600 font-medium" { "Connected" }
                } @else {
                    span class="text-red-600 font-medium" { "Disconnected" }
                }
            },
            ViewUpdate::ConnectButtons {
                connect_enabled,
                disconnect_enabled,
            } => html! {
                (button("Connect", *connect_enabled, "bg-green-600 hover:bg-green-700"))
                (button("Disconnect", *disconnect_enabled, "bg-red-600 hover:bg-red-700"))
            },
            ViewUpdate::SubmitBusy { form } => html! {
                button type="submit" data-form=(form) disabled {
                    span class="spinner-border spinner-border-sm" role="status" aria-hidden="true" {}
                    " Saving..."
                }
            },
            ViewUpdate::FlashHidden { id } => html! {
                div class="flash-message" data-id=(id) style="display: none" {}
            },
            ViewUpdate::TestPending(busy) => html! {
                @if *busy {
                    button id="test-ai-connection" disabled {
                        i class="fas fa-spinner fa-spin mr-2" {}
                        "Testing..."
                    }
                } @else {
                    button id="test-ai-connection" {
                        i class="fas fa-plug mr-2" {}
                        "Test AI Connection"
                    }
                }
            },
            ViewUpdate::TestResult { success, message } => html! {
                p id="ai-test-message" class=(if *success { "text-green-600" } else { "text-red-600" }) {
                    (message)
                }
            },
        }
    }
}

/// Markup string for one update.
pub fn html_fragment(update: &ViewUpdate) -> String {
    update.render().into_string()
}

/// Keeps the latest fragment per pane.
#[derive(Debug, Default)]
pub struct HtmlView {
    panes: BTreeMap<Pane, String>,
    channels: Vec<String>,
}

impl HtmlView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pane(&self, pane: Pane) -> Option<&str> {
        self.panes.get(&pane).map(String::as_str)
    }
}

impl View for HtmlView {
    fn apply(&mut self, update: ViewUpdate) {
        let pane = update.pane();
        let markup = match &update {
            ViewUpdate::Channels { names, highlighted } => {
                self.channels = names.clone();
                channel_items(names, highlighted.as_deref())
            }
            // Re-highlighting redraws the list we already hold.
            ViewUpdate::Highlight(name) => channel_items(&self.channels, name.as_deref()),
            other => other.render(),
        };
        self.panes.insert(pane, markup.into_string());
    }
}

// ---------------------------------------------------------------------------
// Terminal
// ---------------------------------------------------------------------------

/// Writes updates as colored terminal lines.
pub struct TerminalView<W: Write> {
    out: W,
    channels: Vec<String>,
}

impl<W: Write> TerminalView<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            channels: Vec::new(),
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn channel_line(&self, highlighted: Option<&str>) -> String {
        self.channels
            .iter()
            .map(|c| {
                if highlighted == Some(c.as_str()) {
                    c.black().on_bright_cyan().to_string()
                } else {
                    c.bright_cyan().to_string()
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn message_line(msg: &Message) -> String {
        let ts = format!("[{}]", msg.timestamp).dimmed();
        match &msg.nick {
            None => format!("{ts} {}", msg.message.italic().bright_black()),
            Some(nick) => {
                let (r, g, b) = nick_color(nick).to_rgb();
                format!("{ts} {}: {}", nick.truecolor(r, g, b).bold(), msg.message)
            }
        }
    }

    fn lines(&self, update: &ViewUpdate) -> Vec<String> {
        match update {
            ViewUpdate::Status(text) => vec![text.bright_blue().to_string()],
            ViewUpdate::Channels { highlighted, .. } | ViewUpdate::Highlight(highlighted) => {
                vec![format!("{} {}", "channels:".bold(), self.channel_line(highlighted.as_deref()))]
            }
            ViewUpdate::Users(users) => {
                let names: Vec<String> = users
                    .iter()
                    .map(|u| format!("{}{}", u.mode.prefix().yellow(), u.nick))
                    .collect();
                vec![format!("{} {}", "users:".bold(), names.join(" "))]
            }
            ViewUpdate::PlainUsers(nicks) if nicks.is_empty() => vec!["No users".dimmed().to_string()],
            ViewUpdate::PlainUsers(nicks) => vec![format!("{} {}", "users:".bold(), nicks.join(" "))],
            ViewUpdate::Messages(msgs) => {
                let mut lines = vec!["─".repeat(40).dimmed().to_string()];
                lines.extend(msgs.iter().map(Self::message_line));
                lines
            }
            ViewUpdate::LegacyMessages(msgs) if msgs.is_empty() => {
                vec!["No messages yet".dimmed().to_string()]
            }
            ViewUpdate::LegacyMessages(msgs) => {
                let mut lines = vec!["─".repeat(40).dimmed().to_string()];
                lines.extend(msgs.iter().map(Self::message_line));
                lines
            }
            ViewUpdate::Topic(topic) => vec![format!("{} {}", "topic:".bold(), topic)],
            ViewUpdate::InputCleared => Vec::new(),
            ViewUpdate::Alert(text) => vec![format!("{} {}", "!".bright_red().bold(), text.bright_red())],
            ViewUpdate::Connection { connected: true } => {
                vec![format!("Status: {}", "Connected".bright_green())]
            }
            ViewUpdate::Connection { connected: false } => {
                vec![format!("Status: {}", "Disconnected".bright_red())]
            }
            ViewUpdate::ServerAddress(addr) => vec![format!("Server: {addr}")],
            ViewUpdate::ConnectButtons {
                connect_enabled,
                disconnect_enabled,
            } => {
                let mark = |on: bool, label: &str| {
                    if on {
                        label.bold().to_string()
                    } else {
                        label.dimmed().strikethrough().to_string()
                    }
                };
                vec![format!(
                    "[{}] [{}]",
                    mark(*connect_enabled, "connect"),
                    mark(*disconnect_enabled, "disconnect")
                )]
            }
            ViewUpdate::SubmitBusy { form } => vec![format!("{form}: Saving...")],
            ViewUpdate::FlashHidden { .. } => Vec::new(),
            ViewUpdate::TestPending(true) => vec!["Testing...".dimmed().to_string()],
            ViewUpdate::TestPending(false) => Vec::new(),
            ViewUpdate::TestResult { success: true, message } => vec![message.bright_green().to_string()],
            ViewUpdate::TestResult { success: false, message } => vec![message.bright_red().to_string()],
        }
    }
}

impl<W: Write> View for TerminalView<W> {
    fn apply(&mut self, update: ViewUpdate) {
        if let ViewUpdate::Channels { names, .. } = &update {
            self.channels = names.clone();
        }
        for line in self.lines(&update) {
            if let Err(e) = writeln!(self.out, "{line}") {
                tracing::warn!(error = %e, "terminal write failed");
                return;
            }
        }
        let _ = self.out.flush();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
