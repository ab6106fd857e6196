//! Dashboard status binder.
//!
//! Mirrors the bot's connection state onto the dashboard: status badges,
//! `server:port` displays, and the connect/disconnect button pair. Also
//! owns the small page behaviors that sit next to them: submit spinners,
//! flash banner auto-dismiss, and the one-shot "test connection" call.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::DashboardConfig;
use crate::error::{Result, WebchatError};
use crate::protocol::{BotStatus, ServerEvent};
use crate::render::{View, ViewUpdate};
use crate::socketio::Inbound;

/// Which dashboard elements exist on the page being driven.
#[derive(Debug, Clone)]
pub struct DashboardPage {
    /// Connection status badges.
    pub indicators: bool,
    /// `server:port` displays.
    pub server_displays: bool,
    pub connect_buttons: bool,
    /// Names of forms with a submit button.
    pub forms: Vec<String>,
    /// Number of flash banners shown on load.
    pub flashes: usize,
    pub test_button: bool,
}

impl Default for DashboardPage {
    fn default() -> Self {
        Self {
            indicators: true,
            server_displays: true,
            connect_buttons: true,
            forms: Vec::new(),
            flashes: 0,
            test_button: true,
        }
    }
}

/// A page with the default elements plus the configured forms and flashes.
impl From<&DashboardConfig> for DashboardPage {
    fn from(config: &DashboardConfig) -> Self {
        Self {
            forms: config.forms.clone(),
            flashes: config.flashes,
            ..Self::default()
        }
    }
}

/// `(connect_enabled, disconnect_enabled)` for a connection state.
pub fn button_states(connected: bool) -> (bool, bool) {
    (!connected, connected)
}

// ---------------------------------------------------------------------------
// Flash timers
// ---------------------------------------------------------------------------

/// Hide deadlines for flash banners.
#[derive(Debug, Default)]
pub struct FlashTimers {
    pending: Vec<(usize, Instant)>,
}

impl FlashTimers {
    pub fn arm(&mut self, id: usize, now: Instant, after: Duration) {
        self.pending.push((id, now + after));
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.iter().map(|(_, at)| *at).min()
    }

    /// Remove and return every banner whose deadline is at or before `now`.
    pub fn expire(&mut self, now: Instant) -> Vec<usize> {
        let mut due = Vec::new();
        self.pending.retain(|(id, at)| {
            if *at <= now {
                due.push(*id);
                false
            } else {
                true
            }
        });
        due.sort_unstable();
        due
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Test connection
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct TestRequest {
    pub provider: String,
    pub api_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TestResponse {
    pub success: bool,
    pub message: String,
}

/// `POST /ai_settings/test_connection`.
///
/// The endpoint answers failures with a 4xx/5xx *and* a JSON body; the body
/// wins whenever it parses.
pub async fn test_connection(
    client: &reqwest::Client,
    base_url: &str,
    body: Option<&TestRequest>,
) -> Result<TestResponse> {
    let url = format!("{}/ai_settings/test_connection", base_url.trim_end_matches('/'));
    let mut req = client.post(&url);
    req = match body {
        Some(b) => req.json(b),
        None => req.header(reqwest::header::CONTENT_TYPE, "application/json"),
    };
    let resp = req.send().await.map_err(|e| WebchatError::Connect {
        url: url.clone(),
        detail: e.to_string(),
    })?;

    let status = resp.status();
    let bytes = resp.bytes().await.map_err(|e| WebchatError::Connect {
        url: url.clone(),
        detail: e.to_string(),
    })?;
    match serde_json::from_slice::<TestResponse>(&bytes) {
        Ok(parsed) => Ok(parsed),
        Err(_) if !status.is_success() => Err(WebchatError::Http {
            status: status.as_u16(),
            url,
        }),
        Err(e) => Err(WebchatError::json(url, e)),
    }
}

// ---------------------------------------------------------------------------
// Binder
// ---------------------------------------------------------------------------

pub struct DashboardBinder<V> {
    page: DashboardPage,
    flash: FlashTimers,
    testing: bool,
    view: V,
}

impl<V: View> DashboardBinder<V> {
    pub fn new(page: DashboardPage, view: V) -> Self {
        Self {
            page,
            flash: FlashTimers::default(),
            testing: false,
            view,
        }
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    pub fn flash_timers(&self) -> &FlashTimers {
        &self.flash
    }

    /// Start the dismiss timer of every flash banner on the page.
    pub fn bind_flashes(&mut self, now: Instant, after: Duration) {
        for id in 0..self.page.flashes {
            self.flash.arm(id, now, after);
        }
    }

    pub fn expire_flashes(&mut self, now: Instant) {
        for id in self.flash.expire(now) {
            self.view.apply(ViewUpdate::FlashHidden { id });
        }
    }

    pub fn handle(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::StatusUpdate(status) => self.on_status(status),
            other => debug!(event = other.name(), "dashboard ignoring event"),
        }
    }

    pub fn on_status(&mut self, status: BotStatus) {
        info!(connected = status.connected, "bot status update");
        if self.page.indicators {
            self.view.apply(ViewUpdate::Connection {
                connected: status.connected,
            });
        }

        if self.page.server_displays {
            let server = status.server.as_deref().unwrap_or("undefined");
            let port = status.port.as_deref().unwrap_or("undefined");
            self.view
                .apply(ViewUpdate::ServerAddress(format!("{server}:{port}")));
        }

        if self.page.connect_buttons {
            let (connect_enabled, disconnect_enabled) = button_states(status.connected);
            self.view.apply(ViewUpdate::ConnectButtons {
                connect_enabled,
                disconnect_enabled,
            });
        } else {
            debug!("connect/disconnect buttons not present, skipping");
        }
    }

    /// Form submit: disable its button and show the spinner.
    pub fn submit(&mut self, form: &str) -> bool {
        if !self.page.forms.iter().any(|f| f == form) {
            warn!(form, "submit for unknown form");
            return false;
        }
        self.view.apply(ViewUpdate::SubmitBusy {
            form: form.to_string(),
        });
        true
    }

    /// Returns `false` when there is no test button or a test is running.
    pub fn begin_test(&mut self) -> bool {
        if !self.page.test_button {
            error!("test connection button not found");
            return false;
        }
        if self.testing {
            return false;
        }
        self.testing = true;
        self.view.apply(ViewUpdate::TestPending(true));
        true
    }

    pub fn finish_test(&mut self, result: Result<TestResponse>) {
        self.testing = false;
        let update = match result {
            Ok(resp) => ViewUpdate::TestResult {
                success: resp.success,
                message: resp.message,
            },
            Err(e) => {
                error!(error = %e, "test connection failed");
                ViewUpdate::TestResult {
                    success: false,
                    message: format!("Error testing connection: {e}"),
                }
            }
        };
        self.view.apply(update);
        self.view.apply(ViewUpdate::TestPending(false));
    }
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DashboardCommand {
    TestConnection,
    Submit(String),
}

/// Everything the runner needs to reach the relay.
pub struct DashboardDeps {
    pub client: reqwest::Client,
    pub base_url: String,
    pub test_body: Option<TestRequest>,
    pub flash_dismiss: Duration,
}

/// Drive a [`DashboardBinder`] until `commands` closes.
pub async fn run<V: View>(
    mut binder: DashboardBinder<V>,
    deps: DashboardDeps,
    mut inbound: mpsc::UnboundedReceiver<Inbound>,
    mut commands: mpsc::UnboundedReceiver<DashboardCommand>,
) -> DashboardBinder<V> {
    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<Result<TestResponse>>();
    binder.bind_flashes(Instant::now(), deps.flash_dismiss);
    let mut inbound_open = true;

    loop {
        let deadline = binder.flash_timers().next_deadline();
        tokio::select! {
            _ = async { tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)).await }, if deadline.is_some() => {
                binder.expire_flashes(Instant::now());
            }
            msg = inbound.recv(), if inbound_open => match msg {
                Some(Inbound::Event(ev)) => binder.handle(ev),
                Some(other) => debug!(?other, "dashboard channel state"),
                None => inbound_open = false,
            },
            Some(result) = done_rx.recv() => binder.finish_test(result),
            cmd = commands.recv() => match cmd {
                Some(DashboardCommand::TestConnection) => {
                    if binder.begin_test() {
                        let client = deps.client.clone();
                        let base_url = deps.base_url.clone();
                        let body = deps.test_body.clone();
                        let tx = done_tx.clone();
                        tokio::spawn(async move {
                            let _ = tx.send(test_connection(&client, &base_url, body.as_ref()).await);
                        });
                    }
                }
                Some(DashboardCommand::Submit(form)) => {
                    binder.submit(&form);
                }
                None => break,
            },
        }
    }

    binder
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
