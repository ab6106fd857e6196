use clap::Parser;
use std::io::{self, Write};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_stream::wrappers::LinesStream;
use tokio_stream::StreamExt;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use relay_webchat::cli::{Args, InputCommand, ViewKind};
use relay_webchat::config::Config;
use relay_webchat::dashboard::{
    self, DashboardBinder, DashboardCommand, DashboardDeps, DashboardPage, TestRequest,
};
use relay_webchat::legacy::{self, LegacyApi, LegacyChat};
use relay_webchat::live::{self, LiveChat};
use relay_webchat::render::{HtmlView, TerminalView, View, ViewUpdate};
use relay_webchat::socketio::{websocket_url, ChannelConfig, EventChannel};

// ---------------------------------------------------------------------------
// Output sinks
// ---------------------------------------------------------------------------

/// Prints the redrawn pane after every update.
struct HtmlPrinter<W: Write> {
    panes: HtmlView,
    out: W,
}

impl<W: Write> View for HtmlPrinter<W> {
    fn apply(&mut self, update: ViewUpdate) {
        let pane = update.pane();
        self.panes.apply(update);
        if let Some(html) = self.panes.pane(pane) {
            if let Err(e) = writeln!(self.out, "<!-- {pane:?} -->\n{html}") {
                warn!(error = %e, "stdout write failed");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Stdin
// ---------------------------------------------------------------------------

/// Forward parsed stdin lines until EOF or `/quit`.
fn spawn_stdin<T, F>(map: F) -> mpsc::UnboundedReceiver<T>
where
    T: Send + 'static,
    F: Fn(InputCommand) -> Option<T> + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let mut lines = LinesStream::new(BufReader::new(tokio::io::stdin()).lines());
        while let Some(line) = lines.next().await {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    error!(error = %e, "stdin read failed");
                    break;
                }
            };
            let Some(cmd) = InputCommand::parse(&line) else {
                continue;
            };
            match cmd {
                InputCommand::Quit => break,
                InputCommand::Unknown(ref raw) => warn!(command = %raw, "unknown command"),
                cmd => {
                    if let Some(item) = map(cmd) {
                        if tx.send(item).is_err() {
                            break;
                        }
                    }
                }
            }
        }
    });
    rx
}

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

async fn drive<V: View>(kind: ViewKind, config: &Config, view: V) {
    let url = websocket_url(&config.server.base_url, &config.server.socketio_path);
    info!(%url, view = ?kind, "starting");
    let channel = EventChannel::spawn(ChannelConfig {
        url,
        reconnect_delay: config.server.reconnect_delay(),
    });

    match kind {
        ViewKind::Live => {
            let chat = LiveChat::new(channel.emitter, view, config.live.initial_channel.clone());
            let input = spawn_stdin(Some);
            live::run(chat, channel.inbound, input).await;
        }
        ViewKind::Legacy => {
            // The legacy view never emits, but the channel lives as long as a sender does.
            let _emitter = channel.emitter;
            let chat = LegacyChat::new(config.legacy.channel.clone(), &config.legacy, view);
            let api = LegacyApi::new(config.server.base_url.clone(), config.server.http_client());
            let input = spawn_stdin(|cmd| match cmd {
                InputCommand::Say(text) => Some(text),
                _ => None,
            });
            legacy::run(chat, api, &config.legacy, channel.inbound, input).await;
        }
        ViewKind::Dashboard => {
            let _emitter = channel.emitter;
            let binder = DashboardBinder::new(DashboardPage::from(&config.dashboard), view);
            let test_body = config
                .dashboard
                .test_provider
                .clone()
                .map(|provider| TestRequest {
                    provider,
                    api_key: config.dashboard.test_api_key.clone().unwrap_or_default(),
                });
            let deps = DashboardDeps {
                client: config.server.http_client(),
                base_url: config.server.base_url.clone(),
                test_body,
                flash_dismiss: config.dashboard.flash_dismiss(),
            };
            let input = spawn_stdin(|cmd| match cmd {
                InputCommand::Test => Some(DashboardCommand::TestConnection),
                InputCommand::Submit(form) => Some(DashboardCommand::Submit(form)),
                _ => None,
            });
            dashboard::run(binder, deps, channel.inbound, input).await;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    args.apply(&mut config);

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter)),
        )
        .with_writer(io::stderr)
        .with_target(true)
        .init();

    if args.html {
        let view = HtmlPrinter {
            panes: HtmlView::new(),
            out: io::stdout(),
        };
        drive(args.view, &config, view).await;
    } else {
        drive(args.view, &config, TerminalView::new(io::stdout())).await;
    }

    info!("bye");
    Ok(())
}
