//! Dashboard binder: status fan-out, the test-connection call against a
//! local HTTP mock, and the runner loop.

mod common;

use common::serve;
use std::time::Duration;
use tokio::sync::mpsc;

use relay_webchat::config::Config;
use relay_webchat::dashboard::{
    self, test_connection, DashboardBinder, DashboardCommand, DashboardDeps, DashboardPage,
    TestRequest, TestResponse,
};
use relay_webchat::protocol::ServerEvent;
use relay_webchat::render::ViewUpdate;
use relay_webchat::socketio::Inbound;
use relay_webchat::WebchatError;

// ---------------------------------------------------------------------------
// test_connection
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_connection_success() {
    let (base, mut seen) = serve(|_, _| {
        (
            200,
            r#"{"success":true,"message":"Successfully connected to openai API"}"#.into(),
        )
    })
    .await;

    let body = TestRequest {
        provider: "openai".into(),
        api_key: "sk-test".into(),
    };
    let resp = test_connection(&reqwest::Client::new(), &base, Some(&body))
        .await
        .unwrap();
    assert_eq!(
        resp,
        TestResponse {
            success: true,
            message: "Successfully connected to openai API".into()
        }
    );

    let req = seen.recv().await.unwrap();
    assert!(req.line.starts_with("POST /ai_settings/test_connection "));
    let sent: serde_json::Value = serde_json::from_str(&req.body).unwrap();
    assert_eq!(sent["provider"], "openai");
}

#[tokio::test]
async fn test_connection_failure_body_wins_over_status() {
    let (base, _seen) = serve(|_, _| {
        (
            400,
            r#"{"success":false,"message":"No API key configured"}"#.into(),
        )
    })
    .await;

    let resp = test_connection(&reqwest::Client::new(), &base, None)
        .await
        .unwrap();
    assert!(!resp.success);
    assert_eq!(resp.message, "No API key configured");
}

#[tokio::test]
async fn test_connection_error_status_without_body() {
    let (base, _seen) = serve(|_, _| (502, "<html>bad gateway</html>".into())).await;
    let err = test_connection(&reqwest::Client::new(), &base, None)
        .await
        .unwrap_err();
    assert!(matches!(err, WebchatError::Http { status: 502, .. }));
}

// ---------------------------------------------------------------------------
// Binder
// ---------------------------------------------------------------------------

#[test]
fn test_status_update_event_toggles_buttons() {
    let mut b = DashboardBinder::new(DashboardPage::default(), Vec::<ViewUpdate>::new());
    let ev = ServerEvent::decode(
        "status_update",
        serde_json::json!({"connected": false, "server": "irc.libera.chat", "port": 6697}),
    )
    .unwrap();
    b.handle(ev);

    assert!(b
        .view()
        .contains(&ViewUpdate::ServerAddress("irc.libera.chat:6697".into())));
    assert!(b.view().contains(&ViewUpdate::ConnectButtons {
        connect_enabled: true,
        disconnect_enabled: false,
    }));
}

#[test]
fn test_other_events_are_ignored() {
    let mut b = DashboardBinder::new(DashboardPage::default(), Vec::<ViewUpdate>::new());
    let ev = ServerEvent::decode("webchat_channels", serde_json::json!({"channels": []})).unwrap();
    b.handle(ev);
    assert!(b.view().is_empty());
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_runner_drives_status_flash_and_test() {
    let (base, _seen) = serve(|_, _| {
        (
            200,
            r#"{"success":true,"message":"ok"}"#.into(),
        )
    })
    .await;

    let page = DashboardPage {
        flashes: 1,
        ..DashboardPage::default()
    };
    let binder = DashboardBinder::new(page, Vec::<ViewUpdate>::new());
    let deps = DashboardDeps {
        client: reqwest::Client::new(),
        base_url: base,
        test_body: None,
        flash_dismiss: Duration::from_millis(50),
    };
    let (in_tx, in_rx) = mpsc::unbounded_channel();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(dashboard::run(binder, deps, in_rx, cmd_rx));

    in_tx.send(Inbound::Connected).unwrap();
    in_tx
        .send(Inbound::Event(
            ServerEvent::decode("status_update", serde_json::json!({"connected": true})).unwrap(),
        ))
        .unwrap();
    cmd_tx.send(DashboardCommand::TestConnection).unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    drop(cmd_tx);
    let binder = task.await.unwrap();

    let view = binder.view();
    assert!(view.contains(&ViewUpdate::Connection { connected: true }));
    assert!(view.contains(&ViewUpdate::FlashHidden { id: 0 }));
    assert!(view.contains(&ViewUpdate::TestResult {
        success: true,
        message: "ok".into()
    }));
    assert!(view.contains(&ViewUpdate::TestPending(false)));
}

#[tokio::test]
async fn test_runner_uses_configured_forms_and_flashes() {
    let config = Config::parse(
        r#"
        [dashboard]
        forms = ["ai-settings"]
        flashes = 2
        flash_dismiss_ms = 30
        "#,
    )
    .unwrap();

    let binder = DashboardBinder::new(DashboardPage::from(&config.dashboard), Vec::<ViewUpdate>::new());
    let deps = DashboardDeps {
        client: reqwest::Client::new(),
        base_url: config.server.base_url.clone(),
        test_body: None,
        flash_dismiss: config.dashboard.flash_dismiss(),
    };
    let (_in_tx, in_rx) = mpsc::unbounded_channel::<Inbound>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(dashboard::run(binder, deps, in_rx, cmd_rx));

    cmd_tx.send(DashboardCommand::Submit("ai-settings".into())).unwrap();
    cmd_tx.send(DashboardCommand::Submit("unknown".into())).unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    drop(cmd_tx);
    let binder = task.await.unwrap();

    let view = binder.view();
    let busy: Vec<_> = view
        .iter()
        .filter(|u| matches!(u, ViewUpdate::SubmitBusy { .. }))
        .collect();
    assert_eq!(
        busy,
        vec![&ViewUpdate::SubmitBusy {
            form: "ai-settings".into()
        }]
    );
    assert!(view.contains(&ViewUpdate::FlashHidden { id: 0 }));
    assert!(view.contains(&ViewUpdate::FlashHidden { id: 1 }));
}
