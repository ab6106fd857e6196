//! Legacy JSON API against a local HTTP mock: envelopes, error mapping,
//! the send path, and the polling loop end to end.

mod common;

use common::serve;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_test::{assert_err, assert_ok};

use relay_webchat::config::{LegacyConfig, PollPolicy};
use relay_webchat::legacy::{self, LegacyApi, LegacyChat};
use relay_webchat::render::ViewUpdate;
use relay_webchat::socketio::Inbound;
use relay_webchat::WebchatError;

fn api(base: &str) -> LegacyApi {
    LegacyApi::new(base, reqwest::Client::new())
}

// ---------------------------------------------------------------------------
// API client
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_fetch_messages_sends_channel_query() {
    let (base, mut seen) = serve(|_, _| {
        (
            200,
            r#"{"success":true,"messages":[{"nick":"bob","message":"hi","timestamp":"12:00:00"}]}"#
                .into(),
        )
    })
    .await;

    let msgs = assert_ok!(api(&base).fetch_messages("#rust").await);
    assert_eq!(msgs.len(), 1);
    assert_eq!(msgs[0].nick.as_deref(), Some("bob"));

    let req = seen.recv().await.unwrap();
    assert!(req.line.starts_with("GET /api/get_messages?channel=%23rust "));
}

#[tokio::test]
async fn test_fetch_users_accepts_strings_and_objects() {
    let (base, _seen) = serve(|_, _| {
        (
            200,
            r#"{"success":true,"users":["amy",{"nick":"bob","mode":"@"}]}"#.into(),
        )
    })
    .await;

    let users = assert_ok!(api(&base).fetch_users("#rust").await);
    assert_eq!(users, vec!["amy".to_string(), "bob".to_string()]);
}

#[tokio::test]
async fn test_non_success_status_is_http_error() {
    let (base, _seen) = serve(|_, _| (500, "{}".into())).await;
    let err = assert_err!(api(&base).fetch_messages("#rust").await);
    assert!(matches!(err, WebchatError::Http { status: 500, .. }));
}

#[tokio::test]
async fn test_success_false_is_api_error() {
    let (base, _seen) = serve(|_, _| {
        (
            200,
            r#"{"success":false,"error":"Bot not connected"}"#.into(),
        )
    })
    .await;
    let err = assert_err!(api(&base).send_message("#rust", "hi").await);
    assert_eq!(err.to_string(), "Bot not connected");
}

#[tokio::test]
async fn test_malformed_body_is_json_error() {
    let (base, _seen) = serve(|_, _| (200, "not json".into())).await;
    let err = assert_err!(api(&base).fetch_users("#rust").await);
    assert!(matches!(err, WebchatError::Json { .. }));
}

#[tokio::test]
async fn test_unreachable_server_is_connect_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);
    let err = assert_err!(api(&base).fetch_messages("#rust").await);
    assert!(matches!(err, WebchatError::Connect { .. }));
}

#[tokio::test]
async fn test_send_posts_json_body() {
    let (base, mut seen) = serve(|_, _| (200, r#"{"success":true}"#.into())).await;
    assert_ok!(api(&base).send_message("#rust", "hello").await);

    let req = seen.recv().await.unwrap();
    assert!(req.line.starts_with("POST /api/send_message "));
    let body: serde_json::Value = serde_json::from_str(&req.body).unwrap();
    assert_eq!(body["channel"], "#rust");
    assert_eq!(body["message"], "hello");
}

// ---------------------------------------------------------------------------
// Polling loop
// ---------------------------------------------------------------------------

fn fast_config(policy: PollPolicy) -> LegacyConfig {
    LegacyConfig {
        channel: Some("#rust".into()),
        messages_interval_ms: 20,
        users_interval_ms: 20,
        max_messages: 100,
        poll_policy: policy,
    }
}

#[tokio::test]
async fn test_loop_renders_polled_state_once() {
    let (base, _seen) = serve(|line, _| {
        if line.contains("/api/get_users") {
            (200, r#"{"success":true,"users":["amy","bob"]}"#.into())
        } else {
            (
                200,
                r#"{"success":true,"messages":[{"nick":"amy","message":"yo","timestamp":"1"}]}"#
                    .into(),
            )
        }
    })
    .await;

    let config = fast_config(PollPolicy::Always);
    let chat = LegacyChat::new(config.channel.clone(), &config, Vec::<ViewUpdate>::new());
    let (_in_tx, in_rx) = mpsc::unbounded_channel::<Inbound>();
    let (input_tx, input_rx) = mpsc::unbounded_channel::<String>();

    let task = tokio::spawn(async move { legacy::run(chat, api(&base), &config, in_rx, input_rx).await });
    tokio::time::sleep(Duration::from_millis(300)).await;
    drop(input_tx);
    let chat = task.await.unwrap();

    let view = chat.view();
    let message_renders = view
        .iter()
        .filter(|u| matches!(u, ViewUpdate::LegacyMessages(_)))
        .count();
    let user_renders = view
        .iter()
        .filter(|u| matches!(u, ViewUpdate::PlainUsers(_)))
        .count();
    assert_eq!(message_renders, 1);
    assert_eq!(user_renders, 1);
    assert!(view.contains(&ViewUpdate::PlainUsers(vec!["amy".into(), "bob".into()])));
}

#[tokio::test]
async fn test_loop_does_not_poll_while_push_connected() {
    let (base, mut seen) = serve(|_, _| (200, r#"{"success":true}"#.into())).await;

    let config = fast_config(PollPolicy::Fallback);
    let chat = LegacyChat::new(config.channel.clone(), &config, Vec::<ViewUpdate>::new());
    let (in_tx, in_rx) = mpsc::unbounded_channel::<Inbound>();
    let (input_tx, input_rx) = mpsc::unbounded_channel::<String>();
    in_tx.send(Inbound::Connected).unwrap();

    let task = tokio::spawn(async move { legacy::run(chat, api(&base), &config, in_rx, input_rx).await });
    tokio::time::sleep(Duration::from_millis(200)).await;
    drop(input_tx);
    task.await.unwrap();

    // The first tick of each interval fires at once and may race the
    // Connected message; after that nothing may be requested.
    let mut polls = 0;
    while let Ok(req) = seen.try_recv() {
        assert!(req.line.starts_with("GET"));
        polls += 1;
    }
    assert!(polls <= 2, "polled {polls} times while push was up");
}

#[tokio::test]
async fn test_loop_send_failure_alerts() {
    let (base, _seen) = serve(|line, _| {
        if line.starts_with("POST") {
            (200, r#"{"success":false,"error":"Bot not connected"}"#.into())
        } else {
            (200, r#"{"success":true}"#.into())
        }
    })
    .await;

    let config = fast_config(PollPolicy::Fallback);
    let chat = LegacyChat::new(config.channel.clone(), &config, Vec::<ViewUpdate>::new());
    let (_in_tx, in_rx) = mpsc::unbounded_channel::<Inbound>();
    let (input_tx, input_rx) = mpsc::unbounded_channel::<String>();

    let task = tokio::spawn(async move { legacy::run(chat, api(&base), &config, in_rx, input_rx).await });
    input_tx.send("   ".into()).unwrap();
    input_tx.send("hello".into()).unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    drop(input_tx);
    let chat = task.await.unwrap();

    let view = chat.view();
    assert_eq!(
        view.iter()
            .filter(|u| **u == ViewUpdate::InputCleared)
            .count(),
        1
    );
    assert!(view.contains(&ViewUpdate::Alert(
        "Failed to send message: Bot not connected".into()
    )));
}

#[tokio::test]
async fn test_loop_survives_zero_intervals() {
    let (base, _seen) = serve(|_, _| (200, r#"{"success":true}"#.into())).await;

    let config = LegacyConfig {
        messages_interval_ms: 0,
        users_interval_ms: 0,
        ..fast_config(PollPolicy::Fallback)
    };
    let chat = LegacyChat::new(config.channel.clone(), &config, Vec::<ViewUpdate>::new());
    let (in_tx, in_rx) = mpsc::unbounded_channel::<Inbound>();
    let (input_tx, input_rx) = mpsc::unbounded_channel::<String>();
    in_tx.send(Inbound::Connected).unwrap();

    let task = tokio::spawn(async move { legacy::run(chat, api(&base), &config, in_rx, input_rx).await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    drop(input_tx);
    assert_ok!(task.await);
}
