//! Integration tests: start the webhook server on a free port and drive the
//! handshake and intake endpoints with reqwest. No remote API is required.

use lib::config::Config;
use lib::dispatch::Listener;
use lib::events::{EventKey, EventKind};
use lib::server::{run_server, BotState};
use lib::signature;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const VERIFY_TOKEN: &str = "verify-token";
const APP_SECRET: &str = "app-secret";

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind free port");
    listener.local_addr().expect("local_addr").port()
}

fn temp_data_dir() -> PathBuf {
    std::env::temp_dir().join(format!("parley-webhook-test-{}", uuid::Uuid::new_v4()))
}

fn test_config(port: u16) -> Config {
    let mut config = Config::default();
    config.platform.access_token = Some("access-token".to_string());
    config.platform.verify_token = Some(VERIFY_TOKEN.to_string());
    config.platform.app_secret = Some(APP_SECRET.to_string());
    config.webhook.port = port;
    config.data.dir = Some(temp_data_dir());
    config
}

fn counting_listener(counter: Arc<AtomicUsize>) -> Listener {
    Arc::new(move |_event, _meta| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })
}

/// Spawn the server and wait until the handshake endpoint answers.
async fn start_server(config: Config) -> (BotState, String) {
    let port = config.webhook.port;
    let state = BotState::from_config(config).expect("state");
    let server_state = state.clone();
    tokio::spawn(async move {
        let _ = run_server(server_state).await;
    });

    let url = format!("http://127.0.0.1:{}/webhook", port);
    let probe = format!(
        "{}?hub.mode=subscribe&hub.verify_token={}&hub.challenge=ping",
        url, VERIFY_TOKEN
    );
    let client = reqwest::Client::new();
    for _ in 0..100 {
        if let Ok(resp) = client.get(&probe).send().await {
            if resp.status().is_success() {
                return (state, url);
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("webhook server did not come up on {}", url);
}

fn batch_body() -> String {
    serde_json::json!({
        "object": "page",
        "entry": [{
            "id": "page-1",
            "messaging": [
                {
                    "sender": {"id": "user-1"},
                    "recipient": {"id": "page-1"},
                    "message": {"mid": "mid.1", "text": "hello"}
                },
                {
                    "sender": {"id": "user-2"},
                    "recipient": {"id": "page-1"},
                    "postback": {"payload": "PARLEY_BUTTON_HELP", "title": "Help"}
                }
            ]
        }]
    })
    .to_string()
}

#[tokio::test]
async fn handshake_echoes_challenge_for_correct_token() {
    let (_state, url) = start_server(test_config(free_port())).await;
    let resp = reqwest::Client::new()
        .get(format!(
            "{}?hub.mode=subscribe&hub.verify_token={}&hub.challenge=1234567890",
            url, VERIFY_TOKEN
        ))
        .send()
        .await
        .expect("request");
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.expect("body"), "1234567890");
}

#[tokio::test]
async fn handshake_rejects_wrong_token_without_echo() {
    let (_state, url) = start_server(test_config(free_port())).await;
    let resp = reqwest::Client::new()
        .get(format!(
            "{}?hub.mode=subscribe&hub.verify_token=wrong&hub.challenge=1234567890",
            url
        ))
        .send()
        .await
        .expect("request");
    assert_eq!(resp.status(), 403);
    assert_eq!(resp.text().await.expect("body"), "");
}

#[tokio::test]
async fn signed_batch_dispatches_in_order() {
    let (state, url) = start_server(test_config(free_port())).await;
    let messages = Arc::new(AtomicUsize::new(0));
    let postbacks = Arc::new(AtomicUsize::new(0));
    let scoped = Arc::new(AtomicUsize::new(0));
    state.dispatcher.on(
        EventKey::kind(EventKind::Message),
        counting_listener(messages.clone()),
    );
    state.dispatcher.on(
        EventKey::kind(EventKind::Postback),
        counting_listener(postbacks.clone()),
    );
    state.dispatcher.on(
        EventKey::scoped(EventKind::Postback, "PARLEY_BUTTON_HELP"),
        counting_listener(scoped.clone()),
    );

    let body = batch_body();
    let resp = reqwest::Client::new()
        .post(&url)
        .header("x-hub-signature", signature::sign_sha1(APP_SECRET, body.as_bytes()))
        .header("content-type", "application/json")
        .body(body)
        .send()
        .await
        .expect("request");
    assert_eq!(resp.status(), 200);
    assert_eq!(messages.load(Ordering::SeqCst), 1);
    assert_eq!(postbacks.load(Ordering::SeqCst), 1);
    assert_eq!(scoped.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn tampered_signature_is_rejected_before_dispatch() {
    let (state, url) = start_server(test_config(free_port())).await;
    let messages = Arc::new(AtomicUsize::new(0));
    state.dispatcher.on(
        EventKey::kind(EventKind::Message),
        counting_listener(messages.clone()),
    );

    let body = batch_body();
    let mut tampered = body.clone().into_bytes();
    let idx = tampered.len() / 2;
    tampered[idx] ^= 0x01;
    let resp = reqwest::Client::new()
        .post(&url)
        .header("x-hub-signature", signature::sign_sha1(APP_SECRET, body.as_bytes()))
        .header("content-type", "application/json")
        .body(tampered)
        .send()
        .await
        .expect("request");
    assert_eq!(resp.status(), 403);
    assert_eq!(messages.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn missing_signature_is_rejected() {
    let (_state, url) = start_server(test_config(free_port())).await;
    let resp = reqwest::Client::new()
        .post(&url)
        .header("content-type", "application/json")
        .body(batch_body())
        .send()
        .await
        .expect("request");
    assert_eq!(resp.status(), 403);
}

#[tokio::test]
async fn non_page_object_is_acknowledged_without_dispatch() {
    let (state, url) = start_server(test_config(free_port())).await;
    let messages = Arc::new(AtomicUsize::new(0));
    state.dispatcher.on(
        EventKey::kind(EventKind::Message),
        counting_listener(messages.clone()),
    );

    let body = serde_json::json!({"object": "instagram", "entry": []}).to_string();
    let resp = reqwest::Client::new()
        .post(&url)
        .header("x-hub-signature", signature::sign_sha1(APP_SECRET, body.as_bytes()))
        .header("content-type", "application/json")
        .body(body)
        .send()
        .await
        .expect("request");
    assert_eq!(resp.status(), 200);
    assert_eq!(messages.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn malformed_body_with_valid_signature_is_bad_request() {
    let (_state, url) = start_server(test_config(free_port())).await;
    let body = "{not json".to_string();
    let resp = reqwest::Client::new()
        .post(&url)
        .header("x-hub-signature", signature::sign_sha1(APP_SECRET, body.as_bytes()))
        .header("content-type", "application/json")
        .body(body)
        .send()
        .await
        .expect("request");
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn missing_credentials_fail_fast() {
    let mut config = test_config(free_port());
    config.platform.access_token = None;
    // Env overrides would mask the missing value; this test assumes a clean env.
    if std::env::var("PARLEY_ACCESS_TOKEN").is_ok() {
        return;
    }
    assert!(BotState::from_config(config).is_err());
}
