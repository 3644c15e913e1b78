//! Outbound Send API client: message sends, typing sequences, thread settings,
//! and profile fetches.
//!
//! Transport failures never surface as errors on the send path. Calls resolve
//! with whatever JSON the remote returned (error objects included) or
//! `Value::Null` after a transport failure, so a webhook handler upstream is
//! never blocked by a downstream outage. Callers that care inspect the payload.

use crate::compose::{self, OutboundMessage};
use crate::dispatch::{Dispatcher, Listener};
use crate::error::BotError;
use crate::events::{EventKey, EventKind};
use crate::profile::{ProfileFetcher, UserProfile};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_API_BASE: &str = "https://graph.facebook.com/v2.6";

/// Fields requested on a profile fetch.
const PROFILE_FIELDS: &str = "first_name,last_name,profile_pic,locale,timezone,gender";

/// Auto typing delay: 10ms per character of text, 1s for non-text messages,
/// capped at 20s.
const TYPING_MS_PER_CHAR: u64 = 10;
const TYPING_DEFAULT_MS: u64 = 1000;
const TYPING_MAX_MS: u64 = 20_000;

/// Typing-indicator behavior for one send.
#[derive(Debug, Clone, Copy)]
pub enum Typing {
    /// Delay derived from the message: 10ms per character of text, 1s otherwise.
    Auto,
    /// Caller-specified delay.
    Fixed(Duration),
}

/// Per-send options: typing sequence and one-shot receipt correlators.
#[derive(Default)]
pub struct SendOptions {
    pub typing: Option<Typing>,
    /// Registered as a one-shot listener for the next delivery receipt.
    pub on_delivery: Option<Listener>,
    /// Registered as a one-shot listener for the next read receipt.
    pub on_read: Option<Listener>,
}

fn typing_delay(typing: Typing, message: &OutboundMessage) -> Duration {
    let ms = match typing {
        Typing::Fixed(d) => d.as_millis() as u64,
        Typing::Auto => {
            let len = message.text_len() as u64;
            if len > 0 {
                len * TYPING_MS_PER_CHAR
            } else {
                TYPING_DEFAULT_MS
            }
        }
    };
    Duration::from_millis(ms.min(TYPING_MAX_MS))
}

/// Client for the remote Send API. Clones share the underlying HTTP client
/// and dispatcher handle.
#[derive(Clone)]
pub struct SendClient {
    base_url: String,
    access_token: String,
    client: reqwest::Client,
    dispatcher: Arc<Dispatcher>,
}

impl SendClient {
    /// Create a client. `base_url` defaults to the platform Graph URL; tests
    /// point it at a local mock server.
    pub fn new(
        access_token: impl Into<String>,
        base_url: Option<String>,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        let base_url = base_url
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        Self {
            base_url,
            access_token: access_token.into(),
            client: reqwest::Client::new(),
            dispatcher,
        }
    }

    /// The dispatcher this client registers receipt correlators on.
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// POST a body to `{base}/{path}?access_token=…` and return the remote
    /// JSON. Transport and decode failures are logged and resolve to `Null`.
    async fn post_json(&self, path: &str, body: &Value) -> Value {
        let url = format!(
            "{}/{}?access_token={}",
            self.base_url, path, self.access_token
        );
        let res = self.client.post(&url).json(body).send().await;
        Self::read_json(path, res).await
    }

    /// DELETE variant of [`post_json`] for thread-settings removal.
    async fn delete_json(&self, path: &str, body: &Value) -> Value {
        let url = format!(
            "{}/{}?access_token={}",
            self.base_url, path, self.access_token
        );
        let res = self.client.delete(&url).json(body).send().await;
        Self::read_json(path, res).await
    }

    async fn read_json(path: &str, res: reqwest::Result<reqwest::Response>) -> Value {
        match res {
            Ok(res) => match res.json::<Value>().await {
                Ok(value) => value,
                Err(e) => {
                    log::warn!("{}: decoding remote response failed: {}", path, e);
                    Value::Null
                }
            },
            Err(e) => {
                log::warn!("{}: remote call failed: {}", path, e);
                Value::Null
            }
        }
    }

    /// Send a sender action (`typing_on`, `typing_off`, `mark_seen`).
    pub async fn sender_action(&self, recipient_id: &str, action: &str) -> Value {
        let body = json!({
            "recipient": { "id": recipient_id },
            "sender_action": action,
        });
        self.post_json("me/messages", &body).await
    }

    /// Convenience wrapper: turn the typing indicator on or off.
    pub async fn send_typing_indicator(&self, recipient_id: &str, on: bool) -> Value {
        self.sender_action(recipient_id, if on { "typing_on" } else { "typing_off" })
            .await
    }

    /// Send a composed message. With `options.typing` set, the sequence is
    /// strictly typing_on → delay → typing_off → message send; the returned
    /// value is the remote response to the message send itself. On success,
    /// `on_delivery`/`on_read` register as one-shot dispatcher listeners
    /// (correlated by event type only, not by recipient).
    pub async fn send(
        &self,
        recipient_id: &str,
        message: &OutboundMessage,
        options: SendOptions,
    ) -> Value {
        if let Some(typing) = options.typing {
            let delay = typing_delay(typing, message);
            self.sender_action(recipient_id, "typing_on").await;
            tokio::time::sleep(delay).await;
            self.sender_action(recipient_id, "typing_off").await;
        }
        let body = json!({
            "recipient": { "id": recipient_id },
            "message": message.to_value(),
        });
        let response = self.post_json("me/messages", &body).await;
        if !response.is_null() {
            if let Some(on_delivery) = options.on_delivery {
                self.dispatcher
                    .once(EventKey::kind(EventKind::Delivery), on_delivery);
            }
            if let Some(on_read) = options.on_read {
                self.dispatcher.once(EventKey::kind(EventKind::Read), on_read);
            }
        }
        response
    }

    /// Send plain text.
    pub async fn send_text(&self, recipient_id: &str, text: &str, options: SendOptions) -> Value {
        self.send(recipient_id, &OutboundMessage::text(text), options)
            .await
    }

    /// Shape-dispatching convenience: accepts the loose say-style JSON forms
    /// (string, text + quickReplies, text + buttons, attachment). An
    /// unrecognized shape is logged and the call is a no-op resolving to Null.
    pub async fn say(&self, recipient_id: &str, message: &Value, options: SendOptions) -> Value {
        match compose::compose_say(message) {
            Some(composed) => self.send(recipient_id, &composed, options).await,
            None => {
                log::error!(
                    "say to {}: {}",
                    recipient_id,
                    BotError::UnrecognizedMessageShape
                );
                Value::Null
            }
        }
    }

    /// Set the greeting text shown to new conversations.
    pub async fn set_greeting_text(&self, text: &str) -> Value {
        let body = json!({
            "setting_type": "greeting",
            "greeting": { "text": text },
        });
        self.post_json("me/thread_settings", &body).await
    }

    /// Configure the get-started button with a static postback payload.
    pub async fn set_get_started_button(&self, payload: &str) -> Value {
        let body = json!({
            "setting_type": "call_to_actions",
            "thread_state": "new_thread",
            "call_to_actions": [{ "payload": payload }],
        });
        self.post_json("me/thread_settings", &body).await
    }

    /// Configure the get-started button and register `callback` as a postback
    /// listener for the derived payload.
    pub async fn set_get_started(&self, callback: Listener) -> Value {
        self.dispatcher.on(
            EventKey::scoped(EventKind::Postback, compose::GET_STARTED_PAYLOAD),
            callback,
        );
        self.set_get_started_button(compose::GET_STARTED_PAYLOAD)
            .await
    }

    /// Remove the get-started button.
    pub async fn delete_get_started_button(&self) -> Value {
        let body = json!({
            "setting_type": "call_to_actions",
            "thread_state": "new_thread",
        });
        self.delete_json("me/thread_settings", &body).await
    }

    /// Set the persistent menu from a lenient button list (labels or full
    /// button objects).
    pub async fn set_persistent_menu(&self, buttons: &[Value]) -> Value {
        let body = json!({
            "setting_type": "call_to_actions",
            "thread_state": "existing_thread",
            "call_to_actions": compose::format_buttons(buttons),
        });
        self.post_json("me/thread_settings", &body).await
    }

    /// Remove the persistent menu.
    pub async fn delete_persistent_menu(&self) -> Value {
        let body = json!({
            "setting_type": "call_to_actions",
            "thread_state": "existing_thread",
        });
        self.delete_json("me/thread_settings", &body).await
    }
}

#[async_trait]
impl ProfileFetcher for SendClient {
    /// GET `{base}/{user_id}?fields=…` — unlike the send path, profile fetch
    /// failures propagate so the cache can report them.
    async fn fetch_profile(&self, user_id: &str) -> Result<UserProfile, String> {
        let url = format!(
            "{}/{}?fields={}&access_token={}",
            self.base_url, user_id, PROFILE_FIELDS, self.access_token
        );
        let res = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(format!("profile fetch failed: {} {}", status, body));
        }
        res.json::<UserProfile>().await.map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typing_auto_scales_with_text_length() {
        let message = OutboundMessage::text("a".repeat(50));
        assert_eq!(
            typing_delay(Typing::Auto, &message),
            Duration::from_millis(500)
        );
    }

    #[test]
    fn typing_auto_default_for_non_text() {
        let message = compose::generic_template(&[]);
        assert_eq!(
            typing_delay(Typing::Auto, &message),
            Duration::from_millis(1000)
        );
    }

    #[test]
    fn typing_capped_at_twenty_seconds() {
        let message = OutboundMessage::text("a".repeat(10_000));
        assert_eq!(
            typing_delay(Typing::Auto, &message),
            Duration::from_millis(20_000)
        );
        assert_eq!(
            typing_delay(Typing::Fixed(Duration::from_secs(60)), &message),
            Duration::from_millis(20_000)
        );
    }

    #[test]
    fn base_url_trailing_slash_trimmed() {
        let client = SendClient::new(
            "token",
            Some("http://127.0.0.1:9/".to_string()),
            Arc::new(Dispatcher::new()),
        );
        assert_eq!(client.base_url, "http://127.0.0.1:9");
    }
}
