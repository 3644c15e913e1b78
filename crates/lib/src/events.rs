//! Inbound webhook wire types and event classification.
//!
//! A webhook delivery is a batch: `{object:"page", entry:[{messaging:[...]}]}`.
//! Each messaging event carries sender/recipient ids plus one kind-specific
//! section; `classify` maps it onto the dispatch keys in a fixed precedence
//! order, including the derived payload-scoped postback and quick-reply keys.

use serde::{Deserialize, Serialize};

/// Full webhook POST body.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookBody {
    pub object: String,
    #[serde(default)]
    pub entry: Vec<Entry>,
}

/// One page entry of a batch.
#[derive(Debug, Clone, Deserialize)]
pub struct Entry {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub time: Option<u64>,
    #[serde(default)]
    pub messaging: Vec<MessagingEvent>,
}

/// Sender or recipient reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Party {
    pub id: String,
}

/// One inbound messaging event. Exactly one of the optional sections is
/// expected to be present; classification handles the rest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagingEvent {
    pub sender: Party,
    pub recipient: Party,
    #[serde(default)]
    pub timestamp: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<MessageContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postback: Option<Postback>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optin: Option<Optin>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery: Option<Delivery>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read: Option<Read>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_linking: Option<AccountLinking>,
}

/// Message section: text and/or attachments, optional quick-reply payload,
/// echo flag for messages sent by the page itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Vec<serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quick_reply: Option<QuickReplyPayload>,
    #[serde(default)]
    pub is_echo: bool,
}

/// Payload carried by a selected quick-reply chip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuickReplyPayload {
    pub payload: String,
}

/// Button-click event with the opaque payload chosen at button creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Postback {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Authentication (plugin opt-in) event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Optin {
    #[serde(default, rename = "ref", skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

/// Delivery receipt for previously sent messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delivery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watermark: Option<u64>,
}

/// Read receipt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Read {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watermark: Option<u64>,
}

/// Account-linking status change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountLinking {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_code: Option<String>,
}

/// Fixed set of event kinds listeners can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Message,
    QuickReply,
    Attachment,
    Postback,
    Authentication,
    Delivery,
    Read,
    AccountLinking,
}

/// Dispatch key: event kind plus, for postback/quick-reply sub-events, the
/// payload string the listener is scoped to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventKey {
    pub kind: EventKind,
    pub payload: Option<String>,
}

impl EventKey {
    /// Key for all events of a kind, regardless of payload.
    pub fn kind(kind: EventKind) -> Self {
        Self {
            kind,
            payload: None,
        }
    }

    /// Payload-scoped key for postback or quick-reply sub-events.
    pub fn scoped(kind: EventKind, payload: impl Into<String>) -> Self {
        Self {
            kind,
            payload: Some(payload.into()),
        }
    }
}

/// Classify one messaging event into an ordered list of dispatch keys.
///
/// Precedence is fixed: echo gate, optin, message text (plus quick-reply
/// sub-events), attachments, postback (payload-scoped first), delivery, read,
/// account linking. An event matching none of the rules yields an empty list
/// and is logged as unknown; that is not an error.
pub fn classify(event: &MessagingEvent, broadcast_echoes: bool) -> Vec<EventKey> {
    if let Some(ref message) = event.message {
        if message.is_echo && !broadcast_echoes {
            return Vec::new();
        }
    }
    if event.optin.is_some() {
        return vec![EventKey::kind(EventKind::Authentication)];
    }
    if let Some(ref message) = event.message {
        if message.text.is_some() {
            let mut keys = vec![EventKey::kind(EventKind::Message)];
            if let Some(ref quick_reply) = message.quick_reply {
                keys.push(EventKey::kind(EventKind::QuickReply));
                keys.push(EventKey::scoped(EventKind::QuickReply, quick_reply.payload.clone()));
            }
            return keys;
        }
        if message.attachments.is_some() {
            return vec![EventKey::kind(EventKind::Attachment)];
        }
    }
    if let Some(ref postback) = event.postback {
        let mut keys = Vec::new();
        if let Some(ref payload) = postback.payload {
            keys.push(EventKey::scoped(EventKind::Postback, payload.clone()));
        }
        keys.push(EventKey::kind(EventKind::Postback));
        return keys;
    }
    if event.delivery.is_some() {
        return vec![EventKey::kind(EventKind::Delivery)];
    }
    if event.read.is_some() {
        return vec![EventKey::kind(EventKind::Read)];
    }
    if event.account_linking.is_some() {
        return vec![EventKey::kind(EventKind::AccountLinking)];
    }
    log::debug!(
        "webhook received unknown messaging event from {}",
        event.sender.id
    );
    Vec::new()
}
