//! Message composition: high-level "say" intents to the wire message schema.
//!
//! All functions here are pure. Button and quick-reply formatting is lenient:
//! a bare label is normalized into a full object, a full object passes through,
//! and anything else degrades to an empty object rather than failing.

use serde_json::{json, Value};

/// Prefix for payloads derived from postback button labels.
pub const BUTTON_PAYLOAD_PREFIX: &str = "PARLEY_BUTTON_";

/// Prefix for payloads derived from quick-reply labels.
pub const QUICK_REPLY_PAYLOAD_PREFIX: &str = "PARLEY_QR_";

/// Payload sent when the user taps the get-started button configured via
/// [`crate::send::SendClient::set_get_started`].
pub const GET_STARTED_PAYLOAD: &str = "PARLEY_GET_STARTED";

/// Derive a stable payload identifier from a human-readable label: strip every
/// character outside `[A-Za-z0-9]` and uppercase the remainder. Distinct labels
/// can collide after normalization; callers that care supply explicit payloads.
pub fn normalize_label(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_uppercase()
}

/// Normalize a caller-supplied button list into wire button objects.
/// A string becomes a postback button with a derived payload; an object with a
/// `title` passes through unchanged; anything else becomes an empty object.
pub fn format_buttons(buttons: &[Value]) -> Vec<Value> {
    buttons
        .iter()
        .map(|button| match button {
            Value::String(title) => json!({
                "type": "postback",
                "title": title,
                "payload": format!("{}{}", BUTTON_PAYLOAD_PREFIX, normalize_label(title)),
            }),
            Value::Object(map) if map.contains_key("title") => button.clone(),
            _ => json!({}),
        })
        .collect()
}

/// Normalize a caller-supplied quick-reply list into wire quick-reply objects.
/// A string becomes a text quick reply with a derived payload; an object with a
/// `title` gets `content_type` and `payload` defaults filled in; anything else
/// becomes an empty object.
pub fn format_quick_replies(replies: &[Value]) -> Vec<Value> {
    replies
        .iter()
        .map(|reply| match reply {
            Value::String(title) => json!({
                "content_type": "text",
                "title": title,
                "payload": format!("{}{}", QUICK_REPLY_PAYLOAD_PREFIX, normalize_label(title)),
            }),
            Value::Object(map) if map.contains_key("title") => {
                let mut map = map.clone();
                map.entry("content_type".to_string())
                    .or_insert_with(|| Value::String("text".to_string()));
                if !map.contains_key("payload") {
                    let derived = map
                        .get("title")
                        .and_then(|t| t.as_str())
                        .map(|t| format!("{}{}", QUICK_REPLY_PAYLOAD_PREFIX, normalize_label(t)))
                        .unwrap_or_default();
                    map.insert("payload".to_string(), Value::String(derived));
                }
                Value::Object(map)
            }
            _ => json!({}),
        })
        .collect()
}

/// A composed outbound message, immutable once built. `to_value` produces the
/// exact wire schema sent as the `message` field of a Send API call.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMessage {
    /// Plain text, optionally with quick-reply chips.
    Text {
        text: String,
        quick_replies: Vec<Value>,
    },
    /// Button template: text plus up to three action buttons.
    ButtonTemplate { text: String, buttons: Vec<Value> },
    /// Generic (card carousel) template.
    GenericTemplate { elements: Vec<Value> },
    /// Raw media attachment by URL.
    Attachment {
        kind: String,
        url: String,
        quick_replies: Vec<Value>,
    },
}

impl OutboundMessage {
    /// Plain text message.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text {
            text: text.into(),
            quick_replies: Vec::new(),
        }
    }

    /// Text message with quick-reply chips (normalized here).
    pub fn text_with_quick_replies(text: impl Into<String>, replies: &[Value]) -> Self {
        Self::Text {
            text: text.into(),
            quick_replies: format_quick_replies(replies),
        }
    }

    /// Wire shape of the message.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Text {
                text,
                quick_replies,
            } => {
                let mut message = json!({ "text": text });
                if !quick_replies.is_empty() {
                    message["quick_replies"] = Value::Array(quick_replies.clone());
                }
                message
            }
            Self::ButtonTemplate { text, buttons } => json!({
                "attachment": {
                    "type": "template",
                    "payload": {
                        "template_type": "button",
                        "text": text,
                        "buttons": buttons,
                    }
                }
            }),
            Self::GenericTemplate { elements } => json!({
                "attachment": {
                    "type": "template",
                    "payload": {
                        "template_type": "generic",
                        "elements": elements,
                    }
                }
            }),
            Self::Attachment {
                kind,
                url,
                quick_replies,
            } => {
                let mut message = json!({
                    "attachment": {
                        "type": kind,
                        "payload": { "url": url }
                    }
                });
                if !quick_replies.is_empty() {
                    message["quick_replies"] = Value::Array(quick_replies.clone());
                }
                message
            }
        }
    }

    /// Text length used for the auto-computed typing delay; zero for non-text.
    pub fn text_len(&self) -> usize {
        match self {
            Self::Text { text, .. } => text.len(),
            _ => 0,
        }
    }
}

/// Button template envelope over a normalized button list.
pub fn button_template(text: impl Into<String>, buttons: &[Value]) -> OutboundMessage {
    OutboundMessage::ButtonTemplate {
        text: text.into(),
        buttons: format_buttons(buttons),
    }
}

/// Generic (card) template envelope. Elements pass through as supplied.
pub fn generic_template(elements: &[Value]) -> OutboundMessage {
    OutboundMessage::GenericTemplate {
        elements: elements.to_vec(),
    }
}

/// Shape dispatch for say-style calls: a JSON string becomes text; an object
/// with `text` + `quickReplies` becomes a quick-reply text message; `text` +
/// `buttons` becomes a button template; `attachment` (with `type` and `url`)
/// becomes an attachment message. Returns `None` for every other shape so the
/// caller can log the unrecognized-shape error and no-op.
pub fn compose_say(message: &Value) -> Option<OutboundMessage> {
    match message {
        Value::String(text) => Some(OutboundMessage::text(text.clone())),
        Value::Object(map) => {
            if let Some(text) = map.get("text").and_then(|t| t.as_str()) {
                if let Some(replies) = map.get("quickReplies").and_then(|r| r.as_array()) {
                    return Some(OutboundMessage::text_with_quick_replies(text, replies));
                }
                if let Some(buttons) = map.get("buttons").and_then(|b| b.as_array()) {
                    return Some(button_template(text, buttons));
                }
                return Some(OutboundMessage::text(text));
            }
            let attachment = map.get("attachment")?;
            let kind = attachment.get("type").and_then(|t| t.as_str())?;
            let url = attachment.get("url").and_then(|u| u.as_str())?;
            let quick_replies = map
                .get("quickReplies")
                .and_then(|r| r.as_array())
                .map(|r| format_quick_replies(r))
                .unwrap_or_default();
            Some(OutboundMessage::Attachment {
                kind: kind.to_string(),
                url: url.to_string(),
                quick_replies,
            })
        }
        _ => None,
    }
}
