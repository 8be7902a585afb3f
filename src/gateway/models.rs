use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::db::enums::InstanceStatus;

/// Connection state as reported by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Open,
    Connecting,
    Close,
    Unknown,
}

impl ConnectionState {
    pub fn from_remote(state: &str) -> Self {
        match state.trim().to_ascii_lowercase().as_str() {
            "open" => ConnectionState::Open,
            "connecting" => ConnectionState::Connecting,
            "close" | "closed" => ConnectionState::Close,
            _ => ConnectionState::Unknown,
        }
    }

    pub fn instance_status(self) -> InstanceStatus {
        match self {
            ConnectionState::Open => InstanceStatus::Connected,
            ConnectionState::Close => InstanceStatus::Disconnected,
            ConnectionState::Connecting | ConnectionState::Unknown => InstanceStatus::Pending,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            ConnectionState::Open => "open",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Close => "close",
            ConnectionState::Unknown => "unknown",
        };
        f.write_str(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[serde(alias = "texto")]
    Text,
    #[serde(alias = "imagem")]
    Image,
    #[serde(alias = "áudio")]
    Audio,
    #[serde(alias = "vídeo")]
    Video,
}

impl MessageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Image => "image",
            MessageKind::Audio => "audio",
            MessageKind::Video => "video",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single message to deliver. For media kinds `content` is the media URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    #[serde(rename = "type", default = "default_kind")]
    pub kind: MessageKind,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
}

fn default_kind() -> MessageKind {
    MessageKind::Text
}

impl OutgoingMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Text,
            content: content.into(),
            caption: None,
        }
    }

    pub fn is_blank(&self) -> bool {
        self.content.trim().is_empty()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateInstancePayload<'a> {
    pub instance_name: &'a str,
    pub qrcode: bool,
    pub integration: &'a str,
}

#[derive(Serialize)]
pub(crate) struct SendTextPayload<'a> {
    pub number: &'a str,
    pub text: &'a str,
}

#[derive(Serialize)]
pub(crate) struct SendMediaPayload<'a> {
    pub number: &'a str,
    pub mediatype: &'a str,
    pub media: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<&'a str>,
}

#[derive(Serialize)]
pub(crate) struct SendAudioPayload<'a> {
    pub number: &'a str,
    pub audio: &'a str,
}

pub fn digits_only(number: &str) -> String {
    number.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// First non-empty QR among `base64`, `code` and `qrcode` (string or `{base64}`).
pub fn extract_qr_code(body: &Value) -> Option<String> {
    let non_empty = |v: &Value| v.as_str().filter(|s| !s.is_empty()).map(str::to_owned);
    non_empty(&body["base64"])
        .or_else(|| non_empty(&body["code"]))
        .or_else(|| non_empty(&body["qrcode"]))
        .or_else(|| non_empty(&body["qrcode"]["base64"]))
}

pub fn extract_state(body: &Value) -> Option<String> {
    body["instance"]["state"]
        .as_str()
        .or_else(|| body["state"].as_str())
        .map(str::to_owned)
}

/// The connected number without its `@s.whatsapp.net` style suffix.
pub fn extract_connected_number(body: &Value) -> Option<String> {
    let raw = body["instance"]["wuid"]
        .as_str()
        .or_else(|| body["instance"]["phoneNumber"].as_str())?;
    let number = raw.split('@').next().unwrap_or(raw).trim();
    (!number.is_empty()).then(|| number.to_owned())
}

pub fn extract_message_id(body: &Value) -> Option<String> {
    body["key"]["id"].as_str().map(str::to_owned)
}

/// Best human-readable error out of a gateway error body.
pub fn extract_error_message(body: &Value) -> Option<String> {
    let candidates = [
        &body["message"],
        &body["response"]["message"],
        &body["error"],
    ];
    candidates.into_iter().find_map(message_text)
}

fn message_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Array(items) if !items.is_empty() => Some(
            items
                .iter()
                .map(|item| match item {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join("; "),
        ),
        _ => None,
    }
}
