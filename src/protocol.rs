use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::oneshot;

use crate::{
    error::{PushError, Result},
    models::NotificationStatus,
};

const LEGACY_OPEN: &str = "msgEventOpen";
const LEGACY_SEEN: &str = "msgEventSeen";
const LEGACY_UPDATE: &str = "updateRegistration";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum WorkerMessage {
    Seen(String),
    Open(Value),
    UpdateRegistration,
}

impl WorkerMessage {
    pub fn decode(value: &Value) -> Result<Self> {
        match value {
            Value::String(raw) => Self::decode_legacy(raw),
            other => Ok(serde_json::from_value(other.clone())?),
        }
    }

    fn decode_legacy(raw: &str) -> Result<Self> {
        let (command, payload) = raw.split_once(':').unwrap_or((raw, ""));
        match command {
            LEGACY_SEEN => Ok(WorkerMessage::Seen(payload.to_string())),
            LEGACY_OPEN => Ok(WorkerMessage::Open(serde_json::from_str(payload)?)),
            LEGACY_UPDATE => Ok(WorkerMessage::UpdateRegistration),
            other => Err(PushError::RelayRejected(format!(
                "unknown worker command {other:?}"
            ))),
        }
    }

    pub fn status(&self) -> Option<NotificationStatus> {
        match self {
            WorkerMessage::Seen(_) => Some(NotificationStatus::Seen),
            WorkerMessage::Open(_) => Some(NotificationStatus::Open),
            WorkerMessage::UpdateRegistration => None,
        }
    }

    pub fn notification_id(&self) -> Option<String> {
        let nid = match self {
            WorkerMessage::Seen(raw) => serde_json::from_str::<Value>(raw)
                .ok()
                .and_then(|payload| payload.get("en_nid").cloned()),
            WorkerMessage::Open(data) => data.get("en_nid").cloned(),
            WorkerMessage::UpdateRegistration => None,
        };
        nid.and_then(|value| value_to_text(&value))
    }
}

pub type ReplyPort = oneshot::Sender<std::result::Result<Value, String>>;
pub type ReplyReceiver = oneshot::Receiver<std::result::Result<Value, String>>;

pub fn message_channel() -> (ReplyPort, ReplyReceiver) {
    oneshot::channel()
}

#[derive(Debug, Clone, PartialEq)]
pub struct PushPayload {
    pub title: String,
    pub options: Map<String, Value>,
}

pub const DEFAULT_TITLE: &str = "New message";

impl PushPayload {
    // Returns `None` for payloads that must not be displayed: empty,
    // not a JSON object, or with an explicit `"alert": null`.
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.trim().is_empty() {
            return None;
        }
        let Ok(Value::Object(mut message)) = serde_json::from_str::<Value>(raw) else {
            return None;
        };
        if matches!(message.get("alert"), Some(Value::Null)) {
            return None;
        }

        let title = message
            .get("title")
            .and_then(value_to_text)
            .filter(|title| !title.is_empty())
            .unwrap_or_else(|| DEFAULT_TITLE.to_string());

        let mut options = match message.remove("options") {
            Some(Value::Object(options)) => options,
            _ => Map::new(),
        };
        let mut data = match options.remove("data") {
            Some(Value::Object(data)) => data,
            _ => Map::new(),
        };
        let nid = message
            .get("en_nid")
            .and_then(value_to_text)
            .unwrap_or_default();
        data.insert("en_nid".to_string(), Value::String(nid));
        options.insert("data".to_string(), Value::Object(data));

        Some(Self { title, options })
    }

    pub fn notification_id(&self) -> &str {
        self.options
            .get("data")
            .and_then(|data| data.get("en_nid"))
            .and_then(Value::as_str)
            .unwrap_or("")
    }
}

fn value_to_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}
