use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Platform {
    WebChrome,
    WebFirefox,
    WebSafari,
}

impl Platform {
    pub fn as_str(self) -> &'static str {
        match self {
            Platform::WebChrome => "WEB_CHROME",
            Platform::WebFirefox => "WEB_FIREFOX",
            Platform::WebSafari => "WEB_SAFARI",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub device_id: String,
    pub token: String,
    pub platform: Platform,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub user_id: Option<String>,
}

impl DeviceRecord {
    // Field by field comparison against the stored record. A user id is only
    // compared when this record carries one.
    pub fn matches(&self, existing: &BackendDeviceRecord) -> bool {
        // Destructured so a new field cannot be left out of the comparison.
        let DeviceRecord {
            device_id,
            token,
            platform,
            user_id,
        } = self;

        existing.device_id == *device_id
            && existing.token == *token
            && existing
                .platform
                .as_deref()
                .is_none_or(|stored| stored == platform.as_str())
            && user_id
                .as_ref()
                .is_none_or(|id| existing.user_id.as_ref() == Some(id))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendDeviceRecord {
    #[serde(default)]
    pub device_id: String,
    #[serde(default)]
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationStatus {
    Delivered,
    Seen,
    Open,
}

impl std::str::FromStr for NotificationStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_uppercase().as_str() {
            "DELIVERED" => Ok(NotificationStatus::Delivered),
            "SEEN" => Ok(NotificationStatus::Seen),
            "OPEN" => Ok(NotificationStatus::Open),
            other => Err(format!("unknown notification status {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryStatus {
    pub notification_id: String,
    pub status: NotificationStatus,
    pub platform: Platform,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebPushSubscription {
    pub endpoint: String,
    pub p256dh: Option<Vec<u8>>,
    pub auth: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Subscription {
    Web(WebPushSubscription),
    Safari { device_token: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeOptions {
    pub user_visible_only: bool,
    pub application_server_key: Option<Vec<u8>>,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct PushSubscriptionJson {
    pub endpoint: String,
    #[serde(rename = "expirationTime", default)]
    pub expiration_time: Option<i64>,
    pub keys: PushKeys,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct PushKeys {
    pub p256dh: String,
    pub auth: String,
}

#[derive(Serialize, Debug)]
pub struct TagSubscriptionRequest<'a> {
    pub device_id: &'a str,
    pub tag_name: &'a str,
}
