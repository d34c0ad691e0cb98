use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::models::{SubscribeOptions, WebPushSubscription};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct PlatformError(pub String);

impl PlatformError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionState {
    Default,
    Granted,
    Denied,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafariPermission {
    pub permission: PermissionState,
    pub device_token: Option<String>,
}

#[async_trait]
pub trait PushManager: Send + Sync {
    async fn get_subscription(&self) -> Result<Option<WebPushSubscription>, PlatformError>;
    async fn subscribe(
        &self,
        options: &SubscribeOptions,
    ) -> Result<WebPushSubscription, PlatformError>;
    async fn unsubscribe(&self) -> Result<bool, PlatformError>;
    fn notification_permission(&self) -> PermissionState;
}

#[async_trait]
pub trait SafariPushNotification: Send + Sync {
    fn permission(&self, website_push_id: &str) -> SafariPermission;

    async fn request_permission(
        &self,
        web_service_url: &str,
        website_push_id: &str,
        user_info: &Value,
    ) -> SafariPermission;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Installing,
    Waiting,
    Active,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerRegistration {
    pub state: WorkerState,
    pub can_show_notifications: bool,
    pub has_push_manager: bool,
}

#[async_trait]
pub trait ServiceWorkerContainer: Send + Sync {
    async fn register(&self, script: &str) -> Result<WorkerRegistration, PlatformError>;
    async fn post_to_controller(&self, message: Value) -> Result<(), PlatformError>;
}
