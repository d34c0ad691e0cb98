use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use futures_util::future::join_all;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::{
    error::{PushError, Result},
    platform::PlatformError,
    protocol::{message_channel, PushPayload, ReplyPort, WorkerMessage},
};

pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(5);

pub trait WorkerClient: Send + Sync {
    fn id(&self) -> &str;
    fn post_message(&self, message: WorkerMessage, reply: ReplyPort);
}

pub trait DisplayedNotification: Send + Sync {
    fn data(&self) -> Value;
    fn close(&self);
}

#[async_trait]
pub trait WorkerScope: Send + Sync {
    async fn skip_waiting(&self);
    async fn claim_clients(&self) -> std::result::Result<(), PlatformError>;
    async fn show_notification(
        &self,
        title: &str,
        options: Value,
    ) -> std::result::Result<(), PlatformError>;
    async fn match_all_clients(&self) -> Vec<Arc<dyn WorkerClient>>;
}

pub enum WorkerEvent {
    Install,
    Activate,
    Push { data: Option<String> },
    NotificationClick(Arc<dyn DisplayedNotification>),
    Message(Value),
    PushSubscriptionChange,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayReport {
    pub delivered: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    Dropped,
    DisplayFailed,
    Displayed(RelayReport),
}

pub struct NotificationWorker {
    scope: Arc<dyn WorkerScope>,
    reply_timeout: Duration,
    // Held in memory only. A restarted worker renders raw templates until the
    // next page initialize forwards the variables again.
    template_variables: RwLock<Map<String, Value>>,
}

impl NotificationWorker {
    pub fn new(scope: Arc<dyn WorkerScope>) -> Self {
        Self {
            scope,
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
            template_variables: RwLock::new(Map::new()),
        }
    }

    pub fn with_reply_timeout(mut self, reply_timeout: Duration) -> Self {
        self.reply_timeout = reply_timeout;
        self
    }

    pub async fn handle(&self, event: WorkerEvent) {
        match event {
            WorkerEvent::Install => self.on_install().await,
            WorkerEvent::Activate => self.on_activate().await,
            WorkerEvent::Push { data } => {
                self.on_push(data.as_deref()).await;
            }
            WorkerEvent::NotificationClick(notification) => {
                self.on_notification_click(notification.as_ref()).await;
            }
            WorkerEvent::Message(data) => self.on_message(data),
            WorkerEvent::PushSubscriptionChange => {
                self.on_push_subscription_change().await;
            }
        }
    }

    pub async fn on_install(&self) {
        info!("service worker installed");
        self.scope.skip_waiting().await;
    }

    pub async fn on_activate(&self) {
        info!("service worker activated");
        if let Err(err) = self.scope.claim_clients().await {
            warn!("claiming clients failed: {err}");
        }
    }

    pub async fn on_push(&self, data: Option<&str>) -> PushOutcome {
        let Some(raw) = data else {
            debug!("push without payload dropped");
            return PushOutcome::Dropped;
        };
        let Some(mut payload) = PushPayload::parse(raw) else {
            debug!("push payload without displayable content dropped");
            return PushOutcome::Dropped;
        };

        self.apply_templates(&mut payload);
        let nid = payload.notification_id().to_string();
        if let Err(err) = self
            .scope
            .show_notification(&payload.title, Value::Object(payload.options))
            .await
        {
            warn!("showing notification {nid} failed: {err}");
            return PushOutcome::DisplayFailed;
        }

        debug!("notification {nid} scheduled for display");
        PushOutcome::Displayed(self.broadcast(WorkerMessage::Seen(raw.to_string())).await)
    }

    pub async fn on_notification_click(&self, notification: &dyn DisplayedNotification) -> RelayReport {
        let data = notification.data();
        notification.close();
        self.broadcast(WorkerMessage::Open(data)).await
    }

    pub fn on_message(&self, data: Value) {
        let mut variables = self.template_variables.write();
        match data {
            Value::Object(map) => *variables = map,
            _ => variables.clear(),
        }
        debug!("cached {} template variables", variables.len());
    }

    pub async fn on_push_subscription_change(&self) -> RelayReport {
        info!("push subscription changed");
        self.broadcast(WorkerMessage::UpdateRegistration).await
    }

    fn apply_templates(&self, payload: &mut PushPayload) {
        let variables = self.template_variables.read();
        if variables.is_empty() {
            return;
        }
        payload.title = render_template(&payload.title, &variables);
        if let Some(Value::String(body)) = payload.options.get_mut("body") {
            *body = render_template(body, &variables);
        }
    }

    async fn broadcast(&self, message: WorkerMessage) -> RelayReport {
        let clients = self.scope.match_all_clients().await;
        let sends = clients
            .iter()
            .map(|client| send_to_client(client.as_ref(), message.clone(), self.reply_timeout));
        let results = join_all(sends).await;

        let mut report = RelayReport::default();
        for (client, result) in clients.iter().zip(results) {
            match result {
                Ok(_) => report.delivered += 1,
                Err(err) => {
                    warn!("relay to client {} failed: {err}", client.id());
                    report.failed += 1;
                }
            }
        }
        report
    }
}

async fn send_to_client(
    client: &dyn WorkerClient,
    message: WorkerMessage,
    reply_timeout: Duration,
) -> Result<Value> {
    let (port, reply) = message_channel();
    client.post_message(message, port);
    match timeout(reply_timeout, reply).await {
        Err(_) => Err(PushError::RelayTimeout(reply_timeout)),
        Ok(Err(_)) => Err(PushError::RelayRejected("reply port closed".to_string())),
        Ok(Ok(Err(reason))) => Err(PushError::RelayRejected(reason)),
        Ok(Ok(Ok(data))) => Ok(data),
    }
}

pub fn render_template(text: &str, variables: &Map<String, Value>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            out.push_str(&rest[start..]);
            return out;
        };
        let placeholder = &rest[start..start + 2 + end + 2];
        let replacement = match variables.get(after[..end].trim()) {
            Some(Value::String(value)) => Some(value.clone()),
            Some(Value::Number(value)) => Some(value.to_string()),
            _ => None,
        };
        out.push_str(replacement.as_deref().unwrap_or(placeholder));
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    out
}
