use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::{
    backend::BackendClient,
    error::Result,
    models::{DeliveryStatus, Platform},
    protocol::{ReplyPort, WorkerMessage},
    storage::{keys, KeyValueStore},
    worker::WorkerClient,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryDisposition {
    Reported,
    OptedOut,
    MissingDevice,
    Failed,
}

pub struct ForegroundRelay {
    store: Arc<dyn KeyValueStore>,
    backend: Arc<BackendClient>,
    platform: Platform,
}

impl ForegroundRelay {
    pub fn new(store: Arc<dyn KeyValueStore>, backend: Arc<BackendClient>, platform: Platform) -> Self {
        Self {
            store,
            backend,
            platform,
        }
    }

    pub fn set_reporting(&self, enabled: bool) -> Result<()> {
        self.store
            .set(keys::ENABLE_MESSAGE_STATUS, if enabled { "true" } else { "false" })?;
        Ok(())
    }

    pub fn reporting_enabled(&self) -> Result<bool> {
        let flag = self.store.get(keys::ENABLE_MESSAGE_STATUS)?;
        Ok(flag.as_deref() == Some("true"))
    }

    pub async fn report(&self, message: &WorkerMessage) -> DeliveryDisposition {
        let Some(status) = message.status() else {
            return DeliveryDisposition::OptedOut;
        };

        match self.reporting_enabled() {
            Ok(true) => {}
            Ok(false) => {
                debug!("message status reporting disabled, dropping {status:?}");
                return DeliveryDisposition::OptedOut;
            }
            Err(err) => {
                warn!("reading status reporting flag failed: {err}");
                return DeliveryDisposition::Failed;
            }
        }

        let device_id = match self.store.get_non_empty(keys::DEVICE_ID) {
            Ok(Some(device_id)) => device_id,
            Ok(None) => {
                warn!("no registered device, dropping {status:?}");
                return DeliveryDisposition::MissingDevice;
            }
            Err(err) => {
                warn!("reading device id failed: {err}");
                return DeliveryDisposition::Failed;
            }
        };

        let delivery = DeliveryStatus {
            notification_id: message.notification_id().unwrap_or_default(),
            status,
            platform: self.platform,
        };
        match self.backend.post_delivery(&device_id, &delivery).await {
            Ok(()) => {
                debug!(
                    "reported {:?} for notification {}",
                    delivery.status, delivery.notification_id
                );
                DeliveryDisposition::Reported
            }
            Err(err) => {
                warn!(
                    "reporting {:?} for notification {} failed: {err}",
                    delivery.status, delivery.notification_id
                );
                DeliveryDisposition::Failed
            }
        }
    }
}

pub struct InboundMessage {
    pub message: WorkerMessage,
    pub reply: ReplyPort,
}

impl InboundMessage {
    pub fn ack(self) -> WorkerMessage {
        // The worker may have given up waiting already.
        let _ = self.reply.send(Ok(Value::Null));
        self.message
    }

    pub fn reject(self, reason: impl Into<String>) {
        let _ = self.reply.send(Err(reason.into()));
    }
}

#[derive(Clone)]
pub struct PageClient {
    id: String,
    sender: mpsc::UnboundedSender<InboundMessage>,
}

pub struct PageInbox {
    receiver: mpsc::UnboundedReceiver<InboundMessage>,
}

impl PageInbox {
    pub async fn recv(&mut self) -> Option<InboundMessage> {
        self.receiver.recv().await
    }
}

pub fn page_channel(id: impl Into<String>) -> (PageClient, PageInbox) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (
        PageClient {
            id: id.into(),
            sender,
        },
        PageInbox { receiver },
    )
}

impl WorkerClient for PageClient {
    fn id(&self) -> &str {
        &self.id
    }

    fn post_message(&self, message: WorkerMessage, reply: ReplyPort) {
        // On failure the port is dropped with the message, which rejects the
        // handshake on the worker side.
        if self.sender.send(InboundMessage { message, reply }).is_err() {
            debug!("page {} is gone, message dropped", self.id);
        }
    }
}
