use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    backend::BackendClient,
    browser::BrowserVariant,
    config::{Config, InitParams},
    error::{PushError, Result},
    models::{DeliveryStatus, DeviceRecord, NotificationStatus, Subscription},
    page::{DeliveryDisposition, ForegroundRelay, PageInbox},
    platform::{PermissionState, WorkerState},
    protocol::WorkerMessage,
    reconcile::{ReconcileOutcome, Reconciler},
    storage::{keys, KeyValueStore},
    subscription::{acquire_subscription, PushHost, SafariUserInfo},
    token::normalize,
    transport::Transport,
};

#[derive(Debug, Clone, PartialEq)]
pub enum PageEvent {
    Delivery(DeliveryDisposition),
    Reregistered(ReconcileOutcome),
}

pub struct EnPush {
    config: Arc<Config>,
    host: PushHost,
    store: Arc<dyn KeyValueStore>,
    backend: Arc<BackendClient>,
    reconciler: Reconciler,
    relay: ForegroundRelay,
    last_user_id: Mutex<Option<String>>,
}

impl EnPush {
    pub async fn initialize(
        params: &InitParams,
        host: PushHost,
        store: Arc<dyn KeyValueStore>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        let variant = BrowserVariant::from_user_agent(&host.user_agent);
        info!("initializing push for {variant}");
        let config = Config::resolve(params, variant)?;

        let sdk = Self::build(config, host, store, transport)?;
        sdk.check_notification_support().await?;
        sdk.forward_template_variables().await;
        info!("successfully initialized push");
        Ok(sdk)
    }

    pub fn headless(
        params: &InitParams,
        variant: BrowserVariant,
        store: Arc<dyn KeyValueStore>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        let config = Config::resolve(params, variant)?;
        Self::build(config, PushHost::default(), store, transport)
    }

    fn build(
        config: Config,
        host: PushHost,
        store: Arc<dyn KeyValueStore>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        store.set(keys::PUSH_BASE_URL, &config.base_url())?;
        store.set(keys::DESTINATION_ID, &config.destination_id)?;
        store.set(keys::API_KEY, &config.api_key)?;
        store.set(keys::INSTANCE_ID, &config.instance_id)?;
        match &config.template_variables {
            Some(variables) => {
                store.set(keys::PUSH_VARIABLES, &serde_json::to_string(variables)?)?;
            }
            None => {
                store.remove(keys::PUSH_VARIABLES)?;
            }
        }
        let device_id = resolve_device_id(store.as_ref(), config.device_id_hint.as_deref())?;
        debug!("using device id {device_id}");

        let backend = Arc::new(BackendClient::new(&config, transport));
        let relay = ForegroundRelay::new(store.clone(), backend.clone(), config.platform());
        Ok(Self {
            config: Arc::new(config),
            host,
            store,
            reconciler: Reconciler::new(backend.clone()),
            backend,
            relay,
            last_user_id: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    pub fn variant(&self) -> BrowserVariant {
        self.config.variant
    }

    pub fn device_id(&self) -> Result<Option<String>> {
        Ok(self.store.get_non_empty(keys::DEVICE_ID)?)
    }

    pub async fn register(&self) -> Result<ReconcileOutcome> {
        self.register_as(None).await
    }

    pub async fn register_with_user_id(&self, user_id: &str) -> Result<ReconcileOutcome> {
        let user_id = Some(user_id.trim()).filter(|id| !id.is_empty());
        self.register_as(user_id.map(str::to_string)).await
    }

    async fn register_as(&self, user_id: Option<String>) -> Result<ReconcileOutcome> {
        *self.last_user_id.lock().await = user_id.clone();
        let device_id = resolve_device_id(self.store.as_ref(), None)?;
        let user_info = SafariUserInfo {
            device_id: &device_id,
            user_id: user_id.as_deref(),
        };
        let subscription = acquire_subscription(&self.config, &self.host, user_info).await?;
        self.register_subscription(&subscription, user_id.as_deref())
            .await
    }

    pub async fn register_subscription(
        &self,
        subscription: &Subscription,
        user_id: Option<&str>,
    ) -> Result<ReconcileOutcome> {
        let token = normalize(subscription, self.config.variant)?;
        let device_id = resolve_device_id(self.store.as_ref(), None)?;
        self.store.set(keys::TOKEN, &token)?;

        let device = DeviceRecord {
            device_id,
            token,
            platform: self.config.platform(),
            user_id: user_id.map(str::to_string),
        };
        let outcome = self.reconciler.reconcile(&device).await?;
        info!("device {} {}", device.device_id, outcome.kind());
        Ok(outcome)
    }

    pub async fn unregister(&self) -> Result<()> {
        if !self.config.variant.is_safari() {
            let manager = self.host.push_manager()?;
            let subscription = manager
                .get_subscription()
                .await
                .map_err(|err| PushError::NotSupported(format!("reading push subscription: {err}")))?;
            if subscription.is_none() {
                return Err(PushError::NotSupported(
                    "The device is not enabled for push notifications".to_string(),
                ));
            }
            let dropped = manager.unsubscribe().await.map_err(|err| {
                PushError::PermissionDenied(format!("Error in unregistration: {err}"))
            })?;
            debug!("platform subscription dropped: {dropped}");
        }
        self.unregister_device().await
    }

    pub async fn unregister_device(&self) -> Result<()> {
        let device_id = self.registered_device_id()?;
        self.backend.delete_device(&device_id).await.inspect_err(|err| {
            warn!("unregistering device {device_id} failed: {err}");
        })?;
        self.store.set(keys::DEVICE_ID, "")?;
        info!("unregistered device {device_id}");
        Ok(())
    }

    pub fn enable_message_status_report(&self, enabled: bool) -> Result<()> {
        self.relay.set_reporting(enabled)
    }

    pub async fn report_delivery(
        &self,
        notification_id: &str,
        status: NotificationStatus,
    ) -> Result<()> {
        let device_id = self.registered_device_id()?;
        let delivery = DeliveryStatus {
            notification_id: notification_id.to_string(),
            status,
            platform: self.config.platform(),
        };
        self.backend.post_delivery(&device_id, &delivery).await
    }

    pub async fn subscribe_tags(&self, tag_name: &str) -> Result<String> {
        let device_id = self.registered_device_id()?;
        self.backend.subscribe_tag(&device_id, tag_name).await
    }

    pub async fn unsubscribe_tags(&self, tag_name: &str) -> Result<String> {
        let device_id = self.registered_device_id()?;
        self.backend.unsubscribe_tag(&device_id, tag_name).await
    }

    pub async fn retrieve_subscriptions(&self) -> Result<String> {
        let device_id = self.registered_device_id()?;
        self.backend.retrieve_tag_subscriptions(&device_id).await
    }

    pub async fn handle_worker_message(&self, message: &WorkerMessage) -> Result<PageEvent> {
        match message {
            WorkerMessage::UpdateRegistration => {
                let user_id = self.last_user_id.lock().await.clone();
                info!("push subscription changed, registering again");
                let outcome = self.register_as(user_id).await?;
                Ok(PageEvent::Reregistered(outcome))
            }
            other => Ok(PageEvent::Delivery(self.relay.report(other).await)),
        }
    }

    pub async fn handle_raw_worker_message(&self, raw: &Value) -> Result<PageEvent> {
        let message = WorkerMessage::decode(raw).inspect_err(|err| {
            warn!("dropping undecodable worker message: {err}");
        })?;
        self.handle_worker_message(&message).await
    }

    pub async fn serve_worker_messages(&self, mut inbox: PageInbox) {
        while let Some(inbound) = inbox.recv().await {
            let message = inbound.ack();
            if let Err(err) = self.handle_worker_message(&message).await {
                warn!("handling worker message failed: {err}");
            }
        }
        debug!("worker message channel closed");
    }

    async fn check_notification_support(&self) -> Result<()> {
        if self.config.variant.is_safari() {
            return Ok(());
        }
        let container = self.host.service_workers.as_ref().ok_or_else(|| {
            PushError::NotSupported("Service workers aren't supported in this browser.".to_string())
        })?;
        let registration = container
            .register(&self.config.service_worker)
            .await
            .map_err(|err| {
                PushError::NotSupported(format!(
                    "registering {} failed: {err}",
                    self.config.service_worker
                ))
            })?;
        match registration.state {
            WorkerState::Installing => debug!("service worker installing"),
            WorkerState::Waiting => debug!("service worker installed"),
            WorkerState::Active => debug!("service worker active"),
        }

        if !registration.can_show_notifications {
            return Err(PushError::NotSupported(
                "Notifications aren't supported on service workers.".to_string(),
            ));
        }
        let manager = self.host.push_manager()?;
        if !registration.has_push_manager {
            return Err(PushError::NotSupported("Push messaging isn't supported.".to_string()));
        }
        if manager.notification_permission() == PermissionState::Denied {
            return Err(PushError::PermissionDenied(
                "The user has blocked notifications.".to_string(),
            ));
        }
        Ok(())
    }

    async fn forward_template_variables(&self) {
        if self.config.variant.is_safari() {
            return;
        }
        let (Some(variables), Some(container)) =
            (&self.config.template_variables, &self.host.service_workers)
        else {
            return;
        };
        if let Err(err) = container
            .post_to_controller(Value::Object(variables.clone()))
            .await
        {
            warn!("forwarding template variables to the worker failed: {err}");
        }
    }

    fn registered_device_id(&self) -> Result<String> {
        self.device_id()?
            .ok_or_else(|| PushError::NotSupported("The device is not registered".to_string()))
    }
}

// Returns the device id to use, persisting it: an explicit `hint` wins, then
// a previously stored id, then a fresh UUID.
pub fn resolve_device_id(store: &dyn KeyValueStore, hint: Option<&str>) -> Result<String> {
    if let Some(hint) = hint.map(str::trim).filter(|hint| !hint.is_empty()) {
        store.set(keys::DEVICE_ID, hint)?;
        return Ok(hint.to_string());
    }
    if let Some(stored) = store.get_non_empty(keys::DEVICE_ID)? {
        return Ok(stored);
    }
    let generated = Uuid::new_v4().to_string();
    store.set(keys::DEVICE_ID, &generated)?;
    info!("generated device id {generated}");
    Ok(generated)
}
