use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::{
    browser::BrowserVariant,
    config::{Config, InitParams, REGION_US_SOUTH},
    models::{SubscribeOptions, WebPushSubscription},
    platform::{
        PermissionState, PlatformError, PushManager, SafariPermission, SafariPushNotification,
        ServiceWorkerContainer, WorkerRegistration, WorkerState,
    },
    protocol::{ReplyPort, WorkerMessage},
    transport::{HttpRequest, HttpResponse, Transport},
    worker::{DisplayedNotification, WorkerClient, WorkerScope},
};

pub const CHROME_UA: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
pub const SAFARI_UA: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15";

pub fn test_params() -> InitParams {
    InitParams {
        instance_guid: "inst-1".to_string(),
        apikey: "key-1".to_string(),
        region: REGION_US_SOUTH.to_string(),
        chrome_destination_id: "chrome-dest".to_string(),
        chrome_application_server_key: "BEl62iUYgUivxIkv69yViEuiBIa-Ib9-SkvMeAtA3LFgDzkrxZJjSgSnfckjBJuBkr3qBUYIHBQFLXYp5Nksh8U".to_string(),
        firefox_destination_id: "firefox-dest".to_string(),
        firefox_application_server_key: "ff-key".to_string(),
        safari_destination_id: "safari-dest".to_string(),
        website_push_id_safari: "web.com.example".to_string(),
        ..InitParams::default()
    }
}

pub fn chrome_config() -> Config {
    Config::resolve(&test_params(), BrowserVariant::Chrome).unwrap()
}

pub fn safari_config() -> Config {
    Config::resolve(&test_params(), BrowserVariant::Safari).unwrap()
}

pub fn sample_web_subscription() -> WebPushSubscription {
    let mut p256dh = vec![0x04];
    p256dh.extend((1..=64).map(|byte: u8| byte.wrapping_mul(3)));
    WebPushSubscription {
        endpoint: "https://fcm.googleapis.com/fcm/send/abc123".to_string(),
        p256dh: Some(p256dh),
        auth: Some((0..16).collect()),
    }
}

// Unscripted requests get status 0, like an unreachable host.
pub struct RecordingTransport {
    responses: Mutex<VecDeque<HttpResponse>>,
    requests: Mutex<Vec<HttpRequest>>,
    delay: Mutex<Duration>,
}

impl RecordingTransport {
    pub fn new(responses: Vec<HttpResponse>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
            delay: Mutex::new(Duration::ZERO),
        })
    }

    pub fn with_delay(self: Arc<Self>, delay: Duration) -> Arc<Self> {
        *self.delay.lock() = delay;
        self
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, request: HttpRequest) -> HttpResponse {
        self.requests.lock().push(request);
        let response = self
            .responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| HttpResponse::new(0, "no scripted response"));
        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        response
    }
}

pub struct FakePushManager {
    existing: Mutex<Option<WebPushSubscription>>,
    on_subscribe: Option<WebPushSubscription>,
    permission: PermissionState,
    subscribe_calls: AtomicUsize,
    unsubscribe_calls: AtomicUsize,
    last_options: Mutex<Option<SubscribeOptions>>,
}

impl FakePushManager {
    fn build(
        existing: Option<WebPushSubscription>,
        on_subscribe: Option<WebPushSubscription>,
        permission: PermissionState,
    ) -> Arc<Self> {
        Arc::new(Self {
            existing: Mutex::new(existing),
            on_subscribe,
            permission,
            subscribe_calls: AtomicUsize::new(0),
            unsubscribe_calls: AtomicUsize::new(0),
            last_options: Mutex::new(None),
        })
    }

    pub fn with_existing(subscription: WebPushSubscription) -> Arc<Self> {
        Self::build(Some(subscription), None, PermissionState::Granted)
    }

    pub fn subscribing(subscription: WebPushSubscription) -> Arc<Self> {
        Self::build(None, Some(subscription), PermissionState::Default)
    }

    pub fn failing(permission: PermissionState) -> Arc<Self> {
        Self::build(None, None, permission)
    }

    pub fn subscribe_calls(&self) -> usize {
        self.subscribe_calls.load(Ordering::SeqCst)
    }

    pub fn unsubscribe_calls(&self) -> usize {
        self.unsubscribe_calls.load(Ordering::SeqCst)
    }

    pub fn last_options(&self) -> Option<SubscribeOptions> {
        self.last_options.lock().clone()
    }
}

#[async_trait]
impl PushManager for FakePushManager {
    async fn get_subscription(&self) -> Result<Option<WebPushSubscription>, PlatformError> {
        Ok(self.existing.lock().clone())
    }

    async fn subscribe(
        &self,
        options: &SubscribeOptions,
    ) -> Result<WebPushSubscription, PlatformError> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_options.lock() = Some(options.clone());
        let subscription = self
            .on_subscribe
            .clone()
            .ok_or_else(|| PlatformError::new("AbortError: registration failed"))?;
        *self.existing.lock() = Some(subscription.clone());
        Ok(subscription)
    }

    async fn unsubscribe(&self) -> Result<bool, PlatformError> {
        self.unsubscribe_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.existing.lock().take().is_some())
    }

    fn notification_permission(&self) -> PermissionState {
        self.permission
    }
}

pub struct FakeSafari {
    current: Mutex<SafariPermission>,
    // `None` never answers the prompt.
    answer: Option<SafariPermission>,
    prompts: AtomicUsize,
    last_prompt: Mutex<Option<(String, Value)>>,
}

impl FakeSafari {
    fn build(current: SafariPermission, answer: Option<SafariPermission>) -> Arc<Self> {
        Arc::new(Self {
            current: Mutex::new(current),
            answer,
            prompts: AtomicUsize::new(0),
            last_prompt: Mutex::new(None),
        })
    }

    fn state(permission: PermissionState, token: Option<&str>) -> SafariPermission {
        SafariPermission {
            permission,
            device_token: token.map(str::to_string),
        }
    }

    pub fn granted(token: &str) -> Arc<Self> {
        Self::build(Self::state(PermissionState::Granted, Some(token)), None)
    }

    pub fn denied() -> Arc<Self> {
        Self::build(Self::state(PermissionState::Denied, None), None)
    }

    pub fn prompting(answer: PermissionState, token: Option<&str>) -> Arc<Self> {
        Self::build(
            Self::state(PermissionState::Default, None),
            Some(Self::state(answer, token)),
        )
    }

    pub fn never_answering() -> Arc<Self> {
        Self::build(Self::state(PermissionState::Default, None), None)
    }

    pub fn prompts(&self) -> usize {
        self.prompts.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<(String, Value)> {
        self.last_prompt.lock().clone()
    }
}

#[async_trait]
impl SafariPushNotification for FakeSafari {
    fn permission(&self, _website_push_id: &str) -> SafariPermission {
        self.current.lock().clone()
    }

    async fn request_permission(
        &self,
        web_service_url: &str,
        _website_push_id: &str,
        user_info: &Value,
    ) -> SafariPermission {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        *self.last_prompt.lock() = Some((web_service_url.to_string(), user_info.clone()));
        match &self.answer {
            Some(answer) => {
                if answer.permission != PermissionState::Default {
                    *self.current.lock() = answer.clone();
                }
                answer.clone()
            }
            None => std::future::pending().await,
        }
    }
}

pub struct FakeContainer {
    registration: WorkerRegistration,
    registered: Mutex<Vec<String>>,
    posted: Mutex<Vec<Value>>,
}

impl FakeContainer {
    fn build(can_show_notifications: bool, has_push_manager: bool) -> Arc<Self> {
        Arc::new(Self {
            registration: WorkerRegistration {
                state: WorkerState::Active,
                can_show_notifications,
                has_push_manager,
            },
            registered: Mutex::new(Vec::new()),
            posted: Mutex::new(Vec::new()),
        })
    }

    pub fn active() -> Arc<Self> {
        Self::build(true, true)
    }

    pub fn without_notifications() -> Arc<Self> {
        Self::build(false, true)
    }

    pub fn without_push_manager() -> Arc<Self> {
        Self::build(true, false)
    }

    pub fn registered_scripts(&self) -> Vec<String> {
        self.registered.lock().clone()
    }

    pub fn posted(&self) -> Vec<Value> {
        self.posted.lock().clone()
    }
}

#[async_trait]
impl ServiceWorkerContainer for FakeContainer {
    async fn register(&self, script: &str) -> Result<WorkerRegistration, PlatformError> {
        self.registered.lock().push(script.to_string());
        Ok(self.registration.clone())
    }

    async fn post_to_controller(&self, message: Value) -> Result<(), PlatformError> {
        self.posted.lock().push(message);
        Ok(())
    }
}

enum ClientReply {
    Ack,
    Reject(String),
    Silent,
}

pub struct FakeClient {
    id: String,
    reply: ClientReply,
    received: Mutex<Vec<WorkerMessage>>,
    held: Mutex<Vec<ReplyPort>>,
}

impl FakeClient {
    fn build(id: &str, reply: ClientReply) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            reply,
            received: Mutex::new(Vec::new()),
            held: Mutex::new(Vec::new()),
        })
    }

    pub fn acking(id: &str) -> Arc<Self> {
        Self::build(id, ClientReply::Ack)
    }

    pub fn rejecting(id: &str, reason: &str) -> Arc<Self> {
        Self::build(id, ClientReply::Reject(reason.to_string()))
    }

    // Keeps the reply port open without ever answering.
    pub fn silent(id: &str) -> Arc<Self> {
        Self::build(id, ClientReply::Silent)
    }

    pub fn received(&self) -> Vec<WorkerMessage> {
        self.received.lock().clone()
    }
}

impl WorkerClient for FakeClient {
    fn id(&self) -> &str {
        &self.id
    }

    fn post_message(&self, message: WorkerMessage, reply: ReplyPort) {
        self.received.lock().push(message);
        match &self.reply {
            ClientReply::Ack => {
                let _ = reply.send(Ok(Value::Null));
            }
            ClientReply::Reject(reason) => {
                let _ = reply.send(Err(reason.clone()));
            }
            ClientReply::Silent => self.held.lock().push(reply),
        }
    }
}

pub struct FakeNotification {
    data: Value,
    closed: AtomicBool,
}

impl FakeNotification {
    pub fn new(data: Value) -> Arc<Self> {
        Arc::new(Self {
            data,
            closed: AtomicBool::new(false),
        })
    }

    pub fn closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl DisplayedNotification for FakeNotification {
    fn data(&self) -> Value {
        self.data.clone()
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

pub struct FakeScope {
    clients: Vec<Arc<FakeClient>>,
    fail_display: AtomicBool,
    shown: Mutex<Vec<(String, Value)>>,
    skipped_waiting: AtomicBool,
    claimed: AtomicBool,
}

impl FakeScope {
    pub fn with_clients(clients: Vec<Arc<FakeClient>>) -> Arc<Self> {
        Arc::new(Self {
            clients,
            fail_display: AtomicBool::new(false),
            shown: Mutex::new(Vec::new()),
            skipped_waiting: AtomicBool::new(false),
            claimed: AtomicBool::new(false),
        })
    }

    pub fn failing_display(self: Arc<Self>) -> Arc<Self> {
        self.fail_display.store(true, Ordering::SeqCst);
        self
    }

    pub fn shown(&self) -> Vec<(String, Value)> {
        self.shown.lock().clone()
    }

    pub fn skipped_waiting(&self) -> bool {
        self.skipped_waiting.load(Ordering::SeqCst)
    }

    pub fn claimed(&self) -> bool {
        self.claimed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WorkerScope for FakeScope {
    async fn skip_waiting(&self) {
        self.skipped_waiting.store(true, Ordering::SeqCst);
    }

    async fn claim_clients(&self) -> Result<(), PlatformError> {
        self.claimed.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn show_notification(&self, title: &str, options: Value) -> Result<(), PlatformError> {
        if self.fail_display.load(Ordering::SeqCst) {
            return Err(PlatformError::new("TypeError: no notification permission"));
        }
        self.shown.lock().push((title.to_string(), options));
        Ok(())
    }

    async fn match_all_clients(&self) -> Vec<Arc<dyn WorkerClient>> {
        self.clients
            .iter()
            .map(|client| client.clone() as Arc<dyn WorkerClient>)
            .collect()
    }
}
