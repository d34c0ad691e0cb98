use std::sync::Arc;

use serde::Serialize;
use tracing::debug;
use url::Url;

use crate::{
    config::Config,
    error::{BackendError, PushError, Result},
    models::{BackendDeviceRecord, DeliveryStatus, DeviceRecord, TagSubscriptionRequest},
    transport::{HttpRequest, HttpResponse, Method, Transport},
};

pub const API_KEY_HEADER: &str = "en-api-key";

pub struct BackendClient {
    transport: Arc<dyn Transport>,
    api_root: String,
    api_key: String,
    destination_id: String,
}

impl BackendClient {
    pub fn new(config: &Config, transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            api_root: config.api_root(),
            api_key: config.api_key.clone(),
            destination_id: config.destination_id.clone(),
        }
    }

    pub fn destination_id(&self) -> &str {
        &self.destination_id
    }

    pub async fn get_device(&self, device_id: &str) -> Result<BackendDeviceRecord> {
        let path = format!("/destinations/{}/devices/{device_id}", self.destination_id);
        let response = self.call(Method::Get, &path, None::<&()>).await?;
        expect_record(response, &[200])
    }

    pub async fn create_device(&self, device: &DeviceRecord) -> Result<BackendDeviceRecord> {
        let path = format!("/destinations/{}/devices", self.destination_id);
        let response = self.call(Method::Post, &path, Some(device)).await?;
        expect_record(response, &[201])
    }

    pub async fn update_device(&self, device: &DeviceRecord) -> Result<BackendDeviceRecord> {
        let path = format!(
            "/destinations/{}/devices/{}",
            self.destination_id, device.device_id
        );
        let response = self.call(Method::Put, &path, Some(device)).await?;
        expect_record(response, &[200, 201])
    }

    pub async fn delete_device(&self, device_id: &str) -> Result<()> {
        let path = format!("/destinations/{}/devices/{device_id}", self.destination_id);
        let response = self.call(Method::Delete, &path, None::<&()>).await?;
        if response.status == 204 {
            Ok(())
        } else {
            Err(PushError::from_backend(BackendError::new(
                response.status,
                response.body,
            )))
        }
    }

    pub async fn post_delivery(&self, device_id: &str, status: &DeliveryStatus) -> Result<()> {
        let path = format!(
            "/destinations/{}/devices/{device_id}/delivery",
            self.destination_id
        );
        self.call(Method::Post, &path, Some(status))
            .await
            .and_then(expect_success)
            .map(|_| ())
    }

    pub async fn subscribe_tag(&self, device_id: &str, tag_name: &str) -> Result<String> {
        let path = format!("/destinations/{}/tag_subscriptions", self.destination_id);
        let body = TagSubscriptionRequest {
            device_id,
            tag_name,
        };
        self.call(Method::Post, &path, Some(&body))
            .await
            .and_then(expect_success)
    }

    pub async fn unsubscribe_tag(&self, device_id: &str, tag_name: &str) -> Result<String> {
        let url = self.tag_url(&[("device_id", device_id), ("tag_name", tag_name)])?;
        let response = self.send(Method::Delete, url, None).await;
        expect_success(response)
    }

    pub async fn retrieve_tag_subscriptions(&self, device_id: &str) -> Result<String> {
        let url = self.tag_url(&[("device_id", device_id)])?;
        let response = self.send(Method::Get, url, None).await;
        expect_success(response)
    }

    fn tag_url(&self, query: &[(&str, &str)]) -> Result<String> {
        let raw = format!(
            "{}/destinations/{}/tag_subscriptions",
            self.api_root, self.destination_id
        );
        let url = Url::parse_with_params(&raw, query)
            .map_err(|err| PushError::Transport(format!("invalid url {raw}: {err}")))?;
        Ok(url.to_string())
    }

    async fn call<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<HttpResponse> {
        let body = body.map(serde_json::to_string).transpose()?;
        let url = format!("{}{path}", self.api_root);
        Ok(self.send(method, url, body).await)
    }

    async fn send(&self, method: Method, url: String, body: Option<String>) -> HttpResponse {
        debug!("{} {url}", method.as_str());
        let request = HttpRequest {
            method,
            url,
            headers: vec![
                (
                    "Content-Type".to_string(),
                    "application/json; charset = UTF-8".to_string(),
                ),
                ("Accept-Language".to_string(), "en-US".to_string()),
                (API_KEY_HEADER.to_string(), self.api_key.clone()),
            ],
            body,
        };
        let response = self.transport.send(request).await;
        debug!("status {}", response.status);
        response
    }
}

fn expect_record(response: HttpResponse, accepted: &[u16]) -> Result<BackendDeviceRecord> {
    if accepted.contains(&response.status) {
        Ok(serde_json::from_str(&response.body)?)
    } else {
        Err(PushError::from_backend(BackendError::new(
            response.status,
            response.body,
        )))
    }
}

fn expect_success(response: HttpResponse) -> Result<String> {
    if response.is_success() {
        Ok(response.body)
    } else {
        Err(PushError::from_backend(BackendError::new(
            response.status,
            response.body,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{NotificationStatus, Platform},
        testing::{chrome_config, RecordingTransport},
    };
    use serde_json::{json, Value};

    fn client(transport: &Arc<RecordingTransport>) -> BackendClient {
        BackendClient::new(&chrome_config(), transport.clone())
    }

    #[tokio::test]
    async fn requests_carry_headers_and_paths() {
        let transport = RecordingTransport::new(vec![HttpResponse::new(
            200,
            r#"{"device_id":"dev-1","token":"tok"}"#,
        )]);
        let record = client(&transport).get_device("dev-1").await.unwrap();
        assert_eq!(record.device_id, "dev-1");

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        let request = &requests[0];
        assert_eq!(request.method, Method::Get);
        assert!(request
            .url
            .ends_with("/event-notifications/v1/instances/inst-1/destinations/chrome-dest/devices/dev-1"));
        assert!(request.body.is_none());
        let header = |name: &str| {
            request
                .headers
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.clone())
        };
        assert_eq!(header(API_KEY_HEADER).as_deref(), Some("key-1"));
        assert_eq!(header("Accept-Language").as_deref(), Some("en-US"));
        assert!(header("Content-Type").unwrap().starts_with("application/json"));
    }

    #[tokio::test]
    async fn lookup_failures_keep_status_and_body() {
        let transport = RecordingTransport::new(vec![HttpResponse::new(406, "bad device")]);
        let err = client(&transport).get_device("dev-1").await.unwrap_err();
        assert!(matches!(err, PushError::BackendRejected(_)));
        assert_eq!(err.backend().unwrap().body, "bad device");
    }

    #[tokio::test]
    async fn create_requires_201() {
        let transport = RecordingTransport::new(vec![HttpResponse::new(
            200,
            r#"{"device_id":"dev-1","token":"tok"}"#,
        )]);
        let device = DeviceRecord {
            device_id: "dev-1".to_string(),
            token: "tok".to_string(),
            platform: Platform::WebChrome,
            user_id: None,
        };
        let err = client(&transport).create_device(&device).await.unwrap_err();
        assert_eq!(err.status_code(), 200);

        let sent: Value = serde_json::from_str(transport.requests()[0].body.as_deref().unwrap()).unwrap();
        assert_eq!(sent, json!({"device_id": "dev-1", "token": "tok", "platform": "WEB_CHROME"}));
    }

    #[tokio::test]
    async fn delete_expects_no_content() {
        let transport = RecordingTransport::new(vec![
            HttpResponse::new(204, ""),
            HttpResponse::new(404, "missing"),
        ]);
        let backend = client(&transport);
        backend.delete_device("dev-1").await.unwrap();
        let err = backend.delete_device("dev-1").await.unwrap_err();
        assert!(matches!(err, PushError::BackendNotFound(_)));
        assert_eq!(transport.requests()[0].method, Method::Delete);
    }

    #[tokio::test]
    async fn delivery_posts_status_body() {
        let transport = RecordingTransport::new(vec![HttpResponse::new(202, "")]);
        let status = DeliveryStatus {
            notification_id: "N123".to_string(),
            status: NotificationStatus::Open,
            platform: Platform::WebChrome,
        };
        client(&transport).post_delivery("dev-1", &status).await.unwrap();
        let request = &transport.requests()[0];
        assert!(request.url.ends_with("/devices/dev-1/delivery"));
        let sent: Value = serde_json::from_str(request.body.as_deref().unwrap()).unwrap();
        assert_eq!(sent["notification_id"], "N123");
        assert_eq!(sent["status"], "OPEN");
    }

    #[tokio::test]
    async fn tag_requests_encode_query() {
        let transport = RecordingTransport::new(vec![
            HttpResponse::new(201, "{}"),
            HttpResponse::new(204, ""),
            HttpResponse::new(200, r#"{"tag_subscriptions":[]}"#),
        ]);
        let backend = client(&transport);
        backend.subscribe_tag("dev-1", "sports").await.unwrap();
        backend.unsubscribe_tag("dev-1", "big news").await.unwrap();
        let listed = backend.retrieve_tag_subscriptions("dev-1").await.unwrap();
        assert!(listed.contains("tag_subscriptions"));

        let requests = transport.requests();
        let sent: Value = serde_json::from_str(requests[0].body.as_deref().unwrap()).unwrap();
        assert_eq!(sent, json!({"device_id": "dev-1", "tag_name": "sports"}));
        assert!(requests[1]
            .url
            .ends_with("/tag_subscriptions?device_id=dev-1&tag_name=big+news"));
        assert!(requests[2].url.ends_with("/tag_subscriptions?device_id=dev-1"));
    }
}
