use std::{env, time::Duration};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    browser::BrowserVariant,
    error::{PushError, Result},
    models::Platform,
};

pub const REGION_US_SOUTH: &str = "us-south";
pub const REGION_UK: &str = "eu-gb";
pub const REGION_SYDNEY: &str = "au-syd";
pub const REGION_GERMANY: &str = "eu-de";
pub const REGION_MADRID: &str = "eu-es";
pub const REGION_BNPP: &str = "eu-fr2";

pub const DEFAULT_SERVICE_WORKER: &str = "ENPushServiceWorker.js";
pub const DEFAULT_PERMISSION_TIMEOUT: Duration = Duration::from_secs(60);

const PUSH_API_ENDPOINT: &str = ".event-notifications.cloud.ibm.com";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InitParams {
    pub instance_guid: String,
    pub apikey: String,
    pub region: String,
    pub chrome_destination_id: String,
    pub chrome_application_server_key: String,
    pub firefox_destination_id: String,
    pub firefox_application_server_key: String,
    pub safari_destination_id: String,
    pub website_push_id_safari: String,
    pub device_id: Option<String>,
    pub push_variables: Option<Map<String, Value>>,
    pub override_server_host: Option<String>,
    pub service_worker: Option<String>,
    pub use_private_endpoint: bool,
}

impl InitParams {
    pub fn from_env() -> anyhow::Result<Self> {
        let push_variables = match env::var("ENPUSH_PUSH_VARIABLES") {
            Ok(raw) if !raw.trim().is_empty() => Some(serde_json::from_str(&raw)?),
            _ => None,
        };

        Ok(Self {
            instance_guid: env_or("ENPUSH_INSTANCE_ID", ""),
            apikey: env_or("ENPUSH_API_KEY", ""),
            region: env_or("ENPUSH_REGION", REGION_US_SOUTH),
            chrome_destination_id: env_or("ENPUSH_CHROME_DESTINATION_ID", ""),
            chrome_application_server_key: env_or("ENPUSH_CHROME_APP_SERVER_KEY", ""),
            firefox_destination_id: env_or("ENPUSH_FIREFOX_DESTINATION_ID", ""),
            firefox_application_server_key: env_or("ENPUSH_FIREFOX_APP_SERVER_KEY", ""),
            safari_destination_id: env_or("ENPUSH_SAFARI_DESTINATION_ID", ""),
            website_push_id_safari: env_or("ENPUSH_SAFARI_WEBSITE_PUSH_ID", ""),
            device_id: env_opt("ENPUSH_DEVICE_ID"),
            push_variables,
            override_server_host: env_opt("ENPUSH_OVERRIDE_HOST"),
            service_worker: env_opt("ENPUSH_SERVICE_WORKER"),
            use_private_endpoint: env_or_parse("ENPUSH_USE_PRIVATE", false)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub instance_id: String,
    pub api_key: String,
    pub region: String,
    pub variant: BrowserVariant,
    pub destination_id: String,
    pub application_server_key: Option<String>,
    pub website_push_id: Option<String>,
    pub device_id_hint: Option<String>,
    pub template_variables: Option<Map<String, Value>>,
    pub override_host: Option<String>,
    pub service_worker: String,
    pub use_private_endpoint: bool,
    pub permission_timeout: Duration,
}

impl Config {
    pub fn resolve(params: &InitParams, variant: BrowserVariant) -> Result<Self> {
        let (destination_id, application_server_key, website_push_id) = match variant {
            BrowserVariant::Safari => (
                params.safari_destination_id.as_str(),
                None,
                non_empty(&params.website_push_id_safari),
            ),
            BrowserVariant::Firefox => (
                params.firefox_destination_id.as_str(),
                non_empty(&params.firefox_application_server_key),
                None,
            ),
            BrowserVariant::Chrome => (
                params.chrome_destination_id.as_str(),
                non_empty(&params.chrome_application_server_key),
                None,
            ),
        };

        let override_host = params.override_server_host.as_deref().and_then(non_empty);

        let mut missing = Vec::new();
        if params.instance_guid.trim().is_empty() {
            missing.push("instance_guid");
        }
        if params.apikey.trim().is_empty() {
            missing.push("apikey");
        }
        if destination_id.trim().is_empty() {
            missing.push("destination_id");
        }
        if params.region.trim().is_empty() && override_host.is_none() {
            missing.push("region");
        }
        match variant {
            BrowserVariant::Safari if website_push_id.is_none() => {
                missing.push("website_push_id_safari")
            }
            BrowserVariant::Chrome | BrowserVariant::Firefox
                if application_server_key.is_none() =>
            {
                missing.push("application_server_key")
            }
            _ => {}
        }
        if !missing.is_empty() {
            return Err(PushError::ConfigInvalid(format!(
                "missing {} for {variant}",
                missing.join(", ")
            )));
        }

        Ok(Self {
            instance_id: params.instance_guid.trim().to_string(),
            api_key: params.apikey.trim().to_string(),
            region: params.region.trim().to_string(),
            variant,
            destination_id: destination_id.trim().to_string(),
            application_server_key,
            website_push_id,
            device_id_hint: params.device_id.as_deref().and_then(non_empty),
            template_variables: params.push_variables.clone().filter(|vars| !vars.is_empty()),
            override_host,
            service_worker: params
                .service_worker
                .as_deref()
                .and_then(non_empty)
                .unwrap_or_else(|| DEFAULT_SERVICE_WORKER.to_string()),
            use_private_endpoint: params.use_private_endpoint,
            permission_timeout: DEFAULT_PERMISSION_TIMEOUT,
        })
    }

    pub fn with_permission_timeout(mut self, timeout: Duration) -> Self {
        self.permission_timeout = timeout;
        self
    }

    pub fn platform(&self) -> Platform {
        self.variant.platform()
    }

    pub fn base_url(&self) -> String {
        if let Some(host) = &self.override_host {
            return host.trim_end_matches('/').to_string();
        }
        if self.use_private_endpoint {
            format!("https://private.{}{PUSH_API_ENDPOINT}", self.region)
        } else {
            format!("https://{}{PUSH_API_ENDPOINT}", self.region)
        }
    }

    pub fn api_root(&self) -> String {
        format!(
            "{}/event-notifications/v1/instances/{}",
            self.base_url(),
            self.instance_id
        )
    }

    pub fn safari_web_service_url(&self) -> String {
        format!(
            "{}/destinations/{}/safariWebConf",
            self.api_root(),
            self.destination_id
        )
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| non_empty(&value))
}

fn env_or_parse<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(value) => Ok(value.parse()?),
        Err(_) => Ok(default),
    }
}
