use std::sync::Arc;

use serde_json::json;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::{
    config::Config,
    error::{PushError, Result},
    models::{SubscribeOptions, Subscription},
    platform::{
        PermissionState, PushManager, SafariPermission, SafariPushNotification,
        ServiceWorkerContainer,
    },
    token::decode_b64url,
};

#[derive(Clone, Default)]
pub struct PushHost {
    pub user_agent: String,
    pub push_manager: Option<Arc<dyn PushManager>>,
    pub safari: Option<Arc<dyn SafariPushNotification>>,
    pub service_workers: Option<Arc<dyn ServiceWorkerContainer>>,
}

impl PushHost {
    pub fn push_manager(&self) -> Result<&Arc<dyn PushManager>> {
        self.push_manager
            .as_ref()
            .ok_or_else(|| PushError::NotSupported("Push messaging isn't supported.".to_string()))
    }

    pub fn safari(&self) -> Result<&Arc<dyn SafariPushNotification>> {
        self.safari.as_ref().ok_or_else(|| {
            PushError::NotSupported("Safari push notifications aren't available.".to_string())
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SafariUserInfo<'a> {
    pub device_id: &'a str,
    pub user_id: Option<&'a str>,
}

pub async fn acquire_subscription(
    config: &Config,
    host: &PushHost,
    user_info: SafariUserInfo<'_>,
) -> Result<Subscription> {
    if config.variant.is_safari() {
        acquire_safari(config, host.safari()?.as_ref(), user_info).await
    } else {
        acquire_web(config, host.push_manager()?.as_ref()).await
    }
}

async fn acquire_safari(
    config: &Config,
    safari: &dyn SafariPushNotification,
    user_info: SafariUserInfo<'_>,
) -> Result<Subscription> {
    let website_push_id = config
        .website_push_id
        .as_deref()
        .ok_or_else(|| PushError::ConfigInvalid("website push id missing".to_string()))?;

    let current = safari.permission(website_push_id);
    match current.permission {
        PermissionState::Granted => {
            debug!("Safari permission already granted");
            safari_token(current)
        }
        PermissionState::Denied => {
            info!("Safari push permission was denied");
            Err(PushError::PermissionDenied(
                "The user denied permission for Safari Push Notifications.".to_string(),
            ))
        }
        PermissionState::Default => {
            let web_service_url = config.safari_web_service_url();
            info!("requesting Safari push permission for {website_push_id} via {web_service_url}");
            let payload = json!({
                "deviceId": user_info.device_id,
                "userId": user_info.user_id,
            });
            let answer = timeout(
                config.permission_timeout,
                safari.request_permission(&web_service_url, website_push_id, &payload),
            )
            .await;

            match answer {
                Ok(result) if result.permission == PermissionState::Granted => {
                    info!("user granted Safari push permission");
                    safari_token(result)
                }
                Ok(result) if result.permission == PermissionState::Denied => {
                    Err(PushError::PermissionDenied(
                        "The user denied permission for Safari Push Notifications.".to_string(),
                    ))
                }
                Ok(_) => {
                    info!("Safari permission prompt dismissed without a decision");
                    Err(PushError::PermissionPending)
                }
                Err(_) => {
                    warn!(
                        "Safari permission prompt unanswered after {:?}",
                        config.permission_timeout
                    );
                    Err(PushError::PermissionPending)
                }
            }
        }
    }
}

fn safari_token(permission: SafariPermission) -> Result<Subscription> {
    match permission.device_token {
        Some(device_token) if !device_token.is_empty() => Ok(Subscription::Safari { device_token }),
        _ => Err(PushError::MalformedSubscription(
            "Safari granted permission without a device token".to_string(),
        )),
    }
}

async fn acquire_web(config: &Config, manager: &dyn PushManager) -> Result<Subscription> {
    let existing = manager
        .get_subscription()
        .await
        .map_err(|err| PushError::NotSupported(format!("reading push subscription: {err}")))?;
    if let Some(subscription) = existing {
        debug!("reusing existing push subscription for {}", subscription.endpoint);
        return Ok(Subscription::Web(subscription));
    }

    let options = subscribe_options(config)?;
    match manager.subscribe(&options).await {
        Ok(subscription) => {
            info!("created push subscription for {}", subscription.endpoint);
            Ok(Subscription::Web(subscription))
        }
        Err(err) if manager.notification_permission() == PermissionState::Denied => {
            info!("permission for notifications was denied: {err}");
            Err(PushError::PermissionDenied(
                "The user has blocked notifications.".to_string(),
            ))
        }
        Err(err) => {
            warn!("unable to subscribe to push: {err}");
            Err(PushError::NotSupported(format!("unable to subscribe to push: {err}")))
        }
    }
}

pub fn subscribe_options(config: &Config) -> Result<SubscribeOptions> {
    let application_server_key = config
        .application_server_key
        .as_deref()
        .map(|key| {
            decode_b64url(key).map_err(|err| {
                PushError::ConfigInvalid(format!("application server key is not base64url: {err}"))
            })
        })
        .transpose()?;

    Ok(SubscribeOptions {
        user_visible_only: true,
        application_server_key,
    })
}
