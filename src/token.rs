use base64::{decode_config, encode as base64_encode, STANDARD, URL_SAFE, URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};

use crate::{
    browser::BrowserVariant,
    error::{PushError, Result},
    models::{PushSubscriptionJson, Subscription, WebPushSubscription},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebPushToken {
    pub endpoint: String,
    #[serde(rename = "userPublicKey")]
    pub user_public_key: String,
    #[serde(rename = "userAuth")]
    pub user_auth: String,
}

impl WebPushToken {
    pub fn parse(token: &str) -> Result<Self> {
        Ok(serde_json::from_str(token)?)
    }

    pub fn public_key_bytes(&self) -> Result<Vec<u8>> {
        base64::decode(&self.user_public_key)
            .map_err(|err| PushError::MalformedSubscription(format!("userPublicKey: {err}")))
    }

    pub fn auth_bytes(&self) -> Result<Vec<u8>> {
        base64::decode(&self.user_auth)
            .map_err(|err| PushError::MalformedSubscription(format!("userAuth: {err}")))
    }
}

pub fn normalize(subscription: &Subscription, variant: BrowserVariant) -> Result<String> {
    match (subscription, variant) {
        (Subscription::Safari { device_token }, BrowserVariant::Safari) => {
            if device_token.trim().is_empty() {
                return Err(PushError::MalformedSubscription(
                    "empty Safari device token".to_string(),
                ));
            }
            Ok(device_token.clone())
        }
        (Subscription::Web(web), BrowserVariant::Chrome | BrowserVariant::Firefox) => {
            let token = web_push_token(web)?;
            Ok(serde_json::to_string(&token)?)
        }
        (_, variant) => Err(PushError::MalformedSubscription(format!(
            "subscription kind does not match {variant}"
        ))),
    }
}

fn web_push_token(subscription: &WebPushSubscription) -> Result<WebPushToken> {
    let endpoint = subscription.endpoint.trim();
    if endpoint.is_empty() {
        return Err(PushError::MalformedSubscription("endpoint missing".to_string()));
    }
    let p256dh = subscription
        .p256dh
        .as_deref()
        .filter(|key| !key.is_empty())
        .ok_or_else(|| PushError::MalformedSubscription("p256dh key missing".to_string()))?;
    let auth = subscription
        .auth
        .as_deref()
        .filter(|secret| !secret.is_empty())
        .ok_or_else(|| PushError::MalformedSubscription("auth secret missing".to_string()))?;

    Ok(WebPushToken {
        endpoint: endpoint.to_string(),
        user_public_key: base64_encode(p256dh),
        user_auth: base64_encode(auth),
    })
}

pub fn decode_b64url(value: &str) -> std::result::Result<Vec<u8>, base64::DecodeError> {
    decode_config(value, URL_SAFE_NO_PAD)
        .or_else(|_| decode_config(value, URL_SAFE))
        .or_else(|_| decode_config(value, STANDARD))
}

impl TryFrom<&PushSubscriptionJson> for WebPushSubscription {
    type Error = PushError;

    fn try_from(subscription: &PushSubscriptionJson) -> Result<Self> {
        let endpoint = subscription.endpoint.trim();
        if endpoint.is_empty() {
            return Err(malformed("endpoint required"));
        }
        if endpoint.len() > 2048 {
            return Err(malformed("endpoint too long"));
        }
        let url = url::Url::parse(endpoint).map_err(|_| malformed("invalid endpoint url"))?;
        if !url.scheme().eq_ignore_ascii_case("https") {
            return Err(malformed("endpoint must be https"));
        }
        if url.host_str().is_none() {
            return Err(malformed("endpoint host missing"));
        }

        let p256dh =
            decode_b64url(&subscription.keys.p256dh).map_err(|_| malformed("invalid p256dh"))?;
        // Uncompressed P-256 point.
        if p256dh.len() != 65 {
            return Err(malformed("invalid p256dh length"));
        }
        let auth = decode_b64url(&subscription.keys.auth).map_err(|_| malformed("invalid auth"))?;
        if auth.len() != 16 {
            return Err(malformed("invalid auth length"));
        }

        Ok(WebPushSubscription {
            endpoint: endpoint.to_string(),
            p256dh: Some(p256dh),
            auth: Some(auth),
        })
    }
}

fn malformed(message: &str) -> PushError {
    PushError::MalformedSubscription(message.to_string())
}
