use serde::{Deserialize, Serialize};

use crate::models::Platform;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserVariant {
    Safari,
    Firefox,
    Chrome,
}

impl BrowserVariant {
    pub fn from_user_agent(user_agent: &str) -> Self {
        let ua = user_agent.to_lowercase();
        // Chromium user agents also advertise "Safari".
        if ua.contains("safari") && !ua.contains("chrome") {
            BrowserVariant::Safari
        } else if ua.contains("firefox") {
            BrowserVariant::Firefox
        } else {
            BrowserVariant::Chrome
        }
    }

    pub fn platform(self) -> Platform {
        match self {
            BrowserVariant::Safari => Platform::WebSafari,
            BrowserVariant::Firefox => Platform::WebFirefox,
            BrowserVariant::Chrome => Platform::WebChrome,
        }
    }

    pub fn is_safari(self) -> bool {
        self == BrowserVariant::Safari
    }
}

impl std::fmt::Display for BrowserVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            BrowserVariant::Safari => "Safari",
            BrowserVariant::Firefox => "Firefox",
            BrowserVariant::Chrome => "Chrome",
        };
        f.write_str(name)
    }
}
