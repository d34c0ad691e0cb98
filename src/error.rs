use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendError {
    pub status: u16,
    pub body: String,
}

impl BackendError {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.body.is_empty() {
            write!(f, "status {}", self.status)
        } else {
            write!(f, "status {}: {}", self.status, self.body)
        }
    }
}

#[derive(Debug, Error)]
pub enum PushError {
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("notification permission was not granted")]
    PermissionPending,
    #[error("not supported: {0}")]
    NotSupported(String),
    #[error("malformed subscription: {0}")]
    MalformedSubscription(String),
    #[error("device not found ({0})")]
    BackendNotFound(BackendError),
    #[error("backend rejected the request ({0})")]
    BackendRejected(BackendError),
    #[error("backend unavailable ({0})")]
    BackendUnavailable(BackendError),
    #[error("backend error ({0})")]
    Backend(BackendError),
    #[error("no reply from client within {0:?}")]
    RelayTimeout(Duration),
    #[error("client rejected relay: {0}")]
    RelayRejected(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PushError>;

impl PushError {
    pub fn from_backend(err: BackendError) -> Self {
        match err.status {
            404 => PushError::BackendNotFound(err),
            406 => PushError::BackendRejected(err),
            // Status 0 means the request never got an answer, usually a wrong instance id.
            0 | 500 => PushError::BackendUnavailable(err),
            _ => PushError::Backend(err),
        }
    }

    pub fn backend(&self) -> Option<&BackendError> {
        match self {
            PushError::BackendNotFound(err)
            | PushError::BackendRejected(err)
            | PushError::BackendUnavailable(err)
            | PushError::Backend(err) => Some(err),
            _ => None,
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            PushError::ConfigInvalid(_) => 404,
            PushError::PermissionDenied(_)
            | PushError::PermissionPending
            | PushError::NotSupported(_) => 401,
            PushError::MalformedSubscription(_) => 500,
            PushError::BackendNotFound(err)
            | PushError::BackendRejected(err)
            | PushError::BackendUnavailable(err)
            | PushError::Backend(err) => err.status,
            PushError::RelayTimeout(_) | PushError::RelayRejected(_) => 0,
            PushError::Transport(_) => 0,
            PushError::Storage(_) | PushError::Codec(_) => 500,
        }
    }
}
