pub mod backend;
pub mod browser;
pub mod config;
pub mod error;
pub mod models;
pub mod page;
pub mod platform;
pub mod protocol;
pub mod reconcile;
pub mod sdk;
pub mod storage;
pub mod subscription;
pub mod token;
pub mod transport;
pub mod worker;

#[cfg(test)]
mod testing;

pub use browser::BrowserVariant;
pub use config::{Config, InitParams};
pub use error::{BackendError, PushError, Result};
pub use models::{DeviceRecord, NotificationStatus, Platform, Subscription};
pub use page::{page_channel, DeliveryDisposition, PageClient, PageInbox};
pub use protocol::WorkerMessage;
pub use reconcile::{ReconcileOutcome, Reconciler};
pub use sdk::{EnPush, PageEvent};
pub use storage::{KeyValueStore, MemoryStore, RedbStore};
pub use subscription::PushHost;
pub use transport::{ReqwestTransport, Transport};
pub use worker::{NotificationWorker, WorkerEvent};
