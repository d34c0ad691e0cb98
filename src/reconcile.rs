use std::{collections::HashMap, sync::Arc};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{
    backend::BackendClient,
    error::{PushError, Result},
    models::{BackendDeviceRecord, DeviceRecord},
};

#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    Created(BackendDeviceRecord),
    Updated(BackendDeviceRecord),
    Unchanged(BackendDeviceRecord),
}

impl ReconcileOutcome {
    pub fn record(&self) -> &BackendDeviceRecord {
        match self {
            ReconcileOutcome::Created(record)
            | ReconcileOutcome::Updated(record)
            | ReconcileOutcome::Unchanged(record) => record,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ReconcileOutcome::Created(_) => "created",
            ReconcileOutcome::Updated(_) => "updated",
            ReconcileOutcome::Unchanged(_) => "unchanged",
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            ReconcileOutcome::Updated(_) => 200,
            ReconcileOutcome::Created(_) | ReconcileOutcome::Unchanged(_) => 201,
        }
    }
}

// At most one reconciliation runs per device id; concurrent callers for the
// same device queue up behind each other, different devices proceed freely.
pub struct Reconciler {
    backend: Arc<BackendClient>,
    in_flight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Reconciler {
    pub fn new(backend: Arc<BackendClient>) -> Self {
        Self {
            backend,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub async fn reconcile(&self, device: &DeviceRecord) -> Result<ReconcileOutcome> {
        let lock = self.device_lock(&device.device_id).await;
        let _guard = lock.lock().await;

        debug!("checking previous registration of {}", device.device_id);
        match self.backend.get_device(&device.device_id).await {
            Ok(existing) if device.matches(&existing) => {
                info!("device {} already registered, nothing changed", device.device_id);
                Ok(ReconcileOutcome::Unchanged(existing))
            }
            Ok(_) => {
                let updated = self.backend.update_device(device).await.inspect_err(|err| {
                    warn!("updating device {} failed: {err}", device.device_id);
                })?;
                info!("updated device {}", device.device_id);
                Ok(ReconcileOutcome::Updated(updated))
            }
            Err(PushError::BackendNotFound(_)) => {
                info!("registering new device {}", device.device_id);
                let created = self.backend.create_device(device).await.inspect_err(|err| {
                    warn!("registering device {} failed: {err}", device.device_id);
                })?;
                Ok(ReconcileOutcome::Created(created))
            }
            Err(err) => {
                warn!(
                    "verifying previous registration of {} failed: {err}",
                    device.device_id
                );
                Err(err)
            }
        }
    }

    async fn device_lock(&self, device_id: &str) -> Arc<Mutex<()>> {
        let mut in_flight = self.in_flight.lock().await;
        // Drop locks nobody is holding or waiting on.
        in_flight.retain(|id, lock| id == device_id || Arc::strong_count(lock) > 1);
        in_flight
            .entry(device_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
