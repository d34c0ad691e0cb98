use std::{collections::HashMap, path::Path};

use parking_lot::RwLock;
use redb::{Database, TableDefinition};

use crate::error::PushError;

const ENTRIES: TableDefinition<&str, &str> = TableDefinition::new("en_push_storage");

pub mod keys {
    pub const DEVICE_ID: &str = "deviceId";
    pub const DESTINATION_ID: &str = "destinationId";
    pub const API_KEY: &str = "enapikey";
    pub const INSTANCE_ID: &str = "instanceId";
    pub const PUSH_BASE_URL: &str = "pushBaseUrl";
    pub const PUSH_VARIABLES: &str = "pushVaribales";
    pub const TOKEN: &str = "token";
    pub const ENABLE_MESSAGE_STATUS: &str = "enableMessageStatus";
}

#[derive(Debug)]
pub struct StoreError {
    pub message: String,
}

impl StoreError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl<E> From<E> for StoreError
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn from(err: E) -> Self {
        StoreError::new(err.to_string())
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl From<StoreError> for PushError {
    fn from(err: StoreError) -> Self {
        PushError::Storage(err.message)
    }
}

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    fn remove(&self, key: &str) -> Result<bool, StoreError>;

    // Empty values count as absent.
    fn get_non_empty(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.get(key)?.filter(|value| !value.is_empty()))
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.entries.write().remove(key).is_some())
    }
}

pub struct RedbStore {
    db: Database,
}

impl RedbStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let db = if path.exists() {
            Database::open(path)?
        } else {
            Database::create(path)?
        };
        let write_txn = db.begin_write()?;
        write_txn.open_table(ENTRIES)?;
        write_txn.commit()?;
        Ok(Self { db })
    }
}

impl KeyValueStore for RedbStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ENTRIES)?;
        let value = table.get(key)?.map(|value| value.value().to_string());
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(ENTRIES)?;
            table.insert(key, value)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool, StoreError> {
        let write_txn = self.db.begin_write()?;
        let removed = {
            let mut table = write_txn.open_table(ENTRIES)?;
            table.remove(key)?.is_some()
        };
        write_txn.commit()?;
        Ok(removed)
    }
}
