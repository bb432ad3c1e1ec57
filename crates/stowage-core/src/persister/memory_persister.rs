use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
};

use async_trait::async_trait;
use tracing::{debug, instrument};

use super::{Persister, SaveReceipt};
use crate::{
    error::StorageError,
    identity::{Identifiable, Identity},
    lifecycle::{Connection, ConnectionSlot, LifecycleState},
    paths::FileLocation,
};

/// Map of `dir/name` keys to content, handed out as the in-memory connection.
#[derive(Debug, Default)]
pub struct MemoryVolume {
    files: Mutex<HashMap<String, String>>,
}

impl MemoryVolume {
    pub fn len(&self) -> usize {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Persister that keeps files in process memory. Useful for tests and dry runs.
#[derive(Debug)]
pub struct InMemoryPersister {
    identity: Identity,
    slot: ConnectionSlot<MemoryVolume>,
}

impl InMemoryPersister {
    pub fn create(name: impl Into<String>, id: impl Into<String>) -> Result<Self, StorageError> {
        Ok(Self {
            identity: Identity::new(name, id),
            slot: ConnectionSlot::new(),
        })
    }
}

impl Identifiable for InMemoryPersister {
    fn identity(&self) -> &Identity {
        &self.identity
    }

    fn identity_mut(&mut self) -> &mut Identity {
        &mut self.identity
    }
}

#[async_trait]
impl Persister for InMemoryPersister {
    type Connection = MemoryVolume;

    async fn init(&self) -> Result<(), StorageError> {
        self.slot.open(MemoryVolume::default())?;
        debug!(persister = %self.identity.name, "memory persister ready");
        Ok(())
    }

    async fn close(&self) -> Result<(), StorageError> {
        self.slot.close();
        Ok(())
    }

    fn state(&self) -> LifecycleState {
        self.slot.state()
    }

    fn connection(&self) -> Result<Connection<MemoryVolume>, StorageError> {
        self.slot.acquire()
    }

    #[instrument(skip(self))]
    async fn load_file(&self, path: &str, name: &str) -> Result<String, StorageError> {
        let volume = self.slot.acquire()?;
        let key = FileLocation::parse(path, name)?.key();
        let files = volume.files.lock().unwrap_or_else(PoisonError::into_inner);
        files
            .get(&key)
            .cloned()
            .ok_or(StorageError::NotFound { path: key })
    }

    #[instrument(skip(self, content))]
    async fn save_file(
        &self,
        path: &str,
        name: &str,
        content: &str,
    ) -> Result<SaveReceipt, StorageError> {
        let volume = self.slot.acquire()?;
        let key = FileLocation::parse(path, name)?.key();
        let receipt = SaveReceipt::for_content(format!("memory://{key}"), content);
        volume
            .files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, content.to_string());
        Ok(receipt)
    }

    #[instrument(skip(self))]
    async fn delete_file(&self, path: &str, name: &str) -> Result<(), StorageError> {
        let volume = self.slot.acquire()?;
        let key = FileLocation::parse(path, name)?.key();
        volume
            .files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persister::checksum;

    async fn ready() -> InMemoryPersister {
        let persister = InMemoryPersister::create("mem", "1").expect("create");
        persister.init().await.expect("init");
        persister
    }

    #[tokio::test]
    async fn save_then_load_returns_content() {
        let persister = ready().await;
        let receipt = persister
            .save_file("docs", "readme.md", "# hi")
            .await
            .expect("save");
        assert_eq!(receipt.location, "memory://docs/readme.md");
        assert_eq!(receipt.checksum, checksum("# hi"));

        let content = persister.load_file("docs", "readme.md").await.expect("load");
        assert_eq!(content, "# hi");
    }

    #[tokio::test]
    async fn missing_file_is_not_found_rather_than_empty() {
        let persister = ready().await;
        let err = persister.load_file("docs", "nope").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn equivalent_paths_address_same_file() {
        let persister = ready().await;
        persister.save_file("./a/b", "f", "x").await.expect("save");
        assert_eq!(persister.load_file("a//b", "f").await.expect("load"), "x");
    }

    #[tokio::test]
    async fn operations_before_init_fail() {
        let persister = InMemoryPersister::create("mem", "1").expect("create");
        assert_eq!(
            persister.load_file("", "f").await.unwrap_err(),
            StorageError::NotInitialized
        );
        assert_eq!(
            persister.save_file("", "f", "x").await.unwrap_err(),
            StorageError::NotInitialized
        );
        assert_eq!(
            persister.connection().unwrap_err(),
            StorageError::NotInitialized
        );
    }

    #[tokio::test]
    async fn close_invalidates_connection_and_blocks_reinit() {
        let persister = ready().await;
        persister.save_file("", "f", "x").await.expect("save");
        assert_eq!(persister.connection().expect("connection").len(), 1);

        persister.close().await.expect("close");
        persister.close().await.expect("close again");
        assert_eq!(persister.state(), LifecycleState::Closed);
        assert_eq!(persister.connection().unwrap_err(), StorageError::Closed);
        assert_eq!(persister.connection().unwrap_err(), StorageError::Closed);
        assert_eq!(persister.init().await.unwrap_err(), StorageError::Closed);
        assert_eq!(
            persister.load_file("", "f").await.unwrap_err(),
            StorageError::Closed
        );
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let persister = ready().await;
        persister.save_file("", "f", "x").await.expect("save");
        persister.delete_file("", "f").await.expect("delete");
        persister.delete_file("", "f").await.expect("delete again");
        assert!(persister.connection().expect("connection").is_empty());
    }

    #[test]
    fn identity_round_trip() {
        let mut persister = InMemoryPersister::create("mem", "1").expect("create");
        persister.set_id("42".into());
        persister.set_name("scratch".into());
        assert_eq!(persister.id(), "42");
        assert_eq!(persister.name(), "scratch");
    }
}
