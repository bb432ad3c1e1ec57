mod memory_persister;

pub use memory_persister::{InMemoryPersister, MemoryVolume};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{
    error::StorageError,
    identity::Identifiable,
    lifecycle::{Connection, LifecycleState},
};

/// Outcome of a successful `save_file`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SaveReceipt {
    /// Where the content now lives, in the backend's own addressing scheme.
    pub location: String,
    /// Lowercase hex SHA-256 of the saved content.
    pub checksum: String,
    /// Content length in bytes.
    pub bytes: u64,
    pub saved_at: DateTime<Utc>,
}

impl SaveReceipt {
    pub fn for_content(location: impl Into<String>, content: &str) -> Self {
        Self {
            location: location.into(),
            checksum: checksum(content),
            bytes: content.len() as u64,
            saved_at: Utc::now(),
        }
    }
}

/// Hex SHA-256 used for receipts and integrity checks.
pub fn checksum(content: &str) -> String {
    format!("{:x}", Sha256::digest(content.as_bytes()))
}

/// Contract for entities that durably store named file content under a path.
///
/// Every operation other than the lifecycle calls requires the persister to be
/// `Ready`; before `init` they fail with `NotInitialized`, after `close` with `Closed`.
#[async_trait]
pub trait Persister: Identifiable + Send + Sync {
    /// Resource handed out by [`Persister::connection`].
    type Connection: Send + Sync + 'static;

    /// Bring the persister to `Ready`. Calling it again while ready is a no-op.
    async fn init(&self) -> Result<(), StorageError>;

    /// Release the backing resource. Idempotent; the persister cannot be reopened.
    async fn close(&self) -> Result<(), StorageError>;

    fn state(&self) -> LifecycleState;

    /// Typed handle to the backing resource for callers that need to go below the
    /// contract.
    fn connection(&self) -> Result<Connection<Self::Connection>, StorageError>;

    /// Read the content of `name` under `path`.
    async fn load_file(&self, path: &str, name: &str) -> Result<String, StorageError>;

    /// Create or overwrite `name` under `path`.
    async fn save_file(
        &self,
        path: &str,
        name: &str,
        content: &str,
    ) -> Result<SaveReceipt, StorageError>;

    /// Remove `name` under `path` (idempotent).
    async fn delete_file(&self, path: &str, name: &str) -> Result<(), StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_is_sha256_hex() {
        assert_eq!(
            checksum("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn receipt_records_length() {
        let receipt = SaveReceipt::for_content("memory://a/b", "hello");
        assert_eq!(receipt.bytes, 5);
        assert_eq!(receipt.checksum, checksum("hello"));
        assert_eq!(receipt.location, "memory://a/b");
    }
}
