mod memory_keeper;

pub use memory_keeper::{InMemorySecretsKeeper, MemoryVault};

use async_trait::async_trait;
use secrecy::SecretString;

use crate::{
    error::StorageError,
    identity::Identifiable,
    lifecycle::{Connection, LifecycleState},
};

/// Contract for entities that store secret values under a path.
///
/// Shares the lifecycle rules of [`crate::persister::Persister`]. Implementations must
/// keep secret values out of logs and error messages.
#[async_trait]
pub trait SecretsKeeper: Identifiable + Send + Sync {
    type Connection: Send + Sync + 'static;

    async fn init(&self) -> Result<(), StorageError>;

    async fn close(&self) -> Result<(), StorageError>;

    fn state(&self) -> LifecycleState;

    fn connection(&self) -> Result<Connection<Self::Connection>, StorageError>;

    /// Retrieve the secret stored at `path`.
    async fn load_secret(&self, path: &str) -> Result<SecretString, StorageError>;

    /// Persist `content` at `path`, overwriting any existing secret.
    async fn save_secret(&self, path: &str, content: SecretString) -> Result<(), StorageError>;

    /// Remove the secret at `path` (idempotent).
    async fn delete_secret(&self, path: &str) -> Result<(), StorageError>;
}
