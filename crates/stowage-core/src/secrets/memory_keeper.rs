use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
};

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tracing::instrument;

use super::SecretsKeeper;
use crate::{
    error::StorageError,
    identity::{Identifiable, Identity},
    lifecycle::{Connection, ConnectionSlot, LifecycleState},
    paths::validate_secret_path,
};

/// Masked secret values keyed by path.
#[derive(Debug, Default)]
pub struct MemoryVault {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryVault {
    pub fn contains(&self, path: &str) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(path)
    }
}

/// In-memory keeper for tests and smoke runs.
/// Values are XOR-masked so plaintext is not sitting in the map; this is not
/// encryption. Use `stowage_storage::EncryptedFileKeeper` for anything real.
#[derive(Debug)]
pub struct InMemorySecretsKeeper {
    identity: Identity,
    slot: ConnectionSlot<MemoryVault>,
}

impl InMemorySecretsKeeper {
    pub fn create(name: impl Into<String>, id: impl Into<String>) -> Result<Self, StorageError> {
        Ok(Self {
            identity: Identity::new(name, id),
            slot: ConnectionSlot::new(),
        })
    }
}

impl Identifiable for InMemorySecretsKeeper {
    fn identity(&self) -> &Identity {
        &self.identity
    }

    fn identity_mut(&mut self) -> &mut Identity {
        &mut self.identity
    }
}

#[async_trait]
impl SecretsKeeper for InMemorySecretsKeeper {
    type Connection = MemoryVault;

    async fn init(&self) -> Result<(), StorageError> {
        self.slot.open(MemoryVault::default())
    }

    async fn close(&self) -> Result<(), StorageError> {
        // Drop masked values eagerly; outstanding handles see an empty vault.
        if let Some(vault) = self.slot.close() {
            vault
                .entries
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clear();
        }
        Ok(())
    }

    fn state(&self) -> LifecycleState {
        self.slot.state()
    }

    fn connection(&self) -> Result<Connection<MemoryVault>, StorageError> {
        self.slot.acquire()
    }

    #[instrument(skip(self))]
    async fn load_secret(&self, path: &str) -> Result<SecretString, StorageError> {
        let vault = self.slot.acquire()?;
        let path = validate_secret_path(path)?;
        let entries = vault.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let masked = entries.get(path).ok_or_else(|| StorageError::NotFound {
            path: path.to_string(),
        })?;
        let plain = String::from_utf8(mask(masked)).map_err(|e| StorageError::Corrupt {
            reason: e.utf8_error().to_string(),
        })?;
        Ok(SecretString::from(plain))
    }

    #[instrument(skip(self, content))]
    async fn save_secret(&self, path: &str, content: SecretString) -> Result<(), StorageError> {
        let vault = self.slot.acquire()?;
        let path = validate_secret_path(path)?;
        let masked = mask(content.expose_secret().as_bytes());
        vault
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.to_string(), masked);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_secret(&self, path: &str) -> Result<(), StorageError> {
        let vault = self.slot.acquire()?;
        let path = validate_secret_path(path)?;
        vault
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(path);
        Ok(())
    }
}

const MASK_BYTE: u8 = 0xA5;

fn mask(input: &[u8]) -> Vec<u8> {
    input.iter().map(|b| b ^ MASK_BYTE).collect()
}
