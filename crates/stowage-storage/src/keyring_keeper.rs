use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use stowage_core::{
    paths::validate_secret_path, secrets::SecretsKeeper, Connection, ConnectionSlot, Identifiable,
    Identity, LifecycleState, StorageError,
};
use tracing::{debug, instrument};

/// Keychain service that secrets are filed under; each secret path is an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyringSession {
    service: String,
}

impl KeyringSession {
    pub fn service(&self) -> &str {
        &self.service
    }

    fn entry(&self, path: &str) -> Result<keyring::Entry, StorageError> {
        keyring::Entry::new(&self.service, path).map_err(|e| map_keyring_err(e, path))
    }
}

/// Keeper backed directly by the OS keychain via the `keyring` crate.
pub struct KeyringKeeper {
    identity: Identity,
    service: String,
    slot: ConnectionSlot<KeyringSession>,
}

impl KeyringKeeper {
    pub fn create(
        name: impl Into<String>,
        id: impl Into<String>,
        service: impl Into<String>,
    ) -> Result<Self, StorageError> {
        let service = service.into();
        if service.trim().is_empty() {
            return Err(StorageError::invalid_path(service, "keyring service is empty"));
        }
        Ok(Self {
            identity: Identity::new(name, id),
            service,
            slot: ConnectionSlot::new(),
        })
    }
}

impl Identifiable for KeyringKeeper {
    fn identity(&self) -> &Identity {
        &self.identity
    }

    fn identity_mut(&mut self) -> &mut Identity {
        &mut self.identity
    }
}

#[async_trait]
impl SecretsKeeper for KeyringKeeper {
    type Connection = KeyringSession;

    #[instrument(skip_all, fields(keeper = %self.identity.name, service = %self.service))]
    async fn init(&self) -> Result<(), StorageError> {
        self.slot.check_openable()?;
        self.slot.open(KeyringSession {
            service: self.service.clone(),
        })?;
        debug!("keyring keeper ready");
        Ok(())
    }

    async fn close(&self) -> Result<(), StorageError> {
        self.slot.close();
        Ok(())
    }

    fn state(&self) -> LifecycleState {
        self.slot.state()
    }

    fn connection(&self) -> Result<Connection<KeyringSession>, StorageError> {
        self.slot.acquire()
    }

    #[instrument(skip(self), fields(keeper = %self.identity.name))]
    async fn load_secret(&self, path: &str) -> Result<SecretString, StorageError> {
        let session = self.slot.acquire()?;
        let path = validate_secret_path(path)?;
        let value = session
            .entry(path)?
            .get_password()
            .map_err(|e| map_keyring_err(e, path))?;
        Ok(SecretString::from(value))
    }

    #[instrument(skip(self, content), fields(keeper = %self.identity.name))]
    async fn save_secret(&self, path: &str, content: SecretString) -> Result<(), StorageError> {
        let session = self.slot.acquire()?;
        let path = validate_secret_path(path)?;
        session
            .entry(path)?
            .set_password(content.expose_secret())
            .map_err(|e| map_keyring_err(e, path))
    }

    #[instrument(skip(self), fields(keeper = %self.identity.name))]
    async fn delete_secret(&self, path: &str) -> Result<(), StorageError> {
        let session = self.slot.acquire()?;
        let path = validate_secret_path(path)?;
        match session.entry(path)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(err) => Err(map_keyring_err(err, path)),
        }
    }
}

fn map_keyring_err(err: keyring::Error, path: &str) -> StorageError {
    match err {
        keyring::Error::NoEntry => StorageError::NotFound {
            path: path.to_string(),
        },
        keyring::Error::NoStorageAccess(e) => StorageError::Unavailable {
            reason: format!("keychain locked or unreachable: {e}"),
        },
        keyring::Error::BadEncoding(_) => StorageError::Corrupt {
            reason: format!("keychain entry for {path} is not utf-8"),
        },
        keyring::Error::TooLong(attr, max) => {
            StorageError::invalid_path(path, format!("{attr} longer than {max}"))
        }
        keyring::Error::Invalid(attr, reason) => {
            StorageError::invalid_path(path, format!("{attr}: {reason}"))
        }
        other => StorageError::Io {
            reason: other.to_string(),
        },
    }
}
