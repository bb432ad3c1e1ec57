use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use rand::{rngs::OsRng, RngCore};
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Environment variable consulted for a base64 master key before the OS keyring.
pub const MASTER_KEY_ENV: &str = "STOWAGE_MASTER_KEY";

/// 256-bit key used to seal secrets at rest.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyMaterial {
    /// Short fingerprint of the key bytes, safe to log and store next to ciphertext.
    pub id: String,
    pub bytes: [u8; 32],
}

impl KeyMaterial {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self {
            id: fingerprint(&bytes),
            bytes,
        }
    }
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("keyring error: {0}")]
    Keyring(String),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Source of the master key (OS keychain in production, memory in tests).
#[async_trait]
pub trait KeyProvider: Send + Sync {
    async fn get_or_create(&self) -> Result<KeyMaterial, KeyError>;
}

/// Stores the master key as a keychain password, generating it on first use.
pub struct KeyringProvider {
    service: String,
    account: String,
}

impl KeyringProvider {
    pub fn new(service: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            account: account.into(),
        }
    }
}

#[async_trait]
impl KeyProvider for KeyringProvider {
    async fn get_or_create(&self) -> Result<KeyMaterial, KeyError> {
        let entry = keyring::Entry::new(&self.service, &self.account)
            .map_err(|e| KeyError::Keyring(e.to_string()))?;

        match entry.get_password() {
            Ok(secret) => decode_key(&secret),
            Err(keyring::Error::NoEntry) => {
                let material = generate_key();
                entry
                    .set_password(&encode_key(&material))
                    .map_err(|e| KeyError::Keyring(e.to_string()))?;
                Ok(material)
            }
            Err(err) => Err(KeyError::Keyring(err.to_string())),
        }
    }
}

/// Key supplied up front as base64, e.g. from config or [`MASTER_KEY_ENV`] in CI.
pub struct StaticKeyProvider {
    material: KeyMaterial,
}

impl StaticKeyProvider {
    pub fn from_base64(encoded: &SecretString) -> Result<Self, KeyError> {
        Ok(Self {
            material: decode_key(encoded.expose_secret())?,
        })
    }

    /// `None` when the variable is unset.
    pub fn from_env() -> Result<Option<Self>, KeyError> {
        match std::env::var(MASTER_KEY_ENV) {
            Ok(value) => Self::from_base64(&SecretString::from(value)).map(Some),
            Err(_) => Ok(None),
        }
    }
}

#[async_trait]
impl KeyProvider for StaticKeyProvider {
    async fn get_or_create(&self) -> Result<KeyMaterial, KeyError> {
        Ok(self.material.clone())
    }
}

/// In-memory key provider for tests and ephemeral sessions.
#[derive(Debug, Default, Clone)]
pub struct InMemoryKeyProvider {
    inner: Arc<Mutex<Option<KeyMaterial>>>,
}

#[async_trait]
impl KeyProvider for InMemoryKeyProvider {
    async fn get_or_create(&self) -> Result<KeyMaterial, KeyError> {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(guard.get_or_insert_with(generate_key).clone())
    }
}

/// Lets one provider back several keepers.
#[async_trait]
impl<P: KeyProvider + ?Sized> KeyProvider for Arc<P> {
    async fn get_or_create(&self) -> Result<KeyMaterial, KeyError> {
        (**self).get_or_create().await
    }
}

fn generate_key() -> KeyMaterial {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    KeyMaterial::from_bytes(bytes)
}

fn fingerprint(bytes: &[u8; 32]) -> String {
    let digest = Sha256::digest(bytes);
    digest[..8].iter().map(|b| format!("{b:02x}")).collect()
}

/// Base64 form of a fresh random key, for `config init` and key rotation.
pub fn generate_encoded_key() -> SecretString {
    SecretString::from(encode_key(&generate_key()))
}

fn encode_key(material: &KeyMaterial) -> String {
    general_purpose::STANDARD.encode(material.bytes)
}

fn decode_key(secret: &str) -> Result<KeyMaterial, KeyError> {
    let bytes = general_purpose::STANDARD
        .decode(secret.trim())
        .map_err(|e| KeyError::Decode(e.to_string()))?;

    let bytes: [u8; 32] = bytes
        .try_into()
        .map_err(|b: Vec<u8>| KeyError::Decode(format!("expected 32 bytes, got {}", b.len())))?;
    Ok(KeyMaterial::from_bytes(bytes))
}
