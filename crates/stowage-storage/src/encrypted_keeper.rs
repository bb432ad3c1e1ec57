use std::{
    fs::{self, File},
    io::{Read, Write},
    path::{Path, PathBuf},
};

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng, Payload},
    Aes256Gcm, Nonce,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use stowage_core::{
    paths::validate_secret_path, secrets::SecretsKeeper, Connection, ConnectionSlot, Identifiable,
    Identity, LifecycleState, StorageError,
};
use tempfile::NamedTempFile;
use tracing::{debug, instrument};

use crate::key_provider::{KeyMaterial, KeyProvider};

/// Directory of sealed blobs plus the cipher unlocked during `init`.
pub struct SealedDirectory {
    root: PathBuf,
    key_id: String,
    cipher: Aes256Gcm,
}

impl SealedDirectory {
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    fn path_for(&self, secret_path: &str) -> PathBuf {
        self.root.join(format!("{}.json", sanitize_path(secret_path)))
    }
}

/// AES-256-GCM keeper storing one JSON blob per secret under `root`.
/// The master key comes from a `KeyProvider` (OS keyring in production); the
/// secret path is bound in as associated data so blobs cannot be swapped.
pub struct EncryptedFileKeeper<P: KeyProvider> {
    identity: Identity,
    root: PathBuf,
    key_provider: P,
    slot: ConnectionSlot<SealedDirectory>,
}

impl<P: KeyProvider> EncryptedFileKeeper<P> {
    pub fn create(
        name: impl Into<String>,
        id: impl Into<String>,
        root: impl Into<PathBuf>,
        key_provider: P,
    ) -> Result<Self, StorageError> {
        let root = root.into();
        if root.as_os_str().is_empty() {
            return Err(StorageError::invalid_path("", "keeper root is empty"));
        }
        Ok(Self {
            identity: Identity::new(name, id),
            root,
            key_provider,
            slot: ConnectionSlot::new(),
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredBlob {
    key_id: String,
    nonce: String,
    ciphertext: String,
    created_at: DateTime<Utc>,
}

impl<P: KeyProvider> Identifiable for EncryptedFileKeeper<P> {
    fn identity(&self) -> &Identity {
        &self.identity
    }

    fn identity_mut(&mut self) -> &mut Identity {
        &mut self.identity
    }
}

#[async_trait]
impl<P: KeyProvider> SecretsKeeper for EncryptedFileKeeper<P> {
    type Connection = SealedDirectory;

    #[instrument(skip_all, fields(keeper = %self.identity.name, root = %self.root.display()))]
    async fn init(&self) -> Result<(), StorageError> {
        self.slot.check_openable()?;

        let key_material =
            self.key_provider
                .get_or_create()
                .await
                .map_err(|e| StorageError::Unavailable {
                    reason: format!("key provider: {e}"),
                })?;
        let cipher = build_cipher(&key_material)?;

        let display = self.root.to_string_lossy().to_string();
        fs::create_dir_all(&self.root).map_err(|e| StorageError::from_io(e, &display))?;

        self.slot.open(SealedDirectory {
            root: self.root.clone(),
            key_id: key_material.id.clone(),
            cipher,
        })?;
        debug!(key_id = %key_material.id, "encrypted keeper ready");
        Ok(())
    }

    async fn close(&self) -> Result<(), StorageError> {
        self.slot.close();
        Ok(())
    }

    fn state(&self) -> LifecycleState {
        self.slot.state()
    }

    fn connection(&self) -> Result<Connection<SealedDirectory>, StorageError> {
        self.slot.acquire()
    }

    #[instrument(skip(self, content), fields(keeper = %self.identity.name))]
    async fn save_secret(&self, path: &str, content: SecretString) -> Result<(), StorageError> {
        let dir = self.slot.acquire()?;
        let path = validate_secret_path(path)?;

        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = dir
            .cipher
            .encrypt(
                &nonce,
                Payload {
                    msg: content.expose_secret().as_bytes(),
                    aad: path.as_bytes(),
                },
            )
            .map_err(|e| StorageError::Io {
                reason: format!("encrypt failed: {e}"),
            })?;

        let blob = StoredBlob {
            key_id: dir.key_id.clone(),
            nonce: URL_SAFE_NO_PAD.encode(nonce.as_slice()),
            ciphertext: URL_SAFE_NO_PAD.encode(ciphertext),
            created_at: Utc::now(),
        };

        write_blob(&dir.path_for(path), &blob).map_err(|e| relabel(e, path))
    }

    #[instrument(skip(self), fields(keeper = %self.identity.name))]
    async fn load_secret(&self, path: &str) -> Result<SecretString, StorageError> {
        let dir = self.slot.acquire()?;
        let path = validate_secret_path(path)?;
        let blob = read_blob(&dir.path_for(path)).map_err(|e| relabel(e, path))?;

        if blob.key_id != dir.key_id {
            return Err(StorageError::Corrupt {
                reason: format!(
                    "sealed with key {}, keeper holds key {}",
                    blob.key_id, dir.key_id
                ),
            });
        }

        let nonce_bytes = URL_SAFE_NO_PAD
            .decode(blob.nonce)
            .map_err(|e| corrupt("nonce decode failed", e))?;
        if nonce_bytes.len() != 12 {
            return Err(StorageError::Corrupt {
                reason: format!("nonce has {} bytes", nonce_bytes.len()),
            });
        }
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = URL_SAFE_NO_PAD
            .decode(blob.ciphertext)
            .map_err(|e| corrupt("ciphertext decode failed", e))?;

        let plain = dir
            .cipher
            .decrypt(
                nonce,
                Payload {
                    msg: &ciphertext,
                    aad: path.as_bytes(),
                },
            )
            .map_err(|e| corrupt("decrypt failed", e))?;
        let plain =
            String::from_utf8(plain).map_err(|e| corrupt("secret is not utf-8", e.utf8_error()))?;
        Ok(SecretString::from(plain))
    }

    #[instrument(skip(self), fields(keeper = %self.identity.name))]
    async fn delete_secret(&self, path: &str) -> Result<(), StorageError> {
        let dir = self.slot.acquire()?;
        let path = validate_secret_path(path)?;
        match fs::remove_file(dir.path_for(path)) {
            Ok(_) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(StorageError::from_io(err, path)),
        }
    }
}

fn write_blob(path: &Path, blob: &StoredBlob) -> Result<(), StorageError> {
    let display = path.to_string_lossy().to_string();
    let io_err = |e: std::io::Error| StorageError::from_io(e, &display);
    let parent = path
        .parent()
        .ok_or_else(|| StorageError::invalid_path(&display, "blob has no parent directory"))?;
    fs::create_dir_all(parent).map_err(io_err)?;

    // NamedTempFile is created 0600 on unix and keeps that mode after persist.
    let mut tmp = NamedTempFile::new_in(parent).map_err(io_err)?;
    let json = serde_json::to_vec(blob).map_err(|e| StorageError::Io {
        reason: e.to_string(),
    })?;
    tmp.write_all(&json).map_err(io_err)?;
    tmp.flush().map_err(io_err)?;
    tmp.persist(path).map_err(|e| io_err(e.error))?;
    Ok(())
}

fn read_blob(path: &Path) -> Result<StoredBlob, StorageError> {
    let display = path.to_string_lossy().to_string();
    let mut file = File::open(path).map_err(|e| StorageError::from_io(e, &display))?;

    let mut buf = Vec::new();
    file.read_to_end(&mut buf)
        .map_err(|e| StorageError::from_io(e, &display))?;
    serde_json::from_slice(&buf).map_err(|e| corrupt("blob decode failed", e))
}

/// Report the secret path rather than the on-disk blob name.
fn relabel(err: StorageError, secret_path: &str) -> StorageError {
    match err {
        StorageError::NotFound { .. } => StorageError::NotFound {
            path: secret_path.to_string(),
        },
        StorageError::PermissionDenied { .. } => StorageError::PermissionDenied {
            path: secret_path.to_string(),
        },
        other => other,
    }
}

fn build_cipher(material: &KeyMaterial) -> Result<Aes256Gcm, StorageError> {
    Aes256Gcm::new_from_slice(&material.bytes).map_err(|e| StorageError::Unavailable {
        reason: format!("cipher init failed: {e}"),
    })
}

/// Fixed-length blob name so arbitrarily long secret paths stay under filename limits.
fn sanitize_path(path: &str) -> String {
    format!("{:x}", Sha256::digest(path.as_bytes()))
}

fn corrupt<E: std::fmt::Display>(context: &str, err: E) -> StorageError {
    StorageError::Corrupt {
        reason: format!("{context}: {err}"),
    }
}
