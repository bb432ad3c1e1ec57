use std::{path::PathBuf, sync::Arc};

use color_eyre::Result;
use dirs::data_dir;
use secrecy::SecretString;
use stowage_core::Identity;
use stowage_storage::{
    key_provider::{KeyProvider, KeyringProvider, StaticKeyProvider},
    EncryptedFileKeeper, FsPersister, KeyringKeeper,
};
#[cfg(test)]
use stowage_storage::key_provider::InMemoryKeyProvider;
use tracing::debug;

use crate::config::{Config, SecretsBackend, SecretsConfig};

const DEFAULT_SERVICE: &str = "stowage-cli";
const MASTER_KEY_ACCOUNT: &str = "master-key";

/// Keeper selected by `[secrets] backend`.
pub enum ConfiguredKeeper {
    File(EncryptedFileKeeper<Arc<dyn KeyProvider>>),
    Keyring(KeyringKeeper),
}

/// Resolve the default data directory for Stowage.
pub fn default_data_dir() -> Result<PathBuf> {
    let base = data_dir().ok_or_else(|| color_eyre::eyre::eyre!("no data dir available"))?;
    Ok(base.join("stowage"))
}

fn data_root(config: &Config) -> Result<PathBuf> {
    match &config.data_dir {
        Some(dir) => Ok(dir.clone()),
        None => default_data_dir(),
    }
}

fn identity(name: Option<&String>, id: Option<&String>, default_name: &str) -> Identity {
    let name = name.cloned().unwrap_or_else(|| default_name.to_string());
    match id {
        Some(id) => Identity::new(name, id.clone()),
        None => Identity::generated(name),
    }
}

/// Build the filesystem persister described by `[persister]`.
pub fn persister_from_config(config: &Config) -> Result<FsPersister> {
    let section = config.persister.clone().unwrap_or_default();
    let root = match section.root {
        Some(root) => root,
        None => data_root(config)?.join("files"),
    };
    let Identity { id, name } = identity(section.name.as_ref(), section.id.as_ref(), "files");
    debug!(?root, persister = %name, "configuring filesystem persister");
    Ok(FsPersister::create(name, id, root)?)
}

/// Build the secrets keeper described by `[secrets]`.
pub fn keeper_from_config(config: &Config) -> Result<ConfiguredKeeper> {
    let section = config.secrets.clone().unwrap_or_default();
    let Identity { id, name } = identity(section.name.as_ref(), section.id.as_ref(), "secrets");
    let service = section
        .service
        .clone()
        .unwrap_or_else(|| DEFAULT_SERVICE.to_string());

    match section.backend {
        SecretsBackend::Keyring => {
            debug!(%service, keeper = %name, "configuring keyring keeper");
            Ok(ConfiguredKeeper::Keyring(KeyringKeeper::create(
                name, id, service,
            )?))
        }
        SecretsBackend::File => {
            let root = match &section.root {
                Some(root) => root.clone(),
                None => data_root(config)?.join("secrets"),
            };
            let provider = key_provider(&section, &service)?;
            debug!(?root, keeper = %name, "configuring encrypted file keeper");
            Ok(ConfiguredKeeper::File(EncryptedFileKeeper::create(
                name, id, root, provider,
            )?))
        }
    }
}

/// Master key precedence: config, then `STOWAGE_MASTER_KEY`, then the OS keyring.
fn key_provider(section: &SecretsConfig, service: &str) -> Result<Arc<dyn KeyProvider>> {
    if let Some(encoded) = &section.master_key {
        let provider = StaticKeyProvider::from_base64(&SecretString::from(encoded.clone()))?;
        return Ok(Arc::new(provider));
    }
    if let Some(provider) = StaticKeyProvider::from_env()? {
        return Ok(Arc::new(provider));
    }
    Ok(Arc::new(KeyringProvider::new(service, MASTER_KEY_ACCOUNT)))
}

/// Helpers for tests to build backends rooted at a temp dir with an in-memory key.
#[cfg(test)]
pub fn test_persister(root: impl Into<PathBuf>) -> FsPersister {
    FsPersister::create("files", "test", root).expect("test persister")
}

#[cfg(test)]
pub fn test_keeper(root: impl Into<PathBuf>) -> EncryptedFileKeeper<InMemoryKeyProvider> {
    EncryptedFileKeeper::create("secrets", "test", root, InMemoryKeyProvider::default())
        .expect("test keeper")
}

#[cfg(test)]
mod tests {
    use secrecy::ExposeSecret;
    use stowage_core::Identifiable;
    use stowage_storage::key_provider::generate_encoded_key;

    use super::*;
    use crate::config::PersisterConfig;

    #[test]
    fn persister_uses_configured_identity_and_root() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg = Config {
            data_dir: Some(dir.path().to_path_buf()),
            persister: Some(PersisterConfig {
                name: Some("docs".into()),
                id: Some("p-9".into()),
                root: None,
            }),
            secrets: None,
        };
        let persister = persister_from_config(&cfg).expect("persister");
        assert_eq!(persister.name(), "docs");
        assert_eq!(persister.id(), "p-9");
    }

    #[test]
    fn missing_id_is_generated() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg = Config {
            data_dir: Some(dir.path().to_path_buf()),
            ..Config::default()
        };
        let persister = persister_from_config(&cfg).expect("persister");
        assert_eq!(persister.name(), "files");
        assert!(uuid::Uuid::parse_str(persister.id()).is_ok());
    }

    #[test]
    fn selects_keyring_backend() {
        let cfg = Config {
            secrets: Some(SecretsConfig {
                backend: SecretsBackend::Keyring,
                name: Some("login".into()),
                ..SecretsConfig::default()
            }),
            ..Config::default()
        };
        match keeper_from_config(&cfg).expect("keeper") {
            ConfiguredKeeper::Keyring(keeper) => assert_eq!(keeper.name(), "login"),
            ConfiguredKeeper::File(_) => panic!("expected keyring keeper"),
        }
    }

    #[test]
    fn file_backend_accepts_configured_master_key() {
        let dir = tempfile::tempdir().expect("tempdir");
        let key = generate_encoded_key();
        let cfg = Config {
            data_dir: Some(dir.path().to_path_buf()),
            secrets: Some(SecretsConfig {
                master_key: Some(key.expose_secret().to_string()),
                ..SecretsConfig::default()
            }),
            ..Config::default()
        };
        assert!(matches!(
            keeper_from_config(&cfg).expect("keeper"),
            ConfiguredKeeper::File(_)
        ));
    }

    #[test]
    fn malformed_master_key_is_rejected() {
        let cfg = Config {
            data_dir: Some(PathBuf::from("/tmp/unused")),
            secrets: Some(SecretsConfig {
                master_key: Some("not-a-key".into()),
                ..SecretsConfig::default()
            }),
            ..Config::default()
        };
        assert!(keeper_from_config(&cfg).is_err());
    }
}
