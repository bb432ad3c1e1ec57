use std::{
    fs,
    path::{Path, PathBuf},
};

use color_eyre::Result;
use dirs::config_dir;
use serde::{Deserialize, Serialize};

/// User-level configuration loaded from `~/.config/stowage/config.toml` (platform-specific).
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct Config {
    /// Override for the data directory holding files and sealed secrets.
    pub data_dir: Option<PathBuf>,
    pub persister: Option<PersisterConfig>,
    pub secrets: Option<SecretsConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct PersisterConfig {
    pub name: Option<String>,
    pub id: Option<String>,
    /// Defaults to `<data_dir>/files`.
    pub root: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct SecretsConfig {
    #[serde(default)]
    pub backend: SecretsBackend,
    pub name: Option<String>,
    pub id: Option<String>,
    /// Keychain service for the keyring backend and for the file backend's master key.
    pub service: Option<String>,
    /// Base64 master key for the file backend; falls back to `STOWAGE_MASTER_KEY`,
    /// then the OS keyring.
    pub master_key: Option<String>,
    /// Defaults to `<data_dir>/secrets`.
    pub root: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SecretsBackend {
    /// AES-GCM sealed files under the data directory.
    #[default]
    File,
    /// Entries in the OS keychain.
    Keyring,
}

/// Load config from `path`, or the default path when `None`.
pub fn load(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => load_from_path(path),
        None => load_from_path(default_path()?),
    }
}

/// Load config from a given path; if missing or empty, return defaults.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(Config::default());
    }
    let contents = fs::read_to_string(path)?;
    if contents.trim().is_empty() {
        return Ok(Config::default());
    }
    let cfg: Config = toml::from_str(&contents)?;
    Ok(cfg)
}

/// Resolve the default config path (platform aware).
pub fn default_path() -> Result<PathBuf> {
    let base = config_dir().ok_or_else(|| color_eyre::eyre::eyre!("no config dir available"))?;
    Ok(base.join("stowage").join("config.toml"))
}

/// Write `config` to `path` unless a file is already there, so user edits survive.
/// Returns the path either way.
pub fn write_if_missing(config: &Config, path: &Path) -> Result<PathBuf> {
    if path.exists() {
        return Ok(path.to_path_buf());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let body = toml::to_string_pretty(config)?;
    fs::write(path, body)?;
    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_default_when_missing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg = load_from_path(dir.path().join("config.toml")).expect("load");
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn returns_default_when_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "  \n").expect("write");
        assert_eq!(load(Some(path.as_path())).expect("load"), Config::default());
    }

    #[test]
    fn parses_custom_config() {
        let contents = r#"
            data_dir = "/tmp/stowage-data"
            [persister]
            name = "docs"
            id = "p-1"
            root = "/srv/docs"
            [secrets]
            backend = "keyring"
            service = "stowage-prod"
        "#;
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        fs::write(&path, contents).expect("write temp config");

        let cfg = load_from_path(&path).expect("load");
        assert_eq!(
            cfg,
            Config {
                data_dir: Some(PathBuf::from("/tmp/stowage-data")),
                persister: Some(PersisterConfig {
                    name: Some("docs".into()),
                    id: Some("p-1".into()),
                    root: Some(PathBuf::from("/srv/docs")),
                }),
                secrets: Some(SecretsConfig {
                    backend: SecretsBackend::Keyring,
                    service: Some("stowage-prod".into()),
                    ..SecretsConfig::default()
                }),
            }
        );
    }

    #[test]
    fn secrets_backend_defaults_to_file() {
        let cfg: Config = toml::from_str("[secrets]\nname = \"vault\"\n").expect("parse");
        assert_eq!(
            cfg.secrets.expect("secrets section").backend,
            SecretsBackend::File
        );
    }

    #[test]
    fn write_creates_file_once() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested/config.toml");
        let cfg = Config {
            data_dir: Some(PathBuf::from("/tmp/stowage-data")),
            ..Config::default()
        };

        write_if_missing(&cfg, &path).expect("write should succeed");
        let other = Config::default();
        let second = write_if_missing(&other, &path).expect("second write ok");
        assert_eq!(second, path);

        let loaded = load_from_path(&path).expect("load");
        assert_eq!(loaded, cfg);
    }
}
