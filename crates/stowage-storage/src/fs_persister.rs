use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use stowage_core::{
    paths::FileLocation,
    persister::{Persister, SaveReceipt},
    Connection, ConnectionSlot, Identifiable, Identity, LifecycleState, StorageError,
};
use tempfile::NamedTempFile;
use tracing::{debug, instrument};

/// Root directory a ready [`FsPersister`] writes under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsVolume {
    root: PathBuf,
}

impl FsVolume {
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn resolve(&self, location: &FileLocation) -> PathBuf {
        let mut path = self.root.clone();
        path.extend(location.dir_segments());
        path.push(location.file_name());
        path
    }
}

/// Persister storing each file as-is at `root/path/name`.
/// Writes land in a temp file beside the target and are renamed into place.
pub struct FsPersister {
    identity: Identity,
    root: PathBuf,
    slot: ConnectionSlot<FsVolume>,
}

impl FsPersister {
    pub fn create(
        name: impl Into<String>,
        id: impl Into<String>,
        root: impl Into<PathBuf>,
    ) -> Result<Self, StorageError> {
        let root = root.into();
        if root.as_os_str().is_empty() {
            return Err(StorageError::invalid_path("", "persister root is empty"));
        }
        Ok(Self {
            identity: Identity::new(name, id),
            root,
            slot: ConnectionSlot::new(),
        })
    }

    fn locate(&self, path: &str, name: &str) -> Result<(FileLocation, PathBuf), StorageError> {
        let volume = self.slot.acquire()?;
        let location = FileLocation::parse(path, name)?;
        let target = volume.resolve(&location);
        Ok((location, target))
    }
}

impl Identifiable for FsPersister {
    fn identity(&self) -> &Identity {
        &self.identity
    }

    fn identity_mut(&mut self) -> &mut Identity {
        &mut self.identity
    }
}

#[async_trait]
impl Persister for FsPersister {
    type Connection = FsVolume;

    #[instrument(skip_all, fields(persister = %self.identity.name, root = %self.root.display()))]
    async fn init(&self) -> Result<(), StorageError> {
        self.slot.check_openable()?;
        let display = self.root.to_string_lossy().to_string();
        if self.root.exists() && !self.root.is_dir() {
            return Err(StorageError::invalid_path(display, "root is not a directory"));
        }
        fs::create_dir_all(&self.root).map_err(|e| StorageError::from_io(e, &display))?;
        let root = fs::canonicalize(&self.root).map_err(|e| StorageError::from_io(e, &display))?;
        self.slot.open(FsVolume { root })?;
        debug!("filesystem persister ready");
        Ok(())
    }

    async fn close(&self) -> Result<(), StorageError> {
        self.slot.close();
        Ok(())
    }

    fn state(&self) -> LifecycleState {
        self.slot.state()
    }

    fn connection(&self) -> Result<Connection<FsVolume>, StorageError> {
        self.slot.acquire()
    }

    #[instrument(skip(self), fields(persister = %self.identity.name))]
    async fn load_file(&self, path: &str, name: &str) -> Result<String, StorageError> {
        let (location, target) = self.locate(path, name)?;
        fs::read_to_string(&target).map_err(|err| match err.kind() {
            io::ErrorKind::InvalidData => StorageError::Corrupt {
                reason: format!("{} is not valid utf-8", location.key()),
            },
            _ => StorageError::from_io(err, location.key()),
        })
    }

    #[instrument(skip(self, content), fields(persister = %self.identity.name, bytes = content.len()))]
    async fn save_file(
        &self,
        path: &str,
        name: &str,
        content: &str,
    ) -> Result<SaveReceipt, StorageError> {
        let (location, target) = self.locate(path, name)?;
        write_atomic(&target, content.as_bytes())
            .map_err(|e| StorageError::from_io(e, location.key()))?;
        debug!(target = %target.display(), "file saved");
        Ok(SaveReceipt::for_content(target.to_string_lossy(), content))
    }

    #[instrument(skip(self), fields(persister = %self.identity.name))]
    async fn delete_file(&self, path: &str, name: &str) -> Result<(), StorageError> {
        let (location, target) = self.locate(path, name)?;
        match fs::remove_file(target) {
            Ok(_) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(StorageError::from_io(err, location.key())),
        }
    }
}

fn write_atomic(target: &Path, bytes: &[u8]) -> io::Result<()> {
    let parent = target
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "target has no parent"))?;
    fs::create_dir_all(parent)?;

    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(bytes)?;
    tmp.flush()?;
    tmp.persist(target).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use stowage_core::persister::checksum;

    use super::*;

    async fn ready(root: &Path) -> FsPersister {
        let persister = FsPersister::create("files", "fs-1", root).expect("create");
        persister.init().await.expect("init");
        persister
    }

    #[tokio::test]
    async fn save_writes_file_and_receipt_matches() {
        let dir = tempfile::tempdir().expect("tempdir");
        let persister = ready(dir.path()).await;

        let receipt = persister
            .save_file("reports/2024", "q1.txt", "revenue: up")
            .await
            .expect("save");

        let on_disk = fs::read_to_string(&receipt.location).expect("read receipt location");
        assert_eq!(on_disk, "revenue: up");
        assert_eq!(receipt.checksum, checksum("revenue: up"));
        assert_eq!(receipt.bytes, 11);
        assert!(Path::new(&receipt.location).ends_with("reports/2024/q1.txt"));

        let loaded = persister
            .load_file("reports/2024", "q1.txt")
            .await
            .expect("load");
        assert_eq!(loaded, "revenue: up");
    }

    #[tokio::test]
    async fn save_overwrites_existing_content() {
        let dir = tempfile::tempdir().expect("tempdir");
        let persister = ready(dir.path()).await;
        persister.save_file("", "f", "one").await.expect("save");
        persister.save_file("", "f", "two").await.expect("overwrite");
        assert_eq!(persister.load_file("", "f").await.expect("load"), "two");
    }

    #[tokio::test]
    async fn missing_and_invalid_files_are_distinguished() {
        let dir = tempfile::tempdir().expect("tempdir");
        let persister = ready(dir.path()).await;

        let err = persister.load_file("x", "missing").await.unwrap_err();
        assert_eq!(
            err,
            StorageError::NotFound {
                path: "x/missing".into()
            }
        );

        fs::write(dir.path().join("binary"), b"\xff\xfe\x00").expect("write");
        let err = persister.load_file("", "binary").await.unwrap_err();
        assert!(matches!(err, StorageError::Corrupt { .. }));
    }

    #[tokio::test]
    async fn traversal_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let persister = ready(&dir.path().join("root")).await;
        let err = persister
            .save_file("../outside", "f", "x")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidPath { .. }));
        assert!(!dir.path().join("outside").exists());
    }

    #[tokio::test]
    async fn init_creates_root_and_rejects_plain_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let nested = dir.path().join("a/b/c");
        let persister = ready(&nested).await;
        assert!(nested.is_dir());
        assert_eq!(
            persister.connection().expect("connection").root(),
            fs::canonicalize(&nested).expect("canonical")
        );

        let file_root = dir.path().join("plain");
        fs::write(&file_root, "x").expect("write");
        let persister = FsPersister::create("files", "fs-2", &file_root).expect("create");
        let err = persister.init().await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidPath { .. }));
        assert_eq!(persister.state(), LifecycleState::Uninitialized);
    }

    #[tokio::test]
    async fn lifecycle_is_enforced() {
        let dir = tempfile::tempdir().expect("tempdir");
        let persister = FsPersister::create("files", "fs-1", dir.path()).expect("create");
        assert_eq!(
            persister.save_file("", "f", "x").await.unwrap_err(),
            StorageError::NotInitialized
        );

        assert_eq!(
            persister.load_file("", "f").await.unwrap_err(),
            StorageError::NotInitialized
        );

        persister.init().await.expect("init");
        persister.init().await.expect("init is idempotent");
        persister.save_file("", "f", "x").await.expect("save");
        persister.close().await.expect("close");

        assert_eq!(
            persister.load_file("", "f").await.unwrap_err(),
            StorageError::Closed
        );
        assert_eq!(
            persister.save_file("", "f", "y").await.unwrap_err(),
            StorageError::Closed
        );

        assert_eq!(persister.connection().unwrap_err(), StorageError::Closed);
        assert_eq!(persister.connection().unwrap_err(), StorageError::Closed);
        assert_eq!(persister.init().await.unwrap_err(), StorageError::Closed);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let persister = ready(dir.path()).await;
        persister.save_file("d", "f", "x").await.expect("save");
        persister.delete_file("d", "f").await.expect("delete");
        persister.delete_file("d", "f").await.expect("delete again");
        assert!(persister.load_file("d", "f").await.unwrap_err().is_not_found());
    }

    #[test]
    fn create_rejects_empty_root_and_round_trips_identity() {
        assert!(FsPersister::create("files", "1", "").is_err());

        let mut persister = FsPersister::create("files", "1", "/tmp/x").expect("create");
        persister.set_id("2".into());
        persister.set_name("archive".into());
        assert_eq!(persister.id(), "2");
        assert_eq!(persister.name(), "archive");
    }
}
