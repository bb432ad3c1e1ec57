//! Path rules shared by all backends.
//!
//! A file location is a directory `path` (possibly empty) plus a file `name`. Both are
//! relative to the backend's root: absolute paths and `..` are rejected, `.` segments
//! are dropped, and separators are normalized to `/`.

use std::path::{Component, Path};

use crate::error::StorageError;

/// Normalized, validated location of a named file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileLocation {
    dir: Vec<String>,
    name: String,
}

impl FileLocation {
    pub fn parse(path: &str, name: &str) -> Result<Self, StorageError> {
        let dir = normalize_dir(path)?;
        let name = validate_name(name)?;
        Ok(Self { dir, name })
    }

    pub fn dir_segments(&self) -> &[String] {
        &self.dir
    }

    pub fn file_name(&self) -> &str {
        &self.name
    }

    /// Slash-joined `dir/name` key, stable across platforms.
    pub fn key(&self) -> String {
        let mut key = self.dir.join("/");
        if !key.is_empty() {
            key.push('/');
        }
        key.push_str(&self.name);
        key
    }
}

fn normalize_dir(path: &str) -> Result<Vec<String>, StorageError> {
    let mut segments = Vec::new();
    for component in Path::new(path).components() {
        match component {
            Component::Normal(part) => {
                let part = part
                    .to_str()
                    .ok_or_else(|| StorageError::invalid_path(path, "not valid unicode"))?;
                segments.push(part.to_string());
            }
            Component::CurDir => {}
            Component::ParentDir => {
                return Err(StorageError::invalid_path(path, "parent segments are not allowed"))
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(StorageError::invalid_path(path, "path must be relative"))
            }
        }
    }
    Ok(segments)
}

fn validate_name(name: &str) -> Result<String, StorageError> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(part)), None) if part == name => Ok(name.to_string()),
        (None, _) => Err(StorageError::invalid_path(name, "file name is empty")),
        _ => Err(StorageError::invalid_path(
            name,
            "file name must be a single path segment",
        )),
    }
}

/// Secret paths are opaque keys; they only need to carry something.
pub fn validate_secret_path(path: &str) -> Result<&str, StorageError> {
    if path.trim().is_empty() {
        return Err(StorageError::invalid_path(path, "secret path is empty"));
    }
    Ok(path)
}
