//! Object-store backends.
//!
//! The [`ObjectStore`] trait is the seam between the connector and wherever
//! bytes live. Paths are `/`-separated keys relative to the store root.
//! "Not found" is its own error variant so callers can turn absence into
//! `false` or an empty frame where that is a valid answer.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object not found: {path}")]
    NotFound { path: String },

    #[error("I/O error on '{path}': {reason}")]
    Io { path: String, reason: String },

    #[error("parquet I/O error: {0}")]
    Parquet(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error("invalid object path '{0}'")]
    InvalidPath(String),

    #[error("unsupported storage backend for root '{0}' (only local roots are available)")]
    UnsupportedBackend(String),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

impl StorageError {
    fn from_io(path: &str, err: std::io::Error) -> Self {
        if err.kind() == ErrorKind::NotFound {
            StorageError::NotFound {
                path: path.to_string(),
            }
        } else {
            StorageError::Io {
                path: path.to_string(),
                reason: err.to_string(),
            }
        }
    }
}

/// Whole-object storage: get, overwrite, probe and list.
pub trait ObjectStore: Send + Sync {
    /// Human-readable location of the store root.
    fn location(&self) -> String;

    /// Fetch an object's bytes.
    fn get(&self, path: &str) -> Result<Vec<u8>, StorageError>;

    /// Replace an object wholesale. Readers see either the old or the new bytes.
    fn put(&self, path: &str, bytes: &[u8]) -> Result<(), StorageError>;

    /// Size of an object in bytes; `NotFound` when absent.
    fn head(&self, path: &str) -> Result<u64, StorageError>;

    /// All object keys under `prefix`, sorted ascending.
    fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError>;
}

/// Normalize a caller path to a store key: no leading `/`, no `.`/`..`
/// segments, no empty segments.
pub fn normalize_key(path: &str) -> Result<String, StorageError> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.iter().any(|s| *s == "." || *s == "..") {
        return Err(StorageError::InvalidPath(path.to_string()));
    }
    Ok(segments.join("/"))
}

/// Object store over a local directory.
///
/// Writes go to `{key}.tmp` and are renamed into place, so a crashed write
/// never leaves a truncated object behind.
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| StorageError::Io {
            path: root.display().to_string(),
            reason: format!("failed to create root: {e}"),
        })?;
        Ok(Self { root })
    }

    fn resolve(&self, path: &str) -> Result<(String, PathBuf), StorageError> {
        let key = normalize_key(path)?;
        let full = key
            .split('/')
            .filter(|s| !s.is_empty())
            .fold(self.root.clone(), |acc, seg| acc.join(seg));
        Ok((key, full))
    }

    fn walk(&self, dir: &Path, out: &mut Vec<String>) -> Result<(), StorageError> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(StorageError::from_io(&dir.display().to_string(), e)),
        };
        for entry in entries {
            let entry =
                entry.map_err(|e| StorageError::from_io(&dir.display().to_string(), e))?;
            let path = entry.path();
            if path.is_dir() {
                self.walk(&path, out)?;
            } else if path.extension().and_then(|e| e.to_str()) != Some("tmp") {
                if let Ok(rel) = path.strip_prefix(&self.root) {
                    let key = rel
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy().into_owned())
                        .collect::<Vec<_>>()
                        .join("/");
                    out.push(key);
                }
            }
        }
        Ok(())
    }
}

impl ObjectStore for LocalObjectStore {
    fn location(&self) -> String {
        self.root.display().to_string()
    }

    fn get(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        let (key, full) = self.resolve(path)?;
        if full.is_dir() {
            return Err(StorageError::NotFound { path: key });
        }
        fs::read(&full).map_err(|e| StorageError::from_io(&key, e))
    }

    fn put(&self, path: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let (key, full) = self.resolve(path)?;
        if key.is_empty() {
            return Err(StorageError::InvalidPath(path.to_string()));
        }
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).map_err(|e| StorageError::from_io(&key, e))?;
        }

        let mut tmp_name = full.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);
        fs::write(&tmp_path, bytes).map_err(|e| StorageError::from_io(&key, e))?;

        fs::rename(&tmp_path, &full).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            StorageError::Io {
                path: key.clone(),
                reason: format!("atomic rename failed: {e}"),
            }
        })?;
        debug!(object = %key, bytes = bytes.len(), "object written");
        Ok(())
    }

    fn head(&self, path: &str) -> Result<u64, StorageError> {
        let (key, full) = self.resolve(path)?;
        let meta = fs::metadata(&full).map_err(|e| StorageError::from_io(&key, e))?;
        if meta.is_dir() {
            return Err(StorageError::NotFound { path: key });
        }
        Ok(meta.len())
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let (key, full) = self.resolve(prefix)?;
        let mut out = Vec::new();
        if full.is_file() {
            out.push(key);
        } else {
            self.walk(&full, &mut out)?;
        }
        out.sort();
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_roundtrip_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::open(dir.path()).unwrap();

        store.put("/gold_prices/gold_prices.parquet", b"abc").unwrap();
        assert_eq!(store.get("gold_prices/gold_prices.parquet").unwrap(), b"abc");
        assert_eq!(store.head("gold_prices/gold_prices.parquet").unwrap(), 3);
    }

    #[test]
    fn put_overwrites_whole_object() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::open(dir.path()).unwrap();

        store.put("a.parquet", b"first version").unwrap();
        store.put("a.parquet", b"v2").unwrap();
        assert_eq!(store.get("a.parquet").unwrap(), b"v2");
    }

    #[test]
    fn missing_object_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::open(dir.path()).unwrap();

        assert!(matches!(
            store.get("nope.parquet"),
            Err(StorageError::NotFound { .. })
        ));
        assert!(matches!(
            store.head("nope.parquet"),
            Err(StorageError::NotFound { .. })
        ));
    }

    #[test]
    fn list_is_recursive_and_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::open(dir.path()).unwrap();

        store.put("ohlc/year=2024/month=5/day=2/ticks.parquet", b"2").unwrap();
        store.put("ohlc/year=2024/month=5/day=1/ticks.parquet", b"1").unwrap();
        store.put("ohlc_seed/2024-04-30.parquet", b"s").unwrap();

        assert_eq!(
            store.list("ohlc").unwrap(),
            vec![
                "ohlc/year=2024/month=5/day=1/ticks.parquet".to_string(),
                "ohlc/year=2024/month=5/day=2/ticks.parquet".to_string(),
            ]
        );
        assert!(store.list("missing").unwrap().is_empty());
    }

    #[test]
    fn rejects_parent_segments() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::open(dir.path()).unwrap();
        assert!(matches!(
            store.put("../escape.parquet", b"x"),
            Err(StorageError::InvalidPath(_))
        ));
        assert!(matches!(
            normalize_key("a/./b"),
            Err(StorageError::InvalidPath(_))
        ));
        assert_eq!(normalize_key("//a//b/").unwrap(), "a/b");
    }
}
