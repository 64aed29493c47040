// src/storage/mod.rs
//! Whole-file JSON persistence.
//!
//! Each character profile and each chat transcript is one JSON document.
//! Reads and writes always cover the entire file.

pub mod characters;
pub mod chats;
pub mod ids;

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncWriteExt;

pub use characters::CharacterStore;
pub use chats::{ChatKey, ChatStore};

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("File already exists: {}", .0.display())]
    AlreadyExists(PathBuf),
    #[error("Failed to decode {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Failed to encode document: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl StorageError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        match source.kind() {
            ErrorKind::NotFound => StorageError::NotFound(path.to_path_buf()),
            ErrorKind::AlreadyExists => StorageError::AlreadyExists(path.to_path_buf()),
            _ => StorageError::Io {
                path: path.to_path_buf(),
                source,
            },
        }
    }
}

/// Four-space pretty JSON, the layout every document on disk uses.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, StorageError> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut serializer)?;
    Ok(buf)
}

pub async fn load<T: DeserializeOwned>(path: &Path) -> Result<T, StorageError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| StorageError::io(path, e))?;
    serde_json::from_slice(&bytes).map_err(|source| StorageError::Decode {
        path: path.to_path_buf(),
        source,
    })
}

pub async fn save<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StorageError> {
    let bytes = encode(value)?;
    tokio::fs::write(path, bytes)
        .await
        .map_err(|e| StorageError::io(path, e))
}

/// Like [`save`], but fails with `AlreadyExists` instead of overwriting.
pub async fn save_new<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StorageError> {
    let bytes = encode(value)?;
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await
        .map_err(|e| StorageError::io(path, e))?;
    file.write_all(&bytes)
        .await
        .map_err(|e| StorageError::io(path, e))?;
    file.flush().await.map_err(|e| StorageError::io(path, e))
}

pub async fn exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}
