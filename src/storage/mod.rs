//! Persistent storage
//!
//! This module handles on-disk state: settings, model discovery and hub downloads.

pub mod discovery;
pub mod huggingface;
pub mod settings;

use std::path::PathBuf;
use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Hub error: {0}")]
    Hub(String),
    #[error("Could not determine a data directory")]
    NoDataDir,
}

/// Platform data directory for aichat.
///
/// Linux: ~/.local/share/aichat, macOS: ~/Library/Application Support/com.aichat.aichat
pub fn get_data_dir() -> Result<PathBuf, StorageError> {
    directories::ProjectDirs::from("com", "aichat", "aichat")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .ok_or(StorageError::NoDataDir)
}
