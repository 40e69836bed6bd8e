//! Error types for the cubox-sync application.
//!
//! This module defines the error categories that can surface while talking to
//! the Cubox API, rendering templates and writing notes into the vault.

use std::{io, path::PathBuf};

use thiserror::Error;

/// The main error type for the cubox-sync application.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Errors related to file I/O operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Errors related to JSON serialization/deserialization.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Errors related to reading or writing front matter.
    #[error("Front matter error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Transport failure, timeout or non-success status from the Cubox API.
    #[error("Network error: {message}")]
    Network { message: String },

    /// Template syntax or runtime failure.
    #[error("Template error: {0}")]
    Render(#[from] tera::Error),

    /// Errors related to configuration.
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    /// Directory creation or access failed.
    #[error("Failed to create or access directory: {path}")]
    DirectoryError { path: PathBuf },

    /// Invalid data format.
    #[error("Invalid format: {message}")]
    InvalidFormat { message: String },

    /// Generic application error with a custom message.
    #[error("{message}")]
    ApplicationError { message: String },
}

impl From<reqwest::Error> for SyncError {
    fn from(e: reqwest::Error) -> Self {
        let message = if e.is_timeout() {
            format!("request timed out: {}", e)
        } else {
            e.to_string()
        };
        SyncError::Network { message }
    }
}
