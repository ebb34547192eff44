// src/error.rs

//! Error types for pallet identification and ingestion

use std::path::PathBuf;
use thiserror::Error;

/// Result type used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while identifying or ingesting a pallet
#[derive(Error, Debug)]
pub enum Error {
    /// Pallet metadata is missing one or more required fields
    #[error("incomplete pallet metadata: {0}")]
    IncompletePallet(String),

    /// No prober could identify the media; diagnostics from partial matches attached
    #[error("could not identify pallet at '{path}'{diagnostics}")]
    UnidentifiedMedia { path: PathBuf, diagnostics: String },

    /// External copy tool failed; stderr attached
    #[error("unable to copy pallet:\n{0}")]
    Copy(String),

    /// Could not grant read access to the copied pallet tree
    #[error("error while attempting to give read access to the pallet:\n{0}")]
    PermissionFixup(String),

    /// Remote fetch failed
    #[error("failed to fetch '{url}': {reason}")]
    Fetch { url: String, reason: String },

    /// Could not mount (or unmount) installation media
    #[error("unable to mount '{path}': {reason}")]
    Mount { path: PathBuf, reason: String },

    /// A source argument is neither a readable ISO, a directory, nor a URL
    #[error("cannot find '{0}' or '{0}' is not an ISO image")]
    UnknownSource(String),

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Build an `UnidentifiedMedia` error from collected partial-match reports
    pub fn unidentified(path: impl Into<PathBuf>, reports: &[String]) -> Self {
        let diagnostics = if reports.is_empty() {
            String::new()
        } else {
            format!("\npartial matches:\n  {}", reports.join("\n  "))
        };
        Self::UnidentifiedMedia {
            path: path.into(),
            diagnostics,
        }
    }
}
