use std::path::PathBuf;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Unknown profile '{0}'")]
    UnknownProfile(String),

    #[error("Invalid layout: {0}")]
    InvalidLayout(String),
}

/// Rejected or failed capture-session actions.
///
/// Every variant is a distinct reason shown to the operator; none of them
/// changes session state.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("No unit identified yet - scan a code first")]
    NotOpen,

    #[error("All slots are filled - export or start a new session")]
    AlreadyFull,

    #[error("No frame received from the video source yet")]
    NoFrameAvailable,

    #[error("Capture ignored: trigger arrived within the cooldown window")]
    Cooldown,

    #[error("Slot {index} does not exist (session has {total} slots)")]
    InvalidSlot { index: usize, total: usize },

    #[error("Slot {index} is already filled")]
    SlotOccupied { index: usize },

    #[error("Could not open a session for '{identifier}': {source}")]
    Identify {
        identifier: String,
        #[source]
        source: StorageError,
    },

    #[error("Failed to store capture: {0}")]
    Storage(#[from] StorageError),
}

/// Storage errors with contextual information
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Could not find Documents directory")]
    NoDocumentsDir,

    #[error("Identifier '{0}' contains no usable characters for a folder name")]
    InvalidIdentifier(String),

    #[error("Failed to create directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read directory {path}: {source}")]
    ReadDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write image {path}: {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode image {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Failed to delete {path}: {source}")]
    DeleteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
