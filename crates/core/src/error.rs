use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SarpurError {
    #[error("Catalog request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Unexpected catalog response: {reason}")]
    MalformedResponse { reason: String },

    #[error("Could not read catalog cache {path}: {reason}")]
    CacheRead { path: PathBuf, reason: String },

    #[error("Unsupported manifest {url}: {reason}")]
    Manifest { url: String, reason: String },

    #[error("Program {program_id} not found in catalog")]
    ProgramNotFound { program_id: String },

    #[error("Quality index {index} is out of range, {available} renditions available")]
    RenditionOutOfRange { index: usize, available: usize },

    #[error("Download failed for {output}: {reason}")]
    DownloadFailed { output: PathBuf, reason: String },

    #[error("Output file {0} already exists")]
    OutputExists(PathBuf),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl SarpurError {
    /// Errors raised while talking to the catalog service.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            SarpurError::Transport(_) | SarpurError::MalformedResponse { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, SarpurError>;
