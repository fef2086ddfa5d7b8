//! Error types for the datamosh workflow.

use crate::pipeline::Aborted;
use std::path::PathBuf;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while probing or moshing a file.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The specified file was not found.
    #[error("file not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The container could not be parsed.
    #[error("container error: {0}")]
    Media(#[from] datamosh_media::Error),

    /// NAL location or parsing failed.
    #[error("bitstream error: {0}")]
    H264(#[from] datamosh_h264::Error),

    /// The pipeline stopped part way; the partial counters are attached.
    #[error(transparent)]
    Aborted(#[from] Aborted),

    /// The file has no H.264 track that can be processed.
    #[error("no unencrypted H.264 video track in {}", path.display())]
    NoAvcTrack { path: PathBuf },

    /// Invalid input provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Workspace error.
    #[error("workspace error: {0}")]
    Workspace(String),
}

impl Error {
    /// Create a file not found error.
    pub fn file_not_found(path: impl Into<PathBuf>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    /// Create an invalid input error.
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}
