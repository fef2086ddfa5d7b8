//! Error types for datamosh-media.

use std::io;
use thiserror::Error;

/// Result type for datamosh-media operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for datamosh-media operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Invalid MP4 file structure.
    #[error("Invalid MP4: {0}")]
    InvalidMp4(String),

    /// Missing required atom in MP4 file.
    #[error("Missing required atom: {0}")]
    MissingAtom(&'static str),

    /// Unsupported feature or codec.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Chunk table and sample table disagree on the sample count.
    #[error("Track {track_id}: chunks cover {chunk_samples} samples, table has {samples}")]
    InconsistentTables {
        track_id: u32,
        chunk_samples: u64,
        samples: usize,
    },
}

impl Error {
    /// Create an invalid MP4 error.
    pub fn invalid_mp4(msg: impl Into<String>) -> Self {
        Self::InvalidMp4(msg.into())
    }

    /// Create an unsupported error.
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }
}
