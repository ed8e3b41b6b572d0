use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PrefetchError {
    #[error("position {position} is out of range (listing has {size} images)")]
    PreconditionViolation { position: usize, size: usize },

    #[error("invalid frame size {width}x{height}")]
    InvalidFrame { width: u32, height: u32 },

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Outcome of a handle that did not produce an image.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    /// Superseded, evicted, or the manager shut down. Not a failure.
    #[error("request canceled")]
    Canceled,

    #[error("decode failed: {0}")]
    Decode(String),
}

impl LoadError {
    pub fn is_canceled(&self) -> bool {
        matches!(self, LoadError::Canceled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("work queue is closed")]
pub struct QueueClosed;
