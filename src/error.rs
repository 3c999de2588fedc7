use std::path::PathBuf;
use thiserror::Error;

/// Failure to process a single file. Never fatal for a scan: the file is
/// logged and skipped.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot decode {path:?}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("unsupported color mode {mode} in {path:?}")]
    UnsupportedColorMode { path: PathBuf, mode: String },

    #[error("RAW {stage} failed for {path:?}")]
    Raw { path: PathBuf, stage: &'static str },

    #[error("video decode failed for {path:?}: {reason}")]
    VideoDecode { path: PathBuf, reason: String },

    #[error("no usable frames in {path:?}")]
    NoFrames { path: PathBuf },

    #[error("no frame probe for {path:?}")]
    NoProbe { path: PathBuf },
}

impl MediaError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MediaError::Io { path: path.into(), source }
    }

    pub fn decode(path: impl Into<PathBuf>, source: image::ImageError) -> Self {
        MediaError::Decode { path: path.into(), source }
    }

    pub fn video(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        MediaError::VideoDecode { path: path.into(), reason: reason.into() }
    }
}

/// Scan-level failure. Reported to the caller as an error event, after
/// which no groups are emitted.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Folder not found - {0:?}")]
    RootMissing(PathBuf),

    #[error("Not a folder - {0:?}")]
    RootNotDirectory(PathBuf),

    #[error("Folder is not readable - {path:?}: {source}")]
    RootUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Hash size must be {min}-{max}. Got {got}.")]
    InvalidHashSize { got: u32, min: u32, max: u32 },

    #[error("A scan is already running")]
    AlreadyRunning,

    #[error("Failed to spawn scan thread: {0}")]
    Spawn(#[source] std::io::Error),
}
