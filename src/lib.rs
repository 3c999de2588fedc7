//! Near-duplicate detection for image and video collections.
//!
//! Still images are clustered by DCT perceptual hash, videos and animations
//! by sampled grayscale frames. Both feed one ranked [`DuplicateReport`].
//! A scan runs on a background thread driven by [`ScanEngine`].

use std::path::PathBuf;

pub mod aggregate;
pub mod config;
pub mod decode;
pub mod error;
pub mod formats;
pub mod hamminghash;
pub mod identity;
pub mod image_index;
pub mod phash;
pub mod report;
pub mod scanner;
pub mod video;

#[cfg(test)]
mod test_util;

pub use aggregate::{DuplicateGroup, DuplicateMember, GroupId, GroupKind};
pub use config::EngineConfig;
pub use error::{MediaError, ScanError};
pub use report::{DuplicateReport, FileActions, GroupSnapshot, RankedRow};
pub use scanner::{ScanEngine, ScanEvent, ScanHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    StaticImage,
    RawImage,
    VideoOrAnimation,
}

/// A classified file, built fresh for every scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFile {
    pub path: PathBuf,
    /// Lowercase, without the dot.
    pub extension: String,
    pub category: Category,
}
