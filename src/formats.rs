use std::collections::HashSet;
use std::path::Path;

use crate::decode;
use crate::error::MediaError;
use crate::{Category, MediaFile};

pub const STATIC_IMAGE_EXTS: &[&str] = &[
    "png", "jpg", "jpeg", "bmp", "webp", "tif", "tiff", "ico", "pcx", "ppm", "pgm", "pbm", "tga",
];

pub const RAW_EXTS: &[&str] = &[
    "cr2", "cr3", "nef", "arw", "dng", "rw2", "orf", "raf", "pef", "srw", "kdc", "raw",
];

/// Containers that are always sent to the video engine.
pub const VIDEO_ONLY_EXTS: &[&str] = &[
    "mp4", "avi", "mkv", "mov", "wmv", "flv", "webm", "m4v", "mpg", "mpeg", "3gp",
    "svg", "ani", "swf",
];

/// Formats that may be a still image or an animation; decided per file.
pub const FRAME_CHECK_EXTS: &[&str] = &["webp", "gif", "apng", "mng"];

/// Lowercased extension without the dot, or an empty string.
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default()
}

/// Extension sets used to classify files. Built once and handed to the
/// classifier; never mutated during a scan.
#[derive(Debug, Clone)]
pub struct FormatTables {
    pub static_images: HashSet<String>,
    pub raw_images: HashSet<String>,
    pub video_only: HashSet<String>,
    pub frame_check: HashSet<String>,
}

impl Default for FormatTables {
    fn default() -> Self {
        let set = |exts: &[&str]| exts.iter().map(|e| e.to_string()).collect();
        Self {
            static_images: set(STATIC_IMAGE_EXTS),
            raw_images: set(RAW_EXTS),
            video_only: set(VIDEO_ONLY_EXTS),
            frame_check: set(FRAME_CHECK_EXTS),
        }
    }
}

impl FormatTables {
    pub fn is_supported(&self, ext: &str) -> bool {
        self.static_images.contains(ext)
            || self.raw_images.contains(ext)
            || self.video_only.contains(ext)
            || self.frame_check.contains(ext)
    }
}

pub struct Classifier {
    tables: FormatTables,
}

impl Classifier {
    pub fn new(tables: FormatTables) -> Self {
        Self { tables }
    }

    pub fn tables(&self) -> &FormatTables {
        &self.tables
    }

    /// Resolves the category of `path`. `Ok(None)` means the extension is
    /// not a media format at all. An error means the file could not be read
    /// and must be skipped.
    pub fn classify(&self, path: &Path) -> Result<Option<Category>, MediaError> {
        let ext = extension_of(path);
        let t = &self.tables;

        // Order matters: .webp is both a static and a frame-check format.
        if t.frame_check.contains(&ext) {
            return self.resolve_ambiguous(path, &ext).map(Some);
        }
        if t.video_only.contains(&ext) {
            return Ok(Some(Category::VideoOrAnimation));
        }
        if t.raw_images.contains(&ext) {
            return Ok(Some(Category::RawImage));
        }
        if t.static_images.contains(&ext) {
            return Ok(Some(Category::StaticImage));
        }
        Ok(None)
    }

    pub fn media_file(&self, path: &Path) -> Result<Option<MediaFile>, MediaError> {
        Ok(self.classify(path)?.map(|category| MediaFile {
            path: path.to_path_buf(),
            extension: extension_of(path),
            category,
        }))
    }

    fn resolve_ambiguous(&self, path: &Path, ext: &str) -> Result<Category, MediaError> {
        match decode::has_multiple_frames(path) {
            Ok(true) => Ok(Category::VideoOrAnimation),
            Ok(false) => Ok(Category::StaticImage),
            Err(MediaError::Io { path, source }) => Err(MediaError::Io { path, source }),
            Err(e) => {
                log::debug!("[SCAN] Frame probe failed ({}), using extension heuristic", e);
                Ok(Self::heuristic(ext))
            }
        }
    }

    fn heuristic(ext: &str) -> Category {
        match ext {
            "gif" | "apng" => Category::VideoOrAnimation,
            _ => Category::StaticImage,
        }
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(FormatTables::default())
    }
}
