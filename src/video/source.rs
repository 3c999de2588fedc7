use image::imageops::{self, FilterType};
use image::GrayImage;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::{Mutex, OnceLock, PoisonError};

use crate::decode;
use crate::error::MediaError;
use crate::formats::extension_of;

/// Extent of a clip that sample positions are relative to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Timeline {
    Seconds(f64),
    Frames(usize),
}

/// Decodes single grayscale frames out of videos and animations.
pub trait FrameSource: Send + Sync {
    /// Whether the decoder backend can run on this host at all.
    fn is_available(&self) -> bool;

    fn timeline(&self, path: &Path) -> Result<Timeline, MediaError>;

    /// Returns the frame at `percent` of the timeline, reduced to a
    /// `size` x `size` grayscale raster.
    fn frame_at(&self, path: &Path, timeline: Timeline, percent: f64, size: u32) -> Result<GrayImage, MediaError>;
}

/// Index of the frame at `percent` of `count` frames.
pub fn frame_index(percent: f64, count: usize) -> usize {
    let idx = (percent / 100.0 * count as f64).floor() as usize;
    idx.min(count.saturating_sub(1))
}

// =========================================================================
//  ffmpeg / ffprobe subprocess backend
// =========================================================================

pub struct FfmpegSource {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    available: OnceLock<bool>,
}

impl FfmpegSource {
    pub fn new(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self { ffmpeg: ffmpeg.into(), ffprobe: ffprobe.into(), available: OnceLock::new() }
    }

    fn tool_runs(tool: &Path) -> bool {
        Command::new(tool)
            .arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    /// Container duration in seconds as reported by ffprobe.
    pub fn duration_seconds(&self, path: &Path) -> Result<f64, MediaError> {
        let output = Command::new(&self.ffprobe)
            .args(["-v", "quiet", "-show_entries", "format=duration", "-of", "default=noprint_wrappers=1:nokey=1"])
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| MediaError::video(path, format!("failed to run ffprobe: {}", e)))?;

        if !output.status.success() {
            return Err(MediaError::video(path, format!("ffprobe exited with {}", output.status)));
        }
        let text = String::from_utf8_lossy(&output.stdout);
        let secs: f64 = text
            .trim()
            .parse()
            .map_err(|_| MediaError::video(path, format!("unparseable duration {:?}", text.trim())))?;
        if !secs.is_finite() || secs <= 0.0 {
            return Err(MediaError::video(path, "zero-length container"));
        }
        Ok(secs)
    }

    /// Grabs the frame nearest `secs` as raw 8-bit gray, scaled by ffmpeg.
    pub fn frame_at_seconds(&self, path: &Path, secs: f64, size: u32) -> Result<GrayImage, MediaError> {
        let filter = format!("scale={}:{},format=gray", size, size);
        let output = Command::new(&self.ffmpeg)
            .args(["-v", "error", "-ss", &format!("{:.3}", secs), "-i"])
            .arg(path)
            .args(["-frames:v", "1", "-vf", &filter, "-f", "rawvideo", "pipe:1"])
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()
            .map_err(|e| MediaError::video(path, format!("failed to run ffmpeg: {}", e)))?;

        if !output.status.success() {
            return Err(MediaError::video(path, format!("ffmpeg exited with {}", output.status)));
        }
        let expected = (size as usize) * (size as usize);
        if output.stdout.len() < expected {
            return Err(MediaError::video(path, format!("no frame at {:.3}s", secs)));
        }
        let mut raw = output.stdout;
        raw.truncate(expected);
        GrayImage::from_raw(size, size, raw).ok_or_else(|| MediaError::video(path, "short frame buffer"))
    }
}

impl Default for FfmpegSource {
    fn default() -> Self {
        Self::new("ffmpeg", "ffprobe")
    }
}

impl FrameSource for FfmpegSource {
    fn is_available(&self) -> bool {
        *self.available.get_or_init(|| {
            let ok = Self::tool_runs(&self.ffmpeg) && Self::tool_runs(&self.ffprobe);
            if !ok {
                log::warn!("[VIDEO] ffmpeg/ffprobe not found ({:?}, {:?}), video comparison disabled", self.ffmpeg, self.ffprobe);
            }
            ok
        })
    }

    fn timeline(&self, path: &Path) -> Result<Timeline, MediaError> {
        self.duration_seconds(path).map(Timeline::Seconds)
    }

    fn frame_at(&self, path: &Path, timeline: Timeline, percent: f64, size: u32) -> Result<GrayImage, MediaError> {
        let secs = match timeline {
            Timeline::Seconds(d) => d * percent / 100.0,
            Timeline::Frames(_) => return Err(MediaError::video(path, "ffmpeg source needs a duration")),
        };
        self.frame_at_seconds(path, secs, size)
    }
}

// =========================================================================
//  In-process animation backend (GIF, APNG, animated WebP)
// =========================================================================

/// Decodes GIF, APNG and WebP in-process. The reduced frames of the most
/// recently sampled clip are kept, so a signature decodes its clip once.
#[derive(Default)]
pub struct AnimationSource {
    last: Mutex<Option<DecodedClip>>,
}

struct DecodedClip {
    path: PathBuf,
    size: u32,
    frames: Vec<GrayImage>,
}

impl DecodedClip {
    fn decode(path: &Path, size: u32) -> Result<Self, MediaError> {
        let frames = decode::open_animation(path)?
            .map_while(Result::ok)
            .map(|frame| imageops::grayscale(&imageops::resize(frame.buffer(), size, size, FilterType::Triangle)))
            .collect();
        Ok(Self { path: path.to_path_buf(), size, frames })
    }
}

impl AnimationSource {
    pub fn handles(ext: &str) -> bool {
        matches!(ext, "gif" | "png" | "apng" | "webp")
    }
}

impl FrameSource for AnimationSource {
    fn is_available(&self) -> bool {
        true
    }

    fn timeline(&self, path: &Path) -> Result<Timeline, MediaError> {
        match decode::count_frames(path)? {
            0 => Err(MediaError::NoFrames { path: path.to_path_buf() }),
            n => Ok(Timeline::Frames(n)),
        }
    }

    fn frame_at(&self, path: &Path, timeline: Timeline, percent: f64, size: u32) -> Result<GrayImage, MediaError> {
        let Timeline::Frames(count) = timeline else {
            return Err(MediaError::video(path, "animation source needs a frame count"));
        };
        let idx = frame_index(percent, count);

        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        let clip = match last.take() {
            Some(clip) if clip.path == path && clip.size == size => clip,
            _ => DecodedClip::decode(path, size)?,
        };
        let frame = clip.frames.get(idx).cloned();
        *last = Some(clip);
        frame.ok_or_else(|| MediaError::video(path, format!("frame {} missing", idx)))
    }
}

// =========================================================================
//  Router
// =========================================================================

/// Sends animated image containers to the in-process decoder and every
/// other container to ffmpeg. Availability follows ffmpeg.
pub struct MediaSource {
    ffmpeg: FfmpegSource,
    animation: AnimationSource,
}

impl MediaSource {
    pub fn new(ffmpeg: FfmpegSource) -> Self {
        Self { ffmpeg, animation: AnimationSource::default() }
    }

    fn backend(&self, path: &Path) -> &dyn FrameSource {
        if AnimationSource::handles(&extension_of(path)) { &self.animation as &dyn FrameSource } else { &self.ffmpeg }
    }
}

impl FrameSource for MediaSource {
    fn is_available(&self) -> bool {
        self.ffmpeg.is_available()
    }

    fn timeline(&self, path: &Path) -> Result<Timeline, MediaError> {
        self.backend(path).timeline(path)
    }

    fn frame_at(&self, path: &Path, timeline: Timeline, percent: f64, size: u32) -> Result<GrayImage, MediaError> {
        self.backend(path).frame_at(path, timeline, percent, size)
    }
}
