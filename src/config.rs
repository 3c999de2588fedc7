use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_FILE_NAME: &str = "mediadupes.toml";

/// Default Hamming threshold for a 64-bit hash.
pub const HASH_THRESHOLD: u32 = 5;
/// Video similarity threshold in percent. Stricter than the image threshold
/// because sampled frames are noisier.
pub const VIDEO_SIMILARITY_THRESHOLD: f64 = 92.0;
/// Accepted hash side lengths. The DCT input is (4 * hash_size)^2 pixels.
pub const MIN_HASH_SIZE: u32 = 2;
pub const MAX_HASH_SIZE: u32 = 64;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ImageConfig {
    /// Side length of the hashed low-frequency block; the hash has hash_size^2 bits.
    pub hash_size: u32,
    /// Maximum Hamming distance to a cluster key.
    pub hash_threshold: u32,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self { hash_size: 8, hash_threshold: HASH_THRESHOLD }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct VideoConfig {
    pub similarity_threshold: f64,
    /// Primary sample points, percent of duration (or of the frame range).
    pub frame_positions: Vec<f64>,
    /// Extra sample points tried when too few primary frames decode.
    pub fallback_positions: Vec<f64>,
    /// Frames are reduced to frame_size x frame_size grayscale.
    pub frame_size: u32,
    pub min_frames: usize,
    /// Mean luminance (0-255) under which a frame counts as dark.
    pub dark_threshold: f64,
    /// Fallback frames more similar than this (percent) to a kept frame are skipped.
    pub near_duplicate_frame: f64,
    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,
    /// Allow the parallel frame comparator when the host supports it.
    pub accelerated_compare: bool,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: VIDEO_SIMILARITY_THRESHOLD,
            frame_positions: vec![10.0, 30.0, 50.0, 70.0, 90.0],
            fallback_positions: (0..10).map(|i| 5.0 + 10.0 * i as f64).collect(),
            frame_size: 16,
            min_frames: 3,
            dark_threshold: 20.0,
            near_duplicate_frame: 95.0,
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
            accelerated_compare: true,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct EngineConfig {
    #[serde(default)]
    pub image: ImageConfig,
    #[serde(default)]
    pub video: VideoConfig,
}

impl EngineConfig {
    /// Loads `mediadupes.toml` from the user's config directory, or defaults
    /// when there is none.
    pub fn load() -> anyhow::Result<Self> {
        let Some(config_dir) = dirs::config_dir() else {
            log::debug!("[CONFIG] No config dir found, using defaults");
            return Ok(Self::default());
        };
        let path = config_dir.join(CONFIG_FILE_NAME);
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        log::debug!("[CONFIG] Loading config from {:?}", path);
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {:?}", path))?;
        let cfg = Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config {:?}. Format might have changed.", path))?;
        Ok(cfg)
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let cfg: EngineConfig = toml::from_str(content)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let img = &self.image;
        if !(MIN_HASH_SIZE..=MAX_HASH_SIZE).contains(&img.hash_size) {
            bail!("hash_size must be {}-{}. Got {}.", MIN_HASH_SIZE, MAX_HASH_SIZE, img.hash_size);
        }
        let bits = img
            .hash_size
            .checked_mul(img.hash_size)
            .with_context(|| format!("hash_size {} is too large", img.hash_size))?;
        if img.hash_threshold > bits {
            bail!("hash_threshold must be 0-{}. Got {}.", bits, img.hash_threshold);
        }

        let vid = &self.video;
        if !(0.0..=100.0).contains(&vid.similarity_threshold) {
            bail!("video similarity_threshold must be 0-100. Got {}.", vid.similarity_threshold);
        }
        if vid.frame_positions.is_empty() {
            bail!("frame_positions cannot be empty");
        }
        if let Some(p) = vid.frame_positions.iter().chain(&vid.fallback_positions)
            .find(|p| !(0.0..=100.0).contains(*p))
        {
            bail!("frame positions must be within 0-100. Got {}.", p);
        }
        if vid.frame_size == 0 {
            bail!("frame_size must be positive");
        }
        Ok(())
    }
}
