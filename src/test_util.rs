// Fixture builders shared by the unit tests.

use image::codecs::gif::GifEncoder;
use image::{Delay, Frame, GrayImage, Luma, Rgb, RgbImage, Rgba, RgbaImage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::MediaError;
use crate::video::source::{frame_index, FrameSource, Timeline};

/// Writes a GIF with one 8x8 frame per color.
pub fn write_gif(path: &Path, colors: &[[u8; 4]]) {
    let file = fs::File::create(path).unwrap();
    let mut enc = GifEncoder::new(file);
    let frames: Vec<Frame> = colors
        .iter()
        .map(|c| {
            let buf = RgbaImage::from_pixel(8, 8, Rgba(*c));
            Frame::from_parts(buf, 0, 0, Delay::from_numer_denom_ms(100, 1))
        })
        .collect();
    enc.encode_frames(frames).unwrap();
}

/// A 256x256 image of 16x16 random gray blocks. Different seeds give
/// unrelated perceptual hashes; the same seed gives identical pixels.
pub fn block_image(seed: u64) -> RgbImage {
    let mut rng = StdRng::seed_from_u64(seed);
    let blocks: Vec<u8> = (0..256).map(|_| rng.random()).collect();
    RgbImage::from_fn(256, 256, |x, y| {
        let v = blocks[((y / 16) * 16 + x / 16) as usize];
        Rgb([v, v, v])
    })
}

pub fn gray_frame(size: u32, value: u8) -> GrayImage {
    GrayImage::from_pixel(size, size, Luma([value]))
}

/// A horizontal ramp, distinct from its mirror image.
pub fn ramp_frame(size: u32, offset: u8) -> GrayImage {
    GrayImage::from_fn(size, size, |x, _| Luma([offset.saturating_add((x * 8) as u8)]))
}

/// In-memory clips keyed by path, sampled by frame index.
#[derive(Default)]
pub struct FakeSource {
    clips: HashMap<PathBuf, Vec<GrayImage>>,
    failing: HashMap<PathBuf, Vec<f64>>,
    pub unavailable: bool,
}

impl FakeSource {
    pub fn add(&mut self, path: impl AsRef<Path>, frames: Vec<GrayImage>) {
        self.clips.insert(path.as_ref().to_path_buf(), frames);
    }

    /// Positions at which decoding fails for `path`.
    pub fn fail_positions(&mut self, path: impl AsRef<Path>, positions: &[f64]) {
        self.failing.insert(path.as_ref().to_path_buf(), positions.to_vec());
    }
}

impl FrameSource for FakeSource {
    fn is_available(&self) -> bool {
        !self.unavailable
    }

    fn timeline(&self, path: &Path) -> Result<Timeline, MediaError> {
        match self.clips.get(path) {
            Some(frames) if !frames.is_empty() => Ok(Timeline::Frames(frames.len())),
            _ => Err(MediaError::video(path, "no such clip")),
        }
    }

    fn frame_at(&self, path: &Path, timeline: Timeline, percent: f64, _size: u32) -> Result<GrayImage, MediaError> {
        if self.failing.get(path).is_some_and(|f| f.contains(&percent)) {
            return Err(MediaError::video(path, "seek failed"));
        }
        let Timeline::Frames(n) = timeline else {
            return Err(MediaError::video(path, "bad timeline"));
        };
        self.clips
            .get(path)
            .and_then(|frames| frames.get(frame_index(percent, n)))
            .cloned()
            .ok_or_else(|| MediaError::video(path, "no such frame"))
    }
}
