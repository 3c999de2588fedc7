use image::imageops::{self, FilterType};
use image::RgbImage;
use rustdct::{DctPlanner, TransformType2And3};
use std::sync::Arc;

use crate::hamminghash::ImageHash;

//     This program is free software: you can redistribute it and/or modify it under the terms of the
//     GNU General Public License as published by the Free Software Foundation, either version 3 of
//     the License, or (at your option) any later version.
//     This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY;
//     without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See
//     the GNU General Public License for more details.
//     You should have received a copy of the GNU General Public License along with this program.
//     If not, see <https://www.gnu.org/licenses/>.

/// The DCT input is this many times wider than the hashed low-frequency block
/// (32x32 DCT -> 8x8 hash for the standard 64-bit pHash).
const HIGHFREQ_FACTOR: usize = 4;

pub struct DctPhash {
    hash_size: usize,
    dct_size: usize,
    row_dct: Arc<dyn TransformType2And3<f32>>,
    col_dct: Arc<dyn TransformType2And3<f32>>,
    scratch_len: usize,
}

impl DctPhash {
    /// Plans the DCT for a `hash_size` x `hash_size` bit hash.
    pub fn new(hash_size: u32) -> Self {
        let hash_size = (hash_size as usize).max(2);
        let dct_size = hash_size * HIGHFREQ_FACTOR;
        let mut planner = DctPlanner::new();

        let row_dct = planner.plan_dct2(dct_size);
        let col_dct = planner.plan_dct2(dct_size);

        let scratch_len = std::cmp::max(row_dct.get_scratch_len(), col_dct.get_scratch_len());
        let scratch_len = std::cmp::max(scratch_len, dct_size);

        Self { hash_size, dct_size, row_dct, col_dct, scratch_len }
    }

    pub fn hash_size(&self) -> u32 {
        self.hash_size as u32
    }

    /// Calculates the `hash_size^2`-bit perceptual hash of an image.
    pub fn hash_image(&self, img: &RgbImage) -> ImageHash {
        // 1. Resize with Triangle (bilinear) and convert to grayscale
        let n = self.dct_size as u32;
        let small = imageops::resize(img, n, n, FilterType::Triangle);
        let gray = imageops::grayscale(&small);

        // 2. 2D DCT
        let mut pixels: Vec<f32> = gray.as_raw().iter().map(|&b| b as f32).collect();
        self.perform_dct_2d(&mut pixels);

        // 3. Top-left low-frequency block against its median, DC included
        let low_freqs = self.crop_low_freqs(&pixels);
        let median = median_of(&low_freqs);

        ImageHash::from_bits(low_freqs.iter().map(|&v| v > median))
    }

    fn perform_dct_2d(&self, buffer: &mut Vec<f32>) {
        let n = self.dct_size;
        let mut scratch = vec![0.0f32; self.scratch_len];

        for row in buffer.chunks_mut(n) {
            self.row_dct.process_dct2_with_scratch(row, &mut scratch);
        }

        let mut transposed = vec![0.0f32; n * n];
        transpose::transpose(buffer, &mut transposed, n, n);
        *buffer = transposed;

        // Cols (which are now rows)
        for row in buffer.chunks_mut(n) {
            self.col_dct.process_dct2_with_scratch(row, &mut scratch);
        }

        let mut final_buf = vec![0.0f32; n * n];
        transpose::transpose(buffer, &mut final_buf, n, n);
        *buffer = final_buf;
    }

    fn crop_low_freqs(&self, full_dct: &[f32]) -> Vec<f32> {
        let mut crop = Vec::with_capacity(self.hash_size * self.hash_size);
        for y in 0..self.hash_size {
            let start = y * self.dct_size;
            crop.extend_from_slice(&full_dct[start..start + self.hash_size]);
        }
        crop
    }
}

/// Median with the even-length convention of averaging the two middle values.
fn median_of(values: &[f32]) -> f32 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}
