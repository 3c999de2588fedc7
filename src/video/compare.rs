use image::imageops;
use image::GrayImage;
use rayon::prelude::*;
use std::sync::Arc;

/// Frame-difference primitive. Every implementation must return exactly the
/// same integers for the same input; only speed may differ.
pub trait FrameComparator: Send + Sync {
    fn name(&self) -> &'static str;

    /// Sum of absolute per-pixel differences of two equal-length rasters.
    fn abs_diff_sum(&self, a: &[u8], b: &[u8]) -> u64;

    /// Horizontally mirrored copy of a frame.
    fn mirror(&self, frame: &GrayImage) -> GrayImage;
}

pub struct PortableComparator;

impl FrameComparator for PortableComparator {
    fn name(&self) -> &'static str {
        "portable"
    }

    fn abs_diff_sum(&self, a: &[u8], b: &[u8]) -> u64 {
        a.iter().zip(b).map(|(&x, &y)| x.abs_diff(y) as u64).sum()
    }

    fn mirror(&self, frame: &GrayImage) -> GrayImage {
        imageops::flip_horizontal(frame)
    }
}

const LANES: usize = 32;
/// Below this many pixels the work is not split across threads.
const PAR_MIN_LEN: usize = 64 * 1024;
const PAR_CHUNK: usize = 16 * 1024;

/// Lane-unrolled difference kernel, split across the rayon pool for large
/// frames.
pub struct AcceleratedComparator;

impl AcceleratedComparator {
    #[inline]
    fn lanes_sum(a: &[u8], b: &[u8]) -> u64 {
        let mut acc = [0u32; LANES];
        let ca = a.chunks_exact(LANES);
        let cb = b.chunks_exact(LANES);
        let (ra, rb) = (ca.remainder(), cb.remainder());
        for (xa, xb) in ca.zip(cb) {
            for i in 0..LANES {
                acc[i] += xa[i].abs_diff(xb[i]) as u32;
            }
        }
        let tail: u64 = ra.iter().zip(rb).map(|(&x, &y)| x.abs_diff(y) as u64).sum();
        acc.iter().map(|&v| v as u64).sum::<u64>() + tail
    }
}

impl FrameComparator for AcceleratedComparator {
    fn name(&self) -> &'static str {
        "accelerated"
    }

    fn abs_diff_sum(&self, a: &[u8], b: &[u8]) -> u64 {
        let len = a.len().min(b.len());
        let (a, b) = (&a[..len], &b[..len]);
        if len < PAR_MIN_LEN {
            return Self::lanes_sum(a, b);
        }
        a.par_chunks(PAR_CHUNK).zip(b.par_chunks(PAR_CHUNK)).map(|(xa, xb)| Self::lanes_sum(xa, xb)).sum()
    }

    fn mirror(&self, frame: &GrayImage) -> GrayImage {
        let (w, h) = frame.dimensions();
        let mut out = frame.as_raw().clone();
        if w > 0 {
            out.par_chunks_mut(w as usize).for_each(|row| row.reverse());
        }
        GrayImage::from_raw(w, h, out).unwrap_or_else(|| imageops::flip_horizontal(frame))
    }
}

/// Picks the comparator for this host.
pub fn select_comparator(allow_accelerated: bool) -> Arc<dyn FrameComparator> {
    let threads = rayon::current_num_threads();
    let cmp: Arc<dyn FrameComparator> =
        if allow_accelerated && threads > 1 { Arc::new(AcceleratedComparator) } else { Arc::new(PortableComparator) };
    log::debug!("[VIDEO] Frame comparator: {} ({} threads)", cmp.name(), threads);
    cmp
}
