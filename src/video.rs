// Multi-frame video/animation signatures and threshold grouping.

pub mod compare;
pub mod source;

use image::imageops::{self, FilterType};
use image::{GrayImage, Luma};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::VideoConfig;
use crate::error::MediaError;
use crate::identity::FileIdentity;
use compare::FrameComparator;
use source::{FrameSource, Timeline};

/// Ordered grayscale frames sampled from one clip.
#[derive(Debug, Clone)]
pub struct VideoSignature {
    pub frames: Vec<GrayImage>,
    /// More than half of the sampled frames are below the darkness threshold.
    pub dark: bool,
}

impl VideoSignature {
    pub fn is_comparable(&self) -> bool {
        !self.frames.is_empty() && !self.dark
    }
}

/// Signatures memoized per path for the lifetime of one engine. `None`
/// records a clip that could not be sampled.
#[derive(Default)]
pub struct SignatureCache {
    entries: HashMap<PathBuf, Option<Arc<VideoSignature>>>,
}

impl SignatureCache {
    pub fn get(&self, path: &Path) -> Option<&Option<Arc<VideoSignature>>> {
        self.entries.get(path)
    }

    pub fn insert(&mut self, path: PathBuf, sig: Option<Arc<VideoSignature>>) {
        self.entries.insert(path, sig);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoCluster {
    pub representative: PathBuf,
    /// `(path, similarity percent to the representative)`
    pub members: Vec<(PathBuf, f64)>,
}

/// Result of grouping one video bucket.
#[derive(Debug, Default)]
pub struct VideoGrouping {
    pub clusters: Vec<VideoCluster>,
    /// Clips a signature could be extracted from.
    pub processed: usize,
}

pub struct VideoEngine {
    config: VideoConfig,
    source: Arc<dyn FrameSource>,
    comparator: Arc<dyn FrameComparator>,
    cache: SignatureCache,
}

impl VideoEngine {
    pub fn new(config: VideoConfig, source: Arc<dyn FrameSource>, comparator: Arc<dyn FrameComparator>) -> Self {
        Self { config, source, comparator, cache: SignatureCache::default() }
    }

    pub fn is_available(&self) -> bool {
        self.source.is_available()
    }

    pub fn cache(&self) -> &SignatureCache {
        &self.cache
    }

    /// Cached signature of `path`, extracting it on first use. Failures are
    /// logged and remembered as `None`.
    pub fn signature(&mut self, path: &Path) -> Option<Arc<VideoSignature>> {
        if let Some(hit) = self.cache.get(path) {
            return hit.clone();
        }
        let sig = match self.extract(path) {
            Ok(sig) => {
                if sig.dark {
                    log::info!("[VIDEO] Skipping dark clip {:?}", path);
                }
                Some(Arc::new(sig))
            }
            Err(e) => {
                log::warn!("[VIDEO] Skipping {}", e);
                None
            }
        };
        self.cache.insert(path.to_path_buf(), sig.clone());
        sig
    }

    fn extract(&self, path: &Path) -> Result<VideoSignature, MediaError> {
        let cfg = &self.config;
        let timeline = self.source.timeline(path)?;

        let mut picked: Vec<(f64, GrayImage)> = cfg
            .frame_positions
            .iter()
            .filter_map(|&pos| self.grab(path, timeline, pos).map(|f| (pos, f)))
            .collect();

        if picked.len() < cfg.min_frames {
            let target = cfg.frame_positions.len().max(cfg.min_frames);
            for &pos in &cfg.fallback_positions {
                if picked.len() >= target {
                    break;
                }
                if picked.iter().any(|(p, _)| *p == pos) {
                    continue;
                }
                let Some(frame) = self.grab(path, timeline, pos) else { continue };
                let near_dup = picked.iter().any(|(_, kept)| self.frame_similarity(kept, &frame) > cfg.near_duplicate_frame);
                if !near_dup {
                    picked.push((pos, frame));
                }
            }
            picked.sort_by(|a, b| a.0.total_cmp(&b.0));
        }

        let mut frames: Vec<GrayImage> = picked.into_iter().map(|(_, f)| f).collect();
        if frames.is_empty() {
            return Err(MediaError::NoFrames { path: path.to_path_buf() });
        }
        // Only sampled frames vote on darkness, never the synthetic padding.
        let dark_count = frames.iter().filter(|f| mean_luma(f) < cfg.dark_threshold).count();
        let dark = dark_count * 2 > frames.len();
        if frames.len() < cfg.min_frames {
            log::debug!("[VIDEO] {:?}: {} frame(s), padding with synthetic frames", path, frames.len());
            synthesize_frames(&mut frames, cfg.min_frames);
        }
        Ok(VideoSignature { dark, frames })
    }

    fn grab(&self, path: &Path, timeline: Timeline, pos: f64) -> Option<GrayImage> {
        match self.source.frame_at(path, timeline, pos, self.config.frame_size) {
            Ok(f) => Some(f),
            Err(e) => {
                log::debug!("[VIDEO] No frame at {}%: {}", pos, e);
                None
            }
        }
    }

    /// `100 * (1 - mean|a-b| / 255)`, resizing `b` when the shapes differ.
    pub fn frame_similarity(&self, a: &GrayImage, b: &GrayImage) -> f64 {
        let resized;
        let b = if a.dimensions() != b.dimensions() {
            resized = imageops::resize(b, a.width(), a.height(), FilterType::Triangle);
            &resized
        } else {
            b
        };
        let n = a.as_raw().len();
        if n == 0 {
            return 0.0;
        }
        let sum = self.comparator.abs_diff_sum(a.as_raw(), b.as_raw());
        100.0 * (1.0 - sum as f64 / (n as f64 * 255.0))
    }

    /// Mean frame similarity over the shorter signature, taking the better
    /// of the direct and the mirrored comparison.
    pub fn compare(&self, a: &VideoSignature, b: &VideoSignature) -> f64 {
        let n = a.frames.len().min(b.frames.len());
        if n == 0 {
            return 0.0;
        }
        let mut normal = 0.0;
        let mut flipped = 0.0;
        for (fa, fb) in a.frames.iter().zip(&b.frames) {
            normal += self.frame_similarity(fa, fb);
            flipped += self.frame_similarity(&self.comparator.mirror(fa), fb);
        }
        (normal / n as f64).max(flipped / n as f64)
    }

    /// Similarity of two clips. Paths naming the same physical file score
    /// 100 without touching any frames. `None` when either clip has no
    /// comparable signature.
    pub fn similarity(&mut self, a: &Path, b: &Path) -> Option<f64> {
        if FileIdentity::of(a).same_file(&FileIdentity::of(b)) {
            return Some(100.0);
        }
        let sa = self.signature(a).filter(|s| s.is_comparable())?;
        let sb = self.signature(b).filter(|s| s.is_comparable())?;
        Some(self.compare(&sa, &sb))
    }

    /// Single-pass grouping: each unclaimed clip founds a group and claims
    /// every later unclaimed clip scoring at least the threshold against it.
    /// Groups are never reopened. Returns `None` if `cancelled` fires.
    pub fn group(
        &mut self,
        paths: &[PathBuf],
        cancelled: &dyn Fn() -> bool,
        progress: &mut dyn FnMut(&Path),
    ) -> Option<VideoGrouping> {
        let mut processed = 0;
        let mut valid: Vec<(PathBuf, Arc<VideoSignature>, FileIdentity)> = Vec::new();
        for path in paths {
            if cancelled() {
                return None;
            }
            if let Some(sig) = self.signature(path) {
                processed += 1;
                if sig.is_comparable() {
                    valid.push((path.clone(), sig, FileIdentity::of(path)));
                }
            }
            progress(path);
        }
        log::debug!("[VIDEO] {} of {} clips comparable", valid.len(), paths.len());

        let threshold = self.config.similarity_threshold;
        let mut claimed = vec![false; valid.len()];
        let mut clusters = Vec::new();
        for i in 0..valid.len() {
            if claimed[i] {
                continue;
            }
            if cancelled() {
                return None;
            }
            claimed[i] = true;
            let (rep_path, rep_sig, rep_id) = &valid[i];
            let mut members = Vec::new();
            for j in (i + 1)..valid.len() {
                if claimed[j] {
                    continue;
                }
                let (path, sig, id) = &valid[j];
                let score = if rep_id.same_file(id) { 100.0 } else { self.compare(rep_sig, sig) };
                if score >= threshold {
                    claimed[j] = true;
                    members.push((path.clone(), score));
                }
            }
            if !members.is_empty() {
                clusters.push(VideoCluster { representative: rep_path.clone(), members });
            }
        }
        Some(VideoGrouping { clusters, processed })
    }
}

fn mean_luma(frame: &GrayImage) -> f64 {
    let raw = frame.as_raw();
    if raw.is_empty() {
        return 0.0;
    }
    raw.iter().map(|&v| v as u64).sum::<u64>() as f64 / raw.len() as f64
}

/// Pads `frames` to `target` with perturbed copies of the first frame: a
/// 1px-cropped rescale, then brightness shifted by +10 and -10.
fn synthesize_frames(frames: &mut Vec<GrayImage>, target: usize) {
    let Some(base) = frames.first().cloned() else { return };
    let (w, h) = base.dimensions();
    let mut variants: Vec<GrayImage> = Vec::new();
    if w > 2 && h > 2 {
        let crop = imageops::crop_imm(&base, 1, 1, w - 2, h - 2).to_image();
        variants.push(imageops::resize(&crop, w, h, FilterType::Triangle));
    }
    for delta in [10i16, -10] {
        variants.push(GrayImage::from_fn(w, h, |x, y| {
            let v = base.get_pixel(x, y)[0] as i16 + delta;
            Luma([v.clamp(0, 255) as u8])
        }));
    }
    let mut i = 0;
    while frames.len() < target {
        frames.push(variants[i % variants.len()].clone());
        i += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{gray_frame, ramp_frame, FakeSource};
    use super::compare::{AcceleratedComparator, PortableComparator};
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Portable comparator that counts how often it is asked for pixel work.
    #[derive(Default)]
    struct CountingComparator {
        calls: AtomicUsize,
    }

    impl FrameComparator for CountingComparator {
        fn name(&self) -> &'static str {
            "counting"
        }
        fn abs_diff_sum(&self, a: &[u8], b: &[u8]) -> u64 {
            self.calls.fetch_add(1, Ordering::SeqCst);
            PortableComparator.abs_diff_sum(a, b)
        }
        fn mirror(&self, frame: &GrayImage) -> GrayImage {
            self.calls.fetch_add(1, Ordering::SeqCst);
            PortableComparator.mirror(frame)
        }
    }

    fn engine(source: FakeSource) -> VideoEngine {
        VideoEngine::new(VideoConfig::default(), Arc::new(source), Arc::new(PortableComparator))
    }

    fn never() -> bool {
        false
    }

    fn flat_clip(value: u8) -> Vec<GrayImage> {
        (0..10).map(|_| gray_frame(16, value)).collect()
    }

    #[test]
    fn test_threshold_boundary() {
        // |100-118| = 18 -> 92.94%, |100-123| = 23 -> 90.98%
        let mut src = FakeSource::default();
        src.add("rep.mp4", flat_clip(100));
        src.add("close.mp4", flat_clip(118));
        let mut eng = engine(src);
        let score = eng.similarity(Path::new("rep.mp4"), Path::new("close.mp4")).unwrap();
        assert!(score > 92.0 && score < 94.0, "{}", score);

        let g = eng.group(&[PathBuf::from("rep.mp4"), PathBuf::from("close.mp4")], &never, &mut |_| {}).unwrap();
        assert_eq!(g.clusters.len(), 1);
        assert_eq!(g.clusters[0].members[0].0, PathBuf::from("close.mp4"));

        let mut src = FakeSource::default();
        src.add("rep.mp4", flat_clip(100));
        src.add("far.mp4", flat_clip(123));
        let mut eng = engine(src);
        let score = eng.similarity(Path::new("rep.mp4"), Path::new("far.mp4")).unwrap();
        assert!(score > 90.0 && score < 92.0, "{}", score);
        let g = eng.group(&[PathBuf::from("rep.mp4"), PathBuf::from("far.mp4")], &never, &mut |_| {}).unwrap();
        assert!(g.clusters.is_empty());
        assert_eq!(g.processed, 2);
    }

    #[test]
    fn test_hardlinks_score_100_without_pixel_work() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.mp4");
        let b = dir.path().join("b.mp4");
        fs::write(&a, b"clip").unwrap();
        fs::hard_link(&a, &b).unwrap();

        // Source has no frames at all for these paths.
        let counter = Arc::new(CountingComparator::default());
        let mut eng = VideoEngine::new(VideoConfig::default(), Arc::new(FakeSource::default()), counter.clone());
        assert_eq!(eng.similarity(&a, &b), Some(100.0));
        assert_eq!(counter.calls.load(Ordering::SeqCst), 0);
        assert!(eng.cache().is_empty());
    }

    #[test]
    fn test_hardlinks_group_without_pixel_work() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.mp4");
        let b = dir.path().join("b.mp4");
        fs::write(&a, b"clip").unwrap();
        fs::hard_link(&a, &b).unwrap();

        let mut src = FakeSource::default();
        src.add(&a, flat_clip(90));
        src.add(&b, flat_clip(90));
        let counter = Arc::new(CountingComparator::default());
        let mut eng = VideoEngine::new(VideoConfig::default(), Arc::new(src), counter.clone());
        let g = eng.group(&[a.clone(), b.clone()], &never, &mut |_| {}).unwrap();
        assert_eq!(g.clusters, vec![VideoCluster { representative: a, members: vec![(b, 100.0)] }]);
        assert_eq!(counter.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_black_clip_is_never_compared() {
        let mut src = FakeSource::default();
        src.add("black.mp4", flat_clip(0));
        src.add("black2.mp4", flat_clip(0));
        src.add("lit.mp4", flat_clip(120));
        let counter = Arc::new(CountingComparator::default());
        let mut eng = VideoEngine::new(VideoConfig::default(), Arc::new(src), counter.clone());

        let sig = eng.signature(Path::new("black.mp4")).unwrap();
        assert!(sig.dark);
        assert!(!sig.is_comparable());
        let before = counter.calls.load(Ordering::SeqCst);

        assert_eq!(eng.similarity(Path::new("black.mp4"), Path::new("lit.mp4")), None);
        assert_eq!(eng.similarity(Path::new("lit.mp4"), Path::new("black.mp4")), None);

        let paths = [PathBuf::from("black.mp4"), PathBuf::from("black2.mp4"), PathBuf::from("lit.mp4")];
        let g = eng.group(&paths, &never, &mut |_| {}).unwrap();
        assert!(g.clusters.is_empty());
        assert_eq!(counter.calls.load(Ordering::SeqCst), before);
    }

    #[test]
    fn test_mostly_dark_clip_is_dark() {
        let mut src = FakeSource::default();
        // Sampled indices 1,3,5,7,9: three dark, two lit
        let frames: Vec<GrayImage> = (0..10).map(|i| gray_frame(16, if i < 6 { 5 } else { 200 })).collect();
        src.add("dusk.mp4", frames);
        let mut eng = engine(src);
        assert!(eng.signature(Path::new("dusk.mp4")).unwrap().dark);
    }

    #[test]
    fn test_padding_does_not_make_clip_dark() {
        let mut src = FakeSource::default();
        src.add("half.gif", vec![gray_frame(16, 5), gray_frame(16, 200)]);
        src.fail_positions("half.gif", &[10.0, 30.0, 50.0, 70.0]);
        let mut eng = engine(src);
        let sig = eng.signature(Path::new("half.gif")).unwrap();
        // One dark and one lit sample, padded with a copy of the dark one.
        assert_eq!(sig.frames.len(), 3);
        assert_eq!(sig.frames.iter().filter(|f| mean_luma(f) < 20.0).count(), 2);
        assert!(!sig.dark);
    }

    #[test]
    fn test_mirrored_clip_matches() {
        let mut src = FakeSource::default();
        let fwd: Vec<GrayImage> = (0..10).map(|i| ramp_frame(16, i * 2)).collect();
        let mirrored: Vec<GrayImage> = fwd.iter().map(|f| imageops::flip_horizontal(f)).collect();
        src.add("fwd.mp4", fwd);
        src.add("mirror.mp4", mirrored);
        let mut eng = engine(src);
        let score = eng.similarity(Path::new("fwd.mp4"), Path::new("mirror.mp4")).unwrap();
        assert!((score - 100.0).abs() < 1e-9, "{}", score);

        let sa = eng.signature(Path::new("fwd.mp4")).unwrap();
        let sb = eng.signature(Path::new("mirror.mp4")).unwrap();
        assert!(sa.frames.iter().zip(&sb.frames).all(|(a, b)| eng.frame_similarity(a, b) < 100.0));
    }

    #[test]
    fn test_frame_shape_mismatch_is_resized() {
        let eng = engine(FakeSource::default());
        let a = gray_frame(16, 80);
        let b = gray_frame(32, 80);
        assert!((eng.frame_similarity(&a, &b) - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_signature_uses_shorter_length() {
        let eng = engine(FakeSource::default());
        let a = VideoSignature { frames: vec![gray_frame(16, 50); 5], dark: false };
        let b = VideoSignature { frames: vec![gray_frame(16, 50); 3], dark: false };
        assert!((eng.compare(&a, &b) - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_short_clip_uses_fallback_positions() {
        let mut src = FakeSource::default();
        src.add("two.gif", vec![gray_frame(16, 60), gray_frame(16, 200)]);
        src.fail_positions("two.gif", &[10.0, 30.0, 50.0, 70.0]);
        let mut eng = engine(src);
        let sig = eng.signature(Path::new("two.gif")).unwrap();
        // 90% gives frame 1; fallback 5% adds frame 0; later fallbacks are
        // near-duplicates, so a synthetic copy of frame 0 fills the third slot.
        assert_eq!(sig.frames.len(), 3);
        assert_eq!(sig.frames[0].get_pixel(0, 0)[0], 60);
        assert_eq!(sig.frames[1].get_pixel(0, 0)[0], 200);
    }

    #[test]
    fn test_single_frame_is_padded_with_synthetic_frames() {
        let mut src = FakeSource::default();
        src.add("one.gif", vec![gray_frame(16, 100)]);
        let mut eng = engine(src);
        let sig = eng.signature(Path::new("one.gif")).unwrap();
        // Every primary position lands on frame 0
        assert_eq!(sig.frames.len(), 5);

        let mut src = FakeSource::default();
        src.add("one.gif", vec![gray_frame(16, 100)]);
        src.fail_positions("one.gif", &[30.0, 50.0, 70.0, 90.0]);
        let mut eng = engine(src);
        let sig = eng.signature(Path::new("one.gif")).unwrap();
        assert_eq!(sig.frames.len(), 3);
        let levels: Vec<u8> = sig.frames.iter().map(|f| f.get_pixel(8, 8)[0]).collect();
        assert_eq!(levels, vec![100, 100, 110]);
    }

    #[test]
    fn test_undecodable_clip_is_cached_as_none() {
        let mut eng = engine(FakeSource::default());
        assert!(eng.signature(Path::new("missing.mp4")).is_none());
        assert_eq!(eng.cache().len(), 1);
        let g = eng.group(&[PathBuf::from("missing.mp4")], &never, &mut |_| {}).unwrap();
        assert_eq!(g.processed, 0);
    }

    #[test]
    fn test_groups_are_never_reopened() {
        // a~b (b+18), b~c (c+18 over b) but a vs c is 36 apart
        let mut src = FakeSource::default();
        src.add("a.mp4", flat_clip(100));
        src.add("b.mp4", flat_clip(118));
        src.add("c.mp4", flat_clip(136));
        let mut eng = engine(src);
        let paths: Vec<PathBuf> = ["a.mp4", "b.mp4", "c.mp4"].iter().map(PathBuf::from).collect();
        let g = eng.group(&paths, &never, &mut |_| {}).unwrap();
        assert_eq!(g.clusters.len(), 1);
        assert_eq!(g.clusters[0].representative, PathBuf::from("a.mp4"));
        assert_eq!(g.clusters[0].members.len(), 1);
    }

    #[test]
    fn test_cancellation_stops_grouping() {
        let mut src = FakeSource::default();
        src.add("a.mp4", flat_clip(100));
        let mut eng = engine(src);
        assert!(eng.group(&[PathBuf::from("a.mp4")], &|| true, &mut |_| {}).is_none());
    }

    #[test]
    fn test_accelerated_comparator_gives_same_scores() {
        let mut src = FakeSource::default();
        src.add("x.mp4", (0..10).map(|i| ramp_frame(16, i * 3)).collect());
        src.add("y.mp4", (0..10).map(|i| ramp_frame(16, i * 3 + 7)).collect());
        let src = Arc::new(src);
        let mut p = VideoEngine::new(VideoConfig::default(), src.clone(), Arc::new(PortableComparator));
        let mut a = VideoEngine::new(VideoConfig::default(), src, Arc::new(AcceleratedComparator));
        let sp = p.similarity(Path::new("x.mp4"), Path::new("y.mp4")).unwrap();
        let sa = a.similarity(Path::new("x.mp4"), Path::new("y.mp4")).unwrap();
        assert_eq!(sp.to_bits(), sa.to_bits());
    }
}
