use crossbeam_channel::{unbounded, Receiver, Sender};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use walkdir::WalkDir;

use crate::aggregate::aggregate;
use crate::config::{EngineConfig, MAX_HASH_SIZE, MIN_HASH_SIZE};
use crate::error::ScanError;
use crate::formats::{Classifier, FormatTables};
use crate::image_index::{ImageHasher, ImageIndex};
use crate::report::DuplicateReport;
use crate::video::compare::{select_comparator, FrameComparator};
use crate::video::source::{FfmpegSource, FrameSource, MediaSource};
use crate::video::VideoEngine;
use crate::{Category, MediaFile};

/// Discovery events are batched while walking large trees.
const DISCOVERY_BATCH: usize = 100;

#[derive(Debug)]
pub enum ScanEvent {
    /// Media files found so far.
    Discovered { count: usize },
    /// Files handled so far, images first, then videos.
    Progress { processed: usize },
    Finished { total_files: usize, processed_files: usize, report: DuplicateReport },
    /// Fatal scan failure; no `Finished` follows.
    Error { message: String },
}

/// Owns the scan lifecycle. At most one scan runs per engine.
pub struct ScanEngine {
    config: EngineConfig,
    tables: FormatTables,
    source: Arc<dyn FrameSource>,
    comparator: Arc<dyn FrameComparator>,
    running: Arc<AtomicBool>,
}

/// Clears the running flag when the scan thread ends, however it ends.
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl ScanEngine {
    pub fn new(config: EngineConfig) -> Self {
        let ffmpeg = FfmpegSource::new(&config.video.ffmpeg_path, &config.video.ffprobe_path);
        Self::with_frame_source(config, Arc::new(MediaSource::new(ffmpeg)))
    }

    pub fn with_frame_source(config: EngineConfig, source: Arc<dyn FrameSource>) -> Self {
        let comparator = select_comparator(config.video.accelerated_compare);
        Self {
            config,
            tables: FormatTables::default(),
            source,
            comparator,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_tables(mut self, tables: FormatTables) -> Self {
        self.tables = tables;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Builds the job for one scan without starting it.
    pub fn prepare(&self, root: impl Into<PathBuf>, recursive: bool, hash_size: u32) -> ScanJob {
        let mut config = self.config.clone();
        config.image.hash_size = hash_size;
        ScanJob {
            root: root.into(),
            recursive,
            config,
            classifier: Classifier::new(self.tables.clone()),
            source: self.source.clone(),
            comparator: self.comparator.clone(),
        }
    }

    /// Starts a background scan. Fails with `AlreadyRunning` while a scan
    /// started by this engine is still in flight, and with `InvalidHashSize`
    /// before anything starts.
    pub fn start_scan(&self, root: impl Into<PathBuf>, recursive: bool, hash_size: u32) -> Result<ScanHandle, ScanError> {
        check_hash_size(hash_size)?;
        if self.running.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_err() {
            return Err(ScanError::AlreadyRunning);
        }
        let guard = RunningGuard(self.running.clone());

        let job = self.prepare(root, recursive, hash_size);
        let (tx, rx) = unbounded();
        let cancel = Arc::new(AtomicBool::new(false));
        let cancel_flag = cancel.clone();

        let thread = thread::Builder::new()
            .name("mediadupes-scan".into())
            .spawn(move || {
                let _guard = guard;
                job.run(&cancel_flag, &tx);
            })
            .map_err(ScanError::Spawn)?;

        Ok(ScanHandle { events: rx, cancel, thread: Some(thread) })
    }
}

pub struct ScanHandle {
    events: Receiver<ScanEvent>,
    cancel: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl ScanHandle {
    pub fn events(&self) -> &Receiver<ScanEvent> {
        &self.events
    }

    /// Asks the scan to stop at the next file boundary.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub fn join(mut self) {
        if let Some(t) = self.thread.take()
            && t.join().is_err()
        {
            log::error!("[SCAN] Scan thread panicked");
        }
    }

    /// Blocks until the scan ends and returns every event it sent.
    pub fn wait(self) -> Vec<ScanEvent> {
        let events: Vec<ScanEvent> = self.events.iter().collect();
        self.join();
        events
    }
}

/// Everything one scan needs, detached from the engine.
pub struct ScanJob {
    root: PathBuf,
    recursive: bool,
    config: EngineConfig,
    classifier: Classifier,
    source: Arc<dyn FrameSource>,
    comparator: Arc<dyn FrameComparator>,
}

impl ScanJob {
    /// Runs the scan on the current thread, reporting through `events`.
    pub fn run(self, cancel: &AtomicBool, events: &Sender<ScanEvent>) {
        let send = |ev: ScanEvent| {
            let _ = events.send(ev);
        };

        if let Err(e) = check_hash_size(self.config.image.hash_size).and_then(|_| check_root(&self.root)) {
            log::error!("[SCAN] {}", e);
            send(ScanEvent::Error { message: format!("Error: {}", e) });
            return;
        }

        let Some((images, videos)) = self.discover(cancel, &send) else {
            log::info!("[SCAN] Cancelled during discovery");
            return;
        };
        let total_files = images.len() + videos.len();

        // --- Still images ---
        let hash_start = Instant::now();
        let hasher = ImageHasher::new(self.config.image.hash_size);
        let mut index: ImageIndex = ImageIndex::new(self.config.image.hash_threshold);
        let mut processed = 0;
        for file in &images {
            if cancel.load(Ordering::SeqCst) {
                log::info!("[SCAN] Cancelled while hashing");
                return;
            }
            if let Err(e) = index.add(&hasher, file) {
                log::warn!("[HASH] Skipping {}", e);
            }
            processed += 1;
            send(ScanEvent::Progress { processed });
        }
        let hashed = index.hashed_count();
        log::info!(
            "[SCAN] Hashes loaded: {} of {} in {:.2}s",
            hashed,
            images.len(),
            hash_start.elapsed().as_secs_f64()
        );

        // --- Videos and animations ---
        let mut video_processed = 0;
        let mut video_clusters = Vec::new();
        if !videos.is_empty() {
            let mut engine = VideoEngine::new(self.config.video.clone(), self.source.clone(), self.comparator.clone());
            if engine.is_available() {
                let video_start = Instant::now();
                let paths: Vec<PathBuf> = videos.iter().map(|f| f.path.clone()).collect();
                let is_cancelled = || cancel.load(Ordering::SeqCst);
                let mut on_clip = |_: &Path| {
                    processed += 1;
                    send(ScanEvent::Progress { processed });
                };
                let Some(grouping) = engine.group(&paths, &is_cancelled, &mut on_clip) else {
                    log::info!("[SCAN] Cancelled while comparing videos");
                    return;
                };
                log::info!(
                    "[SCAN] Videos: {} groups from {} clips in {:.2}s",
                    grouping.clusters.len(),
                    grouping.processed,
                    video_start.elapsed().as_secs_f64()
                );
                video_processed = grouping.processed;
                video_clusters = grouping.clusters;
            } else {
                log::warn!("[SCAN] Video decoding unavailable, skipping {} video file(s)", videos.len());
            }
        }

        if cancel.load(Ordering::SeqCst) {
            return;
        }
        let report = aggregate(index.into_groups(), video_clusters);
        log::info!("[SCAN] {} duplicate group(s), {} member(s)", report.len(), report.member_count());
        send(ScanEvent::Finished { total_files, processed_files: hashed + video_processed, report });
    }

    /// Walks the root in file-name order and buckets media files.
    fn discover(&self, cancel: &AtomicBool, send: &dyn Fn(ScanEvent)) -> Option<(Vec<MediaFile>, Vec<MediaFile>)> {
        let mut walker = WalkDir::new(&self.root).min_depth(1).sort_by_file_name();
        if !self.recursive {
            walker = walker.max_depth(1);
        }

        let mut images = Vec::new();
        let mut videos = Vec::new();
        for entry in walker {
            if cancel.load(Ordering::SeqCst) {
                return None;
            }
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    log::warn!("[SCAN] Cannot read entry: {}", e);
                    continue;
                }
            };
            // Symlinked files are followed; symlinked directories are not entered.
            if !entry.path().is_file() {
                continue;
            }
            match self.classifier.media_file(entry.path()) {
                Ok(Some(file)) => {
                    match file.category {
                        Category::StaticImage | Category::RawImage => images.push(file),
                        Category::VideoOrAnimation => videos.push(file),
                    }
                    let count = images.len() + videos.len();
                    if count.is_multiple_of(DISCOVERY_BATCH) {
                        send(ScanEvent::Discovered { count });
                    }
                }
                Ok(None) => {}
                Err(e) => log::warn!("[SCAN] Skipping unreadable file: {}", e),
            }
        }

        let count = images.len() + videos.len();
        if count == 0 || !count.is_multiple_of(DISCOVERY_BATCH) {
            send(ScanEvent::Discovered { count });
        }
        log::debug!("[SCAN] Found {} image(s), {} video(s)", images.len(), videos.len());
        Some((images, videos))
    }
}

fn check_hash_size(hash_size: u32) -> Result<(), ScanError> {
    if !(MIN_HASH_SIZE..=MAX_HASH_SIZE).contains(&hash_size) {
        return Err(ScanError::InvalidHashSize { got: hash_size, min: MIN_HASH_SIZE, max: MAX_HASH_SIZE });
    }
    Ok(())
}

fn check_root(root: &Path) -> Result<(), ScanError> {
    if !root.exists() {
        return Err(ScanError::RootMissing(root.to_path_buf()));
    }
    if !root.is_dir() {
        return Err(ScanError::RootNotDirectory(root.to_path_buf()));
    }
    std::fs::read_dir(root).map_err(|source| ScanError::RootUnreadable { path: root.to_path_buf(), source })?;
    Ok(())
}
