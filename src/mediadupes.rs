use anyhow::{Context, bail};
use clap::Parser;
use std::path::PathBuf;

use mediadupes::{EngineConfig, ScanEngine, ScanEvent};

#[derive(Parser, Debug)]
#[command(author, version, about = "Finds near-duplicate images and videos.", long_about = None)]
struct Cli {
    /// Folder to scan
    root: PathBuf,

    /// Descend into subfolders
    #[arg(long)]
    recursive: bool,

    /// Hash side length; the hash has hash_size^2 bits
    #[arg(long)]
    hash_size: Option<u32>,

    /// Maximum Hamming distance for still images
    #[arg(long)]
    hash_threshold: Option<u32>,

    /// Minimum video similarity in percent
    #[arg(long)]
    video_threshold: Option<f64>,

    /// Config file (default: mediadupes.toml in the user config dir)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn engine_config(&self) -> anyhow::Result<EngineConfig> {
        let mut cfg = match &self.config {
            Some(path) => EngineConfig::load_from(path)?,
            None => EngineConfig::load()?,
        };
        if let Some(v) = self.hash_size {
            cfg.image.hash_size = v;
        }
        if let Some(v) = self.hash_threshold {
            cfg.image.hash_threshold = v;
        }
        if let Some(v) = self.video_threshold {
            cfg.video.similarity_threshold = v;
        }
        cfg.validate().context("Invalid settings")?;
        Ok(cfg)
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Cli::parse();
    let cfg = args.engine_config()?;

    image_extras::register();

    let hash_size = cfg.image.hash_size;
    let engine = ScanEngine::new(cfg);
    let handle = engine.start_scan(&args.root, args.recursive, hash_size)?;

    let mut discovered = 0;
    let mut failure = None;
    for event in handle.events().iter() {
        match event {
            ScanEvent::Discovered { count } => {
                discovered = count;
                eprintln!("Found {} media files...", count);
            }
            ScanEvent::Progress { processed } => {
                if processed % 50 == 0 || processed == discovered {
                    eprintln!("Processed {}/{}", processed, discovered);
                }
            }
            ScanEvent::Error { message } => failure = Some(message),
            ScanEvent::Finished { total_files, processed_files, report } => {
                eprintln!(
                    "Done: {} files, {} processed, {} duplicate groups.",
                    total_files,
                    processed_files,
                    report.len()
                );
                if args.json {
                    println!("{}", serde_json::to_string_pretty(&report)?);
                } else {
                    for row in report.ranked_rows() {
                        println!(
                            "{:>4}  {:>5.1}%  {}  <-  {}",
                            row.rank,
                            row.percentage,
                            row.member.display(),
                            row.representative.display()
                        );
                    }
                }
            }
        }
    }
    handle.join();
    if let Some(message) = failure {
        bail!(message);
    }
    Ok(())
}
