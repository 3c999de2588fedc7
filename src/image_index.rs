// Greedy first-match clustering of still-image perceptual hashes.
//
// Clusters are scanned in creation order and a new hash joins the FIRST one
// whose key is within the threshold, not the nearest. The result therefore
// depends on insertion order; callers feed files in walk order.

use std::path::{Path, PathBuf};

use crate::decode;
use crate::error::MediaError;
use crate::hamminghash::{HammingHash, ImageHash};
use crate::phash::DctPhash;
use crate::{Category, MediaFile};

/// Where a hash landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Founded a new cluster at this index and is its representative.
    NewCluster(usize),
    Joined { cluster: usize, distance: u32 },
}

#[derive(Debug, Clone)]
struct Cluster<H> {
    key: H,
    representative: PathBuf,
    members: Vec<(PathBuf, u32)>,
}

/// A cluster with at least one duplicate, ready for aggregation.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageCluster {
    pub representative: PathBuf,
    /// `(path, hamming distance to the representative's hash)`
    pub members: Vec<(PathBuf, u32)>,
    pub bit_count: u32,
}

pub struct ImageIndex<H: HammingHash = ImageHash> {
    threshold: u32,
    clusters: Vec<Cluster<H>>,
    hashed: usize,
}

impl<H: HammingHash> ImageIndex<H> {
    pub fn new(threshold: u32) -> Self {
        Self { threshold, clusters: Vec::new(), hashed: 0 }
    }

    pub fn insert(&mut self, path: PathBuf, hash: H) -> Placement {
        self.hashed += 1;
        for (idx, cluster) in self.clusters.iter_mut().enumerate() {
            let distance = cluster.key.hamming_distance(&hash);
            if distance <= self.threshold {
                cluster.members.push((path, distance));
                return Placement::Joined { cluster: idx, distance };
            }
        }
        self.clusters.push(Cluster { key: hash, representative: path, members: Vec::new() });
        Placement::NewCluster(self.clusters.len() - 1)
    }

    /// Number of files successfully hashed into the index.
    pub fn hashed_count(&self) -> usize {
        self.hashed
    }

    pub fn cluster_count(&self) -> usize {
        self.clusters.len()
    }

    pub fn representative_of(&self, cluster: usize) -> Option<&Path> {
        self.clusters.get(cluster).map(|c| c.representative.as_path())
    }

    /// Consumes the index, keeping only clusters with duplicates, in
    /// creation order.
    pub fn into_groups(self) -> Vec<ImageCluster> {
        self.clusters
            .into_iter()
            .filter(|c| !c.members.is_empty())
            .map(|c| ImageCluster {
                bit_count: c.key.bit_count(),
                representative: c.representative,
                members: c.members,
            })
            .collect()
    }
}

impl ImageIndex<ImageHash> {
    /// Decodes, hashes and clusters one still image.
    pub fn add(&mut self, hasher: &ImageHasher, file: &MediaFile) -> Result<Placement, MediaError> {
        let hash = hasher.hash_file(file)?;
        log::debug!("[HASH] {:?} {:?}", file.path.file_name().unwrap_or_default(), hash);
        Ok(self.insert(file.path.clone(), hash))
    }
}

/// Loads a still or RAW image and computes its perceptual hash.
pub struct ImageHasher {
    phash: DctPhash,
}

impl ImageHasher {
    pub fn new(hash_size: u32) -> Self {
        Self { phash: DctPhash::new(hash_size) }
    }

    pub fn hash_size(&self) -> u32 {
        self.phash.hash_size()
    }

    pub fn hash_file(&self, file: &MediaFile) -> Result<ImageHash, MediaError> {
        let rgb = match file.category {
            Category::RawImage => decode::load_raw(&file.path)?,
            _ => decode::load_rgb(&file.path)?,
        };
        Ok(self.phash.hash_image(&rgb))
    }
}
