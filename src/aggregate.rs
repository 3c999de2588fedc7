use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

use crate::image_index::ImageCluster;
use crate::report::DuplicateReport;
use crate::video::VideoCluster;

/// Opaque group token, unique per group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct GroupId(Uuid);

impl GroupId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for GroupId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupKind {
    Image,
    Video,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateMember {
    pub path: PathBuf,
    pub percentage: f64,
    /// 1-based position in the similarity order across every group.
    pub rank: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateGroup {
    pub id: GroupId,
    pub kind: GroupKind,
    pub representative: PathBuf,
    pub members: Vec<DuplicateMember>,
}

/// Maps a Hamming distance onto 0-100, rounded half to even.
pub fn image_percentage(distance: u32, bit_count: u32) -> f64 {
    if bit_count == 0 {
        return 0.0;
    }
    ((1.0 - distance as f64 / bit_count as f64) * 100.0).round_ties_even().max(0.0)
}

/// Merges image and video clusters into one report and assigns the global
/// rank. Image groups come first, each side in discovery order, so ties in
/// percentage rank in that order.
pub fn aggregate(images: Vec<ImageCluster>, videos: Vec<VideoCluster>) -> DuplicateReport {
    let mut groups: Vec<DuplicateGroup> = Vec::with_capacity(images.len() + videos.len());

    for cluster in images {
        let bits = cluster.bit_count;
        groups.push(DuplicateGroup {
            id: GroupId::new(),
            kind: GroupKind::Image,
            representative: cluster.representative,
            members: cluster
                .members
                .into_iter()
                .map(|(path, d)| DuplicateMember { path, percentage: image_percentage(d, bits), rank: 0 })
                .collect(),
        });
    }
    for cluster in videos {
        groups.push(DuplicateGroup {
            id: GroupId::new(),
            kind: GroupKind::Video,
            representative: cluster.representative,
            members: cluster
                .members
                .into_iter()
                .map(|(path, percentage)| DuplicateMember { path, percentage, rank: 0 })
                .collect(),
        });
    }

    assign_ranks(&mut groups);
    DuplicateReport::new(groups)
}

/// Dense 1..N ranking by descending percentage; the sort is stable.
pub fn assign_ranks(groups: &mut [DuplicateGroup]) {
    let mut order: Vec<(usize, usize, f64)> = groups
        .iter()
        .enumerate()
        .flat_map(|(g, group)| group.members.iter().enumerate().map(move |(m, mem)| (g, m, mem.percentage)))
        .collect();
    order.sort_by(|a, b| b.2.total_cmp(&a.2));

    for (rank, (g, m, _)) in order.into_iter().enumerate() {
        groups[g].members[m].rank = rank + 1;
    }
}
