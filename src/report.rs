use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::aggregate::{DuplicateGroup, GroupId, GroupKind};

/// Filesystem operations performed on behalf of the reviewer. Implemented
/// outside this crate; every call reports success.
pub trait FileActions {
    fn delete(&mut self, path: &Path) -> bool;
    fn move_to(&mut self, path: &Path, destination_dir: &Path) -> bool;
    fn restore(&mut self, path: &Path) -> bool;
}

/// One table row: a representative/member pair with its global rank.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedRow {
    pub rank: usize,
    pub group_id: GroupId,
    pub kind: GroupKind,
    pub representative: PathBuf,
    pub member: PathBuf,
    pub percentage: f64,
}

/// A group as it was before a removal, and where it sat in the report.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupSnapshot {
    pub index: usize,
    pub group: DuplicateGroup,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DuplicateReport {
    groups: Vec<DuplicateGroup>,
}

impl DuplicateReport {
    pub fn new(groups: Vec<DuplicateGroup>) -> Self {
        Self { groups }
    }

    pub fn groups(&self) -> &[DuplicateGroup] {
        &self.groups
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn group(&self, id: GroupId) -> Option<&DuplicateGroup> {
        self.groups.iter().find(|g| g.id == id)
    }

    pub fn member_count(&self) -> usize {
        self.groups.iter().map(|g| g.members.len()).sum()
    }

    pub fn ranked_rows(&self) -> Vec<RankedRow> {
        let mut rows: Vec<RankedRow> = self
            .groups
            .iter()
            .flat_map(|g| {
                g.members.iter().map(move |m| RankedRow {
                    rank: m.rank,
                    group_id: g.id,
                    kind: g.kind,
                    representative: g.representative.clone(),
                    member: m.path.clone(),
                    percentage: m.percentage,
                })
            })
            .collect();
        rows.sort_by_key(|r| r.rank);
        rows
    }

    /// `[(representative, [(member, percentage)])]`
    pub fn to_groups(&self) -> Vec<(PathBuf, Vec<(PathBuf, f64)>)> {
        self.groups
            .iter()
            .map(|g| (g.representative.clone(), g.members.iter().map(|m| (m.path.clone(), m.percentage)).collect()))
            .collect()
    }

    fn position_of(&self, path: &Path) -> Option<usize> {
        self.groups
            .iter()
            .position(|g| g.representative == path || g.members.iter().any(|m| m.path == path))
    }

    /// Drops `path` from the report. A removed representative is replaced by
    /// the group's first member; a group left without members disappears.
    /// Returns the group as it was, for [`Self::restore`].
    pub fn remove_path(&mut self, path: &Path) -> Option<GroupSnapshot> {
        let index = self.position_of(path)?;
        let snapshot = GroupSnapshot { index, group: self.groups[index].clone() };

        let group = &mut self.groups[index];
        if group.representative == path {
            if group.members.is_empty() {
                self.groups.remove(index);
                return Some(snapshot);
            }
            let promoted = group.members.remove(0);
            group.representative = promoted.path;
        } else {
            group.members.retain(|m| m.path != path);
        }
        if group.members.is_empty() {
            self.groups.remove(index);
        }
        Some(snapshot)
    }

    /// Puts a group back exactly as captured.
    pub fn restore(&mut self, snapshot: GroupSnapshot) {
        if let Some(existing) = self.groups.iter_mut().find(|g| g.id == snapshot.group.id) {
            *existing = snapshot.group;
            return;
        }
        let at = snapshot.index.min(self.groups.len());
        self.groups.insert(at, snapshot.group);
    }

    pub fn delete_with(&mut self, actions: &mut dyn FileActions, path: &Path) -> Option<GroupSnapshot> {
        if !actions.delete(path) {
            log::warn!("Delete failed for {:?}", path);
            return None;
        }
        self.remove_path(path)
    }

    pub fn move_with(&mut self, actions: &mut dyn FileActions, path: &Path, destination_dir: &Path) -> Option<GroupSnapshot> {
        if !actions.move_to(path, destination_dir) {
            log::warn!("Move failed for {:?} -> {:?}", path, destination_dir);
            return None;
        }
        self.remove_path(path)
    }

    /// Restores `path` on disk, then its group in the report.
    pub fn undo_with(&mut self, actions: &mut dyn FileActions, path: &Path, snapshot: GroupSnapshot) -> bool {
        if !actions.restore(path) {
            log::warn!("Restore failed for {:?}", path);
            return false;
        }
        self.restore(snapshot);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::aggregate;
    use crate::image_index::ImageCluster;
    use crate::video::VideoCluster;
    use std::collections::HashSet;

    fn sample() -> DuplicateReport {
        aggregate(
            vec![ImageCluster {
                representative: PathBuf::from("a.jpg"),
                members: vec![(PathBuf::from("b.jpg"), 0), (PathBuf::from("c.jpg"), 2)],
                bit_count: 64,
            }],
            vec![VideoCluster {
                representative: PathBuf::from("x.mp4"),
                members: vec![(PathBuf::from("y.mp4"), 97.0)],
            }],
        )
    }

    /// Records calls; operations on paths in `refuse` fail.
    #[derive(Default)]
    struct RecordingActions {
        log: Vec<String>,
        refuse: HashSet<PathBuf>,
    }

    impl FileActions for RecordingActions {
        fn delete(&mut self, path: &Path) -> bool {
            self.log.push(format!("delete {}", path.display()));
            !self.refuse.contains(path)
        }
        fn move_to(&mut self, path: &Path, destination_dir: &Path) -> bool {
            self.log.push(format!("move {} {}", path.display(), destination_dir.display()));
            !self.refuse.contains(path)
        }
        fn restore(&mut self, path: &Path) -> bool {
            self.log.push(format!("restore {}", path.display()));
            !self.refuse.contains(path)
        }
    }

    #[test]
    fn test_to_groups_shape() {
        let groups = sample().to_groups();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, PathBuf::from("a.jpg"));
        assert_eq!(groups[0].1, vec![(PathBuf::from("b.jpg"), 100.0), (PathBuf::from("c.jpg"), 97.0)]);
        assert_eq!(groups[1].1, vec![(PathBuf::from("y.mp4"), 97.0)]);
    }

    #[test]
    fn test_removing_representative_promotes_first_member() {
        let mut report = sample();
        let snap = report.remove_path(Path::new("a.jpg")).unwrap();
        let g = &report.groups()[0];
        assert_eq!(g.representative, PathBuf::from("b.jpg"));
        assert_eq!(g.members.len(), 1);
        assert_eq!(g.members[0].path, PathBuf::from("c.jpg"));
        assert_eq!(snap.index, 0);
        assert_eq!(snap.group.representative, PathBuf::from("a.jpg"));
    }

    #[test]
    fn test_group_without_members_is_dropped() {
        let mut report = sample();
        report.remove_path(Path::new("y.mp4")).unwrap();
        assert_eq!(report.len(), 1);
        assert!(report.remove_path(Path::new("y.mp4")).is_none());
        assert!(report.remove_path(Path::new("unknown.png")).is_none());
    }

    #[test]
    fn test_restore_puts_group_back_in_place() {
        let mut report = sample();
        let before = report.groups().to_vec();
        let s1 = report.remove_path(Path::new("b.jpg")).unwrap();
        let s2 = report.remove_path(Path::new("c.jpg")).unwrap();
        assert_eq!(report.len(), 1);
        report.restore(s2);
        report.restore(s1);
        assert_eq!(report.groups(), &before[..]);
    }

    #[test]
    fn test_actions_only_touch_report_on_success() {
        let mut report = sample();
        let mut actions = RecordingActions::default();
        actions.refuse.insert(PathBuf::from("c.jpg"));

        assert!(report.delete_with(&mut actions, Path::new("c.jpg")).is_none());
        assert_eq!(report.member_count(), 3);

        let snap = report.move_with(&mut actions, Path::new("y.mp4"), Path::new("/keep")).unwrap();
        assert_eq!(report.len(), 1);

        assert!(report.undo_with(&mut actions, Path::new("y.mp4"), snap));
        assert_eq!(report.len(), 2);
        assert_eq!(report.groups()[1].representative, PathBuf::from("x.mp4"));
        assert_eq!(actions.log, vec!["delete c.jpg", "move y.mp4 /keep", "restore y.mp4"]);
    }

    #[test]
    fn test_ranked_rows_follow_rank() {
        let rows = sample().ranked_rows();
        let ranks: Vec<usize> = rows.iter().map(|r| r.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3]);
        assert_eq!(rows[0].member, PathBuf::from("b.jpg"));
        // 97.0 tie: image member discovered first
        assert_eq!(rows[1].member, PathBuf::from("c.jpg"));
        assert_eq!(rows[2].kind, GroupKind::Video);
    }
}
