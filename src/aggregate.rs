//! Per-subtree aggregate statistics
//!
//! One bottom-up pass over the tree computes, for every node, occurrence
//! counts per finding kind and value over all unpruned file leaves of its
//! subtree. Aggregates are derived data: recomputed in full after a tree
//! rebuild or a pruning change, never persisted.

use crate::db::models::{Component, FileType, FindingKind, FindingSet, ReviewStatus, ScanRecord};
use crate::tree::{FileTree, NodeId, TreeNode};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Bucket charts use for a finding kind with no detections in a file
pub const NO_VALUE_DETECTED: &str = "No Value Detected";

/// Rollup counts for one node's subtree
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregateStats {
    /// kind → value → occurrence count over unpruned file leaves
    pub counts: BTreeMap<FindingKind, BTreeMap<String, u64>>,
    /// Unpruned file leaves in this subtree
    pub leaf_file_count: u64,
}

impl AggregateStats {
    /// Stats for one file leaf: one count per distinct finding value, with
    /// the sentinel bucket for every known kind that detected nothing
    fn for_file(findings: &FindingSet) -> AggregateStats {
        let mut stats = AggregateStats {
            leaf_file_count: 1,
            ..Default::default()
        };

        for kind in FindingKind::known() {
            let values = findings.values(&kind);
            let entry = stats.counts.entry(kind).or_default();
            if values.is_empty() {
                *entry.entry(NO_VALUE_DETECTED.to_string()).or_insert(0) += 1;
            } else {
                let distinct: BTreeSet<&String> = values.iter().collect();
                for value in distinct {
                    *entry.entry(value.clone()).or_insert(0) += 1;
                }
            }
        }

        // Kinds outside the closed enumeration count only when present
        for (kind, values) in findings.iter() {
            if matches!(kind, FindingKind::Unknown(_)) && !values.is_empty() {
                let entry = stats.counts.entry(kind.clone()).or_default();
                let distinct: BTreeSet<&String> = values.iter().collect();
                for value in distinct {
                    *entry.entry(value.clone()).or_insert(0) += 1;
                }
            }
        }

        stats
    }

    /// Key-wise addition of a child's stats
    fn merge_from(&mut self, other: &AggregateStats) {
        self.leaf_file_count += other.leaf_file_count;
        for (kind, values) in &other.counts {
            let entry = self.counts.entry(kind.clone()).or_default();
            for (value, count) in values {
                *entry.entry(value.clone()).or_insert(0) += count;
            }
        }
    }

    /// Value→count map for one kind; empty when nothing was counted
    pub fn counts_for(&self, kind: &FindingKind) -> BTreeMap<String, u64> {
        self.counts.get(kind).cloned().unwrap_or_default()
    }
}

/// Aggregates for every node of one tree, indexed by `NodeId`
pub struct Aggregates {
    per_node: Vec<AggregateStats>,
}

impl Aggregates {
    pub fn stats(&self, id: NodeId) -> &AggregateStats {
        &self.per_node[id]
    }

    /// Chart-facing view: value→count for `kind` within `scope`'s subtree
    pub fn summarize(&self, kind: &FindingKind, scope: NodeId) -> BTreeMap<String, u64> {
        self.per_node[scope].counts_for(kind)
    }
}

/// Compute aggregates for the whole tree in one bottom-up pass
///
/// A child for which `is_pruned` returns true contributes nothing to its
/// ancestors, subtree included; the child's own stats are still computed so
/// consumers can inspect what pruning removed.
pub fn aggregate<F>(tree: &FileTree, records: &[ScanRecord], is_pruned: F) -> Aggregates
where
    F: Fn(&TreeNode) -> bool,
{
    let findings_by_path: HashMap<&str, &FindingSet> = records
        .iter()
        .map(|r| (r.path.as_str(), &r.findings))
        .collect();

    let node_count = tree.node_count();
    let mut per_node: Vec<AggregateStats> = vec![AggregateStats::default(); node_count];

    // Children always carry higher ids than their parent, so a single
    // descending sweep visits every node after its whole subtree
    for id in (0..node_count).rev() {
        let node = tree.node(id);

        if node.file_type == FileType::File {
            let empty = FindingSet::new();
            let findings = findings_by_path
                .get(node.path.as_str())
                .copied()
                .unwrap_or(&empty);
            let leaf = AggregateStats::for_file(findings);
            per_node[id].merge_from(&leaf);
        }

        if let Some(parent) = node.parent {
            if !is_pruned(node) {
                let (head, tail) = per_node.split_at_mut(id);
                head[parent].merge_from(&tail[0]);
            }
        }
    }

    Aggregates { per_node }
}

/// Reviewer-status filter driving the pruning predicate
///
/// A node is pruned when its path has a component whose status is set and
/// not in the selected set. A path with no component, or a component with
/// no status, is always shown.
#[derive(Debug, Clone)]
pub struct StatusFilter {
    selected: BTreeSet<ReviewStatus>,
}

impl StatusFilter {
    pub fn new(selected: impl IntoIterator<Item = ReviewStatus>) -> Self {
        Self {
            selected: selected.into_iter().collect(),
        }
    }

    /// Filter that shows everything (all statuses selected)
    pub fn show_all() -> Self {
        Self::new(ReviewStatus::all())
    }

    pub fn is_status_pruned(&self, status: Option<ReviewStatus>) -> bool {
        match status {
            None => false,
            Some(s) => !self.selected.contains(&s),
        }
    }

    /// Predicate over tree nodes, resolving statuses through the overlay
    pub fn pruning_predicate<'a>(
        &'a self,
        overlay: &'a HashMap<String, Component>,
    ) -> impl Fn(&TreeNode) -> bool + 'a {
        move |node| {
            let status = overlay.get(&node.path).and_then(|c| c.review_status);
            self.is_status_pruned(status)
        }
    }
}

/// Index an overlay listing by path for predicate lookups
pub fn component_index(components: Vec<Component>) -> HashMap<String, Component> {
    components
        .into_iter()
        .map(|c| (c.path.clone(), c))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::PathRecord;

    fn record(path: &str, file_type: FileType, licenses: &[&str]) -> ScanRecord {
        let mut r = ScanRecord::new(path.to_string(), file_type);
        if !licenses.is_empty() {
            r.findings.insert(
                FindingKind::License,
                licenses.iter().map(|s| s.to_string()).collect(),
            );
        }
        r
    }

    fn path_records(records: &[ScanRecord]) -> Vec<PathRecord> {
        records
            .iter()
            .map(|r| PathRecord {
                path: r.path.clone(),
                file_type: r.file_type,
            })
            .collect()
    }

    #[test]
    fn test_single_file_scenario() {
        let records = vec![record("a/b.txt", FileType::File, &["MIT"])];
        let tree = FileTree::build(&path_records(&records)).unwrap();
        let aggregates = aggregate(&tree, &records, |_| false);

        let root_stats = aggregates.stats(tree.root());
        assert_eq!(root_stats.leaf_file_count, 1);
        let licenses = aggregates.summarize(&FindingKind::License, tree.root());
        assert_eq!(licenses.get("MIT"), Some(&1));
    }

    #[test]
    fn test_directory_stats_sum_children() {
        let records = vec![
            record("a", FileType::Directory, &[]),
            record("a/one.c", FileType::File, &["MIT"]),
            record("a/two.c", FileType::File, &["MIT", "GPL-2.0"]),
            record("b.c", FileType::File, &["Apache-2.0"]),
        ];
        let tree = FileTree::build(&path_records(&records)).unwrap();
        let aggregates = aggregate(&tree, &records, |_| false);

        let a = aggregates.stats(tree.find("a").unwrap());
        assert_eq!(a.leaf_file_count, 2);
        assert_eq!(a.counts_for(&FindingKind::License).get("MIT"), Some(&2));
        assert_eq!(a.counts_for(&FindingKind::License).get("GPL-2.0"), Some(&1));

        // Root aggregates equal the key-wise sum of its children's
        let root = aggregates.stats(tree.root());
        assert_eq!(root.leaf_file_count, 3);
        assert_eq!(
            root.counts_for(&FindingKind::License).get("Apache-2.0"),
            Some(&1)
        );
    }

    #[test]
    fn test_sentinel_bucket_for_undetected_kind() {
        let records = vec![record("x.bin", FileType::File, &[])];
        let tree = FileTree::build(&path_records(&records)).unwrap();
        let aggregates = aggregate(&tree, &records, |_| false);

        let licenses = aggregates.summarize(&FindingKind::License, tree.root());
        assert_eq!(licenses.get(NO_VALUE_DETECTED), Some(&1));
        let emails = aggregates.summarize(&FindingKind::Email, tree.root());
        assert_eq!(emails.get(NO_VALUE_DETECTED), Some(&1));
    }

    #[test]
    fn test_duplicate_values_in_one_file_count_once() {
        let records = vec![record("dup.c", FileType::File, &["MIT", "MIT"])];
        let tree = FileTree::build(&path_records(&records)).unwrap();
        let aggregates = aggregate(&tree, &records, |_| false);

        let licenses = aggregates.summarize(&FindingKind::License, tree.root());
        assert_eq!(licenses.get("MIT"), Some(&1));
    }

    #[test]
    fn test_pruned_subtree_removed_from_ancestors() {
        let records = vec![
            record("keep/a.c", FileType::File, &["MIT"]),
            record("drop/b.c", FileType::File, &["GPL-2.0"]),
        ];
        let tree = FileTree::build(&path_records(&records)).unwrap();

        let drop_id = tree.find("drop").unwrap();
        let aggregates = aggregate(&tree, &records, |node| node.path == "drop");

        let root = aggregates.stats(tree.root());
        assert_eq!(root.leaf_file_count, 1);
        assert_eq!(root.counts_for(&FindingKind::License).get("GPL-2.0"), None);

        // The pruned node's own stats are still available
        let dropped = aggregates.stats(drop_id);
        assert_eq!(dropped.leaf_file_count, 1);
    }

    #[test]
    fn test_status_filter_empty_status_always_shown() {
        let filter = StatusFilter::new([ReviewStatus::Analyzed]);
        assert!(!filter.is_status_pruned(None));
        assert!(!filter.is_status_pruned(Some(ReviewStatus::Analyzed)));
        assert!(filter.is_status_pruned(Some(ReviewStatus::Attention)));
        assert!(!StatusFilter::show_all().is_status_pruned(Some(ReviewStatus::Nr)));
    }

    #[test]
    fn test_status_filter_resolves_through_overlay() {
        let records = vec![
            record("flagged/a.c", FileType::File, &["MIT"]),
            record("plain/b.c", FileType::File, &["MIT"]),
        ];
        let tree = FileTree::build(&path_records(&records)).unwrap();

        let mut component = Component::new("flagged".to_string());
        component.review_status = Some(ReviewStatus::Nr);
        let overlay = component_index(vec![component]);

        let filter = StatusFilter::new([ReviewStatus::Analyzed]);
        let aggregates = aggregate(&tree, &records, filter.pruning_predicate(&overlay));

        let root = aggregates.stats(tree.root());
        assert_eq!(root.leaf_file_count, 1);
    }
}
