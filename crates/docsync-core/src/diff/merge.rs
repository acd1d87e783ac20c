//! Three-way merge of two revisions against their common base.
//!
//! Each side is diffed against the base independently and reduced to change
//! regions (a base range plus its replacement lines). Regions from both sides
//! are then walked in base order: a cluster touched by one side is taken from
//! that side, a cluster touched by both sides with the same result is taken
//! once, and anything else becomes a [`MergeConflict`] rendered with markers.

use serde::{Deserialize, Serialize};

use crate::diff::myers::{diff_lines, split_lines, Edit};
use crate::errors::{SyncError, SyncResult};
use crate::models::MergeConflict;

pub const OURS_MARKER: &str = "<<<<<<< OURS";
pub const SEPARATOR_MARKER: &str = "=======";
pub const THEIRS_MARKER: &str = ">>>>>>> THEIRS";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeResult {
    pub merged: String,
    pub conflicts: Vec<MergeConflict>,
    /// `true` exactly when `conflicts` is empty.
    pub resolved: bool,
}

/// Base range `[start, end)` replaced by `lines` on one side.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Region<'a> {
    start: usize,
    end: usize,
    lines: Vec<&'a str>,
}

impl Region<'_> {
    /// Overlap test against a cluster range. Regions starting at the same base
    /// position always overlap, so two insertions at one point conflict.
    fn overlaps(&self, start: usize, end: usize) -> bool {
        (self.start < end && start < self.end) || self.start == start
    }
}

fn change_regions<'a>(base: &[&'a str], side: &[&'a str]) -> Vec<Region<'a>> {
    let edits = diff_lines(base, side);
    let mut regions = Vec::new();
    let mut current: Option<Region<'a>> = None;
    let mut base_pos = 0usize;

    for edit in edits {
        match edit {
            Edit::Equal { old_index, .. } => {
                if let Some(region) = current.take() {
                    regions.push(region);
                }
                base_pos = old_index + 1;
            }
            Edit::Delete { old_index } => {
                let region = current.get_or_insert_with(|| Region {
                    start: old_index,
                    end: old_index,
                    lines: Vec::new(),
                });
                region.end = old_index + 1;
                base_pos = old_index + 1;
            }
            Edit::Insert { new_index } => {
                let region = current.get_or_insert_with(|| Region {
                    start: base_pos,
                    end: base_pos,
                    lines: Vec::new(),
                });
                region.lines.push(side[new_index]);
            }
        }
    }
    if let Some(region) = current {
        regions.push(region);
    }
    regions
}

/// One side's version of `base[start..end)` with its regions applied.
fn side_content<'a>(
    base: &[&'a str],
    start: usize,
    end: usize,
    regions: &[&Region<'a>],
) -> Vec<&'a str> {
    let mut out = Vec::new();
    let mut pos = start;
    for region in regions {
        out.extend_from_slice(&base[pos..region.start]);
        out.extend_from_slice(&region.lines);
        pos = region.end;
    }
    out.extend_from_slice(&base[pos..end]);
    out
}

/// Merge `ours` and `theirs`, both derived from `base`.
pub fn three_way_merge(base: &str, ours: &str, theirs: &str) -> MergeResult {
    let base_lines = split_lines(base);
    let ours_lines = split_lines(ours);
    let theirs_lines = split_lines(theirs);

    let ours_regions = change_regions(&base_lines, &ours_lines);
    let theirs_regions = change_regions(&base_lines, &theirs_lines);

    let mut out: Vec<&str> = Vec::with_capacity(base_lines.len());
    let mut conflicts = Vec::new();
    let (mut i, mut j) = (0usize, 0usize);
    let mut base_pos = 0usize;

    loop {
        let take_ours = match (ours_regions.get(i), theirs_regions.get(j)) {
            (None, None) => break,
            (Some(_), None) => true,
            (None, Some(_)) => false,
            (Some(a), Some(b)) => a.start <= b.start,
        };

        let mut ours_members: Vec<&Region<'_>> = Vec::new();
        let mut theirs_members: Vec<&Region<'_>> = Vec::new();
        let (mut cluster_start, mut cluster_end) = if take_ours {
            let first = &ours_regions[i];
            i += 1;
            ours_members.push(first);
            (first.start, first.end)
        } else {
            let first = &theirs_regions[j];
            j += 1;
            theirs_members.push(first);
            (first.start, first.end)
        };

        loop {
            let mut grew = false;
            while let Some(region) = ours_regions.get(i) {
                if !region.overlaps(cluster_start, cluster_end) {
                    break;
                }
                cluster_start = cluster_start.min(region.start);
                cluster_end = cluster_end.max(region.end);
                ours_members.push(region);
                i += 1;
                grew = true;
            }
            while let Some(region) = theirs_regions.get(j) {
                if !region.overlaps(cluster_start, cluster_end) {
                    break;
                }
                cluster_start = cluster_start.min(region.start);
                cluster_end = cluster_end.max(region.end);
                theirs_members.push(region);
                j += 1;
                grew = true;
            }
            if !grew {
                break;
            }
        }

        out.extend_from_slice(&base_lines[base_pos..cluster_start]);
        let ours_content = side_content(&base_lines, cluster_start, cluster_end, &ours_members);
        let theirs_content =
            side_content(&base_lines, cluster_start, cluster_end, &theirs_members);

        if theirs_members.is_empty() {
            out.extend_from_slice(&ours_content);
        } else if ours_members.is_empty() || ours_content == theirs_content {
            out.extend_from_slice(&theirs_content);
        } else {
            let start_line = out.len() + 1;
            out.push(OURS_MARKER);
            out.extend_from_slice(&ours_content);
            out.push(SEPARATOR_MARKER);
            out.extend_from_slice(&theirs_content);
            out.push(THEIRS_MARKER);
            conflicts.push(MergeConflict {
                start_line,
                end_line: out.len(),
                ours: ours_content.join("\n"),
                theirs: theirs_content.join("\n"),
                base: Some(base_lines[cluster_start..cluster_end].join("\n")),
                base_start: cluster_start,
                base_end: cluster_end,
            });
        }
        base_pos = cluster_end;
    }

    out.extend_from_slice(&base_lines[base_pos..]);
    let resolved = conflicts.is_empty();
    MergeResult {
        merged: out.join("\n"),
        conflicts,
        resolved,
    }
}

/// Merge with optional inputs. Missing `ours`/`theirs` is fatal; a missing
/// base is treated as empty, so any disagreement becomes a conflict.
pub fn merge_optional(
    base: Option<&str>,
    ours: Option<&str>,
    theirs: Option<&str>,
) -> SyncResult<MergeResult> {
    let ours = ours.ok_or_else(|| SyncError::MissingContent("ours".to_string()))?;
    let theirs = theirs.ok_or_else(|| SyncError::MissingContent("theirs".to_string()))?;
    Ok(three_way_merge(base.unwrap_or(""), ours, theirs))
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "title\nintro\nbody one\nbody two\nbody three\nfooter\n";

    #[test]
    fn disjoint_edits_merge_cleanly() {
        let ours = "title\nINTRO\nbody one\nbody two\nbody three\nfooter\n";
        let theirs = "title\nintro\nbody one\nbody two\nbody three\nFOOTER\n";
        let result = three_way_merge(BASE, ours, theirs);
        assert!(result.resolved);
        assert!(result.conflicts.is_empty());
        assert_eq!(
            result.merged,
            "title\nINTRO\nbody one\nbody two\nbody three\nFOOTER\n"
        );
    }

    #[test]
    fn same_range_different_content_conflicts_once() {
        let ours = "title\nintro\nbody one\nOURS TWO\nbody three\nfooter\n";
        let theirs = "title\nintro\nbody one\nTHEIRS TWO\nbody three\nfooter\n";
        let result = three_way_merge(BASE, ours, theirs);
        assert!(!result.resolved);
        assert_eq!(result.conflicts.len(), 1);
        let conflict = &result.conflicts[0];
        assert_eq!(conflict.ours, "OURS TWO");
        assert_eq!(conflict.theirs, "THEIRS TWO");
        assert_eq!(conflict.base.as_deref(), Some("body two"));
        assert_eq!((conflict.base_start, conflict.base_end), (3, 4));
        assert!(result.merged.contains(
            "<<<<<<< OURS\nOURS TWO\n=======\nTHEIRS TWO\n>>>>>>> THEIRS"
        ));
        let lines: Vec<&str> = result.merged.split('\n').collect();
        assert_eq!(lines[conflict.start_line - 1], OURS_MARKER);
        assert_eq!(lines[conflict.end_line - 1], THEIRS_MARKER);
    }

    #[test]
    fn identical_edits_are_taken_once() {
        let edited = "title\nintro\nbody one\nshared\nbody three\nfooter\n";
        let result = three_way_merge(BASE, edited, edited);
        assert!(result.resolved);
        assert_eq!(result.merged, edited);
    }

    #[test]
    fn one_sided_edit_wins() {
        let theirs = "title\nintro\nbody one\nbody two\nnew line\nbody three\nfooter\n";
        let result = three_way_merge(BASE, BASE, theirs);
        assert!(result.resolved);
        assert_eq!(result.merged, theirs);
    }

    #[test]
    fn insertions_at_same_point_conflict() {
        let ours = "title\nintro\nours extra\nbody one\nbody two\nbody three\nfooter\n";
        let theirs = "title\nintro\ntheirs extra\nbody one\nbody two\nbody three\nfooter\n";
        let result = three_way_merge(BASE, ours, theirs);
        assert_eq!(result.conflicts.len(), 1);
        assert_eq!(result.conflicts[0].base.as_deref(), Some(""));
    }

    #[test]
    fn deletion_versus_edit_conflicts() {
        let ours = "title\nintro\nbody one\nbody three\nfooter\n";
        let theirs = "title\nintro\nbody one\nbody 2\nbody three\nfooter\n";
        let result = three_way_merge(BASE, ours, theirs);
        assert_eq!(result.conflicts.len(), 1);
        assert_eq!(result.conflicts[0].ours, "");
        assert_eq!(result.conflicts[0].theirs, "body 2");
    }

    #[test]
    fn missing_base_with_identical_sides_is_clean() {
        let result = merge_optional(None, Some("same\n"), Some("same\n")).unwrap();
        assert!(result.resolved);
        assert_eq!(result.merged, "same\n");
    }

    #[test]
    fn missing_side_is_fatal() {
        assert!(matches!(
            merge_optional(Some("a"), None, Some("b")),
            Err(SyncError::MissingContent(_))
        ));
    }
}
