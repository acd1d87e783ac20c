//! Hunk construction, tallies, hunk application, and unified rendering.

use serde::{Deserialize, Serialize};

use crate::diff::myers::{diff_lines, split_lines, Edit};
use crate::errors::{SyncError, SyncResult};
use crate::models::{DiffHunk, DiffLine, DiffLineType};

/// Unchanged lines kept around a change; a hunk closes once this many
/// consecutive unchanged lines have accumulated.
pub const CONTEXT_LINES: usize = 3;

/// Line-level diff between two texts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextDiff {
    pub hunks: Vec<DiffHunk>,
    pub additions: usize,
    pub deletions: usize,
    pub unchanged: usize,
}

impl TextDiff {
    pub fn is_identical(&self) -> bool {
        self.additions == 0 && self.deletions == 0
    }

    fn from_hunks(hunks: Vec<DiffHunk>) -> Self {
        let mut diff = TextDiff {
            hunks,
            ..Default::default()
        };
        for line in diff.hunks.iter().flat_map(|h| h.lines.iter()) {
            match line.line_type {
                DiffLineType::Added => diff.additions += 1,
                DiffLineType::Removed => diff.deletions += 1,
                DiffLineType::Unchanged => diff.unchanged += 1,
            }
        }
        diff
    }
}

/// Diff two texts line by line.
pub fn diff_texts(old: &str, new: &str) -> TextDiff {
    let old_lines = split_lines(old);
    let new_lines = split_lines(new);
    let edits = diff_lines(&old_lines, &new_lines);
    TextDiff::from_hunks(build_hunks(&old_lines, &new_lines, &edits, CONTEXT_LINES))
}

/// Like [`diff_texts`], but absent content on either side is fatal.
pub fn diff_optional(old: Option<&str>, new: Option<&str>) -> SyncResult<TextDiff> {
    let old = old.ok_or_else(|| SyncError::MissingContent("old text".to_string()))?;
    let new = new.ok_or_else(|| SyncError::MissingContent("new text".to_string()))?;
    Ok(diff_texts(old, new))
}

struct HunkBuilder {
    old_start: usize,
    new_start: usize,
    lines: Vec<DiffLine>,
}

impl HunkBuilder {
    fn new(old_pos: usize, new_pos: usize) -> Self {
        Self {
            old_start: old_pos + 1,
            new_start: new_pos + 1,
            lines: Vec::new(),
        }
    }

    fn finish(self) -> DiffHunk {
        let old_lines = self
            .lines
            .iter()
            .filter(|l| l.line_type != DiffLineType::Added)
            .count();
        let new_lines = self
            .lines
            .iter()
            .filter(|l| l.line_type != DiffLineType::Removed)
            .count();
        DiffHunk {
            old_start: self.old_start,
            old_lines,
            new_start: self.new_start,
            new_lines,
            lines: self.lines,
        }
    }
}

fn diff_line(edit: &Edit, old: &[&str], new: &[&str]) -> DiffLine {
    match *edit {
        Edit::Equal {
            old_index,
            new_index,
        } => DiffLine {
            line_type: DiffLineType::Unchanged,
            content: old[old_index].to_string(),
            old_line: Some(old_index + 1),
            new_line: Some(new_index + 1),
        },
        Edit::Delete { old_index } => DiffLine {
            line_type: DiffLineType::Removed,
            content: old[old_index].to_string(),
            old_line: Some(old_index + 1),
            new_line: None,
        },
        Edit::Insert { new_index } => DiffLine {
            line_type: DiffLineType::Added,
            content: new[new_index].to_string(),
            old_line: None,
            new_line: Some(new_index + 1),
        },
    }
}

/// Group an edit script into hunks.
///
/// A hunk opens on the first non-equal edit, carrying up to `context`
/// preceding unchanged lines (never reaching back into the previous hunk),
/// and closes once `context` consecutive unchanged lines have accumulated.
pub fn build_hunks(old: &[&str], new: &[&str], edits: &[Edit], context: usize) -> Vec<DiffHunk> {
    // Cursor position (old, new) before each edit.
    let mut positions = Vec::with_capacity(edits.len());
    let (mut old_pos, mut new_pos) = (0usize, 0usize);
    for edit in edits {
        positions.push((old_pos, new_pos));
        match edit {
            Edit::Equal { .. } => {
                old_pos += 1;
                new_pos += 1;
            }
            Edit::Delete { .. } => old_pos += 1,
            Edit::Insert { .. } => new_pos += 1,
        }
    }

    let mut hunks = Vec::new();
    let mut current: Option<HunkBuilder> = None;
    let mut trailing_unchanged = 0usize;
    let mut last_hunk_end = 0usize;

    for (i, edit) in edits.iter().enumerate() {
        if edit.is_equal() {
            if let Some(builder) = current.as_mut() {
                builder.lines.push(diff_line(edit, old, new));
                trailing_unchanged += 1;
                if trailing_unchanged >= context {
                    if let Some(done) = current.take() {
                        hunks.push(done.finish());
                    }
                    last_hunk_end = i + 1;
                    trailing_unchanged = 0;
                }
            }
            continue;
        }

        if current.is_none() {
            let start = i.saturating_sub(context).max(last_hunk_end);
            let (old_at, new_at) = positions[start];
            let mut builder = HunkBuilder::new(old_at, new_at);
            for leading in &edits[start..i] {
                builder.lines.push(diff_line(leading, old, new));
            }
            current = Some(builder);
        }
        trailing_unchanged = 0;
        if let Some(builder) = current.as_mut() {
            builder.lines.push(diff_line(edit, old, new));
        }
    }

    if let Some(builder) = current {
        hunks.push(builder.finish());
    }
    hunks
}

/// Re-apply a diff's hunks to `old`, verifying every context and removed line.
pub fn apply_hunks(old: &str, diff: &TextDiff) -> SyncResult<String> {
    let old_lines = split_lines(old);
    let mut out: Vec<&str> = Vec::with_capacity(old_lines.len());
    let mut cursor = 0usize;

    for hunk in &diff.hunks {
        let start = hunk.old_start.saturating_sub(1);
        if start < cursor || start > old_lines.len() {
            return Err(SyncError::Diff(format!(
                "hunk at old line {} is out of order or out of range",
                hunk.old_start
            )));
        }
        out.extend_from_slice(&old_lines[cursor..start]);
        cursor = start;

        for line in &hunk.lines {
            match line.line_type {
                DiffLineType::Added => out.push(line.content.as_str()),
                DiffLineType::Unchanged | DiffLineType::Removed => {
                    match old_lines.get(cursor) {
                        Some(existing) if *existing == line.content => {}
                        _ => {
                            return Err(SyncError::Diff(format!(
                                "context mismatch at old line {}",
                                cursor + 1
                            )))
                        }
                    }
                    if line.line_type == DiffLineType::Unchanged {
                        out.push(old_lines[cursor]);
                    }
                    cursor += 1;
                }
            }
        }
    }

    out.extend_from_slice(&old_lines[cursor.min(old_lines.len())..]);
    Ok(out.join("\n"))
}

/// Render a diff in unified format.
pub fn render_unified(diff: &TextDiff, old_label: &str, new_label: &str) -> String {
    let mut out = format!("--- {old_label}\n+++ {new_label}\n");
    for hunk in &diff.hunks {
        // Unified format reports the line before an empty range.
        let old_start = if hunk.old_lines == 0 {
            hunk.old_start - 1
        } else {
            hunk.old_start
        };
        let new_start = if hunk.new_lines == 0 {
            hunk.new_start - 1
        } else {
            hunk.new_start
        };
        out.push_str(&format!(
            "@@ -{old_start},{} +{new_start},{} @@\n",
            hunk.old_lines, hunk.new_lines
        ));
        for line in &hunk.lines {
            let prefix = match line.line_type {
                DiffLineType::Added => '+',
                DiffLineType::Removed => '-',
                DiffLineType::Unchanged => ' ',
            };
            out.push(prefix);
            out.push_str(&line.content);
            out.push('\n');
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAIRS: &[(&str, &str)] = &[
        ("", ""),
        ("", "new file\n"),
        ("gone\n", ""),
        ("a\nb\nc\n", "a\nb\nc\n"),
        ("a\nb\nc\n", "a\nB\nc\n"),
        ("1\n2\n3\n4\n5\n6\n7\n8\n9\n10\n", "1\n2\nthree\n4\n5\n6\n7\n8\nnine\n10\n"),
        ("1\n2\n3\n4\n5\n6\n7\n", "0\n1\n2\n3\n4\n5\n6\n7\n8\n"),
        ("x\ny\nz", "x\ny\nz\n"),
        ("line\r\nother\r\n", "line\r\nchanged\r\n"),
        ("a\nb\nc\nd\ne\nf\ng\nh", "h\ng\nf\ne\nd\nc\nb\na"),
        ("keep\nkeep\nkeep\ndrop\nkeep\nkeep\nkeep\nkeep\ndrop\n", "keep\nkeep\nkeep\nkeep\nkeep\nkeep\nkeep\n"),
    ];

    #[test]
    fn round_trip_reproduces_new_text() {
        for (old, new) in PAIRS {
            let diff = diff_texts(old, new);
            let rebuilt = apply_hunks(old, &diff).unwrap();
            assert_eq!(&rebuilt, new, "round trip failed for {old:?} -> {new:?}");
        }
    }

    #[test]
    fn identical_text_has_no_changes() {
        for (old, _) in PAIRS {
            let diff = diff_texts(old, old);
            assert_eq!(diff.additions, 0);
            assert_eq!(diff.deletions, 0);
            assert!(diff.hunks.is_empty());
            assert!(diff.is_identical());
        }
    }

    #[test]
    fn tallies_match_line_tags() {
        for (old, new) in PAIRS {
            let diff = diff_texts(old, new);
            let tagged = |t: DiffLineType| {
                diff.hunks
                    .iter()
                    .flat_map(|h| h.lines.iter())
                    .filter(|l| l.line_type == t)
                    .count()
            };
            assert_eq!(diff.additions, tagged(DiffLineType::Added));
            assert_eq!(diff.deletions, tagged(DiffLineType::Removed));
            assert_eq!(diff.unchanged, tagged(DiffLineType::Unchanged));
        }
    }

    #[test]
    fn single_substitution_hunk_shape() {
        let diff = diff_texts("a\nb\nc\nd\ne\nf\ng\n", "a\nb\nc\nD\ne\nf\ng\n");
        assert_eq!(diff.hunks.len(), 1);
        let hunk = &diff.hunks[0];
        assert_eq!(hunk.old_start, 1);
        assert_eq!(hunk.new_start, 1);
        assert_eq!(hunk.old_lines, 7);
        assert_eq!(hunk.new_lines, 7);
        assert_eq!(diff.additions, 1);
        assert_eq!(diff.deletions, 1);
        assert_eq!(diff.unchanged, 6);
    }

    #[test]
    fn distant_changes_split_into_hunks() {
        let old: String = (1..=20).map(|i| format!("{i}\n")).collect();
        let new: String = (1..=20)
            .map(|i| match i {
                2 => "two\n".to_string(),
                18 => "eighteen\n".to_string(),
                _ => format!("{i}\n"),
            })
            .collect();
        let diff = diff_texts(&old, &new);
        assert_eq!(diff.hunks.len(), 2);
        assert_eq!(apply_hunks(&old, &diff).unwrap(), new);
    }

    #[test]
    fn apply_rejects_mismatched_base() {
        let diff = diff_texts("a\nb\nc\n", "a\nX\nc\n");
        assert!(matches!(
            apply_hunks("q\nr\ns\n", &diff),
            Err(SyncError::Diff(_))
        ));
    }

    #[test]
    fn missing_content_is_fatal() {
        assert!(matches!(
            diff_optional(None, Some("x")),
            Err(SyncError::MissingContent(_))
        ));
        assert!(diff_optional(Some("x"), Some("x")).unwrap().is_identical());
    }

    #[test]
    fn unified_rendering() {
        let diff = diff_texts("a\nb\n", "a\nc\n");
        let text = render_unified(&diff, "a/page.md", "b/page.md");
        assert!(text.starts_with("--- a/page.md\n+++ b/page.md\n@@ -1,"));
        assert!(text.contains("-b\n"));
        assert!(text.contains("+c\n"));
        assert!(text.contains(" a\n"));
    }
}
