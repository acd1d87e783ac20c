pub mod hunks;
pub mod merge;
pub mod myers;

pub use hunks::{apply_hunks, diff_optional, diff_texts, render_unified, TextDiff};
pub use merge::{merge_optional, three_way_merge, MergeResult};
