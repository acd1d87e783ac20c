//! Myers shortest-edit-script over line sequences.
//!
//! The forward pass keeps, for every edit distance `d`, the furthest x reached
//! on each diagonal `k = x - y`, extending greedily through matching lines.
//! Each frontier is recorded so the backtrack can rebuild the ordered edit
//! list once both sequences are exhausted.

/// One step of an edit script. Indices are 0-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edit {
    Equal { old_index: usize, new_index: usize },
    Insert { new_index: usize },
    Delete { old_index: usize },
}

impl Edit {
    pub fn is_equal(&self) -> bool {
        matches!(self, Edit::Equal { .. })
    }
}

/// A line together with its CRC32 fingerprint. Equality compares the
/// fingerprint before the text.
#[derive(Debug, Clone, Copy)]
pub struct Line<'a> {
    pub text: &'a str,
    fingerprint: u32,
}

impl<'a> Line<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            text,
            fingerprint: crc32fast::hash(text.as_bytes()),
        }
    }
}

impl PartialEq for Line<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.fingerprint == other.fingerprint && self.text == other.text
    }
}

/// Split text on `\n`. Joining the result with `\n` reproduces the input
/// exactly, including a trailing newline and `\r` characters.
pub fn split_lines(text: &str) -> Vec<&str> {
    text.split('\n').collect()
}

/// Edit script between two line slices, with common prefix and suffix
/// stripped before the Myers pass.
pub fn diff_lines(old: &[&str], new: &[&str]) -> Vec<Edit> {
    let prefix = old
        .iter()
        .zip(new.iter())
        .take_while(|(a, b)| a == b)
        .count();
    let max_suffix = old.len().min(new.len()) - prefix;
    let suffix = old[prefix..]
        .iter()
        .rev()
        .zip(new[prefix..].iter().rev())
        .take(max_suffix)
        .take_while(|(a, b)| a == b)
        .count();

    let old_mid: Vec<Line<'_>> = old[prefix..old.len() - suffix]
        .iter()
        .map(|s| Line::new(s))
        .collect();
    let new_mid: Vec<Line<'_>> = new[prefix..new.len() - suffix]
        .iter()
        .map(|s| Line::new(s))
        .collect();

    let mut edits = Vec::with_capacity(old.len().max(new.len()));
    for i in 0..prefix {
        edits.push(Edit::Equal {
            old_index: i,
            new_index: i,
        });
    }
    for edit in shortest_edit_script(&old_mid, &new_mid) {
        edits.push(match edit {
            Edit::Equal {
                old_index,
                new_index,
            } => Edit::Equal {
                old_index: old_index + prefix,
                new_index: new_index + prefix,
            },
            Edit::Insert { new_index } => Edit::Insert {
                new_index: new_index + prefix,
            },
            Edit::Delete { old_index } => Edit::Delete {
                old_index: old_index + prefix,
            },
        });
    }
    let old_tail = old.len() - suffix;
    let new_tail = new.len() - suffix;
    for i in 0..suffix {
        edits.push(Edit::Equal {
            old_index: old_tail + i,
            new_index: new_tail + i,
        });
    }
    edits
}

/// Minimal edit script turning `old` into `new`.
pub fn shortest_edit_script<T: PartialEq>(old: &[T], new: &[T]) -> Vec<Edit> {
    let n = old.len() as isize;
    let m = new.len() as isize;
    let max = n + m;
    let offset = max + 1;
    let mut v: Vec<isize> = vec![0; (2 * max + 3) as usize];
    let mut trace: Vec<Vec<isize>> = Vec::new();

    'outer: for d in 0..=max {
        trace.push(v.clone());
        let mut k = -d;
        while k <= d {
            let idx = (k + offset) as usize;
            let mut x = if k == -d || (k != d && v[idx - 1] < v[idx + 1]) {
                v[idx + 1]
            } else {
                v[idx - 1] + 1
            };
            let mut y = x - k;
            while x < n && y < m && old[x as usize] == new[y as usize] {
                x += 1;
                y += 1;
            }
            v[idx] = x;
            if x >= n && y >= m {
                break 'outer;
            }
            k += 2;
        }
    }

    backtrack(&trace, n, m, offset)
}

fn backtrack(trace: &[Vec<isize>], n: isize, m: isize, offset: isize) -> Vec<Edit> {
    let mut edits = Vec::new();
    let mut x = n;
    let mut y = m;

    for (d, v) in trace.iter().enumerate().rev() {
        let d = d as isize;
        let k = x - y;
        let idx = (k + offset) as usize;
        let prev_k = if k == -d || (k != d && v[idx - 1] < v[idx + 1]) {
            k + 1
        } else {
            k - 1
        };
        let prev_x = v[(prev_k + offset) as usize];
        let prev_y = prev_x - prev_k;

        while x > prev_x && y > prev_y {
            edits.push(Edit::Equal {
                old_index: (x - 1) as usize,
                new_index: (y - 1) as usize,
            });
            x -= 1;
            y -= 1;
        }
        if d > 0 {
            if x == prev_x {
                edits.push(Edit::Insert {
                    new_index: (y - 1) as usize,
                });
            } else {
                edits.push(Edit::Delete {
                    old_index: (x - 1) as usize,
                });
            }
        }
        x = prev_x;
        y = prev_y;
    }

    edits.reverse();
    edits
}
