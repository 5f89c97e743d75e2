//! Character-level diff and patch for notebook bodies
//!
//! Patches are persisted to the content store and compared across sessions,
//! so `compute_diff` must be byte-for-byte stable on identical inputs. All
//! lengths and counts are in Unicode scalar values, not bytes.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error types for patch application
#[derive(Error, Debug)]
pub enum DiffError {
    #[error("Malformed patch: {0}")]
    MalformedPatch(String),
}

/// A single edit operation against the base text
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Op {
    /// Copy `count` characters from the base text unchanged
    Equal { count: usize },

    /// Insert `text` at the current position
    Insert { text: String },

    /// Skip `count` characters of the base text
    Delete { count: usize },
}

/// An ordered edit script transforming a base text into a target text
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PatchSet {
    pub base_len: usize,
    pub target_len: usize,
    pub ops: Vec<Op>,
}

impl PatchSet {
    /// True when the patch neither inserts nor deletes anything
    pub fn is_identity(&self) -> bool {
        self.ops
            .iter()
            .all(|op| matches!(op, Op::Equal { .. }))
    }
}

// DP area above which the middle section is emitted as a whole-region
// replace instead of an LCS-minimal script. Round-trip correctness is
// unaffected, only minimality of very large edits.
const MAX_LCS_AREA: usize = 16 * 1024 * 1024;

/// Compute the canonical edit script turning `old` into `new`.
///
/// Deterministic and pure: the common prefix and suffix are stripped first,
/// then the remaining middle is solved by LCS dynamic programming. Ties are
/// broken by preferring `Equal` runs as long as possible, and every changed
/// region emits its `Delete` before its `Insert`.
pub fn compute_diff(old: &str, new: &str) -> PatchSet {
    let old_chars: Vec<char> = old.chars().collect();
    let new_chars: Vec<char> = new.chars().collect();
    let base_len = old_chars.len();
    let target_len = new_chars.len();

    let prefix = common_prefix(&old_chars, &new_chars);
    let suffix = common_suffix(&old_chars[prefix..], &new_chars[prefix..]);

    let old_mid = &old_chars[prefix..base_len - suffix];
    let new_mid = &new_chars[prefix..target_len - suffix];

    let mut ops = Vec::new();
    if prefix > 0 {
        ops.push(Op::Equal { count: prefix });
    }
    if !old_mid.is_empty() || !new_mid.is_empty() {
        diff_middle(old_mid, new_mid, &mut ops);
    }
    if suffix > 0 {
        ops.push(Op::Equal { count: suffix });
    }

    PatchSet {
        base_len,
        target_len,
        ops: normalize(ops),
    }
}

/// Replay `patch` against `old`, reconstructing the target text.
///
/// Fails with [`DiffError::MalformedPatch`] when the declared base length
/// does not match `old`, or when the ops consume or produce lengths
/// inconsistent with the declaration.
pub fn apply_diff(old: &str, patch: &PatchSet) -> Result<String, DiffError> {
    let old_chars: Vec<char> = old.chars().collect();
    if old_chars.len() != patch.base_len {
        return Err(DiffError::MalformedPatch(format!(
            "base length mismatch: patch declares {}, text has {}",
            patch.base_len,
            old_chars.len()
        )));
    }

    let mut out = String::new();
    let mut produced = 0usize;
    let mut pos = 0usize;

    for op in &patch.ops {
        match op {
            Op::Equal { count } => {
                let end = pos.checked_add(*count).filter(|e| *e <= old_chars.len());
                let end = end.ok_or_else(|| {
                    DiffError::MalformedPatch(format!(
                        "equal run of {} overruns base text at position {}",
                        count, pos
                    ))
                })?;
                out.extend(&old_chars[pos..end]);
                produced += count;
                pos = end;
            }
            Op::Insert { text } => {
                produced += text.chars().count();
                out.push_str(text);
            }
            Op::Delete { count } => {
                let end = pos.checked_add(*count).filter(|e| *e <= old_chars.len());
                pos = end.ok_or_else(|| {
                    DiffError::MalformedPatch(format!(
                        "delete run of {} overruns base text at position {}",
                        count, pos
                    ))
                })?;
            }
        }
    }

    if pos != patch.base_len {
        return Err(DiffError::MalformedPatch(format!(
            "ops consume {} of {} base characters",
            pos, patch.base_len
        )));
    }
    if produced != patch.target_len {
        return Err(DiffError::MalformedPatch(format!(
            "ops produce {} characters, patch declares {}",
            produced, patch.target_len
        )));
    }

    Ok(out)
}

fn common_prefix(a: &[char], b: &[char]) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}

fn common_suffix(a: &[char], b: &[char]) -> usize {
    a.iter()
        .rev()
        .zip(b.iter().rev())
        .take_while(|(x, y)| x == y)
        .count()
}

/// LCS-based minimal script for the trimmed middle section.
fn diff_middle(old: &[char], new: &[char], ops: &mut Vec<Op>) {
    if old.is_empty() {
        ops.push(Op::Insert {
            text: new.iter().collect(),
        });
        return;
    }
    if new.is_empty() {
        ops.push(Op::Delete { count: old.len() });
        return;
    }
    if old.len().saturating_mul(new.len()) > MAX_LCS_AREA {
        ops.push(Op::Delete { count: old.len() });
        ops.push(Op::Insert {
            text: new.iter().collect(),
        });
        return;
    }

    // table[i][j] = LCS length of old[i..] and new[j..]
    let n = old.len();
    let m = new.len();
    let mut table = vec![vec![0u32; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            table[i][j] = if old[i] == new[j] {
                table[i + 1][j + 1] + 1
            } else {
                table[i + 1][j].max(table[i][j + 1])
            };
        }
    }

    // Forward walk. Taking an equal character whenever one matches is always
    // on an optimal path and yields the longest-Equal-run canonical form;
    // deletes are preferred over inserts on ties so normalization can fold
    // each changed region into one Delete then one Insert.
    let (mut i, mut j) = (0usize, 0usize);
    while i < n || j < m {
        if i < n && j < m && old[i] == new[j] {
            let start = i;
            while i < n && j < m && old[i] == new[j] {
                i += 1;
                j += 1;
            }
            ops.push(Op::Equal { count: i - start });
        } else if i < n && (j == m || table[i + 1][j] >= table[i][j + 1]) {
            ops.push(Op::Delete { count: 1 });
            i += 1;
        } else {
            ops.push(Op::Insert {
                text: new[j].to_string(),
            });
            j += 1;
        }
    }
}

/// Canonicalize an op sequence: drop empty ops, merge adjacent runs of the
/// same kind, and order each changed region as Delete then Insert.
fn normalize(ops: Vec<Op>) -> Vec<Op> {
    let mut out: Vec<Op> = Vec::with_capacity(ops.len());
    let mut pending_delete = 0usize;
    let mut pending_insert = String::new();

    let flush = |out: &mut Vec<Op>, del: &mut usize, ins: &mut String| {
        if *del > 0 {
            out.push(Op::Delete { count: *del });
            *del = 0;
        }
        if !ins.is_empty() {
            out.push(Op::Insert {
                text: std::mem::take(ins),
            });
        }
    };

    for op in ops {
        match op {
            Op::Equal { count: 0 } | Op::Delete { count: 0 } => {}
            Op::Insert { ref text } if text.is_empty() => {}
            Op::Equal { count } => {
                flush(&mut out, &mut pending_delete, &mut pending_insert);
                if let Some(Op::Equal { count: last }) = out.last_mut() {
                    *last += count;
                } else {
                    out.push(Op::Equal { count });
                }
            }
            Op::Delete { count } => pending_delete += count,
            Op::Insert { text } => pending_insert.push_str(&text),
        }
    }
    flush(&mut out, &mut pending_delete, &mut pending_insert);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(a: &str, b: &str) {
        let patch = compute_diff(a, b);
        assert_eq!(apply_diff(a, &patch).unwrap(), b, "{:?} -> {:?}", a, b);
    }

    #[test]
    fn test_round_trip_basic() {
        round_trip("hello", "hello world");
        round_trip("hello world", "hello");
        round_trip("the quick brown fox", "the slow brown cat");
    }

    #[test]
    fn test_round_trip_empty() {
        round_trip("", "");
        round_trip("", "abc");
        round_trip("abc", "");
    }

    #[test]
    fn test_round_trip_disjoint() {
        round_trip("aaaa", "bbbb");
        round_trip("12345", "vwxyz");
    }

    #[test]
    fn test_round_trip_multibyte() {
        round_trip("héllo wörld", "héllo würld!");
        round_trip("日本語のテキスト", "日本語の長いテキスト");
    }

    #[test]
    fn test_identical_inputs() {
        let patch = compute_diff("same", "same");
        assert_eq!(patch.ops, vec![Op::Equal { count: 4 }]);
        assert!(patch.is_identity());
    }

    #[test]
    fn test_empty_to_empty_has_no_ops() {
        let patch = compute_diff("", "");
        assert!(patch.ops.is_empty());
    }

    #[test]
    fn test_abc_abd_shape() {
        let patch = compute_diff("abc", "abd");
        assert_eq!(
            patch.ops,
            vec![
                Op::Equal { count: 2 },
                Op::Delete { count: 1 },
                Op::Insert { text: "d".to_string() },
            ]
        );
        assert_eq!(apply_diff("abc", &patch).unwrap(), "abd");
    }

    #[test]
    fn test_deterministic_output() {
        let a = "line one\nline two\nline three\n";
        let b = "line one\nline 2\nline three\nline four\n";
        let first = compute_diff(a, b);
        let second = compute_diff(a, b);
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn test_lengths_count_chars_not_bytes() {
        let patch = compute_diff("é", "éé");
        assert_eq!(patch.base_len, 1);
        assert_eq!(patch.target_len, 2);
    }

    #[test]
    fn test_apply_rejects_base_length_mismatch() {
        let patch = compute_diff("abc", "abd");
        let err = apply_diff("abcd", &patch).unwrap_err();
        assert!(matches!(err, DiffError::MalformedPatch(_)));
    }

    #[test]
    fn test_apply_rejects_inconsistent_ops() {
        // Declares a base of 3 but only consumes 2.
        let patch = PatchSet {
            base_len: 3,
            target_len: 2,
            ops: vec![Op::Equal { count: 2 }],
        };
        assert!(matches!(
            apply_diff("abc", &patch),
            Err(DiffError::MalformedPatch(_))
        ));

        // Produces more than it declares.
        let patch = PatchSet {
            base_len: 0,
            target_len: 1,
            ops: vec![Op::Insert { text: "xy".to_string() }],
        };
        assert!(matches!(
            apply_diff("", &patch),
            Err(DiffError::MalformedPatch(_))
        ));
    }

    #[test]
    fn test_patch_serde_shape() {
        let patch = compute_diff("abc", "abd");
        let json = serde_json::to_string(&patch).unwrap();
        assert!(json.contains("\"op\":\"equal\""));
        assert!(json.contains("\"op\":\"delete\""));
        assert!(json.contains("\"op\":\"insert\""));
        let back: PatchSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, patch);
    }
}
