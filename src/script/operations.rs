use serde::{Deserialize, Serialize};

use crate::error::ApplyError;

/// One line-level edit. Positions are 0-based line offsets in the target
/// (post-edit) numbering, valid once every earlier operation in the same
/// script has been applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ChangeOp {
    Insert { at: usize, lines: Vec<String> },
    Delete { at: usize, count: usize },
    Replace {
        at: usize,
        delete: usize,
        lines: Vec<String>,
    },
}

impl ChangeOp {
    pub fn at(&self) -> usize {
        match self {
            ChangeOp::Insert { at, .. }
            | ChangeOp::Delete { at, .. }
            | ChangeOp::Replace { at, .. } => *at,
        }
    }

    /// Lines consumed from the buffer.
    pub fn deleted(&self) -> usize {
        match self {
            ChangeOp::Insert { .. } => 0,
            ChangeOp::Delete { count, .. } => *count,
            ChangeOp::Replace { delete, .. } => *delete,
        }
    }

    /// Lines written into the buffer.
    pub fn inserted(&self) -> &[String] {
        match self {
            ChangeOp::Insert { lines, .. } | ChangeOp::Replace { lines, .. } => lines,
            ChangeOp::Delete { .. } => &[],
        }
    }
}

/// Ordered list of [`ChangeOp`]s turning one snapshot into another.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeScript {
    ops: Vec<ChangeOp>,
}

impl ChangeScript {
    pub fn new(ops: Vec<ChangeOp>) -> Self {
        Self { ops }
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ChangeOp> {
        self.ops.iter()
    }

    pub fn ops(&self) -> &[ChangeOp] {
        &self.ops
    }

    pub fn inserted_lines(&self) -> usize {
        self.ops.iter().map(|op| op.inserted().len()).sum()
    }

    pub fn deleted_lines(&self) -> usize {
        self.ops.iter().map(ChangeOp::deleted).sum()
    }

    /// Apply the script to a line vector in place.
    ///
    /// Bounds are checked for every operation before anything is touched, so
    /// on error `lines` is unchanged.
    pub fn apply_to_lines(&self, lines: &mut Vec<String>) -> Result<(), ApplyError> {
        let mut len = lines.len();
        for (index, op) in self.ops.iter().enumerate() {
            let start = op.at();
            let end = start + op.deleted();
            if end > len {
                return Err(ApplyError::OutOfRange {
                    index,
                    start,
                    end,
                    len,
                });
            }
            len = len - op.deleted() + op.inserted().len();
        }

        for op in &self.ops {
            let start = op.at();
            lines.splice(start..start + op.deleted(), op.inserted().iter().cloned());
        }
        Ok(())
    }

    /// Apply the script to `text`, returning the edited text.
    pub fn apply_to_text(&self, text: &str) -> Result<String, ApplyError> {
        if self.is_empty() {
            return Ok(text.to_string());
        }
        let mut lines = split_lines(text)
            .into_iter()
            .map(str::to_string)
            .collect::<Vec<_>>();
        self.apply_to_lines(&mut lines)?;
        Ok(lines.join("\n"))
    }
}

impl<'a> IntoIterator for &'a ChangeScript {
    type Item = &'a ChangeOp;
    type IntoIter = std::slice::Iter<'a, ChangeOp>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.iter()
    }
}

impl FromIterator<ChangeOp> for ChangeScript {
    fn from_iter<I: IntoIterator<Item = ChangeOp>>(iter: I) -> Self {
        Self {
            ops: iter.into_iter().collect(),
        }
    }
}

/// Split on `'\n'` only. A trailing newline yields a final empty line, so
/// `split_lines(t).join("\n") == t` for every `t`.
pub fn split_lines(text: &str) -> Vec<&str> {
    text.split('\n').collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_split_lines_keeps_trailing_line() {
        assert_eq!(split_lines("a\nb\n"), vec!["a", "b", ""]);
        assert_eq!(split_lines("a\nb"), vec!["a", "b"]);
        assert_eq!(split_lines(""), vec![""]);
        assert_eq!(split_lines("a\r\nb"), vec!["a\r", "b"]);
    }

    #[test]
    fn test_apply_insert() {
        let script = ChangeScript::new(vec![ChangeOp::Insert {
            at: 1,
            lines: lines(&["lineX"]),
        }]);
        let out = script.apply_to_text("line1\nline2\n").unwrap();
        assert_eq!(out, "line1\nlineX\nline2\n");
    }

    #[test]
    fn test_apply_delete_and_replace_in_target_numbering() {
        // a b c d e -> a X d
        let script = ChangeScript::new(vec![
            ChangeOp::Replace {
                at: 1,
                delete: 2,
                lines: lines(&["X"]),
            },
            ChangeOp::Delete { at: 3, count: 1 },
        ]);
        let out = script.apply_to_text("a\nb\nc\nd\ne").unwrap();
        assert_eq!(out, "a\nX\nd");
    }

    #[test]
    fn test_apply_out_of_range_leaves_lines_untouched() {
        let script = ChangeScript::new(vec![
            ChangeOp::Insert {
                at: 0,
                lines: lines(&["new"]),
            },
            ChangeOp::Delete { at: 2, count: 5 },
        ]);
        let mut doc = lines(&["a", "b"]);
        let err = script.apply_to_lines(&mut doc).unwrap_err();
        assert_eq!(
            err,
            ApplyError::OutOfRange {
                index: 1,
                start: 2,
                end: 7,
                len: 3,
            }
        );
        assert_eq!(doc, lines(&["a", "b"]));
    }

    #[test]
    fn test_empty_script_is_identity() {
        let script = ChangeScript::default();
        assert!(script.is_empty());
        assert_eq!(script.apply_to_text("same\n").unwrap(), "same\n");
    }

    #[test]
    fn test_summary_counts() {
        let script = ChangeScript::new(vec![
            ChangeOp::Insert {
                at: 0,
                lines: lines(&["a", "b"]),
            },
            ChangeOp::Replace {
                at: 3,
                delete: 2,
                lines: lines(&["c"]),
            },
            ChangeOp::Delete { at: 4, count: 1 },
        ]);
        assert_eq!(script.len(), 3);
        assert_eq!(script.inserted_lines(), 3);
        assert_eq!(script.deleted_lines(), 3);
    }

    #[test]
    fn test_json_shape() {
        let script = ChangeScript::new(vec![ChangeOp::Delete { at: 2, count: 1 }]);
        let json = serde_json::to_string(&script).unwrap();
        assert_eq!(json, r#"[{"op":"delete","at":2,"count":1}]"#);
    }
}
