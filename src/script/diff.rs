use similar::{Algorithm, DiffOp, TextDiff};

use super::operations::{split_lines, ChangeOp, ChangeScript};

/// Line-level script that turns `old` into `new`.
///
/// Each non-equal opcode from the matcher becomes exactly one operation.
/// Operations apply in order, so each one is positioned in the text as it
/// stands after the earlier ones ran. Opcodes are not coalesced.
pub fn diff(old: &str, new: &str) -> ChangeScript {
    if old == new {
        return ChangeScript::default();
    }

    let old_lines = split_lines(old);
    let new_lines = split_lines(new);
    let diff = TextDiff::configure()
        .algorithm(Algorithm::Myers)
        .diff_slices(&old_lines, &new_lines);

    let collect = |start: usize, len: usize| -> Vec<String> {
        new_lines[start..start + len]
            .iter()
            .map(|line| line.to_string())
            .collect()
    };

    // Lines before `cursor` already match the target.
    let mut cursor = 0;
    let mut ops = Vec::new();
    for op in diff.ops() {
        match *op {
            DiffOp::Equal { len, .. } => cursor += len,
            DiffOp::Insert {
                new_index, new_len, ..
            } => {
                ops.push(ChangeOp::Insert {
                    at: cursor,
                    lines: collect(new_index, new_len),
                });
                cursor += new_len;
            }
            DiffOp::Delete { old_len, .. } => ops.push(ChangeOp::Delete {
                at: cursor,
                count: old_len,
            }),
            DiffOp::Replace {
                old_len,
                new_index,
                new_len,
                ..
            } => {
                ops.push(ChangeOp::Replace {
                    at: cursor,
                    delete: old_len,
                    lines: collect(new_index, new_len),
                });
                cursor += new_len;
            }
        }
    }
    ChangeScript::new(ops)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_texts_give_empty_script() {
        assert!(diff("a\nb\n", "a\nb\n").is_empty());
        assert!(diff("", "").is_empty());
    }

    #[test]
    fn test_insert_between_lines() {
        let script = diff("line1\nline2\n", "line1\nlineX\nline2\n");
        assert_eq!(
            script.ops(),
            &[ChangeOp::Insert {
                at: 1,
                lines: vec!["lineX".to_string()],
            }]
        );
    }

    #[test]
    fn test_delete_uses_target_position() {
        let script = diff("a\nb\nc\n", "a\nc\n");
        assert_eq!(script.ops(), &[ChangeOp::Delete { at: 1, count: 1 }]);
    }

    #[test]
    fn test_replace() {
        let script = diff("X\n", "Y\n");
        assert_eq!(
            script.ops(),
            &[ChangeOp::Replace {
                at: 0,
                delete: 1,
                lines: vec!["Y".to_string()],
            }]
        );
    }

    #[test]
    fn test_trailing_newline_change() {
        let script = diff("x", "x\n");
        assert_eq!(script.apply_to_text("x").unwrap(), "x\n");
        let script = diff("x\n", "x");
        assert_eq!(script.apply_to_text("x\n").unwrap(), "x");
    }

    #[test]
    fn test_multiple_hunks_apply_in_order() {
        let old = "a\nb\nc\nd\ne\nf\n";
        let new = "a\nB\nc\nd\nf\ng\n";
        let script = diff(old, new);
        assert!(script.len() >= 2);
        assert_eq!(script.apply_to_text(old).unwrap(), new);
    }

    #[test]
    fn test_delete_before_equal_line() {
        let script = diff("x\ny", "y\ny");
        assert_eq!(script.apply_to_text("x\ny").unwrap(), "y\ny");
        assert_eq!(script.ops()[0], ChangeOp::Delete { at: 0, count: 1 });

        let script = diff("a\nb", "b\nb");
        assert_eq!(script.apply_to_text("a\nb").unwrap(), "b\nb");
    }

    #[test]
    fn test_carriage_return_and_blank_lines() {
        let script = diff("\r\n", "\n");
        assert_eq!(script.apply_to_text("\r\n").unwrap(), "\n");

        let script = diff("q\n", "\n\n");
        assert_eq!(script.apply_to_text("q\n").unwrap(), "\n\n");
    }
}
