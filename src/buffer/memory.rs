use ropey::Rope;

use super::{Position, TextBuffer};
use crate::error::BufferError;
use crate::script::ChangeScript;

const UNDO_LIMIT: usize = 256;

/// Rope-backed buffer with snapshot undo.
///
/// Lines break on `'\n'` only, matching the change-script line model.
#[derive(Debug, Clone, Default)]
pub struct MemoryBuffer {
    rope: Rope,
    read_only: bool,
    cursor: Position,
    undo: Vec<Rope>,
}

impl MemoryBuffer {
    pub fn new(text: &str) -> Self {
        Self {
            rope: Rope::from_str(text),
            ..Self::default()
        }
    }

    pub fn len_lines(&self) -> usize {
        self.rope.len_lines()
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    /// Revert the last undo group. Returns false if there is nothing to undo.
    pub fn undo(&mut self) -> bool {
        match self.undo.pop() {
            Some(previous) => {
                self.rope = previous;
                self.cursor = self.clamp(self.cursor);
                true
            }
            None => false,
        }
    }

    /// User typing: insert `text` at `at`.
    pub fn insert_local(&mut self, at: Position, text: &str) -> Result<(), BufferError> {
        if self.read_only {
            return Err(BufferError::ReadOnly);
        }
        let at = self.clamp(at);
        let char_idx = self.rope.line_to_char(at.line) + at.column;
        self.checkpoint();
        self.rope.insert(char_idx, text);
        Ok(())
    }

    /// User edit replacing the whole document, e.g. a paste-over or reformat.
    pub fn replace_local(&mut self, text: &str) -> Result<(), BufferError> {
        if self.read_only {
            return Err(BufferError::ReadOnly);
        }
        self.replace(text);
        Ok(())
    }

    fn replace(&mut self, text: &str) {
        self.checkpoint();
        self.rope = Rope::from_str(text);
        self.cursor = self.clamp(self.cursor);
    }

    fn checkpoint(&mut self) {
        if self.undo.len() == UNDO_LIMIT {
            self.undo.remove(0);
        }
        self.undo.push(self.rope.clone());
    }

    fn line_len(&self, line: usize) -> usize {
        let slice = self.rope.line(line);
        let len = slice.len_chars();
        if len > 0 && slice.char(len - 1) == '\n' {
            len - 1
        } else {
            len
        }
    }

    fn clamp(&self, position: Position) -> Position {
        let line = position.line.min(self.rope.len_lines().saturating_sub(1));
        Position {
            line,
            column: position.column.min(self.line_len(line)),
        }
    }
}

impl TextBuffer for MemoryBuffer {
    fn text(&self) -> String {
        self.rope.to_string()
    }

    fn set_text(&mut self, text: &str) {
        self.replace(text);
    }

    fn apply_script(&mut self, script: &ChangeScript) -> Result<(), BufferError> {
        if script.is_empty() {
            return Ok(());
        }
        let next = script.apply_to_text(&self.text())?;
        self.replace(&next);
        Ok(())
    }

    fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn cursor(&self) -> Position {
        self.cursor
    }

    fn set_cursor(&mut self, position: Position) {
        self.cursor = self.clamp(position);
    }

    fn len_bytes(&self) -> usize {
        self.rope.len_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::diff;

    #[test]
    fn test_line_model_matches_scripts() {
        let buffer = MemoryBuffer::new("a\nb\n");
        assert_eq!(buffer.len_lines(), 3);
        let buffer = MemoryBuffer::new("");
        assert_eq!(buffer.len_lines(), 1);
    }

    #[test]
    fn test_apply_script_is_one_undo_group() {
        let mut buffer = MemoryBuffer::new("a\nb\nc\n");
        let script = diff("a\nb\nc\n", "A\nb\nC\nd\n");
        assert!(script.len() > 1);

        buffer.apply_script(&script).unwrap();
        assert_eq!(buffer.text(), "A\nb\nC\nd\n");

        assert!(buffer.undo());
        assert_eq!(buffer.text(), "a\nb\nc\n");
        assert!(!buffer.undo());
    }

    #[test]
    fn test_failed_apply_changes_nothing() {
        let mut buffer = MemoryBuffer::new("a\n");
        let script = diff("a\nb\nc\nd\n", "a\n");
        assert!(buffer.apply_script(&script).is_err());
        assert_eq!(buffer.text(), "a\n");
        assert!(!buffer.can_undo());
    }

    #[test]
    fn test_read_only_blocks_local_edits_only() {
        let mut buffer = MemoryBuffer::new("x\n");
        buffer.set_read_only(true);
        assert_eq!(
            buffer.insert_local(Position::new(0, 0), "y"),
            Err(BufferError::ReadOnly)
        );
        assert_eq!(buffer.replace_local("z"), Err(BufferError::ReadOnly));

        buffer.set_text("remote\n");
        assert_eq!(buffer.text(), "remote\n");
    }

    #[test]
    fn test_insert_local() {
        let mut buffer = MemoryBuffer::new("line1\nline2\n");
        buffer.insert_local(Position::new(1, 0), "lineX\n").unwrap();
        assert_eq!(buffer.text(), "line1\nlineX\nline2\n");
    }

    #[test]
    fn test_cursor_is_clamped() {
        let mut buffer = MemoryBuffer::new("ab\ncdef");
        buffer.set_cursor(Position::new(0, 10));
        assert_eq!(buffer.cursor(), Position::new(0, 2));
        buffer.set_cursor(Position::new(7, 3));
        assert_eq!(buffer.cursor(), Position::new(1, 3));

        buffer.set_text("a");
        assert_eq!(buffer.cursor(), Position::new(0, 1));
    }
}
