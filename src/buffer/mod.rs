//! The text-buffer collaborator consumed by sessions.
//!
//! Editors implement [`TextBuffer`] for their widget. [`MemoryBuffer`] is the
//! in-process implementation used by the CLI, the tests and headless peers.

pub mod memory;

pub use memory::MemoryBuffer;

use serde::{Deserialize, Serialize};

use crate::error::BufferError;
use crate::script::ChangeScript;

/// 0-based line and character column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

/// Operations a session needs from the editor buffer.
///
/// `set_text` and `apply_script` are programmatic replacements issued by the
/// session and must succeed regardless of the read-only flag; read-only only
/// blocks edits coming from the local user.
pub trait TextBuffer {
    fn text(&self) -> String;

    fn set_text(&mut self, text: &str);

    /// Apply a whole script as one undo group. On error nothing is changed.
    fn apply_script(&mut self, script: &ChangeScript) -> Result<(), BufferError>;

    fn set_read_only(&mut self, read_only: bool);

    fn is_read_only(&self) -> bool;

    fn cursor(&self) -> Position;

    /// Move the cursor, clamping to the document.
    fn set_cursor(&mut self, position: Position);

    /// Size hint used to decide whether to offload hashing and diffing.
    fn len_bytes(&self) -> usize {
        self.text().len()
    }
}

impl<B: TextBuffer + ?Sized> TextBuffer for Box<B> {
    fn text(&self) -> String {
        (**self).text()
    }

    fn set_text(&mut self, text: &str) {
        (**self).set_text(text)
    }

    fn apply_script(&mut self, script: &ChangeScript) -> Result<(), BufferError> {
        (**self).apply_script(script)
    }

    fn set_read_only(&mut self, read_only: bool) {
        (**self).set_read_only(read_only)
    }

    fn is_read_only(&self) -> bool {
        (**self).is_read_only()
    }

    fn cursor(&self) -> Position {
        (**self).cursor()
    }

    fn set_cursor(&mut self, position: Position) {
        (**self).set_cursor(position)
    }

    fn len_bytes(&self) -> usize {
        (**self).len_bytes()
    }
}
