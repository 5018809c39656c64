//! Line-level change scripts: compute, serialize, apply.

pub mod codec;
pub mod diff;
pub mod operations;

pub use codec::{decode, encode};
pub use diff::diff;
pub use operations::{split_lines, ChangeOp, ChangeScript};

use crate::buffer::TextBuffer;
use crate::error::BufferError;

/// Apply `script` to `buffer` as one atomic, undoable unit.
pub fn apply<B: TextBuffer + ?Sized>(buffer: &mut B, script: &ChangeScript) -> Result<(), BufferError> {
    buffer.apply_script(script)
}
