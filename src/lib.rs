//! # DX Share - Single-Writer Document Sharing
//!
//! Lets two peers edit the same text document without a merge engine: one
//! peer at a time holds the write lock, the other follows read-only.
//!
//! ## How it works
//!
//! - **StartEdit**: the writer announces a fingerprint of its pre-edit text
//! - **EndEdit**: on commit it sends a line-level change script
//! - **RequestSync / Sync**: a follower whose fingerprint differs pulls the
//!   writer's full text first, then replays whatever arrived meanwhile
//! - **Disconnect**: any session resets to idle and writable
//!
//! ## Quick Start
//!
//! ```rust
//! use dx_share::buffer::{MemoryBuffer, Position};
//! use dx_share::fingerprint::Encoding;
//! use dx_share::sync::DocumentSession;
//!
//! let mut writer = DocumentSession::new("notes", Encoding::Utf8);
//! let mut follower = DocumentSession::new("notes", Encoding::Utf8);
//! let mut mine = MemoryBuffer::new("line1\nline2\n");
//! let mut theirs = MemoryBuffer::new("line1\nline2\n");
//!
//! let start = writer.start_local_edit(&mine).unwrap();
//! for message in start.outbound {
//!     follower.handle(message, &mut theirs);
//! }
//!
//! mine.insert_local(Position::new(1, 0), "lineX\n").unwrap();
//! let end = writer.commit_local_edit(&mine).unwrap();
//! for message in end.outbound {
//!     follower.handle(message, &mut theirs);
//! }
//!
//! use dx_share::buffer::TextBuffer;
//! assert_eq!(theirs.text(), "line1\nlineX\nline2\n");
//! ```

pub mod buffer;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod script;
pub mod server;
pub mod sync;

// Re-export main types for library consumers
pub use buffer::{MemoryBuffer, Position, TextBuffer};
pub use config::ShareConfig;
pub use error::{ErrorCategory, SyncError};
pub use fingerprint::{Encoding, Fingerprint};
pub use script::{ChangeOp, ChangeScript};
pub use sync::{
    Dispatcher, DocumentId, DocumentSession, Message, Role, SessionActor, SessionEvent,
    SessionHandle, Transport,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
