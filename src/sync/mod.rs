//! Single-writer document sharing.
//!
//! [`session`] holds the per-document state machine, [`protocol`] the wire
//! messages, [`dispatcher`] routes raw frames for many documents over one
//! transport, [`actor`] runs a session on its own tokio task and [`remote`]
//! bridges an actor to a WebSocket relay.

pub mod actor;
pub mod dispatcher;
pub mod protocol;
pub mod remote;
pub mod session;

pub use actor::{ActorSettings, SessionActor, SessionHandle};
pub use dispatcher::{Dispatcher, Transport};
pub use protocol::{Message, Token, SEPARATOR};
pub use session::{DocumentSession, Outcome, Role, SessionEvent};

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifies a shared document across peers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for DocumentId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&DocumentId> for DocumentId {
    fn from(id: &DocumentId) -> Self {
        id.clone()
    }
}

impl Borrow<str> for DocumentId {
    fn borrow(&self) -> &str {
        &self.0
    }
}
