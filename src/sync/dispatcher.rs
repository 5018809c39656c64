//! Routes raw frames between one transport and many document sessions.

use std::collections::HashMap;

use bytes::Bytes;

use super::protocol::{frame, Message, Token};
use super::session::{DocumentSession, Outcome, Role, SessionEvent};
use super::DocumentId;
use crate::buffer::TextBuffer;
use crate::error::{SyncError, TransportError};
use crate::fingerprint::Encoding;

/// Outbound half of the transport collaborator.
///
/// Delivery, ordering and retries are the transport's business; the
/// dispatcher hands over each frame once.
pub trait Transport {
    fn send(&mut self, document_id: &DocumentId, frame: Bytes) -> Result<(), TransportError>;
}

impl<F> Transport for F
where
    F: FnMut(&DocumentId, Bytes) -> Result<(), TransportError>,
{
    fn send(&mut self, document_id: &DocumentId, frame: Bytes) -> Result<(), TransportError> {
        self(document_id, frame)
    }
}

struct Shared<B> {
    session: DocumentSession,
    buffer: B,
}

pub struct Dispatcher<B, T> {
    documents: HashMap<DocumentId, Shared<B>>,
    transport: T,
}

impl<B: TextBuffer, T: Transport> Dispatcher<B, T> {
    pub fn new(transport: T) -> Self {
        Self {
            documents: HashMap::new(),
            transport,
        }
    }

    /// Start sharing `buffer`. Re-sharing an id replaces the previous session
    /// and returns its buffer.
    pub fn share(
        &mut self,
        document_id: impl Into<DocumentId>,
        buffer: B,
        encoding: Encoding,
    ) -> Option<B> {
        let document_id = document_id.into();
        tracing::info!(document = %document_id, %encoding, "document shared");
        let session = DocumentSession::new(document_id.clone(), encoding);
        self.documents
            .insert(document_id, Shared { session, buffer })
            .map(|previous| previous.buffer)
    }

    /// Stop sharing and hand the buffer back, writable.
    pub fn unshare(&mut self, document_id: &str) -> Option<B> {
        let Shared {
            mut session,
            mut buffer,
        } = self.documents.remove(document_id)?;

        if session.role() == Role::LocalWriter {
            if let Ok(outcome) = session.cancel_local_edit() {
                self.flush(session.document_id(), outcome);
            }
        }
        session.disconnect(&mut buffer);
        tracing::info!(document = %session.document_id(), "document unshared");
        Some(buffer)
    }

    pub fn is_shared(&self, document_id: &str) -> bool {
        self.documents.contains_key(document_id)
    }

    pub fn session(&self, document_id: &str) -> Option<&DocumentSession> {
        self.documents.get(document_id).map(|shared| &shared.session)
    }

    pub fn buffer(&self, document_id: &str) -> Option<&B> {
        self.documents.get(document_id).map(|shared| &shared.buffer)
    }

    /// Local user edits go through here; sessions only lock, never edit.
    pub fn buffer_mut(&mut self, document_id: &str) -> Option<&mut B> {
        self.documents
            .get_mut(document_id)
            .map(|shared| &mut shared.buffer)
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn start_local_edit(&mut self, document_id: &str) -> Result<Vec<SessionEvent>, SyncError> {
        let shared = self.shared_mut(document_id)?;
        let outcome = shared.session.start_local_edit(&shared.buffer)?;
        Ok(self.flush(&DocumentId::from(document_id), outcome))
    }

    pub fn commit_local_edit(&mut self, document_id: &str) -> Result<Vec<SessionEvent>, SyncError> {
        let shared = self.shared_mut(document_id)?;
        let outcome = shared.session.commit_local_edit(&shared.buffer)?;
        Ok(self.flush(&DocumentId::from(document_id), outcome))
    }

    pub fn cancel_local_edit(&mut self, document_id: &str) -> Result<Vec<SessionEvent>, SyncError> {
        let shared = self.shared_mut(document_id)?;
        let outcome = shared.session.cancel_local_edit()?;
        Ok(self.flush(&DocumentId::from(document_id), outcome))
    }

    /// Route one raw frame to its session. Frames for unshared documents and
    /// frames that cannot be parsed are dropped with a warning.
    pub fn receive(&mut self, document_id: &str, raw: &[u8]) -> Vec<SessionEvent> {
        let Some(shared) = self.documents.get_mut(document_id) else {
            tracing::warn!(document = document_id, "frame for unshared document dropped");
            return Vec::new();
        };

        let message = match Message::decode(raw) {
            Ok(message) => message,
            Err(err) => {
                tracing::warn!(document = document_id, %err, "unparseable frame dropped");
                return Vec::new();
            }
        };
        tracing::debug!(document = document_id, %message, "received");

        let outcome = shared.session.handle(message, &mut shared.buffer);
        self.flush(&DocumentId::from(document_id), outcome)
    }

    /// The transport for `document_id` went away.
    pub fn disconnected(&mut self, document_id: &str) -> Vec<SessionEvent> {
        match self.documents.get_mut(document_id) {
            Some(shared) => shared.session.disconnect(&mut shared.buffer).events,
            None => Vec::new(),
        }
    }

    /// Format and hand one frame to the transport. Failures are logged and
    /// not retried.
    pub fn send(&mut self, document_id: &DocumentId, token: Token, payload: &[u8]) {
        let bytes = frame(token, payload);
        if let Err(err) = self.transport.send(document_id, bytes) {
            tracing::warn!(document = %document_id, %token, %err, "send failed");
        }
    }

    fn flush(&mut self, document_id: &DocumentId, outcome: Outcome) -> Vec<SessionEvent> {
        for message in outcome.outbound {
            self.send(document_id, message.token(), &message.payload());
        }
        outcome.events
    }

    fn shared_mut(&mut self, document_id: &str) -> Result<&mut Shared<B>, SyncError> {
        self.documents
            .get_mut(document_id)
            .ok_or_else(|| SyncError::UnknownDocument(document_id.to_string()))
    }
}
