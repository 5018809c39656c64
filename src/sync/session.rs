//! Per-document sharing state machine.
//!
//! A [`DocumentSession`] decides, for one shared document, who may write.
//! It never talks to the transport itself: every transition returns an
//! [`Outcome`] holding the messages to send and advisory events for the UI.
//!
//! ```text
//!            startLocalEdit                 StartEdit (fp match)
//!   Idle ──────────────────► LocalWriter   Idle ─────────────────► RemoteWriter
//!    ▲   commit / cancel          │          │                         │
//!    └────────────────────────────┘          │ StartEdit (mismatch)    │ EndEdit / CancelEdit
//!                                            ▼                         ▼
//!                                         Syncing ──── Sync ────► RemoteWriter ──► Idle
//! ```
//!
//! Disconnect resets any state to `Idle` with a writable buffer.

use std::collections::VecDeque;
use std::fmt;

use bytes::Bytes;

use super::protocol::{Message, Token};
use super::DocumentId;
use crate::buffer::TextBuffer;
use crate::error::{DecodeError, SyncError};
use crate::fingerprint::{self, Encoding, Fingerprint};
use crate::script;

/// Who currently holds write access to the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Idle,
    LocalWriter,
    RemoteWriter,
    Syncing,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::Idle => "idle",
            Role::LocalWriter => "local writer",
            Role::RemoteWriter => "remote writer",
            Role::Syncing => "syncing",
        })
    }
}

#[derive(Debug, Clone)]
enum State {
    Idle,
    LocalWriter {
        saved: String,
        fingerprint: Fingerprint,
    },
    RemoteWriter,
    Syncing {
        pending: VecDeque<Message>,
    },
}

/// Advisory notifications for the embedding application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    LocalEditStarted,
    LocalEditCommitted { operations: usize },
    LocalEditCancelled,
    RemoteEditStarted,
    ResyncRequested,
    SyncSent,
    Resynced { replayed: usize },
    RemoteEditApplied { operations: usize },
    RemoteEditCancelled,
    /// The remote edit could not be applied and was dropped.
    RemoteEditFailed { reason: String },
    SessionReset { previous: Role },
}

/// Result of a transition: messages to send, then events to report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outcome {
    pub outbound: Vec<Message>,
    pub events: Vec<SessionEvent>,
}

impl Outcome {
    fn send(message: Message, event: SessionEvent) -> Self {
        Self {
            outbound: vec![message],
            events: vec![event],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.outbound.is_empty() && self.events.is_empty()
    }
}

pub struct DocumentSession {
    document_id: DocumentId,
    encoding: Encoding,
    state: State,
}

impl DocumentSession {
    pub fn new(document_id: impl Into<DocumentId>, encoding: Encoding) -> Self {
        Self {
            document_id: document_id.into(),
            encoding,
            state: State::Idle,
        }
    }

    pub fn document_id(&self) -> &DocumentId {
        &self.document_id
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    pub fn role(&self) -> Role {
        match self.state {
            State::Idle => Role::Idle,
            State::LocalWriter { .. } => Role::LocalWriter,
            State::RemoteWriter => Role::RemoteWriter,
            State::Syncing { .. } => Role::Syncing,
        }
    }

    /// The writer's pre-edit text; present only while [`Role::LocalWriter`].
    pub fn saved_snapshot(&self) -> Option<&str> {
        match &self.state {
            State::LocalWriter { saved, .. } => Some(saved),
            _ => None,
        }
    }

    /// Messages held back while [`Role::Syncing`], in arrival order.
    pub fn pending_inbound(&self) -> impl Iterator<Item = &Message> + '_ {
        let pending = match &self.state {
            State::Syncing { pending } => Some(pending.iter()),
            _ => None,
        };
        pending.into_iter().flatten()
    }

    pub fn start_local_edit<B: TextBuffer + ?Sized>(
        &mut self,
        buffer: &B,
    ) -> Result<Outcome, SyncError> {
        if !matches!(self.state, State::Idle) {
            return Err(self.invalid("start a local edit"));
        }

        let saved = buffer.text();
        let fingerprint = fingerprint::compute(&saved, self.encoding)?;
        tracing::debug!(document = %self.document_id, %fingerprint, "local edit started");

        self.state = State::LocalWriter { saved, fingerprint };
        Ok(Outcome::send(
            Message::StartEdit(fingerprint),
            SessionEvent::LocalEditStarted,
        ))
    }

    pub fn commit_local_edit<B: TextBuffer + ?Sized>(
        &mut self,
        buffer: &B,
    ) -> Result<Outcome, SyncError> {
        let State::LocalWriter { saved, .. } = &self.state else {
            return Err(self.invalid("commit a local edit"));
        };

        let current = buffer.text();
        // Must be encodable so the next StartEdit can fingerprint it.
        fingerprint::compute(&current, self.encoding)?;
        let script = script::diff(saved, &current);
        let operations = script.len();
        tracing::debug!(document = %self.document_id, operations, "local edit committed");

        self.state = State::Idle;
        Ok(Outcome::send(
            Message::end_edit(script::encode(&script)),
            SessionEvent::LocalEditCommitted { operations },
        ))
    }

    pub fn cancel_local_edit(&mut self) -> Result<Outcome, SyncError> {
        if !matches!(self.state, State::LocalWriter { .. }) {
            return Err(self.invalid("cancel a local edit"));
        }
        tracing::debug!(document = %self.document_id, "local edit cancelled");

        self.state = State::Idle;
        Ok(Outcome::send(
            Message::CancelEdit,
            SessionEvent::LocalEditCancelled,
        ))
    }

    /// Feed one inbound message through the state machine.
    pub fn handle<B: TextBuffer + ?Sized>(&mut self, message: Message, buffer: &mut B) -> Outcome {
        let mut outcome = Outcome::default();
        self.dispatch(message, buffer, &mut outcome);
        outcome
    }

    /// Transport went away: drop any edit in progress and unlock the buffer.
    pub fn disconnect<B: TextBuffer + ?Sized>(&mut self, buffer: &mut B) -> Outcome {
        let previous = self.role();
        self.state = State::Idle;
        buffer.set_read_only(false);
        tracing::info!(document = %self.document_id, %previous, "session reset after disconnect");

        Outcome {
            outbound: Vec::new(),
            events: vec![SessionEvent::SessionReset { previous }],
        }
    }

    fn dispatch<B: TextBuffer + ?Sized>(
        &mut self,
        message: Message,
        buffer: &mut B,
        out: &mut Outcome,
    ) {
        if let State::Syncing { pending } = &mut self.state {
            match message {
                // CancelEdit aborts the resync outright; the writer that
                // cancelled will never answer our RequestSync.
                Message::Sync(_) | Message::CancelEdit => {}
                queued => {
                    tracing::debug!(
                        document = %self.document_id,
                        message = %queued,
                        "queued while syncing"
                    );
                    pending.push_back(queued);
                    return;
                }
            }
        }

        match message {
            Message::StartEdit(remote) => self.on_start_edit(remote, buffer, out),
            Message::EndEdit(payload) => self.on_end_edit(&payload, buffer, out),
            Message::CancelEdit => self.on_cancel_edit(buffer, out),
            Message::RequestSync(claim) => self.on_request_sync(claim, out),
            Message::Sync(payload) => self.on_sync(payload, buffer, out),
        }
    }

    fn on_start_edit<B: TextBuffer + ?Sized>(
        &mut self,
        remote: Fingerprint,
        buffer: &mut B,
        out: &mut Outcome,
    ) {
        if !matches!(self.state, State::Idle) {
            return self.violation(Token::StartEdit);
        }

        let local = fingerprint::compute(&buffer.text(), self.encoding);
        buffer.set_read_only(true);

        match local {
            Ok(local) if local == remote => {
                tracing::debug!(document = %self.document_id, "remote edit started");
                self.state = State::RemoteWriter;
                out.events.push(SessionEvent::RemoteEditStarted);
            }
            mismatch => {
                if let Err(err) = mismatch {
                    tracing::warn!(document = %self.document_id, %err, "cannot fingerprint local text");
                }
                tracing::info!(
                    document = %self.document_id,
                    remote = %remote,
                    "fingerprint mismatch, requesting resync"
                );
                self.state = State::Syncing {
                    pending: VecDeque::new(),
                };
                out.outbound.push(Message::RequestSync(remote));
                out.events.push(SessionEvent::ResyncRequested);
            }
        }
    }

    fn on_end_edit<B: TextBuffer + ?Sized>(
        &mut self,
        payload: &[u8],
        buffer: &mut B,
        out: &mut Outcome,
    ) {
        if !matches!(self.state, State::RemoteWriter) {
            return self.violation(Token::EndEdit);
        }

        let applied = script::decode(payload)
            .map_err(SyncError::from)
            .and_then(|script| {
                let cursor = buffer.cursor();
                script::apply(buffer, &script)?;
                buffer.set_cursor(cursor);
                Ok(script.len())
            });

        self.state = State::Idle;
        buffer.set_read_only(false);

        match applied {
            Ok(operations) => {
                tracing::debug!(document = %self.document_id, operations, "remote edit applied");
                out.events.push(SessionEvent::RemoteEditApplied { operations });
            }
            Err(err) => self.remote_failed(err, out),
        }
    }

    fn on_cancel_edit<B: TextBuffer + ?Sized>(&mut self, buffer: &mut B, out: &mut Outcome) {
        if !matches!(self.state, State::RemoteWriter | State::Syncing { .. }) {
            return self.violation(Token::CancelEdit);
        }
        tracing::debug!(document = %self.document_id, role = %self.role(), "remote edit cancelled");

        self.state = State::Idle;
        buffer.set_read_only(false);
        out.events.push(SessionEvent::RemoteEditCancelled);
    }

    fn on_request_sync(&mut self, claim: Fingerprint, out: &mut Outcome) {
        let State::LocalWriter { saved, fingerprint } = &self.state else {
            return self.violation(Token::RequestSync);
        };

        if *fingerprint != claim {
            tracing::debug!(
                document = %self.document_id,
                claim = %claim,
                "resync claim does not match saved snapshot, ignoring"
            );
            return;
        }

        tracing::info!(document = %self.document_id, bytes = saved.len(), "sending full sync");
        out.outbound.push(Message::sync(saved.clone()));
        out.events.push(SessionEvent::SyncSent);
    }

    fn on_sync<B: TextBuffer + ?Sized>(&mut self, payload: Bytes, buffer: &mut B, out: &mut Outcome) {
        if !matches!(self.state, State::Syncing { .. }) {
            return self.violation(Token::Sync);
        }
        let pending = match &mut self.state {
            State::Syncing { pending } => std::mem::take(pending),
            _ => VecDeque::new(),
        };

        let text = match std::str::from_utf8(&payload) {
            Ok(text) => text,
            Err(_) => {
                self.state = State::Idle;
                buffer.set_read_only(false);
                return self.remote_failed(DecodeError::InvalidUtf8.into(), out);
            }
        };

        let cursor = buffer.cursor();
        buffer.set_text(text);
        buffer.set_cursor(cursor);
        self.state = State::RemoteWriter;

        let replayed = pending.len();
        tracing::info!(document = %self.document_id, replayed, "resynced from full text");
        out.events.push(SessionEvent::Resynced { replayed });

        for message in pending {
            self.dispatch(message, buffer, out);
        }
    }

    fn remote_failed(&self, err: SyncError, out: &mut Outcome) {
        tracing::warn!(
            document = %self.document_id,
            category = ?err.category(),
            %err,
            "remote edit could not be applied"
        );
        out.events.push(SessionEvent::RemoteEditFailed {
            reason: err.to_string(),
        });
    }

    fn violation(&self, token: Token) {
        tracing::warn!(
            document = %self.document_id,
            %token,
            role = %self.role(),
            "protocol violation, message dropped"
        );
    }

    fn invalid(&self, action: &'static str) -> SyncError {
        SyncError::InvalidState {
            action,
            role: self.role(),
        }
    }
}

impl fmt::Debug for DocumentSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentSession")
            .field("document_id", &self.document_id)
            .field("encoding", &self.encoding)
            .field("role", &self.role())
            .field("pending", &self.pending_inbound().count())
            .finish()
    }
}
