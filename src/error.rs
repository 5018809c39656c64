//! Error taxonomy for the sharing protocol.
//!
//! Every error the core can raise is typed here. Only two of them ever reach
//! the caller of a local action ([`EncodingError`] and an invalid-state
//! [`SyncError`]); the rest are absorbed by the session, which logs them and
//! resets to a writable state.

use thiserror::Error;

use crate::sync::session::Role;

/// Fingerprinting failed because the text cannot be encoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodingError {
    #[error("unsupported encoding: {0}")]
    Unsupported(String),

    #[error("character {ch:?} at offset {offset} is not representable in {encoding}")]
    Unrepresentable {
        encoding: &'static str,
        ch: char,
        offset: usize,
    },
}

/// A change script (or a full-text payload) could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("payload is not valid UTF-8")]
    InvalidUtf8,

    #[error("line {line}: malformed operation header {header:?}")]
    MalformedHeader { line: usize, header: String },

    #[error("line {line}: unknown operation kind {kind:?}")]
    UnknownOperation { line: usize, kind: String },

    #[error("line {line}: invalid field {field:?}")]
    InvalidField { line: usize, field: String },

    #[error("operation at line {line} declares {expected} lines but only {found} follow")]
    Truncated {
        line: usize,
        expected: usize,
        found: usize,
    },
}

/// A decoded script addresses lines the target buffer does not have.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApplyError {
    #[error("operation {index} addresses lines {start}..{end} but the buffer has {len} lines")]
    OutOfRange {
        index: usize,
        start: usize,
        end: usize,
        len: usize,
    },
}

/// A raw wire message could not be split into a known token and payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    #[error("message has no separator")]
    MissingSeparator,

    #[error("unknown token {0:?}")]
    UnknownToken(String),

    #[error("invalid fingerprint {0:?}")]
    InvalidFingerprint(String),
}

/// Local mutation attempted on a buffer held by a remote writer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BufferError {
    #[error("buffer is read-only while a remote peer is editing")]
    ReadOnly,

    #[error(transparent)]
    Apply(#[from] ApplyError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("transport closed")]
    Closed,

    #[error("transport rejected frame: {0}")]
    Rejected(String),
}

/// Umbrella error for session and dispatcher operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error(transparent)]
    Encoding(#[from] EncodingError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Apply(#[from] ApplyError),

    #[error(transparent)]
    Wire(#[from] WireError),

    #[error(transparent)]
    Buffer(#[from] BufferError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("cannot {action} while {role}")]
    InvalidState { action: &'static str, role: Role },

    #[error("document {0} is not shared")]
    UnknownDocument(String),

    #[error("session actor for {0} has stopped")]
    ActorClosed(String),
}

/// Coarse classification used for logging and UI notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Local operation aborted, session unchanged.
    Encoding,
    /// Remote edit lost, session reset to idle.
    Decode,
    /// Message not valid for the current state; dropped.
    Protocol,
    /// Delivery failed; the transport owns recovery.
    Transport,
    /// Caller misuse (unknown document, wrong state, stopped actor).
    Usage,
}

impl SyncError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            SyncError::Encoding(_) => ErrorCategory::Encoding,
            SyncError::Decode(_)
            | SyncError::Apply(_)
            | SyncError::Buffer(BufferError::Apply(_)) => ErrorCategory::Decode,
            SyncError::Wire(_) => ErrorCategory::Protocol,
            SyncError::Transport(_) => ErrorCategory::Transport,
            SyncError::InvalidState { .. }
            | SyncError::Buffer(BufferError::ReadOnly)
            | SyncError::UnknownDocument(_)
            | SyncError::ActorClosed(_) => ErrorCategory::Usage,
        }
    }

    /// Whether the session keeps working after this error without outside
    /// intervention.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, SyncError::ActorClosed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categorization() {
        let err: SyncError = EncodingError::Unsupported("ebcdic".into()).into();
        assert_eq!(err.category(), ErrorCategory::Encoding);

        let err: SyncError = DecodeError::InvalidUtf8.into();
        assert_eq!(err.category(), ErrorCategory::Decode);

        let err: SyncError = ApplyError::OutOfRange {
            index: 0,
            start: 4,
            end: 5,
            len: 2,
        }
        .into();
        assert_eq!(err.category(), ErrorCategory::Decode);

        let err: SyncError = WireError::UnknownToken("Ping".into()).into();
        assert_eq!(err.category(), ErrorCategory::Protocol);
    }

    #[test]
    fn test_recoverable() {
        assert!(SyncError::from(TransportError::Closed).is_recoverable());
        assert!(!SyncError::ActorClosed("doc".into()).is_recoverable());
    }

    #[test]
    fn test_invalid_state_message() {
        let err = SyncError::InvalidState {
            action: "commit a local edit",
            role: Role::Idle,
        };
        assert_eq!(err.to_string(), "cannot commit a local edit while idle");
    }
}
