//! Wire messages exchanged between sharing peers.
//!
//! Every message is `<token><SEPARATOR><payload>` as UTF-8 text. The payload
//! is always the last field and is never split, so change scripts and full
//! document text may contain anything, including the separator.

use std::fmt;
use std::str::FromStr;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::WireError;
use crate::fingerprint::Fingerprint;

pub const SEPARATOR: &str = "@@@@";

/// Payload sent with `CancelEdit`.
pub const CANCEL_PAYLOAD: &str = "c";

/// Message kind, one per wire token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Token {
    StartEdit,
    EndEdit,
    CancelEdit,
    RequestSync,
    Sync,
}

impl Token {
    pub const ALL: [Token; 5] = [
        Token::StartEdit,
        Token::EndEdit,
        Token::CancelEdit,
        Token::RequestSync,
        Token::Sync,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Token::StartEdit => "StartEdit",
            Token::EndEdit => "EndEdit",
            Token::CancelEdit => "CancelEdit",
            Token::RequestSync => "RequestSync",
            Token::Sync => "Sync",
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Token {
    type Err = WireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Token::ALL
            .into_iter()
            .find(|token| token.as_str() == s)
            .ok_or_else(|| WireError::UnknownToken(s.to_string()))
    }
}

/// A decoded protocol message.
///
/// `EndEdit` and `Sync` keep their payload as raw bytes; the session decodes
/// them, since a bad payload there is a recoverable session event rather
/// than an unparseable frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    StartEdit(Fingerprint),
    EndEdit(Bytes),
    CancelEdit,
    RequestSync(Fingerprint),
    Sync(Bytes),
}

impl Message {
    pub fn token(&self) -> Token {
        match self {
            Message::StartEdit(_) => Token::StartEdit,
            Message::EndEdit(_) => Token::EndEdit,
            Message::CancelEdit => Token::CancelEdit,
            Message::RequestSync(_) => Token::RequestSync,
            Message::Sync(_) => Token::Sync,
        }
    }

    pub fn end_edit(script: impl Into<String>) -> Self {
        Message::EndEdit(Bytes::from(script.into()))
    }

    pub fn sync(text: impl Into<String>) -> Self {
        Message::Sync(Bytes::from(text.into()))
    }

    /// The payload as it appears on the wire.
    pub fn payload(&self) -> Bytes {
        match self {
            Message::StartEdit(fp) | Message::RequestSync(fp) => Bytes::from(fp.to_hex()),
            Message::EndEdit(bytes) | Message::Sync(bytes) => bytes.clone(),
            Message::CancelEdit => Bytes::from_static(CANCEL_PAYLOAD.as_bytes()),
        }
    }

    pub fn encode(&self) -> Bytes {
        frame(self.token(), &self.payload())
    }

    /// Split a raw frame on the first separator and decode it.
    pub fn decode(raw: &[u8]) -> Result<Self, WireError> {
        let (token, payload) = split_frame(raw)?;
        let token: Token = std::str::from_utf8(token)
            .map_err(|_| WireError::UnknownToken(String::from_utf8_lossy(token).into_owned()))?
            .parse()?;

        let fingerprint = |payload: &[u8]| -> Result<Fingerprint, WireError> {
            std::str::from_utf8(payload)
                .map_err(|_| {
                    WireError::InvalidFingerprint(String::from_utf8_lossy(payload).into_owned())
                })?
                .parse()
        };

        Ok(match token {
            Token::StartEdit => Message::StartEdit(fingerprint(payload)?),
            Token::RequestSync => Message::RequestSync(fingerprint(payload)?),
            Token::EndEdit => Message::EndEdit(Bytes::copy_from_slice(payload)),
            Token::Sync => Message::Sync(Bytes::copy_from_slice(payload)),
            Token::CancelEdit => Message::CancelEdit,
        })
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::StartEdit(fp) | Message::RequestSync(fp) => {
                write!(f, "{}({})", self.token(), &fp.to_hex()[..12])
            }
            Message::EndEdit(bytes) | Message::Sync(bytes) => {
                write!(f, "{}({} bytes)", self.token(), bytes.len())
            }
            Message::CancelEdit => write!(f, "{}", self.token()),
        }
    }
}

/// Format `<token><SEPARATOR><payload>`.
pub fn frame(token: Token, payload: &[u8]) -> Bytes {
    let token = token.as_str();
    let mut buf = BytesMut::with_capacity(token.len() + SEPARATOR.len() + payload.len());
    buf.put_slice(token.as_bytes());
    buf.put_slice(SEPARATOR.as_bytes());
    buf.put_slice(payload);
    buf.freeze()
}

/// Split a raw frame into `(token, payload)` on the first separator.
pub fn split_frame(raw: &[u8]) -> Result<(&[u8], &[u8]), WireError> {
    let sep = SEPARATOR.as_bytes();
    let at = raw
        .windows(sep.len())
        .position(|window| window == sep)
        .ok_or(WireError::MissingSeparator)?;
    Ok((&raw[..at], &raw[at + sep.len()..]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::{compute, Encoding};

    #[test]
    fn test_start_edit_wire_form() {
        let fp = compute("line1\nline2\n", Encoding::Utf8).unwrap();
        let encoded = Message::StartEdit(fp).encode();
        assert_eq!(encoded, format!("StartEdit@@@@{}", fp.to_hex()).as_bytes());
        assert_eq!(Message::decode(&encoded).unwrap(), Message::StartEdit(fp));
    }

    #[test]
    fn test_cancel_wire_form() {
        assert_eq!(&Message::CancelEdit.encode()[..], b"CancelEdit@@@@c");
        assert_eq!(
            Message::decode(b"CancelEdit@@@@c").unwrap(),
            Message::CancelEdit
        );
    }

    #[test]
    fn test_payload_may_contain_separator() {
        let text = "a@@@@b\nSync@@@@c\n";
        let encoded = Message::sync(text).encode();
        match Message::decode(&encoded).unwrap() {
            Message::Sync(payload) => assert_eq!(&payload[..], text.as_bytes()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_empty_payload() {
        assert_eq!(
            Message::decode(b"Sync@@@@").unwrap(),
            Message::Sync(Bytes::new())
        );
    }

    #[test]
    fn test_unknown_token() {
        assert_eq!(
            Message::decode(b"Ping@@@@x"),
            Err(WireError::UnknownToken("Ping".into()))
        );
    }

    #[test]
    fn test_missing_separator() {
        assert_eq!(
            Message::decode(b"StartEdit"),
            Err(WireError::MissingSeparator)
        );
    }

    #[test]
    fn test_bad_fingerprint() {
        assert!(matches!(
            Message::decode(b"RequestSync@@@@zz"),
            Err(WireError::InvalidFingerprint(_))
        ));
    }

    #[test]
    fn test_display_is_compact() {
        let msg = Message::end_edit("@@d 0 1 -1\n");
        assert_eq!(msg.to_string(), "EndEdit(11 bytes)");
    }
}
