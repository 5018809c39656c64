//! Content fingerprints used to detect divergence between peers.
//!
//! A fingerprint is the SHA-256 digest of a text snapshot encoded with the
//! buffer's declared encoding. Peers compare fingerprints instead of shipping
//! the whole document; equal fingerprints are treated as equal text.

use std::fmt;
use std::str::FromStr;

use sha2::{Digest, Sha256};

use crate::error::{EncodingError, WireError};

/// Text encodings a shared buffer may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    #[default]
    Utf8,
    Utf16Le,
    Utf16Be,
    Latin1,
    Ascii,
}

impl Encoding {
    /// Resolve an encoding label such as `"utf-8"` or `"iso-8859-1"`.
    pub fn from_label(label: &str) -> Result<Self, EncodingError> {
        let normalized = label.trim().to_ascii_lowercase().replace('_', "-");
        match normalized.as_str() {
            "utf-8" | "utf8" => Ok(Encoding::Utf8),
            "utf-16" | "utf-16le" | "utf16le" => Ok(Encoding::Utf16Le),
            "utf-16be" | "utf16be" => Ok(Encoding::Utf16Be),
            "latin-1" | "latin1" | "iso-8859-1" | "iso8859-1" => Ok(Encoding::Latin1),
            "ascii" | "us-ascii" => Ok(Encoding::Ascii),
            _ => Err(EncodingError::Unsupported(label.to_string())),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Encoding::Utf8 => "utf-8",
            Encoding::Utf16Le => "utf-16le",
            Encoding::Utf16Be => "utf-16be",
            Encoding::Latin1 => "iso-8859-1",
            Encoding::Ascii => "us-ascii",
        }
    }

    /// Encode `text` into the bytes that get hashed.
    pub fn encode(self, text: &str) -> Result<Vec<u8>, EncodingError> {
        match self {
            Encoding::Utf8 => Ok(text.as_bytes().to_vec()),
            Encoding::Utf16Le => Ok(text.encode_utf16().flat_map(u16::to_le_bytes).collect()),
            Encoding::Utf16Be => Ok(text.encode_utf16().flat_map(u16::to_be_bytes).collect()),
            Encoding::Latin1 => self.encode_single_byte(text, 0xFF),
            Encoding::Ascii => self.encode_single_byte(text, 0x7F),
        }
    }

    fn encode_single_byte(self, text: &str, max: u32) -> Result<Vec<u8>, EncodingError> {
        let mut bytes = Vec::with_capacity(text.len());
        for (offset, ch) in text.char_indices() {
            let code = ch as u32;
            if code > max {
                return Err(EncodingError::Unrepresentable {
                    encoding: self.label(),
                    ch,
                    offset,
                });
            }
            bytes.push(code as u8);
        }
        Ok(bytes)
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Encoding {
    type Err = EncodingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Encoding::from_label(s)
    }
}

/// SHA-256 digest of an encoded text snapshot.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", &self.to_hex()[..12])
    }
}

impl FromStr for Fingerprint {
    type Err = WireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut digest = [0u8; 32];
        hex::decode_to_slice(s.trim(), &mut digest)
            .map_err(|_| WireError::InvalidFingerprint(s.to_string()))?;
        Ok(Fingerprint(digest))
    }
}

/// Fingerprint `text` as encoded by `encoding`.
pub fn compute(text: &str, encoding: Encoding) -> Result<Fingerprint, EncodingError> {
    let bytes = encoding.encode(text)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(Fingerprint(hasher.finalize().into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_is_stable() {
        let a = compute("line1\nline2\n", Encoding::Utf8).unwrap();
        let b = compute("line1\nline2\n", Encoding::Utf8).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_hex().len(), 64);
    }

    #[test]
    fn test_fingerprint_detects_change() {
        let a = compute("X\n", Encoding::Utf8).unwrap();
        let b = compute("Y\n", Encoding::Utf8).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_known_digest() {
        let fp = compute("", Encoding::Utf8).unwrap();
        assert_eq!(
            fp.to_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_encoding_changes_digest() {
        let utf8 = compute("héllo", Encoding::Utf8).unwrap();
        let latin1 = compute("héllo", Encoding::Latin1).unwrap();
        let utf16 = compute("héllo", Encoding::Utf16Le).unwrap();
        assert_ne!(utf8, latin1);
        assert_ne!(utf8, utf16);
    }

    #[test]
    fn test_ascii_text_same_in_compatible_encodings() {
        let utf8 = compute("plain", Encoding::Utf8).unwrap();
        let ascii = compute("plain", Encoding::Ascii).unwrap();
        let latin1 = compute("plain", Encoding::Latin1).unwrap();
        assert_eq!(utf8, ascii);
        assert_eq!(utf8, latin1);
    }

    #[test]
    fn test_unrepresentable_character() {
        let err = compute("a→b", Encoding::Latin1).unwrap_err();
        assert_eq!(
            err,
            EncodingError::Unrepresentable {
                encoding: "iso-8859-1",
                ch: '→',
                offset: 1,
            }
        );
        assert!(compute("é", Encoding::Ascii).is_err());
    }

    #[test]
    fn test_labels() {
        assert_eq!(Encoding::from_label("UTF-8").unwrap(), Encoding::Utf8);
        assert_eq!(Encoding::from_label("latin_1").unwrap(), Encoding::Latin1);
        assert_eq!(Encoding::from_label("utf-16").unwrap(), Encoding::Utf16Le);
        assert_eq!(
            Encoding::from_label("shift-jis"),
            Err(EncodingError::Unsupported("shift-jis".into()))
        );
    }

    #[test]
    fn test_hex_parse() {
        let fp = compute("abc", Encoding::Utf8).unwrap();
        let parsed: Fingerprint = fp.to_hex().parse().unwrap();
        assert_eq!(parsed, fp);
        assert!("not-hex".parse::<Fingerprint>().is_err());
        assert!("abcd".parse::<Fingerprint>().is_err());
    }
}
