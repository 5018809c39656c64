//! Text wire form of a [`ChangeScript`].
//!
//! ```text
//! @@i <pos> -1 <n>        followed by n literal lines
//! @@d <pos> <count> -1
//! @@r <pos> <count> <n>   followed by n literal lines
//! ```
//!
//! Entries are joined with `'\n'` and the whole form ends with one `'\n'`.

use crate::error::DecodeError;

use super::operations::{ChangeOp, ChangeScript};

const HEADER_PREFIX: &str = "@@";

pub fn encode(script: &ChangeScript) -> String {
    let mut out: Vec<String> = Vec::with_capacity(script.len() + script.inserted_lines());
    for op in script {
        match op {
            ChangeOp::Insert { at, lines } => {
                out.push(format!("{HEADER_PREFIX}i {at} -1 {}", lines.len()));
                out.extend(lines.iter().cloned());
            }
            ChangeOp::Delete { at, count } => {
                out.push(format!("{HEADER_PREFIX}d {at} {count} -1"));
            }
            ChangeOp::Replace { at, delete, lines } => {
                out.push(format!("{HEADER_PREFIX}r {at} {delete} {}", lines.len()));
                out.extend(lines.iter().cloned());
            }
        }
    }
    let mut encoded = out.join("\n");
    encoded.push('\n');
    encoded
}

/// Decode an encoded script. Any malformed header or missing payload line
/// rejects the whole script.
pub fn decode(bytes: &[u8]) -> Result<ChangeScript, DecodeError> {
    let text = std::str::from_utf8(bytes).map_err(|_| DecodeError::InvalidUtf8)?;
    let body = text.strip_suffix('\n').unwrap_or(text);
    if body.is_empty() {
        return Ok(ChangeScript::default());
    }

    let lines: Vec<&str> = body.split('\n').collect();
    let mut ops = Vec::new();
    let mut cursor = 0;

    while cursor < lines.len() {
        let line_no = cursor + 1;
        let header = Header::parse(line_no, lines[cursor])?;
        cursor += 1;

        let mut take = |count: usize| -> Result<Vec<String>, DecodeError> {
            let available = lines.len() - cursor;
            if available < count {
                return Err(DecodeError::Truncated {
                    line: line_no,
                    expected: count,
                    found: available,
                });
            }
            let payload = lines[cursor..cursor + count]
                .iter()
                .map(|line| line.to_string())
                .collect();
            cursor += count;
            Ok(payload)
        };

        let op = match header.kind {
            Kind::Insert => ChangeOp::Insert {
                at: header.pos,
                lines: take(header.count(line_no, header.len2)?)?,
            },
            Kind::Delete => ChangeOp::Delete {
                at: header.pos,
                count: header.count(line_no, header.len1)?,
            },
            Kind::Replace => {
                let delete = header.count(line_no, header.len1)?;
                ChangeOp::Replace {
                    at: header.pos,
                    delete,
                    lines: take(header.count(line_no, header.len2)?)?,
                }
            }
        };
        ops.push(op);
    }

    Ok(ChangeScript::new(ops))
}

#[derive(Debug, Clone, Copy)]
enum Kind {
    Insert,
    Delete,
    Replace,
}

#[derive(Debug)]
struct Header {
    kind: Kind,
    pos: usize,
    len1: i64,
    len2: i64,
}

impl Header {
    fn parse(line_no: usize, line: &str) -> Result<Self, DecodeError> {
        let malformed = || DecodeError::MalformedHeader {
            line: line_no,
            header: line.to_string(),
        };

        let fields: Vec<&str> = line.split_whitespace().collect();
        let [tag, pos, len1, len2] = fields[..] else {
            return Err(malformed());
        };
        let kind = match tag.strip_prefix(HEADER_PREFIX).ok_or_else(malformed)? {
            "i" => Kind::Insert,
            "d" => Kind::Delete,
            "r" => Kind::Replace,
            other => {
                return Err(DecodeError::UnknownOperation {
                    line: line_no,
                    kind: other.to_string(),
                })
            }
        };

        let int = |field: &str| -> Result<i64, DecodeError> {
            field.parse::<i64>().map_err(|_| DecodeError::InvalidField {
                line: line_no,
                field: field.to_string(),
            })
        };
        let pos = int(pos)?;
        let header = Header {
            kind,
            pos: usize::try_from(pos).map_err(|_| DecodeError::InvalidField {
                line: line_no,
                field: pos.to_string(),
            })?,
            len1: int(len1)?,
            len2: int(len2)?,
        };
        Ok(header)
    }

    fn count(&self, line_no: usize, value: i64) -> Result<usize, DecodeError> {
        usize::try_from(value).map_err(|_| DecodeError::InvalidField {
            line: line_no,
            field: value.to_string(),
        })
    }
}
