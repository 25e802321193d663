use std::fmt;

/// All failure modes the textual reader can hit, with the byte offset the
/// reader had reached. Mirrors `shv_chainpack::DecodeError`'s shape so the
/// two codecs present a symmetrical surface to callers that dispatch on
/// the first byte (§6.2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    UnexpectedEof,
    UnexpectedChar { pos: usize, found: char },
    InvalidNumber { pos: usize },
    InvalidEscape { pos: usize },
    InvalidUtf8 { pos: usize },
    MalformedDateTime { pos: usize },
    NestingTooDeep { pos: usize },
    TrailingBytes { pos: usize },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::UnexpectedEof => write!(f, "unexpected end of input"),
            DecodeError::UnexpectedChar { pos, found } => {
                write!(f, "unexpected character {found:?} at byte {pos}")
            }
            DecodeError::InvalidNumber { pos } => write!(f, "invalid number literal at byte {pos}"),
            DecodeError::InvalidEscape { pos } => write!(f, "invalid escape sequence at byte {pos}"),
            DecodeError::InvalidUtf8 { pos } => write!(f, "invalid UTF-8 at byte {pos}"),
            DecodeError::MalformedDateTime { pos } => {
                write!(f, "malformed datetime literal at byte {pos}")
            }
            DecodeError::NestingTooDeep { pos } => {
                write!(f, "container nesting exceeds the depth limit at byte {pos}")
            }
            DecodeError::TrailingBytes { pos } => write!(f, "trailing bytes after byte {pos}"),
        }
    }
}

impl std::error::Error for DecodeError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    MalformedDecimal,
    MalformedDateTime,
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodeError::MalformedDecimal => write!(f, "decimal value cannot be encoded"),
            EncodeError::MalformedDateTime => write!(f, "datetime value cannot be encoded"),
        }
    }
}

impl std::error::Error for EncodeError {}
