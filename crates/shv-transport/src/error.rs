use std::fmt;

/// Failures the framing layer surfaces to its caller.
///
/// Note what's *not* here: a CRC mismatch on `SerialCrc` framing and a
/// mid-frame `ATX` abort are both recovered from silently inside
/// `read_frame` (spec §4.3) — they never reach this type. Only conditions
/// the reader truly can't recover from on its own do.
#[derive(Debug)]
pub enum FramingError {
    Io(std::io::Error),
    /// The link was closed cleanly (EOF with no partial frame pending).
    Closed,
    /// An unsolicited `STX ATX ETX` RESET sequence — spec §4.3 says this
    /// "aborts the peer state machine and is delivered to the broker as a
    /// disconnect indication on that link".
    PeerReset,
}

impl fmt::Display for FramingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FramingError::Io(e) => write!(f, "transport I/O error: {e}"),
            FramingError::Closed => write!(f, "transport closed"),
            FramingError::PeerReset => write!(f, "peer sent a RESET frame"),
        }
    }
}

impl std::error::Error for FramingError {}

impl From<std::io::Error> for FramingError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            FramingError::Closed
        } else {
            FramingError::Io(e)
        }
    }
}

/// Errors from parsing or dispatching a `scheme://...` SHV connection URL
/// (spec §6.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlError {
    MissingScheme,
    UnknownScheme(String),
    MissingAuthority,
    MissingPath,
    InvalidPort,
}

impl fmt::Display for UrlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UrlError::MissingScheme => write!(f, "URL has no scheme"),
            UrlError::UnknownScheme(s) => write!(f, "unrecognized URL scheme {s:?}"),
            UrlError::MissingAuthority => write!(f, "URL is missing a host"),
            UrlError::MissingPath => write!(f, "URL is missing a path"),
            UrlError::InvalidPort => write!(f, "URL port is not a valid number"),
        }
    }
}

impl std::error::Error for UrlError {}

/// A transport-level error not specific to framing (connect/bind/TLS).
#[derive(Debug)]
pub enum TransportError {
    Io(std::io::Error),
    Url(UrlError),
    Closed,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Io(e) => write!(f, "{e}"),
            TransportError::Url(e) => write!(f, "{e}"),
            TransportError::Closed => write!(f, "transport closed"),
        }
    }
}

impl std::error::Error for TransportError {}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        TransportError::Io(e)
    }
}

impl From<UrlError> for TransportError {
    fn from(e: UrlError) -> Self {
        TransportError::Url(e)
    }
}

impl From<FramingError> for TransportError {
    fn from(e: FramingError) -> Self {
        match e {
            FramingError::Io(e) => TransportError::Io(e),
            FramingError::Closed => TransportError::Closed,
            FramingError::PeerReset => TransportError::Closed,
        }
    }
}
