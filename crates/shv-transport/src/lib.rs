//! Message framing and byte-stream transports for SHV RPC (spec §4.3).
//!
//! This crate only moves opaque frame bytes around — it knows nothing
//! about ChainPack/CPON encoding or RPC message shape. A frame here is
//! just `Vec<u8>` in, `&[u8]` out.

pub mod error;
pub mod framing;
pub mod transport;
pub mod url;

pub use error::{FramingError, TransportError, UrlError};
pub use framing::Framing;
pub use transport::Transport;
pub use url::{connect, listen, ConnectUrl, Listener};
