//! Transport enum and internal backend trait.
//!
//! The public API is the [`Transport`] enum. Each backend lives in its own
//! module under `transport/` and implements the internal [`TransportBackend`]
//! trait; `enum_dispatch` forwards calls without handwritten `match`
//! boilerplate, mirroring the teacher's own `Transport`/`TransportBackend`
//! split (`rapace-core/src/transport.rs`).

use enum_dispatch::enum_dispatch;

use crate::error::FramingError;

pub mod framed;
pub mod mem;
#[cfg(feature = "websocket")]
pub mod websocket;

pub use framed::FramedTransport;

/// Any duplex byte stream, boxed so the Serial and Pipe backends don't
/// need a dedicated concrete stream type per platform — opening the
/// actual device (baud rate configuration, FIFO direction) is a
/// caller-supplied-stream extension point here, the same way `tcps://`/
/// `wss://` TLS is (see DESIGN.md).
pub type BoxedReader = Box<dyn tokio::io::AsyncRead + Unpin + Send>;
pub type BoxedWriter = Box<dyn tokio::io::AsyncWrite + Unpin + Send>;

#[enum_dispatch]
pub(crate) trait TransportBackend: Send + Sync {
    async fn send_frame(&self, payload: &[u8]) -> Result<(), FramingError>;
    async fn recv_frame(&self) -> Result<Vec<u8>, FramingError>;
    fn close(&self);
    fn is_closed(&self) -> bool;
}

#[enum_dispatch(TransportBackend)]
#[derive(Clone)]
pub enum Transport {
    #[cfg(feature = "tcp")]
    Tcp(FramedTransport<tokio::net::tcp::OwnedReadHalf, tokio::net::tcp::OwnedWriteHalf>),
    #[cfg(all(feature = "unix", unix))]
    Unix(FramedTransport<tokio::net::unix::OwnedReadHalf, tokio::net::unix::OwnedWriteHalf>),
    Serial(FramedTransport<BoxedReader, BoxedWriter>),
    Pipe(FramedTransport<BoxedReader, BoxedWriter>),
    /// `tcps://`/`wss://` land here: any caller-supplied TLS-wrapped
    /// stream, still Block-framed (spec §1 scopes TLS termination out of
    /// this core).
    Tls(FramedTransport<BoxedReader, BoxedWriter>),
    #[cfg(feature = "websocket")]
    WebSocket(websocket::WebSocketTransport),
    Mem(mem::MemTransport),
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            #[cfg(feature = "tcp")]
            Transport::Tcp(_) => "Tcp",
            #[cfg(all(feature = "unix", unix))]
            Transport::Unix(_) => "Unix",
            Transport::Serial(_) => "Serial",
            Transport::Pipe(_) => "Pipe",
            Transport::Tls(_) => "Tls",
            #[cfg(feature = "websocket")]
            Transport::WebSocket(_) => "WebSocket",
            Transport::Mem(_) => "Mem",
        };
        write!(f, "Transport::{name}")
    }
}

impl Transport {
    pub async fn send_frame(&self, payload: &[u8]) -> Result<(), FramingError> {
        TransportBackend::send_frame(self, payload).await
    }

    pub async fn recv_frame(&self) -> Result<Vec<u8>, FramingError> {
        TransportBackend::recv_frame(self).await
    }

    pub fn close(&self) {
        TransportBackend::close(self);
    }

    pub fn is_closed(&self) -> bool {
        TransportBackend::is_closed(self)
    }

    pub fn mem_pair() -> (Self, Self) {
        let (a, b) = mem::MemTransport::pair();
        (Transport::Mem(a), Transport::Mem(b))
    }

    #[cfg(feature = "tcp")]
    pub fn tcp(stream: tokio::net::TcpStream) -> Self {
        let _ = stream.set_nodelay(true);
        let (r, w) = stream.into_split();
        Transport::Tcp(FramedTransport::new(crate::framing::Framing::Block, r, w))
    }

    #[cfg(all(feature = "unix", unix))]
    pub fn unix(stream: tokio::net::UnixStream) -> Self {
        let (r, w) = stream.into_split();
        Transport::Unix(FramedTransport::new(crate::framing::Framing::Block, r, w))
    }

    /// Wraps any duplex byte stream as a Serial-CRC transport — the
    /// caller is responsible for opening and configuring the actual
    /// serial device (baud rate, parity, ...), which is platform-specific
    /// and out of this crate's scope.
    pub fn serial<S>(stream: S) -> Self
    where
        S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
    {
        let (r, w) = tokio::io::split(stream);
        Transport::Serial(FramedTransport::new(
            crate::framing::Framing::SerialCrc,
            Box::new(r),
            Box::new(w),
        ))
    }

    pub fn pipe<S>(stream: S) -> Self
    where
        S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
    {
        let (r, w) = tokio::io::split(stream);
        Transport::Pipe(FramedTransport::new(
            crate::framing::Framing::Block,
            Box::new(r),
            Box::new(w),
        ))
    }

    #[cfg(feature = "websocket")]
    pub fn websocket<S>(ws: tokio_tungstenite::WebSocketStream<S>) -> Self
    where
        S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
    {
        Transport::WebSocket(websocket::WebSocketTransport::new(ws))
    }

    /// `tcps://` resolves to the same Block-framed stream transport as
    /// `tcp://`, wrapped in whatever TLS boundary the caller supplies —
    /// spec §1 scopes TLS termination out of this core ("TLS, if used,
    /// sits beneath the transport").
    pub fn tcp_tls<S>(stream: S) -> Self
    where
        S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
    {
        let (r, w) = tokio::io::split(stream);
        Transport::Tls(FramedTransport::new(
            crate::framing::Framing::Block,
            Box::new(r),
            Box::new(w),
        ))
    }
}
