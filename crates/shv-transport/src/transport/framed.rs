use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;

use crate::error::FramingError;
use crate::framing::{self, Framing};

use super::TransportBackend;

/// A generic framing-over-byte-stream transport, shared by the Tcp, Unix,
/// Serial, and Pipe variants of [`crate::Transport`] — they differ only in
/// which concrete read/write halves they hold and which [`Framing`] kind
/// applies, grounded on the teacher's `MemTransport` idiom of wrapping
/// shared state behind an `Arc` so the transport stays cheaply `Clone`
/// (`crates/shv-transport/src/transport/mem.rs`).
#[derive(Clone)]
pub struct FramedTransport<R, W> {
    inner: Arc<Inner<R, W>>,
}

struct Inner<R, W> {
    framing: Framing,
    reader: Mutex<R>,
    writer: Mutex<W>,
    closed: AtomicBool,
}

impl<R, W> FramedTransport<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(framing: Framing, reader: R, writer: W) -> Self {
        Self {
            inner: Arc::new(Inner {
                framing,
                reader: Mutex::new(reader),
                writer: Mutex::new(writer),
                closed: AtomicBool::new(false),
            }),
        }
    }
}

impl<R, W> TransportBackend for FramedTransport<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    async fn send_frame(&self, payload: &[u8]) -> Result<(), FramingError> {
        if self.is_closed() {
            return Err(FramingError::Closed);
        }
        let mut w = self.inner.writer.lock().await;
        let result = framing::write_frame(self.inner.framing, &mut *w, payload).await;
        if result.is_err() {
            self.close();
        }
        result
    }

    async fn recv_frame(&self) -> Result<Vec<u8>, FramingError> {
        if self.is_closed() {
            return Err(FramingError::Closed);
        }
        let mut r = self.inner.reader.lock().await;
        let result = framing::read_frame(self.inner.framing, &mut *r).await;
        if matches!(result, Err(FramingError::Closed) | Err(FramingError::Io(_))) {
            self.close();
        }
        result
    }

    fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
    }

    fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}
