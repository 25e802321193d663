use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;

use crate::error::FramingError;

use super::TransportBackend;

const CHANNEL_CAPACITY: usize = 64;

/// An in-process pair of transports connected by bounded channels — no
/// codec, no framing, just raw frame bytes passed directly. Used by tests
/// that exercise the broker/RPC layers without a real socket, grounded on
/// the teacher's own `MemTransport` (`rapace-core/src/transport/mem.rs`).
#[derive(Clone)]
pub struct MemTransport {
    inner: Arc<InProcInner>,
}

struct InProcInner {
    tx: mpsc::Sender<Vec<u8>>,
    rx: tokio::sync::Mutex<mpsc::Receiver<Vec<u8>>>,
    closed: AtomicBool,
}

impl MemTransport {
    pub fn pair() -> (Self, Self) {
        let (tx_a, rx_a) = mpsc::channel(CHANNEL_CAPACITY);
        let (tx_b, rx_b) = mpsc::channel(CHANNEL_CAPACITY);

        let inner_a = Arc::new(InProcInner {
            tx: tx_b,
            rx: tokio::sync::Mutex::new(rx_a),
            closed: AtomicBool::new(false),
        });
        let inner_b = Arc::new(InProcInner {
            tx: tx_a,
            rx: tokio::sync::Mutex::new(rx_b),
            closed: AtomicBool::new(false),
        });

        (Self { inner: inner_a }, Self { inner: inner_b })
    }
}

impl TransportBackend for MemTransport {
    async fn send_frame(&self, payload: &[u8]) -> Result<(), FramingError> {
        if self.is_closed() {
            return Err(FramingError::Closed);
        }
        self.inner
            .tx
            .send(payload.to_vec())
            .await
            .map_err(|_| FramingError::Closed)
    }

    async fn recv_frame(&self) -> Result<Vec<u8>, FramingError> {
        if self.is_closed() {
            return Err(FramingError::Closed);
        }
        let mut rx = self.inner.rx.lock().await;
        rx.recv().await.ok_or(FramingError::Closed)
    }

    fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
    }

    fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Transport;

    #[tokio::test]
    async fn mem_pair_round_trips_frames() {
        let (a, b) = Transport::mem_pair();
        a.send_frame(b"hello").await.unwrap();
        let received = b.recv_frame().await.unwrap();
        assert_eq!(received, b"hello");
    }

    #[tokio::test]
    async fn closing_one_side_fails_the_other() {
        let (a, b) = Transport::mem_pair();
        a.close();
        assert!(a.send_frame(b"x").await.is_err());
        drop(a);
        assert!(b.recv_frame().await.is_err());
    }
}
