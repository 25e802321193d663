use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::Mutex;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::error::FramingError;

use super::TransportBackend;

type BoxedSink = Pin<Box<dyn Sink<Message, Error = WsError> + Send>>;
type BoxedStream = Pin<Box<dyn Stream<Item = Result<Message, WsError>> + Send>>;

/// One frame per WebSocket message — spec §6.1 lists the WS transport as
/// "Block framing", which here means the WS message boundary already is
/// the frame boundary; no extra length prefix is layered on top of it.
#[derive(Clone)]
pub struct WebSocketTransport {
    inner: Arc<Inner>,
}

struct Inner {
    sink: Mutex<BoxedSink>,
    stream: Mutex<BoxedStream>,
    closed: AtomicBool,
}

impl WebSocketTransport {
    pub fn new<S>(ws: WebSocketStream<S>) -> Self
    where
        S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
    {
        let (sink, stream) = ws.split();
        Self {
            inner: Arc::new(Inner {
                sink: Mutex::new(Box::pin(sink)),
                stream: Mutex::new(Box::pin(stream)),
                closed: AtomicBool::new(false),
            }),
        }
    }
}

impl TransportBackend for WebSocketTransport {
    async fn send_frame(&self, payload: &[u8]) -> Result<(), FramingError> {
        if self.is_closed() {
            return Err(FramingError::Closed);
        }
        let mut sink = self.inner.sink.lock().await;
        let result = sink.send(Message::Binary(payload.to_vec().into())).await;
        if result.is_err() {
            self.close();
        }
        result.map_err(|e| FramingError::Io(std::io::Error::other(e.to_string())))
    }

    async fn recv_frame(&self) -> Result<Vec<u8>, FramingError> {
        if self.is_closed() {
            return Err(FramingError::Closed);
        }
        let mut stream = self.inner.stream.lock().await;
        loop {
            match stream.next().await {
                Some(Ok(Message::Binary(bytes))) => return Ok(bytes.to_vec()),
                Some(Ok(Message::Text(text))) => return Ok(text.as_bytes().to_vec()),
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                Some(Ok(Message::Close(_))) | None => {
                    self.close();
                    return Err(FramingError::Closed);
                }
                Some(Ok(Message::Frame(_))) => continue,
                Some(Err(e)) => {
                    self.close();
                    return Err(FramingError::Io(std::io::Error::other(e.to_string())));
                }
            }
        }
    }

    fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
    }

    fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}
