//! Fixtures shared by the unit tests: an in-process HTTP server and
//! hand-driven transports.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::channel::mpsc as fmpsc;
use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use crate::config::ClientConfig;
use crate::errors::TransportError;
use crate::transport::{ChunkStream, GenerationRequest, JobTransport};

/// Raw HTTP response bytes, written piece by piece with a flush in between.
pub(crate) struct FixtureResponse {
    pieces: Vec<Vec<u8>>,
}

impl From<Vec<u8>> for FixtureResponse {
    fn from(value: Vec<u8>) -> Self {
        Self {
            pieces: vec![value],
        }
    }
}

/// `200 OK` event-stream response whose body arrives as `parts`.
pub(crate) fn sse_response(parts: &[&str]) -> FixtureResponse {
    body_response("text/event-stream", parts.iter().map(|p| p.as_bytes().to_vec()))
}

/// `200 OK` response of `content_type` whose body arrives as `parts`.
pub(crate) fn body_response(
    content_type: &str,
    parts: impl IntoIterator<Item = Vec<u8>>,
) -> FixtureResponse {
    let head = format!(
        "HTTP/1.1 200 OK\r\ncontent-type: {content_type}\r\nconnection: close\r\n\r\n"
    );
    let mut pieces = vec![head.into_bytes()];
    pieces.extend(parts);
    FixtureResponse { pieces }
}

/// Single-connection HTTP server on an ephemeral local port.
pub(crate) struct HttpFixture {
    base_url: String,
    request_rx: oneshot::Receiver<String>,
}

impl HttpFixture {
    pub async fn serve(response: FixtureResponse) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind fixture");
        let addr = listener.local_addr().expect("fixture addr");
        let (request_tx, request_rx) = oneshot::channel();
        tokio::spawn(async move {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let request = read_request(&mut socket).await;
            let _ = request_tx.send(request);
            for piece in response.pieces {
                if socket.write_all(&piece).await.is_err() {
                    return;
                }
                let _ = socket.flush().await;
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            let _ = socket.shutdown().await;
        });
        Self {
            base_url: format!("http://{addr}"),
            request_rx,
        }
    }

    /// Base URL of a port nothing listens on.
    pub async fn unused_base_url() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind probe");
        let addr = listener.local_addr().expect("probe addr");
        drop(listener);
        format!("http://{addr}")
    }

    pub fn config(&self) -> ClientConfig {
        ClientConfig::new(self.base_url.clone()).without_system_proxy()
    }

    /// The raw request text the fixture received.
    pub async fn request(self) -> String {
        self.request_rx.await.expect("fixture saw a request")
    }
}

async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0_u8; 4096];
    loop {
        let n = socket.read(&mut chunk).await.unwrap_or(0);
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(head_end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..head_end]).to_ascii_lowercase();
            let body_len = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|value| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= head_end + 4 + body_len {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Sending half of a hand-driven [`ChunkStream`].
#[derive(Clone)]
pub(crate) struct ChunkFeed {
    tx: fmpsc::UnboundedSender<Result<String, TransportError>>,
}

impl ChunkFeed {
    pub fn send(&self, chunk: &str) -> bool {
        self.tx.unbounded_send(Ok(chunk.to_string())).is_ok()
    }

    pub fn fail(&self, message: &str) -> bool {
        self.tx
            .unbounded_send(Err(TransportError::transport(message)))
            .is_ok()
    }

    /// Ends the stream cleanly.
    pub fn close(&self) {
        self.tx.close_channel();
    }

    /// True once the reading side has been dropped.
    pub fn is_released(&self) -> bool {
        self.tx.is_closed()
    }

    /// Waits (bounded) until the reading side has been dropped.
    pub async fn released(&self) -> bool {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !self.is_released() {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .is_ok()
    }
}

pub(crate) fn chunk_feed() -> (ChunkFeed, ChunkStream) {
    let (tx, rx) = fmpsc::unbounded();
    (ChunkFeed { tx }, Box::pin(rx))
}

/// [`JobTransport`] that hands out pre-built streams or rejects.
pub(crate) struct ScriptedTransport {
    streams: Mutex<Vec<ChunkStream>>,
    rejection: Option<TransportError>,
    pub calls: AtomicUsize,
}

impl ScriptedTransport {
    pub fn accepting(streams: Vec<ChunkStream>) -> Self {
        Self {
            streams: Mutex::new(streams),
            rejection: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn rejecting(error: TransportError) -> Self {
        Self {
            streams: Mutex::new(Vec::new()),
            rejection: Some(error),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl JobTransport for ScriptedTransport {
    async fn open(&self, _request: &GenerationRequest) -> Result<ChunkStream, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = &self.rejection {
            return Err(err.clone());
        }
        let mut streams = self.streams.lock().expect("streams lock");
        if streams.is_empty() {
            return Err(TransportError::transport("no scripted stream left"));
        }
        Ok(streams.remove(0))
    }
}
