//! Job start and raw stream delivery.
//!
//! The session layer only needs "next text chunk, or end, or error", expressed
//! as a [`ChunkStream`]. [`HttpTransport`] provides one over `reqwest`.

use std::pin::Pin;

use futures::StreamExt as _;
use futures::stream;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::errors::{ClientError, TransportError};

/// Text chunks of a progress stream in arrival order.
pub type ChunkStream =
    Pin<Box<dyn futures::Stream<Item = Result<String, TransportError>> + Send + 'static>>;

type ByteStream =
    Pin<Box<dyn futures::Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send + 'static>>;

/// A request to generate a backend for one repository.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GenerationRequest {
    /// Repository locator, passed to the server untouched.
    pub repo_url: String,
    /// Correlation id sent as `X-Request-ID`.
    pub request_id: uuid::Uuid,
}

impl GenerationRequest {
    pub fn new(repo_url: impl Into<String>) -> Self {
        Self {
            repo_url: repo_url.into(),
            request_id: uuid::Uuid::new_v4(),
        }
    }

    /// Only checks that a locator is present; its content is the server's concern.
    pub fn validate(&self) -> Result<(), ClientError> {
        if self.repo_url.trim().is_empty() {
            return Err(ClientError::Validation(
                "repository url must not be empty".into(),
            ));
        }
        Ok(())
    }

    pub(crate) fn body(&self) -> serde_json::Value {
        serde_json::json!({ "url": self.repo_url.trim() })
    }
}

/// Starts a generation job and hands back its progress stream.
#[async_trait::async_trait]
pub trait JobTransport: Send + Sync {
    /// Issues the job-start call. `Ok` means the server accepted the job and
    /// the returned stream will carry its events.
    async fn open(&self, request: &GenerationRequest) -> Result<ChunkStream, TransportError>;
}

/// [`JobTransport`] that POSTs to `/stream-code-gen` and reads the SSE body.
pub struct HttpTransport {
    client: reqwest::Client,
    config: ClientConfig,
}

impl HttpTransport {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        config.validate()?;
        let client = config.http_client()?;
        Ok(Self { client, config })
    }

    /// Creates a transport from `F2B_*` environment variables.
    pub fn from_env() -> Result<Self, ClientError> {
        Self::new(ClientConfig::from_env()?)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}

#[async_trait::async_trait]
impl JobTransport for HttpTransport {
    async fn open(&self, request: &GenerationRequest) -> Result<ChunkStream, TransportError> {
        let url = self.config.stream_url();
        debug!(request_id = %request.request_id, %url, "starting generation stream");

        let response = self
            .client
            .post(&url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .header("X-Request-ID", request.request_id.to_string())
            .json(&request.body())
            .send()
            .await
            .map_err(|e| TransportError::transport(format!("job start request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            warn!(request_id = %request.request_id, status = status.as_u16(), "generation job rejected");
            return Err(TransportError::rejected(
                status.as_u16(),
                format!("{status}: {}", body.trim()),
            ));
        }

        Ok(text_chunks(Box::pin(response.bytes_stream())))
    }
}

fn text_chunks(bytes_stream: ByteStream) -> ChunkStream {
    struct State {
        bytes_stream: ByteStream,
        decoder: Utf8ChunkDecoder,
        done: bool,
    }

    let stream = stream::try_unfold(
        State {
            bytes_stream,
            decoder: Utf8ChunkDecoder::default(),
            done: false,
        },
        |mut state| async move {
            loop {
                if state.done {
                    return Ok(None);
                }
                match state.bytes_stream.next().await {
                    Some(Ok(chunk)) => {
                        let text = state.decoder.push(&chunk);
                        if text.is_empty() {
                            continue;
                        }
                        return Ok(Some((text, state)));
                    }
                    Some(Err(e)) => {
                        return Err(TransportError::transport(format!(
                            "stream read failed: {e}"
                        )));
                    }
                    None => {
                        state.done = true;
                        if let Some(tail) = state.decoder.finish() {
                            return Ok(Some((tail, state)));
                        }
                    }
                }
            }
        },
    );
    Box::pin(stream)
}

/// Turns byte chunks into text without splitting multi-byte characters.
///
/// Incomplete trailing sequences are held back until the next chunk; invalid
/// sequences become U+FFFD.
#[derive(Debug, Default)]
pub(crate) struct Utf8ChunkDecoder {
    pending: Vec<u8>,
}

impl Utf8ChunkDecoder {
    pub fn push(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);
        let mut out = String::new();
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    return out;
                }
                Err(err) => {
                    let valid = err.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match err.error_len() {
                        None => {
                            self.pending.drain(..valid);
                            return out;
                        }
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + len);
                        }
                    }
                }
            }
        }
    }

    /// Flushes whatever is still held back at end of stream.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let tail = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        Some(tail)
    }
}
