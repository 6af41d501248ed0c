//! Session lifecycle: one live progress stream at a time.
//!
//! [`SessionController`] owns the aggregate [`SessionSnapshot`] and at most one
//! [`StreamSession`]. Each started session gets a reader task that owns the
//! transport stream and forwards [`Delivery`] values over a bounded channel;
//! the controller applies them in arrival order from [`SessionController::next_update`]
//! (or directly through [`SessionController::deliver`]). Deliveries tagged with
//! a superseded or terminal session's token are dropped.

use std::collections::VecDeque;
use std::fmt;

use futures::StreamExt as _;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::errors::{ClientError, DecodeFailure, SessionError, TransportError};
use crate::event::{DecodedEvent, EndpointRecord, SessionResult, decode};
use crate::frame;
use crate::progress::ProgressSteps;
use crate::transport::{ChunkStream, GenerationRequest, JobTransport};

const DEFAULT_DELIVERY_CAPACITY: usize = 128;

/// Identifies one session; tokens increase monotonically per controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SessionToken(u64);

impl SessionToken {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a transport reader hands to the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// More stream text.
    Chunk(String),
    /// The transport failed out-of-band.
    Failed(TransportError),
    /// The transport reached end of stream.
    Ended,
    /// The session's abort handle fired.
    Aborted,
}

/// Handle used to request cancellation of a running session's transport.
#[derive(Clone, Debug)]
pub struct AbortHandle {
    tx: watch::Sender<bool>,
}

impl AbortHandle {
    fn new() -> (Self, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        (Self { tx }, rx)
    }

    /// Requests that the transport be closed. Safe to call repeatedly.
    pub fn abort(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_aborted(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Caller-side handle for a started session.
#[derive(Clone, Debug)]
pub struct SessionHandle {
    token: SessionToken,
    abort: AbortHandle,
}

impl SessionHandle {
    pub fn token(&self) -> SessionToken {
        self.token
    }

    /// Cancels the session from any task. The controller observes it as
    /// [`SessionUpdate::Cancelled`].
    pub fn abort(&self) {
        self.abort.abort();
    }
}

/// Notification produced while applying deliveries.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    /// A status phrase moved the pipeline; carries the new current-step label.
    StepsChanged { status: String, current: &'static str },
    /// A status phrase left the steps as they were.
    StatusUnchanged { status: String },
    /// The endpoint list was replaced.
    EndpointsReplaced { count: usize },
    /// Terminal: the job produced its artifact.
    Completed(SessionResult),
    /// Terminal: the server or the transport reported a failure.
    Failed(SessionError),
    /// Terminal: the server ended the stream without a result.
    Ended,
    /// Terminal: the session was aborted through its handle.
    Cancelled,
    /// A frame could not be decoded and was skipped.
    DecodeFailed(DecodeFailure),
}

impl SessionUpdate {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed(_) | Self::Failed(_) | Self::Ended | Self::Cancelled
        )
    }
}

/// Coarse lifecycle phase derived from a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// No session was ever started.
    Idle,
    Running,
    Completed,
    Failed,
    /// Ended, cancelled or superseded without a result or error.
    Ended,
}

/// Aggregate state exposed to the UI layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    /// Token of the most recent session, if any.
    pub token: Option<SessionToken>,
    pub steps: ProgressSteps,
    pub endpoints: Vec<EndpointRecord>,
    pub result: Option<SessionResult>,
    pub error: Option<SessionError>,
    pub is_active: bool,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            token: None,
            steps: ProgressSteps::initial(),
            endpoints: Vec::new(),
            result: None,
            error: None,
            is_active: false,
        }
    }
}

impl SessionSnapshot {
    fn fresh(token: SessionToken) -> Self {
        Self {
            token: Some(token),
            is_active: true,
            ..Self::default()
        }
    }

    /// Label of the first active step, or the waiting placeholder.
    pub fn current_step_label(&self) -> &'static str {
        self.steps.current_label()
    }

    pub fn phase(&self) -> SessionPhase {
        if self.token.is_none() {
            SessionPhase::Idle
        } else if self.is_active {
            SessionPhase::Running
        } else if self.result.is_some() {
            SessionPhase::Completed
        } else if self.error.is_some() {
            SessionPhase::Failed
        } else {
            SessionPhase::Ended
        }
    }
}

/// One in-flight generation stream.
struct StreamSession {
    token: SessionToken,
    buffer: String,
    terminal: bool,
    abort: AbortHandle,
    deliveries: Option<mpsc::Receiver<Delivery>>,
}

impl StreamSession {
    /// Marks the session terminal and releases its transport.
    fn close(&mut self) {
        self.terminal = true;
        self.abort.abort();
        self.deliveries = None;
        self.buffer.clear();
    }
}

/// Owns the single active session and the state it drives.
pub struct SessionController {
    snapshot: SessionSnapshot,
    session: Option<StreamSession>,
    next_token: u64,
    delivery_capacity: usize,
    pending: VecDeque<SessionUpdate>,
}

impl Default for SessionController {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionController {
    pub fn new() -> Self {
        Self::with_buffer_capacity(DEFAULT_DELIVERY_CAPACITY)
    }

    /// Creates a controller whose reader tasks buffer at most `capacity`
    /// undelivered chunks.
    pub fn with_buffer_capacity(capacity: usize) -> Self {
        Self {
            snapshot: SessionSnapshot::default(),
            session: None,
            next_token: 0,
            delivery_capacity: capacity.max(1),
            pending: VecDeque::new(),
        }
    }

    pub fn snapshot(&self) -> &SessionSnapshot {
        &self.snapshot
    }

    pub fn is_active(&self) -> bool {
        self.snapshot.is_active
    }

    pub fn current_token(&self) -> Option<SessionToken> {
        self.session.as_ref().map(|s| s.token)
    }

    /// Sends the job-start request and, once accepted, starts consuming its
    /// stream. A rejected request leaves the controller untouched.
    pub async fn launch<T>(
        &mut self,
        transport: &T,
        request: &GenerationRequest,
    ) -> Result<SessionHandle, ClientError>
    where
        T: JobTransport + ?Sized,
    {
        request.validate()?;
        let stream = transport.open(request).await?;
        info!(request_id = %request.request_id, repo = %request.repo_url, "generation job accepted");
        Ok(self.start(stream))
    }

    /// Supersedes any current session and starts consuming `stream`.
    ///
    /// Returns immediately; deliveries are applied by [`Self::next_update`].
    /// Must be called from within a tokio runtime.
    pub fn start(&mut self, stream: ChunkStream) -> SessionHandle {
        self.supersede();

        self.next_token += 1;
        let token = SessionToken(self.next_token);
        let (abort, abort_rx) = AbortHandle::new();
        let (tx, rx) = mpsc::channel(self.delivery_capacity);

        self.session = Some(StreamSession {
            token,
            buffer: String::new(),
            terminal: false,
            abort: abort.clone(),
            deliveries: Some(rx),
        });
        self.snapshot = SessionSnapshot::fresh(token);
        self.pending.clear();

        tokio::spawn(pump_transport(token, stream, tx, abort_rx));
        info!(session = %token, "session started");

        SessionHandle { token, abort }
    }

    /// Terminates the current session and requests its transport to close.
    /// No-op when there is no live session.
    pub fn cancel(&mut self) {
        let Some(session) = self.session.as_mut().filter(|s| !s.terminal) else {
            return;
        };
        session.close();
        self.snapshot.is_active = false;
        info!(session = %session.token, "session cancelled");
    }

    /// Waits for the next update of the current session.
    ///
    /// Returns `None` once the session is terminal and every update has been
    /// handed out, or when no session was started.
    pub async fn next_update(&mut self) -> Option<SessionUpdate> {
        loop {
            if let Some(update) = self.pending.pop_front() {
                return Some(update);
            }
            let session = self.session.as_mut().filter(|s| !s.terminal)?;
            let token = session.token;
            let abort = session.abort.clone();
            let rx = session.deliveries.as_mut()?;
            let delivery = match rx.recv().await {
                Some(delivery) => delivery,
                None if abort.is_aborted() => Delivery::Aborted,
                None => Delivery::Failed(TransportError::transport("transport reader stopped")),
            };
            let updates = self.deliver(token, delivery);
            self.pending.extend(updates);
        }
    }

    /// Applies one delivery for `token` and returns the resulting updates.
    ///
    /// Deliveries for a superseded or terminal session change nothing.
    pub fn deliver(&mut self, token: SessionToken, delivery: Delivery) -> Vec<SessionUpdate> {
        let Some(session) = self
            .session
            .as_mut()
            .filter(|s| s.token == token && !s.terminal)
        else {
            debug!(session = %token, "dropping stale delivery");
            return Vec::new();
        };

        // Once the handle fired, anything still queued behind it is discarded.
        let delivery = if session.abort.is_aborted() {
            Delivery::Aborted
        } else {
            delivery
        };

        let mut updates = Vec::new();
        match delivery {
            Delivery::Chunk(text) => {
                let parsed = frame::parse(&session.buffer, &text);
                session.buffer = parsed.remainder;
                for frame in parsed.frames {
                    if session.terminal {
                        debug!(session = %token, event_type = %frame.event_type, "ignoring frame after terminal event");
                        continue;
                    }
                    match decode(&frame) {
                        Ok(event) => {
                            updates.push(dispatch(&mut self.snapshot, session, event));
                        }
                        Err(failure) => {
                            warn!(session = %token, event_type = %failure.event_type(), error = %failure, "skipping undecodable frame");
                            updates.push(SessionUpdate::DecodeFailed(failure));
                        }
                    }
                }
            }
            Delivery::Failed(err) => {
                warn!(session = %token, error = %err, "transport failed");
                updates.push(fail(
                    &mut self.snapshot,
                    session,
                    SessionError::Transport(err.message().to_string()),
                ));
            }
            Delivery::Ended => {
                warn!(session = %token, "stream closed before a terminal event");
                updates.push(fail(
                    &mut self.snapshot,
                    session,
                    SessionError::Transport("stream closed before completion".into()),
                ));
            }
            Delivery::Aborted => {
                session.close();
                self.snapshot.is_active = false;
                info!(session = %token, "session aborted by handle");
                updates.push(SessionUpdate::Cancelled);
            }
        }
        updates
    }

    fn supersede(&mut self) {
        if let Some(mut previous) = self.session.take()
            && !previous.terminal
        {
            previous.close();
            info!(session = %previous.token, "session superseded");
        }
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.cancel();
    }
}

fn dispatch(
    snapshot: &mut SessionSnapshot,
    session: &mut StreamSession,
    event: DecodedEvent,
) -> SessionUpdate {
    match event {
        DecodedEvent::Status(status) => {
            let next = snapshot.steps.apply(&status);
            if next == snapshot.steps {
                debug!(session = %session.token, %status, "status left steps unchanged");
                SessionUpdate::StatusUnchanged { status }
            } else {
                snapshot.steps = next;
                let current = snapshot.steps.current_label();
                debug!(session = %session.token, %status, current, "steps advanced");
                SessionUpdate::StepsChanged { status, current }
            }
        }
        DecodedEvent::Endpoints(endpoints) => {
            let count = endpoints.len();
            snapshot.endpoints = endpoints;
            debug!(session = %session.token, count, "endpoint list replaced");
            SessionUpdate::EndpointsReplaced { count }
        }
        DecodedEvent::Completed(result) => {
            snapshot.steps = snapshot.steps.completed();
            snapshot.result = Some(result.clone());
            snapshot.is_active = false;
            session.close();
            info!(session = %session.token, project = %result.project_name, artifact = %result.artifact_locator, "generation completed");
            SessionUpdate::Completed(result)
        }
        DecodedEvent::Error(message) => fail(snapshot, session, SessionError::Server(message)),
        DecodedEvent::StreamEnd => {
            snapshot.is_active = false;
            session.close();
            info!(session = %session.token, "server ended the stream");
            SessionUpdate::Ended
        }
    }
}

fn fail(
    snapshot: &mut SessionSnapshot,
    session: &mut StreamSession,
    error: SessionError,
) -> SessionUpdate {
    warn!(session = %session.token, error = %error, "generation failed");
    snapshot.error = Some(error.clone());
    snapshot.is_active = false;
    session.close();
    SessionUpdate::Failed(error)
}

/// Reads the transport until it ends, fails, or the session is aborted.
/// The stream is dropped on every exit path.
async fn pump_transport(
    token: SessionToken,
    mut stream: ChunkStream,
    tx: mpsc::Sender<Delivery>,
    mut abort_rx: watch::Receiver<bool>,
) {
    debug!(session = %token, "transport reader started");
    loop {
        tokio::select! {
            biased;
            changed = abort_rx.changed() => {
                // A dropped sender means the owning session is gone.
                if changed.is_err() || *abort_rx.borrow() {
                    let _ = tx.try_send(Delivery::Aborted);
                    break;
                }
            }
            next = stream.next() => {
                let (delivery, finished) = match next {
                    Some(Ok(chunk)) => (Delivery::Chunk(chunk), false),
                    Some(Err(err)) => (Delivery::Failed(err), true),
                    None => (Delivery::Ended, true),
                };
                if tx.send(delivery).await.is_err() || finished {
                    break;
                }
            }
        }
    }
    drop(stream);
    debug!(session = %token, "transport reader released");
}
