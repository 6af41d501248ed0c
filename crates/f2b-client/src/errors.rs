/// Errors raised by a [`JobTransport`](crate::transport::JobTransport) while
/// starting a job or reading its stream.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The server refused the job-start request (non-success HTTP status).
    #[error("job rejected with status {status_code}: {message}")]
    Rejected { status_code: u16, message: String },
    /// Connection or stream I/O failed.
    #[error("transport error: {message}")]
    Transport { message: String },
}

impl TransportError {
    /// Creates a rejection error.
    pub fn rejected(status_code: u16, message: impl Into<String>) -> Self {
        Self::Rejected {
            status_code,
            message: message.into(),
        }
    }

    /// Creates a transport-level error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Returns the human-readable message for this error.
    pub fn message(&self) -> &str {
        match self {
            Self::Rejected { message, .. } | Self::Transport { message } => message,
        }
    }
}

/// Why a single frame could not be turned into a [`DecodedEvent`](crate::event::DecodedEvent).
///
/// Decode failures never end a session; the frame is reported and skipped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, serde::Serialize)]
pub enum DecodeFailure {
    /// The `data:` payload was not valid JSON or had the wrong shape.
    #[error("invalid `{event_type}` payload: {message}")]
    InvalidJson { event_type: String, message: String },
    /// A field the event kind depends on was absent.
    #[error("`{event_type}` payload is missing `{field}`")]
    MissingField {
        event_type: String,
        field: &'static str,
    },
    /// The frame's `event:` name is not one this client understands.
    #[error("unknown event type `{event_type}`")]
    UnknownEventType { event_type: String },
}

impl DecodeFailure {
    /// Returns the event type of the frame that failed to decode.
    pub fn event_type(&self) -> &str {
        match self {
            Self::InvalidJson { event_type, .. }
            | Self::MissingField { event_type, .. }
            | Self::UnknownEventType { event_type } => event_type,
        }
    }
}

/// Terminal failure recorded on a session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, serde::Serialize)]
pub enum SessionError {
    /// The server sent an `error` event.
    #[error("{0}")]
    Server(String),
    /// The stream broke or closed before a terminal event arrived.
    #[error("connection lost: {0}")]
    Transport(String),
}

impl SessionError {
    /// Returns the message without the category prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::Server(message) | Self::Transport(message) => message,
        }
    }
}

/// Top-level error type for the public client API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// Invalid client configuration.
    #[error("config error: {0}")]
    Config(String),
    /// Invalid caller input.
    #[error("validation error: {0}")]
    Validation(String),
    /// Job start or artifact download failed at the transport level.
    #[error(transparent)]
    Transport(TransportError),
    /// Local filesystem failure while saving an artifact.
    #[error("io error: {0}")]
    Io(String),
    /// The server answered with something the client cannot use.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl From<TransportError> for ClientError {
    fn from(value: TransportError) -> Self {
        ClientError::Transport(value)
    }
}

impl From<std::io::Error> for ClientError {
    fn from(value: std::io::Error) -> Self {
        ClientError::Io(value.to_string())
    }
}
