//! Common imports for driving a generation session.
pub use crate::{
    ArtifactFetcher, ClientConfig, ClientError, EndpointRecord, GenerationRequest, HttpTransport,
    JobTransport, SessionController, SessionError, SessionHandle, SessionPhase, SessionResult,
    SessionSnapshot, SessionUpdate, StepId, StepState,
};
