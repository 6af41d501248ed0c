//! Client for the F2B code-generation progress stream.
//!
//! A generation job is started with a single request; the server then reports
//! progress as server-sent events. This crate parses that stream, maps status
//! phrases onto a fixed set of pipeline steps, and keeps one session's state in
//! a [`SessionController`].
//!
//! # Usage
//!
//! ```no_run
//! use f2b_client::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), ClientError> {
//! let transport = HttpTransport::from_env()?;
//! let mut controller = SessionController::new();
//! controller
//!     .launch(&transport, &GenerationRequest::new("https://github.com/acme/shop"))
//!     .await?;
//!
//! while let Some(update) = controller.next_update().await {
//!     println!("{update:?} -> {}", controller.snapshot().current_step_label());
//! }
//! # Ok(())
//! # }
//! ```

/// Archive download for finished jobs.
pub mod artifact;
/// Connection settings and environment loading.
pub mod config;
/// Public error types.
pub mod errors;
/// Typed events decoded from frames.
pub mod event;
/// Incremental SSE frame parsing.
pub mod frame;
/// Logging initialization.
pub mod observability;
/// Common imports for typical usage.
pub mod prelude;
/// Pipeline step states and the status phrase table.
pub mod progress;
/// Session controller, handles and snapshots.
pub mod session;
/// Job start and chunk stream transports.
pub mod transport;

#[cfg(test)]
mod test_support;

pub use artifact::ArtifactFetcher;
pub use config::ClientConfig;
pub use errors::{ClientError, DecodeFailure, SessionError, TransportError};
pub use event::{DecodedEvent, EndpointRecord, EventKind, SessionResult, decode};
pub use frame::{Frame, ParseOutput};
pub use observability::init_observability;
pub use progress::{ProgressStep, ProgressSteps, StepId, StepState};
pub use session::{
    AbortHandle, Delivery, SessionController, SessionHandle, SessionPhase, SessionSnapshot,
    SessionToken, SessionUpdate,
};
pub use transport::{ChunkStream, GenerationRequest, HttpTransport, JobTransport};
