//! Automation surface for the remote nesting page.
//!
//! Drives a headless-browser-rendered nesting computation over the
//! Chrome DevTools Protocol: document uploads, the start/send-result
//! controls, live progress observation, and the convergence wait that
//! decides when the remote optimization is good enough to stop.

pub mod client;
pub mod convergence;
pub mod dom;
pub mod protocol;
pub mod session;
pub mod signal;

use async_trait::async_trait;

use crate::protocol::ProtocolError;
use crate::signal::SignalWatcher;

pub use convergence::{await_convergence, ConvergenceError, ConvergenceOutcome};
pub use session::{BrowserSession, CdpSurfaceProvider};
pub use signal::ProgressSignal;

/// The remote nesting page, reduced to the fixed contract the runner
/// needs: two file inputs, two controls, a progress feed, and the
/// persisted result artifact.
///
/// The session behind this trait is exclusively owned for the duration
/// of one job and must be [`close`](Self::close)d on every exit path.
#[async_trait]
pub trait NestingSurface: Send + Sync {
    /// Push the composed parts document into the parts file input.
    async fn upload_parts(&self, svg: &str) -> Result<(), SurfaceError>;

    /// Push the composed bin document into the bin file input.
    async fn upload_bin(&self, svg: &str) -> Result<(), SurfaceError>;

    /// Trigger the start control.
    async fn start(&self) -> Result<(), SurfaceError>;

    /// Subscribe to the live progress counters.
    ///
    /// Fails with [`SurfaceError::MissingElement`] without arming any
    /// observer if a counter element is absent.
    async fn watch_progress(&self) -> Result<SignalWatcher, SurfaceError>;

    /// Trigger the "send result" control, which makes the page persist
    /// the final artifact.
    async fn send_result(&self) -> Result<(), SurfaceError>;

    /// Read back the persisted result artifact, if the page produced
    /// one.
    async fn read_output(&self) -> Result<Option<String>, SurfaceError>;

    /// Capture a screenshot of the page, returned base64-encoded.
    async fn screenshot(&self) -> Result<String, SurfaceError>;

    /// Tear the session down. Idempotent.
    async fn close(&self) -> Result<(), SurfaceError>;
}

/// Acquires a fresh, exclusively-owned surface session for one job.
#[async_trait]
pub trait SurfaceProvider: Send + Sync {
    type Surface: NestingSurface;

    async fn provision(&self) -> Result<Self::Surface, SurfaceError>;
}

/// Errors from the automation surface.
#[derive(Debug, thiserror::Error)]
pub enum SurfaceError {
    /// Could not reach the DevTools endpoint or the connection dropped.
    #[error("DevTools connection error: {0}")]
    Connection(String),

    /// The DevTools HTTP endpoint returned a non-2xx status.
    #[error("DevTools endpoint returned {status}: {body}")]
    Endpoint { status: u16, body: String },

    /// The browser rejected a protocol command.
    #[error("CDP command {method} failed: {message}")]
    Command { method: String, message: String },

    /// An incoming frame could not be parsed.
    #[error("CDP protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// An outgoing command could not be encoded.
    #[error("failed to encode CDP command: {0}")]
    Encode(#[from] serde_json::Error),

    /// A selector from the page contract matched nothing.
    #[error("required element {0} not found on the nesting page")]
    MissingElement(String),

    /// Staging an upload file on disk failed.
    #[error("failed to stage upload file: {0}")]
    Staging(#[from] std::io::Error),
}
