//! Nesting job runner.
//!
//! Orchestrates one job end to end: validate the request, compose the
//! bin and parts documents, provision a browser surface, drive the
//! remote nesting page to convergence, and persist the result artifact.

pub mod config;
pub mod job;

pub use config::WorkerConfig;
pub use job::{run_job, JobError, JobOutcome};
