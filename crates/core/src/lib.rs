//! Core domain types for the nestrun job runner.
//!
//! Holds the job request model and its validation, the asset store
//! seam, and the SVG composition engine. No internal dependencies;
//! everything here is shared by the storage, browser, and worker
//! crates.

pub mod compose;
pub mod error;
pub mod job;
pub mod store;
