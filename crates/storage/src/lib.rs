//! Asset store implementations.
//!
//! [`s3::S3AssetStore`] is the production backend; [`memory::MemoryAssetStore`]
//! backs unit and integration tests.

pub mod memory;
pub mod s3;

pub use memory::MemoryAssetStore;
pub use s3::S3AssetStore;
