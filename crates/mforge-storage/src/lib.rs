//! Blob storage for MediaForge job inputs and artifacts.
//!
//! This crate provides:
//! - The `BlobStore` capability (put by key, read by URI)
//! - An S3-compatible backend with optional CDN addressing
//! - A local filesystem backend served under `/static`
//! - The object key layout

pub mod error;
pub mod keys;
pub mod local;
pub mod s3;
pub mod store;

pub use error::{StorageError, StorageResult};
pub use keys::content_type_for;
pub use local::LocalBlobStore;
pub use s3::{S3BlobStore, S3Config};
pub use store::BlobStore;
