//! # Storage Adapters
//!
//! Durable bytes (blob store) and metadata rows (catalog) behind
//! injected trait handles. Production deployments supply their own
//! implementations; the in-memory ones back tests and single-process
//! runs.

pub mod blob;
pub mod catalog;

pub use blob::{BlobStore, LocalBlobStore, MemoryBlobStore, StoredBlob};
pub use catalog::{Catalog, MemoryCatalog};
