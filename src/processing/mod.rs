//! # Compute Engines
//!
//! Pure CPU work: fingerprint hashing, quality scoring, density
//! clustering and representative selection. Nothing here touches the
//! blob store or the catalog.

pub mod cluster;
pub mod hash;
pub mod quality;
pub mod select;

pub use cluster::{partition, Partition};
pub use hash::fingerprint;
pub use quality::{assess, FaceDetector, FaceRegion, NoFaceDetector};
