//! # Core Domain Types
//!
//! Sessions, images, clusters, fingerprints and quality reports.
//! These types are shared by the engines, the adapters and the pipeline.

pub mod cluster;
pub mod hash;
pub mod image;
pub mod quality;
pub mod session;

pub use cluster::{ClusterRecord, ClusterStats};
pub use hash::{Fingerprint, Hash64, HashFamily};
pub use image::{ImagePatch, ImageRecord};
pub use quality::{QualityModel, QualityReport};
pub use session::{Session, SessionPatch, SessionStatus};
