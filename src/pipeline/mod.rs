//! # Pipeline
//!
//! The session state machine, the worker runtime that drives it and the
//! job plumbing between them. Collaborator handles are injected once at
//! startup; nothing here keeps hidden process-wide state.

pub mod cluster;
pub mod orchestrator;
pub mod process;
pub mod queue;
pub mod sweep;
pub mod worker;

use std::sync::Arc;

use crate::config::Config;
use crate::processing::{FaceDetector, NoFaceDetector};
use crate::storage::{BlobStore, Catalog, MemoryBlobStore, MemoryCatalog};

pub use orchestrator::{
	ClusterView, DeletionReceipt, HealthReport, ImageView, Orchestrator, ResultsEnvelope,
	SessionHandle, SessionRef, UploadFile, UploadReceipt, UploadedFile,
};
pub use queue::{Job, JobQueue, JobState, MemoryQueue, QueuedJob};
pub use sweep::SweepReport;
pub use worker::{run_maintenance, Worker};

/// Injected collaborators shared by the orchestrator and the workers
pub struct PipelineContext {
	pub blobs: Arc<dyn BlobStore>,
	pub catalog: Arc<dyn Catalog>,
	pub queue: Arc<dyn JobQueue>,
	pub faces: Arc<dyn FaceDetector>,
	pub config: Arc<Config>,
}

impl PipelineContext {
	pub fn new(
		blobs: Arc<dyn BlobStore>,
		catalog: Arc<dyn Catalog>,
		queue: Arc<dyn JobQueue>,
		faces: Arc<dyn FaceDetector>,
		config: Config,
	) -> Arc<Self> {
		Arc::new(Self { blobs, catalog, queue, faces, config: Arc::new(config) })
	}

	/// Fully in-memory context for tests and single-process runs
	pub fn in_memory(config: Config) -> Arc<Self> {
		let container = config.blob_container.clone();
		Self::new(
			Arc::new(MemoryBlobStore::new(&container)),
			Arc::new(MemoryCatalog::new()),
			Arc::new(MemoryQueue::new()),
			Arc::new(NoFaceDetector),
			config,
		)
	}
}
