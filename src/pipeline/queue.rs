//! Job broker and status registry
//!
//! Workers take one job at a time, so the broker itself provides the
//! prefetch bound. Job states stay readable after completion until the
//! queue is dropped.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use crate::error::{Error, Result};

const QUEUE_CAPACITY: usize = 256;

/// Background work item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Job {
	/// Hash and score every image of a session
	Process { session_id: String },
	/// Group a session's fingerprints and nominate keepers
	Cluster { session_id: String },
	/// Purge stale sessions and reclaim orphan blobs
	Sweep,
}

impl Job {
	pub fn session_id(&self) -> Option<&str> {
		match self {
			Self::Process { session_id } | Self::Cluster { session_id } => Some(session_id),
			Self::Sweep => None,
		}
	}
}

/// Broker-visible state of one job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "UPPERCASE")]
pub enum JobState {
	Pending,
	Progress { current: u32, total: u32, stage: String },
	Success { result: Option<Value> },
	Failure { error: String },
}

#[derive(Debug, Clone)]
pub struct QueuedJob {
	pub job_id: String,
	pub job: Job,
}

#[async_trait]
pub trait JobQueue: Send + Sync {
	/// Enqueue a job and return its id
	async fn enqueue(&self, job: Job) -> Result<String>;

	/// Wait for the next job. Returns `None` once the queue is closed
	/// and drained.
	async fn next(&self) -> Option<QueuedJob>;

	async fn set_state(&self, job_id: &str, state: JobState) -> Result<()>;
	async fn state(&self, job_id: &str) -> Result<JobState>;

	/// Jobs enqueued but not yet taken by a worker
	fn depth(&self) -> usize;

	/// Stop accepting work; `next` drains what remains
	fn close(&self);
}

/// In-process broker used by tests and single-process deployments
pub struct MemoryQueue {
	sender: RwLock<Option<mpsc::Sender<QueuedJob>>>,
	receiver: Mutex<mpsc::Receiver<QueuedJob>>,
	states: RwLock<HashMap<String, JobState>>,
	pending: AtomicUsize,
}

impl MemoryQueue {
	pub fn new() -> Self {
		let (sender, receiver) = mpsc::channel(QUEUE_CAPACITY);
		Self {
			sender: RwLock::new(Some(sender)),
			receiver: Mutex::new(receiver),
			states: RwLock::new(HashMap::new()),
			pending: AtomicUsize::new(0),
		}
	}
}

impl Default for MemoryQueue {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl JobQueue for MemoryQueue {
	async fn enqueue(&self, job: Job) -> Result<String> {
		let Some(sender) = self.sender.read().clone() else {
			return Err(Error::Storage("job queue is closed".to_string()));
		};

		let job_id = Uuid::new_v4().to_string();
		self.states.write().insert(job_id.clone(), JobState::Pending);
		let queued = QueuedJob { job_id: job_id.clone(), job };
		sender
			.send(queued)
			.await
			.map_err(|_| Error::Storage("job queue is closed".to_string()))?;
		self.pending.fetch_add(1, Ordering::SeqCst);
		Ok(job_id)
	}

	async fn next(&self) -> Option<QueuedJob> {
		let queued = self.receiver.lock().await.recv().await?;
		self.pending.fetch_sub(1, Ordering::SeqCst);
		Some(queued)
	}

	async fn set_state(&self, job_id: &str, state: JobState) -> Result<()> {
		let mut states = self.states.write();
		if !states.contains_key(job_id) {
			return Err(Error::NotFound(format!("job '{job_id}'")));
		}
		states.insert(job_id.to_string(), state);
		Ok(())
	}

	async fn state(&self, job_id: &str) -> Result<JobState> {
		self.states
			.read()
			.get(job_id)
			.cloned()
			.ok_or_else(|| Error::NotFound(format!("job '{job_id}'")))
	}

	fn depth(&self) -> usize {
		self.pending.load(Ordering::SeqCst)
	}

	fn close(&self) {
		self.sender.write().take();
	}
}
