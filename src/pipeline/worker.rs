//! Worker runtime: pull jobs, enforce time limits, record outcomes
//!
//! One job at a time per worker. A job past its soft limit logs a
//! warning and keeps running; past the hard limit it is dropped, its
//! session fails and in-flight per-image writes may still land.

use std::sync::Arc;
use std::time::Instant;

use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::core::{SessionPatch, SessionStatus};
use crate::error::{Error, Result};
use crate::pipeline::{cluster, process, sweep, Job, JobState, PipelineContext, QueuedJob};

pub struct Worker {
	ctx: Arc<PipelineContext>,
}

impl Worker {
	pub fn new(ctx: Arc<PipelineContext>) -> Self {
		Self { ctx }
	}

	/// Consume jobs until the queue closes
	pub async fn run(&self) {
		info!("worker started");
		while let Some(queued) = self.ctx.queue.next().await {
			self.execute(queued).await;
		}
		info!("worker stopped");
	}

	async fn execute(&self, queued: QueuedJob) {
		let QueuedJob { job_id, job } = queued;
		let started = Instant::now();
		info!(%job_id, ?job, "job started");

		match self.run_with_limits(&job_id, &job).await {
			Ok(result) => {
				let _ = self
					.ctx
					.queue
					.set_state(&job_id, JobState::Success { result })
					.await;
				info!(%job_id, elapsed_ms = started.elapsed().as_millis() as u64, "job finished");
			}
			Err(err) => {
				error!(%job_id, code = err.code(), error = %err, "job failed");
				let _ = self
					.ctx
					.queue
					.set_state(
						&job_id,
						JobState::Failure { error: format!("{}: {err}", err.code()) },
					)
					.await;
				if let Some(session_id) = job.session_id() {
					self.mark_failed(session_id, &err).await;
				}
			}
		}
	}

	async fn run_with_limits(&self, job_id: &str, job: &Job) -> Result<Option<Value>> {
		let soft = self.ctx.config.soft_time_limit;
		let hard = self.ctx.config.hard_time_limit;

		let work = self.dispatch(job_id, job);
		tokio::pin!(work);

		tokio::select! {
			result = &mut work => result,
			() = tokio::time::sleep(soft) => {
				warn!(%job_id, ?soft, "job exceeded its soft time limit");
				match tokio::time::timeout(hard.saturating_sub(soft), &mut work).await {
					Ok(result) => result,
					Err(_) => Err(Error::Timeout(hard)),
				}
			}
		}
	}

	async fn dispatch(&self, job_id: &str, job: &Job) -> Result<Option<Value>> {
		match job {
			Job::Process { session_id } => {
				process::run(&self.ctx, job_id, session_id).await?;
				Ok(None)
			}
			Job::Cluster { session_id } => {
				let summary = cluster::run(&self.ctx, job_id, session_id).await?;
				Ok(Some(summary))
			}
			Job::Sweep => {
				let report = sweep::run(&self.ctx).await?;
				Ok(Some(json!(report)))
			}
		}
	}

	/// Failure policy: the session fails, partial image rows stay
	async fn mark_failed(&self, session_id: &str, err: &Error) {
		let patch = SessionPatch::status(SessionStatus::Failed)
			.meta("error", json!(format!("{}: {err}", err.code())))
			.meta("failed_at", json!(chrono::Utc::now().to_rfc3339()));
		if let Err(update_err) = self.ctx.catalog.update_session(session_id, patch).await {
			error!(session_id, error = %update_err, "could not mark session failed");
		}
	}
}

/// Enqueue a maintenance sweep on the configured interval
pub async fn run_maintenance(ctx: Arc<PipelineContext>) {
	let mut ticker = tokio::time::interval(ctx.config.cleanup_interval);
	ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
	ticker.tick().await;

	loop {
		ticker.tick().await;
		match ctx.queue.enqueue(Job::Sweep).await {
			Ok(job_id) => info!(%job_id, "maintenance sweep enqueued"),
			Err(_) => break,
		}
	}
}
