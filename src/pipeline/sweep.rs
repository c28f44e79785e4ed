//! Maintenance sweep: purge stale sessions, reclaim orphan blobs
//!
//! Blobs always go first so an interrupted sweep leaves rows pointing
//! at missing bytes rather than unreferenced bytes nobody will find.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::Result;
use crate::pipeline::PipelineContext;

#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
	pub sessions_purged: u32,
	pub blobs_deleted: u32,
	pub orphans_reclaimed: u32,
}

/// Run one full sweep with the configured age threshold
pub async fn run(ctx: &Arc<PipelineContext>) -> Result<SweepReport> {
	run_with_age(ctx, ctx.config.cleanup_days).await
}

/// Run one full sweep, purging sessions older than `days`
pub async fn run_with_age(ctx: &Arc<PipelineContext>, days: i64) -> Result<SweepReport> {
	let cutoff = Utc::now() - Duration::days(days);
	let mut report = SweepReport::default();

	for session in ctx.catalog.sessions_older_than(cutoff).await? {
		for key in ctx.blobs.list(&session.blob_prefix).await? {
			ctx.blobs.delete(&key).await?;
			report.blobs_deleted += 1;
		}
		ctx.catalog.purge_session(&session.session_id).await?;
		report.sessions_purged += 1;
		info!(session_id = %session.session_id, "stale session purged");
	}

	let referenced = ctx.catalog.referenced_blob_names().await?;
	for key in ctx.blobs.list("").await? {
		if referenced.contains(&key) {
			continue;
		}
		if let Err(err) = ctx.blobs.delete(&key).await {
			warn!(%key, error = %err, "orphan blob could not be deleted");
			continue;
		}
		report.orphans_reclaimed += 1;
	}

	info!(
		sessions = report.sessions_purged,
		blobs = report.blobs_deleted,
		orphans = report.orphans_reclaimed,
		"sweep finished"
	);
	Ok(report)
}
