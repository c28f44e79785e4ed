//! Processing stage: fingerprint and score every image of a session
//!
//! Images are pulled from the blob store into a per-job scratch
//! directory and analyzed under a bounded worker pool. For one image
//! the hash and quality computations run side by side and are joined
//! before the row is written. A failing image is skipped and noted;
//! only a fully unprocessable batch fails the session.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::json;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::core::{Fingerprint, ImagePatch, ImageRecord, QualityReport, SessionPatch, SessionStatus};
use crate::error::{with_retries, Error, Result, RetryPolicy};
use crate::pipeline::{Job, JobState, PipelineContext};
use crate::processing;

enum ImageOutcome {
	Processed,
	Skipped { filename: String, reason: String },
}

/// Run the processing stage for one session, then chain the clustering job
pub async fn run(ctx: &Arc<PipelineContext>, job_id: &str, session_id: &str) -> Result<()> {
	ctx.catalog
		.update_session(
			session_id,
			SessionPatch::transition(SessionStatus::Uploaded, SessionStatus::Processing),
		)
		.await?;

	let images = ctx.catalog.images_by_session(session_id).await?;
	if images.is_empty() {
		return Err(Error::Processing(format!("session '{session_id}' has no images")));
	}
	let total = images.len() as u32;
	info!(session_id, total, "processing started");

	ctx.queue
		.set_state(
			job_id,
			JobState::Progress { current: 0, total, stage: "processing".to_string() },
		)
		.await?;

	// Scratch space is per job and removed on every exit path
	let scratch = tempfile::Builder::new()
		.prefix(&format!("photocull-{session_id}-"))
		.tempdir()
		.map_err(|e| Error::Storage(format!("scratch dir: {e}")))?;

	let semaphore = Arc::new(Semaphore::new(ctx.config.max_concurrent_processing));
	let mut tasks: JoinSet<Result<ImageOutcome>> = JoinSet::new();
	for image in images {
		let ctx = Arc::clone(ctx);
		let semaphore = Arc::clone(&semaphore);
		let scratch_dir = scratch.path().to_path_buf();
		let job_id = job_id.to_string();
		tasks.spawn(async move {
			let _permit = semaphore
				.acquire_owned()
				.await
				.map_err(|e| Error::Processing(format!("worker pool closed: {e}")))?;
			process_one(&ctx, &job_id, total, &scratch_dir, image).await
		});
	}

	let mut processed = 0u32;
	let mut skipped: Vec<serde_json::Value> = Vec::new();
	while let Some(joined) = tasks.join_next().await {
		let outcome =
			joined.map_err(|e| Error::Processing(format!("image task aborted: {e}")))??;
		match outcome {
			ImageOutcome::Processed => processed += 1,
			ImageOutcome::Skipped { filename, reason } => {
				skipped.push(json!({ "filename": filename, "reason": reason }));
			}
		}
	}

	if processed == 0 {
		return Err(Error::Processing(format!(
			"none of the {total} images could be processed"
		)));
	}

	let patch = SessionPatch::transition(SessionStatus::Processing, SessionStatus::Clustering)
		.meta("hashed_images", json!(processed))
		.meta("skipped_images", json!(skipped.len()))
		.meta("skipped", json!(skipped));
	ctx.catalog.update_session(session_id, patch).await?;

	let cluster_job = ctx
		.queue
		.enqueue(Job::Cluster { session_id: session_id.to_string() })
		.await?;
	ctx.catalog
		.update_session(
			session_id,
			SessionPatch::default().meta("cluster_job_id", json!(cluster_job)),
		)
		.await?;

	info!(session_id, processed, skipped = total - processed, "processing finished");
	Ok(())
}

async fn process_one(
	ctx: &Arc<PipelineContext>,
	job_id: &str,
	total: u32,
	scratch_dir: &Path,
	image: ImageRecord,
) -> Result<ImageOutcome> {
	let blobs = &ctx.blobs;
	let url = image.blob_url.clone();
	let bytes = match with_retries(RetryPolicy::default(), || blobs.get(&url)).await {
		Ok(bytes) => bytes,
		Err(err) => {
			warn!(image_id = %image.image_id, error = %err, "blob fetch failed, skipping image");
			return Ok(ImageOutcome::Skipped {
				filename: image.original_filename,
				reason: err.code().to_string(),
			});
		}
	};

	let scratch_file = scratch_dir.join(&image.image_id);
	tokio::fs::write(&scratch_file, &bytes)
		.await
		.map_err(|e| Error::Storage(format!("scratch write: {e}")))?;
	drop(bytes);

	let analysis = analyze_file(ctx, scratch_file.clone()).await;
	let _ = tokio::fs::remove_file(&scratch_file).await;

	let (fingerprint, quality) = match analysis {
		Ok(parts) => parts,
		Err(err) => {
			warn!(image_id = %image.image_id, error = %err, "analysis failed, skipping image");
			return Ok(ImageOutcome::Skipped {
				filename: image.original_filename,
				reason: err.code().to_string(),
			});
		}
	};

	ctx.catalog
		.update_image(&image.image_id, ImagePatch::analyzed(fingerprint, quality))
		.await?;
	let current = ctx.catalog.record_processed(&image.session_id).await?;
	ctx.queue
		.set_state(
			job_id,
			JobState::Progress { current, total, stage: "processing".to_string() },
		)
		.await?;

	debug!(image_id = %image.image_id, current, total, "image analyzed");
	Ok(ImageOutcome::Processed)
}

/// Decode once, then hash and score in parallel on the blocking pool
async fn analyze_file(
	ctx: &Arc<PipelineContext>,
	path: PathBuf,
) -> Result<(Fingerprint, QualityReport)> {
	let family = ctx.config.hash_family;
	let weights = ctx.config.quality_weights;
	let model = ctx.config.quality_model;
	let faces = Arc::clone(&ctx.faces);

	tokio::task::spawn_blocking(move || {
		let img = image::ImageReader::open(&path)
			.map_err(|e| Error::Processing(format!("open: {e}")))?
			.with_guessed_format()
			.map_err(|e| Error::Processing(format!("format detection: {e}")))?
			.decode()
			.map_err(|e| Error::Processing(format!("decode: {e}")))?;

		let (fingerprint, quality) = rayon::join(
			|| processing::fingerprint(&img, family),
			|| processing::assess(&img, faces.as_ref(), weights, model),
		);
		Ok((fingerprint?, quality))
	})
	.await
	.map_err(|e| Error::Processing(format!("analysis task: {e}")))?
}
