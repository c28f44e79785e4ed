//! Clustering stage: group fingerprints and nominate keepers
//!
//! Consumes the hashes written by the processing stage. Images that
//! were skipped there have no fingerprint and sit out the grouping.
//! Unclustered images below the quality threshold still get flagged.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, info};

use crate::core::{
	ClusterRecord, ClusterStats, Fingerprint, ImagePatch, ImageRecord, SessionPatch, SessionStatus,
};
use crate::error::{Error, Result};
use crate::pipeline::{JobState, PipelineContext};
use crate::processing::{self, cluster::Partition, select};

/// Run the clustering stage for one session; returns the job summary
pub async fn run(ctx: &Arc<PipelineContext>, job_id: &str, session_id: &str) -> Result<Value> {
	let session = ctx.catalog.session(session_id).await?;
	if session.status != SessionStatus::Clustering {
		return Err(Error::Clustering(format!(
			"session '{session_id}' is {}, not ready for clustering",
			session.status
		)));
	}

	let images = ctx.catalog.images_by_session(session_id).await?;
	let scored: Vec<(ImageRecord, Fingerprint)> = images
		.into_iter()
		.filter_map(|image| image.hash.map(|hash| (image, hash)))
		.collect();

	ctx.queue
		.set_state(
			job_id,
			JobState::Progress { current: 0, total: 1, stage: "clustering".to_string() },
		)
		.await?;

	let result = if scored.len() < 2 {
		debug!(session_id, "fewer than two hashed images, skipping clustering");
		Partition {
			clusters: Vec::new(),
			unclustered: (0..scored.len()).collect(),
			radius: processing::cluster::SMALL_INPUT_RADIUS,
		}
	} else {
		let prints: Vec<Fingerprint> = scored.iter().map(|(_, print)| *print).collect();
		let min_samples = ctx.config.cluster_min_samples;
		let cap = ctx.config.max_cluster_radius();
		tokio::task::spawn_blocking(move || {
			processing::partition(&prints, min_samples, Some(cap))
		})
		.await
		.map_err(|e| Error::Clustering(format!("clustering task: {e}")))?
	};

	let mut flagged = 0u32;
	let mut sizes = Vec::with_capacity(result.clusters.len());
	for members in &result.clusters {
		let records: Vec<&ImageRecord> = members.iter().map(|&index| &scored[index].0).collect();
		let best = select::best_index(&records);

		let cluster = ClusterRecord::new(
			session_id,
			records.iter().map(|image| image.image_id.clone()).collect(),
			&records[best].image_id,
			result.radius,
		);
		let cluster_id = cluster.cluster_id.clone();
		ctx.catalog.insert_cluster(cluster).await?;

		for (position, image) in records.iter().enumerate() {
			ctx.catalog
				.update_image(
					&image.image_id,
					ImagePatch::cluster_member(&cluster_id, position == best),
				)
				.await?;
			if position != best {
				flagged += 1;
			}
		}
		sizes.push(records.len());
	}

	// Unclustered low-quality shots are still deletion candidates
	let threshold = ctx.config.quality_threshold;
	for &index in &result.unclustered {
		let image = &scored[index].0;
		let below = image.quality.is_some_and(|quality| quality.overall < threshold);
		if below && !image.delete_recommended {
			ctx.catalog
				.update_image(
					&image.image_id,
					ImagePatch { delete_recommended: Some(true), ..ImagePatch::default() },
				)
				.await?;
			flagged += 1;
		}
	}

	let stats = ClusterStats::from_sizes(&sizes, scored.len());
	let patch = SessionPatch::transition(SessionStatus::Clustering, SessionStatus::Completed)
		.meta("processing_completed_at", json!(chrono::Utc::now().to_rfc3339()))
		.meta("cluster_statistics", json!(stats))
		.meta("similarity_radius", json!(result.radius));
	let patch = SessionPatch {
		clusters_found: Some(result.clusters.len() as u32),
		images_flagged_for_deletion: Some(flagged),
		..patch
	};
	ctx.catalog.update_session(session_id, patch).await?;

	info!(
		session_id,
		clusters = result.clusters.len(),
		flagged,
		radius = result.radius,
		"clustering finished"
	);
	Ok(json!({
		"session_id": session_id,
		"clusters_found": result.clusters.len(),
		"images_flagged_for_deletion": flagged,
	}))
}
