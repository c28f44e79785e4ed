//! Session operations: create, upload, results, deletion, health
//!
//! Every operation resolves its session by id or by bearer token; both
//! handles address the same rows. Uploads only enqueue work, the heavy
//! lifting happens in the worker runtime.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use crate::config::MAX_UPLOAD_FILES;
use crate::core::{
	ClusterRecord, ImagePatch, ImageRecord, Session, SessionPatch, SessionStatus,
};
use crate::error::{with_retries, Error, Result, RetryPolicy};
use crate::pipeline::{Job, JobState, PipelineContext};

/// A session addressed by primary id or by bearer token
#[derive(Debug, Clone)]
pub enum SessionRef {
	Id(String),
	Token(String),
}

impl SessionRef {
	pub fn id(value: &str) -> Self {
		Self::Id(value.to_string())
	}

	pub fn token(value: &str) -> Self {
		Self::Token(value.to_string())
	}
}

/// One file submitted for upload
#[derive(Debug, Clone)]
pub struct UploadFile {
	pub filename: String,
	pub content_type: String,
	pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionHandle {
	pub session_id: String,
	pub token: String,
	pub upload_url: String,
	pub results_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadedFile {
	pub image_id: String,
	pub filename: String,
	pub blob_url: String,
	pub file_size: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadReceipt {
	pub session_id: String,
	pub uploaded_files: Vec<UploadedFile>,
	pub total_files: u32,
	pub job_id: String,
	pub status: SessionStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeletionReceipt {
	pub deleted_count: u32,
	pub space_freed_bytes: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageView {
	pub image_id: String,
	pub original_filename: String,
	pub blob_url: String,
	pub file_size: u64,
	pub quality_overall: Option<f64>,
	pub cluster_id: Option<String>,
	pub is_best_in_cluster: bool,
	pub delete_recommended: bool,
	pub deleted: bool,
}

impl From<&ImageRecord> for ImageView {
	fn from(image: &ImageRecord) -> Self {
		Self {
			image_id: image.image_id.clone(),
			original_filename: image.original_filename.clone(),
			blob_url: image.blob_url.clone(),
			file_size: image.file_size,
			quality_overall: image.quality.map(|q| q.overall),
			cluster_id: image.cluster_id.clone(),
			is_best_in_cluster: image.is_best_in_cluster,
			delete_recommended: image.delete_recommended,
			deleted: image.deleted,
		}
	}
}

#[derive(Debug, Clone, Serialize)]
pub struct ClusterView {
	pub cluster_id: String,
	pub best_image: Option<ImageView>,
	pub images_to_delete: Vec<ImageView>,
	pub all_images: Vec<ImageView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResultsEnvelope {
	pub status: SessionStatus,
	pub clusters: Vec<ClusterView>,
	pub unique_images_list: Vec<ImageView>,
	pub potential_space_saved: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
	pub status: String,
	pub services: BTreeMap<String, String>,
}

/// Front door of the pipeline
#[derive(Clone)]
pub struct Orchestrator {
	ctx: Arc<PipelineContext>,
}

impl Orchestrator {
	pub fn new(ctx: Arc<PipelineContext>) -> Self {
		Self { ctx }
	}

	/// Insert a fresh session in the uploading phase
	pub async fn create_session(&self) -> Result<SessionHandle> {
		let session = Session::new();
		let handle = SessionHandle {
			upload_url: format!("/sessions/{}/upload", session.session_id),
			results_url: format!("/sessions/{}/results", session.session_id),
			session_id: session.session_id.clone(),
			token: session.token.clone(),
		};
		self.ctx.catalog.insert_session(session).await?;
		info!(session_id = %handle.session_id, "session created");
		Ok(handle)
	}

	pub async fn session(&self, reference: &SessionRef) -> Result<Session> {
		match reference {
			SessionRef::Id(id) => self.ctx.catalog.session(id).await,
			SessionRef::Token(token) => self.ctx.catalog.session_by_token(token).await,
		}
	}

	/// Validate, store and register a batch of files, then enqueue
	/// processing. Validation failures leave the session in `uploading`.
	pub async fn upload(
		&self,
		reference: &SessionRef,
		files: Vec<UploadFile>,
	) -> Result<UploadReceipt> {
		let session = self.session(reference).await?;
		if session.status != SessionStatus::Uploading {
			return Err(Error::Validation(format!(
				"session '{}' is {} and no longer accepts uploads",
				session.session_id, session.status
			)));
		}

		self.validate_batch(&files)?;

		let mut uploaded_files = Vec::with_capacity(files.len());
		for file in &files {
			match self.store_one(&session, file).await {
				Ok(entry) => uploaded_files.push(entry),
				Err(err) => {
					warn!(session_id = %session.session_id, filename = %file.filename, error = %err, "upload failed");
					self.fail_session(&session.session_id, &format!("upload of '{}' failed", file.filename))
						.await;
					return Err(match err {
						Error::Storage(msg) => {
							Error::Storage(format!("'{}': {msg}", file.filename))
						}
						other => other,
					});
				}
			}
		}

		let total = uploaded_files.len() as u32;
		self.ctx
			.catalog
			.update_session(&session.session_id, {
				let mut patch =
					SessionPatch::transition(SessionStatus::Uploading, SessionStatus::Uploaded);
				patch.total_images = Some(total);
				patch
			})
			.await?;

		let job_id = self
			.ctx
			.queue
			.enqueue(Job::Process { session_id: session.session_id.clone() })
			.await?;
		self.ctx
			.catalog
			.update_session(
				&session.session_id,
				SessionPatch::default().meta("process_job_id", json!(job_id)),
			)
			.await?;

		info!(session_id = %session.session_id, total, %job_id, "upload accepted");
		Ok(UploadReceipt {
			session_id: session.session_id,
			uploaded_files,
			total_files: total,
			job_id,
			status: SessionStatus::Uploaded,
		})
	}

	fn validate_batch(&self, files: &[UploadFile]) -> Result<()> {
		if files.is_empty() {
			return Err(Error::Validation("no files submitted".to_string()));
		}
		if files.len() > MAX_UPLOAD_FILES {
			return Err(Error::Validation(format!(
				"{} files exceed the batch limit of {MAX_UPLOAD_FILES}",
				files.len()
			)));
		}

		let config = &self.ctx.config;
		for file in files {
			if !file.content_type.starts_with("image/") {
				return Err(Error::Validation(format!(
					"'{}' has unsupported content type '{}'",
					file.filename, file.content_type
				)));
			}
			if !config.extension_allowed(&file.filename) {
				return Err(Error::Validation(format!(
					"'{}' has a disallowed extension",
					file.filename
				)));
			}
			if file.bytes.len() as u64 > config.upload_max_size {
				return Err(Error::Validation(format!(
					"'{}' is {} bytes, above the {} byte limit",
					file.filename,
					file.bytes.len(),
					config.upload_max_size
				)));
			}
		}
		Ok(())
	}

	async fn store_one(&self, session: &Session, file: &UploadFile) -> Result<UploadedFile> {
		let blobs = &self.ctx.blobs;
		let stored = with_retries(RetryPolicy::default(), || {
			blobs.put(&session.blob_prefix, &file.filename, &file.bytes)
		})
		.await?;

		let image = ImageRecord::new(
			&session.session_id,
			&file.filename,
			&file.content_type,
			file.bytes.len() as u64,
			&stored.key,
			&stored.url,
		);
		let entry = UploadedFile {
			image_id: image.image_id.clone(),
			filename: image.original_filename.clone(),
			blob_url: image.blob_url.clone(),
			file_size: image.file_size,
		};
		self.ctx.catalog.insert_image(image).await?;
		Ok(entry)
	}

	async fn fail_session(&self, session_id: &str, reason: &str) {
		let patch = SessionPatch::status(SessionStatus::Failed)
			.meta("error", json!(reason))
			.meta("failed_at", json!(chrono::Utc::now().to_rfc3339()));
		if let Err(err) = self.ctx.catalog.update_session(session_id, patch).await {
			warn!(session_id, error = %err, "could not mark session failed");
		}
	}

	pub async fn images(&self, reference: &SessionRef) -> Result<Vec<ImageRecord>> {
		let session = self.session(reference).await?;
		self.ctx.catalog.images_by_session(&session.session_id).await
	}

	pub async fn clusters(&self, reference: &SessionRef) -> Result<Vec<ClusterRecord>> {
		let session = self.session(reference).await?;
		self.ctx.catalog.clusters_by_session(&session.session_id).await
	}

	/// Cluster-shaped result envelope plus the projected space savings
	pub async fn results(&self, reference: &SessionRef) -> Result<ResultsEnvelope> {
		let session = self.session(reference).await?;
		let images = self.ctx.catalog.images_by_session(&session.session_id).await?;
		let clusters = self.ctx.catalog.clusters_by_session(&session.session_id).await?;

		let by_id: BTreeMap<&str, &ImageRecord> =
			images.iter().map(|image| (image.image_id.as_str(), image)).collect();

		let cluster_views = clusters
			.iter()
			.map(|cluster| {
				let members: Vec<&ImageRecord> = cluster
					.member_image_ids
					.iter()
					.filter_map(|id| by_id.get(id.as_str()).copied())
					.collect();
				ClusterView {
					cluster_id: cluster.cluster_id.clone(),
					best_image: by_id
						.get(cluster.best_image_id.as_str())
						.map(|image| ImageView::from(*image)),
					images_to_delete: members
						.iter()
						.filter(|image| image.delete_recommended)
						.map(|image| ImageView::from(*image))
						.collect(),
					all_images: members.iter().map(|image| ImageView::from(*image)).collect(),
				}
			})
			.collect();

		let unique_images_list = images
			.iter()
			.filter(|image| image.cluster_id.is_none())
			.map(ImageView::from)
			.collect();

		let potential_space_saved = images
			.iter()
			.filter(|image| image.delete_recommended && !image.deleted)
			.map(|image| image.file_size)
			.sum();

		Ok(ResultsEnvelope {
			status: session.status,
			clusters: cluster_views,
			unique_images_list,
			potential_space_saved,
		})
	}

	/// User override of the deletion recommendation
	pub async fn flag_image(&self, image_id: &str, delete_recommended: bool) -> Result<ImageRecord> {
		self.ctx
			.catalog
			.update_image(image_id, ImagePatch::flagged(delete_recommended, true))
			.await
	}

	/// Delete the blobs of every flagged, still-present image.
	/// Not a phase transition; safe to repeat.
	pub async fn confirm_deletions(&self, reference: &SessionRef) -> Result<DeletionReceipt> {
		let session = self.session(reference).await?;
		let images = self.ctx.catalog.images_by_session(&session.session_id).await?;

		let mut deleted_count = 0u32;
		let mut space_freed_bytes = 0u64;
		for image in images {
			if !image.delete_recommended || image.deleted {
				continue;
			}
			let blobs = &self.ctx.blobs;
			let url = image.blob_url.clone();
			with_retries(RetryPolicy::default(), || blobs.delete(&url)).await?;
			self.ctx
				.catalog
				.update_image(&image.image_id, ImagePatch::deleted_now())
				.await?;
			deleted_count += 1;
			space_freed_bytes += image.file_size;
		}

		info!(session_id = %session.session_id, deleted_count, space_freed_bytes, "deletions confirmed");
		Ok(DeletionReceipt { deleted_count, space_freed_bytes })
	}

	/// Remove every blob under the session prefix, then every row
	pub async fn delete_session(&self, reference: &SessionRef) -> Result<()> {
		let session = self.session(reference).await?;
		for key in self.ctx.blobs.list(&session.blob_prefix).await? {
			self.ctx.blobs.delete(&key).await?;
		}
		self.ctx.catalog.purge_session(&session.session_id).await?;
		info!(session_id = %session.session_id, "session purged");
		Ok(())
	}

	pub async fn job_status(&self, job_id: &str) -> Result<JobState> {
		self.ctx.queue.state(job_id).await
	}

	pub async fn health(&self) -> HealthReport {
		let mut services = BTreeMap::new();
		services.insert(
			"catalog".to_string(),
			match self.ctx.catalog.ping().await {
				Ok(()) => "ok".to_string(),
				Err(err) => err.code().to_string(),
			},
		);
		services.insert("queue".to_string(), format!("ok ({} queued)", self.ctx.queue.depth()));

		let status = if services.values().all(|state| state.starts_with("ok")) {
			"healthy".to_string()
		} else {
			"degraded".to_string()
		};
		HealthReport { status, services }
	}
}
