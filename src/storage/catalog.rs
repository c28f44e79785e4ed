//! Metadata catalog
//!
//! Sessions, images and clusters with indexed lookup by session and by
//! image identity. Single-document updates are atomic; the in-memory
//! implementation applies every patch under one lock so phase guards
//! cannot interleave.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::core::{ClusterRecord, ImagePatch, ImageRecord, Session, SessionPatch};
use crate::error::{Error, Result};

#[async_trait]
pub trait Catalog: Send + Sync {
	async fn insert_session(&self, session: Session) -> Result<()>;
	async fn session(&self, session_id: &str) -> Result<Session>;
	async fn session_by_token(&self, token: &str) -> Result<Session>;

	/// Apply a patch atomically. Status changes respect the transition
	/// table and the optional `expect_status` guard.
	async fn update_session(&self, session_id: &str, patch: SessionPatch) -> Result<Session>;

	/// Atomically bump the processed-image counter, returning the new value
	async fn record_processed(&self, session_id: &str) -> Result<u32>;

	async fn insert_image(&self, image: ImageRecord) -> Result<()>;
	async fn image(&self, image_id: &str) -> Result<ImageRecord>;

	/// Images of one session, ordered by upload time then image id
	async fn images_by_session(&self, session_id: &str) -> Result<Vec<ImageRecord>>;
	async fn update_image(&self, image_id: &str, patch: ImagePatch) -> Result<ImageRecord>;

	async fn insert_cluster(&self, cluster: ClusterRecord) -> Result<()>;
	async fn clusters_by_session(&self, session_id: &str) -> Result<Vec<ClusterRecord>>;

	/// Remove the session row and every image and cluster under it
	async fn purge_session(&self, session_id: &str) -> Result<()>;

	async fn sessions_older_than(&self, cutoff: DateTime<Utc>) -> Result<Vec<Session>>;

	/// Blob names referenced by any image row, for orphan reclaim
	async fn referenced_blob_names(&self) -> Result<HashSet<String>>;

	async fn ping(&self) -> Result<()>;
}

#[derive(Default)]
struct CatalogState {
	sessions: HashMap<String, Session>,
	token_index: HashMap<String, String>,
	images: HashMap<String, ImageRecord>,
	clusters: HashMap<String, ClusterRecord>,
}

/// In-memory catalog used by tests and single-process deployments
#[derive(Default)]
pub struct MemoryCatalog {
	state: RwLock<CatalogState>,
}

impl MemoryCatalog {
	pub fn new() -> Self {
		Self::default()
	}
}

fn apply_session_patch(session: &mut Session, patch: SessionPatch) -> Result<()> {
	if let Some(expected) = patch.expect_status {
		if session.status != expected {
			return Err(Error::Catalog(format!(
				"session '{}' is {}, expected {}",
				session.session_id, session.status, expected
			)));
		}
	}
	if let Some(to) = patch.status {
		if to != session.status && !session.status.can_transition(to) {
			return Err(Error::Validation(format!(
				"session '{}' cannot move from {} to {}",
				session.session_id, session.status, to
			)));
		}
		session.status = to;
	}
	if let Some(total) = patch.total_images {
		session.total_images = total;
	}
	if let Some(processed) = patch.processed_images {
		session.processed_images = processed;
	}
	if let Some(clusters) = patch.clusters_found {
		session.clusters_found = clusters;
	}
	if let Some(flagged) = patch.images_flagged_for_deletion {
		session.images_flagged_for_deletion = flagged;
	}
	for (key, value) in patch.metadata {
		session.metadata.insert(key, value);
	}
	session.updated_at = Utc::now();
	Ok(())
}

fn apply_image_patch(image: &mut ImageRecord, patch: ImagePatch) {
	if let Some(hash) = patch.hash {
		image.hash = Some(hash);
	}
	if let Some(quality) = patch.quality {
		image.quality = Some(quality);
	}
	if let Some(cluster_id) = patch.cluster_id {
		image.cluster_id = Some(cluster_id);
	}
	if let Some(is_best) = patch.is_best_in_cluster {
		image.is_best_in_cluster = is_best;
	}
	if let Some(flag) = patch.delete_recommended {
		image.delete_recommended = flag;
	}
	if let Some(modified) = patch.user_modified {
		image.user_modified = modified;
	}
	if let Some(deleted) = patch.deleted {
		image.deleted = deleted;
	}
	if let Some(deleted_at) = patch.deleted_at {
		image.deleted_at = Some(deleted_at);
	}
}

#[async_trait]
impl Catalog for MemoryCatalog {
	async fn insert_session(&self, session: Session) -> Result<()> {
		let mut state = self.state.write();
		if state.sessions.contains_key(&session.session_id) {
			return Err(Error::Catalog(format!("session '{}' already exists", session.session_id)));
		}
		state.token_index.insert(session.token.clone(), session.session_id.clone());
		state.sessions.insert(session.session_id.clone(), session);
		Ok(())
	}

	async fn session(&self, session_id: &str) -> Result<Session> {
		self.state
			.read()
			.sessions
			.get(session_id)
			.cloned()
			.ok_or_else(|| Error::NotFound(format!("session '{session_id}'")))
	}

	async fn session_by_token(&self, token: &str) -> Result<Session> {
		let state = self.state.read();
		state
			.token_index
			.get(token)
			.and_then(|id| state.sessions.get(id))
			.cloned()
			.ok_or_else(|| Error::NotFound("session for the given token".to_string()))
	}

	async fn update_session(&self, session_id: &str, patch: SessionPatch) -> Result<Session> {
		let mut state = self.state.write();
		let session = state
			.sessions
			.get_mut(session_id)
			.ok_or_else(|| Error::NotFound(format!("session '{session_id}'")))?;
		apply_session_patch(session, patch)?;
		Ok(session.clone())
	}

	async fn record_processed(&self, session_id: &str) -> Result<u32> {
		let mut state = self.state.write();
		let session = state
			.sessions
			.get_mut(session_id)
			.ok_or_else(|| Error::NotFound(format!("session '{session_id}'")))?;
		session.processed_images += 1;
		session.updated_at = Utc::now();
		Ok(session.processed_images)
	}

	async fn insert_image(&self, image: ImageRecord) -> Result<()> {
		let mut state = self.state.write();
		if state.images.contains_key(&image.image_id) {
			return Err(Error::Catalog(format!("image '{}' already exists", image.image_id)));
		}
		state.images.insert(image.image_id.clone(), image);
		Ok(())
	}

	async fn image(&self, image_id: &str) -> Result<ImageRecord> {
		self.state
			.read()
			.images
			.get(image_id)
			.cloned()
			.ok_or_else(|| Error::NotFound(format!("image '{image_id}'")))
	}

	async fn images_by_session(&self, session_id: &str) -> Result<Vec<ImageRecord>> {
		let mut images: Vec<ImageRecord> = self
			.state
			.read()
			.images
			.values()
			.filter(|image| image.session_id == session_id)
			.cloned()
			.collect();
		images.sort_by(|a, b| {
			a.upload_time
				.cmp(&b.upload_time)
				.then_with(|| a.image_id.cmp(&b.image_id))
		});
		Ok(images)
	}

	async fn update_image(&self, image_id: &str, patch: ImagePatch) -> Result<ImageRecord> {
		let mut state = self.state.write();
		let image = state
			.images
			.get_mut(image_id)
			.ok_or_else(|| Error::NotFound(format!("image '{image_id}'")))?;
		apply_image_patch(image, patch);
		Ok(image.clone())
	}

	async fn insert_cluster(&self, cluster: ClusterRecord) -> Result<()> {
		let mut state = self.state.write();
		state.clusters.insert(cluster.cluster_id.clone(), cluster);
		Ok(())
	}

	async fn clusters_by_session(&self, session_id: &str) -> Result<Vec<ClusterRecord>> {
		let mut clusters: Vec<ClusterRecord> = self
			.state
			.read()
			.clusters
			.values()
			.filter(|cluster| cluster.session_id == session_id)
			.cloned()
			.collect();
		clusters.sort_by(|a, b| {
			a.created_at
				.cmp(&b.created_at)
				.then_with(|| a.cluster_id.cmp(&b.cluster_id))
		});
		Ok(clusters)
	}

	async fn purge_session(&self, session_id: &str) -> Result<()> {
		let mut state = self.state.write();
		let Some(session) = state.sessions.remove(session_id) else {
			return Err(Error::NotFound(format!("session '{session_id}'")));
		};
		state.token_index.remove(&session.token);
		state.images.retain(|_, image| image.session_id != session_id);
		state.clusters.retain(|_, cluster| cluster.session_id != session_id);
		Ok(())
	}

	async fn sessions_older_than(&self, cutoff: DateTime<Utc>) -> Result<Vec<Session>> {
		let mut stale: Vec<Session> = self
			.state
			.read()
			.sessions
			.values()
			.filter(|session| session.created_at < cutoff)
			.cloned()
			.collect();
		stale.sort_by(|a, b| a.created_at.cmp(&b.created_at));
		Ok(stale)
	}

	async fn referenced_blob_names(&self) -> Result<HashSet<String>> {
		Ok(self
			.state
			.read()
			.images
			.values()
			.map(|image| image.blob_name.clone())
			.collect())
	}

	async fn ping(&self) -> Result<()> {
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::core::SessionStatus;

	#[tokio::test]
	async fn sessions_are_found_by_id_and_token() {
		let catalog = MemoryCatalog::new();
		let session = Session::new();
		let id = session.session_id.clone();
		let token = session.token.clone();
		catalog.insert_session(session).await.unwrap();

		assert_eq!(catalog.session(&id).await.unwrap().session_id, id);
		assert_eq!(catalog.session_by_token(&token).await.unwrap().session_id, id);
		assert!(matches!(catalog.session("missing").await, Err(Error::NotFound(_))));
	}

	#[tokio::test]
	async fn illegal_transitions_leave_state_unchanged() {
		let catalog = MemoryCatalog::new();
		let session = Session::new();
		let id = session.session_id.clone();
		catalog.insert_session(session).await.unwrap();

		let result = catalog
			.update_session(&id, SessionPatch::status(SessionStatus::Completed))
			.await;
		assert!(matches!(result, Err(Error::Validation(_))));
		assert_eq!(catalog.session(&id).await.unwrap().status, SessionStatus::Uploading);
	}

	#[tokio::test]
	async fn status_guard_rejects_stale_transitions() {
		let catalog = MemoryCatalog::new();
		let session = Session::new();
		let id = session.session_id.clone();
		catalog.insert_session(session).await.unwrap();

		catalog
			.update_session(&id, SessionPatch::status(SessionStatus::Failed))
			.await
			.unwrap();
		let result = catalog
			.update_session(
				&id,
				SessionPatch::transition(SessionStatus::Uploading, SessionStatus::Uploaded),
			)
			.await;
		assert!(matches!(result, Err(Error::Catalog(_))));
	}

	#[tokio::test]
	async fn processed_counter_increments_atomically() {
		let catalog = MemoryCatalog::new();
		let session = Session::new();
		let id = session.session_id.clone();
		catalog.insert_session(session).await.unwrap();

		assert_eq!(catalog.record_processed(&id).await.unwrap(), 1);
		assert_eq!(catalog.record_processed(&id).await.unwrap(), 2);
		assert_eq!(catalog.session(&id).await.unwrap().processed_images, 2);
	}

	#[tokio::test]
	async fn images_are_listed_in_upload_order() {
		let catalog = MemoryCatalog::new();
		let session = Session::new();
		let id = session.session_id.clone();
		catalog.insert_session(session).await.unwrap();

		let mut first = ImageRecord::new(&id, "a.jpg", "image/jpeg", 1, "k1", "u1");
		let mut second = ImageRecord::new(&id, "b.jpg", "image/jpeg", 1, "k2", "u2");
		first.upload_time = Utc::now();
		second.upload_time = first.upload_time + chrono::Duration::seconds(1);
		let first_id = first.image_id.clone();
		catalog.insert_image(second).await.unwrap();
		catalog.insert_image(first).await.unwrap();

		let images = catalog.images_by_session(&id).await.unwrap();
		assert_eq!(images.len(), 2);
		assert_eq!(images[0].image_id, first_id);
	}

	#[tokio::test]
	async fn purge_removes_every_row() {
		let catalog = MemoryCatalog::new();
		let session = Session::new();
		let id = session.session_id.clone();
		catalog.insert_session(session).await.unwrap();
		let image = ImageRecord::new(&id, "a.jpg", "image/jpeg", 1, "k", "u");
		catalog.insert_image(image).await.unwrap();
		catalog
			.insert_cluster(ClusterRecord::new(&id, vec!["x".into(), "y".into()], "x", 1.0))
			.await
			.unwrap();

		catalog.purge_session(&id).await.unwrap();
		assert!(matches!(catalog.session(&id).await, Err(Error::NotFound(_))));
		assert!(catalog.images_by_session(&id).await.unwrap().is_empty());
		assert!(catalog.clusters_by_session(&id).await.unwrap().is_empty());
	}
}
