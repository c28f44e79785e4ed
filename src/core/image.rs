//! Image entity stored in the catalog

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::hash::Fingerprint;
use crate::core::quality::QualityReport;

/// One uploaded image. Hash and quality stay unset until the
/// processing phase fills them in; a decode failure leaves them unset
/// for good and the image sits out clustering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageRecord {
	pub image_id: String,
	pub session_id: String,
	pub original_filename: String,
	pub content_type: String,
	pub file_size: u64,
	pub upload_time: DateTime<Utc>,
	pub blob_name: String,
	pub blob_url: String,
	pub hash: Option<Fingerprint>,
	pub quality: Option<QualityReport>,
	pub cluster_id: Option<String>,
	pub is_best_in_cluster: bool,
	pub delete_recommended: bool,
	pub user_modified: bool,
	pub deleted: bool,
	pub deleted_at: Option<DateTime<Utc>>,
}

impl ImageRecord {
	pub fn new(
		session_id: &str,
		original_filename: &str,
		content_type: &str,
		file_size: u64,
		blob_name: &str,
		blob_url: &str,
	) -> Self {
		Self {
			image_id: Uuid::new_v4().to_string(),
			session_id: session_id.to_string(),
			original_filename: original_filename.to_string(),
			content_type: content_type.to_string(),
			file_size,
			upload_time: Utc::now(),
			blob_name: blob_name.to_string(),
			blob_url: blob_url.to_string(),
			hash: None,
			quality: None,
			cluster_id: None,
			is_best_in_cluster: false,
			delete_recommended: false,
			user_modified: false,
			deleted: false,
			deleted_at: None,
		}
	}
}

/// Partial update applied atomically to one image row
#[derive(Debug, Clone, Default)]
pub struct ImagePatch {
	pub hash: Option<Fingerprint>,
	pub quality: Option<QualityReport>,
	pub cluster_id: Option<String>,
	pub is_best_in_cluster: Option<bool>,
	pub delete_recommended: Option<bool>,
	pub user_modified: Option<bool>,
	pub deleted: Option<bool>,
	pub deleted_at: Option<DateTime<Utc>>,
}

impl ImagePatch {
	pub fn analyzed(hash: Fingerprint, quality: QualityReport) -> Self {
		Self {
			hash: Some(hash),
			quality: Some(quality),
			..Self::default()
		}
	}

	pub fn cluster_member(cluster_id: &str, is_best: bool) -> Self {
		Self {
			cluster_id: Some(cluster_id.to_string()),
			is_best_in_cluster: Some(is_best),
			delete_recommended: Some(!is_best),
			..Self::default()
		}
	}

	pub fn flagged(delete_recommended: bool, user_modified: bool) -> Self {
		Self {
			delete_recommended: Some(delete_recommended),
			user_modified: Some(user_modified),
			..Self::default()
		}
	}

	pub fn deleted_now() -> Self {
		Self {
			deleted: Some(true),
			deleted_at: Some(Utc::now()),
			..Self::default()
		}
	}
}
