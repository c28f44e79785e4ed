//! Session entity and its status machine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Pipeline phase of one session. Transitions only move forward,
/// except that every non-terminal phase may drop into `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
	Uploading,
	Uploaded,
	Processing,
	Clustering,
	Completed,
	Failed,
}

impl SessionStatus {
	pub fn can_transition(self, to: SessionStatus) -> bool {
		use SessionStatus::{Clustering, Completed, Failed, Processing, Uploaded, Uploading};
		match (self, to) {
			(Uploading, Uploaded)
			| (Uploaded, Processing)
			| (Processing, Clustering)
			| (Clustering, Completed) => true,
			(from, Failed) => from != Completed && from != Failed,
			_ => false,
		}
	}

	pub fn is_terminal(self) -> bool {
		matches!(self, Self::Completed | Self::Failed)
	}

	pub fn as_str(self) -> &'static str {
		match self {
			Self::Uploading => "uploading",
			Self::Uploaded => "uploaded",
			Self::Processing => "processing",
			Self::Clustering => "clustering",
			Self::Completed => "completed",
			Self::Failed => "failed",
		}
	}
}

impl std::fmt::Display for SessionStatus {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

/// One user's batch of images. The token is a bearer credential and a
/// unique secondary key; the blob prefix namespaces the session's bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
	pub session_id: String,
	pub token: String,
	pub status: SessionStatus,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
	pub total_images: u32,
	pub processed_images: u32,
	pub clusters_found: u32,
	pub images_flagged_for_deletion: u32,
	pub blob_prefix: String,
	pub metadata: BTreeMap<String, Value>,
}

impl Session {
	pub fn new() -> Self {
		let session_id = Uuid::new_v4().to_string();
		let now = Utc::now();
		Self {
			blob_prefix: session_id.clone(),
			session_id,
			token: Uuid::new_v4().to_string(),
			status: SessionStatus::Uploading,
			created_at: now,
			updated_at: now,
			total_images: 0,
			processed_images: 0,
			clusters_found: 0,
			images_flagged_for_deletion: 0,
			metadata: BTreeMap::new(),
		}
	}
}

impl Default for Session {
	fn default() -> Self {
		Self::new()
	}
}

/// Partial update applied atomically to one session row.
/// When `expect_status` is set, the update only applies while the row
/// still holds that status.
#[derive(Debug, Clone, Default)]
pub struct SessionPatch {
	pub status: Option<SessionStatus>,
	pub expect_status: Option<SessionStatus>,
	pub total_images: Option<u32>,
	pub processed_images: Option<u32>,
	pub clusters_found: Option<u32>,
	pub images_flagged_for_deletion: Option<u32>,
	pub metadata: Vec<(String, Value)>,
}

impl SessionPatch {
	pub fn status(to: SessionStatus) -> Self {
		Self { status: Some(to), ..Self::default() }
	}

	pub fn transition(from: SessionStatus, to: SessionStatus) -> Self {
		Self {
			status: Some(to),
			expect_status: Some(from),
			..Self::default()
		}
	}

	pub fn meta(mut self, key: &str, value: Value) -> Self {
		self.metadata.push((key.to_string(), value));
		self
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn forward_transitions_are_legal() {
		use SessionStatus::{Clustering, Completed, Processing, Uploaded, Uploading};
		assert!(Uploading.can_transition(Uploaded));
		assert!(Uploaded.can_transition(Processing));
		assert!(Processing.can_transition(Clustering));
		assert!(Clustering.can_transition(Completed));
	}

	#[test]
	fn backward_and_skipping_transitions_are_illegal() {
		use SessionStatus::{Clustering, Completed, Processing, Uploaded, Uploading};
		assert!(!Uploaded.can_transition(Uploading));
		assert!(!Uploading.can_transition(Processing));
		assert!(!Completed.can_transition(Clustering));
		assert!(!Clustering.can_transition(Processing));
	}

	#[test]
	fn failed_is_reachable_from_everything_but_terminal_states() {
		use SessionStatus::{Completed, Failed, Processing, Uploading};
		assert!(Uploading.can_transition(Failed));
		assert!(Processing.can_transition(Failed));
		assert!(!Completed.can_transition(Failed));
		assert!(!Failed.can_transition(Failed));
	}

	#[test]
	fn new_session_starts_uploading_with_prefix() {
		let session = Session::new();
		assert_eq!(session.status, SessionStatus::Uploading);
		assert_eq!(session.blob_prefix, session.session_id);
		assert_ne!(session.session_id, session.token);
	}
}
