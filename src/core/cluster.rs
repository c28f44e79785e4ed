//! Cluster entity and aggregate statistics

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A group of near-duplicate images. Always holds at least two members
/// and one of them is the nominated best image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterRecord {
	pub cluster_id: String,
	pub session_id: String,
	pub member_image_ids: Vec<String>,
	pub best_image_id: String,
	pub similarity_radius: f64,
	pub created_at: DateTime<Utc>,
}

impl ClusterRecord {
	pub fn new(
		session_id: &str,
		member_image_ids: Vec<String>,
		best_image_id: &str,
		similarity_radius: f64,
	) -> Self {
		Self {
			cluster_id: Uuid::new_v4().to_string(),
			session_id: session_id.to_string(),
			member_image_ids,
			best_image_id: best_image_id.to_string(),
			similarity_radius,
			created_at: Utc::now(),
		}
	}
}

/// Aggregate shape of one clustering run, kept in session metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterStats {
	pub total_images: usize,
	pub cluster_count: usize,
	pub average_cluster_size: f64,
	pub max_cluster_size: usize,
	pub potential_deletions: usize,
}

impl ClusterStats {
	pub fn from_sizes(sizes: &[usize], total_images: usize) -> Self {
		let cluster_count = sizes.len();
		let clustered: usize = sizes.iter().sum();
		let average = if cluster_count == 0 {
			0.0
		} else {
			clustered as f64 / cluster_count as f64
		};
		Self {
			total_images,
			cluster_count,
			average_cluster_size: average,
			max_cluster_size: sizes.iter().copied().max().unwrap_or(0),
			potential_deletions: sizes.iter().map(|s| s.saturating_sub(1)).sum(),
		}
	}
}
