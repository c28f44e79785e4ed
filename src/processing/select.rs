//! Representative selection within a cluster
//!
//! The keeper is the member with the highest overall quality. Ties fall
//! through sharpness, face count, upload time and finally the image id,
//! so the outcome is deterministic for byte-identical bursts.

use std::cmp::Ordering;

use crate::core::ImageRecord;

/// Index of the best image among the given cluster members
pub fn best_index(members: &[&ImageRecord]) -> usize {
	let mut best = 0;
	for candidate in 1..members.len() {
		if rank(members[candidate], members[best]) == Ordering::Greater {
			best = candidate;
		}
	}
	best
}

/// Orders two members; `Greater` means `a` wins the cluster
fn rank(a: &ImageRecord, b: &ImageRecord) -> Ordering {
	overall(a)
		.total_cmp(&overall(b))
		.then_with(|| sharpness(a).total_cmp(&sharpness(b)))
		.then_with(|| face_count(a).cmp(&face_count(b)))
		.then_with(|| b.upload_time.cmp(&a.upload_time))
		.then_with(|| b.image_id.cmp(&a.image_id))
}

fn overall(image: &ImageRecord) -> f64 {
	image.quality.map_or(0.0, |q| q.overall)
}

fn sharpness(image: &ImageRecord) -> f64 {
	image.quality.map_or(0.0, |q| q.sharpness)
}

fn face_count(image: &ImageRecord) -> u32 {
	image.quality.map_or(0, |q| q.face_count)
}
