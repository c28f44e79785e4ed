//! Density clustering over pairwise fingerprint distances
//!
//! The radius comes from the knee of the k-distance curve, with
//! percentile and median fallbacks when the curve is degenerate.
//! Grouping is DBSCAN over the precomputed distance matrix.

use std::collections::VecDeque;

use ndarray::Array2;

use crate::core::Fingerprint;

/// Fixed radius used when the input is too small for a k-distance curve
pub const SMALL_INPUT_RADIUS: f64 = 0.5;

const KNEE_NEIGHBORS: usize = 4;
const NOISE: i64 = -1;
const UNVISITED: i64 = -2;

/// Outcome of one clustering run over the input order
#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
	/// Groups of input indices, each of size at least two
	pub clusters: Vec<Vec<usize>>,
	/// Indices that belong to no group, in input order
	pub unclustered: Vec<usize>,
	/// Radius the grouping actually used
	pub radius: f64,
}

/// Cluster fingerprints, optionally capping the adaptive radius
pub fn partition(
	prints: &[Fingerprint],
	min_samples: usize,
	max_radius: Option<f64>,
) -> Partition {
	let n = prints.len();
	if n == 0 {
		return Partition { clusters: Vec::new(), unclustered: Vec::new(), radius: SMALL_INPUT_RADIUS };
	}
	if n == 1 {
		return Partition { clusters: Vec::new(), unclustered: vec![0], radius: SMALL_INPUT_RADIUS };
	}

	let distances = distance_matrix(prints);
	let mut radius = if n < KNEE_NEIGHBORS {
		SMALL_INPUT_RADIUS
	} else {
		select_radius(&k_distance_curve(&distances))
	};
	if let Some(cap) = max_radius {
		radius = radius.min(cap);
	}

	let labels = dbscan(&distances, radius, min_samples);
	shape_partition(&labels, radius)
}

/// Symmetric matrix of combined Hamming distances
pub fn distance_matrix(prints: &[Fingerprint]) -> Array2<f64> {
	let n = prints.len();
	let mut matrix = Array2::zeros((n, n));
	for i in 0..n {
		for j in (i + 1)..n {
			let distance = prints[i].distance(&prints[j]);
			matrix[[i, j]] = distance;
			matrix[[j, i]] = distance;
		}
	}
	matrix
}

/// Sorted distances to each point's k-th nearest neighbor, self included
pub fn k_distance_curve(distances: &Array2<f64>) -> Vec<f64> {
	let n = distances.nrows();
	let k = KNEE_NEIGHBORS.min(n.saturating_sub(1)).max(1);

	let mut curve: Vec<f64> = (0..n)
		.map(|i| {
			let mut row: Vec<f64> = distances.row(i).to_vec();
			row.sort_by(f64::total_cmp);
			row[k - 1]
		})
		.collect();
	curve.sort_by(f64::total_cmp);
	curve
}

/// Index of maximum deviation from the chord between the curve's
/// endpoints. A flat curve has no knee.
pub fn elbow_index(curve: &[f64]) -> Option<usize> {
	if curve.len() < 2 {
		return None;
	}

	let last = (curve.len() - 1) as f64;
	let dx = last;
	let dy = curve[curve.len() - 1] - curve[0];
	let norm = (dx * dx + dy * dy).sqrt();

	let mut best_index = 0;
	let mut best_deviation = 0.0;
	for (i, &value) in curve.iter().enumerate() {
		let deviation = (dy * i as f64 - dx * (value - curve[0])).abs() / norm;
		if deviation > best_deviation {
			best_deviation = deviation;
			best_index = i;
		}
	}

	(best_deviation > 1e-9).then_some(best_index)
}

/// Radius from the knee, the 90th percentile or the median, in that order
pub fn select_radius(curve: &[f64]) -> f64 {
	if let Some(index) = elbow_index(curve) {
		return curve[index];
	}
	percentile(curve, 0.9)
		.or_else(|| percentile(curve, 0.5))
		.unwrap_or(SMALL_INPUT_RADIUS)
}

/// DBSCAN over a precomputed distance matrix. Returns one label per
/// point; noise is -1. Label order follows input order.
pub fn dbscan(distances: &Array2<f64>, eps: f64, min_samples: usize) -> Vec<i64> {
	let n = distances.nrows();
	let mut labels = vec![UNVISITED; n];
	let mut next_cluster = 0i64;

	for point in 0..n {
		if labels[point] != UNVISITED {
			continue;
		}

		let neighbors = region_query(distances, point, eps);
		if neighbors.len() < min_samples {
			labels[point] = NOISE;
			continue;
		}

		labels[point] = next_cluster;
		let mut frontier: VecDeque<usize> = neighbors.into();
		while let Some(candidate) = frontier.pop_front() {
			if labels[candidate] == NOISE {
				labels[candidate] = next_cluster;
			}
			if labels[candidate] != UNVISITED {
				continue;
			}
			labels[candidate] = next_cluster;

			let reachable = region_query(distances, candidate, eps);
			if reachable.len() >= min_samples {
				frontier.extend(reachable);
			}
		}
		next_cluster += 1;
	}

	labels
}

fn region_query(distances: &Array2<f64>, point: usize, eps: f64) -> Vec<usize> {
	distances
		.row(point)
		.iter()
		.enumerate()
		.filter(|(_, &d)| d <= eps)
		.map(|(j, _)| j)
		.collect()
}

fn shape_partition(labels: &[i64], radius: f64) -> Partition {
	let mut order: Vec<i64> = Vec::new();
	let mut groups: std::collections::HashMap<i64, Vec<usize>> = std::collections::HashMap::new();
	let mut unclustered = Vec::new();

	for (index, &label) in labels.iter().enumerate() {
		if label < 0 {
			unclustered.push(index);
			continue;
		}
		let members = groups.entry(label).or_default();
		if members.is_empty() {
			order.push(label);
		}
		members.push(index);
	}

	let mut clusters = Vec::new();
	for label in order {
		let members = groups.remove(&label).unwrap_or_default();
		if members.len() >= 2 {
			clusters.push(members);
		} else {
			unclustered.extend(members);
		}
	}
	unclustered.sort_unstable();

	Partition { clusters, unclustered, radius }
}

fn percentile(sorted: &[f64], fraction: f64) -> Option<f64> {
	if sorted.is_empty() {
		return None;
	}
	let rank = fraction * (sorted.len() - 1) as f64;
	let low = rank.floor() as usize;
	let high = rank.ceil() as usize;
	let value = if low == high {
		sorted[low]
	} else {
		sorted[low] + (rank - low as f64) * (sorted[high] - sorted[low])
	};
	value.is_finite().then_some(value)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::core::{Hash64, HashFamily};

	fn pair(p: u64, d: u64) -> Fingerprint {
		Fingerprint::Pair { p: Hash64::new(p), d: Hash64::new(d) }
	}

	#[test]
	fn single_input_is_one_singleton() {
		let result = partition(&[pair(1, 1)], 2, None);
		assert!(result.clusters.is_empty());
		assert_eq!(result.unclustered, vec![0]);
	}

	#[test]
	fn identical_inputs_form_one_cluster() {
		let prints = vec![pair(7, 7); 5];
		let result = partition(&prints, 2, None);
		assert_eq!(result.clusters.len(), 1);
		assert_eq!(result.clusters[0], vec![0, 1, 2, 3, 4]);
		assert!(result.unclustered.is_empty());
	}

	#[test]
	fn pair_of_identical_inputs_uses_small_input_radius() {
		let prints = vec![pair(3, 3); 2];
		let result = partition(&prints, 2, None);
		assert_eq!(result.clusters.len(), 1);
		assert!((result.radius - SMALL_INPUT_RADIUS).abs() < f64::EPSILON);
	}

	#[test]
	fn knee_curve_selects_knee_value() {
		let curve = [1.0, 1.0, 1.0, 1.0, 1.0, 16.0, 31.0];
		assert_eq!(elbow_index(&curve), Some(4));
		assert!((select_radius(&curve) - 1.0).abs() < f64::EPSILON);
	}

	#[test]
	fn flat_curve_falls_back_to_percentile() {
		let curve = [3.0, 3.0, 3.0, 3.0, 3.0];
		assert_eq!(elbow_index(&curve), None);
		assert!((select_radius(&curve) - 3.0).abs() < f64::EPSILON);
	}

	#[test]
	fn dbscan_expands_through_core_points() {
		// chain 0-1-2 with step distance 1, eps 1: reachability is transitive
		let mut distances = Array2::zeros((3, 3));
		distances[[0, 1]] = 1.0;
		distances[[1, 0]] = 1.0;
		distances[[1, 2]] = 1.0;
		distances[[2, 1]] = 1.0;
		distances[[0, 2]] = 2.0;
		distances[[2, 0]] = 2.0;
		let labels = dbscan(&distances, 1.0, 2);
		assert_eq!(labels, vec![0, 0, 0]);
	}

	#[test]
	fn distant_point_is_noise() {
		let mut distances = Array2::from_elem((5, 5), 20.0);
		for i in 0..5 {
			distances[[i, i]] = 0.0;
		}
		distances[[0, 1]] = 0.0;
		distances[[1, 0]] = 0.0;
		distances[[2, 3]] = 0.0;
		distances[[3, 2]] = 0.0;
		let labels = dbscan(&distances, 1.0, 2);
		assert_eq!(labels, vec![0, 0, 1, 1, NOISE]);
	}

	#[test]
	fn radius_cap_keeps_far_groups_apart() {
		// two tight pairs separated by the full hash width
		let prints = vec![
			pair(0, 0),
			pair(0, 0),
			pair(u64::MAX, u64::MAX),
			pair(u64::MAX, u64::MAX),
		];
		let result = partition(&prints, 2, Some(9.6));
		assert_eq!(result.clusters.len(), 2);
		assert_eq!(result.clusters[0], vec![0, 1]);
		assert_eq!(result.clusters[1], vec![2, 3]);
		assert!(result.radius <= 9.6);
	}

	#[test]
	fn k_distance_curve_is_sorted_and_self_inclusive() {
		let prints = vec![pair(0, 0), pair(0, 0), pair(0, 0), pair(u64::MAX, u64::MAX)];
		let curve = k_distance_curve(&distance_matrix(&prints));
		assert_eq!(curve.len(), 4);
		for window in curve.windows(2) {
			assert!(window[0] <= window[1]);
		}
	}

	#[test]
	fn min_samples_above_group_size_yields_noise() {
		let prints = vec![pair(1, 1), pair(1, 1)];
		let result = partition(&prints, 3, None);
		assert!(result.clusters.is_empty());
		assert_eq!(result.unclustered, vec![0, 1]);
	}

	#[test]
	fn family_choice_does_not_change_grouping_of_identicals() {
		let triple = Fingerprint::Triple {
			a: Hash64::new(9),
			d: Hash64::new(9),
			w: Hash64::new(9),
		};
		let prints = vec![triple; 3];
		assert_eq!(prints[0].family(), HashFamily::Triple);
		let result = partition(&prints, 2, None);
		assert_eq!(result.clusters.len(), 1);
		assert_eq!(result.clusters[0].len(), 3);
	}
}
