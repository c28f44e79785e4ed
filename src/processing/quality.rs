//! Quality scoring over a single decoded image
//!
//! Sharpness is Laplacian variance, exposure comes from the luma
//! histogram, contrast is the intensity standard deviation. Face
//! detection sits behind a trait; without a detector the face signals
//! stay at zero.

use image::{DynamicImage, GrayImage};

use crate::config::QualityWeights;
use crate::core::{QualityModel, QualityReport};

const SHARPNESS_SCALE: f64 = 100.0;
const CONTRAST_SCALE: f64 = 50.0;

/// One detected frontal face, in pixel coordinates
#[derive(Debug, Clone, Copy)]
pub struct FaceRegion {
	pub x: u32,
	pub y: u32,
	pub width: u32,
	pub height: u32,
}

impl FaceRegion {
	pub fn area(&self) -> u64 {
		u64::from(self.width) * u64::from(self.height)
	}
}

/// Frontal face detection over a grayscale plane
pub trait FaceDetector: Send + Sync {
	fn available(&self) -> bool;
	fn detect(&self, gray: &GrayImage) -> Vec<FaceRegion>;
}

/// Stand-in used when no cascade model is installed
#[derive(Debug, Default)]
pub struct NoFaceDetector;

impl FaceDetector for NoFaceDetector {
	fn available(&self) -> bool {
		false
	}

	fn detect(&self, _gray: &GrayImage) -> Vec<FaceRegion> {
		Vec::new()
	}
}

/// Score one decoded image
pub fn assess(
	img: &DynamicImage,
	detector: &dyn FaceDetector,
	weights: QualityWeights,
	model: QualityModel,
) -> QualityReport {
	let gray = img.to_luma8();

	let sharpness = (laplacian_variance(&gray) / SHARPNESS_SCALE).clamp(0.0, 1.0);
	let (exposure, mean, stddev) = exposure_from_histogram(&gray);
	let contrast = (stddev / CONTRAST_SCALE).clamp(0.0, 1.0);

	let faces = if detector.available() { detector.detect(&gray) } else { Vec::new() };
	let face_count = faces.len() as u32;
	let face_score = score_faces(&faces, u64::from(gray.width()) * u64::from(gray.height()));

	let overall = match model {
		QualityModel::Weighted => {
			weights.sharpness * sharpness + weights.exposure * exposure + weights.faces * face_score
		}
		QualityModel::Contrast => {
			let brightness = 1.0 - (mean - 128.0).abs() / 128.0;
			let face_bonus = (f64::from(face_count) * 0.2).min(1.0);
			0.4 * sharpness + 0.2 * brightness + 0.2 * contrast + 0.2 * face_bonus
		}
	};

	QualityReport {
		sharpness,
		exposure,
		contrast,
		face_count,
		face_score,
		overall: overall.clamp(0.0, 1.0),
	}
}

/// Variance of the discrete Laplacian over interior pixels
fn laplacian_variance(gray: &GrayImage) -> f64 {
	let (width, height) = gray.dimensions();
	if width < 3 || height < 3 {
		return 0.0;
	}

	let mut sum = 0.0;
	let mut sum_sq = 0.0;
	let mut count = 0u64;
	for y in 1..height - 1 {
		for x in 1..width - 1 {
			let center = f64::from(gray.get_pixel(x, y)[0]);
			let response = f64::from(gray.get_pixel(x, y - 1)[0])
				+ f64::from(gray.get_pixel(x, y + 1)[0])
				+ f64::from(gray.get_pixel(x - 1, y)[0])
				+ f64::from(gray.get_pixel(x + 1, y)[0])
				- 4.0 * center;
			sum += response;
			sum_sq += response * response;
			count += 1;
		}
	}

	let n = count as f64;
	let mean = sum / n;
	(sum_sq / n - mean * mean).max(0.0)
}

/// Exposure score plus the histogram mean and standard deviation.
/// Mean brightness near mid-gray scores high; clipped blacks and
/// whites are penalized at twice their histogram mass.
fn exposure_from_histogram(gray: &GrayImage) -> (f64, f64, f64) {
	let mut histogram = [0u64; 256];
	for pixel in gray.pixels() {
		histogram[pixel[0] as usize] += 1;
	}

	let total: u64 = histogram.iter().sum();
	if total == 0 {
		return (0.0, 0.0, 0.0);
	}
	let n = total as f64;

	let mut mean = 0.0;
	let mut mean_sq = 0.0;
	for (level, count) in histogram.iter().enumerate() {
		let weight = *count as f64 / n;
		mean += level as f64 * weight;
		mean_sq += (level as f64) * (level as f64) * weight;
	}
	let stddev = (mean_sq - mean * mean).max(0.0).sqrt();

	let centered = 1.0 - (mean - 128.0).abs() / 128.0;
	let clipping = 2.0 * (histogram[0] as f64 + histogram[255] as f64) / n;
	let exposure = (centered - clipping).clamp(0.0, 1.0);

	(exposure, mean, stddev)
}

/// Face coverage score. Faces filling 5% to 30% of the frame score
/// full marks; smaller or larger coverage degrades linearly.
fn score_faces(faces: &[FaceRegion], image_area: u64) -> f64 {
	if faces.is_empty() || image_area == 0 {
		return 0.0;
	}

	let face_area: u64 = faces.iter().map(FaceRegion::area).sum();
	let ratio = face_area as f64 / image_area as f64;

	if ratio == 0.0 {
		0.0
	} else if ratio < 0.05 {
		ratio / 0.05
	} else if ratio <= 0.3 {
		1.0
	} else {
		(1.0 - (ratio - 0.3) / 0.7).max(0.3)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use image::GrayImage;

	struct FixedFaces(Vec<FaceRegion>);

	impl FaceDetector for FixedFaces {
		fn available(&self) -> bool {
			true
		}

		fn detect(&self, _gray: &GrayImage) -> Vec<FaceRegion> {
			self.0.clone()
		}
	}

	fn checker(dark: u8, light: u8) -> DynamicImage {
		let img = GrayImage::from_fn(128, 128, |x, y| {
			if (x / 8 + y / 8) % 2 == 0 {
				image::Luma([dark])
			} else {
				image::Luma([light])
			}
		});
		DynamicImage::ImageLuma8(img)
	}

	#[test]
	fn blur_lowers_laplacian_response() {
		let sharp = checker(64, 192).to_luma8();
		let blurred = image::imageops::blur(&sharp, 3.0);
		assert!(laplacian_variance(&sharp) > laplacian_variance(&blurred));
	}

	#[test]
	fn uniform_plane_has_zero_sharpness() {
		let flat = DynamicImage::ImageLuma8(GrayImage::from_pixel(64, 64, image::Luma([90])));
		let report = assess(&flat, &NoFaceDetector, QualityWeights::default(), QualityModel::Weighted);
		assert!((report.sharpness - 0.0).abs() < f64::EPSILON);
	}

	#[test]
	fn mid_gray_exposes_well_and_black_does_not() {
		let weights = QualityWeights::default();
		let mid = DynamicImage::ImageLuma8(GrayImage::from_pixel(64, 64, image::Luma([128])));
		let black = DynamicImage::ImageLuma8(GrayImage::from_pixel(64, 64, image::Luma([0])));
		let good = assess(&mid, &NoFaceDetector, weights, QualityModel::Weighted);
		let bad = assess(&black, &NoFaceDetector, weights, QualityModel::Weighted);
		assert!(good.exposure > 0.99);
		assert!(bad.exposure < 0.01);
	}

	#[test]
	fn contrast_follows_intensity_spread() {
		let weights = QualityWeights::default();
		let flat = DynamicImage::ImageLuma8(GrayImage::from_pixel(64, 64, image::Luma([128])));
		let spread = checker(64, 192);
		let low = assess(&flat, &NoFaceDetector, weights, QualityModel::Weighted);
		let high = assess(&spread, &NoFaceDetector, weights, QualityModel::Weighted);
		assert!(low.contrast < 0.01);
		assert!(high.contrast > 0.9);
	}

	#[test]
	fn face_coverage_bands() {
		assert!((score_faces(&[], 10_000) - 0.0).abs() < f64::EPSILON);
		// 1% coverage scales linearly
		let small = [FaceRegion { x: 0, y: 0, width: 10, height: 10 }];
		assert!((score_faces(&small, 10_000) - 0.2).abs() < 1e-9);
		// 16% coverage is ideal
		let ideal = [FaceRegion { x: 0, y: 0, width: 40, height: 40 }];
		assert!((score_faces(&ideal, 10_000) - 1.0).abs() < f64::EPSILON);
		// 64% coverage degrades but floors at 0.3
		let huge = [FaceRegion { x: 0, y: 0, width: 80, height: 80 }];
		let score = score_faces(&huge, 10_000);
		assert!(score < 1.0 && score >= 0.3);
	}

	#[test]
	fn detector_feeds_face_signals() {
		let weights = QualityWeights::default();
		let img = checker(64, 192);
		let detector = FixedFaces(vec![FaceRegion { x: 10, y: 10, width: 40, height: 40 }]);
		let report = assess(&img, &detector, weights, QualityModel::Weighted);
		assert_eq!(report.face_count, 1);
		assert!(report.face_score > 0.0);
	}

	#[test]
	fn scores_are_reproducible() {
		let weights = QualityWeights::default();
		let img = checker(50, 180);
		let a = assess(&img, &NoFaceDetector, weights, QualityModel::Weighted);
		let b = assess(&img, &NoFaceDetector, weights, QualityModel::Weighted);
		assert_eq!(a, b);
	}

	#[test]
	fn contrast_model_uses_face_bonus() {
		let img = checker(64, 192);
		let weights = QualityWeights::default();
		let detector = FixedFaces(vec![FaceRegion { x: 0, y: 0, width: 40, height: 40 }]);
		let with_faces = assess(&img, &detector, weights, QualityModel::Contrast);
		let without = assess(&img, &NoFaceDetector, weights, QualityModel::Contrast);
		assert!(with_faces.overall > without.overall);
	}
}
