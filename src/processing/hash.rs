//! Perceptual fingerprint computation
//!
//! The caller decodes the image once; every hash in a family is computed
//! from that single decode. pHash, dHash and aHash come from the
//! `image_hasher` algorithms; the wavelet hash is the Haar low-pass band
//! thresholded at its median.

use image::{imageops::FilterType, DynamicImage};
use image_hasher::{HashAlg, Hasher, HasherConfig};

use crate::core::{Fingerprint, Hash64, HashFamily};
use crate::error::{Error, Result};

const HASH_SIZE: u32 = 8;
const WAVELET_SCALE: u32 = 64;

/// Compute the configured fingerprint family for one decoded image
pub fn fingerprint(img: &DynamicImage, family: HashFamily) -> Result<Fingerprint> {
	match family {
		HashFamily::Pair => Ok(Fingerprint::Pair {
			p: run(&phash(), img)?,
			d: run(&dhash(), img)?,
		}),
		HashFamily::Triple => Ok(Fingerprint::Triple {
			a: run(&ahash(), img)?,
			d: run(&dhash(), img)?,
			w: wavelet_hash(img),
		}),
	}
}

fn base_config() -> HasherConfig {
	HasherConfig::new().hash_size(HASH_SIZE, HASH_SIZE)
}

fn ahash() -> Hasher {
	base_config().hash_alg(HashAlg::Mean).to_hasher()
}

fn dhash() -> Hasher {
	base_config().hash_alg(HashAlg::Gradient).to_hasher()
}

fn phash() -> Hasher {
	base_config().hash_alg(HashAlg::Mean).preproc_dct().to_hasher()
}

fn run(hasher: &Hasher, img: &DynamicImage) -> Result<Hash64> {
	let hash = hasher.hash_image(img);
	Hash64::from_bytes(hash.as_bytes())
		.map_err(|e| Error::Processing(format!("unexpected hash width: {e}")))
}

/// Haar wavelet hash: the three-level low-pass band of a 64x64 luma
/// plane, with the top-level approximation removed, thresholded at the
/// band median.
fn wavelet_hash(img: &DynamicImage) -> Hash64 {
	let gray = img.to_luma8();
	let scaled = image::imageops::resize(&gray, WAVELET_SCALE, WAVELET_SCALE, FilterType::Lanczos3);

	// The LL3 band of a 64x64 Haar decomposition is the 8x8 grid of block means
	let mut band = [0f64; 64];
	for block_y in 0..8u32 {
		for block_x in 0..8u32 {
			let mut sum = 0f64;
			for y in 0..8u32 {
				for x in 0..8u32 {
					sum += f64::from(scaled.get_pixel(block_x * 8 + x, block_y * 8 + y)[0]);
				}
			}
			band[(block_y * 8 + block_x) as usize] = sum / 64.0;
		}
	}

	let mean = band.iter().sum::<f64>() / band.len() as f64;
	for value in &mut band {
		*value -= mean;
	}

	let median = median(&band);
	let mut bits = 0u64;
	for (index, value) in band.iter().enumerate() {
		if *value > median {
			bits |= 1u64 << (63 - index);
		}
	}
	Hash64::new(bits)
}

fn median(values: &[f64; 64]) -> f64 {
	let mut sorted = *values;
	sorted.sort_by(f64::total_cmp);
	(sorted[31] + sorted[32]) / 2.0
}

#[cfg(test)]
mod tests {
	use super::*;
	use image::{DynamicImage, GrayImage};

	fn blocky_pattern(shift: u8) -> DynamicImage {
		let img = GrayImage::from_fn(256, 256, |x, y| {
			let dark = (x / 32 + y / 32) % 2 == 0;
			let base = if dark { 40 } else { 200 };
			image::Luma([base + shift])
		});
		DynamicImage::ImageLuma8(img)
	}

	#[test]
	fn identical_pixels_hash_identically() {
		let a = fingerprint(&blocky_pattern(0), HashFamily::Pair).unwrap();
		let b = fingerprint(&blocky_pattern(0), HashFamily::Pair).unwrap();
		assert_eq!(a, b);
		assert!((a.distance(&b) - 0.0).abs() < f64::EPSILON);
	}

	#[test]
	fn triple_family_is_robust_to_brightness_shift() {
		let base = fingerprint(&blocky_pattern(0), HashFamily::Triple).unwrap();
		let brighter = fingerprint(&blocky_pattern(10), HashFamily::Triple).unwrap();
		assert!(base.distance(&brighter) <= 5.0);
	}

	#[test]
	fn families_report_their_kind() {
		let img = blocky_pattern(0);
		let pair = fingerprint(&img, HashFamily::Pair).unwrap();
		let triple = fingerprint(&img, HashFamily::Triple).unwrap();
		assert_eq!(pair.family(), HashFamily::Pair);
		assert_eq!(triple.family(), HashFamily::Triple);
	}

	#[test]
	fn wavelet_hash_ignores_uniform_offset() {
		let a = wavelet_hash(&blocky_pattern(0));
		let b = wavelet_hash(&blocky_pattern(12));
		assert!(a.hamming(b) <= 4);
	}
}
