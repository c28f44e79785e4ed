//! Runtime configuration loaded from the environment
//!
//! Every recognized option is an explicit field; unknown keys are
//! rejected so typos fail fast instead of silently using defaults.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::{HashFamily, QualityModel};
use crate::error::{Error, Result};

pub const MAX_UPLOAD_FILES: usize = 100;

const RECOGNIZED_KEYS: &[&str] = &[
	"BLOB_CONNECTION",
	"BLOB_CONTAINER",
	"CATALOG_URL",
	"CATALOG_DB",
	"QUEUE_URL",
	"SECRET_KEY",
	"UPLOAD_MAX_SIZE",
	"ALLOWED_EXTENSIONS",
	"SIMILARITY_THRESHOLD",
	"CLUSTER_MIN_SAMPLES",
	"QUALITY_WEIGHTS_SHARPNESS",
	"QUALITY_WEIGHTS_EXPOSURE",
	"QUALITY_WEIGHTS_FACES",
	"QUALITY_THRESHOLD",
	"MAX_CONCURRENT_PROCESSING",
	"CLEANUP_DAYS",
	"CLEANUP_INTERVAL_SECS",
	"HASH_FAMILY",
	"QUALITY_MODEL",
	"JOB_SOFT_TIME_LIMIT_SECS",
	"JOB_HARD_TIME_LIMIT_SECS",
];

/// Weights for the `weighted` quality model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityWeights {
	pub sharpness: f64,
	pub exposure: f64,
	pub faces: f64,
}

impl Default for QualityWeights {
	fn default() -> Self {
		Self { sharpness: 0.4, exposure: 0.3, faces: 0.3 }
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
	pub blob_connection: String,
	pub blob_container: String,
	pub catalog_url: String,
	pub catalog_db: String,
	pub queue_url: String,
	pub secret_key: String,
	pub upload_max_size: u64,
	pub allowed_extensions: Vec<String>,
	pub similarity_threshold: f64,
	pub cluster_min_samples: usize,
	pub quality_weights: QualityWeights,
	pub quality_threshold: f64,
	pub max_concurrent_processing: usize,
	pub cleanup_days: i64,
	pub cleanup_interval: Duration,
	pub hash_family: HashFamily,
	pub quality_model: QualityModel,
	pub soft_time_limit: Duration,
	pub hard_time_limit: Duration,
}

impl Default for Config {
	fn default() -> Self {
		Self {
			blob_connection: String::new(),
			blob_container: "photos".to_string(),
			catalog_url: "mem://localhost".to_string(),
			catalog_db: "photocull".to_string(),
			queue_url: "mem://localhost".to_string(),
			secret_key: String::new(),
			upload_max_size: 50 * 1024 * 1024,
			allowed_extensions: ["jpg", "jpeg", "png", "gif", "bmp", "tiff", "webp"]
				.iter()
				.map(|s| (*s).to_string())
				.collect(),
			similarity_threshold: 0.85,
			cluster_min_samples: 2,
			quality_weights: QualityWeights::default(),
			quality_threshold: 0.5,
			max_concurrent_processing: 4,
			cleanup_days: 7,
			cleanup_interval: Duration::from_secs(3600),
			hash_family: HashFamily::Pair,
			quality_model: QualityModel::Weighted,
			soft_time_limit: Duration::from_secs(25 * 60),
			hard_time_limit: Duration::from_secs(30 * 60),
		}
	}
}

impl Config {
	/// Build from the process environment, considering only recognized keys
	pub fn from_env() -> Result<Self> {
		let pairs: BTreeMap<String, String> = std::env::vars()
			.filter(|(key, _)| RECOGNIZED_KEYS.contains(&key.as_str()))
			.collect();
		Self::from_pairs(pairs)
	}

	/// Build from an explicit key/value set. Unknown keys are an error.
	pub fn from_pairs<I>(pairs: I) -> Result<Self>
	where
		I: IntoIterator<Item = (String, String)>,
	{
		let mut config = Self::default();
		for (key, value) in pairs {
			match key.as_str() {
				"BLOB_CONNECTION" => config.blob_connection = value,
				"BLOB_CONTAINER" => config.blob_container = value,
				"CATALOG_URL" => config.catalog_url = value,
				"CATALOG_DB" => config.catalog_db = value,
				"QUEUE_URL" => config.queue_url = value,
				"SECRET_KEY" => config.secret_key = value,
				"UPLOAD_MAX_SIZE" => config.upload_max_size = parse_size(&value)?,
				"ALLOWED_EXTENSIONS" => {
					config.allowed_extensions = value
						.split(',')
						.map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
						.filter(|ext| !ext.is_empty())
						.collect();
				}
				"SIMILARITY_THRESHOLD" => {
					config.similarity_threshold = parse_unit_interval(&key, &value)?;
				}
				"CLUSTER_MIN_SAMPLES" => config.cluster_min_samples = parse_number(&key, &value)?,
				"QUALITY_WEIGHTS_SHARPNESS" => {
					config.quality_weights.sharpness = parse_unit_interval(&key, &value)?;
				}
				"QUALITY_WEIGHTS_EXPOSURE" => {
					config.quality_weights.exposure = parse_unit_interval(&key, &value)?;
				}
				"QUALITY_WEIGHTS_FACES" => {
					config.quality_weights.faces = parse_unit_interval(&key, &value)?;
				}
				"QUALITY_THRESHOLD" => {
					config.quality_threshold = parse_unit_interval(&key, &value)?;
				}
				"MAX_CONCURRENT_PROCESSING" => {
					config.max_concurrent_processing = parse_number(&key, &value)?;
				}
				"CLEANUP_DAYS" => config.cleanup_days = parse_number(&key, &value)?,
				"CLEANUP_INTERVAL_SECS" => {
					config.cleanup_interval = Duration::from_secs(parse_number(&key, &value)?);
				}
				"HASH_FAMILY" => config.hash_family = HashFamily::parse(&value)?,
				"QUALITY_MODEL" => config.quality_model = QualityModel::parse(&value)?,
				"JOB_SOFT_TIME_LIMIT_SECS" => {
					config.soft_time_limit = Duration::from_secs(parse_number(&key, &value)?);
				}
				"JOB_HARD_TIME_LIMIT_SECS" => {
					config.hard_time_limit = Duration::from_secs(parse_number(&key, &value)?);
				}
				unknown => {
					return Err(Error::Validation(format!("unknown configuration key '{unknown}'")));
				}
			}
		}

		if config.max_concurrent_processing == 0 {
			return Err(Error::Validation("MAX_CONCURRENT_PROCESSING must be at least 1".into()));
		}
		if config.hard_time_limit < config.soft_time_limit {
			return Err(Error::Validation("hard time limit must not be below the soft limit".into()));
		}
		Ok(config)
	}

	/// Is the file extension accepted for upload
	pub fn extension_allowed(&self, filename: &str) -> bool {
		std::path::Path::new(filename)
			.extension()
			.and_then(|ext| ext.to_str())
			.map(|ext| {
				let ext = ext.to_ascii_lowercase();
				self.allowed_extensions.iter().any(|allowed| *allowed == ext)
			})
			.unwrap_or(false)
	}

	/// DBSCAN radius cap implied by the similarity threshold, on the
	/// 64-bit Hamming scale
	pub fn max_cluster_radius(&self) -> f64 {
		(1.0 - self.similarity_threshold) * 64.0
	}
}

/// Parse sizes like `52428800`, `50MB` or `2GB` (binary multiples)
fn parse_size(value: &str) -> Result<u64> {
	let raw = value.trim().to_ascii_uppercase();
	let (digits, multiplier) = if let Some(prefix) = raw.strip_suffix("GB") {
		(prefix, 1024 * 1024 * 1024)
	} else if let Some(prefix) = raw.strip_suffix("MB") {
		(prefix, 1024 * 1024)
	} else if let Some(prefix) = raw.strip_suffix("KB") {
		(prefix, 1024)
	} else if let Some(prefix) = raw.strip_suffix('B') {
		(prefix, 1)
	} else {
		(raw.as_str(), 1)
	};
	let count: u64 = digits
		.trim()
		.parse()
		.map_err(|_| Error::Validation(format!("invalid size '{value}'")))?;
	Ok(count * multiplier)
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
	value
		.trim()
		.parse()
		.map_err(|_| Error::Validation(format!("{key}: invalid number '{value}'")))
}

fn parse_unit_interval(key: &str, value: &str) -> Result<f64> {
	let parsed: f64 = parse_number(key, value)?;
	if !(0.0..=1.0).contains(&parsed) {
		return Err(Error::Validation(format!("{key} must be within [0, 1], got {parsed}")));
	}
	Ok(parsed)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn pairs(entries: &[(&str, &str)]) -> Vec<(String, String)> {
		entries
			.iter()
			.map(|(k, v)| ((*k).to_string(), (*v).to_string()))
			.collect()
	}

	#[test]
	fn defaults_match_documented_values() {
		let config = Config::default();
		assert_eq!(config.upload_max_size, 50 * 1024 * 1024);
		assert_eq!(config.cluster_min_samples, 2);
		assert_eq!(config.max_concurrent_processing, 4);
		assert_eq!(config.cleanup_days, 7);
		assert!((config.similarity_threshold - 0.85).abs() < f64::EPSILON);
		assert!((config.quality_threshold - 0.5).abs() < f64::EPSILON);
	}

	#[test]
	fn unknown_keys_are_rejected() {
		let result = Config::from_pairs(pairs(&[("NOT_A_KEY", "1")]));
		assert!(matches!(result, Err(Error::Validation(_))));
	}

	#[test]
	fn sizes_parse_with_suffixes() {
		assert_eq!(parse_size("50MB").unwrap(), 50 * 1024 * 1024);
		assert_eq!(parse_size("1GB").unwrap(), 1024 * 1024 * 1024);
		assert_eq!(parse_size("512").unwrap(), 512);
		assert!(parse_size("fifty").is_err());
	}

	#[test]
	fn extension_checks_are_case_insensitive() {
		let config = Config::default();
		assert!(config.extension_allowed("IMG_0042.JPG"));
		assert!(config.extension_allowed("holiday.webp"));
		assert!(!config.extension_allowed("notes.txt"));
		assert!(!config.extension_allowed("no_extension"));
	}

	#[test]
	fn thresholds_outside_unit_interval_are_rejected() {
		let result = Config::from_pairs(pairs(&[("SIMILARITY_THRESHOLD", "1.5")]));
		assert!(matches!(result, Err(Error::Validation(_))));
	}

	#[test]
	fn selection_knobs_parse() {
		let config = Config::from_pairs(pairs(&[
			("HASH_FAMILY", "triple"),
			("QUALITY_MODEL", "contrast"),
		]))
		.unwrap();
		assert_eq!(config.hash_family, HashFamily::Triple);
		assert_eq!(config.quality_model, QualityModel::Contrast);
	}

	#[test]
	fn radius_cap_follows_similarity_threshold() {
		let config = Config::default();
		assert!((config.max_cluster_radius() - 9.6).abs() < 1e-9);
	}
}
