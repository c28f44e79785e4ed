//! Quality metrics attached to each processed image

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Scoring model combining the individual metrics into `overall`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityModel {
	/// sharpness/exposure/faces with configurable weights (default 0.4/0.3/0.3)
	Weighted,
	/// sharpness/brightness/contrast/face-bonus at fixed 0.4/0.2/0.2/0.2
	Contrast,
}

impl QualityModel {
	pub fn parse(value: &str) -> Result<Self> {
		match value.trim().to_ascii_lowercase().as_str() {
			"weighted" => Ok(Self::Weighted),
			"contrast" => Ok(Self::Contrast),
			other => Err(Error::Validation(format!("unknown quality model '{other}'"))),
		}
	}
}

/// Per-image quality signals, each normalized to [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
	pub sharpness: f64,
	pub exposure: f64,
	pub contrast: f64,
	pub face_count: u32,
	pub face_score: f64,
	pub overall: f64,
}
