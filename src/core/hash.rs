//! Perceptual hash fingerprints and Hamming distances

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

/// Fingerprint family used for a session's images
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashFamily {
	/// pHash + dHash, distances averaged
	Pair,
	/// aHash + dHash + wHash, distances weighted 0.4/0.4/0.2
	Triple,
}

impl HashFamily {
	pub fn parse(value: &str) -> Result<Self> {
		match value.trim().to_ascii_lowercase().as_str() {
			"pair" => Ok(Self::Pair),
			"triple" => Ok(Self::Triple),
			other => Err(Error::Validation(format!("unknown hash family '{other}'"))),
		}
	}
}

/// One 64-bit perceptual hash, serialized as 16 hex characters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Hash64(u64);

impl Hash64 {
	pub fn new(bits: u64) -> Self {
		Self(bits)
	}

	/// Build from a big-endian 8-byte slice
	pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
		let arr: [u8; 8] = bytes
			.try_into()
			.map_err(|_| Error::Validation(format!("hash must be 8 bytes, got {}", bytes.len())))?;
		Ok(Self(u64::from_be_bytes(arr)))
	}

	pub fn from_hex(hex_str: &str) -> Result<Self> {
		let bytes = hex::decode(hex_str)
			.map_err(|e| Error::Validation(format!("invalid hash hex: {e}")))?;
		Self::from_bytes(&bytes)
	}

	pub fn bits(self) -> u64 {
		self.0
	}

	/// Number of differing bits
	pub fn hamming(self, other: Self) -> u32 {
		(self.0 ^ other.0).count_ones()
	}
}

impl std::fmt::Display for Hash64 {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{:016x}", self.0)
	}
}

impl Serialize for Hash64 {
	fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
		serializer.serialize_str(&self.to_string())
	}
}

impl<'de> Deserialize<'de> for Hash64 {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
		let raw = String::deserialize(deserializer)?;
		Self::from_hex(&raw).map_err(serde::de::Error::custom)
	}
}

/// Composite perceptual fingerprint of one image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Fingerprint {
	Pair { p: Hash64, d: Hash64 },
	Triple { a: Hash64, d: Hash64, w: Hash64 },
}

impl Fingerprint {
	pub fn family(&self) -> HashFamily {
		match self {
			Self::Pair { .. } => HashFamily::Pair,
			Self::Triple { .. } => HashFamily::Triple,
		}
	}

	/// Combined Hamming distance between two fingerprints.
	/// Mismatched families never occur within one session and compare
	/// as maximally distant.
	pub fn distance(&self, other: &Fingerprint) -> f64 {
		match (self, other) {
			(Self::Pair { p: p1, d: d1 }, Self::Pair { p: p2, d: d2 }) => {
				f64::from(p1.hamming(*p2) + d1.hamming(*d2)) / 2.0
			}
			(Self::Triple { a: a1, d: d1, w: w1 }, Self::Triple { a: a2, d: d2, w: w2 }) => {
				0.4 * f64::from(a1.hamming(*a2))
					+ 0.4 * f64::from(d1.hamming(*d2))
					+ 0.2 * f64::from(w1.hamming(*w2))
			}
			_ => 64.0,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn hex_round_trip() {
		let hash = Hash64::new(0x0123_4567_89ab_cdef);
		assert_eq!(hash.to_string(), "0123456789abcdef");
		assert_eq!(Hash64::from_hex("0123456789abcdef").unwrap(), hash);
	}

	#[test]
	fn hamming_counts_differing_bits() {
		let a = Hash64::new(0b1010);
		let b = Hash64::new(0b0110);
		assert_eq!(a.hamming(b), 2);
		assert_eq!(a.hamming(a), 0);
	}

	#[test]
	fn pair_distance_is_mean_of_parts() {
		let one = Fingerprint::Pair { p: Hash64::new(0), d: Hash64::new(0) };
		let two = Fingerprint::Pair { p: Hash64::new(0b1111), d: Hash64::new(0b11) };
		assert!((one.distance(&two) - 3.0).abs() < f64::EPSILON);
	}

	#[test]
	fn triple_distance_is_weighted() {
		let one = Fingerprint::Triple {
			a: Hash64::new(0),
			d: Hash64::new(0),
			w: Hash64::new(0),
		};
		let two = Fingerprint::Triple {
			a: Hash64::new(0b11111),
			d: Hash64::new(0),
			w: Hash64::new(0b11111),
		};
		assert!((one.distance(&two) - (0.4 * 5.0 + 0.2 * 5.0)).abs() < 1e-9);
	}

	#[test]
	fn mismatched_families_are_maximally_distant() {
		let pair = Fingerprint::Pair { p: Hash64::new(0), d: Hash64::new(0) };
		let triple = Fingerprint::Triple {
			a: Hash64::new(0),
			d: Hash64::new(0),
			w: Hash64::new(0),
		};
		assert!((pair.distance(&triple) - 64.0).abs() < f64::EPSILON);
	}

	#[test]
	fn fingerprint_serde_uses_hex_fields() {
		let print = Fingerprint::Pair {
			p: Hash64::new(0xffff_0000_ffff_0000),
			d: Hash64::new(1),
		};
		let json = serde_json::to_string(&print).unwrap();
		assert!(json.contains("\"ffff0000ffff0000\""));
		let back: Fingerprint = serde_json::from_str(&json).unwrap();
		assert_eq!(back, print);
	}
}
