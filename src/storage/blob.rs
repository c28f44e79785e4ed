//! Blob store adapters
//!
//! Bytes live under a per-session key prefix as
//! `<prefix>/<unique>-<filename>`. Both adapters are safe to share
//! across workers; the only state is the client handle.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Canonical handle returned by `put`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
	pub key: String,
	pub url: String,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
	/// Write bytes under `prefix/<unique>-<filename>`; overwrite permitted
	async fn put(&self, prefix: &str, filename: &str, bytes: &[u8]) -> Result<StoredBlob>;

	/// Fetch a whole object into memory; callers bound their own concurrency
	async fn get(&self, key_or_url: &str) -> Result<Vec<u8>>;

	/// Idempotent delete; a missing object is not an error
	async fn delete(&self, key_or_url: &str) -> Result<()>;

	/// Keys sharing the prefix; an empty prefix lists every key
	async fn list(&self, prefix: &str) -> Result<Vec<String>>;
}

/// Collision-free key for a new upload
fn unique_key(prefix: &str, filename: &str) -> String {
	format!("{prefix}/{}-{}", Uuid::new_v4(), sanitize(filename))
}

/// Keep the final path component and a conservative charset
fn sanitize(filename: &str) -> String {
	let name = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
	let cleaned: String = name
		.chars()
		.map(|c| {
			if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
				c
			} else {
				'_'
			}
		})
		.collect();
	if cleaned.is_empty() {
		"unnamed".to_string()
	} else {
		cleaned
	}
}

/// In-memory store used by tests and single-process deployments
pub struct MemoryBlobStore {
	container: String,
	objects: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
	pub fn new(container: &str) -> Self {
		Self {
			container: container.to_string(),
			objects: RwLock::new(HashMap::new()),
		}
	}

	fn url_for(&self, key: &str) -> String {
		format!("mem://{}/{key}", self.container)
	}

	fn resolve(&self, key_or_url: &str) -> String {
		key_or_url
			.strip_prefix(&format!("mem://{}/", self.container))
			.unwrap_or(key_or_url)
			.to_string()
	}
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
	async fn put(&self, prefix: &str, filename: &str, bytes: &[u8]) -> Result<StoredBlob> {
		let key = unique_key(prefix, filename);
		self.objects.write().insert(key.clone(), bytes.to_vec());
		let url = self.url_for(&key);
		Ok(StoredBlob { key, url })
	}

	async fn get(&self, key_or_url: &str) -> Result<Vec<u8>> {
		let key = self.resolve(key_or_url);
		self.objects
			.read()
			.get(&key)
			.cloned()
			.ok_or_else(|| Error::NotFound(format!("blob '{key}'")))
	}

	async fn delete(&self, key_or_url: &str) -> Result<()> {
		let key = self.resolve(key_or_url);
		self.objects.write().remove(&key);
		Ok(())
	}

	async fn list(&self, prefix: &str) -> Result<Vec<String>> {
		let mut keys: Vec<String> = self
			.objects
			.read()
			.keys()
			.filter(|key| prefix.is_empty() || key.starts_with(&format!("{prefix}/")))
			.cloned()
			.collect();
		keys.sort();
		Ok(keys)
	}
}

/// Filesystem-backed store; keys map to paths under `root/container`
pub struct LocalBlobStore {
	base: PathBuf,
}

impl LocalBlobStore {
	pub fn new(root: impl Into<PathBuf>, container: &str) -> Self {
		Self { base: root.into().join(container) }
	}

	fn path_for(&self, key: &str) -> PathBuf {
		let mut path = self.base.clone();
		for part in key.split('/') {
			path.push(part);
		}
		path
	}

	fn resolve(&self, key_or_url: &str) -> String {
		let Some(path) = key_or_url.strip_prefix("file://") else {
			return key_or_url.to_string();
		};
		let base = self.base.to_string_lossy();
		path.strip_prefix(base.as_ref())
			.map(|rest| rest.trim_start_matches('/').to_string())
			.unwrap_or_else(|| path.to_string())
	}

	fn url_for(&self, key: &str) -> String {
		format!("file://{}", self.path_for(key).display())
	}
}

#[async_trait]
impl BlobStore for LocalBlobStore {
	async fn put(&self, prefix: &str, filename: &str, bytes: &[u8]) -> Result<StoredBlob> {
		let key = unique_key(prefix, filename);
		let path = self.path_for(&key);
		if let Some(parent) = path.parent() {
			tokio::fs::create_dir_all(parent)
				.await
				.map_err(|e| Error::Storage(format!("create {}: {e}", parent.display())))?;
		}
		tokio::fs::write(&path, bytes)
			.await
			.map_err(|e| Error::Storage(format!("write {}: {e}", path.display())))?;
		let url = self.url_for(&key);
		Ok(StoredBlob { key, url })
	}

	async fn get(&self, key_or_url: &str) -> Result<Vec<u8>> {
		let key = self.resolve(key_or_url);
		let path = self.path_for(&key);
		match tokio::fs::read(&path).await {
			Ok(bytes) => Ok(bytes),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
				Err(Error::NotFound(format!("blob '{key}'")))
			}
			Err(e) => Err(Error::Storage(format!("read {}: {e}", path.display()))),
		}
	}

	async fn delete(&self, key_or_url: &str) -> Result<()> {
		let key = self.resolve(key_or_url);
		let path = self.path_for(&key);
		match tokio::fs::remove_file(&path).await {
			Ok(()) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(Error::Storage(format!("delete {}: {e}", path.display()))),
		}
	}

	async fn list(&self, prefix: &str) -> Result<Vec<String>> {
		let base = self.base.clone();
		let prefix = prefix.to_string();
		tokio::task::spawn_blocking(move || {
			let start = if prefix.is_empty() { base.clone() } else { base.join(&prefix) };
			if !start.exists() {
				return Ok(Vec::new());
			}
			let mut keys = Vec::new();
			for entry in walkdir::WalkDir::new(&start) {
				let entry = entry.map_err(|e| Error::Storage(format!("list: {e}")))?;
				if !entry.file_type().is_file() {
					continue;
				}
				let relative = entry
					.path()
					.strip_prefix(&base)
					.map_err(|e| Error::Storage(format!("list: {e}")))?;
				keys.push(relative.to_string_lossy().replace('\\', "/"));
			}
			keys.sort();
			Ok(keys)
		})
		.await
		.map_err(|e| Error::Storage(format!("list task: {e}")))?
	}
}
