//! Error kinds shared across the pipeline
//!
//! Messages are user-facing and must never carry connection strings,
//! tokens or other credentials. `code()` is the short machine-readable
//! form surfaced in API payloads.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
	/// Bad upload input or malformed identifier; never fails a session
	#[error("validation failed: {0}")]
	Validation(String),

	/// Missing session, image or cluster
	#[error("not found: {0}")]
	NotFound(String),

	/// Blob store I/O failure; retried with backoff before failing a session
	#[error("storage error: {0}")]
	Storage(String),

	/// Catalog read/write failure
	#[error("catalog error: {0}")]
	Catalog(String),

	/// Decode, hash or quality failure for a single image; the image is
	/// skipped and processing continues
	#[error("processing error: {0}")]
	Processing(String),

	/// Degenerate clustering input; callers fall back to the radius policy
	#[error("clustering error: {0}")]
	Clustering(String),

	/// Job exceeded its hard time limit
	#[error("timed out after {0:?}")]
	Timeout(Duration),
}

impl Error {
	pub fn code(&self) -> &'static str {
		match self {
			Self::Validation(_) => "validation_error",
			Self::NotFound(_) => "not_found",
			Self::Storage(_) => "storage_error",
			Self::Catalog(_) => "catalog_error",
			Self::Processing(_) => "processing_error",
			Self::Clustering(_) => "clustering_error",
			Self::Timeout(_) => "timeout",
		}
	}

	pub fn is_retryable(&self) -> bool {
		matches!(self, Self::Storage(_))
	}
}

/// Retry policy for transient blob store failures
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
	pub attempts: u32,
	pub base_delay: Duration,
}

impl Default for RetryPolicy {
	fn default() -> Self {
		Self { attempts: 3, base_delay: Duration::from_millis(250) }
	}
}

/// Run `op` up to `policy.attempts` times, doubling the delay between
/// attempts. Only retryable errors are retried; everything else
/// propagates immediately.
pub async fn with_retries<T, F, Fut>(policy: RetryPolicy, mut op: F) -> Result<T>
where
	F: FnMut() -> Fut,
	Fut: Future<Output = Result<T>>,
{
	let mut delay = policy.base_delay;
	let mut attempt = 1;
	loop {
		match op().await {
			Ok(value) => return Ok(value),
			Err(err) if err.is_retryable() && attempt < policy.attempts => {
				tracing::warn!(attempt, error = %err, "retrying after transient failure");
				tokio::time::sleep(delay).await;
				delay *= 2;
				attempt += 1;
			}
			Err(err) => return Err(err),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicU32, Ordering};

	#[tokio::test]
	async fn retries_transient_storage_errors() {
		let calls = AtomicU32::new(0);
		let policy = RetryPolicy { attempts: 3, base_delay: Duration::from_millis(1) };
		let result = with_retries(policy, || {
			let n = calls.fetch_add(1, Ordering::SeqCst);
			async move {
				if n < 2 {
					Err(Error::Storage("blip".into()))
				} else {
					Ok(42)
				}
			}
		})
		.await;
		assert_eq!(result.unwrap(), 42);
		assert_eq!(calls.load(Ordering::SeqCst), 3);
	}

	#[tokio::test]
	async fn gives_up_after_bounded_attempts() {
		let calls = AtomicU32::new(0);
		let policy = RetryPolicy { attempts: 3, base_delay: Duration::from_millis(1) };
		let result: Result<()> = with_retries(policy, || {
			calls.fetch_add(1, Ordering::SeqCst);
			async { Err(Error::Storage("down".into())) }
		})
		.await;
		assert!(matches!(result, Err(Error::Storage(_))));
		assert_eq!(calls.load(Ordering::SeqCst), 3);
	}

	#[tokio::test]
	async fn non_retryable_errors_propagate_at_once() {
		let calls = AtomicU32::new(0);
		let result: Result<()> = with_retries(RetryPolicy::default(), || {
			calls.fetch_add(1, Ordering::SeqCst);
			async { Err(Error::NotFound("image".into())) }
		})
		.await;
		assert!(matches!(result, Err(Error::NotFound(_))));
		assert_eq!(calls.load(Ordering::SeqCst), 1);
	}
}
