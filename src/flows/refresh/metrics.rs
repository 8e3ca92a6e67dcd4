// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters for refresh grants sent to platforms.
///
/// Refreshes served from a token another caller already rotated are not counted; every
/// attempt here is exactly one `grant_type=refresh_token` request.
#[derive(Debug, Default)]
pub struct RefreshMetrics {
	attempts: AtomicU64,
	success: AtomicU64,
	failure: AtomicU64,
	revocations: AtomicU64,
}
impl RefreshMetrics {
	/// Returns the number of refresh requests sent.
	pub fn attempts(&self) -> u64 {
		self.attempts.load(Ordering::Relaxed)
	}

	/// Returns the number of refresh requests that produced a stored token.
	pub fn successes(&self) -> u64 {
		self.success.load(Ordering::Relaxed)
	}

	/// Returns the number of refresh requests that failed for any reason.
	pub fn failures(&self) -> u64 {
		self.failure.load(Ordering::Relaxed)
	}

	/// Returns how many tokens were marked revoked after a rejected refresh.
	pub fn revocations(&self) -> u64 {
		self.revocations.load(Ordering::Relaxed)
	}

	pub(crate) fn record_attempt(&self) {
		self.attempts.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_outcome<T>(&self, result: &Result<T, crate::error::Error>) {
		let counter = if result.is_ok() { &self.success } else { &self.failure };

		counter.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_revocation(&self) {
		self.revocations.fetch_add(1, Ordering::Relaxed);
	}
}
