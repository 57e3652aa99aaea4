// self
use crate::_prelude::*;

/// Thread-safe counters kept by every [`CachingTokenSource`](super::CachingTokenSource).
#[derive(Debug, Default)]
pub struct CacheMetrics {
	hits: AtomicU64,
	refreshes: AtomicU64,
	failures: AtomicU64,
	cancellations: AtomicU64,
}
impl CacheMetrics {
	/// Calls answered from the held record.
	pub fn hits(&self) -> u64 {
		self.hits.load(Ordering::Relaxed)
	}

	/// Successful calls to the wrapped source.
	pub fn refreshes(&self) -> u64 {
		self.refreshes.load(Ordering::Relaxed)
	}

	/// Failed calls to the wrapped source.
	pub fn failures(&self) -> u64 {
		self.failures.load(Ordering::Relaxed)
	}

	/// Calls abandoned because the caller's context ended.
	pub fn cancellations(&self) -> u64 {
		self.cancellations.load(Ordering::Relaxed)
	}

	pub(crate) fn record_hit(&self) {
		self.hits.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_refresh(&self) {
		self.refreshes.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_failure(&self) {
		self.failures.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_cancellation(&self) {
		self.cancellations.fetch_add(1, Ordering::Relaxed);
	}
}
