//! Single-flight caching layer in front of any [`TokenSource`].
//!
//! [`CachingTokenSource`] keeps the last record it obtained behind an async mutex. Every
//! call takes the mutex (racing the caller's context), serves the held record while it is
//! valid, and otherwise asks the wrapped source for a new one while still holding the
//! mutex. Concurrent callers therefore coalesce onto one in-flight exchange: whoever holds
//! the mutex refreshes, and everyone queued behind it finds the fresh record on the fast
//! path.
//!
//! A record the wrapped source returns without a usable access value is rejected with
//! [`Error::UnusableToken`] and never replaces the held one.
//!
//! Waiting for the mutex and waiting for the wrapped source are both raced against the
//! caller's [`TokenContext`]. A caller whose context ends gets [`Error::Cancelled`] or
//! [`Error::DeadlineExceeded`] without disturbing other callers; the guard is dropped on
//! every exit path, so the mutex is never left held.

mod metrics;

pub use metrics::CacheMetrics;

// self
use crate::{
	_prelude::*,
	auth::TokenRecord,
	context::TokenContext,
	error::ConfigError,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	source::{TokenFuture, TokenSource},
};

/// Wraps `source` in a caching layer, starting from `seed`.
///
/// When `source` already is a caching layer:
///
/// - with no seed, `source` itself is returned, so there is only ever one point of exclusion;
/// - with a seed, [`ConfigError::SeedOverCachingSource`] is returned, because seeding would
///   bypass the inner layer's mutex.
pub fn reuse_token_source(
	seed: Option<TokenRecord>,
	source: Arc<dyn TokenSource>,
) -> Result<Arc<dyn TokenSource>> {
	if source.as_caching_source().is_some() {
		return match seed {
			None => Ok(source),
			Some(_) => Err(ConfigError::SeedOverCachingSource.into()),
		};
	}

	Ok(Arc::new(CachingTokenSource::new(seed, source)))
}

/// Caching decorator that serializes refreshes of the wrapped source.
pub struct CachingTokenSource {
	source: Arc<dyn TokenSource>,
	record: AsyncMutex<Option<TokenRecord>>,
	metrics: CacheMetrics,
}
impl CachingTokenSource {
	fn new(seed: Option<TokenRecord>, source: Arc<dyn TokenSource>) -> Self {
		Self { source, record: AsyncMutex::new(seed), metrics: CacheMetrics::default() }
	}

	/// Wraps `source` without a seed; returns `source` itself if it already caches.
	pub fn wrap(source: Arc<dyn TokenSource>) -> Arc<dyn TokenSource> {
		if source.as_caching_source().is_some() {
			return source;
		}

		Arc::new(Self::new(None, source))
	}

	/// Counters describing how calls were served.
	pub fn metrics(&self) -> &CacheMetrics {
		&self.metrics
	}

	async fn token_inner(&self, ctx: &TokenContext) -> Result<(TokenRecord, FlowOutcome)> {
		ctx.check()?;

		let mut held = tokio::select! {
			biased;

			reason = ctx.done() => return Err(reason),
			guard = self.record.lock() => guard,
		};

		if !ctx.expired_token() {
			if let Some(record) = held.as_ref().filter(|record| record.is_valid()) {
				self.metrics.record_hit();
				obs::debug_event(FlowKind::Cache, "served held token");

				return Ok((record.clone(), FlowOutcome::Hit));
			}
		}

		obs::debug_event(FlowKind::Cache, "refreshing token from wrapped source");

		let fresh = ctx.run(self.source.token(ctx)).await.and_then(ensure_usable).inspect_err(
			|err| {
				if !err.is_cancellation() {
					self.metrics.record_failure();
				}
			},
		)?;

		self.metrics.record_refresh();

		*held = Some(fresh.clone());

		Ok((fresh, FlowOutcome::Success))
	}
}
impl TokenSource for CachingTokenSource {
	fn token<'a>(&'a self, ctx: &'a TokenContext) -> TokenFuture<'a> {
		const KIND: FlowKind = FlowKind::Cache;

		Box::pin(async move {
			let span = FlowSpan::new(KIND, "token");

			obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

			let result = span.instrument(self.token_inner(ctx)).await;
			let outcome = match &result {
				Ok((_, served)) => *served,
				Err(_) => FlowOutcome::of(&result),
			};

			if outcome == FlowOutcome::Cancelled {
				self.metrics.record_cancellation();
				obs::debug_event(KIND, "caller context ended before a token was available");
			}

			obs::record_flow_outcome(KIND, outcome);

			result.map(|(record, _)| record)
		})
	}

	fn as_caching_source(&self) -> Option<&CachingTokenSource> {
		Some(self)
	}
}
impl Debug for CachingTokenSource {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CachingTokenSource").field("metrics", &self.metrics).finish()
	}
}

fn ensure_usable(record: TokenRecord) -> Result<TokenRecord> {
	if record.access_token.is_empty() {
		return Err(Error::UnusableToken { reason: "access token is empty".into() });
	}
	if !record.is_valid() {
		return Err(Error::UnusableToken { reason: "token has already expired".into() });
	}

	Ok(record)
}

#[cfg(test)]
mod tests {
	// std
	use std::{ptr, time::Duration as StdDuration};
	// self
	use super::*;
	use crate::{
		_preludet::{ScriptedSource, test_record},
		auth::TokenSecret,
		options::TokenSourceOptions,
		source::adopt_token_fetcher,
	};

	fn cache_over(
		seed: Option<TokenRecord>,
		scripted: &Arc<ScriptedSource>,
	) -> Arc<dyn TokenSource> {
		reuse_token_source(seed, scripted.clone()).expect("Wrapping a plain source should work.")
	}

	fn cache_metrics(source: &Arc<dyn TokenSource>) -> &CacheMetrics {
		source.as_caching_source().expect("Source should be a caching layer.").metrics()
	}

	#[tokio::test]
	async fn empty_cache_fetches_once_then_serves_held_record() {
		let record = test_record("A", None, Duration::seconds(60));
		let scripted = Arc::new(ScriptedSource::new([Ok(record.clone())]));
		let cache = cache_over(None, &scripted);
		let ctx = TokenContext::new();
		let first = cache.token(&ctx).await.expect("First call should fetch a token.");
		let second = cache.token(&ctx).await.expect("Second call should hit the cache.");

		assert_eq!(first, record);
		assert_eq!(second, record);
		assert_eq!(scripted.calls(), 1);
		assert_eq!(cache_metrics(&cache).hits(), 1);
		assert_eq!(cache_metrics(&cache).refreshes(), 1);
	}

	#[tokio::test]
	async fn expired_seed_triggers_exactly_one_exchange() {
		let stale = test_record("stale", None, Duration::seconds(-1));
		let fresh = test_record("B", None, Duration::seconds(60));
		let scripted = Arc::new(ScriptedSource::new([Ok(fresh)]));
		let cache = cache_over(Some(stale), &scripted);
		let record = cache.token(&TokenContext::new()).await.expect("Refresh should succeed.");

		assert_eq!(record.access_token.expose(), "B");
		assert_eq!(scripted.calls(), 1);
	}

	#[tokio::test]
	async fn valid_seed_is_served_without_exchange() {
		let seed = test_record("seed", None, Duration::minutes(10));
		let scripted = Arc::new(ScriptedSource::new([]));
		let cache = cache_over(Some(seed.clone()), &scripted);

		for _ in 0..3 {
			assert_eq!(cache.token(&TokenContext::new()).await.ok(), Some(seed.clone()));
		}

		assert_eq!(scripted.calls(), 0);
	}

	#[tokio::test]
	async fn expired_flag_forces_one_refresh() {
		let seed = test_record("seed", None, Duration::minutes(10));
		let fresh = test_record("forced", None, Duration::minutes(10));
		let scripted = Arc::new(ScriptedSource::new([Ok(fresh.clone())]));
		let cache = cache_over(Some(seed), &scripted);
		let ctx = TokenContext::new();
		let forced = cache.token(&ctx.with_expired_token()).await.expect("Forced refresh works.");
		let after = cache.token(&ctx).await.expect("Follow-up call should hit the cache.");

		assert_eq!(forced, fresh);
		assert_eq!(after, fresh);
		assert_eq!(scripted.calls(), 1);
	}

	#[tokio::test]
	async fn failed_refresh_keeps_previous_record() {
		let seed = test_record("survivor", None, Duration::minutes(10));
		let scripted = Arc::new(ScriptedSource::new([Err(Error::Transient(
			crate::error::TransientError::TokenEndpoint {
				message: "upstream hiccup".into(),
				status: Some(503),
				retry_after: None,
			},
		))]));
		let cache = cache_over(Some(seed.clone()), &scripted);
		let ctx = TokenContext::new();
		let err = cache
			.token(&ctx.with_expired_token())
			.await
			.expect_err("Backend failures should surface verbatim.");

		assert!(matches!(err, Error::Transient(_)));
		assert_eq!(cache.token(&ctx).await.ok(), Some(seed));
		assert_eq!(scripted.calls(), 1);
		assert_eq!(cache_metrics(&cache).failures(), 1);
	}

	#[tokio::test]
	async fn empty_access_token_from_source_is_rejected() {
		let seed = test_record("survivor", None, Duration::minutes(10));
		let fetcher = |_ctx: TokenContext| async {
			Ok::<_, Error>(TokenRecord {
				access_token: TokenSecret::new(""),
				token_type: "Bearer".into(),
				refresh_token: None,
				expires_at: None,
			})
		};
		let cache = reuse_token_source(
			Some(seed.clone()),
			Arc::new(adopt_token_fetcher(fetcher, TokenSourceOptions::default())),
		)
		.expect("Wrapping an adopted fetcher should work.");
		let ctx = TokenContext::new();
		let err = cache
			.token(&ctx.with_expired_token())
			.await
			.expect_err("Empty access tokens must not be handed out.");

		assert!(matches!(err, Error::UnusableToken { ref reason } if reason.contains("empty")));
		assert_eq!(cache.token(&ctx).await.ok(), Some(seed));
		assert_eq!(cache_metrics(&cache).failures(), 1);
		assert_eq!(cache_metrics(&cache).refreshes(), 0);
	}

	#[tokio::test]
	async fn expired_record_from_source_is_rejected() {
		let scripted = Arc::new(ScriptedSource::new([
			Ok(test_record("late", None, Duration::seconds(-1))),
			Ok(test_record("fresh", None, Duration::minutes(1))),
		]));
		let cache = cache_over(None, &scripted);
		let ctx = TokenContext::new();

		assert!(matches!(cache.token(&ctx).await, Err(Error::UnusableToken { .. })));
		assert_eq!(
			cache.token(&ctx).await.ok().map(|record| record.access_token.expose().to_owned()),
			Some("fresh".into())
		);
		assert_eq!(scripted.calls(), 2);
	}

	#[tokio::test]
	async fn hits_and_refreshes_report_distinct_outcomes() {
		let scripted = Arc::new(ScriptedSource::new([Ok(test_record(
			"A",
			None,
			Duration::minutes(1),
		))]));
		let cache = CachingTokenSource::new(None, scripted.clone());
		let ctx = TokenContext::new();
		let (_, first) = cache.token_inner(&ctx).await.expect("First call should refresh.");
		let (_, second) = cache.token_inner(&ctx).await.expect("Second call should hit.");

		assert_eq!(first, FlowOutcome::Success);
		assert_eq!(second, FlowOutcome::Hit);
	}

	#[tokio::test]
	async fn failed_refresh_of_expired_record_is_retried_by_next_caller() {
		let stale = test_record("stale", None, Duration::seconds(-5));
		let fresh = test_record("fresh", None, Duration::minutes(5));
		let scripted = Arc::new(ScriptedSource::new([
			Err(Error::InvalidGrant { reason: "try again".into() }),
			Ok(fresh.clone()),
		]));
		let cache = cache_over(Some(stale), &scripted);
		let ctx = TokenContext::new();

		assert!(cache.token(&ctx).await.is_err());
		assert_eq!(cache.token(&ctx).await.ok(), Some(fresh));
		assert_eq!(scripted.calls(), 2);
	}

	#[tokio::test]
	async fn cancelled_context_fails_before_locking() {
		let scripted = Arc::new(ScriptedSource::new([Ok(test_record(
			"A",
			None,
			Duration::minutes(1),
		))]));
		let cache = cache_over(None, &scripted);
		let ctx = TokenContext::new();

		ctx.cancel();

		assert!(matches!(cache.token(&ctx).await, Err(Error::Cancelled)));
		assert_eq!(scripted.calls(), 0);
		assert!(cache.token(&TokenContext::new()).await.is_ok(), "Mutex must not stay held.");
		assert_eq!(cache_metrics(&cache).cancellations(), 1);
	}

	#[tokio::test]
	async fn concurrent_callers_share_one_exchange() {
		let record = test_record("shared", None, Duration::minutes(1));
		let scripted = Arc::new(
			ScriptedSource::new([Ok(record.clone())]).with_delay(StdDuration::from_millis(50)),
		);
		let cache = cache_over(None, &scripted);
		let handles = (0..10)
			.map(|_| {
				let cache = cache.clone();

				tokio::spawn(async move { cache.token(&TokenContext::new()).await })
			})
			.collect::<Vec<_>>();

		for handle in handles {
			let result = handle.await.expect("Caller task should not panic.");

			assert_eq!(result.ok(), Some(record.clone()));
		}

		assert_eq!(scripted.calls(), 1);
		assert_eq!(scripted.max_in_flight(), 1);
	}

	#[tokio::test]
	async fn waiter_cancelled_while_holder_refreshes() {
		let record = test_record("slow", None, Duration::minutes(1));
		let scripted = Arc::new(
			ScriptedSource::new([Ok(record.clone())]).with_delay(StdDuration::from_millis(300)),
		);
		let cache = cache_over(None, &scripted);
		let holder = {
			let cache = cache.clone();

			tokio::spawn(async move { cache.token(&TokenContext::new()).await })
		};

		tokio::time::sleep(StdDuration::from_millis(20)).await;

		let waiter_ctx = TokenContext::new();
		let waiter = {
			let cache = cache.clone();
			let ctx = waiter_ctx.clone();

			tokio::spawn(async move { cache.token(&ctx).await })
		};

		tokio::time::sleep(StdDuration::from_millis(20)).await;
		waiter_ctx.cancel();

		let waited = waiter.await.expect("Waiter task should not panic.");

		assert!(matches!(waited, Err(Error::Cancelled)));
		assert!(!holder.is_finished(), "Waiter must return before the exchange completes.");
		assert_eq!(holder.await.expect("Holder task should not panic.").ok(), Some(record.clone()));
		assert_eq!(cache.token(&TokenContext::new()).await.ok(), Some(record));
		assert_eq!(scripted.calls(), 1);
	}

	#[tokio::test]
	async fn waiter_deadline_elapses_while_queued() {
		let scripted = Arc::new(
			ScriptedSource::new([Ok(test_record("slow", None, Duration::minutes(1)))])
				.with_delay(StdDuration::from_millis(300)),
		);
		let cache = cache_over(None, &scripted);
		let holder = {
			let cache = cache.clone();

			tokio::spawn(async move { cache.token(&TokenContext::new()).await })
		};

		tokio::time::sleep(StdDuration::from_millis(20)).await;

		let ctx = TokenContext::new().with_timeout(StdDuration::from_millis(30));

		assert!(matches!(cache.token(&ctx).await, Err(Error::DeadlineExceeded)));
		assert!(holder.await.expect("Holder task should not panic.").is_ok());
	}

	#[tokio::test]
	async fn holder_cancelled_mid_exchange_releases_the_mutex() {
		let seed = test_record("kept", None, Duration::seconds(-1));
		let fresh = test_record("later", None, Duration::minutes(1));
		let scripted = Arc::new(
			ScriptedSource::new([Ok(fresh.clone()), Ok(fresh.clone())])
				.with_delay(StdDuration::from_millis(100)),
		);
		let cache = cache_over(Some(seed), &scripted);
		let ctx = TokenContext::new().with_timeout(StdDuration::from_millis(20));

		assert!(matches!(cache.token(&ctx).await, Err(Error::DeadlineExceeded)));
		assert_eq!(cache.token(&TokenContext::new()).await.ok(), Some(fresh));
	}

	#[test]
	fn wrapping_a_cache_without_seed_returns_the_same_instance() {
		let scripted = Arc::new(ScriptedSource::new([]));
		let inner = cache_over(None, &scripted);
		let outer =
			reuse_token_source(None, inner.clone()).expect("Rewrapping without seed should work.");

		assert!(ptr::addr_eq(Arc::as_ptr(&inner), Arc::as_ptr(&outer)));
		assert!(ptr::addr_eq(
			Arc::as_ptr(&inner),
			Arc::as_ptr(&CachingTokenSource::wrap(inner.clone()))
		));
	}

	#[test]
	fn seeding_over_a_cache_is_rejected() {
		let scripted = Arc::new(ScriptedSource::new([]));
		let inner = cache_over(None, &scripted);
		let err = reuse_token_source(Some(test_record("seed", None, Duration::minutes(1))), inner)
			.err()
			.expect("Seeding over a cache must fail.");

		assert!(matches!(err, Error::Config(ConfigError::SeedOverCachingSource)));
	}
}
