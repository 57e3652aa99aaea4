//! Token source capability and its implementations.
//!
//! [`TokenSource`] is the single seam every caller goes through: given a
//! [`TokenContext`], produce a [`TokenRecord`] or fail. The submodules provide:
//!
//! - [`adopt`]: adapters turning external fetch functions and factories into sources,
//! - [`refresh`]: [`TokenRefresher`], the rotating `refresh_token` exchange,
//! - [`cache`]: [`CachingTokenSource`], the single-flight cache every caller should share.

pub mod adopt;
pub mod cache;
pub mod refresh;

pub use adopt::*;
pub use cache::*;
pub use refresh::*;

// self
use crate::{_prelude::*, auth::TokenRecord, context::TokenContext};

/// Boxed future returned by [`TokenSource::token`].
pub type TokenFuture<'a> = Pin<Box<dyn Future<Output = Result<TokenRecord>> + 'a + Send>>;

/// Capability that produces a token record for a cancellable context.
pub trait TokenSource
where
	Self: Send + Sync,
{
	/// Fetches a token record.
	fn token<'a>(&'a self, ctx: &'a TokenContext) -> TokenFuture<'a>;

	/// Returns `Some` when this source is itself a caching layer.
	///
	/// Only [`CachingTokenSource`] overrides this. [`reuse_token_source`] uses it to avoid
	/// stacking a second cache on top of an existing one.
	fn as_caching_source(&self) -> Option<&CachingTokenSource> {
		None
	}
}
impl<T> TokenSource for Arc<T>
where
	T: ?Sized + TokenSource,
{
	fn token<'a>(&'a self, ctx: &'a TokenContext) -> TokenFuture<'a> {
		(**self).token(ctx)
	}

	fn as_caching_source(&self) -> Option<&CachingTokenSource> {
		(**self).as_caching_source()
	}
}

/// Source that always returns the same record, mirroring a static credential.
#[derive(Clone, Debug)]
pub struct StaticTokenSource(TokenRecord);
impl StaticTokenSource {
	/// Wraps `record`.
	pub fn new(record: TokenRecord) -> Self {
		Self(record)
	}
}
impl TokenSource for StaticTokenSource {
	fn token<'a>(&'a self, ctx: &'a TokenContext) -> TokenFuture<'a> {
		Box::pin(async move {
			ctx.check()?;

			Ok(self.0.clone())
		})
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::_preludet::test_record;

	#[tokio::test]
	async fn static_source_honours_cancellation() {
		let record = test_record("static", None, Duration::minutes(5));
		let source = StaticTokenSource::new(record.clone());
		let ctx = TokenContext::new();

		assert_eq!(source.token(&ctx).await.ok(), Some(record));

		ctx.cancel();

		assert!(matches!(source.token(&ctx).await, Err(Error::Cancelled)));
		assert!(source.as_caching_source().is_none());
	}
}
