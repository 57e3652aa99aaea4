//! Adapters that turn external credential fetchers into [`TokenSource`]s.
//!
//! Two external shapes are supported:
//!
//! - [`TokenFetcher`]: "fetch a token for this context" (any `Fn(TokenContext) -> Future`).
//! - [`TokenSourceFactory`]: "given this context, hand me something that fetches without
//!   one" (any `Fn(TokenContext) -> impl ContextFreeTokenSource`). Factories typically read
//!   [`TokenContext::http_client`] while building the inner source.
//!
//! Both adapters inject the client from [`TokenSourceOptions`] into the context before
//! delegating. With no configured client the caller's context passes through as is.

// self
use crate::{
	_prelude::*,
	auth::TokenRecord,
	context::TokenContext,
	options::TokenSourceOptions,
	source::{TokenFuture, TokenSource},
};

/// External source that fetches a token for a context.
pub trait TokenFetcher
where
	Self: Send + Sync,
{
	/// Fetches a token using `ctx`.
	fn fetch<'a>(&'a self, ctx: TokenContext) -> TokenFuture<'a>;
}
impl<F, Fut> TokenFetcher for F
where
	F: Fn(TokenContext) -> Fut + Send + Sync,
	Fut: 'static + Future<Output = Result<TokenRecord>> + Send,
{
	fn fetch<'a>(&'a self, ctx: TokenContext) -> TokenFuture<'a> {
		Box::pin(self(ctx))
	}
}

/// Source that fetches without a context; produced by a [`TokenSourceFactory`].
pub trait ContextFreeTokenSource
where
	Self: Send + Sync,
{
	/// Fetches a token.
	fn token(&self) -> TokenFuture<'_>;
}
impl<F, Fut> ContextFreeTokenSource for F
where
	F: Fn() -> Fut + Send + Sync,
	Fut: 'static + Future<Output = Result<TokenRecord>> + Send,
{
	fn token(&self) -> TokenFuture<'_> {
		Box::pin(self())
	}
}

/// External factory building a context-free source for each context.
pub trait TokenSourceFactory
where
	Self: Send + Sync,
{
	/// Source type built per call.
	type Source: 'static + ContextFreeTokenSource;

	/// Builds a source bound to `ctx`.
	fn token_source(&self, ctx: TokenContext) -> Self::Source;
}
impl<F, S> TokenSourceFactory for F
where
	F: Fn(TokenContext) -> S + Send + Sync,
	S: 'static + ContextFreeTokenSource,
{
	type Source = S;

	fn token_source(&self, ctx: TokenContext) -> Self::Source {
		self(ctx)
	}
}

/// [`TokenFetcher`] built from a [`TokenSourceFactory`]: build, then fetch once.
#[derive(Debug)]
pub struct FactoryFetcher<G>(G);
impl<G> TokenFetcher for FactoryFetcher<G>
where
	G: TokenSourceFactory,
{
	fn fetch<'a>(&'a self, ctx: TokenContext) -> TokenFuture<'a> {
		let source = self.0.token_source(ctx);

		Box::pin(async move { source.token().await })
	}
}

/// [`TokenSource`] adapter around an external [`TokenFetcher`].
#[derive(Debug)]
pub struct AdoptedTokenSource<F> {
	fetcher: F,
	options: TokenSourceOptions,
}
impl<F> AdoptedTokenSource<F> {
	/// Options injected into every context before fetching.
	pub fn options(&self) -> &TokenSourceOptions {
		&self.options
	}
}
impl<F> TokenSource for AdoptedTokenSource<F>
where
	F: TokenFetcher,
{
	fn token<'a>(&'a self, ctx: &'a TokenContext) -> TokenFuture<'a> {
		self.fetcher.fetch(self.options.apply(ctx).into_owned())
	}
}

/// Adopts a context-aware fetcher as a [`TokenSource`].
pub fn adopt_token_fetcher<F>(fetcher: F, options: TokenSourceOptions) -> AdoptedTokenSource<F>
where
	F: TokenFetcher,
{
	AdoptedTokenSource { fetcher, options }
}

/// Adopts a per-context source factory as a [`TokenSource`].
pub fn adopt_token_factory<G>(
	factory: G,
	options: TokenSourceOptions,
) -> AdoptedTokenSource<FactoryFetcher<G>>
where
	G: TokenSourceFactory,
{
	AdoptedTokenSource { fetcher: FactoryFetcher(factory), options }
}
