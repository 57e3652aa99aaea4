//! Refresh-token exchange that rotates its own credential.

// self
use crate::{
	_prelude::*,
	auth::{TokenRecord, TokenSecret},
	context::TokenContext,
	error::ConfigError,
	oauth::TokenEndpointClient,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	options::TokenSourceOptions,
	source::{TokenFuture, TokenSource},
};

/// [`TokenSource`] performing `grant_type=refresh_token` with a rotating credential.
///
/// After each successful exchange the credential is replaced with the one the server
/// returned; when the server omits it, the previous credential is kept and copied into the
/// returned record.
///
/// # Concurrency
///
/// A refresher is not meant to be called concurrently. Two overlapping exchanges would
/// present the same credential, and providers that rotate refresh tokens reject the second
/// one. Always reach it through a caching layer
/// ([`reuse_token_source`](crate::source::reuse_token_source)), which serializes calls.
///
/// An exchange abandoned because the caller's context ended keeps the old credential, even
/// if the server already rotated it. The next call presents the old credential again, which
/// fails with [`Error::InvalidGrant`] on servers that revoke reused refresh tokens.
pub struct TokenRefresher {
	client: TokenEndpointClient,
	options: TokenSourceOptions,
	refresh_token: Mutex<Option<TokenSecret>>,
}
impl TokenRefresher {
	/// Creates a refresher starting from `refresh_token`.
	///
	/// `None` (or an empty secret) means there is no session to refresh; every call then
	/// fails with [`ConfigError::MissingRefreshToken`].
	pub fn new(
		client: TokenEndpointClient,
		refresh_token: Option<TokenSecret>,
		options: TokenSourceOptions,
	) -> Self {
		Self { client, options, refresh_token: Mutex::new(refresh_token) }
	}

	/// Credential that the next exchange will present.
	pub fn refresh_token(&self) -> Option<TokenSecret> {
		self.refresh_token.lock().clone()
	}

	async fn refresh(&self, ctx: &TokenContext) -> Result<TokenRecord> {
		ctx.check()?;

		let current = self
			.refresh_token()
			.filter(|secret| !secret.is_empty())
			.ok_or(ConfigError::MissingRefreshToken)?;
		let ctx = self.options.apply(ctx);
		let record = self.client.refresh(&ctx, &current).await?;
		let record = match record.refresh_token.as_ref() {
			Some(rotated) if !rotated.is_empty() => record,
			_ => record.with_refresh_token(current),
		};

		*self.refresh_token.lock() = record.refresh_token.clone();

		Ok(record)
	}
}
impl TokenSource for TokenRefresher {
	fn token<'a>(&'a self, ctx: &'a TokenContext) -> TokenFuture<'a> {
		const KIND: FlowKind = FlowKind::Refresh;

		Box::pin(async move {
			let span = FlowSpan::new(KIND, "token");

			obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

			let result = span.instrument(self.refresh(ctx)).await;

			if result.is_ok() {
				obs::debug_event(KIND, "refresh token exchange succeeded");
			}

			obs::record_flow_outcome(KIND, FlowOutcome::of(&result));

			result
		})
	}
}
impl Debug for TokenRefresher {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenRefresher")
			.field("options", &self.options)
			.field("refresh_token", &self.refresh_token.lock())
			.finish()
	}
}
