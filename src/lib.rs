//! Context-aware OAuth 2.0 token sources: single-flight refresh caches, rotating refresh
//! tokens, and per-call HTTP client overrides carried on a cancellable request context.
//!
//! The crate is organised around [`source::TokenSource`], a one-method capability that
//! produces a [`auth::TokenRecord`] for a [`context::TokenContext`]. Wrap any source once
//! with [`source::reuse_token_source`] and share the result: the caching layer serves the
//! held record while it is valid and coalesces refreshes so only one exchange is in flight
//! per cache.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod client;
pub mod context;
pub mod error;
pub mod flows;
pub mod grpc;
pub mod http;
pub mod oauth;
pub mod obs;
pub mod options;
pub mod source;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		auth::TokenRecord,
		context::TokenContext,
		oauth::{AuthStyle, Endpoint},
		source::{TokenFuture, TokenSource},
	};

	/// Builds an [`Endpoint`] whose token URL points at `token_url` and authenticates the
	/// client through form parameters, matching the mock token endpoints used in tests.
	pub fn test_endpoint(token_url: &str) -> Endpoint {
		Endpoint::new(Url::parse(token_url).expect("Mock token endpoint should parse."))
			.with_auth_style(AuthStyle::Params)
	}

	/// Builds a record that expires `ttl` from now.
	pub fn test_record(access: &str, refresh: Option<&str>, ttl: Duration) -> TokenRecord {
		let mut builder =
			TokenRecord::builder().access_token(access).expires_at(OffsetDateTime::now_utc() + ttl);

		if let Some(value) = refresh {
			builder = builder.refresh_token(value);
		}

		builder.build().expect("Token record fixture should build successfully.")
	}

	/// Scripted [`TokenSource`] that counts calls, tracks overlapping calls, and replays a
	/// queue of results after an optional delay.
	#[derive(Debug, Default)]
	pub struct ScriptedSource {
		responses: Mutex<Vec<Result<TokenRecord>>>,
		delay: std::time::Duration,
		calls: AtomicUsize,
		in_flight: AtomicUsize,
		max_in_flight: AtomicUsize,
	}
	impl ScriptedSource {
		/// Creates a source that replays `responses` in order.
		pub fn new(responses: impl IntoIterator<Item = Result<TokenRecord>>) -> Self {
			let mut responses = responses.into_iter().collect::<Vec<_>>();

			responses.reverse();

			Self { responses: Mutex::new(responses), ..Default::default() }
		}

		/// Sleeps for `delay` before resolving each call.
		pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
			self.delay = delay;

			self
		}

		/// Number of calls observed so far.
		pub fn calls(&self) -> usize {
			self.calls.load(Ordering::SeqCst)
		}

		/// Highest number of calls observed running at the same time.
		pub fn max_in_flight(&self) -> usize {
			self.max_in_flight.load(Ordering::SeqCst)
		}
	}
	impl TokenSource for ScriptedSource {
		fn token<'a>(&'a self, _ctx: &'a TokenContext) -> TokenFuture<'a> {
			Box::pin(async move {
				self.calls.fetch_add(1, Ordering::SeqCst);

				let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;

				self.max_in_flight.fetch_max(running, Ordering::SeqCst);

				if !self.delay.is_zero() {
					tokio::time::sleep(self.delay).await;
				}

				self.in_flight.fetch_sub(1, Ordering::SeqCst);

				self.responses.lock().pop().unwrap_or_else(|| {
					Err(Error::Source("Scripted source ran out of responses.".into()))
				})
			})
		}
	}
}

mod _prelude {
	pub use std::{
		borrow::Cow,
		collections::{BTreeMap, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::{
			Arc,
			atomic::{AtomicU64, AtomicUsize, Ordering},
		},
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::Mutex;
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use tokio_util::sync::CancellationToken;
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use oauth2;
pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
