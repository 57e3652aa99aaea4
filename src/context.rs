//! Per-call request context: cancellation, deadline, and token-fetch side channels.
//!
//! A [`TokenContext`] travels with every [`TokenSource`](crate::source::TokenSource) call.
//! It carries a [`CancellationToken`], an optional deadline, and two values that only the
//! token layer reads:
//!
//! - an HTTP client override used for the token exchange itself, and
//! - a "treat as expired" marker that makes a caching source skip its fast path once.
//!
//! Contexts are cheap to clone. The `with_*` helpers return derived copies and never
//! mutate the original.

// std
use std::time::Duration as StdDuration;
// crates.io
use tokio::time::Instant;
// self
use crate::{_prelude::*, http::ReqwestHttpClient};

/// Cancellable, deadline-bearing context passed to token sources.
#[derive(Clone, Debug, Default)]
pub struct TokenContext {
	cancellation: CancellationToken,
	deadline: Option<Instant>,
	http_client: Option<ReqwestHttpClient>,
	expired_token: bool,
}
impl TokenContext {
	/// Creates a context that never cancels on its own and carries no overrides.
	pub fn new() -> Self {
		Self::default()
	}

	/// Creates a context driven by an existing cancellation token.
	pub fn with_cancellation(token: CancellationToken) -> Self {
		Self { cancellation: token, ..Self::default() }
	}

	/// Derives a context whose cancellation is a child of this one.
	///
	/// Cancelling the child leaves the parent untouched; cancelling the parent cancels the
	/// child.
	pub fn child(&self) -> Self {
		Self { cancellation: self.cancellation.child_token(), ..self.clone() }
	}

	/// Derives a context that expires at `deadline`, keeping any earlier deadline.
	pub fn with_deadline(&self, deadline: Instant) -> Self {
		let deadline = match self.deadline {
			Some(current) if current <= deadline => current,
			_ => deadline,
		};

		Self { deadline: Some(deadline), ..self.clone() }
	}

	/// Derives a context that expires `timeout` from now.
	pub fn with_timeout(&self, timeout: StdDuration) -> Self {
		self.with_deadline(Instant::now() + timeout)
	}

	/// Derives a context that makes the token exchange use `client`.
	pub fn with_http_client(&self, client: ReqwestHttpClient) -> Self {
		Self { http_client: Some(client), ..self.clone() }
	}

	/// Derives a context that forces caching sources to refresh even if the held record
	/// still looks valid (for example after a downstream `401`).
	pub fn with_expired_token(&self) -> Self {
		Self { expired_token: true, ..self.clone() }
	}

	/// Cancellation token backing this context.
	pub fn cancellation(&self) -> &CancellationToken {
		&self.cancellation
	}

	/// Deadline, if one was set.
	pub fn deadline(&self) -> Option<Instant> {
		self.deadline
	}

	/// HTTP client override for the token exchange; `None` means the backend default.
	pub fn http_client(&self) -> Option<&ReqwestHttpClient> {
		self.http_client.as_ref()
	}

	/// Returns `true` when the caller marked the cached token as expired.
	pub fn expired_token(&self) -> bool {
		self.expired_token
	}

	/// Cancels this context and every context derived from it with [`child`](Self::child).
	pub fn cancel(&self) {
		self.cancellation.cancel();
	}

	/// Returns the reason the context ended, or `Ok(())` while it is still live.
	pub fn check(&self) -> Result<()> {
		if self.cancellation.is_cancelled() {
			return Err(Error::Cancelled);
		}
		if self.deadline.is_some_and(|deadline| deadline <= Instant::now()) {
			return Err(Error::DeadlineExceeded);
		}

		Ok(())
	}

	/// Resolves once the context is cancelled or its deadline passes, yielding the reason.
	pub async fn done(&self) -> Error {
		match self.deadline {
			Some(deadline) => tokio::select! {
				_ = self.cancellation.cancelled() => Error::Cancelled,
				_ = tokio::time::sleep_until(deadline) => Error::DeadlineExceeded,
			},
			None => {
				self.cancellation.cancelled().await;

				Error::Cancelled
			},
		}
	}

	/// Runs `fut` unless the context ends first.
	pub async fn run<F, T>(&self, fut: F) -> Result<T>
	where
		F: Future<Output = Result<T>>,
	{
		tokio::select! {
			biased;

			reason = self.done() => Err(reason),
			result = fut => result,
		}
	}
}
