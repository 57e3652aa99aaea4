//! Optional observability helpers for token sources.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `oauth2_ctx.flow` with the `flow` (source
//!   kind) and `stage` (call site) fields, plus `debug` events on cache hits and refreshes.
//! - Enable `metrics` to increment the `oauth2_ctx_flow_total` counter for every
//!   attempt/hit/success/failure/cancellation, labeled by `flow` + `outcome`.

mod metrics;
mod tracing;

pub use self::metrics::*;
pub use self::tracing::*;

// self
use crate::_prelude::*;

/// Token source kinds observed by the crate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// Caching layer in front of another source.
	Cache,
	/// Refresh-token exchange.
	Refresh,
	/// Client Credentials exchange.
	ClientCredentials,
	/// Authorization code exchange.
	AuthorizationCode,
}
impl FlowKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::Cache => "cache",
			FlowKind::Refresh => "refresh",
			FlowKind::ClientCredentials => "client_credentials",
			FlowKind::AuthorizationCode => "authorization_code",
		}
	}
}
impl Display for FlowKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// Entry to a source.
	Attempt,
	/// Cached record served without contacting the wrapped source.
	Hit,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
	/// Caller's context ended first.
	Cancelled,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::Hit => "hit",
			FlowOutcome::Success => "success",
			FlowOutcome::Failure => "failure",
			FlowOutcome::Cancelled => "cancelled",
		}
	}

	/// Classifies a finished call.
	pub fn of<T>(result: &Result<T>) -> Self {
		match result {
			Ok(_) => FlowOutcome::Success,
			Err(err) if err.is_cancellation() => FlowOutcome::Cancelled,
			Err(_) => FlowOutcome::Failure,
		}
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
