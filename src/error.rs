//! Crate-level error types shared across sources, flows, and transports.

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Boxed error used when wrapping failures from external token sources.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// The caller's context was cancelled.
	#[error("Context was cancelled.")]
	Cancelled,
	/// The caller's context deadline elapsed.
	#[error("Context deadline exceeded.")]
	DeadlineExceeded,
	/// Local configuration problem or API misuse.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Temporary upstream failure; retry with backoff.
	#[error(transparent)]
	Transient(#[from] TransientError),
	/// Transport failure (DNS, TCP, TLS).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Failure reported by an adopted external token source.
	#[error("Token source failed: {0}")]
	Source(#[source] BoxError),
	/// A token source produced a record that cannot authorize requests.
	#[error("Token source returned an unusable token: {reason}.")]
	UnusableToken {
		/// Why the record was rejected.
		reason: String,
	},

	/// Requested scopes exceed what the client may obtain.
	#[error("Token lacks the required scopes: {reason}.")]
	InsufficientScope {
		/// Provider-supplied reason string.
		reason: String,
	},
	/// Provider rejected the grant (e.g., bad or reused refresh token).
	#[error("Provider rejected the grant: {reason}.")]
	InvalidGrant {
		/// Provider-supplied reason string.
		reason: String,
	},
	/// Client authentication failed or credentials are malformed.
	#[error("Client authentication failed: {reason}.")]
	InvalidClient {
		/// Provider-supplied reason string.
		reason: String,
	},
}
impl Error {
	/// Wraps a failure raised by an external token source.
	pub fn source_failure(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Source(Box::new(src))
	}

	/// Returns `true` when the error stems from the caller's context ending.
	pub fn is_cancellation(&self) -> bool {
		matches!(self, Self::Cancelled | Self::DeadlineExceeded)
	}
}

/// Configuration and validation failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
	/// Endpoint configuration contains an invalid URL.
	#[error("Endpoint contains an invalid URL.")]
	InvalidEndpoint {
		/// Underlying parsing failure.
		#[source]
		source: oauth2::url::ParseError,
	},
	/// Token value cannot be sent as an `Authorization` header.
	#[error("Token cannot be encoded as an Authorization header value.")]
	InvalidHeaderValue(#[from] reqwest::header::InvalidHeaderValue),
	/// Endpoint has no authorization URL, so no consent URL can be built.
	#[error("Endpoint has no authorization URL.")]
	MissingAuthUrl,
	/// The refresher holds no refresh token to exchange.
	#[error("Token expired and no refresh token is available.")]
	MissingRefreshToken,
	/// Request scopes cannot be normalized.
	#[error("Requested scopes are invalid.")]
	InvalidScope(#[from] crate::auth::ScopeValidationError),
	/// Token record builder validation failed.
	#[error("Unable to build token record.")]
	TokenBuild(#[from] crate::auth::TokenRecordBuilderError),
	/// Token endpoint returned an excessively large `expires_in`.
	#[error("The expires_in value exceeds the supported range.")]
	ExpiresInOutOfRange,
	/// A seed record was supplied while wrapping a source that already caches.
	#[error("Refusing to seed a record over an existing caching token source.")]
	SeedOverCachingSource,
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Temporary failure variants (safe to retry).
#[derive(Debug, ThisError)]
pub enum TransientError {
	/// Provider returned an unexpected but non-fatal response.
	#[error("Token endpoint returned an unexpected response: {message}.")]
	TokenEndpoint {
		/// Message summarizing the failure.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// Token endpoint responded with malformed JSON that could not be parsed.
	#[error("Token endpoint returned malformed JSON.")]
	TokenResponseParse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::error::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the token endpoint.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the token endpoint.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}
