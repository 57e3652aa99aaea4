//! Immutable token record struct, validity helpers, and builder.

// self
use crate::{_prelude::*, auth::token::secret::TokenSecret};

/// Errors produced by [`TokenRecordBuilder`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum TokenRecordBuilderError {
	/// Issued when no (or an empty) access token value was provided.
	#[error("Access token is required.")]
	MissingAccessToken,
}

/// Immutable record describing an issued token.
///
/// A refresh produces a new record; existing records are never mutated in place.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
	/// Access token value; callers must avoid logging it.
	pub access_token: TokenSecret,
	/// Token type reported by the issuer. Empty means `Bearer`.
	#[serde(default)]
	pub token_type: String,
	/// Refresh token, if the issuer provided one.
	#[serde(default)]
	pub refresh_token: Option<TokenSecret>,
	/// Expiry instant. `None` means the token never expires.
	#[serde(default)]
	pub expires_at: Option<OffsetDateTime>,
}
impl TokenRecord {
	/// Returns a builder for constructing records.
	pub fn builder() -> TokenRecordBuilder {
		TokenRecordBuilder::default()
	}

	/// Returns `true` if the record carries an access value and has not expired at `instant`.
	pub fn is_valid_at(&self, instant: OffsetDateTime) -> bool {
		!self.access_token.is_empty() && !self.is_expired_at(instant)
	}

	/// Checks validity against the current UTC clock.
	pub fn is_valid(&self) -> bool {
		self.is_valid_at(OffsetDateTime::now_utc())
	}

	/// Returns `true` once `instant` reaches the expiry. Records without expiry never expire.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		self.expires_at.is_some_and(|expires_at| expires_at <= instant)
	}

	/// Token type with the common spellings canonicalized (`bearer` becomes `Bearer`).
	pub fn token_type(&self) -> &str {
		let raw = self.token_type.as_str();

		if raw.is_empty() || raw.eq_ignore_ascii_case("bearer") {
			"Bearer"
		} else if raw.eq_ignore_ascii_case("mac") {
			"MAC"
		} else if raw.eq_ignore_ascii_case("basic") {
			"Basic"
		} else {
			raw
		}
	}

	/// Formats the `Authorization` header value (`<type> <token>`).
	pub fn authorization_value(&self) -> String {
		format!("{} {}", self.token_type(), self.access_token.expose())
	}

	/// Returns a copy of the record carrying `refresh_token`.
	pub fn with_refresh_token(mut self, refresh_token: TokenSecret) -> Self {
		self.refresh_token = Some(refresh_token);

		self
	}
}
impl Debug for TokenRecord {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenRecord")
			.field("access_token", &"<redacted>")
			.field("token_type", &self.token_type)
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.field("expires_at", &self.expires_at)
			.finish()
	}
}

/// Builder for [`TokenRecord`].
#[derive(Clone, Debug, Default)]
pub struct TokenRecordBuilder {
	access_token: Option<TokenSecret>,
	token_type: Option<String>,
	refresh_token: Option<TokenSecret>,
	expires_at: Option<OffsetDateTime>,
	expires_in: Option<Duration>,
}
impl TokenRecordBuilder {
	/// Provides the access token value.
	pub fn access_token(mut self, token: impl Into<String>) -> Self {
		self.access_token = Some(TokenSecret::new(token));

		self
	}

	/// Provides the token type (`Bearer` when unset).
	pub fn token_type(mut self, token_type: impl Into<String>) -> Self {
		self.token_type = Some(token_type.into());

		self
	}

	/// Provides the refresh token value.
	pub fn refresh_token(mut self, token: impl Into<String>) -> Self {
		self.refresh_token = Some(TokenSecret::new(token));

		self
	}

	/// Sets an absolute expiry instant.
	pub fn expires_at(mut self, instant: OffsetDateTime) -> Self {
		self.expires_at = Some(instant);

		self
	}

	/// Sets an expiry relative to the moment [`build`](Self::build) runs.
	pub fn expires_in(mut self, duration: Duration) -> Self {
		self.expires_in = Some(duration);

		self
	}

	/// Consumes the builder and produces a [`TokenRecord`].
	pub fn build(self) -> Result<TokenRecord, TokenRecordBuilderError> {
		let access_token = self
			.access_token
			.filter(|token| !token.is_empty())
			.ok_or(TokenRecordBuilderError::MissingAccessToken)?;
		let expires_at = match (self.expires_at, self.expires_in) {
			(Some(instant), _) => Some(instant),
			(None, Some(delta)) => Some(OffsetDateTime::now_utc() + delta),
			(None, None) => None,
		};

		Ok(TokenRecord {
			access_token,
			token_type: self.token_type.unwrap_or_default(),
			refresh_token: self.refresh_token,
			expires_at,
		})
	}
}
