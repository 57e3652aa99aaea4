//! Option bags choosing which HTTP client performs token fetches and resource requests.
//!
//! The flows in [`flows`](crate::flows) accept a [`RequestFlowOptions`] and split it into
//! [`TokenSourceOptions`] (used only for the token exchange) and [`ClientOptions`] (used for
//! the authorized resource requests). Defaults are empty and leave behavior unchanged.

// self
use crate::{_prelude::*, context::TokenContext, http::ReqwestHttpClient};

/// Options for a whole request flow (token exchange plus resource requests).
#[derive(Clone, Debug, Default)]
pub struct RequestFlowOptions {
	token_client: Option<ReqwestHttpClient>,
	request_client: Option<ReqwestHttpClient>,
}
impl RequestFlowOptions {
	/// Uses `client` for both the token exchange and the resource requests.
	pub fn with_client(self, client: impl Into<ReqwestHttpClient>) -> Self {
		let client = client.into();

		self.with_token_client(client.clone()).with_request_client(client)
	}

	/// Uses `client` only for the token exchange.
	pub fn with_token_client(mut self, client: impl Into<ReqwestHttpClient>) -> Self {
		self.token_client = Some(client.into());

		self
	}

	/// Uses `client` only for the resource requests.
	pub fn with_request_client(mut self, client: impl Into<ReqwestHttpClient>) -> Self {
		self.request_client = Some(client.into());

		self
	}

	/// Token-source half of the options.
	pub fn token_source_options(&self) -> TokenSourceOptions {
		TokenSourceOptions { client: self.token_client.clone() }
	}

	/// Client half of the options.
	pub fn client_options(&self) -> ClientOptions {
		ClientOptions { request_client: self.request_client.clone() }
	}
}

/// Options applied by token sources before they contact the token endpoint.
#[derive(Clone, Debug, Default)]
pub struct TokenSourceOptions {
	client: Option<ReqwestHttpClient>,
}
impl TokenSourceOptions {
	/// Uses `client` for the token exchange.
	pub fn with_client(mut self, client: impl Into<ReqwestHttpClient>) -> Self {
		self.client = Some(client.into());

		self
	}

	/// Configured client, if any.
	pub fn client(&self) -> Option<&ReqwestHttpClient> {
		self.client.as_ref()
	}

	/// Returns `ctx` carrying the configured client, or `ctx` untouched when none is set.
	pub fn apply<'a>(&self, ctx: &'a TokenContext) -> Cow<'a, TokenContext> {
		match &self.client {
			Some(client) => Cow::Owned(ctx.with_http_client(client.clone())),
			None => Cow::Borrowed(ctx),
		}
	}
}

/// Options for the authorized HTTP client built by [`new_client`](crate::client::new_client).
#[derive(Clone, Debug, Default)]
pub struct ClientOptions {
	request_client: Option<ReqwestHttpClient>,
}
impl ClientOptions {
	/// Uses `client` as the base client for resource requests.
	pub fn with_request_client(mut self, client: impl Into<ReqwestHttpClient>) -> Self {
		self.request_client = Some(client.into());

		self
	}

	/// Configured base client, if any.
	pub fn request_client(&self) -> Option<&ReqwestHttpClient> {
		self.request_client.as_ref()
	}
}
