//! HTTP client that authorizes resource requests with tokens from a [`TokenSource`].

// crates.io
use reqwest::{
	IntoUrl, Method, Request, RequestBuilder, Response,
	header::{AUTHORIZATION, HeaderValue},
};
// self
use crate::{
	_prelude::*,
	context::TokenContext,
	error::{ConfigError, TransportError},
	http::ReqwestHttpClient,
	options::ClientOptions,
	source::{CachingTokenSource, TokenSource},
};

/// Builds an [`AuthorizedClient`] over `source`.
///
/// The source is wrapped in a caching layer unless it already is one. Without a source
/// the client sends requests unchanged. The base client comes from
/// [`ClientOptions::request_client`], falling back to a default reqwest client.
pub fn new_client(
	source: Option<Arc<dyn TokenSource>>,
	options: ClientOptions,
) -> AuthorizedClient {
	AuthorizedClient {
		client: options.request_client().cloned().unwrap_or_default(),
		source: source.map(CachingTokenSource::wrap),
	}
}

/// reqwest client attaching `Authorization: <type> <token>` to every request it sends.
#[derive(Clone)]
pub struct AuthorizedClient {
	client: ReqwestHttpClient,
	source: Option<Arc<dyn TokenSource>>,
}
impl AuthorizedClient {
	/// Base client used for resource requests.
	pub fn http_client(&self) -> &ReqwestHttpClient {
		&self.client
	}

	/// Token source used to authorize requests, if any.
	pub fn token_source(&self) -> Option<&Arc<dyn TokenSource>> {
		self.source.as_ref()
	}

	/// Starts a request on the base client; send it with [`send`](Self::send).
	pub fn request(&self, method: Method, url: impl IntoUrl) -> RequestBuilder {
		self.client.request(method, url)
	}

	/// Shorthand for a `GET` request.
	pub fn get(&self, url: impl IntoUrl) -> RequestBuilder {
		self.request(Method::GET, url)
	}

	/// Shorthand for a `POST` request.
	pub fn post(&self, url: impl IntoUrl) -> RequestBuilder {
		self.request(Method::POST, url)
	}

	/// Builds and sends `builder`, authorizing it first.
	pub async fn send(&self, ctx: &TokenContext, builder: RequestBuilder) -> Result<Response> {
		let request = builder.build().map_err(TransportError::from)?;

		self.execute(ctx, request).await
	}

	/// Authorizes and executes `request`, racing both steps against `ctx`.
	pub async fn execute(&self, ctx: &TokenContext, mut request: Request) -> Result<Response> {
		if let Some(source) = &self.source {
			let record = source.token(ctx).await?;
			let mut value =
				HeaderValue::from_str(&record.authorization_value()).map_err(ConfigError::from)?;

			value.set_sensitive(true);
			request.headers_mut().insert(AUTHORIZATION, value);
		}

		ctx.run(async {
			self.client.execute(request).await.map_err(|e| Error::from(TransportError::from(e)))
		})
		.await
	}
}
impl Debug for AuthorizedClient {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AuthorizedClient")
			.field("client", &self.client)
			.field("authorized", &self.source.is_some())
			.finish()
	}
}
