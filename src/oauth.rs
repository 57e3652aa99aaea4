//! Token endpoint description and the `oauth2`-backed exchange client.
//!
//! [`Endpoint`] is plain configuration. [`TokenEndpointClient`] turns it plus the client
//! identity into an [`oauth2::basic::BasicClient`] and performs the grants the flows need.
//! Every exchange runs through the HTTP client carried by the [`TokenContext`] (falling back
//! to a shared redirect-free default) and is raced against the context.

// crates.io
use oauth2::{
	AuthType, AuthorizationCode, ClientId, ClientSecret, EndpointNotSet, EndpointSet,
	HttpClientError, RedirectUrl, RefreshToken, RequestTokenError, Scope, TokenResponse,
	TokenUrl,
	basic::{BasicClient, BasicErrorResponse, BasicRequestTokenError, BasicTokenResponse},
};
// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, TokenRecord, TokenSecret},
	context::TokenContext,
	error::{ConfigError, TransientError, TransportError},
	http::{ReqwestHttpClient, ResponseMetadata, ResponseMetadataSlot},
};

type ConfiguredBasicClient =
	BasicClient<EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// How the client authenticates against the token endpoint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthStyle {
	/// HTTP Basic authentication (`client_secret_basic`).
	#[default]
	Header,
	/// Credentials in the form body (`client_secret_post`).
	Params,
}

/// Authorization server endpoints.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
	/// Token endpoint used by every grant.
	pub token_url: Url,
	/// Authorization endpoint for three-legged flows.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub auth_url: Option<Url>,
	/// Client authentication style.
	#[serde(default)]
	pub auth_style: AuthStyle,
}
impl Endpoint {
	/// Creates an endpoint that only knows its token URL.
	pub fn new(token_url: Url) -> Self {
		Self { token_url, auth_url: None, auth_style: AuthStyle::default() }
	}

	/// Sets the authorization endpoint.
	pub fn with_auth_url(mut self, auth_url: Url) -> Self {
		self.auth_url = Some(auth_url);

		self
	}

	/// Overrides the client authentication style.
	pub fn with_auth_style(mut self, auth_style: AuthStyle) -> Self {
		self.auth_style = auth_style;

		self
	}
}

/// Performs token grants against one [`Endpoint`] on behalf of one client.
#[derive(Clone, Debug)]
pub struct TokenEndpointClient {
	oauth_client: ConfiguredBasicClient,
}
impl TokenEndpointClient {
	/// Builds the client; an empty `client_secret` means a public client.
	pub fn new(client_id: &str, client_secret: &str, endpoint: &Endpoint) -> Result<Self> {
		let token_url = TokenUrl::new(endpoint.token_url.to_string())
			.map_err(|source| ConfigError::InvalidEndpoint { source })?;
		let mut oauth_client =
			BasicClient::new(ClientId::new(client_id.to_owned())).set_token_uri(token_url);

		if !client_secret.is_empty() {
			oauth_client = oauth_client.set_client_secret(ClientSecret::new(client_secret.into()));
		}
		if endpoint.auth_style == AuthStyle::Params {
			oauth_client = oauth_client.set_auth_type(AuthType::RequestBody);
		}

		Ok(Self { oauth_client })
	}

	/// Exchanges `refresh_token` for a new record (`grant_type=refresh_token`).
	pub async fn refresh(
		&self,
		ctx: &TokenContext,
		refresh_token: &TokenSecret,
	) -> Result<TokenRecord> {
		let meta = ResponseMetadataSlot::default();
		let http = self.http_client(ctx)?.instrumented(meta.clone());
		let refresh_token = RefreshToken::new(refresh_token.expose().to_owned());
		let request = self.oauth_client.exchange_refresh_token(&refresh_token);
		let response = ctx
			.run(async {
				request
					.request_async(&http)
					.await
					.map_err(|err| map_request_error(meta.take(), err))
			})
			.await?;

		map_token_response(response)
	}

	/// Runs the client credentials grant with `scopes` and extra form parameters.
	pub async fn client_credentials(
		&self,
		ctx: &TokenContext,
		scopes: &ScopeSet,
		extra_params: &BTreeMap<String, String>,
	) -> Result<TokenRecord> {
		let meta = ResponseMetadataSlot::default();
		let http = self.http_client(ctx)?.instrumented(meta.clone());
		let mut request = self.oauth_client.exchange_client_credentials();

		for scope in scopes.iter() {
			request = request.add_scope(Scope::new(scope.to_owned()));
		}
		for (key, value) in extra_params {
			request = request.add_extra_param(key, value);
		}

		let response = ctx
			.run(async {
				request
					.request_async(&http)
					.await
					.map_err(|err| map_request_error(meta.take(), err))
			})
			.await?;

		map_token_response(response)
	}

	/// Exchanges an authorization `code` (`grant_type=authorization_code`).
	pub async fn authorization_code(
		&self,
		ctx: &TokenContext,
		code: &str,
		redirect_url: Option<&Url>,
	) -> Result<TokenRecord> {
		let meta = ResponseMetadataSlot::default();
		let http = self.http_client(ctx)?.instrumented(meta.clone());
		let mut request = self.oauth_client.exchange_code(AuthorizationCode::new(code.to_owned()));

		if let Some(redirect) = redirect_url {
			let redirect = RedirectUrl::new(redirect.to_string())
				.map_err(|source| ConfigError::InvalidEndpoint { source })?;

			request = request.set_redirect_uri(Cow::Owned(redirect));
		}

		let response = ctx
			.run(async {
				request
					.request_async(&http)
					.await
					.map_err(|err| map_request_error(meta.take(), err))
			})
			.await?;

		map_token_response(response)
	}

	fn http_client<'a>(&self, ctx: &'a TokenContext) -> Result<&'a ReqwestHttpClient> {
		match ctx.http_client() {
			Some(client) => Ok(client),
			None => Ok(ReqwestHttpClient::shared_without_redirects()?),
		}
	}
}

fn map_token_response(response: BasicTokenResponse) -> Result<TokenRecord> {
	let token_type: &str = response.token_type().as_ref();
	let mut builder = TokenRecord::builder()
		.access_token(response.access_token().secret().to_owned())
		.token_type(token_type);

	// A zero or missing `expires_in` means the token does not expire.
	if let Some(expires_in) = response.expires_in().filter(|value| !value.is_zero()) {
		let secs =
			i64::try_from(expires_in.as_secs()).map_err(|_| ConfigError::ExpiresInOutOfRange)?;
		let expires_at = OffsetDateTime::now_utc()
			.checked_add(Duration::seconds(secs))
			.ok_or(ConfigError::ExpiresInOutOfRange)?;

		builder = builder.expires_at(expires_at);
	}
	if let Some(refresh) = response.refresh_token() {
		builder = builder.refresh_token(refresh.secret().to_owned());
	}

	builder.build().map_err(|err| ConfigError::from(err).into())
}

/// Error categories for failed token requests.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ErrorClass {
	InvalidGrant,
	InvalidClient,
	InsufficientScope,
	Transient,
}

fn map_request_error(
	meta: Option<ResponseMetadata>,
	err: BasicRequestTokenError<HttpClientError<ReqwestError>>,
) -> Error {
	let meta = meta.as_ref();

	match err {
		RequestTokenError::ServerResponse(response) => map_server_response_error(response, meta),
		RequestTokenError::Request(error) => map_transport_error(meta, error),
		RequestTokenError::Parse(error, _body) =>
			TransientError::TokenResponseParse { source: error, status: meta_status(meta) }.into(),
		RequestTokenError::Other(message) => TransientError::TokenEndpoint {
			message,
			status: meta_status(meta),
			retry_after: meta_retry_after(meta),
		}
		.into(),
	}
}

fn map_server_response_error(
	response: BasicErrorResponse,
	meta: Option<&ResponseMetadata>,
) -> Error {
	let code: &str = response.error().as_ref();
	let description = response.error_description().map(String::as_str);
	let class = classify_oauth_error(code, description)
		.unwrap_or_else(|| classify_status(meta_status(meta)));
	let message = match description {
		Some(description) => format!("{code}: {description}"),
		None => code.to_owned(),
	};

	match class {
		ErrorClass::InvalidGrant => Error::InvalidGrant { reason: message },
		ErrorClass::InvalidClient => Error::InvalidClient { reason: message },
		ErrorClass::InsufficientScope => Error::InsufficientScope { reason: message },
		ErrorClass::Transient => TransientError::TokenEndpoint {
			message,
			status: meta_status(meta),
			retry_after: meta_retry_after(meta),
		}
		.into(),
	}
}

fn map_transport_error(
	meta: Option<&ResponseMetadata>,
	err: HttpClientError<ReqwestError>,
) -> Error {
	match err {
		HttpClientError::Reqwest(inner) => {
			let inner = *inner;

			if inner.is_builder() {
				return ConfigError::from(inner).into();
			}
			if inner.is_timeout() {
				return TransientError::TokenEndpoint {
					message: "request to the token endpoint timed out".into(),
					status: meta_status(meta).or_else(|| inner.status().map(|code| code.as_u16())),
					retry_after: meta_retry_after(meta),
				}
				.into();
			}

			TransportError::from(inner).into()
		},
		HttpClientError::Http(inner) => ConfigError::from(inner).into(),
		HttpClientError::Io(inner) => TransportError::Io(inner).into(),
		HttpClientError::Other(message) => TransientError::TokenEndpoint {
			message,
			status: meta_status(meta),
			retry_after: meta_retry_after(meta),
		}
		.into(),
		_ => TransientError::TokenEndpoint {
			message: "HTTP client failed while calling the token endpoint".into(),
			status: meta_status(meta),
			retry_after: meta_retry_after(meta),
		}
		.into(),
	}
}

fn classify_oauth_error(code: &str, description: Option<&str>) -> Option<ErrorClass> {
	match_error_code(code)
		.or_else(|| description.and_then(match_error_code))
		.or_else(|| description.and_then(classify_text))
}

fn match_error_code(value: &str) -> Option<ErrorClass> {
	const TABLE: [(&str, ErrorClass); 8] = [
		("invalid_grant", ErrorClass::InvalidGrant),
		("access_denied", ErrorClass::InvalidGrant),
		("invalid_client", ErrorClass::InvalidClient),
		("unauthorized_client", ErrorClass::InvalidClient),
		("invalid_scope", ErrorClass::InsufficientScope),
		("insufficient_scope", ErrorClass::InsufficientScope),
		("temporarily_unavailable", ErrorClass::Transient),
		("server_error", ErrorClass::Transient),
	];

	TABLE.iter().find(|(code, _)| value.eq_ignore_ascii_case(code)).map(|(_, class)| *class)
}

fn classify_text(text: &str) -> Option<ErrorClass> {
	let lowered = text.to_ascii_lowercase();

	match lowered.as_str() {
		text if text.contains("invalid_grant") => Some(ErrorClass::InvalidGrant),
		text if text.contains("invalid_client") => Some(ErrorClass::InvalidClient),
		text if text.contains("insufficient_scope") || text.contains("invalid_scope") =>
			Some(ErrorClass::InsufficientScope),
		text if text.contains("temporarily_unavailable") || text.contains("retry") =>
			Some(ErrorClass::Transient),
		_ => None,
	}
}

fn classify_status(status: Option<u16>) -> ErrorClass {
	match status {
		Some(400 | 404 | 410) => ErrorClass::InvalidGrant,
		Some(401) => ErrorClass::InvalidClient,
		Some(403) => ErrorClass::InsufficientScope,
		_ => ErrorClass::Transient,
	}
}

fn meta_status(meta: Option<&ResponseMetadata>) -> Option<u16> {
	meta.and_then(|value| value.status)
}

fn meta_retry_after(meta: Option<&ResponseMetadata>) -> Option<Duration> {
	meta.and_then(|value| value.retry_after)
}
