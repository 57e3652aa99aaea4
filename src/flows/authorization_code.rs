//! Three-legged flow: consent URL, code exchange, and refresh-token sessions.

// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, TokenRecord},
	client::{AuthorizedClient, new_client},
	context::TokenContext,
	error::ConfigError,
	oauth::{Endpoint, TokenEndpointClient},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	options::{RequestFlowOptions, TokenSourceOptions},
	source::{TokenRefresher, TokenSource, reuse_token_source},
};

/// Settings for the three-legged authorization code flow.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
	/// OAuth 2.0 client identifier.
	pub client_id: String,
	/// Client secret; empty for public clients.
	#[serde(default, skip_serializing_if = "String::is_empty")]
	pub client_secret: String,
	/// Authorization and token endpoints.
	pub endpoint: Endpoint,
	/// Redirect URI registered for this client.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub redirect_url: Option<Url>,
	/// Scopes requested on the consent page.
	#[serde(default)]
	pub scopes: ScopeSet,
}
impl Config {
	/// Creates settings for `client_id` against `endpoint`.
	pub fn new(client_id: impl Into<String>, endpoint: Endpoint) -> Self {
		Self {
			client_id: client_id.into(),
			client_secret: String::new(),
			endpoint,
			redirect_url: None,
			scopes: ScopeSet::default(),
		}
	}

	/// Sets the client secret.
	pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
		self.client_secret = secret.into();

		self
	}

	/// Sets the redirect URI.
	pub fn with_redirect_url(mut self, redirect_url: Url) -> Self {
		self.redirect_url = Some(redirect_url);

		self
	}

	/// Replaces the requested scopes.
	pub fn with_scopes(mut self, scopes: ScopeSet) -> Self {
		self.scopes = scopes;

		self
	}

	/// Builds the consent page URL carrying `state`.
	pub fn auth_code_url(&self, state: &str) -> Result<Url> {
		let mut url = self.endpoint.auth_url.clone().ok_or(ConfigError::MissingAuthUrl)?;

		{
			let mut query = url.query_pairs_mut();

			query.append_pair("response_type", "code").append_pair("client_id", &self.client_id);

			if let Some(redirect) = &self.redirect_url {
				query.append_pair("redirect_uri", redirect.as_str());
			}
			if !self.scopes.is_empty() {
				query.append_pair("scope", &self.scopes.normalized());
			}

			query.append_pair("state", state);
		}

		Ok(url)
	}

	/// Exchanges an authorization `code` for a record.
	pub async fn exchange(&self, ctx: &TokenContext, code: &str) -> Result<TokenRecord> {
		const KIND: FlowKind = FlowKind::AuthorizationCode;

		let span = FlowSpan::new(KIND, "exchange");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async {
				self.endpoint_client()?
					.authorization_code(ctx, code, self.redirect_url.as_ref())
					.await
			})
			.await;

		obs::record_flow_outcome(KIND, FlowOutcome::of(&result));

		result
	}

	/// Builds a cached source that keeps the session in `seed` alive.
	///
	/// The seed's refresh token seeds the refresher; while the seed is valid it is served
	/// as is. Without a seed (or refresh token) the first refresh fails with
	/// [`ConfigError::MissingRefreshToken`].
	pub fn token_source(
		&self,
		seed: Option<TokenRecord>,
		options: TokenSourceOptions,
	) -> Result<Arc<dyn TokenSource>> {
		let refresh_token = seed.as_ref().and_then(|record| record.refresh_token.clone());
		let refresher = TokenRefresher::new(self.endpoint_client()?, refresh_token, options);

		reuse_token_source(seed, Arc::new(refresher))
	}

	/// Builds an [`AuthorizedClient`] over [`token_source`](Self::token_source).
	pub fn client(
		&self,
		seed: Option<TokenRecord>,
		options: RequestFlowOptions,
	) -> Result<AuthorizedClient> {
		let source = self.token_source(seed, options.token_source_options())?;

		Ok(new_client(Some(source), options.client_options()))
	}

	fn endpoint_client(&self) -> Result<TokenEndpointClient> {
		TokenEndpointClient::new(&self.client_id, &self.client_secret, &self.endpoint)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::_preludet::{test_endpoint, test_record};

	fn config() -> Config {
		Config::new("web-app", test_endpoint("http://127.0.0.1:9/token"))
			.with_client_secret("secret")
			.with_scopes(ScopeSet::new(["profile", "email"]).expect("Scopes should be valid."))
	}

	#[test]
	fn consent_url_carries_client_scopes_and_state() {
		let config = config()
			.with_redirect_url(Url::parse("https://app.example.com/cb").expect("URL should parse."));
		let mut endpoint = config.endpoint.clone();

		endpoint.auth_url = Some(
			Url::parse("https://auth.example.com/authorize?prompt=consent")
				.expect("URL should parse."),
		);

		let url = Config { endpoint, ..config }.auth_code_url("xyz").expect("URL should build.");
		let pairs = url.query_pairs().into_owned().collect::<HashMap<_, _>>();

		assert_eq!(pairs.get("prompt").map(String::as_str), Some("consent"));
		assert_eq!(pairs.get("response_type").map(String::as_str), Some("code"));
		assert_eq!(pairs.get("client_id").map(String::as_str), Some("web-app"));
		assert_eq!(
			pairs.get("redirect_uri").map(String::as_str),
			Some("https://app.example.com/cb")
		);
		assert_eq!(pairs.get("scope").map(String::as_str), Some("email profile"));
		assert_eq!(pairs.get("state").map(String::as_str), Some("xyz"));
	}

	#[test]
	fn consent_url_requires_an_authorization_endpoint() {
		let err = config().auth_code_url("state").expect_err("Missing auth URL must fail.");

		assert!(matches!(err, Error::Config(ConfigError::MissingAuthUrl)));
	}

	#[tokio::test]
	async fn valid_seed_is_served_without_refreshing() {
		let seed = test_record("seeded", Some("R0"), Duration::minutes(10));
		let source = config()
			.token_source(Some(seed.clone()), TokenSourceOptions::default())
			.expect("Source should build.");

		assert_eq!(source.token(&TokenContext::new()).await.ok(), Some(seed));
	}

	#[tokio::test]
	async fn missing_seed_reports_missing_refresh_token() {
		let source =
			config().token_source(None, TokenSourceOptions::default()).expect("Source should build.");
		let err = source.token(&TokenContext::new()).await.expect_err("No session to refresh.");

		assert!(matches!(err, Error::Config(ConfigError::MissingRefreshToken)));
	}
}
