//! Client Credentials grant (`grant_type=client_credentials`).

// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, TokenRecord},
	client::{AuthorizedClient, new_client},
	context::TokenContext,
	oauth::{Endpoint, TokenEndpointClient},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	options::{RequestFlowOptions, TokenSourceOptions},
	source::{TokenSource, adopt_token_fetcher, reuse_token_source},
};

/// Settings for the two-legged client credentials flow.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientCredentials {
	/// OAuth 2.0 client identifier.
	pub client_id: String,
	/// Client secret.
	pub client_secret: String,
	/// Token endpoint and client authentication style.
	pub endpoint: Endpoint,
	/// Scopes requested with every exchange.
	#[serde(default)]
	pub scopes: ScopeSet,
	/// Additional form parameters sent to the token endpoint (for example `audience`).
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub endpoint_params: BTreeMap<String, String>,
}
impl ClientCredentials {
	/// Creates settings without scopes or extra parameters.
	pub fn new(
		client_id: impl Into<String>,
		client_secret: impl Into<String>,
		endpoint: Endpoint,
	) -> Self {
		Self {
			client_id: client_id.into(),
			client_secret: client_secret.into(),
			endpoint,
			scopes: ScopeSet::default(),
			endpoint_params: BTreeMap::new(),
		}
	}

	/// Replaces the requested scopes.
	pub fn with_scopes(mut self, scopes: ScopeSet) -> Self {
		self.scopes = scopes;

		self
	}

	/// Adds one extra form parameter.
	pub fn with_endpoint_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.endpoint_params.insert(key.into(), value.into());

		self
	}

	/// Performs one exchange using the context's HTTP client, or the default one.
	pub async fn token(&self, ctx: &TokenContext) -> Result<TokenRecord> {
		self.token_with_options(ctx, &TokenSourceOptions::default()).await
	}

	/// Performs one exchange using the client configured in `options`, if any.
	pub async fn token_with_options(
		&self,
		ctx: &TokenContext,
		options: &TokenSourceOptions,
	) -> Result<TokenRecord> {
		let client = self.endpoint_client()?;

		exchange(&client, self, &options.apply(ctx)).await
	}

	/// Builds a cached source that performs a new exchange whenever the held token expires.
	pub fn token_source(&self, options: TokenSourceOptions) -> Result<Arc<dyn TokenSource>> {
		let shared = Arc::new((self.endpoint_client()?, self.clone()));
		let fetcher = move |ctx: TokenContext| {
			let shared = shared.clone();

			async move { exchange(&shared.0, &shared.1, &ctx).await }
		};

		reuse_token_source(None, Arc::new(adopt_token_fetcher(fetcher, options)))
	}

	/// Builds an [`AuthorizedClient`] over [`token_source`](Self::token_source).
	pub fn client(&self, options: RequestFlowOptions) -> Result<AuthorizedClient> {
		let source = self.token_source(options.token_source_options())?;

		Ok(new_client(Some(source), options.client_options()))
	}

	fn endpoint_client(&self) -> Result<TokenEndpointClient> {
		TokenEndpointClient::new(&self.client_id, &self.client_secret, &self.endpoint)
	}
}

async fn exchange(
	client: &TokenEndpointClient,
	settings: &ClientCredentials,
	ctx: &TokenContext,
) -> Result<TokenRecord> {
	const KIND: FlowKind = FlowKind::ClientCredentials;

	let span = FlowSpan::new(KIND, "exchange");

	obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

	let result = span
		.instrument(client.client_credentials(ctx, &settings.scopes, &settings.endpoint_params))
		.await;

	obs::record_flow_outcome(KIND, FlowOutcome::of(&result));

	result
}
