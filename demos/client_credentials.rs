//! Demonstrates a cached client-credentials source behind an authorized HTTP client: several
//! resource calls share one token exchange.

// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
use url::Url;
// self
use oauth2_ctx::{
	auth::ScopeSet,
	context::TokenContext,
	flows::ClientCredentials,
	oauth::{AuthStyle, Endpoint},
	options::RequestFlowOptions,
	reqwest::Client,
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let token_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"demo-access\",\"token_type\":\"bearer\",\"expires_in\":900}",
			);
		})
		.await;
	let resource_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/reports").header("authorization", "Bearer demo-access");
			then.status(200).body("[]");
		})
		.await;
	let settings = ClientCredentials::new(
		"demo-client",
		"super-secret",
		Endpoint::new(Url::parse(&server.url("/token"))?).with_auth_style(AuthStyle::Params),
	)
	.with_scopes(ScopeSet::new(["reports.read"])?);
	let client = settings.client(
		RequestFlowOptions::default().with_request_client(Client::builder().build()?),
	)?;
	let ctx = TokenContext::new();

	for _ in 0..3 {
		let response = client.send(&ctx, client.get(server.url("/reports"))).await?;

		println!("Resource call returned {}.", response.status());
	}

	token_mock.assert_async().await;
	resource_mock.assert_hits_async(3).await;

	Ok(())
}
