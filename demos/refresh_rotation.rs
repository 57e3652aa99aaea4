//! Demonstrates a seeded three-legged session whose refresh token rotates on each exchange,
//! with concurrent callers coalescing onto a single refresh.

// std
use std::time::Duration as StdDuration;
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
use time::{Duration, OffsetDateTime};
use url::Url;
// self
use oauth2_ctx::{
	auth::TokenRecord,
	context::TokenContext,
	flows::Config,
	oauth::{AuthStyle, Endpoint},
	options::TokenSourceOptions,
	source::TokenSource,
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let token_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token").form_urlencoded_tuple("refresh_token", "refresh-0");
			then.status(200)
				.delay(StdDuration::from_millis(100))
				.header("content-type", "application/json")
				.body(
					"{\"access_token\":\"access-1\",\"refresh_token\":\"refresh-1\",\"token_type\":\"bearer\",\"expires_in\":3600}",
				);
		})
		.await;
	let config = Config::new(
		"demo-web-app",
		Endpoint::new(Url::parse(&server.url("/token"))?)
			.with_auth_url(Url::parse(&server.url("/authorize"))?)
			.with_auth_style(AuthStyle::Params),
	)
	.with_client_secret("super-secret");

	println!("Consent URL: {}.", config.auth_code_url("demo-state")?);

	// A session persisted earlier whose access token has already expired.
	let seed = TokenRecord::builder()
		.access_token("access-0")
		.refresh_token("refresh-0")
		.expires_at(OffsetDateTime::now_utc() - Duration::minutes(1))
		.build()?;
	let source = config.token_source(Some(seed), TokenSourceOptions::default())?;
	let tasks = (0..4)
		.map(|_| {
			let source = source.clone();

			tokio::spawn(async move { source.token(&TokenContext::new()).await })
		})
		.collect::<Vec<_>>();

	for task in tasks {
		let record = task.await??;

		println!(
			"Caller received {} (next refresh token: {:?}).",
			record.access_token.expose(),
			record.refresh_token.as_ref().map(|secret| secret.expose())
		);
	}

	token_mock.assert_async().await;

	Ok(())
}
