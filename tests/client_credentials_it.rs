// crates.io
use httpmock::prelude::*;
use serde_json::json;
// self
use oauth2_ctx::{
	auth::ScopeSet,
	client::new_client,
	context::TokenContext,
	error::{Error, TransientError},
	flows::ClientCredentials,
	grpc::PerRpcCredentials,
	oauth::{AuthStyle, Endpoint},
	options::{ClientOptions, RequestFlowOptions, TokenSourceOptions},
	source::TokenSource,
	url::Url,
};

const CLIENT_ID: &str = "svc-client";
const CLIENT_SECRET: &str = "svc-secret";

fn settings(server: &MockServer) -> ClientCredentials {
	let endpoint =
		Endpoint::new(Url::parse(&server.url("/token")).expect("Mock token endpoint should parse."))
			.with_auth_style(AuthStyle::Params);

	ClientCredentials::new(CLIENT_ID, CLIENT_SECRET, endpoint)
		.with_scopes(ScopeSet::new(["jobs.read", "jobs.write"]).expect("Scopes should be valid."))
		.with_endpoint_param("audience", "jobs-api")
}

#[tokio::test]
async fn one_shot_exchange_sends_scopes_and_extra_params() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/token")
				.form_urlencoded_tuple("grant_type", "client_credentials")
				.form_urlencoded_tuple("scope", "jobs.read jobs.write")
				.form_urlencoded_tuple("audience", "jobs-api")
				.form_urlencoded_tuple("client_id", CLIENT_ID);
			then.status(200).json_body(json!({
				"access_token": "cc-token",
				"token_type": "bearer",
				"expires_in": 600
			}));
		})
		.await;
	let record = settings(&server)
		.token(&TokenContext::new())
		.await
		.expect("Client credentials exchange should succeed.");

	mock.assert_async().await;

	assert_eq!(record.access_token.expose(), "cc-token");
	assert!(record.refresh_token.is_none());
	assert!(record.is_valid());
}

#[tokio::test]
async fn cached_source_exchanges_once() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(200).json_body(json!({
				"access_token": "cc-token",
				"token_type": "bearer",
				"expires_in": 600
			}));
		})
		.await;
	let source = settings(&server)
		.token_source(TokenSourceOptions::default())
		.expect("Token source should build.");

	for _ in 0..5 {
		let record = source.token(&TokenContext::new()).await.expect("Token should be served.");

		assert_eq!(record.access_token.expose(), "cc-token");
	}

	mock.assert_async().await;

	let metrics = source.as_caching_source().expect("Source should cache.").metrics();

	assert_eq!(metrics.refreshes(), 1);
	assert_eq!(metrics.hits(), 4);
}

#[tokio::test]
async fn authorized_client_attaches_the_bearer_header() {
	let server = MockServer::start_async().await;
	let token = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(200).json_body(json!({
				"access_token": "cc-token",
				"token_type": "bearer",
				"expires_in": 600
			}));
		})
		.await;
	let resource = server
		.mock_async(|when, then| {
			when.method(GET).path("/jobs").header("authorization", "Bearer cc-token");
			then.status(200).json_body(json!({ "jobs": [] }));
		})
		.await;
	let client =
		settings(&server).client(RequestFlowOptions::default()).expect("Client should build.");
	let ctx = TokenContext::new();

	for _ in 0..2 {
		let response = client
			.send(&ctx, client.get(server.url("/jobs")))
			.await
			.expect("Authorized request should succeed.");

		assert_eq!(response.status().as_u16(), 200);
	}

	token.assert_async().await;
	resource.assert_hits_async(2).await;
}

#[tokio::test]
async fn client_without_source_passes_requests_through() {
	let server = MockServer::start_async().await;
	let resource = server
		.mock_async(|when, then| {
			when.method(GET).path("/public");
			then.status(204);
		})
		.await;
	let client = new_client(None, ClientOptions::default());
	let response = client
		.send(&TokenContext::new(), client.get(server.url("/public")))
		.await
		.expect("Plain request should succeed.");

	resource.assert_async().await;

	assert_eq!(response.status().as_u16(), 204);
	assert!(response.headers().get("authorization").is_none());
}

#[tokio::test]
async fn unavailable_endpoint_reports_retry_after() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(503).header("retry-after", "30").json_body(json!({
				"error": "temporarily_unavailable",
				"error_description": "maintenance window"
			}));
		})
		.await;
	let err = settings(&server)
		.token(&TokenContext::new())
		.await
		.expect_err("Unavailable endpoints should fail.");

	mock.assert_async().await;

	match err {
		Error::Transient(TransientError::TokenEndpoint { status, retry_after, .. }) => {
			assert_eq!(status, Some(503));
			assert_eq!(retry_after, Some(time::Duration::seconds(30)));
		},
		other => panic!("Unexpected error: {other:?}."),
	}
}

#[tokio::test]
async fn grpc_metadata_uses_the_cached_token() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(200).json_body(json!({
				"access_token": "rpc-token",
				"token_type": "bearer",
				"expires_in": 600
			}));
		})
		.await;
	let credentials = PerRpcCredentials::new(
		settings(&server)
			.token_source(TokenSourceOptions::default())
			.expect("Token source should build."),
	);
	let ctx = TokenContext::new();

	for _ in 0..3 {
		let metadata = credentials
			.request_metadata(&ctx, &["https://jobs.example.com/jobs.v1.Jobs"])
			.await
			.expect("Metadata should be produced.");

		assert_eq!(metadata.get("authorization").map(String::as_str), Some("Bearer rpc-token"));
	}

	mock.assert_async().await;

	assert!(credentials.require_transport_security());
}
