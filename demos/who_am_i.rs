//! Demonstrates building a session with a persisted token pair, fetching the
//! authenticated user, and receiving rotated pairs through the rotation sink.

// std
use std::sync::Arc;
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
// self
use clio_session::{
	auth::{Credentials, TokenPair},
	http::ReqwestTransport,
	reqwest::Client,
	session::Session,
	url::Url,
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let stale_mock = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/api/v4/users/who_am_i.json")
				.header("authorization", "Bearer demo-stale");
			then.status(401).body("{\"error\":\"Unauthorized\"}");
		})
		.await;
	let token_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth/token");
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"demo-fresh\",\"refresh_token\":\"demo-refresh-2\",\"token_type\":\"bearer\",\"expires_in\":3600}",
			);
		})
		.await;
	let fresh_mock = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/api/v4/users/who_am_i.json")
				.header("authorization", "Bearer demo-fresh");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"data\":{\"id\":1,\"name\":\"Demo User\"}}");
		})
		.await;
	let transport = ReqwestTransport::with_client(
		Client::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.build()?,
	);
	let session = Session::builder(Credentials::new("demo-client", "demo-secret"))
		.endpoint(Url::parse(&server.base_url())?)
		.token(TokenPair::new("demo-stale").with_refresh_token("demo-refresh-1"))
		.transport(Arc::new(transport))
		.build()?;

	session.on_rotate(|pair| {
		// A real application would persist the pair here.
		println!("Rotated pair; expires at {:?}.", pair.expires_at);
	});

	let user = session.who_am_i().await?;

	println!("Authenticated as: {}.", user["data"]["name"]);

	stale_mock.assert_async().await;
	token_mock.assert_async().await;
	fresh_mock.assert_async().await;

	Ok(())
}
