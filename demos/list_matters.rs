//! Demonstrates walking a cursor-paginated collection endpoint page by page.

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
	let next_url = format!("{}/api/v4/matters.json?page_token=demo-2", server.base_url());

	server
		.mock_async(|when, then| {
			when.method(GET).path("/api/v4/matters.json").query_param("order", "id(asc)");
			then.status(200).header("content-type", "application/json").body(format!(
				"{{\"data\":[{{\"id\":1,\"display_number\":\"00001-Demo\"}},{{\"id\":2,\"display_number\":\"00002-Demo\"}}],\"meta\":{{\"paging\":{{\"next\":\"{next_url}\"}}}}}}",
			));
		})
		.await;
	server
		.mock_async(|when, then| {
			when.method(GET).path("/api/v4/matters.json").query_param("page_token", "demo-2");
			then.status(200).header("content-type", "application/json").body(
				"{\"data\":[{\"id\":3,\"display_number\":\"00003-Demo\"}],\"meta\":{\"paging\":{}}}",
			);
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
		.token(TokenPair::new("demo-access"))
		.transport(Arc::new(transport))
		.build()?;
	let mut paginator = session.paginate("matters", &[("fields", "id,display_number")])?;
	let mut total = 0;

	while let Some(page) = paginator.next_page().await? {
		for record in &page.records {
			println!("Matter: {}.", record["display_number"]);
		}

		total += page.records.len();
	}

	println!("Walked {total} matters across the collection.");

	Ok(())
}
