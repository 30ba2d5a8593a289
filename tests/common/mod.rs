//! Shared session constructors for the integration suites.

#![allow(dead_code)]

// std
use std::sync::Arc;
// crates.io
use url::Url;
// self
use clio_session::{
	auth::{Credentials, TokenPair},
	http::ReqwestTransport,
	reqwest::Client,
	session::{Session, SessionBuilder},
};

/// Builds a reqwest transport that accepts the self-signed certificates produced by
/// `httpmock`.
pub fn test_reqwest_transport() -> ReqwestTransport {
	let client = Client::builder()
		.danger_accept_invalid_certs(true)
		.danger_accept_invalid_hostnames(true)
		.build()
		.expect("Failed to build insecure Reqwest client for tests.");

	ReqwestTransport::with_client(client)
}

/// Returns a [`SessionBuilder`] pointed at a mock server endpoint with the insecure
/// transport used across the suites.
pub fn test_session_builder(endpoint: &str) -> SessionBuilder {
	let endpoint = Url::parse(endpoint).expect("Mock endpoint URL should parse successfully.");

	Session::builder(Credentials::new("client-test", "secret-test"))
		.endpoint(endpoint)
		.transport(Arc::new(test_reqwest_transport()))
}

/// Constructs a [`Session`] against a mock server, optionally seeded with a token pair.
pub fn build_test_session(endpoint: &str, token: Option<TokenPair>) -> Session {
	let mut builder = test_session_builder(endpoint);

	if let Some(token) = token {
		builder = builder.token(token);
	}

	builder.build().expect("Test session should build successfully.")
}
