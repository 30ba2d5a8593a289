#![cfg(feature = "reqwest")]

mod common;

// std
use std::sync::{
	Arc,
	atomic::{AtomicUsize, Ordering},
};
// crates.io
use httpmock::prelude::*;
use parking_lot::Mutex;
use time::{Duration, OffsetDateTime};
// self
use clio_session::{
	auth::TokenPair,
	error::{AuthError, Error},
};
use common::build_test_session;

const WHO_AM_I: &str = "/api/v4/users/who_am_i.json";
const TOKEN: &str = "/oauth/token";

fn stale_pair() -> TokenPair {
	TokenPair::new("stale-access").with_refresh_token("stale-refresh")
}

#[tokio::test]
async fn unauthorized_call_rotates_and_retries_once() {
	let server = MockServer::start_async().await;
	let stale_mock = server
		.mock_async(|when, then| {
			when.method(GET).path(WHO_AM_I).header("authorization", "Bearer stale-access");
			then.status(401)
				.header("content-type", "application/json")
				.body("{\"error\":\"Unauthorized\"}");
		})
		.await;
	let token_mock = server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN);
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"fresh-access\",\"refresh_token\":\"fresh-refresh\",\"token_type\":\"bearer\",\"expires_in\":3600}",
			);
		})
		.await;
	let fresh_mock = server
		.mock_async(|when, then| {
			when.method(GET).path(WHO_AM_I).header("authorization", "Bearer fresh-access");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"data\":{\"id\":7,\"name\":\"Ada\"}}");
		})
		.await;
	let session = build_test_session(&server.base_url(), Some(stale_pair()));
	let rotations = Arc::new(AtomicUsize::new(0));
	let last_pair: Arc<Mutex<Option<TokenPair>>> = Arc::new(Mutex::new(None));

	{
		let rotations = rotations.clone();
		let last_pair = last_pair.clone();

		session.on_rotate(move |pair| {
			rotations.fetch_add(1, Ordering::SeqCst);
			*last_pair.lock() = Some(pair.clone());
		});
	}

	let user = session.who_am_i().await.expect("Retried call should succeed after rotation.");

	assert_eq!(user["data"]["id"], 7);
	assert_eq!(rotations.load(Ordering::SeqCst), 1);
	assert_eq!(
		last_pair.lock().as_ref().map(|pair| pair.access_token.expose().to_owned()),
		Some("fresh-access".to_owned()),
	);
	assert_eq!(
		session
			.token_store()
			.current()
			.expect("Store should hold the rotated pair.")
			.access_token
			.expose(),
		"fresh-access",
	);

	stale_mock.assert_async().await;
	token_mock.assert_async().await;
	fresh_mock.assert_async().await;
}

#[tokio::test]
async fn concurrent_expiry_detections_share_one_grant() {
	let server = MockServer::start_async().await;
	let token_mock = server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN);
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"joined-access\",\"refresh_token\":\"joined-refresh\",\"token_type\":\"bearer\",\"expires_in\":3600}",
			);
		})
		.await;
	let resource_mock = server
		.mock_async(|when, then| {
			when.method(GET).path(WHO_AM_I).header("authorization", "Bearer joined-access");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"data\":{\"id\":1}}");
		})
		.await;
	let expired = stale_pair().with_expires_at(OffsetDateTime::now_utc() - Duration::minutes(1));
	let session = build_test_session(&server.base_url(), Some(expired));
	let (first, second) = tokio::join!(session.who_am_i(), session.who_am_i());

	first.expect("First concurrent call should succeed.");
	second.expect("Second concurrent call should succeed.");

	token_mock.assert_calls_async(1).await;
	resource_mock.assert_calls_async(2).await;
	assert_eq!(session.token_store().stats().grants(), 1);
	assert_eq!(session.token_store().stats().reuses(), 1);
}

#[tokio::test]
async fn rejected_grant_surfaces_without_looping() {
	let server = MockServer::start_async().await;
	let resource_mock = server
		.mock_async(|when, then| {
			when.method(GET).path(WHO_AM_I);
			then.status(401)
				.header("content-type", "application/json")
				.body("{\"error\":\"Unauthorized\"}");
		})
		.await;
	let token_mock = server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN);
			then.status(400)
				.header("content-type", "application/json")
				.body("{\"error\":\"invalid_grant\"}");
		})
		.await;
	let session = build_test_session(&server.base_url(), Some(stale_pair()));
	let err = session
		.who_am_i()
		.await
		.expect_err("A rejected grant should surface instead of retrying forever.");

	assert!(matches!(err, Error::Auth(AuthError::Rejected { status: 400, .. })));

	resource_mock.assert_calls_async(1).await;
	token_mock.assert_calls_async(1).await;

	// Dead grant material is dropped so later calls fail fast.
	assert!(session.token_store().current().is_none());
}

#[tokio::test]
async fn still_unauthorized_retry_surfaces_auth_error() {
	let server = MockServer::start_async().await;
	let resource_mock = server
		.mock_async(|when, then| {
			when.method(GET).path(WHO_AM_I);
			then.status(401)
				.header("content-type", "application/json")
				.body("{\"error\":\"Unauthorized\"}");
		})
		.await;
	let token_mock = server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN);
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"doomed-access\",\"token_type\":\"bearer\",\"expires_in\":3600}",
			);
		})
		.await;
	let session = build_test_session(&server.base_url(), Some(stale_pair()));
	let err = session
		.who_am_i()
		.await
		.expect_err("A retry that stays unauthorized should surface an auth error.");

	assert!(matches!(err, Error::Auth(AuthError::RetryUnauthorized { status: 401 })));

	// Exactly one rotation and one retry; never a loop.
	resource_mock.assert_calls_async(2).await;
	token_mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn fresh_token_is_never_refreshed() {
	let server = MockServer::start_async().await;
	let token_mock = server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN);
			then.status(200).body("{}");
		})
		.await;
	let resource_mock = server
		.mock_async(|when, then| {
			when.method(GET).path(WHO_AM_I).header("authorization", "Bearer long-lived");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"data\":{\"id\":2}}");
		})
		.await;
	let pair = TokenPair::new("long-lived")
		.with_refresh_token("unused-refresh")
		.with_expires_at(OffsetDateTime::now_utc() + Duration::hours(1));
	let session = build_test_session(&server.base_url(), Some(pair));

	session.who_am_i().await.expect("Call with a fresh token should succeed.");
	session.who_am_i().await.expect("Second call with a fresh token should succeed.");

	token_mock.assert_calls_async(0).await;
	resource_mock.assert_calls_async(2).await;
	assert_eq!(session.token_store().stats().grants(), 0);
}

#[tokio::test]
async fn tokenless_session_acquires_on_first_call() {
	let server = MockServer::start_async().await;
	let token_mock = server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN);
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"minted-access\",\"token_type\":\"bearer\",\"expires_in\":900}",
			);
		})
		.await;
	let resource_mock = server
		.mock_async(|when, then| {
			when.method(GET).path(WHO_AM_I).header("authorization", "Bearer minted-access");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"data\":{\"id\":3}}");
		})
		.await;
	let session = build_test_session(&server.base_url(), None);
	let rotations = Arc::new(AtomicUsize::new(0));

	{
		let rotations = rotations.clone();

		session.on_rotate(move |_| {
			rotations.fetch_add(1, Ordering::SeqCst);
		});
	}

	session.who_am_i().await.expect("First call should mint a pair and succeed.");

	token_mock.assert_calls_async(1).await;
	resource_mock.assert_calls_async(1).await;
	assert_eq!(rotations.load(Ordering::SeqCst), 1);
}
