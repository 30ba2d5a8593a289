#![cfg(feature = "reqwest")]

mod common;

// crates.io
use httpmock::prelude::*;
// self
use clio_session::{auth::TokenPair, session::Session};
use common::build_test_session;

const MATTERS: &str = "/api/v4/matters.json";

fn seeded_session(server: &MockServer) -> Session {
	build_test_session(&server.base_url(), Some(TokenPair::new("walker-access")))
}

fn page_body(ids: &[u64], next: Option<&str>) -> String {
	let records =
		ids.iter().map(|id| format!("{{\"id\":{id}}}")).collect::<Vec<_>>().join(",");
	let paging = match next {
		Some(next) => format!("{{\"next\":\"{next}\"}}"),
		None => "{}".into(),
	};

	format!("{{\"data\":[{records}],\"meta\":{{\"paging\":{paging}}}}}")
}

#[tokio::test]
async fn walk_follows_cursors_and_preserves_order() {
	let server = MockServer::start_async().await;
	let next_url = format!("{}{MATTERS}?page_token=p2", server.base_url());
	let first_mock = server
		.mock_async(|when, then| {
			when.method(GET)
				.path(MATTERS)
				.query_param("order", "id(asc)")
				.header("authorization", "Bearer walker-access");
			then.status(200)
				.header("content-type", "application/json")
				.body(page_body(&[1, 2, 3], Some(&next_url)));
		})
		.await;
	let second_mock = server
		.mock_async(|when, then| {
			when.method(GET).path(MATTERS).query_param("page_token", "p2");
			then.status(200)
				.header("content-type", "application/json")
				.body(page_body(&[4, 5], None));
		})
		.await;
	let session = seeded_session(&server);
	let records = session
		.paginate("matters", &[])
		.expect("Paginator should build successfully.")
		.collect()
		.await
		.expect("Two-page walk should succeed.");

	assert_eq!(
		records.iter().map(|record| record["id"].as_u64()).collect::<Vec<_>>(),
		vec![Some(1), Some(2), Some(3), Some(4), Some(5)],
	);

	first_mock.assert_calls_async(1).await;
	second_mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn empty_page_with_a_cursor_keeps_walking() {
	let server = MockServer::start_async().await;
	let next_url = format!("{}{MATTERS}?page_token=tail", server.base_url());
	let empty_mock = server
		.mock_async(|when, then| {
			when.method(GET).path(MATTERS).query_param("order", "id(asc)");
			then.status(200)
				.header("content-type", "application/json")
				.body(page_body(&[], Some(&next_url)));
		})
		.await;
	let tail_mock = server
		.mock_async(|when, then| {
			when.method(GET).path(MATTERS).query_param("page_token", "tail");
			then.status(200)
				.header("content-type", "application/json")
				.body(page_body(&[9], None));
		})
		.await;
	let session = seeded_session(&server);
	let records = session
		.paginate("matters", &[])
		.expect("Paginator should build successfully.")
		.collect()
		.await
		.expect("Walk across an empty page should succeed.");

	assert_eq!(records.len(), 1);
	assert_eq!(records[0]["id"], 9);

	empty_mock.assert_calls_async(1).await;
	tail_mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn abandoned_walk_issues_no_further_requests() {
	let server = MockServer::start_async().await;
	let next_url = format!("{}{MATTERS}?page_token=never", server.base_url());
	let first_mock = server
		.mock_async(|when, then| {
			when.method(GET).path(MATTERS).query_param("order", "id(asc)");
			then.status(200)
				.header("content-type", "application/json")
				.body(page_body(&[1, 2], Some(&next_url)));
		})
		.await;
	let second_mock = server
		.mock_async(|when, then| {
			when.method(GET).path(MATTERS).query_param("page_token", "never");
			then.status(200)
				.header("content-type", "application/json")
				.body(page_body(&[3], None));
		})
		.await;
	let session = seeded_session(&server);
	let mut paginator =
		session.paginate("matters", &[]).expect("Paginator should build successfully.");
	let page = paginator
		.next_page()
		.await
		.expect("First page fetch should succeed.")
		.expect("First page should be present.");

	assert_eq!(page.records.len(), 2);
	assert!(!paginator.is_exhausted());

	drop(paginator);

	first_mock.assert_calls_async(1).await;
	second_mock.assert_calls_async(0).await;
}

#[tokio::test]
async fn exhausted_walk_stays_exhausted() {
	let server = MockServer::start_async().await;
	let only_mock = server
		.mock_async(|when, then| {
			when.method(GET).path(MATTERS).query_param("order", "id(asc)");
			then.status(200)
				.header("content-type", "application/json")
				.body(page_body(&[42], None));
		})
		.await;
	let session = seeded_session(&server);
	let mut paginator =
		session.paginate("matters", &[]).expect("Paginator should build successfully.");

	assert!(
		paginator.next_page().await.expect("Final page fetch should succeed.").is_some(),
		"The single page should be yielded.",
	);
	assert!(paginator.is_exhausted());
	assert!(
		paginator.next_page().await.expect("Post-exhaustion call should succeed.").is_none(),
		"An exhausted walk should keep returning `None`.",
	);

	only_mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn listing_query_params_reach_the_server() {
	let server = MockServer::start_async().await;
	let filtered_mock = server
		.mock_async(|when, then| {
			when.method(GET)
				.path(MATTERS)
				.query_param("fields", "id,display_number")
				.query_param("order", "id(asc)");
			then.status(200)
				.header("content-type", "application/json")
				.body(page_body(&[11], None));
		})
		.await;
	let session = seeded_session(&server);
	let records = session
		.paginate("matters", &[("fields", "id,display_number")])
		.expect("Paginator should build successfully.")
		.collect()
		.await
		.expect("Filtered walk should succeed.");

	assert_eq!(records.len(), 1);

	filtered_mock.assert_calls_async(1).await;
}
