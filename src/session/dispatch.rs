//! The auth interceptor every facade call funnels through.
//!
//! `dispatch` acquires a bearer from the token store, charges the rate window, executes
//! the request, refreshes and retries exactly once on 401, and honors server throttle
//! signals (429 `Retry-After` and throttle replies disguised as 200s) over the local
//! window estimate. A 401 retry re-issues the original request verbatim; the session
//! does not deduplicate non-idempotent calls beyond what the remote API guarantees.

// crates.io
use base64::{Engine as _, engine::general_purpose::STANDARD};
// self
use crate::{
	_prelude::*,
	error::{ApiError, AuthError, RateLimitError},
	http::{ApiRequest, ApiResponse},
	limit::LimitMode,
	obs::{self, CallKind, CallOutcome, CallSpan},
	session::Session,
};

/// Delay assumed when a throttle signal arrives without an explicit hint.
const DEFAULT_THROTTLE_DELAY: Duration = Duration::seconds(60);

impl Session {
	/// Executes one authenticated, rate-limited request and returns the raw response.
	pub(crate) async fn dispatch(
		&self,
		kind: CallKind,
		request: ApiRequest,
	) -> Result<ApiResponse> {
		let span = CallSpan::new(kind, "dispatch");

		obs::record_call_outcome(kind, CallOutcome::Attempt);

		let result = span.instrument(self.dispatch_inner(request)).await;

		match &result {
			Ok(_) => obs::record_call_outcome(kind, CallOutcome::Success),
			Err(_) => obs::record_call_outcome(kind, CallOutcome::Failure),
		}

		result
	}

	async fn dispatch_inner(&self, request: ApiRequest) -> Result<ApiResponse> {
		let mut pair = self.inner.store.authorize().await?;
		let mut key = pair.access_token.fingerprint();

		self.inner.limiter.acquire(&key).await?;

		let mut response = self
			.inner
			.transport
			.execute(request.clone().with_bearer(pair.access_token.clone()))
			.await?;

		if response.is_unauthorized() {
			let fresh = self.inner.store.refresh(&pair).await?;

			// The stale token's budget dies with it.
			self.inner.limiter.forget(&key);

			pair = fresh;
			key = pair.access_token.fingerprint();

			self.inner.limiter.acquire(&key).await?;

			response = self
				.inner
				.transport
				.execute(request.clone().with_bearer(pair.access_token.clone()))
				.await?;

			if response.is_unauthorized() {
				return Err(AuthError::RetryUnauthorized { status: response.status }.into());
			}
		}
		if let Some(hint) = throttle_hint(&response) {
			// The server's accounting beats the local window estimate.
			self.inner.limiter.observe_retry_after(&key, hint);

			if self.inner.limiter.config().mode == LimitMode::FailFast {
				return Err(
					RateLimitError::Throttled { retry_after: response.retry_after }.into()
				);
			}

			self.inner.limiter.acquire(&key).await?;

			response = self
				.inner
				.transport
				.execute(request.with_bearer(pair.access_token.clone()))
				.await?;

			if throttle_hint(&response).is_some() {
				return Err(
					RateLimitError::Throttled { retry_after: response.retry_after }.into()
				);
			}
		}
		if !response.is_success() {
			return Err(ApiError::Status { status: response.status, body: response.text() }.into());
		}

		Ok(response)
	}
}

fn throttle_hint(response: &ApiResponse) -> Option<Duration> {
	if response.is_throttled() {
		return Some(response.retry_after.unwrap_or(DEFAULT_THROTTLE_DELAY));
	}
	if response.is_success() && disguised_rate_limit(response) {
		return Some(DEFAULT_THROTTLE_DELAY);
	}

	None
}

/// Detects throttle replies disguised as 200s: a JSON envelope whose `metadata` marks a
/// base64 `data` payload that decodes to text containing `RateLimited`.
fn disguised_rate_limit(response: &ApiResponse) -> bool {
	if !response.content_type.as_deref().is_some_and(|ct| ct.contains("application/json")) {
		return false;
	}

	let Ok(value) = serde_json::from_slice::<Value>(response.body()) else {
		return false;
	};

	if value.pointer("/metadata/encodingDecoded").and_then(Value::as_str) != Some("text/plain") {
		return false;
	}

	let Some(data) = value.get("data").and_then(Value::as_str) else {
		return false;
	};
	let Ok(decoded) = STANDARD.decode(data) else {
		return false;
	};

	String::from_utf8_lossy(&decoded).contains("RateLimited")
}
