//! Transport primitives for authenticated API exchanges.
//!
//! The module exposes [`ApiTransport`] alongside the [`ApiRequest`]/[`ApiResponse`]
//! value types so downstream crates can plug custom HTTP stacks into the session
//! without losing header capture. Implementations fill an [`ApiResponse`] with the
//! status, `Retry-After` hint, and rate-limit headers of every exchange; the session's
//! interceptor classifies failures from that metadata alone.

// crates.io
use rand::Rng;
#[cfg(feature = "reqwest")]
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, RETRY_AFTER};
#[cfg(feature = "reqwest")] use time::format_description::well_known::Rfc2822;
// self
use crate::{_prelude::*, auth::TokenSecret, error::TransportError};
#[cfg(feature = "reqwest")] use crate::error::ConfigError;

/// Boxed future returned by [`ApiTransport::execute`].
pub type TransportFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + 'a + Send>>;

/// Abstraction over HTTP stacks capable of executing session requests.
///
/// The trait is the session's only dependency on an HTTP implementation. Callers
/// provide one behind `Arc<dyn ApiTransport>`; the default reqwest transport is built
/// automatically when the `reqwest` feature is enabled. Implementations retry their own
/// transient network failures; HTTP statuses are never retried here, the session's
/// interceptor owns that policy.
pub trait ApiTransport
where
	Self: Send + Sync,
{
	/// Executes one request and captures the response with its throttling metadata.
	fn execute(&self, request: ApiRequest) -> TransportFuture<'_, ApiResponse>;
}

/// HTTP methods the session issues.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
	/// Resource and collection reads.
	Get,
	/// Resource creation and token-endpoint grants.
	Post,
	/// Partial resource updates.
	Patch,
	/// Resource deletion.
	Delete,
}
impl Method {
	/// Returns the wire name of the method.
	pub const fn as_str(self) -> &'static str {
		match self {
			Method::Get => "GET",
			Method::Post => "POST",
			Method::Patch => "PATCH",
			Method::Delete => "DELETE",
		}
	}
}
impl Display for Method {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Request payload variants.
#[derive(Clone, Debug)]
pub enum RequestBody {
	/// JSON document sent with `application/json`.
	Json(Value),
	/// URL-encoded form, used by token-endpoint grants.
	Form(Vec<(String, String)>),
}

/// One outgoing API request.
#[derive(Clone, Debug)]
pub struct ApiRequest {
	/// HTTP method.
	pub method: Method,
	/// Fully resolved request URL, query included.
	pub url: Url,
	/// Optional payload.
	pub body: Option<RequestBody>,
	/// Bearer secret attached as `Authorization: Bearer <token>`.
	pub bearer: Option<TokenSecret>,
}
impl ApiRequest {
	/// Creates a GET request for the provided URL.
	pub fn get(url: Url) -> Self {
		Self::new(Method::Get, url)
	}

	/// Creates a POST request for the provided URL.
	pub fn post(url: Url) -> Self {
		Self::new(Method::Post, url)
	}

	/// Creates a PATCH request for the provided URL.
	pub fn patch(url: Url) -> Self {
		Self::new(Method::Patch, url)
	}

	/// Creates a DELETE request for the provided URL.
	pub fn delete(url: Url) -> Self {
		Self::new(Method::Delete, url)
	}

	fn new(method: Method, url: Url) -> Self {
		Self { method, url, body: None, bearer: None }
	}

	/// Attaches a JSON payload.
	pub fn with_json(mut self, body: Value) -> Self {
		self.body = Some(RequestBody::Json(body));

		self
	}

	/// Attaches a URL-encoded form payload.
	pub fn with_form(mut self, form: Vec<(String, String)>) -> Self {
		self.body = Some(RequestBody::Form(form));

		self
	}

	/// Attaches the bearer secret.
	pub fn with_bearer(mut self, bearer: TokenSecret) -> Self {
		self.bearer = Some(bearer);

		self
	}
}

/// Rate-limit accounting reported by the server through response headers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RateLimitSnapshot {
	/// `X-RateLimit-Limit` value, when present.
	pub limit: Option<u64>,
	/// `X-RateLimit-Remaining` value, when present.
	pub remaining: Option<u64>,
}

/// One API response with the metadata the session's interceptor classifies on.
#[derive(Clone, Debug)]
pub struct ApiResponse {
	/// HTTP status code.
	pub status: u16,
	/// `Content-Type` header, when present.
	pub content_type: Option<String>,
	/// `Retry-After` hint expressed as a relative duration.
	pub retry_after: Option<Duration>,
	/// Server-side rate-limit accounting.
	pub rate_limit: RateLimitSnapshot,
	body: Vec<u8>,
}
impl ApiResponse {
	/// Creates a response from a status and body; metadata defaults to absent.
	pub fn new(status: u16, body: Vec<u8>) -> Self {
		Self { status, content_type: None, retry_after: None, rate_limit: Default::default(), body }
	}

	/// Attaches the `Content-Type` header value.
	pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
		self.content_type = Some(content_type.into());

		self
	}

	/// Attaches a `Retry-After` hint.
	pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
		self.retry_after = Some(retry_after);

		self
	}

	/// Attaches server-side rate-limit accounting.
	pub fn with_rate_limit(mut self, rate_limit: RateLimitSnapshot) -> Self {
		self.rate_limit = rate_limit;

		self
	}

	/// Returns `true` for 2xx statuses.
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}

	/// Returns `true` for 401 responses.
	pub fn is_unauthorized(&self) -> bool {
		self.status == 401
	}

	/// Returns `true` for 429 responses.
	pub fn is_throttled(&self) -> bool {
		self.status == 429
	}

	/// Returns `true` when the body is empty or the status is 204.
	pub fn is_empty(&self) -> bool {
		self.status == 204 || self.body.is_empty()
	}

	/// Returns the raw response body.
	pub fn body(&self) -> &[u8] {
		&self.body
	}

	/// Returns the body as lossily decoded text.
	pub fn text(&self) -> String {
		String::from_utf8_lossy(&self.body).into_owned()
	}

	/// Returns a truncated body rendering suitable for error messages.
	pub fn body_preview(&self) -> String {
		const MAX: usize = 256;

		let text = self.text();

		match text.char_indices().nth(MAX) {
			Some((cut, _)) => format!("{}…", &text[..cut]),
			None => text,
		}
	}
}

/// Bounded retry policy for transient network failures.
///
/// Statuses never pass through here; only connect/timeout-class failures are retried,
/// each attempt backed off exponentially with jitter drawn from the base delay.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
	/// Retries allowed after the first attempt.
	pub max_retries: u32,
	/// Base backoff delay; attempt `n` waits `base * 2^n` plus jitter.
	pub base_delay: std::time::Duration,
}
impl RetryPolicy {
	/// Returns the jittered backoff delay for the provided zero-based attempt.
	pub fn delay_for(&self, attempt: u32) -> std::time::Duration {
		let base = self.base_delay.saturating_mul(1 << attempt.min(16));
		let jitter_ceiling = self.base_delay.as_millis().max(1) as u64;
		let jitter = rand::rng().random_range(0..jitter_ceiling);

		base + std::time::Duration::from_millis(jitter)
	}
}
impl Default for RetryPolicy {
	fn default() -> Self {
		Self { max_retries: 2, base_delay: std::time::Duration::from_millis(200) }
	}
}

/// Default [`ApiTransport`] backed by [`ReqwestClient`].
///
/// The transport owns transient-failure retries and header capture. Configure custom
/// clients (proxies, certificate stores) with [`ReqwestTransport::with_client`].
#[cfg(feature = "reqwest")]
#[derive(Clone)]
pub struct ReqwestTransport {
	client: ReqwestClient,
	retry: RetryPolicy,
}
#[cfg(feature = "reqwest")]
impl ReqwestTransport {
	/// Builds a transport with a fresh reqwest client and the default retry policy.
	pub fn new() -> Result<Self, ConfigError> {
		let client = ReqwestClient::builder()
			.user_agent(concat!("clio-session/", env!("CARGO_PKG_VERSION")))
			.build()?;

		Ok(Self::with_client(client))
	}

	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self { client, retry: RetryPolicy::default() }
	}

	/// Overrides the transient-failure retry policy.
	pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
		self.retry = retry;

		self
	}

	fn build_request(&self, request: &ApiRequest) -> Result<reqwest::Request> {
		let method = match request.method {
			Method::Get => reqwest::Method::GET,
			Method::Post => reqwest::Method::POST,
			Method::Patch => reqwest::Method::PATCH,
			Method::Delete => reqwest::Method::DELETE,
		};
		let mut builder = self.client.request(method, request.url.clone());

		match &request.body {
			Some(RequestBody::Json(json)) => builder = builder.json(json),
			Some(RequestBody::Form(form)) => builder = builder.form(form),
			None => (),
		}
		if let Some(bearer) = &request.bearer {
			let value = format!("Bearer {}", bearer.expose());
			let value = reqwest::header::HeaderValue::from_str(&value)
				.map_err(ConfigError::invalid_header)?;

			builder = builder.header(AUTHORIZATION, value);
		}

		builder.build().map_err(|e| TransportError::from(e).into())
	}

	async fn execute_once(&self, request: reqwest::Request) -> Result<ApiResponse, ReqwestError> {
		let response = self.client.execute(request).await?;
		let status = response.status().as_u16();
		let headers = response.headers().to_owned();
		let body = response.bytes().await?.to_vec();
		let mut captured = ApiResponse::new(status, body)
			.with_rate_limit(parse_rate_limit(&headers));

		if let Some(content_type) = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok()) {
			captured = captured.with_content_type(content_type);
		}
		if let Some(retry_after) = parse_retry_after(&headers) {
			captured = captured.with_retry_after(retry_after);
		}

		Ok(captured)
	}

	fn is_transient(error: &ReqwestError) -> bool {
		error.is_connect() || error.is_timeout()
	}
}
#[cfg(feature = "reqwest")]
impl ApiTransport for ReqwestTransport {
	fn execute(&self, request: ApiRequest) -> TransportFuture<'_, ApiResponse> {
		Box::pin(async move {
			let mut attempt = 0;

			loop {
				let built = self.build_request(&request)?;

				match self.execute_once(built).await {
					Ok(response) => return Ok(response),
					Err(e) if Self::is_transient(&e) && attempt < self.retry.max_retries => {
						tokio::time::sleep(self.retry.delay_for(attempt)).await;

						attempt += 1;
					},
					Err(e) => return Err(TransportError::from(e).into()),
				}
			}
		})
	}
}

#[cfg(feature = "reqwest")]
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
	let value = headers.get(RETRY_AFTER)?;
	let raw = value.to_str().ok()?.trim();

	if let Ok(secs) = raw.parse::<u64>() {
		return Some(Duration::seconds(secs as i64));
	}
	if let Ok(moment) = OffsetDateTime::parse(raw, &Rfc2822) {
		let delta = moment - OffsetDateTime::now_utc();

		if delta.is_positive() {
			return Some(delta);
		}
	}

	None
}

#[cfg(feature = "reqwest")]
fn parse_rate_limit(headers: &HeaderMap) -> RateLimitSnapshot {
	let read = |name: &str| {
		headers.get(name).and_then(|value| value.to_str().ok()).and_then(|raw| raw.parse().ok())
	};

	RateLimitSnapshot { limit: read("x-ratelimit-limit"), remaining: read("x-ratelimit-remaining") }
}
