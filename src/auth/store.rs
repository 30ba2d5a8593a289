//! Session-scoped token store with single-flight grants and rotation fan-out.
//!
//! The store owns the only live [`TokenPair`] a session ever holds. Callers borrow it
//! via [`TokenStore::authorize`] and hand it back through [`TokenStore::refresh`] when
//! the API answers 401. Both paths funnel through one async guard so concurrent expiry
//! detections collapse into a single token-endpoint call; losers of the race adopt the
//! winner's pair. Every successful rotation invokes the registered sinks synchronously
//! before the new pair is released to any caller, so a persistence layer can durably
//! record the pair before dependent requests proceed.

// std
use std::sync::atomic::{AtomicU64, Ordering};
// self
use crate::{
	_prelude::*,
	auth::{Credentials, TokenPair, TokenSecret},
	error::AuthError,
	http::{ApiRequest, ApiResponse, ApiTransport},
	obs::{self, CallKind, CallOutcome, CallSpan},
};

/// Callback invoked with every freshly rotated token pair.
pub type RotationSink = Box<dyn Fn(&TokenPair) + Send + Sync>;

/// Thread-safe counters for token store activity.
#[derive(Debug, Default)]
pub struct RotationStats {
	grants: AtomicU64,
	reuses: AtomicU64,
	failures: AtomicU64,
}
impl RotationStats {
	/// Returns the number of token-endpoint grants performed (acquisitions + refreshes).
	pub fn grants(&self) -> u64 {
		self.grants.load(Ordering::Relaxed)
	}

	/// Returns the number of callers that piggy-backed on another caller's grant.
	pub fn reuses(&self) -> u64 {
		self.reuses.load(Ordering::Relaxed)
	}

	/// Returns the number of failed token-endpoint grants.
	pub fn failures(&self) -> u64 {
		self.failures.load(Ordering::Relaxed)
	}

	fn record_grant(&self) {
		self.grants.fetch_add(1, Ordering::Relaxed);
	}

	fn record_reuse(&self) {
		self.reuses.fetch_add(1, Ordering::Relaxed);
	}

	fn record_failure(&self) {
		self.failures.fetch_add(1, Ordering::Relaxed);
	}
}

/// Wire shape of the token endpoint's success response.
#[derive(Deserialize)]
struct TokenGrantResponse {
	access_token: String,
	#[serde(default)]
	refresh_token: Option<String>,
	#[serde(default)]
	expires_in: Option<i64>,
}

/// Grant forms the store can exchange at the token endpoint.
enum Grant {
	ClientCredentials,
	Refresh(TokenSecret),
}
impl Grant {
	fn for_pair(pair: Option<&TokenPair>) -> Self {
		match pair.and_then(|pair| pair.refresh_token.clone()) {
			Some(refresh) => Self::Refresh(refresh),
			None => Self::ClientCredentials,
		}
	}
}

/// Owns the current [`TokenPair`] and coordinates every token-endpoint exchange.
pub struct TokenStore {
	credentials: Credentials,
	token_url: Url,
	transport: Arc<dyn ApiTransport>,
	current: RwLock<Option<TokenPair>>,
	sinks: Mutex<Vec<RotationSink>>,
	flight: AsyncMutex<()>,
	stats: RotationStats,
}
impl TokenStore {
	pub(crate) fn new(
		credentials: Credentials,
		token_url: Url,
		transport: Arc<dyn ApiTransport>,
		initial: Option<TokenPair>,
	) -> Self {
		Self {
			credentials,
			token_url,
			transport,
			current: RwLock::new(initial),
			sinks: Mutex::new(Vec::new()),
			flight: AsyncMutex::new(()),
			stats: RotationStats::default(),
		}
	}

	/// Returns a clone of the current pair, if one is installed.
	pub fn current(&self) -> Option<TokenPair> {
		self.current.read().clone()
	}

	/// Registers a sink invoked synchronously with every rotated pair.
	pub fn on_rotate(&self, sink: impl Fn(&TokenPair) + Send + Sync + 'static) {
		self.sinks.lock().push(Box::new(sink));
	}

	/// Returns the store's activity counters.
	pub fn stats(&self) -> &RotationStats {
		&self.stats
	}

	/// Returns a pair fit to bear a request: the cached pair when it is still valid,
	/// otherwise the result of a single-flight grant.
	///
	/// A store constructed without a pair performs a `client_credentials` grant on the
	/// first call; a cached pair past its known expiry is refreshed preemptively.
	pub async fn authorize(&self) -> Result<TokenPair> {
		if let Some(pair) = self.current_valid() {
			return Ok(pair);
		}

		let _flight = self.flight.lock().await;

		// The winner of the race may have installed a valid pair while this caller waited.
		if let Some(pair) = self.current_valid() {
			self.stats.record_reuse();

			return Ok(pair);
		}

		self.exchange(Grant::for_pair(self.current().as_ref())).await
	}

	/// Rotates the pair that produced an unauthorized response and returns its successor.
	///
	/// Single-flight: when several callers observe the same 401, only the first performs
	/// a network exchange; the rest find the rotated pair installed and adopt it.
	pub async fn refresh(&self, stale: &TokenPair) -> Result<TokenPair> {
		let _flight = self.flight.lock().await;

		if let Some(pair) = self.current()
			&& pair.access_token != stale.access_token
		{
			self.stats.record_reuse();

			return Ok(pair);
		}

		self.exchange(Grant::for_pair(Some(stale))).await
	}

	fn current_valid(&self) -> Option<TokenPair> {
		let now = OffsetDateTime::now_utc();

		self.current.read().clone().filter(|pair| !pair.is_expired_at(now))
	}

	/// Performs one token-endpoint exchange while the caller holds the flight guard.
	async fn exchange(&self, grant: Grant) -> Result<TokenPair> {
		const KIND: CallKind = CallKind::TokenGrant;

		let span = CallSpan::new(KIND, "exchange");

		obs::record_call_outcome(KIND, CallOutcome::Attempt);

		let result = span
			.instrument(async move {
				let request =
					ApiRequest::post(self.token_url.clone()).with_form(self.grant_form(&grant));
				let response = self.transport.execute(request).await.inspect_err(|_| {
					self.stats.record_failure();
				})?;

				if !response.is_success() {
					return Err(self.rejection(&response));
				}

				let issued_at = OffsetDateTime::now_utc();
				let pair = decode_grant(&response, issued_at).inspect_err(|_| {
					self.stats.record_failure();
				})?;

				self.install(pair.clone());
				self.stats.record_grant();

				Ok(pair)
			})
			.await;

		match &result {
			Ok(_) => obs::record_call_outcome(KIND, CallOutcome::Success),
			Err(_) => obs::record_call_outcome(KIND, CallOutcome::Failure),
		}

		result
	}

	fn grant_form(&self, grant: &Grant) -> Vec<(String, String)> {
		let mut form = vec![
			("client_id".into(), self.credentials.client_id.clone()),
			("client_secret".into(), self.credentials.client_secret.expose().into()),
		];

		match grant {
			Grant::ClientCredentials => {
				form.push(("grant_type".into(), "client_credentials".into()));
			},
			Grant::Refresh(refresh) => {
				form.push(("grant_type".into(), "refresh_token".into()));
				form.push(("refresh_token".into(), refresh.expose().into()));
			},
		}

		form
	}

	/// Installs a rotated pair and fans it out to every sink before returning.
	fn install(&self, pair: TokenPair) {
		*self.current.write() = Some(pair.clone());

		for sink in self.sinks.lock().iter() {
			sink(&pair);
		}
	}

	fn rejection(&self, response: &ApiResponse) -> Error {
		self.stats.record_failure();

		// A definitive 4xx means the grant material is dead; drop the pair so later calls
		// fail fast instead of hammering the token endpoint with the same material.
		if (400..500).contains(&response.status) {
			*self.current.write() = None;
		}

		AuthError::Rejected { status: response.status, reason: response.body_preview() }.into()
	}
}
impl Debug for TokenStore {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenStore")
			.field("credentials", &self.credentials)
			.field("token_url", &self.token_url.as_str())
			.field("pair_installed", &self.current.read().is_some())
			.finish()
	}
}

fn decode_grant(response: &ApiResponse, issued_at: OffsetDateTime) -> Result<TokenPair> {
	let mut deserializer = serde_json::Deserializer::from_slice(response.body());
	let wire: TokenGrantResponse =
		serde_path_to_error::deserialize(&mut deserializer).map_err(|source| {
			AuthError::MalformedTokenResponse { source, status: response.status }
		})?;
	let mut pair = TokenPair::new(wire.access_token);

	if let Some(refresh) = wire.refresh_token {
		pair = pair.with_refresh_token(refresh);
	}
	if let Some(expires_in) = wire.expires_in {
		pair = pair.with_expires_at(issued_at + Duration::seconds(expires_in));
	}

	Ok(pair)
}
