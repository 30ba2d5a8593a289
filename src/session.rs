//! Session facade combining the token store, rate limiter, transport, and paginator.

pub mod dispatch;

// self
use crate::{
	_prelude::*,
	auth::{Credentials, TokenPair, TokenStore},
	error::{ApiError, ConfigError},
	http::{ApiRequest, ApiResponse, ApiTransport},
	limit::{RateLimitConfig, RateLimiter},
	obs::CallKind,
	page::Paginator,
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestTransport;

const BASE_URL_US: &str = "https://app.clio.com";
const BASE_URL_CA: &str = "https://ca.app.clio.com";
const BASE_URL_EU: &str = "https://eu.app.clio.com";
const BASE_URL_AU: &str = "https://au.app.clio.com";

const API_PATH: &str = "api/v4";
const TOKEN_PATH: &str = "oauth/token";

/// Hosting regions the API is served from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Region {
	/// United States, the default.
	#[default]
	Us,
	/// Canada.
	Ca,
	/// European Union.
	Eu,
	/// Australia.
	Au,
}
impl Region {
	/// Returns the region's base URL.
	pub const fn base_url(self) -> &'static str {
		match self {
			Region::Us => BASE_URL_US,
			Region::Ca => BASE_URL_CA,
			Region::Eu => BASE_URL_EU,
			Region::Au => BASE_URL_AU,
		}
	}
}
impl FromStr for Region {
	type Err = InvalidRegion;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"us" => Ok(Region::Us),
			"ca" => Ok(Region::Ca),
			"eu" => Ok(Region::Eu),
			"au" => Ok(Region::Au),
			_ => Err(InvalidRegion { region: s.into() }),
		}
	}
}
impl Display for Region {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(match self {
			Region::Us => "us",
			Region::Ca => "ca",
			Region::Eu => "eu",
			Region::Au => "au",
		})
	}
}

/// Error raised when parsing an unknown region code.
#[derive(Clone, Debug, ThisError)]
#[error("Invalid region `{region}`; expected one of us, ca, eu, au.")]
pub struct InvalidRegion {
	/// The rejected region string.
	pub region: String,
}

/// Builder for [`Session`].
pub struct SessionBuilder {
	credentials: Credentials,
	region: Region,
	endpoint: Option<Url>,
	token: Option<TokenPair>,
	rate_limit: RateLimitConfig,
	transport: Option<Arc<dyn ApiTransport>>,
}
impl SessionBuilder {
	fn new(credentials: Credentials) -> Self {
		Self {
			credentials,
			region: Region::default(),
			endpoint: None,
			token: None,
			rate_limit: RateLimitConfig::default(),
			transport: None,
		}
	}

	/// Selects the hosting region.
	pub fn region(mut self, region: Region) -> Self {
		self.region = region;

		self
	}

	/// Overrides the region's base endpoint; primarily for tests and proxies.
	pub fn endpoint(mut self, endpoint: Url) -> Self {
		self.endpoint = Some(endpoint);

		self
	}

	/// Seeds the session with a pre-existing token pair.
	pub fn token(mut self, token: TokenPair) -> Self {
		self.token = Some(token);

		self
	}

	/// Overrides the rate-limit window configuration.
	pub fn rate_limit(mut self, config: RateLimitConfig) -> Self {
		self.rate_limit = config;

		self
	}

	/// Supplies a custom transport instead of the default reqwest one.
	pub fn transport(mut self, transport: Arc<dyn ApiTransport>) -> Self {
		self.transport = Some(transport);

		self
	}

	/// Consumes the builder and produces a [`Session`].
	pub fn build(self) -> Result<Session> {
		let base = match &self.endpoint {
			Some(endpoint) => endpoint.as_str().trim_end_matches('/').to_owned(),
			None => self.region.base_url().to_owned(),
		};
		let api_base = parse_url(&format!("{base}/{API_PATH}/"))?;
		let token_url = parse_url(&format!("{base}/{TOKEN_PATH}"))?;
		let transport: Arc<dyn ApiTransport> = match self.transport {
			Some(transport) => transport,
			#[cfg(feature = "reqwest")]
			None => Arc::new(ReqwestTransport::new()?),
			#[cfg(not(feature = "reqwest"))]
			None => return Err(ConfigError::MissingTransport.into()),
		};
		let store = TokenStore::new(self.credentials, token_url, transport.clone(), self.token);

		Ok(Session {
			inner: Arc::new(SessionInner {
				api_base,
				store,
				limiter: RateLimiter::new(self.rate_limit),
				transport,
			}),
		})
	}
}

/// The facade external callers touch; every request funnels through the rate limiter and
/// the auth interceptor in [`dispatch`].
///
/// Sessions are cheap to clone (`Arc` inner) and safe to share across tasks; token
/// refresh is single-flight across all clones.
#[derive(Clone)]
pub struct Session {
	pub(crate) inner: Arc<SessionInner>,
}

pub(crate) struct SessionInner {
	pub(crate) api_base: Url,
	pub(crate) store: TokenStore,
	pub(crate) limiter: RateLimiter,
	pub(crate) transport: Arc<dyn ApiTransport>,
}

impl Session {
	/// Returns a builder for the provided client credentials.
	pub fn builder(credentials: Credentials) -> SessionBuilder {
		SessionBuilder::new(credentials)
	}

	/// Returns the session's token store.
	pub fn token_store(&self) -> &TokenStore {
		&self.inner.store
	}

	/// Registers a sink invoked synchronously with every rotated token pair.
	///
	/// The calling application is responsible for persisting the pair.
	pub fn on_rotate(&self, sink: impl Fn(&TokenPair) + Send + Sync + 'static) {
		self.inner.store.on_rotate(sink);
	}

	/// Fetches the currently authenticated user.
	pub async fn who_am_i(&self) -> Result<Value> {
		self.get("users/who_am_i", &[]).await
	}

	/// Fetches a single resource.
	pub async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<Value> {
		let url = self.resource_url(path, query)?;
		let response = self.dispatch(CallKind::Resource, ApiRequest::get(url)).await?;

		decode_body(&response)
	}

	/// Creates a resource from the provided JSON document.
	pub async fn post(&self, path: &str, body: Value) -> Result<Value> {
		let url = self.resource_url(path, &[])?;
		let response =
			self.dispatch(CallKind::Resource, ApiRequest::post(url).with_json(body)).await?;

		decode_body(&response)
	}

	/// Partially updates a resource with the provided JSON document.
	pub async fn patch(&self, path: &str, body: Value) -> Result<Value> {
		let url = self.resource_url(path, &[])?;
		let response =
			self.dispatch(CallKind::Resource, ApiRequest::patch(url).with_json(body)).await?;

		decode_body(&response)
	}

	/// Deletes a resource; `None` when the API answers with no content.
	pub async fn delete(&self, path: &str) -> Result<Option<Value>> {
		let url = self.resource_url(path, &[])?;
		let response = self.dispatch(CallKind::Resource, ApiRequest::delete(url)).await?;

		if response.is_empty() { Ok(None) } else { decode_body(&response).map(Some) }
	}

	/// Returns a [`Paginator`] walking the collection endpoint at `path`.
	///
	/// Listings request `order=id(asc)` so the server's unlimited cursor paging stays
	/// stable across pages.
	pub fn paginate(&self, path: &str, query: &[(&str, &str)]) -> Result<Paginator> {
		let mut url = self.resource_url(path, query)?;

		url.query_pairs_mut().append_pair("order", "id(asc)");

		Ok(Paginator::new(self.clone(), url))
	}

	fn resource_url(&self, path: &str, query: &[(&str, &str)]) -> Result<Url, ConfigError> {
		let relative = format!("{}.json", path.trim_start_matches('/'));
		let mut url = self
			.inner
			.api_base
			.join(&relative)
			.map_err(|source| ConfigError::InvalidUrl { url: relative, source })?;

		if !query.is_empty() {
			url.query_pairs_mut().extend_pairs(query);
		}

		Ok(url)
	}
}
impl Debug for Session {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Session")
			.field("api_base", &self.inner.api_base.as_str())
			.field("store", &self.inner.store)
			.field("limiter", &self.inner.limiter)
			.finish()
	}
}

fn parse_url(raw: &str) -> Result<Url, ConfigError> {
	Url::parse(raw).map_err(|source| ConfigError::InvalidUrl { url: raw.into(), source })
}

fn decode_body(response: &ApiResponse) -> Result<Value> {
	if response.is_empty() {
		return Ok(Value::Null);
	}

	let mut deserializer = serde_json::Deserializer::from_slice(response.body());
	let value = serde_path_to_error::deserialize(&mut deserializer)
		.map_err(|source| ApiError::Decode { source })?;

	Ok(value)
}
