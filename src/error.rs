//! Session-level error types shared across the token store, limiter, transport, and facade.

// self
use crate::_prelude::*;

/// Session-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical session error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Token acquisition, refresh, or bearer validation failure.
	#[error(transparent)]
	Auth(#[from] AuthError),
	/// Request budget exhausted or the server throttled the call.
	#[error(transparent)]
	RateLimit(#[from] RateLimitError),
	/// Remote API rejected the call with a non-auth status.
	#[error(transparent)]
	Api(#[from] ApiError),
	/// Transport failure (DNS, TCP, TLS) after bounded retries.
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
}

/// Token lifecycle failures; fatal to the call that observed them.
#[derive(Debug, ThisError)]
pub enum AuthError {
	/// The token endpoint rejected the grant (revoked refresh token, bad credentials).
	#[error("Token endpoint rejected the grant ({status}): {reason}.")]
	Rejected {
		/// HTTP status returned by the token endpoint.
		status: u16,
		/// Response body preview summarizing the rejection.
		reason: String,
	},
	/// The request was retried with a freshly rotated token and is still unauthorized.
	#[error("Request remained unauthorized ({status}) after a token rotation.")]
	RetryUnauthorized {
		/// HTTP status of the retried request.
		status: u16,
	},
	/// The token endpoint answered with a body this crate cannot decode.
	#[error("Token endpoint returned a malformed response.")]
	MalformedTokenResponse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
		/// HTTP status of the token endpoint response.
		status: u16,
	},
}

/// Request budget failures surfaced in fail-fast mode.
#[derive(Debug, ThisError)]
pub enum RateLimitError {
	/// The local window budget is spent and the session is configured to fail fast.
	#[error("Request budget of {limit} per window is exhausted; retry in {retry_after}.")]
	Exhausted {
		/// Configured window limit.
		limit: u32,
		/// Time until the window resets.
		retry_after: Duration,
	},
	/// The server throttled the call and the session is configured to fail fast.
	#[error("Server throttled the request; retry hint: {retry_after:?}.")]
	Throttled {
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
}

/// Remote API failures other than authentication and throttling.
#[derive(Debug, ThisError)]
pub enum ApiError {
	/// Non-2xx response surfaced with its status and body.
	#[error("API request failed with status {status}.")]
	Status {
		/// HTTP status code.
		status: u16,
		/// Response body, verbatim.
		body: String,
	},
	/// Response body could not be decoded as the expected JSON shape.
	#[error("API response body could not be decoded.")]
	Decode {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the API.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the API.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}

/// Configuration and validation failures raised by the session.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// Endpoint, resource path, or cursor produced an invalid URL.
	#[error("Invalid URL: {url}.")]
	InvalidUrl {
		/// The offending URL string.
		url: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// A header value could not be built from the provided material.
	#[error("Invalid header value.")]
	InvalidHeader {
		/// Underlying header construction failure.
		#[source]
		source: BoxError,
	},
	/// No transport was supplied and the default reqwest transport is compiled out.
	#[error("No transport configured and the default reqwest transport is disabled.")]
	MissingTransport,
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}

	/// Wraps a header construction failure inside [`ConfigError`].
	pub fn invalid_header(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::InvalidHeader { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}
