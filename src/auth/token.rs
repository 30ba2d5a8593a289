//! Token secret wrapper and the access/refresh token pair model.

// crates.io
use base64::{Engine as _, engine::general_purpose::STANDARD_NO_PAD};
use sha2::{Digest, Sha256};
// self
use crate::_prelude::*;

/// Redacted token secret wrapper keeping sensitive material out of logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSecret(String);
impl TokenSecret {
	/// Wraps a new secret string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the inner token value. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.0
	}

	/// Returns a base64 (no padding) SHA-256 digest of the secret.
	///
	/// The digest keys per-token rate budgets so the raw secret never sits in a map key.
	pub fn fingerprint(&self) -> String {
		STANDARD_NO_PAD.encode(Sha256::digest(self.0.as_bytes()))
	}
}
impl AsRef<str> for TokenSecret {
	fn as_ref(&self) -> &str {
		self.expose()
	}
}
impl Debug for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("TokenSecret").field(&"<redacted>").finish()
	}
}
impl Display for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}

/// Access + refresh token plus expiry, treated as one atomic unit.
///
/// Pairs are replaced wholesale on rotation, never mutated in place. The struct is
/// serializable so a rotation sink can persist it as-is.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
	/// Bearer secret attached to every authenticated request.
	pub access_token: TokenSecret,
	/// Refresh secret, when the token endpoint issued one.
	pub refresh_token: Option<TokenSecret>,
	/// Expiry instant, when the token endpoint reported one. `None` means the pair is
	/// trusted until the API answers 401.
	pub expires_at: Option<OffsetDateTime>,
}
impl TokenPair {
	/// Creates a pair holding only an access token.
	pub fn new(access_token: impl Into<String>) -> Self {
		Self { access_token: TokenSecret::new(access_token), refresh_token: None, expires_at: None }
	}

	/// Attaches a refresh token.
	pub fn with_refresh_token(mut self, token: impl Into<String>) -> Self {
		self.refresh_token = Some(TokenSecret::new(token));

		self
	}

	/// Attaches an absolute expiry instant.
	pub fn with_expires_at(mut self, instant: OffsetDateTime) -> Self {
		self.expires_at = Some(instant);

		self
	}

	/// Returns `true` if the pair is past its expiry at the provided instant.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		match self.expires_at {
			Some(expires_at) => instant >= expires_at,
			None => false,
		}
	}

	/// Convenience helper that checks expiry against the current UTC instant.
	pub fn is_expired(&self) -> bool {
		self.is_expired_at(OffsetDateTime::now_utc())
	}
}
impl Debug for TokenPair {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenPair")
			.field("access_token", &"<redacted>")
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.field("expires_at", &self.expires_at)
			.finish()
	}
}
