//! OAuth client credentials supplied at session construction.

// self
use crate::{_prelude::*, auth::token::TokenSecret};

/// Client identifier + secret pair; immutable for the session's lifetime.
#[derive(Clone)]
pub struct Credentials {
	/// OAuth client identifier issued by the API's developer portal.
	pub client_id: String,
	/// Confidential client secret; never logged.
	pub client_secret: TokenSecret,
}
impl Credentials {
	/// Creates a credentials pair from the raw identifier and secret.
	pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
		Self { client_id: client_id.into(), client_secret: TokenSecret::new(client_secret) }
	}
}
impl Debug for Credentials {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Credentials")
			.field("client_id", &self.client_id)
			.field("client_secret", &"<redacted>")
			.finish()
	}
}
