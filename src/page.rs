//! Cursor-linked collection paging.
//!
//! Collection endpoints answer with a page of records plus a `meta.paging.next` link.
//! [`Paginator`] walks those links as a lazy, forward-only sequence: each
//! [`next_page`](Paginator::next_page) call issues one authenticated, rate-limited
//! request and yields the decoded [`Page`]. The absence of a next link is the sole
//! termination signal; an empty page that still carries a cursor keeps the walk alive.

// self
use crate::{_prelude::*, error::ApiError, obs::CallKind, session::Session};

/// Opaque, server-issued pagination token identifying the next page.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(String);
impl Cursor {
	/// Wraps a server-issued cursor value.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the raw cursor value.
	pub fn as_str(&self) -> &str {
		&self.0
	}
}
impl Display for Cursor {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.0)
	}
}

/// One decoded collection page.
#[derive(Clone, Debug)]
pub struct Page {
	/// Records in server order.
	pub records: Vec<Value>,
	/// Cursor for the following page; `None` marks the final page.
	pub next_cursor: Option<Cursor>,
}
impl Page {
	/// Decodes a page from the collection wire shape.
	pub(crate) fn decode(body: &[u8]) -> Result<Self, ApiError> {
		let mut deserializer = serde_json::Deserializer::from_slice(body);
		let wire: PageWire = serde_path_to_error::deserialize(&mut deserializer)
			.map_err(|source| ApiError::Decode { source })?;
		let next_cursor =
			wire.meta.and_then(|meta| meta.paging).and_then(|paging| paging.next).map(Cursor::new);

		Ok(Self { records: wire.data, next_cursor })
	}
}

#[derive(Deserialize)]
struct PageWire {
	#[serde(default)]
	data: Vec<Value>,
	#[serde(default)]
	meta: Option<MetaWire>,
}

#[derive(Deserialize)]
struct MetaWire {
	#[serde(default)]
	paging: Option<PagingWire>,
}

#[derive(Deserialize)]
struct PagingWire {
	#[serde(default)]
	next: Option<String>,
}

/// Walk state; a cursor moves to `Next` exactly once and is never revisited.
#[derive(Clone, Debug)]
enum WalkState {
	Start,
	Next(Cursor),
	Exhausted,
}

/// Lazy, forward-only walker over one collection endpoint.
///
/// Restartable from the beginning only: build a fresh paginator to re-walk. Dropping
/// the paginator mid-walk issues no further requests. A failed fetch leaves the state
/// untouched, so the same position may be retried by calling
/// [`next_page`](Self::next_page) again.
#[derive(Debug)]
pub struct Paginator {
	session: Session,
	first: Url,
	state: WalkState,
}
impl Paginator {
	pub(crate) fn new(session: Session, first: Url) -> Self {
		Self { session, first, state: WalkState::Start }
	}

	/// Returns `true` once the final page has been yielded.
	pub fn is_exhausted(&self) -> bool {
		matches!(self.state, WalkState::Exhausted)
	}

	/// Fetches the next page, or `None` once the server stops issuing cursors.
	pub async fn next_page(&mut self) -> Result<Option<Page>> {
		let url = match &self.state {
			WalkState::Exhausted => return Ok(None),
			WalkState::Start => self.first.clone(),
			WalkState::Next(cursor) => Url::parse(cursor.as_str()).map_err(|source| {
				crate::error::ConfigError::InvalidUrl { url: cursor.to_string(), source }
			})?,
		};
		let response = self.session.dispatch(CallKind::Paginate, crate::http::ApiRequest::get(url)).await?;
		let page = Page::decode(response.body())?;

		self.state = match &page.next_cursor {
			Some(cursor) => WalkState::Next(cursor.clone()),
			None => WalkState::Exhausted,
		};

		Ok(Some(page))
	}

	/// Drains the remaining pages into one record sequence in server order.
	pub async fn collect(mut self) -> Result<Vec<Value>> {
		let mut records = Vec::new();

		while let Some(page) = self.next_page().await? {
			records.extend(page.records);
		}

		Ok(records)
	}
}
