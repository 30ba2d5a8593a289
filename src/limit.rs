//! Per-token windowed request budgets.
//!
//! The limiter tracks one fixed-window budget per token fingerprint. `acquire` charges
//! the window and either suspends the caller until capacity returns (`Wait`) or fails
//! with a typed error (`FailFast`). A server-issued `Retry-After` observed by the
//! session overrides the local estimate for the next attempt, correcting any drift
//! between local and server-side accounting.

// self
use crate::{_prelude::*, error::RateLimitError};

/// Behavior when the window budget is spent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LimitMode {
	/// Suspend the caller until the window resets.
	#[default]
	Wait,
	/// Fail immediately with [`RateLimitError::Exhausted`].
	FailFast,
}

/// Window parameters for the limiter; configuration inputs, never hard-coded.
#[derive(Clone, Copy, Debug)]
pub struct RateLimitConfig {
	/// Requests allowed per window.
	pub window_limit: u32,
	/// Window length.
	pub window: Duration,
	/// Behavior once the budget is spent.
	pub mode: LimitMode,
}
impl RateLimitConfig {
	/// Creates a config with the provided limit and window in [`LimitMode::Wait`].
	pub fn new(window_limit: u32, window: Duration) -> Self {
		Self { window_limit, window, mode: LimitMode::Wait }
	}

	/// Switches the limiter to fail-fast behavior.
	pub fn fail_fast(mut self) -> Self {
		self.mode = LimitMode::FailFast;

		self
	}

	/// Overrides the exhaustion behavior.
	pub fn with_mode(mut self, mode: LimitMode) -> Self {
		self.mode = mode;

		self
	}
}
impl Default for RateLimitConfig {
	fn default() -> Self {
		Self::new(50, Duration::seconds(60))
	}
}

/// Budget state for one token fingerprint.
#[derive(Clone, Copy, Debug)]
struct Budget {
	window_start: OffsetDateTime,
	used: u32,
	/// Earliest instant the server allows the next request; beats the local window.
	not_before: Option<OffsetDateTime>,
}
impl Budget {
	fn fresh(now: OffsetDateTime) -> Self {
		Self { window_start: now, used: 0, not_before: None }
	}
}

/// Outcome of planning one acquisition at a given instant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Decision {
	Proceed,
	Wait(Duration),
}

/// Fixed-window request limiter keyed by token fingerprint.
pub struct RateLimiter {
	config: RateLimitConfig,
	budgets: Mutex<HashMap<String, Budget>>,
}
impl RateLimiter {
	/// Creates a limiter with the provided window configuration.
	pub fn new(config: RateLimitConfig) -> Self {
		Self { config, budgets: Mutex::new(HashMap::new()) }
	}

	/// Returns the limiter's configuration.
	pub fn config(&self) -> &RateLimitConfig {
		&self.config
	}

	/// Charges one request against the token's window, suspending or failing when the
	/// budget is spent, per [`LimitMode`].
	pub async fn acquire(&self, key: &str) -> Result<(), RateLimitError> {
		loop {
			match self.plan(key, OffsetDateTime::now_utc()) {
				Decision::Proceed => return Ok(()),
				Decision::Wait(delay) => match self.config.mode {
					LimitMode::FailFast =>
						return Err(RateLimitError::Exhausted {
							limit: self.config.window_limit,
							retry_after: delay,
						}),
					LimitMode::Wait => tokio::time::sleep(to_std(delay)).await,
				},
			}
		}
	}

	/// Records a server-issued `Retry-After`; the next acquisition for this token waits
	/// at least this long regardless of the local window estimate.
	pub fn observe_retry_after(&self, key: &str, delay: Duration) {
		let now = OffsetDateTime::now_utc();
		let mut budgets = self.budgets.lock();
		let budget = budgets.entry(key.to_owned()).or_insert_with(|| Budget::fresh(now));

		budget.not_before = Some(now + delay);
	}

	/// Drops the budget for a discarded token.
	pub fn forget(&self, key: &str) {
		self.budgets.lock().remove(key);
	}

	/// Plans one acquisition at `now`, charging the window only on `Proceed`.
	fn plan(&self, key: &str, now: OffsetDateTime) -> Decision {
		let mut budgets = self.budgets.lock();
		let budget = budgets.entry(key.to_owned()).or_insert_with(|| Budget::fresh(now));

		if let Some(not_before) = budget.not_before {
			if not_before > now {
				return Decision::Wait(not_before - now);
			}

			budget.not_before = None;
		}
		if now - budget.window_start >= self.config.window {
			*budget = Budget::fresh(now);
		}
		if budget.used < self.config.window_limit {
			budget.used += 1;

			return Decision::Proceed;
		}

		Decision::Wait(budget.window_start + self.config.window - now)
	}
}
impl Debug for RateLimiter {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RateLimiter")
			.field("config", &self.config)
			.field("budgets", &self.budgets.lock().len())
			.finish()
	}
}

fn to_std(delay: Duration) -> std::time::Duration {
	delay.try_into().unwrap_or_default()
}
