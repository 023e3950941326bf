//! Client configuration surface and defaults.

// std
use std::time::Duration;
// self
use crate::{cache::CacheOptions, rate::RateLimitOptions};

/// Transport and retry configuration for the client.
///
/// Defaults mirror the osu! v2 API conventions: thirty-second attempts, three
/// additional retries with a one-second linear backoff unit, and the shared
/// sixty-requests-per-minute budget.
#[derive(Clone, Debug)]
pub struct Config {
	/// Request target root every path is resolved against.
	pub base_url: String,
	/// Value of the `User-Agent` header sent with every request.
	pub user_agent: String,
	/// Time budget for a single attempt.
	pub timeout: Duration,
	/// Additional tries after the first failed attempt.
	pub retry_attempts: u32,
	/// Linear backoff unit; attempt `n` waits `retry_delay * n` before retrying.
	pub retry_delay: Duration,
	/// Value of the `x-api-version` header sent with every request.
	pub api_version: String,
	/// Sliding-window admission budget; `None` disables rate governing.
	pub rate_limit: Option<RateLimitOptions>,
	/// TTL cache for GET responses; `None` disables response caching.
	pub cache: Option<CacheOptions>,
}
impl Config {
	/// Overrides the request target root.
	pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
		self.base_url = base_url.into();

		self
	}

	/// Overrides the `User-Agent` header value.
	pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
		self.user_agent = user_agent.into();

		self
	}

	/// Overrides the per-attempt time budget.
	pub fn with_timeout(mut self, timeout: Duration) -> Self {
		self.timeout = timeout;

		self
	}

	/// Overrides the number of additional tries after the first attempt.
	pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
		self.retry_attempts = attempts;

		self
	}

	/// Overrides the linear backoff unit.
	pub fn with_retry_delay(mut self, delay: Duration) -> Self {
		self.retry_delay = delay;

		self
	}

	/// Overrides the `x-api-version` header value.
	pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
		self.api_version = api_version.into();

		self
	}

	/// Sets or disables the sliding-window admission budget.
	pub fn with_rate_limit(mut self, options: Option<RateLimitOptions>) -> Self {
		self.rate_limit = options;

		self
	}

	/// Sets or disables GET response caching.
	pub fn with_cache(mut self, options: Option<CacheOptions>) -> Self {
		self.cache = options;

		self
	}
}
impl Default for Config {
	fn default() -> Self {
		Self {
			base_url: "https://osu.ppy.sh/api/v2".into(),
			user_agent: "osu-api-client".into(),
			timeout: Duration::from_secs(30),
			retry_attempts: 3,
			retry_delay: Duration::from_secs(1),
			api_version: "20220705".into(),
			rate_limit: Some(RateLimitOptions::default()),
			cache: None,
		}
	}
}

/// OAuth client identity used by token-endpoint grants.
#[derive(Clone, Debug)]
pub struct AuthConfig {
	/// OAuth client identifier.
	pub client_id: String,
	/// OAuth client secret.
	pub client_secret: String,
	/// Redirect URI registered for the authorization-code flow.
	pub redirect_uri: Option<String>,
}
impl AuthConfig {
	/// Creates a client identity for grants that do not need a redirect URI.
	pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
		Self { client_id: client_id.into(), client_secret: client_secret.into(), redirect_uri: None }
	}

	/// Attaches the redirect URI required by the authorization-code flow.
	pub fn with_redirect_uri(mut self, redirect_uri: impl Into<String>) -> Self {
		self.redirect_uri = Some(redirect_uri.into());

		self
	}

	/// Returns `true` when both client identifier and secret are present.
	pub fn is_complete(&self) -> bool {
		!self.client_id.is_empty() && !self.client_secret.is_empty()
	}
}
