//! Client-wide error types shared across auth, transport, and the facade.
//!
//! The transport's retry decision is a data inspection ([`Error::is_retryable`])
//! rather than a catch/rethrow heuristic: 5xx responses, network failures, and
//! per-attempt timeouts are transient; everything else is terminal.

// self
use crate::{_prelude::*, http::Payload};

/// Client-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical client error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Credential lifecycle failure.
	#[error(transparent)]
	Auth(#[from] AuthError),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Non-2xx response from the API.
	#[error(transparent)]
	Http(#[from] HttpError),

	/// Transport-level failure (DNS, TCP, TLS); safe to retry.
	#[error("Network error occurred while calling the API.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// A single attempt exceeded its time budget; safe to retry.
	#[error("Request timed out after {limit:?}.")]
	Timeout {
		/// Per-attempt time budget that was exceeded.
		limit: std::time::Duration,
	},
	/// Malformed caller input, rejected before any network call.
	#[error("Invalid request: {message}.")]
	Validation {
		/// Human-readable description of the rejected input.
		message: String,
	},
	/// Response body could not be decoded into the expected shape.
	#[error("Response body could not be decoded.")]
	Decode {
		/// Structured parsing failure with the offending path.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
}
impl Error {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}

	/// Builds a [`Error::Validation`] from a caller-input description.
	pub fn validation(message: impl Into<String>) -> Self {
		Self::Validation { message: message.into() }
	}

	/// Returns `true` when retrying the call may succeed.
	///
	/// Client errors (4xx), auth, validation, and decode failures are caller or
	/// configuration problems and are never retried.
	pub fn is_retryable(&self) -> bool {
		match self {
			Self::Http(http) => http.is_server_error(),
			Self::Network { .. } | Self::Timeout { .. } => true,
			Self::Auth(_) | Self::Config(_) | Self::Validation { .. } | Self::Decode { .. } =>
				false,
		}
	}
}

/// Credential lifecycle failures raised by the token store.
///
/// The enum is `Clone` so a single refresh outcome can be broadcast to every
/// caller that attached to the in-flight operation.
#[derive(Clone, Debug, ThisError)]
pub enum AuthError {
	/// No credential has ever been stored.
	#[error("No credential is available; authenticate first.")]
	NotAuthenticated,
	/// The credential is expiring and no refresh path exists.
	#[error("Credential is expiring and no refresh token is available.")]
	RefreshUnavailable,
	/// OAuth client identity has not been configured.
	#[error("OAuth client credentials are not configured.")]
	NotConfigured,
	/// The authorization-code flow requires a redirect URI.
	#[error("Redirect URI is required for the authorization-code flow.")]
	MissingRedirectUri,
	/// A token refresh failed; the store reverted to unauthenticated.
	#[error("Token refresh failed.")]
	RefreshFailed {
		/// Shared underlying failure, identical for every waiter.
		#[source]
		source: Arc<Error>,
	},
}

/// Configuration and request-construction failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// Configured base URL cannot be parsed.
	#[error("Base URL is invalid.")]
	InvalidBaseUrl {
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Request path cannot be resolved against the base URL.
	#[error("Request path `{path}` is invalid.")]
	InvalidPath {
		/// Path supplied by the caller.
		path: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// A caller-supplied header name or value is malformed.
	#[error("Header `{name}` is invalid.")]
	InvalidHeader {
		/// Offending header name.
		name: String,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}

/// Non-2xx response carrying the status code and decoded body for diagnostics.
#[derive(Debug, ThisError)]
#[error("HTTP {status} returned by the API.")]
pub struct HttpError {
	/// HTTP status code of the rejected response.
	pub status: u16,
	/// Decoded response body (JSON when the server declared it, raw text otherwise).
	pub body: Payload,
}
impl HttpError {
	/// Returns `true` for 4xx statuses, treated as caller mistakes.
	pub fn is_client_error(&self) -> bool {
		(400..500).contains(&self.status)
	}

	/// Returns `true` for 5xx statuses, treated as transient faults.
	pub fn is_server_error(&self) -> bool {
		self.status >= 500
	}
}
