//! Bearer credential model with redacted secrets and explicit-instant
//! lifecycle checks.

// self
use crate::_prelude::*;

/// Default lifetime assumed for static API keys; the flag on
/// [`Credential::long_lived`] means the instant is never actually consulted.
const STATIC_KEY_LIFETIME: Duration = Duration::days(365);

/// Redacted secret wrapper keeping token material out of logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secret(String);
impl Secret {
	/// Wraps a new secret string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the inner value. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.0
	}
}
impl AsRef<str> for Secret {
	fn as_ref(&self) -> &str {
		self.expose()
	}
}
impl Debug for Secret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("Secret").field(&"<redacted>").finish()
	}
}
impl Display for Secret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}

/// Kind of credential the API accepts; only bearer tokens today.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
	/// RFC 6750 bearer token.
	#[default]
	Bearer,
}

/// The live bearer credential plus the metadata needed to decide renewal.
///
/// Exactly one credential is live at a time; refreshes replace the whole
/// value rather than mutating it in place. `expires_at` is ignored whenever
/// `long_lived` is set - static API keys never expire from the client's
/// perspective.
#[derive(Clone)]
pub struct Credential {
	/// Access token presented as the bearer credential.
	pub access_token: Secret,
	/// Credential kind reported by the token endpoint.
	pub token_kind: TokenKind,
	/// Expiry instant; meaningless when `long_lived` is set.
	pub expires_at: OffsetDateTime,
	/// Refresh secret, when the grant issued one.
	pub refresh_token: Option<Secret>,
	/// Scopes the credential was granted, when known.
	pub scopes: Option<Vec<String>>,
	/// Marks static keys that are exempt from expiry checks.
	pub long_lived: bool,
}
impl Credential {
	/// Builds a credential from a token-endpoint response received at `now`.
	pub fn from_token_response(
		response: TokenResponse,
		scopes: Option<Vec<String>>,
		now: OffsetDateTime,
	) -> Self {
		Self {
			access_token: Secret::new(response.access_token),
			token_kind: TokenKind::Bearer,
			expires_at: now + Duration::seconds(response.expires_in),
			refresh_token: response.refresh_token.map(Secret::new),
			scopes,
			long_lived: false,
		}
	}

	/// Builds a credential from a manually supplied token.
	///
	/// Without a TTL the credential is marked long-lived and exempt from
	/// expiry checks.
	pub fn static_key(
		token: impl Into<String>,
		expires_in: Option<Duration>,
		now: OffsetDateTime,
	) -> Self {
		Self {
			access_token: Secret::new(token),
			token_kind: TokenKind::Bearer,
			expires_at: now + expires_in.unwrap_or(STATIC_KEY_LIFETIME),
			refresh_token: None,
			scopes: None,
			long_lived: expires_in.is_none(),
		}
	}

	/// Returns `true` when the credential still authenticates calls at `instant`.
	pub fn is_valid_at(&self, instant: OffsetDateTime) -> bool {
		self.long_lived || instant < self.expires_at
	}

	/// Returns `true` when less than `buffer` remains before expiry at `instant`.
	///
	/// Long-lived credentials never report as expiring.
	pub fn is_expiring_at(&self, instant: OffsetDateTime, buffer: Duration) -> bool {
		!self.long_lived && self.expires_at - instant < buffer
	}

	/// Formats the credential as an `Authorization` header value.
	pub fn bearer(&self) -> String {
		format!("Bearer {}", self.access_token.expose())
	}
}
impl Debug for Credential {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Credential")
			.field("access_token", &"<redacted>")
			.field("token_kind", &self.token_kind)
			.field("expires_at", &self.expires_at)
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.field("scopes", &self.scopes)
			.field("long_lived", &self.long_lived)
			.finish()
	}
}

/// Wire shape of the token endpoint's response.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TokenResponse {
	/// Issued access token.
	pub access_token: String,
	/// Token kind label, `Bearer` for this API.
	pub token_type: String,
	/// Seconds until the access token expires.
	pub expires_in: i64,
	/// Rotated refresh token, when the grant issues one.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub refresh_token: Option<String>,
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	fn response(expires_in: i64) -> TokenResponse {
		TokenResponse {
			access_token: "a1".into(),
			token_type: "Bearer".into(),
			expires_in,
			refresh_token: Some("r1".into()),
		}
	}

	#[test]
	fn secret_formatters_redact() {
		let secret = Secret::new("super-secret");

		assert_eq!(format!("{secret:?}"), "Secret(\"<redacted>\")");
		assert_eq!(format!("{secret}"), "<redacted>");
	}

	#[test]
	fn token_response_sets_expiry_relative_to_now() {
		let now = macros::datetime!(2025-06-01 00:00 UTC);
		let credential = Credential::from_token_response(response(3_600), None, now);

		assert_eq!(credential.expires_at, now + Duration::hours(1));
		assert!(credential.is_valid_at(now + Duration::minutes(59)));
		assert!(!credential.is_valid_at(now + Duration::hours(2)));
	}

	#[test]
	fn expiring_window_is_buffer_relative() {
		let now = macros::datetime!(2025-06-01 00:00 UTC);
		let credential = Credential::from_token_response(response(3_600), None, now);
		let buffer = Duration::minutes(5);

		assert!(!credential.is_expiring_at(now, buffer));
		assert!(credential.is_expiring_at(now + Duration::minutes(56), buffer));
	}

	#[test]
	fn static_keys_ignore_the_clock() {
		let now = macros::datetime!(2025-06-01 00:00 UTC);
		let credential = Credential::static_key("key1", None, now);

		assert!(credential.long_lived);
		// 400 days later the key still authenticates.
		assert!(credential.is_valid_at(now + Duration::days(400)));
		assert!(!credential.is_expiring_at(now + Duration::days(400), Duration::minutes(5)));
		assert_eq!(credential.bearer(), "Bearer key1");
	}

	#[test]
	fn static_key_with_ttl_expires() {
		let now = macros::datetime!(2025-06-01 00:00 UTC);
		let credential = Credential::static_key("key1", Some(Duration::hours(1)), now);

		assert!(!credential.long_lived);
		assert!(!credential.is_valid_at(now + Duration::hours(2)));
	}
}
