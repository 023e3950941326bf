//! Token store and refresher with singleflight refresh dedup.
//!
//! [`AuthManager`] owns the one live [`Credential`] and hands out a currently
//! valid bearer token, refreshing transparently when less than the buffer
//! window remains. At most one refresh is in flight per store: the first
//! caller acquires the refresh guard and performs the network call; every
//! caller that arrives while it runs attaches to the same outcome via the
//! completed-refresh sequence number, so N concurrent callers observe one
//! network call and an identical result. A failed refresh clears the
//! credential - the store reverts to requiring re-authentication instead of
//! retaining a stale token.

// self
use crate::{
	_prelude::*,
	auth::{Credential, Secret, TokenResponse},
	config::AuthConfig,
	error::AuthError,
	http::{HttpClient, Params, RequestOptions},
	obs::{self, CallKind, CallOutcome, CallSpan},
};

/// Lead time before expiry at which a credential is treated as needing renewal.
const BUFFER_WINDOW: Duration = Duration::minutes(5);
/// Scope requested when the caller specifies none.
const DEFAULT_SCOPE: &str = "public";
/// Authorization redirect path, resolved against the host root.
const AUTHORIZE_PATH: &str = "/oauth/authorize";
/// Revocation path, resolved under the API base.
const REVOKE_PATH: &str = "oauth/tokens/current";
/// Token endpoint path, resolved against the host root.
const TOKEN_PATH: &str = "/oauth/token";

/// How the store was last authenticated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthMode {
	/// Manually supplied static key/token.
	ApiKey,
	/// OAuth grant against the token endpoint.
	OAuth,
}

#[derive(Debug)]
struct AuthState {
	config: Option<AuthConfig>,
	mode: AuthMode,
	credential: Option<Credential>,
	// Bumped once per completed refresh attempt; callers that observed an
	// older value while waiting for the guard attach to `last_refresh`
	// instead of starting a second network call.
	refresh_seq: u64,
	last_refresh: Option<Result<Credential, AuthError>>,
}

/// Owner of the live credential and its refresh lifecycle.
///
/// All mutation happens behind one sync lock, never held across a suspension
/// point; the async guard serializes refresh operations only.
#[derive(Debug)]
pub struct AuthManager {
	http: Arc<HttpClient>,
	state: Mutex<AuthState>,
	refresh_guard: AsyncMutex<()>,
}
impl AuthManager {
	/// Creates a store bound to the shared transport.
	///
	/// With an [`AuthConfig`] the store starts in OAuth mode; without one it
	/// expects a manually supplied key via [`set_access_token`](Self::set_access_token).
	pub fn new(http: Arc<HttpClient>, config: Option<AuthConfig>) -> Self {
		let mode = if config.is_some() { AuthMode::OAuth } else { AuthMode::ApiKey };

		Self {
			http,
			state: Mutex::new(AuthState {
				config,
				mode,
				credential: None,
				refresh_seq: 0,
				last_refresh: None,
			}),
			refresh_guard: AsyncMutex::new(()),
		}
	}

	/// Stores a manually supplied token, replacing any previous credential.
	///
	/// Without a TTL the token is marked long-lived and exempt from expiry
	/// checks and refreshes.
	pub fn set_access_token(&self, token: impl Into<String>, expires_in: Option<Duration>) {
		let mut state = self.state.lock();

		state.credential =
			Some(Credential::static_key(token, expires_in, OffsetDateTime::now_utc()));
		state.mode = AuthMode::ApiKey;
	}

	/// Sets or replaces the OAuth client identity.
	pub fn set_oauth_config(&self, config: AuthConfig) {
		let mut state = self.state.lock();

		state.config = Some(config);
		state.mode = AuthMode::OAuth;
	}

	/// Returns how the store was last authenticated.
	pub fn auth_mode(&self) -> AuthMode {
		self.state.lock().mode
	}

	/// Returns `true` when a complete OAuth client identity is configured.
	pub fn is_oauth_configured(&self) -> bool {
		self.state.lock().config.as_ref().is_some_and(AuthConfig::is_complete)
	}

	/// Returns `true` when a credential is stored and currently valid.
	pub fn is_authenticated(&self) -> bool {
		self.state
			.lock()
			.credential
			.as_ref()
			.is_some_and(|credential| credential.is_valid_at(OffsetDateTime::now_utc()))
	}

	/// Returns a clone of the stored credential, if any.
	pub fn credential(&self) -> Option<Credential> {
		self.state.lock().credential.clone()
	}

	/// Builds the authorization redirect URL for the code flow.
	///
	/// Pure string formatting against the configured host; no network call.
	/// Empty `scopes` fall back to the API's public scope.
	pub fn authorize_url(&self, scopes: &[&str], state: Option<&str>) -> Result<Url> {
		let config = self.complete_config()?;
		let redirect_uri = config.redirect_uri.ok_or(AuthError::MissingRedirectUri)?;
		let base = Url::parse(&self.http.config().base_url)
			.map_err(|source| crate::error::ConfigError::InvalidBaseUrl { source })?;
		let mut url = base.join(AUTHORIZE_PATH).map_err(|source| {
			crate::error::ConfigError::InvalidPath { path: AUTHORIZE_PATH.into(), source }
		})?;

		{
			let mut query = url.query_pairs_mut();

			query
				.append_pair("client_id", &config.client_id)
				.append_pair("redirect_uri", &redirect_uri)
				.append_pair("response_type", "code")
				.append_pair("scope", &join_scopes(scopes));

			if let Some(state) = state {
				query.append_pair("state", state);
			}
		}

		Ok(url)
	}

	/// Exchanges an authorization code for a credential, overwriting the store.
	pub async fn exchange_code(&self, code: &str) -> Result<Credential> {
		if code.is_empty() {
			return Err(Error::validation("authorization code must not be empty"));
		}

		let config = self.complete_config()?;
		let redirect_uri = config.redirect_uri.clone().ok_or(AuthError::MissingRedirectUri)?;
		let params = Params::new()
			.insert("client_id", config.client_id.as_str())
			.insert("client_secret", config.client_secret.as_str())
			.insert("code", code)
			.insert("grant_type", "authorization_code")
			.insert("redirect_uri", redirect_uri.as_str());

		self.token_grant("exchange_code", params, None).await
	}

	/// Performs the client-credentials grant, overwriting the store.
	///
	/// The granted scopes are recorded on the credential for later refreshes.
	pub async fn client_credentials_token(&self, scopes: &[&str]) -> Result<Credential> {
		let config = self.complete_config()?;
		let scope = join_scopes(scopes);
		let params = Params::new()
			.insert("client_id", config.client_id.as_str())
			.insert("client_secret", config.client_secret.as_str())
			.insert("grant_type", "client_credentials")
			.insert("scope", scope.as_str());
		let scopes = scope.split(' ').map(str::to_string).collect();

		self.token_grant("client_credentials", params, Some(scopes)).await
	}

	/// Returns a currently valid bearer token, refreshing when needed.
	///
	/// Long-lived credentials are returned as-is regardless of elapsed time.
	/// A credential inside the buffer window triggers (or attaches to) a
	/// refresh; without a refresh path the caller must re-authenticate.
	pub async fn valid_token(&self) -> Result<String> {
		let token = {
			let state = self.state.lock();
			let credential = state.credential.as_ref().ok_or(AuthError::NotAuthenticated)?;

			if credential.long_lived
				|| !credential.is_expiring_at(OffsetDateTime::now_utc(), BUFFER_WINDOW)
			{
				Some(credential.access_token.expose().to_string())
			} else if credential.refresh_token.is_none() {
				return Err(AuthError::RefreshUnavailable.into());
			} else if !state.config.as_ref().is_some_and(AuthConfig::is_complete) {
				return Err(AuthError::NotConfigured.into());
			} else {
				None
			}
		};

		match token {
			Some(token) => Ok(token),
			None => Ok(self.refresh_shared().await?.access_token.expose().to_string()),
		}
	}

	/// Composes the `Authorization` header value from [`valid_token`](Self::valid_token).
	pub async fn authorization_header(&self) -> Result<String> {
		Ok(format!("Bearer {}", self.valid_token().await?))
	}

	/// Forces a refresh of the stored credential.
	///
	/// Concurrent calls share one network operation and observe its outcome
	/// identically.
	pub async fn refresh_access_token(&self) -> Result<Credential> {
		{
			let state = self.state.lock();
			let credential = state.credential.as_ref().ok_or(AuthError::NotAuthenticated)?;

			if credential.refresh_token.is_none() {
				return Err(AuthError::RefreshUnavailable.into());
			}
			if !state.config.as_ref().is_some_and(AuthConfig::is_complete) {
				return Err(AuthError::NotConfigured.into());
			}
		}

		self.refresh_shared().await
	}

	/// Best-effort remote revocation followed by unconditional local clearing.
	///
	/// Remote errors are swallowed; revocation never fails and local state
	/// always clears.
	pub async fn revoke_token(&self) {
		let token = self
			.state
			.lock()
			.credential
			.as_ref()
			.map(|credential| credential.access_token.expose().to_string());

		if let Some(token) = token {
			obs::record_call_outcome(CallKind::Revoke, CallOutcome::Attempt);

			let options =
				RequestOptions::new().header("Authorization", format!("Bearer {token}"));
			let outcome = match self.http.delete(REVOKE_PATH, options).await {
				Ok(_) => CallOutcome::Success,
				Err(_) => CallOutcome::Failure,
			};

			obs::record_call_outcome(CallKind::Revoke, outcome);
		}

		self.clear();
	}

	/// Clears the stored credential and refresh history.
	pub fn clear(&self) {
		let mut state = self.state.lock();

		state.credential = None;
		state.last_refresh = None;
	}

	/// Runs at most one refresh at a time and broadcasts its outcome.
	///
	/// The sequence number is read before waiting on the guard. If it moved
	/// while we waited, a refresh completed in the meantime and its stored
	/// outcome is returned instead of issuing a second network call.
	async fn refresh_shared(&self) -> Result<Credential> {
		let observed = self.state.lock().refresh_seq;
		let _singleflight = self.refresh_guard.lock().await;

		let attached = {
			let state = self.state.lock();

			if state.refresh_seq == observed { None } else { state.last_refresh.clone() }
		};

		if let Some(outcome) = attached {
			return outcome.map_err(Error::from);
		}

		let span = CallSpan::new(CallKind::Token, "refresh");

		obs::record_call_outcome(CallKind::Token, CallOutcome::Attempt);

		let outcome = match span.instrument(self.perform_refresh()).await {
			Ok(credential) => Ok(credential),
			Err(err) => Err(AuthError::RefreshFailed { source: Arc::new(err) }),
		};
		let mut state = self.state.lock();

		state.refresh_seq = state.refresh_seq.wrapping_add(1);
		state.credential = outcome.as_ref().ok().cloned();
		state.last_refresh = Some(outcome.clone());

		obs::record_call_outcome(
			CallKind::Token,
			if outcome.is_ok() { CallOutcome::Success } else { CallOutcome::Failure },
		);

		outcome.map_err(Error::from)
	}

	async fn perform_refresh(&self) -> Result<Credential> {
		let (config, refresh_token, scopes) = {
			let state = self.state.lock();
			let config = state
				.config
				.clone()
				.filter(AuthConfig::is_complete)
				.ok_or(AuthError::NotConfigured)?;
			let credential = state.credential.as_ref().ok_or(AuthError::NotAuthenticated)?;
			let refresh_token = credential
				.refresh_token
				.as_ref()
				.ok_or(AuthError::RefreshUnavailable)?
				.expose()
				.to_string();

			(config, refresh_token, credential.scopes.clone())
		};
		let scope =
			scopes.as_ref().map_or_else(|| DEFAULT_SCOPE.to_string(), |scopes| scopes.join(" "));
		let params = Params::new()
			.insert("client_id", config.client_id.as_str())
			.insert("client_secret", config.client_secret.as_str())
			.insert("grant_type", "refresh_token")
			.insert("refresh_token", refresh_token.as_str())
			.insert("scope", scope.as_str());
		let response =
			self.http.post(TOKEN_PATH, RequestOptions::new().form().params(params)).await?;
		let token = response.json::<TokenResponse>()?;
		let mut credential =
			Credential::from_token_response(token, scopes, OffsetDateTime::now_utc());

		// The endpoint may omit the rotated refresh token; keep the old one.
		if credential.refresh_token.is_none() {
			credential.refresh_token = Some(Secret::new(refresh_token));
		}

		Ok(credential)
	}

	async fn token_grant(
		&self,
		stage: &'static str,
		params: Params,
		scopes: Option<Vec<String>>,
	) -> Result<Credential> {
		let span = CallSpan::new(CallKind::Token, stage);

		obs::record_call_outcome(CallKind::Token, CallOutcome::Attempt);

		let result = span
			.instrument(async {
				let response =
					self.http.post(TOKEN_PATH, RequestOptions::new().form().params(params)).await?;
				let token = response.json::<TokenResponse>()?;

				Ok(Credential::from_token_response(token, scopes, OffsetDateTime::now_utc()))
			})
			.await;

		match &result {
			Ok(credential) => {
				let mut state = self.state.lock();

				state.credential = Some(credential.clone());
				state.mode = AuthMode::OAuth;

				obs::record_call_outcome(CallKind::Token, CallOutcome::Success);
			},
			Err(_) => obs::record_call_outcome(CallKind::Token, CallOutcome::Failure),
		}

		result
	}

	fn complete_config(&self) -> Result<AuthConfig> {
		self.state
			.lock()
			.config
			.clone()
			.filter(AuthConfig::is_complete)
			.ok_or_else(|| AuthError::NotConfigured.into())
	}
}

fn join_scopes(scopes: &[&str]) -> String {
	if scopes.is_empty() { DEFAULT_SCOPE.to_string() } else { scopes.join(" ") }
}
