//! Top-level client facade wiring config, transport, and the token store.

// self
use crate::{
	_prelude::*,
	auth::AuthManager,
	config::{AuthConfig, Config},
	http::{HttpClient, Method, RequestOptions, Response},
};

/// Authenticated API client.
///
/// Owns the shared transport and the token store. Endpoint-specific helpers
/// live outside this crate; they compose [`Client::request`] with their own
/// parameter shaping and response schemas.
#[derive(Clone, Debug)]
pub struct Client {
	http: Arc<HttpClient>,
	auth: Arc<AuthManager>,
}
impl Client {
	/// Creates an unauthenticated client; authenticate later via
	/// [`auth`](Self::auth).
	pub fn new(config: Config) -> Result<Self> {
		Self::build(config, None, None)
	}

	/// Creates a client authenticated with a static API key.
	pub fn with_api_key(key: impl Into<String>, config: Config) -> Result<Self> {
		Self::build(config, None, Some(key.into()))
	}

	/// Creates a client configured for OAuth grants.
	pub fn with_oauth(auth: AuthConfig, config: Config) -> Result<Self> {
		Self::build(config, Some(auth), None)
	}

	fn build(config: Config, auth: Option<AuthConfig>, key: Option<String>) -> Result<Self> {
		let http = Arc::new(HttpClient::new(config)?);
		let auth = Arc::new(AuthManager::new(http.clone(), auth));

		if let Some(key) = key {
			auth.set_access_token(key, None);
		}

		Ok(Self { http, auth })
	}

	/// Returns the token store.
	pub fn auth(&self) -> &AuthManager {
		&self.auth
	}

	/// Returns the underlying transport, for unauthenticated calls.
	pub fn http(&self) -> &HttpClient {
		&self.http
	}

	/// Executes one authenticated call.
	///
	/// Awaits a valid bearer token from the store (refreshing if needed),
	/// then delegates to the resilient transport.
	pub async fn request(
		&self,
		method: Method,
		path: &str,
		options: RequestOptions,
	) -> Result<Response> {
		let header = self.auth.authorization_header().await?;

		self.http.request(method, path, options.header("Authorization", header)).await
	}

	/// Convenience authenticated GET.
	pub async fn get(&self, path: &str, options: RequestOptions) -> Result<Response> {
		self.request(Method::GET, path, options).await
	}

	/// Convenience authenticated POST.
	pub async fn post(&self, path: &str, options: RequestOptions) -> Result<Response> {
		self.request(Method::POST, path, options).await
	}
}
