//! Resilient HTTP transport for API calls.
//!
//! [`HttpClient`] turns one logical call into a reliable network exchange:
//! it encodes typed parameters, consults the [`RateGovernor`] for admission,
//! bounds every attempt with a timeout, retries transient failures with a
//! linear backoff, and classifies everything else into the crate's error
//! taxonomy. A TTL [`ResponseCache`] can be attached for GET responses.

// std
use std::time::Duration;
// crates.io
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, USER_AGENT};
pub use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tokio::time;
// self
use crate::{
	_prelude::*,
	cache::ResponseCache,
	config::Config,
	error::{ConfigError, HttpError},
	obs::{self, CallKind, CallOutcome, CallSpan},
	rate::RateGovernor,
};

const API_VERSION_HEADER: &str = "x-api-version";

/// A single query/body parameter value.
///
/// Scalars become one entry; lists expand to repeated `key[]=value` entries
/// preserving list order. Absent values never reach the wire - model them as
/// omitted keys via [`Params::insert_opt`].
#[derive(Clone, Debug, PartialEq)]
pub enum ParamValue {
	/// One scalar entry.
	Single(Value),
	/// Repeated `key[]` entries, order preserved.
	Many(Vec<Value>),
}

macro_rules! impl_scalar_param {
	($($ty:ty),* $(,)?) => {$(
		impl From<$ty> for ParamValue {
			fn from(value: $ty) -> Self {
				Self::Single(Value::from(value))
			}
		}
	)*};
}
impl_scalar_param!(&str, String, bool, f64, i32, i64, u32, u64);
impl<T> From<Vec<T>> for ParamValue
where
	Value: From<T>,
{
	fn from(values: Vec<T>) -> Self {
		Self::Many(values.into_iter().map(Value::from).collect())
	}
}

/// Ordered set of request parameters.
///
/// For GET requests the parameters are encoded into the query string; for
/// other methods they become the request body, encoded per
/// [`BodyKind`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Params(Vec<(String, ParamValue)>);
impl Params {
	/// Creates an empty parameter set.
	pub fn new() -> Self {
		Self::default()
	}

	/// Appends one parameter.
	pub fn insert(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
		self.0.push((key.into(), value.into()));

		self
	}

	/// Appends one parameter when the value is present; `None` is omitted
	/// entirely instead of being serialized.
	pub fn insert_opt<V>(self, key: impl Into<String>, value: Option<V>) -> Self
	where
		V: Into<ParamValue>,
	{
		match value {
			Some(value) => self.insert(key, value),
			None => self,
		}
	}

	/// Returns `true` when no parameters have been added.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// Flattens the set into wire pairs, expanding lists as `key[]`.
	pub(crate) fn pairs(&self) -> Vec<(String, String)> {
		let mut pairs = Vec::new();

		for (key, value) in &self.0 {
			match value {
				ParamValue::Single(value) => pairs.push((key.clone(), render(value))),
				ParamValue::Many(values) =>
					pairs.extend(values.iter().map(|value| (format!("{key}[]"), render(value)))),
			}
		}

		pairs
	}

	/// Rebuilds the set as a JSON object, keeping native scalar types.
	pub(crate) fn json_map(&self) -> Map<String, Value> {
		self.0
			.iter()
			.map(|(key, value)| {
				let value = match value {
					ParamValue::Single(value) => value.clone(),
					ParamValue::Many(values) => Value::Array(values.clone()),
				};

				(key.clone(), value)
			})
			.collect()
	}
}

fn render(value: &Value) -> String {
	match value {
		Value::String(s) => s.clone(),
		other => other.to_string(),
	}
}

/// Body encoding applied to non-GET parameters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BodyKind {
	/// `application/json` object body.
	#[default]
	Json,
	/// `application/x-www-form-urlencoded` body.
	Form,
}

/// Per-call options layered over the client [`Config`].
#[derive(Clone, Debug, Default)]
pub struct RequestOptions {
	/// Extra headers merged over the defaults; later entries win.
	pub headers: Vec<(String, String)>,
	/// Typed parameters for the query string or body.
	pub params: Params,
	/// Body encoding for non-GET requests.
	pub body: BodyKind,
	/// Per-call override of the configured attempt timeout.
	pub timeout: Option<Duration>,
}
impl RequestOptions {
	/// Creates empty options.
	pub fn new() -> Self {
		Self::default()
	}

	/// Adds one header.
	pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.headers.push((name.into(), value.into()));

		self
	}

	/// Replaces the parameter set.
	pub fn params(mut self, params: Params) -> Self {
		self.params = params;

		self
	}

	/// Switches the body encoding to form-urlencoded.
	pub fn form(mut self) -> Self {
		self.body = BodyKind::Form;

		self
	}

	/// Overrides the per-attempt timeout for this call only.
	pub fn timeout(mut self, timeout: Duration) -> Self {
		self.timeout = Some(timeout);

		self
	}
}

/// Decoded response payload.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
	/// Body declared and parsed as JSON.
	Json(Value),
	/// Anything else, returned as raw text.
	Text(String),
}
impl Payload {
	/// Returns the JSON value when the payload is structured.
	pub fn as_json(&self) -> Option<&Value> {
		match self {
			Self::Json(value) => Some(value),
			Self::Text(_) => None,
		}
	}

	/// Returns the raw text when the payload is unstructured.
	pub fn as_text(&self) -> Option<&str> {
		match self {
			Self::Json(_) => None,
			Self::Text(text) => Some(text),
		}
	}
}

/// Successful outcome of one logical call.
#[derive(Clone, Debug)]
pub struct Response {
	/// Decoded payload.
	pub data: Payload,
	/// HTTP status code.
	pub status: u16,
	/// Response headers.
	pub headers: HeaderMap,
}
impl Response {
	/// Deserializes the JSON payload into `T`, reporting the failing path on
	/// mismatch.
	pub fn json<T>(&self) -> Result<T>
	where
		T: DeserializeOwned,
	{
		match &self.data {
			Payload::Json(value) => serde_path_to_error::deserialize(value.clone())
				.map_err(|source| Error::Decode { source }),
			Payload::Text(_) =>
				Err(Error::validation("response payload is text, not JSON")),
		}
	}
}

enum BuiltBody {
	Json(Map<String, Value>),
	Form(Vec<(String, String)>),
}

/// Resilient transport executing logical calls against the configured base URL.
pub struct HttpClient {
	client: ReqwestClient,
	config: Config,
	base: Url,
	governor: Option<RateGovernor>,
	cache: Option<ResponseCache<Response>>,
}
impl HttpClient {
	/// Builds a transport from the provided configuration.
	///
	/// The base path is normalized to a trailing slash so relative request
	/// paths resolve under it rather than replacing its last segment.
	pub fn new(config: Config) -> Result<Self> {
		let mut base =
			Url::parse(&config.base_url).map_err(|source| ConfigError::InvalidBaseUrl { source })?;

		if !base.path().ends_with('/') {
			base.set_path(&format!("{}/", base.path()));
		}

		let client =
			ReqwestClient::builder().build().map_err(ConfigError::http_client_build)?;
		let governor = config.rate_limit.map(RateGovernor::new);
		let cache = config.cache.map(ResponseCache::new);

		Ok(Self { client, config, base, governor, cache })
	}

	/// Returns the active configuration.
	pub fn config(&self) -> &Config {
		&self.config
	}

	/// Returns the admission governor, when rate limiting is enabled.
	pub fn governor(&self) -> Option<&RateGovernor> {
		self.governor.as_ref()
	}

	/// Executes one logical call.
	///
	/// The call blocks on governor admission, then attempts the exchange up to
	/// `1 + retry_attempts` times. Transient failures (5xx, network, timeout)
	/// wait `retry_delay * attempt` between tries; 4xx responses fail
	/// immediately. The last observed error is raised after exhaustion.
	pub async fn request(&self, method: Method, path: &str, options: RequestOptions) -> Result<Response> {
		let span = CallSpan::new(CallKind::Api, "request");

		obs::record_call_outcome(CallKind::Api, CallOutcome::Attempt);

		let result = span.instrument(self.execute(method, path, options)).await;

		match &result {
			Ok(_) => obs::record_call_outcome(CallKind::Api, CallOutcome::Success),
			Err(_) => obs::record_call_outcome(CallKind::Api, CallOutcome::Failure),
		}

		result
	}

	/// Convenience GET.
	pub async fn get(&self, path: &str, options: RequestOptions) -> Result<Response> {
		self.request(Method::GET, path, options).await
	}

	/// GET with response caching, when a cache is configured.
	///
	/// The cache key is the fully resolved URL including the encoded query, so
	/// distinct parameter sets never collide.
	pub async fn get_cached(&self, path: &str, options: RequestOptions) -> Result<Response> {
		let Some(cache) = &self.cache else {
			return self.get(path, options).await;
		};
		let key = self.resolve(&Method::GET, path, &options.params)?.to_string();

		if let Some(hit) = cache.get(&key) {
			return Ok(hit);
		}

		let response = self.get(path, options).await?;

		cache.set(key, response.clone());

		Ok(response)
	}

	/// Convenience POST.
	pub async fn post(&self, path: &str, options: RequestOptions) -> Result<Response> {
		self.request(Method::POST, path, options).await
	}

	/// Convenience PUT.
	pub async fn put(&self, path: &str, options: RequestOptions) -> Result<Response> {
		self.request(Method::PUT, path, options).await
	}

	/// Convenience DELETE.
	pub async fn delete(&self, path: &str, options: RequestOptions) -> Result<Response> {
		self.request(Method::DELETE, path, options).await
	}

	/// Convenience PATCH.
	pub async fn patch(&self, path: &str, options: RequestOptions) -> Result<Response> {
		self.request(Method::PATCH, path, options).await
	}

	/// Executes one logical call and deserializes the JSON payload into `T`.
	pub async fn request_json<T>(
		&self,
		method: Method,
		path: &str,
		options: RequestOptions,
	) -> Result<T>
	where
		T: DeserializeOwned,
	{
		self.request(method, path, options).await?.json()
	}

	async fn execute(&self, method: Method, path: &str, options: RequestOptions) -> Result<Response> {
		if path.is_empty() {
			return Err(Error::validation("request path must not be empty"));
		}

		let url = self.resolve(&method, path, &options.params)?;
		let headers = self.build_headers(&options)?;
		let body = (method != Method::GET && !options.params.is_empty()).then(|| match options.body {
			BodyKind::Json => BuiltBody::Json(options.params.json_map()),
			BodyKind::Form => BuiltBody::Form(options.params.pairs()),
		});
		let limit = options.timeout.unwrap_or(self.config.timeout);

		if let Some(governor) = &self.governor {
			governor.admit().await;
		}

		let mut attempt = 0;

		loop {
			match self.attempt(&method, &url, &headers, body.as_ref(), limit).await {
				Ok(response) => return Ok(response),
				Err(err) if err.is_retryable() && attempt < self.config.retry_attempts => {
					attempt += 1;

					obs::record_call_outcome(CallKind::Api, CallOutcome::Retry);
					time::sleep(self.config.retry_delay * attempt).await;
				},
				Err(err) => return Err(err),
			}
		}
	}

	async fn attempt(
		&self,
		method: &Method,
		url: &Url,
		headers: &HeaderMap,
		body: Option<&BuiltBody>,
		limit: Duration,
	) -> Result<Response> {
		let mut builder =
			self.client.request(method.clone(), url.clone()).headers(headers.clone());

		match body {
			Some(BuiltBody::Json(map)) => builder = builder.json(map),
			Some(BuiltBody::Form(pairs)) => builder = builder.form(pairs),
			None => {},
		}

		// One timeout covers the attempt end to end, response body included.
		// A retried attempt starts a fresh timeout.
		time::timeout(limit, async {
			let response = builder.send().await.map_err(Error::network)?;
			let status = response.status().as_u16();
			let headers = response.headers().clone();
			let declared_json = headers
				.get(CONTENT_TYPE)
				.and_then(|value| value.to_str().ok())
				.is_some_and(|value| value.contains("application/json"));
			let text = response.text().await.map_err(Error::network)?;
			let success = (200..300).contains(&status);
			let data = if declared_json && !text.is_empty() {
				if success {
					let mut deserializer = serde_json::Deserializer::from_str(&text);

					Payload::Json(
						serde_path_to_error::deserialize(&mut deserializer)
							.map_err(|source| Error::Decode { source })?,
					)
				} else {
					// Best-effort decode for diagnostics on error responses.
					match serde_json::from_str(&text) {
						Ok(value) => Payload::Json(value),
						Err(_) => Payload::Text(text),
					}
				}
			} else {
				Payload::Text(text)
			};

			if !success {
				return Err(HttpError { status, body: data }.into());
			}

			Ok(Response { data, status, headers })
		})
		.await
		.map_err(|_| Error::Timeout { limit })?
	}

	/// Resolves `path` against the base URL, attaching query parameters for
	/// GET calls.
	///
	/// Relative paths resolve under the API base; leading-slash paths resolve
	/// against the host root, which is how the token and authorize endpoints
	/// escape the `/api/v2` base.
	fn resolve(&self, method: &Method, path: &str, params: &Params) -> Result<Url> {
		let mut url = self
			.base
			.join(path)
			.map_err(|source| ConfigError::InvalidPath { path: path.into(), source })?;

		if *method == Method::GET && !params.is_empty() {
			let mut query = url.query_pairs_mut();

			for (key, value) in params.pairs() {
				query.append_pair(&key, &value);
			}
		}

		Ok(url)
	}

	fn build_headers(&self, options: &RequestOptions) -> Result<HeaderMap> {
		let mut headers = HeaderMap::new();
		let content_type = match options.body {
			BodyKind::Json => "application/json",
			BodyKind::Form => "application/x-www-form-urlencoded",
		};

		headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
		headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
		headers.insert(
			USER_AGENT,
			HeaderValue::from_str(&self.config.user_agent)
				.map_err(|_| ConfigError::InvalidHeader { name: "User-Agent".into() })?,
		);
		headers.insert(
			HeaderName::from_static(API_VERSION_HEADER),
			HeaderValue::from_str(&self.config.api_version)
				.map_err(|_| ConfigError::InvalidHeader { name: API_VERSION_HEADER.into() })?,
		);

		for (name, value) in &options.headers {
			let name = HeaderName::from_bytes(name.as_bytes())
				.map_err(|_| ConfigError::InvalidHeader { name: name.clone() })?;
			let value = HeaderValue::from_str(value)
				.map_err(|_| ConfigError::InvalidHeader { name: name.to_string() })?;

			headers.insert(name, value);
		}

		Ok(headers)
	}
}
impl Debug for HttpClient {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("HttpClient")
			.field("base", &self.base.as_str())
			.field("governor", &self.governor.is_some())
			.field("cache", &self.cache.is_some())
			.finish()
	}
}
