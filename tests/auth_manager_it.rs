// std
use std::{sync::Arc, time::Duration as StdDuration};
// crates.io
use httpmock::prelude::*;
use time::{Duration, OffsetDateTime};
// self
use osu_api_client::{
	auth::AuthManager,
	config::{AuthConfig, Config},
	error::{AuthError, Error},
	http::HttpClient,
};

const CLIENT_ID: &str = "client-1";
const CLIENT_SECRET: &str = "secret-1";

fn manager(server: &MockServer, config: Config) -> AuthManager {
	let http = Arc::new(
		HttpClient::new(config.with_base_url(server.base_url()).with_rate_limit(None))
			.expect("Test transport should build successfully."),
	);

	AuthManager::new(
		http,
		Some(
			AuthConfig::new(CLIENT_ID, CLIENT_SECRET)
				.with_redirect_uri("https://example.com/callback"),
		),
	)
}

fn token_body(access: &str, expires_in: i64, refresh: Option<&str>) -> String {
	match refresh {
		Some(refresh) => format!(
			"{{\"access_token\":\"{access}\",\"token_type\":\"Bearer\",\"expires_in\":{expires_in},\"refresh_token\":\"{refresh}\"}}",
		),
		None => format!(
			"{{\"access_token\":\"{access}\",\"token_type\":\"Bearer\",\"expires_in\":{expires_in}}}",
		),
	}
}

#[tokio::test]
async fn code_exchange_stores_the_credential() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/oauth/token")
				.header("content-type", "application/x-www-form-urlencoded")
				.body_includes("grant_type=authorization_code")
				.body_includes("code=code-1")
				.body_includes("client_id=client-1");
			then.status(200)
				.header("content-type", "application/json")
				.body(token_body("a1", 86_400, Some("r1")));
		})
		.await;
	let manager = manager(&server, Config::default());
	let credential =
		manager.exchange_code("code-1").await.expect("Code exchange should succeed.");

	mock.assert_async().await;

	assert_eq!(credential.access_token.expose(), "a1");
	assert_eq!(credential.refresh_token.as_ref().map(|secret| secret.expose()), Some("r1"));
	assert_eq!(
		manager.authorization_header().await.expect("Fresh credential should be usable."),
		"Bearer a1",
	);
}

#[tokio::test]
async fn client_credentials_grant_records_scopes() {
	let server = MockServer::start_async().await;

	server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/oauth/token")
				.body_includes("grant_type=client_credentials")
				.body_includes("scope=public");
			then.status(200)
				.header("content-type", "application/json")
				.body(token_body("a1", 86_400, None));
		})
		.await;

	let manager = manager(&server, Config::default());
	let credential = manager
		.client_credentials_token(&[])
		.await
		.expect("Client credentials grant should succeed.");

	assert_eq!(credential.scopes, Some(vec!["public".to_string()]));
	assert!(manager.is_authenticated());
}

#[tokio::test]
async fn expiring_credential_refreshes_and_replaces_the_store() {
	let server = MockServer::start_async().await;

	// Seeds a credential with 200s remaining, inside the 300s buffer window.
	server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth/token").body_includes("grant_type=authorization_code");
			then.status(200)
				.header("content-type", "application/json")
				.body(token_body("a1", 200, Some("r1")));
		})
		.await;

	let refresh = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/oauth/token")
				.body_includes("grant_type=refresh_token")
				.body_includes("refresh_token=r1");
			then.status(200)
				.header("content-type", "application/json")
				.body(token_body("a2", 3_600, Some("r2")));
		})
		.await;
	let manager = manager(&server, Config::default());

	manager.exchange_code("code-1").await.expect("Seeding exchange should succeed.");

	let before = OffsetDateTime::now_utc();
	let token = manager.valid_token().await.expect("Refresh should produce a valid token.");

	refresh.assert_async().await;

	assert_eq!(token, "a2");

	let credential = manager.credential().expect("Refreshed credential should be stored.");

	assert_eq!(credential.refresh_token.as_ref().map(|secret| secret.expose()), Some("r2"));
	// expires_at = now + expires_in.
	assert!(credential.expires_at >= before + Duration::seconds(3_600));
	assert!(credential.expires_at <= OffsetDateTime::now_utc() + Duration::seconds(3_600));
}

#[tokio::test]
async fn refresh_without_rotated_secret_keeps_the_old_one() {
	let server = MockServer::start_async().await;

	server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth/token").body_includes("grant_type=authorization_code");
			then.status(200)
				.header("content-type", "application/json")
				.body(token_body("a1", 100, Some("r1")));
		})
		.await;
	server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth/token").body_includes("grant_type=refresh_token");
			then.status(200)
				.header("content-type", "application/json")
				.body(token_body("a2", 3_600, None));
		})
		.await;

	let manager = manager(&server, Config::default());

	manager.exchange_code("code-1").await.expect("Seeding exchange should succeed.");
	manager.valid_token().await.expect("Refresh should succeed.");

	let credential = manager.credential().expect("Credential should remain stored.");

	assert_eq!(credential.refresh_token.as_ref().map(|secret| secret.expose()), Some("r1"));
}

#[tokio::test]
async fn concurrent_callers_share_one_refresh() {
	let server = MockServer::start_async().await;

	server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth/token").body_includes("grant_type=authorization_code");
			then.status(200)
				.header("content-type", "application/json")
				.body(token_body("a1", 100, Some("r1")));
		})
		.await;

	let refresh = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth/token").body_includes("grant_type=refresh_token");
			then.status(200)
				.header("content-type", "application/json")
				.delay(StdDuration::from_millis(100))
				.body(token_body("a2", 3_600, Some("r2")));
		})
		.await;
	let manager = manager(&server, Config::default());

	manager.exchange_code("code-1").await.expect("Seeding exchange should succeed.");

	let (first, second, third) =
		tokio::join!(manager.valid_token(), manager.valid_token(), manager.valid_token());

	// Exactly one network refresh; every caller observes the same new token.
	refresh.assert_calls_async(1).await;

	assert_eq!(first.expect("First caller should succeed."), "a2");
	assert_eq!(second.expect("Second caller should succeed."), "a2");
	assert_eq!(third.expect("Third caller should succeed."), "a2");
}

#[tokio::test]
async fn failed_refresh_is_broadcast_and_clears_the_store() {
	let server = MockServer::start_async().await;

	server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth/token").body_includes("grant_type=authorization_code");
			then.status(200)
				.header("content-type", "application/json")
				.body(token_body("a1", 100, Some("r1")));
		})
		.await;

	let refresh = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth/token").body_includes("grant_type=refresh_token");
			then.status(400)
				.header("content-type", "application/json")
				.delay(StdDuration::from_millis(100))
				.body("{\"error\":\"invalid_grant\"}");
		})
		.await;
	let manager = manager(&server, Config::default().with_retry_attempts(0));

	manager.exchange_code("code-1").await.expect("Seeding exchange should succeed.");

	let (first, second) = tokio::join!(manager.valid_token(), manager.valid_token());
	let first = first.expect_err("First caller should observe the refresh failure.");
	let second = second.expect_err("Second caller should observe the refresh failure.");

	refresh.assert_calls_async(1).await;

	assert!(matches!(first, Error::Auth(AuthError::RefreshFailed { .. })));
	assert!(matches!(second, Error::Auth(AuthError::RefreshFailed { .. })));

	// No stale credential survives a failed refresh.
	assert!(manager.credential().is_none());
	assert!(matches!(
		manager.valid_token().await.expect_err("Cleared store should reject."),
		Error::Auth(AuthError::NotAuthenticated),
	));
}

#[tokio::test]
async fn static_keys_never_refresh() {
	let server = MockServer::start_async().await;
	let token_endpoint = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth/token");
			then.status(200)
				.header("content-type", "application/json")
				.body(token_body("never", 3_600, None));
		})
		.await;
	let manager = manager(&server, Config::default());

	manager.set_access_token("key1", None);

	assert_eq!(
		manager.authorization_header().await.expect("Static key should be usable."),
		"Bearer key1",
	);

	token_endpoint.assert_calls_async(0).await;
}

#[tokio::test]
async fn revocation_is_best_effort_and_always_clears() {
	let server = MockServer::start_async().await;
	let revoke = server
		.mock_async(|when, then| {
			when.method(DELETE)
				.path("/oauth/tokens/current")
				.header("authorization", "Bearer key1");
			then.status(500).body("revocation backend down");
		})
		.await;
	let manager = manager(&server, Config::default().with_retry_attempts(0));

	manager.set_access_token("key1", None);
	// The remote failure is swallowed.
	manager.revoke_token().await;

	revoke.assert_async().await;

	assert!(!manager.is_authenticated());
	assert!(manager.credential().is_none());
}
