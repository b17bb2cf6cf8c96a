mod common;

// crates.io
use httpmock::prelude::*;
use time::{Duration, OffsetDateTime};
// self
use common::*;
use integration_registry::{
	auth::{CredentialKind, CredentialPayload, CredentialSubject, OAuthToken},
	config::ProviderSpec,
	error::{Error, OperationError, RegistryError},
	operation::OperationStatus,
	provider::{AuthContext, Catalog},
	registry::{OperationRequest, Registry},
};

fn catalog() -> Catalog {
	Catalog::new([oauth_builder("acme"), broken_builder("broken")])
		.expect("Catalog should build successfully.")
}

#[tokio::test]
async fn acme_authorizes_mints_and_runs_health() {
	let server = MockServer::start_async().await;
	let registry = Registry::build(
		[oauth_spec("acme", &server), ProviderSpec::new("broken"), ProviderSpec::new("mystery")],
		&catalog(),
	)
	.await;

	assert_eq!(registry.provider_types().len(), 1);
	assert!(registry.build_failures().contains_key("broken"));
	assert!(registry.config("mystery").is_some());

	let session = registry
		.begin_auth("acme", AuthContext::default())
		.await
		.expect("Authorization should start successfully.");
	let params = query(session.auth_url());

	assert_eq!(params.get("client_id").map(String::as_str), Some(CLIENT_ID));
	assert_eq!(params.get("scope").map(String::as_str), Some("openid profile"));
	assert_eq!(params.get("state").map(String::as_str), Some(session.state()));
	assert!(session.validate_state(session.state()).is_ok());
	assert!(session.validate_state("forged").is_err());

	let exchange = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/token")
				.header("content-type", "application/x-www-form-urlencoded")
				.form_urlencoded_tuple("grant_type", "authorization_code")
				.form_urlencoded_tuple("code", "code-1");
			then.status(200).json_body(token_body("access-1", Some("refresh-1")));
		})
		.await;
	let credential = session.finish("code-1".into()).await.expect("Exchange should succeed.");

	exchange.assert_async().await;
	assert_eq!(credential.kind, CredentialKind::OAuthToken);
	assert_eq!(credential.bearer_token(), Some("access-1"));

	let token = credential.token.clone().expect("Credential should carry a token.");

	assert!(token.is_valid());
	assert_eq!(token.refresh_token.as_ref().map(|s| s.expose()), Some("refresh-1"));

	let result = registry
		.run_operation(OperationRequest::new("acme", "health.default", credential.clone()))
		.await
		.expect("Health check should succeed.");

	assert_eq!(result.status, OperationStatus::Ok);
	assert_eq!(result.details["token"], "access-1");

	let expired = CredentialPayload::builder("acme")
		.oauth_token(
			OAuthToken::new("access-1")
				.with_refresh_token("refresh-1")
				.with_expires_at(OffsetDateTime::now_utc() - Duration::minutes(5)),
		)
		.build()
		.expect("Expired credential should build successfully.");
	let refresh = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/token")
				.form_urlencoded_tuple("grant_type", "refresh_token")
				.form_urlencoded_tuple("refresh_token", "refresh-1");
			then.status(200).json_body(token_body("access-2", None));
		})
		.await;
	let minted = registry
		.mint_payload(CredentialSubject::new(expired))
		.await
		.expect("Mint should refresh the token.");

	refresh.assert_async().await;

	let token = minted.token.expect("Minted credential should carry a token.");

	assert_eq!(token.access_token.expose(), "access-2");
	assert_eq!(token.refresh_token.as_ref().map(|s| s.expose()), Some("refresh-1"));
}

#[tokio::test]
async fn degraded_startup_keeps_healthy_providers_dispatchable() {
	let server = MockServer::start_async().await;
	let registry = Registry::build(
		[ProviderSpec::new("broken"), oauth_spec("acme", &server)],
		&catalog(),
	)
	.await;
	let broken = registry.config("broken").expect("Broken spec should be retained.");

	assert!(!broken.active);
	assert!(registry.provider("broken").is_none());
	assert!(registry.operation_descriptors("broken").is_empty());
	assert_eq!(registry.operation_descriptors("acme").len(), 1);

	let err = registry
		.run_operation(OperationRequest::new(
			"broken",
			"health.default",
			CredentialPayload::builder("broken")
				.api_token("t")
				.build()
				.expect("Credential should build successfully."),
		))
		.await
		.expect_err("Broken provider should not dispatch.");

	assert!(matches!(err, Error::Registry(RegistryError::ProviderNotFound { .. })));
}

#[tokio::test]
async fn operation_config_is_validated_against_schema() {
	let server = MockServer::start_async().await;
	let registry = Registry::build([oauth_spec("acme", &server)], &catalog()).await;
	let credential = CredentialPayload::builder("acme")
		.oauth_token(OAuthToken::new("access-1"))
		.build()
		.expect("Credential should build successfully.");
	let err = registry
		.run_operation(
			OperationRequest::new("acme", "health.default", credential)
				.with_config_entry("include_payloads", "yes"),
		)
		.await
		.expect_err("Invalid config should be rejected.");

	match err {
		Error::Operation(OperationError::InvalidConfig { path, .. }) =>
			assert_eq!(path, "$.include_payloads"),
		other => panic!("Unexpected error: {other:?}."),
	}
}

#[tokio::test]
async fn dispatcher_outlives_registry_safely() {
	let server = MockServer::start_async().await;
	let registry =
		std::sync::Arc::new(Registry::build([oauth_spec("acme", &server)], &catalog()).await);
	let dispatcher = registry.dispatcher();
	let credential = CredentialPayload::builder("acme")
		.oauth_token(OAuthToken::new("access-1"))
		.build()
		.expect("Credential should build successfully.");

	drop(registry);

	let err = dispatcher
		.run(OperationRequest::new("acme", "health.default", credential))
		.await
		.expect_err("Dispatch should fail after the registry is dropped.");

	assert!(matches!(err, Error::Registry(RegistryError::RegistryUnavailable)));
}
