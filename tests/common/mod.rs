#![allow(dead_code)]

// std
use std::{collections::HashMap, sync::Arc};
// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use httpmock::prelude::*;
use serde_json::Value;
// self
use integration_registry::{
	config::{OAuthSpec, ProviderSpec},
	error::Error,
	operation::{OperationResult, health_operation},
	provider::{Builder, BuilderFn, OAuthProvider, Provider},
	url::Url,
};

pub const CLIENT_ID: &str = "client-it";
pub const CLIENT_SECRET: &str = "secret-it";

pub fn mock_url(server: &MockServer, path: &str) -> Url {
	Url::parse(&server.url(path)).expect("Mock URL should parse successfully.")
}

/// OAuth spec whose endpoints live on `server`.
pub fn oauth_spec(provider: &str, server: &MockServer) -> ProviderSpec {
	let oauth = OAuthSpec::new(
		CLIENT_ID,
		mock_url(server, "/authorize"),
		mock_url(server, "/token"),
		Url::parse("https://app.example.com/callback").expect("Redirect URI should parse."),
	)
	.with_client_secret(CLIENT_SECRET)
	.with_scopes(["openid", "profile"]);

	ProviderSpec::new(provider).with_oauth(oauth)
}

pub fn token_body(access: &str, refresh: Option<&str>) -> Value {
	let mut body = serde_json::json!({
		"access_token": access,
		"token_type": "bearer",
		"expires_in": 3600
	});

	if let Some(refresh) = refresh {
		body["refresh_token"] = refresh.into();
	}

	body
}

pub fn id_token(claims: &Value) -> String {
	format!(
		"{}.{}.sig",
		URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256"}"#),
		URL_SAFE_NO_PAD.encode(claims.to_string())
	)
}

pub fn query(url: &Url) -> HashMap<String, String> {
	url.query_pairs().into_owned().collect()
}

/// Builder for an OAuth provider publishing a `health.default` that echoes the bearer token.
pub fn oauth_builder(provider: &'static str) -> Arc<dyn Builder> {
	Arc::new(BuilderFn::new(provider, |spec| {
		let provider = OAuthProvider::new(spec)?.with_operations(vec![health_operation(
			"Echo the bearer token.",
			|input| async move {
				let token = input.credential.bearer_token().unwrap_or_default().to_owned();

				Ok(OperationResult::ok("healthy").with_detail("token", token))
			},
		)]);
		let provider: Arc<dyn Provider> = Arc::new(provider);

		Ok(Some(provider))
	}))
}

/// Builder whose construction always fails with a configuration error.
pub fn broken_builder(provider: &'static str) -> Arc<dyn Builder> {
	Arc::new(BuilderFn::new(provider, |spec| {
		Err::<Option<Arc<dyn Provider>>, Error>(
			integration_registry::error::ConfigError::MissingOAuthConfig {
				provider: spec.provider_type.clone(),
			}
			.into(),
		)
	}))
}
