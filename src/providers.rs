//! Concrete integrations and the default builder catalog.
//!
//! Every builder checks the spec's auth kind, resolves its API root (honoring
//! [`ProviderSpec::api_base_url`]), and publishes its clients and operations through the shared
//! [`OAuthProvider`](crate::provider::OAuthProvider) or its own [`Provider`] implementation.

pub mod api_token;
pub mod gcp_scc;
pub mod github;
pub mod identity;
pub mod slack;

// std
use std::time::Duration as StdDuration;
// self
use crate::{
	_prelude::*,
	config::ProviderSpec,
	error::ConfigError,
	http::HttpClient,
	provider::{Builder, Catalog, Provider},
};

/// Timeout applied to provider API calls made by operations.
pub const API_TIMEOUT: StdDuration = StdDuration::from_secs(10);

/// Catalog with every bundled builder.
pub fn default_catalog() -> Result<Catalog> {
	Catalog::new(default_builders())
}

/// Every bundled builder, in registration order.
pub fn default_builders() -> Vec<Arc<dyn Builder>> {
	vec![
		github::builder(),
		slack::builder(),
		identity::azure_entra_id_builder(),
		identity::vercel_builder(),
		identity::oidc_generic_builder(),
		api_token::builder(),
		gcp_scc::builder(),
	]
}

/// Joins `path` onto `base` without dropping any path segment already in `base`.
pub(crate) fn join_path(base: &Url, path: &str) -> String {
	format!("{}/{}", base.as_str().trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Resolves `path` under the spec's API root, falling back to `default_base`.
pub(crate) fn api_endpoint(
	spec: &ProviderSpec,
	default_base: &str,
	path: &str,
) -> Result<Url, ConfigError> {
	let base = spec.api_base_url_or(default_base)?;

	Url::parse(&join_path(&base, path)).map_err(|e| ConfigError::InvalidSpec {
		provider: spec.provider_type.clone(),
		reason: format!("API endpoint `{path}` is invalid: {e}"),
	})
}

/// HTTP client for provider API calls.
pub(crate) fn api_http() -> Result<HttpClient, ConfigError> {
	HttpClient::new(Some(API_TIMEOUT))
}

pub(crate) fn shared(provider: impl 'static + Provider) -> Option<Arc<dyn Provider>> {
	let provider: Arc<dyn Provider> = Arc::new(provider);

	Some(provider)
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn default_catalog_covers_bundled_types() {
		let catalog = default_catalog().expect("Default catalog should build.");
		let types = catalog.provider_types();
		let types = types.iter().map(|t| t.as_str()).collect::<Vec<_>>();

		assert_eq!(
			types,
			["github", "slack", "azure_entra_id", "vercel", "oidc_generic", "api_token", "gcp_scc"]
		);
	}

	#[test]
	fn join_path_keeps_base_segments() {
		let base = Url::parse("http://127.0.0.1:9000/api/").expect("Fixture URL should parse.");

		assert_eq!(join_path(&base, "/user"), "http://127.0.0.1:9000/api/user");
	}

	#[test]
	fn api_endpoint_prefers_spec_override() {
		let spec = ProviderSpec::new("acme")
			.with_api_base_url(Url::parse("http://localhost:1/v9").expect("Fixture URL should parse."));
		let endpoint = api_endpoint(&spec, "https://api.acme.example", "me").expect("Endpoint should parse.");

		assert_eq!(endpoint.as_str(), "http://localhost:1/v9/me");
		assert_eq!(
			api_endpoint(&ProviderSpec::new("acme"), "https://api.acme.example", "me")
				.expect("Endpoint should parse.")
				.as_str(),
			"https://api.acme.example/me"
		);
	}
}
