//! Identity-platform integrations that only need a bearer health check.

// self
use crate::{
	_prelude::*,
	auth::ProviderType,
	config::{AuthKind, ProviderSpec},
	error::ConfigError,
	operation::bearer_health_operation,
	provider::{Builder, BuilderFn, OAuthProvider, ensure_auth_kind},
	providers::{api_endpoint, api_http, shared},
};

/// Microsoft Entra ID provider type.
pub const AZURE_ENTRA_ID: &str = "azure_entra_id";
/// Vercel provider type.
pub const VERCEL: &str = "vercel";
/// Generic OpenID Connect provider type.
pub const OIDC_GENERIC: &str = "oidc_generic";

const GRAPH_API: &str = "https://graph.microsoft.com/v1.0";
const VERCEL_API: &str = "https://api.vercel.com";

/// Builder for Microsoft Entra ID; health calls Graph `/me`.
pub fn azure_entra_id_builder() -> Arc<dyn Builder> {
	identity_builder(AZURE_ENTRA_ID, &[AuthKind::Oidc, AuthKind::OAuth2], |spec| {
		api_endpoint(spec, GRAPH_API, "me")
	})
}

/// Builder for Vercel; health calls `/v2/user`.
pub fn vercel_builder() -> Arc<dyn Builder> {
	identity_builder(VERCEL, &[AuthKind::OAuth2], |spec| api_endpoint(spec, VERCEL_API, "v2/user"))
}

/// Builder for any OpenID Connect provider; health calls the spec's `userinfo_url`.
pub fn oidc_generic_builder() -> Arc<dyn Builder> {
	identity_builder(OIDC_GENERIC, &[AuthKind::Oidc], |spec| {
		spec.oauth.as_ref().and_then(|oauth| oauth.userinfo_url.clone()).ok_or_else(|| {
			ConfigError::InvalidSpec {
				provider: spec.provider_type.clone(),
				reason: "`oauth.userinfo_url` is required".into(),
			}
		})
	})
}

fn identity_builder<F>(
	provider_type: &'static str,
	auth_kinds: &'static [AuthKind],
	health_endpoint: F,
) -> Arc<dyn Builder>
where
	F: 'static + Fn(&ProviderSpec) -> Result<Url, ConfigError> + Send + Sync,
{
	Arc::new(BuilderFn::new(ProviderType::new(provider_type), move |spec| {
		ensure_auth_kind(spec, auth_kinds)?;

		let provider = OAuthProvider::new(spec)?
			.with_operations(vec![bearer_health_operation(health_endpoint(spec)?, api_http()?)]);

		Ok(shared(provider))
	}))
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{_preludet::*, provider::Provider};

	#[tokio::test]
	async fn oidc_generic_requires_userinfo_url() {
		let spec = oauth_spec(OIDC_GENERIC, "https://login.example").with_auth_kind(AuthKind::Oidc);
		let Err(err) = oidc_generic_builder().build(&spec).await else {
			panic!("Build should fail.")
		};

		assert!(matches!(err, Error::Config(ConfigError::InvalidSpec { .. })));

		let mut spec = spec;

		if let Some(oauth) = spec.oauth.as_mut() {
			oauth.userinfo_url =
				Some(Url::parse("https://login.example/userinfo").expect("Fixture URL should parse."));
		}

		let provider = oidc_generic_builder()
			.build(&spec)
			.await
			.expect("Build should succeed.")
			.expect("Provider should exist.");
		let operations = provider.operation_provider().expect("Operations should be published.");

		assert_eq!(operations.operations()[0].name, "health.default");
		assert!(provider.client_provider().is_none());
	}

	#[tokio::test]
	async fn azure_accepts_oauth2_and_oidc_but_vercel_rejects_oidc() {
		for kind in [AuthKind::OAuth2, AuthKind::Oidc] {
			let spec = oauth_spec(AZURE_ENTRA_ID, "https://login.microsoftonline.com").with_auth_kind(kind);

			assert!(azure_entra_id_builder().build(&spec).await.is_ok());
		}

		let spec = oauth_spec(VERCEL, "https://vercel.com").with_auth_kind(AuthKind::Oidc);

		assert!(vercel_builder().build(&spec).await.is_err());
	}
}
