//! Static API token integration.
//!
//! The token is collected through the metadata form and stored under the `apiToken`
//! provider-data key. There is no interactive authorization; minting checks the stored metadata
//! against the spec's `credentials_schema`, re-validates the token, and re-issues it.

// self
use crate::{
	_prelude::*,
	auth::{API_TOKEN_KEY, CredentialKind, CredentialPayload, CredentialSubject, ProviderType},
	config::{AuthKind, ProviderSpec},
	error::AuthFlowError,
	operation::{OperationDescriptor, bearer_health_operation, sanitize_operation_descriptors},
	provider::{
		AuthContext, AuthSession, Builder, BuilderFn, OperationProvider, Provider,
		ProviderCapabilities, ProviderFuture, ensure_auth_kind, validate_metadata,
	},
	providers::{api_http, shared},
};

/// Provider type served by [`builder`].
pub const API_TOKEN: &str = "api_token";

/// Provider backed by a long-lived API token.
#[derive(Debug)]
pub struct ApiTokenProvider {
	provider_type: ProviderType,
	credentials_schema: Option<Value>,
	operations: Vec<OperationDescriptor>,
}
impl ApiTokenProvider {
	/// Builds a provider from `spec`.
	///
	/// When the spec sets `api_base_url`, a bearer health check against it is published.
	pub fn new(spec: &ProviderSpec) -> Result<Self> {
		let operations = match &spec.api_base_url {
			Some(endpoint) => vec![bearer_health_operation(endpoint.clone(), api_http()?)],
			None => Vec::new(),
		};

		Ok(Self {
			provider_type: spec.provider_type.clone(),
			credentials_schema: spec
				.supports_metadata_form()
				.then(|| spec.credentials_schema.clone())
				.flatten(),
			operations: sanitize_operation_descriptors(&spec.provider_type, operations),
		})
	}
}
impl Provider for ApiTokenProvider {
	fn provider_type(&self) -> &ProviderType {
		&self.provider_type
	}

	fn capabilities(&self) -> ProviderCapabilities {
		ProviderCapabilities {
			supports_refresh_tokens: false,
			supports_client_pooling: false,
			supports_metadata_form: self.credentials_schema.is_some(),
		}
	}

	fn begin_auth(&self, _ctx: AuthContext) -> ProviderFuture<'_, Box<dyn AuthSession>> {
		let provider = self.provider_type.clone();

		Box::pin(async move { Err(AuthFlowError::BeginAuthNotSupported { provider }.into()) })
	}

	fn mint(&self, subject: CredentialSubject) -> ProviderFuture<'_, CredentialPayload> {
		Box::pin(async move {
			let credential = subject.credential;

			validate_metadata(
				&self.provider_type,
				self.credentials_schema.as_ref(),
				&credential.provider_data,
			)?;

			let token = credential
				.provider_data_str(API_TOKEN_KEY)
				.ok_or_else(|| AuthFlowError::TokenUnavailable { provider: self.provider_type.clone() })?
				.to_owned();
			let mut provider_data = credential.provider_data;

			provider_data.remove(API_TOKEN_KEY);

			Ok(CredentialPayload::builder(self.provider_type.clone())
				.kind(CredentialKind::ApiToken)
				.provider_data(provider_data)
				.api_token(token)
				.build()?)
		})
	}

	fn operation_provider(&self) -> Option<&dyn OperationProvider> {
		if self.operations.is_empty() { None } else { Some(self) }
	}
}
impl OperationProvider for ApiTokenProvider {
	fn operations(&self) -> Vec<OperationDescriptor> {
		self.operations.clone()
	}
}

/// Builder for the `api_token` provider.
pub fn builder() -> Arc<dyn Builder> {
	Arc::new(BuilderFn::new(API_TOKEN, |spec| {
		ensure_auth_kind(spec, &[AuthKind::ApiToken])?;

		Ok(shared(ApiTokenProvider::new(spec)?))
	}))
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn spec() -> ProviderSpec {
		ProviderSpec::new(API_TOKEN).with_auth_kind(AuthKind::ApiToken)
	}

	#[tokio::test]
	async fn begin_auth_is_not_supported() {
		let provider = ApiTokenProvider::new(&spec()).expect("Provider should build.");
		let Err(err) = provider.begin_auth(AuthContext::default()).await else {
			panic!("Begin auth should fail.")
		};

		assert!(matches!(err, Error::Auth(AuthFlowError::BeginAuthNotSupported { .. })));
	}

	#[tokio::test]
	async fn mint_reissues_trimmed_token_with_metadata() {
		let provider = ApiTokenProvider::new(&spec()).expect("Provider should build.");
		let stored = CredentialPayload::builder(API_TOKEN)
			.api_token("  tok-1  ")
			.provider_data_entry("tenant", "t-9")
			.build()
			.expect("Payload should build.");
		let minted =
			provider.mint(CredentialSubject::new(stored)).await.expect("Mint should succeed.");

		assert_eq!(minted.kind, CredentialKind::ApiToken);
		assert_eq!(minted.provider_data_str(API_TOKEN_KEY), Some("tok-1"));
		assert_eq!(minted.provider_data_str("tenant"), Some("t-9"));
		assert_eq!(minted.bearer_token(), Some("tok-1"));
	}

	#[tokio::test]
	async fn mint_rejects_blank_token() {
		let provider = ApiTokenProvider::new(&spec()).expect("Provider should build.");
		let stored = CredentialPayload::builder(API_TOKEN)
			.api_token("   ")
			.build()
			.expect("Payload should build.");
		let err = provider
			.mint(CredentialSubject::new(stored))
			.await
			.expect_err("Mint should fail.");

		assert!(matches!(err, Error::Auth(AuthFlowError::TokenUnavailable { .. })));
	}

	#[tokio::test]
	async fn mint_enforces_the_credentials_schema() {
		let spec = spec().with_credentials_schema(serde_json::json!({
			"type": "object",
			"required": ["apiToken", "tenant"],
			"properties": {
				"apiToken": { "type": "string", "pattern": "^\\s*tok-" },
				"tenant": { "type": "string", "minLength": 1 }
			}
		}));
		let provider = ApiTokenProvider::new(&spec).expect("Provider should build.");

		assert!(provider.capabilities().supports_metadata_form);

		let cases = [
			(CredentialPayload::builder(API_TOKEN).api_token("tok-1"), "$.tenant"),
			(
				CredentialPayload::builder(API_TOKEN).api_token("key-1").provider_data_entry("tenant", "t-9"),
				"$.apiToken",
			),
		];

		for (stored, expected) in cases {
			let stored = stored.build().expect("Payload should build.");
			let err = provider
				.mint(CredentialSubject::new(stored))
				.await
				.expect_err("Metadata should be rejected.");

			match err {
				Error::Auth(AuthFlowError::InvalidMetadata { path, .. }) => assert_eq!(path, expected),
				other => panic!("Unexpected error: {other:?}."),
			}
		}

		let stored = CredentialPayload::builder(API_TOKEN)
			.api_token(" tok-1 ")
			.provider_data_entry("tenant", "t-9")
			.build()
			.expect("Payload should build.");
		let minted =
			provider.mint(CredentialSubject::new(stored)).await.expect("Mint should succeed.");

		assert_eq!(minted.bearer_token(), Some("tok-1"));
	}

	#[tokio::test]
	async fn builder_checks_auth_kind_and_publishes_health() {
		assert!(builder().build(&ProviderSpec::new(API_TOKEN)).await.is_err());

		let spec = spec().with_api_base_url(
			Url::parse("https://api.example/health").expect("Fixture URL should parse."),
		);
		let provider = builder()
			.build(&spec)
			.await
			.expect("Build should succeed.")
			.expect("Provider should exist.");

		assert_eq!(
			provider.operation_provider().expect("Health should be published.").operations().len(),
			1
		);
		assert!(!provider.capabilities().supports_refresh_tokens);
	}
}
