//! Generic OAuth2/OIDC provider reused by most concrete integrations.

mod claims;
pub(crate) mod exchange;
mod session;

pub use session::{OAuthSession, PkceCodeChallengeMethod, STATE_BYTES, generate_state};

// self
use crate::{
	_prelude::*,
	auth::{CredentialKind, CredentialPayload, CredentialSubject, ProviderType},
	config::{AuthKind, OAuthSpec, ProviderSpec, normalize_scopes},
	error::{AuthFlowError, ConfigError},
	http::HttpClient,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	operation::{self, ClientDescriptor, OperationDescriptor},
	provider::{
		AuthContext, AuthSession, ClientProvider, OperationProvider, Provider,
		ProviderCapabilities, ProviderFuture, oauth::exchange::RelyingParty,
	},
};

/// [`Provider`] backed by an OAuth2/OIDC relying party.
///
/// Concrete integrations instantiate it with their own client and operation descriptors.
pub struct OAuthProvider {
	provider_type: ProviderType,
	relying_party: Arc<RelyingParty>,
	supports_metadata_form: bool,
	clients: Vec<ClientDescriptor>,
	operations: Vec<OperationDescriptor>,
}
impl OAuthProvider {
	/// Builds a provider from `spec` with a token endpoint client derived from the spec.
	pub fn new(spec: &ProviderSpec) -> Result<Self, ConfigError> {
		let oauth = Self::oauth_block(spec)?;

		Self::with_http_client(spec, HttpClient::for_oauth(oauth)?)
	}

	/// Builds a provider from `spec` using a caller-supplied token endpoint client.
	pub fn with_http_client(spec: &ProviderSpec, http: HttpClient) -> Result<Self, ConfigError> {
		let oauth = Self::oauth_block(spec)?.clone();
		let relying_party = RelyingParty::new(
			spec.provider_type.clone(),
			oauth,
			spec.auth_kind == AuthKind::Oidc,
			http,
		)?;

		Ok(Self {
			provider_type: spec.provider_type.clone(),
			relying_party: Arc::new(relying_party),
			supports_metadata_form: spec.supports_metadata_form(),
			clients: Vec::new(),
			operations: Vec::new(),
		})
	}

	/// Publishes client descriptors; invalid entries are dropped.
	pub fn with_clients(mut self, clients: Vec<ClientDescriptor>) -> Self {
		self.clients = operation::sanitize_client_descriptors(&self.provider_type, clients);

		self
	}

	/// Publishes operation descriptors; invalid entries are dropped.
	pub fn with_operations(mut self, operations: Vec<OperationDescriptor>) -> Self {
		self.operations = operation::sanitize_operation_descriptors(&self.provider_type, operations);

		self
	}

	/// Relying-party settings in effect.
	pub fn oauth(&self) -> &OAuthSpec {
		self.relying_party.spec()
	}

	fn oauth_block(spec: &ProviderSpec) -> Result<&OAuthSpec, ConfigError> {
		spec.oauth
			.as_ref()
			.ok_or_else(|| ConfigError::MissingOAuthConfig { provider: spec.provider_type.clone() })
	}
}
impl Provider for OAuthProvider {
	fn provider_type(&self) -> &ProviderType {
		&self.provider_type
	}

	fn capabilities(&self) -> ProviderCapabilities {
		ProviderCapabilities {
			supports_refresh_tokens: true,
			supports_client_pooling: !self.clients.is_empty(),
			supports_metadata_form: self.supports_metadata_form,
		}
	}

	fn begin_auth(&self, ctx: AuthContext) -> ProviderFuture<'_, Box<dyn AuthSession>> {
		let span = FlowSpan::new(FlowKind::BeginAuth, "begin_auth", &self.provider_type);

		Box::pin(span.instrument(async move {
			obs::record_flow_outcome(FlowKind::BeginAuth, FlowOutcome::Attempt);

			let AuthContext { scopes, state, redirect_uri } = ctx;
			let scopes = if scopes.is_empty() {
				self.relying_party.spec().scopes.clone()
			} else {
				normalize_scopes(scopes)
			};
			let redirect_uri =
				redirect_uri.unwrap_or_else(|| self.relying_party.spec().redirect_uri.clone());
			let result =
				OAuthSession::begin(Arc::clone(&self.relying_party), scopes, state, redirect_uri)
					.map(|session| Box::new(session) as Box<dyn AuthSession>)
					.map_err(Error::from);

			obs::record_flow_result(FlowKind::BeginAuth, &result);

			result
		}))
	}

	fn mint(&self, subject: CredentialSubject) -> ProviderFuture<'_, CredentialPayload> {
		let span = FlowSpan::new(FlowKind::Mint, "mint", &self.provider_type);

		Box::pin(span.instrument(async move {
			obs::record_flow_outcome(FlowKind::Mint, FlowOutcome::Attempt);

			let result = self.mint_inner(subject).await;

			obs::record_flow_result(FlowKind::Mint, &result);

			result
		}))
	}

	fn client_provider(&self) -> Option<&dyn ClientProvider> {
		if self.clients.is_empty() { None } else { Some(self) }
	}

	fn operation_provider(&self) -> Option<&dyn OperationProvider> {
		if self.operations.is_empty() { None } else { Some(self) }
	}
}
impl OAuthProvider {
	async fn mint_inner(&self, subject: CredentialSubject) -> Result<CredentialPayload> {
		let CredentialSubject { credential, .. } = subject;
		let token = credential
			.token
			.clone()
			.filter(|token| !token.access_token.is_blank() || token.usable_refresh_token().is_some())
			.ok_or_else(|| AuthFlowError::TokenUnavailable { provider: self.provider_type.clone() })?;
		let fresh = self.relying_party.token_source(token).await?;
		let mut builder = CredentialPayload::builder(self.provider_type.clone()).oauth_token(fresh);

		if let Some(claims) = credential.claims {
			builder = builder.claims(claims).kind(CredentialKind::Oidc);
		} else {
			builder = builder.kind(CredentialKind::OAuthToken);
		}

		Ok(builder.build()?)
	}
}
impl ClientProvider for OAuthProvider {
	fn client_descriptors(&self) -> Vec<ClientDescriptor> {
		self.clients.clone()
	}
}
impl OperationProvider for OAuthProvider {
	fn operations(&self) -> Vec<OperationDescriptor> {
		self.operations.clone()
	}
}
impl Debug for OAuthProvider {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("OAuthProvider")
			.field("provider_type", &self.provider_type)
			.field("client_id", &self.relying_party.spec().client_id)
			.field("clients", &self.clients.len())
			.field("operations", &self.operations.len())
			.finish()
	}
}
