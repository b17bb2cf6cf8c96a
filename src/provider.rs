//! Uniform provider contract plus the builders that construct providers from specs.
//!
//! Every integration implements [`Provider`]: it begins interactive authorization (returning an
//! [`AuthSession`]) and mints fresh credentials from stored ones. Providers may additionally
//! publish pooled clients ([`ClientProvider`]) and typed operations ([`OperationProvider`]);
//! the registry asks for those capabilities through [`Provider::client_provider`] and
//! [`Provider::operation_provider`].

pub mod builder;
pub mod oauth;

pub use builder::*;
pub use oauth::*;

// self
use crate::{
	_prelude::*,
	auth::{CredentialPayload, CredentialSubject, ProviderType},
	error::{AuthFlowError, OperationError},
	operation::{ClientDescriptor, OperationDescriptor, validate_config},
};

/// Boxed future returned by provider contract methods.
pub type ProviderFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + 'a + Send>>;

/// Capability flags advertised by a provider.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderCapabilities {
	/// Provider can refresh expired tokens without user interaction.
	pub supports_refresh_tokens: bool,
	/// Provider publishes pooled client descriptors.
	pub supports_client_pooling: bool,
	/// Provider collects credentials through a metadata form.
	pub supports_metadata_form: bool,
}

/// Caller input for [`Provider::begin_auth`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AuthContext {
	/// Scopes overriding the spec defaults; empty keeps the defaults.
	pub scopes: Vec<String>,
	/// Caller-chosen state; a random one is generated when absent or blank.
	pub state: Option<String>,
	/// Redirect URI overriding the spec value for this session.
	pub redirect_uri: Option<Url>,
}
impl AuthContext {
	/// Requests the provided scopes.
	pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.scopes = scopes.into_iter().map(Into::into).collect();

		self
	}

	/// Uses a caller-chosen state value.
	pub fn with_state(mut self, state: impl Into<String>) -> Self {
		self.state = Some(state.into());

		self
	}

	/// Overrides the redirect URI.
	pub fn with_redirect_uri(mut self, redirect_uri: Url) -> Self {
		self.redirect_uri = Some(redirect_uri);

		self
	}
}

/// In-progress interactive authorization.
///
/// The caller redirects the user to [`AuthSession::auth_url`], checks the returned state with
/// [`AuthSession::validate_state`], then calls [`AuthSession::finish`] exactly once.
pub trait AuthSession: Send + Sync + Debug {
	/// Provider that created the session.
	fn provider_type(&self) -> &ProviderType;

	/// Opaque state embedded in the authorization URL.
	fn state(&self) -> &str;

	/// Authorization URL to redirect the user to.
	fn auth_url(&self) -> &Url;

	/// Exchanges the callback code for a credential, consuming the session.
	fn finish(self: Box<Self>, code: String) -> ProviderFuture<'static, CredentialPayload>;

	/// Compares the callback state with the session state.
	fn validate_state(&self, returned: &str) -> Result<(), AuthFlowError> {
		if returned == self.state() { Ok(()) } else { Err(AuthFlowError::StateMismatch) }
	}
}

/// Uniform contract every integration provider implements.
pub trait Provider: Send + Sync {
	/// Provider type served by this instance.
	fn provider_type(&self) -> &ProviderType;

	/// Capability flags.
	fn capabilities(&self) -> ProviderCapabilities;

	/// Starts interactive authorization.
	fn begin_auth(&self, ctx: AuthContext) -> ProviderFuture<'_, Box<dyn AuthSession>>;

	/// Produces a fresh credential from a stored one.
	fn mint(&self, subject: CredentialSubject) -> ProviderFuture<'_, CredentialPayload>;

	/// Returns the client-pooling capability, if implemented.
	fn client_provider(&self) -> Option<&dyn ClientProvider> {
		None
	}

	/// Returns the operation capability, if implemented.
	fn operation_provider(&self) -> Option<&dyn OperationProvider> {
		None
	}
}

/// Optional capability: pooled client descriptors.
pub trait ClientProvider: Send + Sync {
	/// Client descriptors published by the provider.
	fn client_descriptors(&self) -> Vec<ClientDescriptor>;
}

/// Optional capability: typed operations.
pub trait OperationProvider: Send + Sync {
	/// Operation descriptors published by the provider.
	fn operations(&self) -> Vec<OperationDescriptor>;
}

/// Checks stored provider metadata against a spec's `credentials_schema`.
///
/// A missing schema accepts any metadata.
pub fn validate_metadata(
	provider: &ProviderType,
	schema: Option<&Value>,
	metadata: &Map<String, Value>,
) -> Result<(), AuthFlowError> {
	let Some(schema) = schema else { return Ok(()) };

	validate_config(schema, metadata).map_err(|e| match e {
		OperationError::InvalidConfig { path, message } =>
			AuthFlowError::InvalidMetadata { provider: provider.clone(), path, message },
		other => AuthFlowError::InvalidMetadata {
			provider: provider.clone(),
			path: "$".into(),
			message: other.to_string(),
		},
	})
}
