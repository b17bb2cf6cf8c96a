//! Registry-level error types shared across providers, flows, and operation dispatch.

// self
use crate::{
	_prelude::*,
	auth::{ClientName, CredentialBuildError, OperationName, ProviderType},
	config::{AuthKind, LoaderError},
	operation::OperationResult,
};

/// Registry-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Boxed, thread-safe error used for opaque upstream failures.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// OAuth/OIDC handshake or token maintenance failure.
	#[error(transparent)]
	Auth(#[from] AuthFlowError),
	/// Registry lookup or registration failure.
	#[error(transparent)]
	Registry(#[from] RegistryError),
	/// Operation lookup, validation, or execution failure.
	#[error(transparent)]
	Operation(#[from] OperationError),
	/// Credential payload could not be assembled.
	#[error(transparent)]
	Credential(#[from] CredentialBuildError),
	/// Provider specs could not be loaded.
	#[error(transparent)]
	Loader(#[from] LoaderError),
}
impl Error {
	/// Returns the partial result attached to a failed operation, if any.
	pub fn operation_result(&self) -> Option<&OperationResult> {
		match self {
			Self::Operation(OperationError::Failed { result, .. }) => Some(&**result),
			_ => None,
		}
	}

	/// Returns the OAuth error class for code exchange, refresh, and token exchange failures.
	pub fn error_class(&self) -> Option<ErrorClass> {
		match self {
			Self::Auth(
				AuthFlowError::CodeExchange { class, .. }
				| AuthFlowError::TokenRefresh { class, .. }
				| AuthFlowError::TokenExchange { class, .. },
			) => Some(*class),
			_ => None,
		}
	}
}

/// Configuration and validation failures raised while building providers.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// OAuth-family provider spec is missing its `oauth` block.
	#[error("Provider `{provider}` requires an OAuth configuration block.")]
	MissingOAuthConfig {
		/// Offending provider type.
		provider: ProviderType,
	},
	/// OAuth/OIDC relying party could not be constructed from the spec.
	#[error("Relying party for `{provider}` could not be initialized: {reason}.")]
	RelyingPartyInit {
		/// Offending provider type.
		provider: ProviderType,
		/// Human-readable cause.
		reason: String,
	},
	/// Spec declares an auth kind the builder cannot honor.
	#[error("Provider `{provider}` expects auth kind {expected} but the spec declares {found}.")]
	AuthKindMismatch {
		/// Offending provider type.
		provider: ProviderType,
		/// Auth kind supported by the builder.
		expected: AuthKind,
		/// Auth kind declared by the spec.
		found: AuthKind,
	},
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// Spec carries an invalid field value.
	#[error("Provider spec `{provider}` is invalid: {reason}.")]
	InvalidSpec {
		/// Offending provider type.
		provider: ProviderType,
		/// Human-readable cause.
		reason: String,
	},
	/// Two builders claim the same provider type.
	#[error("More than one builder is registered for `{provider}`.")]
	DuplicateBuilder {
		/// Duplicated provider type.
		provider: ProviderType,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Classification of OAuth token endpoint failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorClass {
	/// Grant (authorization code or refresh token) is invalid, expired, or revoked.
	InvalidGrant,
	/// Client authentication failed.
	InvalidClient,
	/// Requested scopes exceed what the provider allows.
	InsufficientScope,
	/// Temporary or transport-level failure; retry with backoff.
	Transient,
}
impl ErrorClass {
	/// Returns a stable label for logs and metrics.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::InvalidGrant => "invalid_grant",
			Self::InvalidClient => "invalid_client",
			Self::InsufficientScope => "insufficient_scope",
			Self::Transient => "transient",
		}
	}
}
impl Display for ErrorClass {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Failures raised while beginning, finishing, or refreshing an authorization.
#[derive(Debug, ThisError)]
pub enum AuthFlowError {
	/// Secure randomness for state or PKCE material was unavailable.
	#[error("Secure random state could not be generated.")]
	StateGeneration {
		/// Underlying RNG failure.
		#[source]
		source: BoxError,
	},
	/// Authorization code exchange was rejected or failed in transit.
	#[error("Authorization code exchange for `{provider}` failed ({class}): {message}.")]
	CodeExchange {
		/// Provider performing the exchange.
		provider: ProviderType,
		/// Failure classification.
		class: ErrorClass,
		/// Provider- or transport-supplied message.
		message: String,
		/// Underlying transport or parse failure.
		#[source]
		source: Option<BoxError>,
	},
	/// Refresh token grant was rejected or failed in transit.
	#[error("Token refresh for `{provider}` failed ({class}): {message}.")]
	TokenRefresh {
		/// Provider performing the refresh.
		provider: ProviderType,
		/// Failure classification.
		class: ErrorClass,
		/// Provider- or transport-supplied message.
		message: String,
		/// Underlying transport or parse failure.
		#[source]
		source: Option<BoxError>,
	},
	/// Token exchange against a security token service failed.
	#[error("Token exchange for `{provider}` failed ({class}): {message}.")]
	TokenExchange {
		/// Provider performing the exchange.
		provider: ProviderType,
		/// Failure classification.
		class: ErrorClass,
		/// Provider- or transport-supplied message.
		message: String,
		/// Underlying transport or parse failure.
		#[source]
		source: Option<BoxError>,
	},
	/// Stored provider metadata does not satisfy the credentials schema.
	#[error("Stored metadata for `{provider}` is invalid at `{path}`: {message}.")]
	InvalidMetadata {
		/// Provider the metadata belongs to.
		provider: ProviderType,
		/// Location of the offending value.
		path: String,
		/// Human-readable cause.
		message: String,
	},
	/// Stored credential does not carry a usable token.
	#[error("Credential for `{provider}` does not carry a usable token.")]
	TokenUnavailable {
		/// Provider the credential belongs to.
		provider: ProviderType,
	},
	/// Provider does not support interactive authorization.
	#[error("Provider `{provider}` does not support interactive authorization.")]
	BeginAuthNotSupported {
		/// Provider that rejected the request.
		provider: ProviderType,
	},
	/// ID token could not be decoded or failed claim checks.
	#[error("ID token from `{provider}` is invalid: {reason}.")]
	InvalidIdToken {
		/// Provider that issued the token.
		provider: ProviderType,
		/// Human-readable cause.
		reason: String,
	},
	/// Callback state does not match the session.
	#[error("Callback state does not match the authorization session.")]
	StateMismatch,
}

/// Registry lookup and registration failures.
#[derive(Debug, ThisError)]
pub enum RegistryError {
	/// No live provider is registered under the requested type.
	#[error("Provider `{provider}` is not registered.")]
	ProviderNotFound {
		/// Requested provider type.
		provider: ProviderType,
	},
	/// Builder type does not match the spec type during upsert.
	#[error("Builder for `{found}` cannot build spec `{expected}`.")]
	BuilderMismatch {
		/// Provider type declared by the spec.
		expected: ProviderType,
		/// Provider type served by the builder.
		found: ProviderType,
	},
	/// Builder failed to construct the provider.
	#[error("Provider `{provider}` could not be built.")]
	ProviderBuildFailed {
		/// Provider type being built.
		provider: ProviderType,
		/// Builder failure.
		#[source]
		source: Box<Error>,
	},
	/// Builder succeeded without producing a provider.
	#[error("Builder for `{provider}` produced no provider.")]
	ProviderNil {
		/// Provider type being built.
		provider: ProviderType,
	},
	/// Provider type is empty.
	#[error("Provider type is required.")]
	ProviderTypeRequired,
	/// Registry handle no longer points at a live registry.
	#[error("Integration registry is unavailable.")]
	RegistryUnavailable,
}

/// Operation lookup, validation, and execution failures.
#[derive(Debug, ThisError)]
pub enum OperationError {
	/// Operation is not published by the provider.
	#[error("Operation `{operation}` is not registered for `{provider}`.")]
	NotFound {
		/// Provider type.
		provider: ProviderType,
		/// Requested operation name.
		operation: OperationName,
	},
	/// Operation references a client the provider does not publish.
	#[error("Client `{client}` is not registered for `{provider}`.")]
	ClientNotFound {
		/// Provider type.
		provider: ProviderType,
		/// Referenced client name.
		client: ClientName,
	},
	/// Operation needs a client of a specific type and did not receive one.
	#[error("Operation requires a `{expected}` client.")]
	ClientRequired {
		/// Expected client type name.
		expected: &'static str,
	},
	/// Client construction failed.
	#[error("Client `{client}` for `{provider}` could not be built.")]
	ClientBuild {
		/// Provider type.
		provider: ProviderType,
		/// Client name.
		client: ClientName,
		/// Builder failure.
		#[source]
		source: Box<Error>,
	},
	/// Operation config does not satisfy its schema or target type.
	#[error("Operation config is invalid at `{path}`: {message}.")]
	InvalidConfig {
		/// JSON path of the offending value.
		path: String,
		/// Human-readable cause.
		message: String,
	},
	/// Operation ran and failed; the partial result is preserved.
	#[error("Operation failed: {}.", .result.summary)]
	Failed {
		/// Result reported alongside the failure.
		result: Box<OperationResult>,
		/// Underlying failure.
		#[source]
		source: BoxError,
	},
	/// Upstream HTTP request failed.
	#[error("Upstream request failed.")]
	Request(#[from] ReqwestError),
}
