//! Declarative provider specs and the loaders that supply them.
//!
//! A [`ProviderSpec`] is the unit of configuration consumed by builders: it names the provider
//! type, declares how credentials are obtained ([`AuthKind`]), and, for OAuth-family providers,
//! carries the relying-party settings in an [`OAuthSpec`]. Specs normally come from a JSON file
//! via [`JsonFileLoader`] or are assembled in code and wrapped by [`StaticLoader`].

pub mod loader;

pub use loader::*;

// self
use crate::{
	_prelude::*,
	auth::{ProviderType, Secret},
	error::ConfigError,
};

/// How a provider obtains credentials.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuthKind {
	/// OAuth2 authorization-code grant.
	#[default]
	#[serde(rename = "oauth2")]
	OAuth2,
	/// OAuth2 authorization-code grant with an OIDC ID token.
	#[serde(rename = "oidc")]
	Oidc,
	/// Static API token entered by an operator.
	#[serde(rename = "api_token")]
	ApiToken,
	/// Metadata form without a bearer credential.
	#[serde(rename = "metadata")]
	Metadata,
}
impl AuthKind {
	/// Returns the stable label used in specs.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::OAuth2 => "oauth2",
			Self::Oidc => "oidc",
			Self::ApiToken => "api_token",
			Self::Metadata => "metadata",
		}
	}

	/// Returns `true` for kinds that run an interactive OAuth handshake.
	pub const fn is_oauth(self) -> bool {
		matches!(self, Self::OAuth2 | Self::Oidc)
	}
}
impl Display for AuthKind {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Preferred client authentication modes for token endpoint calls.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientAuthMethod {
	#[default]
	/// HTTP Basic with `client_id`/`client_secret`.
	ClientSecretBasic,
	/// Form POST body parameters for `client_id`/`client_secret`.
	ClientSecretPost,
	/// Public clients that prove possession via PKCE.
	NoneWithPkce,
}

/// Declarative description of one provider instance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProviderSpec {
	/// Provider type; must match a registered builder.
	pub provider_type: ProviderType,
	/// Human-readable name.
	#[serde(default)]
	pub display_name: String,
	/// Credential acquisition mode.
	#[serde(default)]
	pub auth_kind: AuthKind,
	/// Inactive specs are retained but never built.
	#[serde(default = "default_active")]
	pub active: bool,
	/// Relying-party settings for OAuth-family providers.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub oauth: Option<OAuthSpec>,
	/// JSON schema describing the metadata form, when the provider collects one.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub credentials_schema: Option<Value>,
	/// Override for the provider's API base URL.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub api_base_url: Option<Url>,
	/// Free-form labels carried through to callers.
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub labels: BTreeMap<String, String>,
}
impl ProviderSpec {
	/// Creates an active OAuth2 spec for `provider_type` without relying-party settings.
	pub fn new(provider_type: impl Into<ProviderType>) -> Self {
		Self {
			provider_type: provider_type.into(),
			display_name: String::new(),
			auth_kind: AuthKind::default(),
			active: true,
			oauth: None,
			credentials_schema: None,
			api_base_url: None,
			labels: BTreeMap::new(),
		}
	}

	/// Returns the provider type.
	pub fn provider_type(&self) -> &ProviderType {
		&self.provider_type
	}

	/// Sets the display name.
	pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
		self.display_name = display_name.into();

		self
	}

	/// Sets the auth kind.
	pub fn with_auth_kind(mut self, auth_kind: AuthKind) -> Self {
		self.auth_kind = auth_kind;

		self
	}

	/// Attaches relying-party settings.
	pub fn with_oauth(mut self, oauth: OAuthSpec) -> Self {
		self.oauth = Some(oauth);

		self
	}

	/// Attaches the metadata form schema.
	pub fn with_credentials_schema(mut self, schema: Value) -> Self {
		self.credentials_schema = Some(schema);

		self
	}

	/// Overrides the API base URL.
	pub fn with_api_base_url(mut self, url: Url) -> Self {
		self.api_base_url = Some(url);

		self
	}

	/// Marks the spec active or inactive.
	pub fn with_active(mut self, active: bool) -> Self {
		self.active = active;

		self
	}

	/// Adds a label.
	pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.labels.insert(key.into(), value.into());

		self
	}

	/// Returns `true` when the spec carries a non-empty metadata form schema.
	pub fn supports_metadata_form(&self) -> bool {
		match &self.credentials_schema {
			Some(Value::Object(schema)) => !schema.is_empty(),
			_ => false,
		}
	}

	/// Returns the API base URL override or parses `default`.
	pub fn api_base_url_or(&self, default: &str) -> Result<Url, ConfigError> {
		match &self.api_base_url {
			Some(url) => Ok(url.clone()),
			None => Url::parse(default).map_err(|e| ConfigError::InvalidSpec {
				provider: self.provider_type.clone(),
				reason: format!("default API base URL is invalid: {e}"),
			}),
		}
	}
}

fn default_active() -> bool {
	true
}

/// OAuth2/OIDC relying-party settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OAuthSpec {
	/// Client identifier issued by the provider.
	pub client_id: String,
	/// Client secret; omitted for public clients.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub client_secret: Option<Secret>,
	/// Authorization endpoint.
	pub auth_url: Url,
	/// Token endpoint.
	pub token_url: Url,
	/// Redirect URI registered with the provider.
	pub redirect_uri: Url,
	/// Default scopes requested during authorization.
	#[serde(default, deserialize_with = "deserialize_scopes")]
	pub scopes: Vec<String>,
	/// Adds a PKCE S256 challenge to authorization requests.
	#[serde(default)]
	pub use_pkce: bool,
	/// Extra authorization URL parameters, appended in key order.
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub auth_params: BTreeMap<String, String>,
	/// Extra token-exchange parameters.
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub token_params: BTreeMap<String, String>,
	/// Token endpoint client authentication.
	#[serde(default)]
	pub client_auth: ClientAuthMethod,
	/// Expected ID-token issuer; enables OIDC claim checks when set.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub issuer: Option<String>,
	/// OIDC userinfo endpoint.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub userinfo_url: Option<Url>,
	/// Timeout applied to token endpoint requests.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub http_timeout_secs: Option<u64>,
}
impl OAuthSpec {
	/// Creates confidential-client settings using HTTP Basic client authentication.
	pub fn new(client_id: impl Into<String>, auth_url: Url, token_url: Url, redirect_uri: Url) -> Self {
		Self {
			client_id: client_id.into(),
			client_secret: None,
			auth_url,
			token_url,
			redirect_uri,
			scopes: Vec::new(),
			use_pkce: false,
			auth_params: BTreeMap::new(),
			token_params: BTreeMap::new(),
			client_auth: ClientAuthMethod::default(),
			issuer: None,
			userinfo_url: None,
			http_timeout_secs: None,
		}
	}

	/// Sets the client secret.
	pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
		self.client_secret = Some(Secret::new(secret));

		self
	}

	/// Replaces the default scopes after normalizing them.
	pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: AsRef<str>,
	{
		self.scopes = normalize_scopes(scopes);

		self
	}

	/// Enables or disables PKCE.
	pub fn with_pkce(mut self, use_pkce: bool) -> Self {
		self.use_pkce = use_pkce;

		self
	}

	/// Adds an authorization URL parameter.
	pub fn with_auth_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.auth_params.insert(key.into(), value.into());

		self
	}

	/// Adds a token-exchange parameter.
	pub fn with_token_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.token_params.insert(key.into(), value.into());

		self
	}

	/// Sets the client authentication method.
	pub fn with_client_auth(mut self, method: ClientAuthMethod) -> Self {
		self.client_auth = method;

		self
	}

	/// Sets the expected ID-token issuer.
	pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
		self.issuer = Some(issuer.into());

		self
	}

	/// Sets the userinfo endpoint.
	pub fn with_userinfo_url(mut self, url: Url) -> Self {
		self.userinfo_url = Some(url);

		self
	}

	/// Sets the token endpoint timeout.
	pub fn with_http_timeout_secs(mut self, secs: u64) -> Self {
		self.http_timeout_secs = Some(secs);

		self
	}
}

/// Normalizes a scope list: trims entries, expands JSON-array strings, and drops blanks and
/// duplicates while preserving first-seen order.
pub fn normalize_scopes<I, S>(scopes: I) -> Vec<String>
where
	I: IntoIterator<Item = S>,
	S: AsRef<str>,
{
	let mut normalized = Vec::new();

	for raw in scopes {
		let trimmed = raw.as_ref().trim();
		let nested = if trimmed.starts_with('[') {
			serde_json::from_str::<Vec<String>>(trimmed).ok()
		} else {
			None
		};

		match nested {
			Some(nested) => nested.iter().for_each(|scope| push_scope(&mut normalized, scope.trim())),
			None => push_scope(&mut normalized, trimmed),
		}
	}

	normalized
}

fn push_scope(normalized: &mut Vec<String>, scope: &str) {
	if !scope.is_empty() && !normalized.iter().any(|existing| existing == scope) {
		normalized.push(scope.to_owned());
	}
}

fn deserialize_scopes<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
	D: serde::Deserializer<'de>,
{
	let raw = Vec::<String>::deserialize(deserializer)?;

	Ok(normalize_scopes(raw))
}
