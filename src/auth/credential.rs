//! Credential payloads, OAuth token models, and the builder that assembles them.

// self
use crate::{
	_prelude::*,
	auth::{ProviderType, Secret},
};

/// Provider-data key holding a static API token.
pub const API_TOKEN_KEY: &str = "apiToken";

/// Kind of credential carried by a [`CredentialPayload`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CredentialKind {
	/// OAuth2 access/refresh token pair.
	#[serde(rename = "oauth_token")]
	OAuthToken,
	/// OAuth2 token plus verified OIDC identity claims.
	#[serde(rename = "oidc")]
	Oidc,
	/// Static API token supplied by an operator.
	#[serde(rename = "api_token")]
	ApiToken,
	/// Free-form provider metadata without a bearer token.
	#[serde(rename = "metadata")]
	Metadata,
}
impl CredentialKind {
	/// Returns the stable label used in serialized payloads.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::OAuthToken => "oauth_token",
			Self::Oidc => "oidc",
			Self::ApiToken => "api_token",
			Self::Metadata => "metadata",
		}
	}
}
impl Display for CredentialKind {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// OAuth2 token issued by a provider.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct OAuthToken {
	/// Access token secret; callers must avoid logging it.
	pub access_token: Secret,
	/// Refresh token secret, if the provider issued one.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub refresh_token: Option<Secret>,
	/// Token type reported by the provider (usually `Bearer`).
	#[serde(default = "default_token_type")]
	pub token_type: String,
	/// Absolute expiry; `None` means the token never expires.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub expires_at: Option<OffsetDateTime>,
}
impl OAuthToken {
	/// Tokens within this window of their expiry are treated as expired.
	pub const EXPIRY_DELTA: Duration = Duration::seconds(10);

	/// Creates a bearer token without refresh material or expiry.
	pub fn new(access_token: impl Into<String>) -> Self {
		Self {
			access_token: Secret::new(access_token),
			refresh_token: None,
			token_type: default_token_type(),
			expires_at: None,
		}
	}

	/// Attaches a refresh token.
	pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
		self.refresh_token = Some(Secret::new(refresh_token));

		self
	}

	/// Overrides the token type.
	pub fn with_token_type(mut self, token_type: impl Into<String>) -> Self {
		self.token_type = token_type.into();

		self
	}

	/// Sets the absolute expiry instant.
	pub fn with_expires_at(mut self, instant: OffsetDateTime) -> Self {
		self.expires_at = Some(instant);

		self
	}

	/// Returns `true` when the token is inside the expiry window at `instant`.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		match self.expires_at {
			Some(expires_at) => expires_at - Self::EXPIRY_DELTA <= instant,
			None => false,
		}
	}

	/// Returns `true` when the token carries an access token and is not expired at `instant`.
	pub fn is_valid_at(&self, instant: OffsetDateTime) -> bool {
		!self.access_token.is_blank() && !self.is_expired_at(instant)
	}

	/// Convenience helper that checks validity against the current UTC clock.
	pub fn is_valid(&self) -> bool {
		self.is_valid_at(OffsetDateTime::now_utc())
	}

	/// Returns the refresh token when it is present and non-blank.
	pub fn usable_refresh_token(&self) -> Option<&Secret> {
		self.refresh_token.as_ref().filter(|secret| !secret.is_blank())
	}
}
impl Debug for OAuthToken {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("OAuthToken")
			.field("access_token", &"<redacted>")
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.field("token_type", &self.token_type)
			.field("expires_at", &self.expires_at)
			.finish()
	}
}

fn default_token_type() -> String {
	"Bearer".into()
}

/// Identity claims decoded from an OIDC ID token.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OidcClaims {
	/// Issuer identifier.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub iss: Option<String>,
	/// Subject identifier.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub sub: Option<String>,
	/// Audiences; a single-string `aud` is normalized to one element.
	#[serde(default, deserialize_with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
	pub aud: Vec<String>,
	/// Email address, when released by the provider.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub email: Option<String>,
	/// Display name, when released by the provider.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	/// Expiry as seconds since the Unix epoch.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub exp: Option<i64>,
	/// Remaining provider-specific claims.
	#[serde(flatten)]
	pub extra: Map<String, Value>,
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
	D: serde::Deserializer<'de>,
{
	#[derive(Deserialize)]
	#[serde(untagged)]
	enum OneOrMany {
		One(String),
		Many(Vec<String>),
	}

	Ok(match OneOrMany::deserialize(deserializer)? {
		OneOrMany::One(value) => vec![value],
		OneOrMany::Many(values) => values,
	})
}

/// Errors produced by [`CredentialPayloadBuilder`].
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum CredentialBuildError {
	/// Provider type was empty.
	#[error("Credential payload requires a provider type.")]
	MissingProvider,
	/// Nothing was supplied to build a credential from.
	#[error("Credential payload for `{provider}` carries no token, claims, or provider data.")]
	Empty {
		/// Provider the payload was built for.
		provider: ProviderType,
	},
	/// Declared kind requires a token that was not supplied.
	#[error("Credential kind {kind} requires an OAuth token.")]
	TokenRequired {
		/// Declared credential kind.
		kind: CredentialKind,
	},
}

/// Provider-specific credential produced by authorization or minting.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CredentialPayload {
	/// Provider that issued or accepts the credential.
	pub provider: ProviderType,
	/// Credential kind.
	pub kind: CredentialKind,
	/// OAuth token, when the credential is token-based.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub token: Option<OAuthToken>,
	/// Verified identity claims, when an ID token was returned.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub claims: Option<OidcClaims>,
	/// Provider-specific data (API tokens, tenant IDs, metadata form values).
	#[serde(default, skip_serializing_if = "Map::is_empty")]
	pub provider_data: Map<String, Value>,
}
impl CredentialPayload {
	/// Returns a builder for `provider`.
	pub fn builder(provider: impl Into<ProviderType>) -> CredentialPayloadBuilder {
		CredentialPayloadBuilder::new(provider.into())
	}

	/// Returns a trimmed, non-empty string value stored under `key` in provider data.
	pub fn provider_data_str(&self, key: &str) -> Option<&str> {
		self.provider_data
			.get(key)
			.and_then(Value::as_str)
			.map(str::trim)
			.filter(|value| !value.is_empty())
	}

	/// Returns the bearer secret carried by the payload.
	///
	/// The OAuth access token wins; otherwise the `apiToken` provider-data entry is used.
	pub fn bearer_token(&self) -> Option<&str> {
		self.token
			.as_ref()
			.map(|token| token.access_token.expose().trim())
			.filter(|token| !token.is_empty())
			.or_else(|| self.provider_data_str(API_TOKEN_KEY))
	}
}

/// Builder for [`CredentialPayload`].
#[derive(Clone, Debug)]
pub struct CredentialPayloadBuilder {
	provider: ProviderType,
	kind: Option<CredentialKind>,
	token: Option<OAuthToken>,
	claims: Option<OidcClaims>,
	provider_data: Map<String, Value>,
}
impl CredentialPayloadBuilder {
	fn new(provider: ProviderType) -> Self {
		Self { provider, kind: None, token: None, claims: None, provider_data: Map::new() }
	}

	/// Declares the credential kind explicitly.
	pub fn kind(mut self, kind: CredentialKind) -> Self {
		self.kind = Some(kind);

		self
	}

	/// Provides the OAuth token.
	pub fn oauth_token(mut self, token: OAuthToken) -> Self {
		self.token = Some(token);

		self
	}

	/// Provides decoded identity claims.
	pub fn claims(mut self, claims: OidcClaims) -> Self {
		self.claims = Some(claims);

		self
	}

	/// Merges provider-specific data; later keys overwrite earlier ones.
	pub fn provider_data(mut self, data: Map<String, Value>) -> Self {
		self.provider_data.extend(data);

		self
	}

	/// Stores a single provider-data entry.
	pub fn provider_data_entry(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
		self.provider_data.insert(key.into(), value.into());

		self
	}

	/// Stores a static API token under the `apiToken` provider-data key.
	pub fn api_token(self, token: impl Into<String>) -> Self {
		self.provider_data_entry(API_TOKEN_KEY, token.into())
	}

	/// Consumes the builder and produces a [`CredentialPayload`].
	///
	/// When no kind is declared it is inferred: claims imply OIDC, a token implies OAuth, an
	/// `apiToken` entry implies an API token, and anything else is metadata.
	pub fn build(self) -> Result<CredentialPayload, CredentialBuildError> {
		if self.provider.is_blank() {
			return Err(CredentialBuildError::MissingProvider);
		}
		if self.token.is_none() && self.claims.is_none() && self.provider_data.is_empty() {
			return Err(CredentialBuildError::Empty { provider: self.provider });
		}

		let kind = match self.kind {
			Some(kind) => kind,
			None if self.claims.is_some() && self.token.is_some() => CredentialKind::Oidc,
			None if self.token.is_some() => CredentialKind::OAuthToken,
			None if self.provider_data.contains_key(API_TOKEN_KEY) => CredentialKind::ApiToken,
			None => CredentialKind::Metadata,
		};

		if matches!(kind, CredentialKind::OAuthToken | CredentialKind::Oidc) && self.token.is_none()
		{
			return Err(CredentialBuildError::TokenRequired { kind });
		}

		Ok(CredentialPayload {
			provider: self.provider,
			kind,
			token: self.token,
			claims: self.claims,
			provider_data: self.provider_data,
		})
	}
}

/// Stored credential handed to [`Provider::mint`](crate::provider::Provider::mint).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CredentialSubject {
	/// Provider the credential belongs to.
	pub provider: ProviderType,
	/// Previously persisted credential.
	pub credential: CredentialPayload,
	/// Caller-defined attributes (org, integration, installation identifiers).
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub attributes: BTreeMap<String, String>,
}
impl CredentialSubject {
	/// Creates a subject for `credential` keyed by its own provider.
	pub fn new(credential: CredentialPayload) -> Self {
		Self { provider: credential.provider.clone(), credential, attributes: BTreeMap::new() }
	}

	/// Adds a caller attribute.
	pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.attributes.insert(key.into(), value.into());

		self
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros::datetime;
	// self
	use super::*;

	#[test]
	fn token_validity_honors_expiry_delta() {
		let now = datetime!(2025-01-01 00:00 UTC);
		let token = OAuthToken::new("access").with_expires_at(now + Duration::seconds(30));

		assert!(token.is_valid_at(now));
		assert!(token.is_valid_at(now + Duration::seconds(19)));
		assert!(!token.is_valid_at(now + Duration::seconds(20)));
		assert!(OAuthToken::new("access").is_valid_at(now + Duration::days(365)));
		assert!(!OAuthToken::new(" ").is_valid_at(now));
	}

	#[test]
	fn token_debug_redacts_secrets() {
		let token = OAuthToken::new("access-secret").with_refresh_token("refresh-secret");
		let rendered = format!("{token:?}");

		assert!(!rendered.contains("access-secret"));
		assert!(!rendered.contains("refresh-secret"));
	}

	#[test]
	fn builder_infers_kind() {
		let oauth = CredentialPayload::builder("github")
			.oauth_token(OAuthToken::new("gho_1"))
			.build()
			.expect("OAuth payload should build.");

		assert_eq!(oauth.kind, CredentialKind::OAuthToken);

		let oidc = CredentialPayload::builder("oidc_generic")
			.oauth_token(OAuthToken::new("at"))
			.claims(OidcClaims { sub: Some("user-1".into()), ..Default::default() })
			.build()
			.expect("OIDC payload should build.");

		assert_eq!(oidc.kind, CredentialKind::Oidc);

		let api = CredentialPayload::builder("api_token")
			.api_token("tok")
			.build()
			.expect("API token payload should build.");

		assert_eq!(api.kind, CredentialKind::ApiToken);
		assert_eq!(api.bearer_token(), Some("tok"));

		let metadata = CredentialPayload::builder("vercel")
			.provider_data_entry("teamId", "team_1")
			.build()
			.expect("Metadata payload should build.");

		assert_eq!(metadata.kind, CredentialKind::Metadata);
		assert_eq!(metadata.bearer_token(), None);
	}

	#[test]
	fn builder_rejects_incomplete_payloads() {
		assert_eq!(
			CredentialPayload::builder("").api_token("tok").build(),
			Err(CredentialBuildError::MissingProvider)
		);
		assert!(matches!(
			CredentialPayload::builder("github").build(),
			Err(CredentialBuildError::Empty { .. })
		));
		assert_eq!(
			CredentialPayload::builder("github")
				.kind(CredentialKind::OAuthToken)
				.api_token("tok")
				.build(),
			Err(CredentialBuildError::TokenRequired { kind: CredentialKind::OAuthToken })
		);
	}

	#[test]
	fn claims_accept_single_audience() {
		let claims: OidcClaims =
			serde_json::from_str(r#"{"iss":"https://issuer","aud":"client-1","tid":"t-1"}"#)
				.expect("Claims should deserialize.");

		assert_eq!(claims.aud, vec!["client-1".to_owned()]);
		assert_eq!(claims.extra.get("tid"), Some(&Value::from("t-1")));
	}

	#[test]
	fn payload_serializes_kind_labels() {
		let payload = CredentialPayload::builder("slack")
			.oauth_token(OAuthToken::new("xoxb"))
			.build()
			.expect("Payload should build.");
		let json = serde_json::to_value(&payload).expect("Payload should serialize.");

		assert_eq!(json["kind"], "oauth_token");
		assert_eq!(json["token"]["token_type"], "Bearer");
	}
}
