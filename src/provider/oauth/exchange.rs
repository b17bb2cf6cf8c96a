// std
use std::borrow::Cow;
// crates.io
use oauth2::{
	AuthType, AuthUrl, AuthorizationCode, Client, ClientId, ClientSecret, EndpointNotSet,
	EndpointSet, ExtraTokenFields, HttpClientError, PkceCodeVerifier, RedirectUrl, RefreshToken,
	RequestTokenError, StandardRevocableToken, StandardTokenResponse, TokenResponse, TokenUrl,
	basic::{
		BasicErrorResponse, BasicRevocationErrorResponse, BasicTokenIntrospectionResponse,
		BasicTokenType,
	},
};
// self
use crate::{
	_prelude::*,
	auth::{CredentialPayload, OAuthToken, ProviderType},
	config::{ClientAuthMethod, OAuthSpec},
	error::{AuthFlowError, ConfigError, ErrorClass},
	http::HttpClient,
	provider::oauth::claims,
};

type RelyingPartyTokenResponse = StandardTokenResponse<IdTokenFields, BasicTokenType>;
type RelyingPartyClient<HasAuthUrl = EndpointSet, HasTokenUrl = EndpointSet> = Client<
	BasicErrorResponse,
	RelyingPartyTokenResponse,
	BasicTokenIntrospectionResponse,
	StandardRevocableToken,
	BasicRevocationErrorResponse,
	HasAuthUrl,
	EndpointNotSet,
	EndpointNotSet,
	EndpointNotSet,
	HasTokenUrl,
>;
type RelyingPartyRequestError = RequestTokenError<HttpClientError<ReqwestError>, BasicErrorResponse>;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct IdTokenFields {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	id_token: Option<String>,
}
impl ExtraTokenFields for IdTokenFields {}

#[derive(Clone, Copy, Debug)]
enum TokenStage {
	CodeExchange,
	Refresh,
}
impl TokenStage {
	fn error(
		self,
		provider: &ProviderType,
		class: ErrorClass,
		message: String,
		source: Option<BoxError>,
	) -> AuthFlowError {
		let provider = provider.clone();

		match self {
			Self::CodeExchange => AuthFlowError::CodeExchange { provider, class, message, source },
			Self::Refresh => AuthFlowError::TokenRefresh { provider, class, message, source },
		}
	}
}

/// OAuth2/OIDC relying party bound to one provider spec.
pub(crate) struct RelyingParty {
	provider: ProviderType,
	spec: OAuthSpec,
	require_id_token: bool,
	client: RelyingPartyClient,
	http: HttpClient,
}
impl RelyingParty {
	pub(crate) fn new(
		provider: ProviderType,
		spec: OAuthSpec,
		require_id_token: bool,
		http: HttpClient,
	) -> Result<Self, ConfigError> {
		let init_error =
			|reason: String| ConfigError::RelyingPartyInit { provider: provider.clone(), reason };

		if spec.client_id.trim().is_empty() {
			return Err(init_error("client_id is required".into()));
		}

		let auth_url = AuthUrl::new(spec.auth_url.to_string())
			.map_err(|e| init_error(format!("auth_url is invalid: {e}")))?;
		let token_url = TokenUrl::new(spec.token_url.to_string())
			.map_err(|e| init_error(format!("token_url is invalid: {e}")))?;
		let secret = match spec.client_auth {
			ClientAuthMethod::NoneWithPkce if !spec.use_pkce =>
				return Err(init_error("public clients must enable PKCE".into())),
			ClientAuthMethod::NoneWithPkce => None,
			ClientAuthMethod::ClientSecretBasic | ClientAuthMethod::ClientSecretPost => {
				let secret = spec
					.client_secret
					.as_ref()
					.filter(|secret| !secret.is_blank())
					.ok_or_else(|| init_error("client_secret is required".into()))?;

				Some(ClientSecret::new(secret.expose().to_owned()))
			},
		};
		let mut client =
			RelyingPartyClient::<EndpointNotSet, EndpointNotSet>::new(ClientId::new(
				spec.client_id.clone(),
			))
			.set_auth_uri(auth_url)
			.set_token_uri(token_url);

		if let Some(secret) = secret {
			client = client.set_client_secret(secret);
		}
		if matches!(spec.client_auth, ClientAuthMethod::ClientSecretPost) {
			client = client.set_auth_type(AuthType::RequestBody);
		}

		Ok(Self { provider, spec, require_id_token, client, http })
	}

	pub(crate) fn provider(&self) -> &ProviderType {
		&self.provider
	}

	pub(crate) fn spec(&self) -> &OAuthSpec {
		&self.spec
	}

	/// Exchanges an authorization code and assembles the resulting credential.
	pub(crate) async fn exchange_code(
		&self,
		code: &str,
		pkce_verifier: Option<&str>,
		redirect_uri: &Url,
	) -> Result<CredentialPayload> {
		let mut request = self.client.exchange_code(AuthorizationCode::new(code.to_owned()));

		if let Some(verifier) = pkce_verifier {
			request = request.set_pkce_verifier(PkceCodeVerifier::new(verifier.to_owned()));
		}

		let redirect_url = RedirectUrl::new(redirect_uri.to_string()).map_err(|e| {
			ConfigError::RelyingPartyInit {
				provider: self.provider.clone(),
				reason: format!("redirect_uri is invalid: {e}"),
			}
		})?;

		request = request.set_redirect_uri(Cow::Owned(redirect_url));

		for (key, value) in &self.spec.token_params {
			request = request.add_extra_param(key.as_str(), value.as_str());
		}

		let response = request
			.request_async(&self.http)
			.await
			.map_err(|e| map_request_error(TokenStage::CodeExchange, &self.provider, e))?;
		let token = token_from_response(&response, OffsetDateTime::now_utc());
		let mut builder = CredentialPayload::builder(self.provider.clone()).oauth_token(token);

		match response.extra_fields().id_token.as_deref() {
			Some(id_token) => {
				let claims = claims::decode_id_token(id_token)
					.and_then(|claims| {
						claims::verify_claims(
							&claims,
							self.spec.issuer.as_deref(),
							&self.spec.client_id,
						)
						.map(|_| claims)
					})
					.map_err(|reason| AuthFlowError::InvalidIdToken {
						provider: self.provider.clone(),
						reason,
					})?;

				builder = builder.claims(claims);
			},
			None if self.require_id_token => {
				return Err(AuthFlowError::InvalidIdToken {
					provider: self.provider.clone(),
					reason: "token response carries no id_token".into(),
				}
				.into());
			},
			None => {},
		}

		Ok(builder.build()?)
	}

	/// Returns `token` while it is still valid, otherwise refreshes it.
	pub(crate) async fn token_source(&self, token: OAuthToken) -> Result<OAuthToken> {
		if token.is_valid() {
			return Ok(token);
		}

		self.refresh(&token).await
	}

	/// Runs the refresh-token grant, keeping the old refresh token when none is returned.
	pub(crate) async fn refresh(&self, current: &OAuthToken) -> Result<OAuthToken> {
		let Some(refresh) = current.usable_refresh_token() else {
			return Err(TokenStage::Refresh
				.error(
					&self.provider,
					ErrorClass::InvalidGrant,
					"stored token is expired and carries no refresh token".into(),
					None,
				)
				.into());
		};
		let refresh_secret = RefreshToken::new(refresh.expose().to_owned());
		let response = self
			.client
			.exchange_refresh_token(&refresh_secret)
			.request_async(&self.http)
			.await
			.map_err(|e| map_request_error(TokenStage::Refresh, &self.provider, e))?;
		let mut token = token_from_response(&response, OffsetDateTime::now_utc());

		if token.usable_refresh_token().is_none() {
			token.refresh_token = current.refresh_token.clone();
		}

		Ok(token)
	}
}

fn token_from_response(response: &RelyingPartyTokenResponse, now: OffsetDateTime) -> OAuthToken {
	let token_type: &str = response.token_type().as_ref();
	let mut token =
		OAuthToken::new(response.access_token().secret().to_owned()).with_token_type(token_type);

	if let Some(refresh) = response.refresh_token() {
		token = token.with_refresh_token(refresh.secret().to_owned());
	}
	if let Some(expires_at) = response
		.expires_in()
		.and_then(|expires_in| Duration::try_from(expires_in).ok())
		.and_then(|expires_in| now.checked_add(expires_in))
	{
		token = token.with_expires_at(expires_at);
	}

	token
}

fn map_request_error(
	stage: TokenStage,
	provider: &ProviderType,
	err: RelyingPartyRequestError,
) -> AuthFlowError {
	match err {
		RequestTokenError::ServerResponse(response) => {
			let code: &str = response.error().as_ref();
			let description = response.error_description().map(String::as_str);
			let message = match description {
				Some(description) => format!("{code}: {description}"),
				None => code.to_owned(),
			};

			stage.error(provider, classify_oauth_error(code, description), message, None)
		},
		RequestTokenError::Request(e) => stage.error(
			provider,
			ErrorClass::Transient,
			"token endpoint request failed".into(),
			Some(Box::new(e)),
		),
		RequestTokenError::Parse(e, _body) => stage.error(
			provider,
			ErrorClass::Transient,
			"token endpoint returned a malformed response".into(),
			Some(Box::new(e)),
		),
		RequestTokenError::Other(message) =>
			stage.error(provider, ErrorClass::Transient, message, None),
	}
}

/// OAuth error responses are 4xx by definition, so unknown codes default to a rejected grant.
pub(crate) fn classify_oauth_error(code: &str, description: Option<&str>) -> ErrorClass {
	match_exact_value(code)
		.or_else(|| description.and_then(match_exact_value))
		.or_else(|| description.and_then(classify_description))
		.unwrap_or(ErrorClass::InvalidGrant)
}

fn match_exact_value(value: &str) -> Option<ErrorClass> {
	if value.eq_ignore_ascii_case("invalid_grant") || value.eq_ignore_ascii_case("access_denied") {
		Some(ErrorClass::InvalidGrant)
	} else if value.eq_ignore_ascii_case("invalid_client")
		|| value.eq_ignore_ascii_case("unauthorized_client")
	{
		Some(ErrorClass::InvalidClient)
	} else if value.eq_ignore_ascii_case("invalid_scope")
		|| value.eq_ignore_ascii_case("insufficient_scope")
	{
		Some(ErrorClass::InsufficientScope)
	} else if value.eq_ignore_ascii_case("temporarily_unavailable")
		|| value.eq_ignore_ascii_case("server_error")
	{
		Some(ErrorClass::Transient)
	} else {
		None
	}
}

fn classify_description(description: &str) -> Option<ErrorClass> {
	let lowered = description.to_ascii_lowercase();

	match lowered.as_str() {
		text if text.contains("invalid_grant") || text.contains("expired") =>
			Some(ErrorClass::InvalidGrant),
		text if text.contains("invalid_client") => Some(ErrorClass::InvalidClient),
		text if text.contains("insufficient_scope") || text.contains("invalid_scope") =>
			Some(ErrorClass::InsufficientScope),
		text if text.contains("temporarily_unavailable") || text.contains("retry") =>
			Some(ErrorClass::Transient),
		_ => None,
	}
}
