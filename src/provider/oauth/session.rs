// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{TryRngCore, rngs::OsRng};
use sha2::{Digest, Sha256};
// self
use crate::{
	_prelude::*,
	auth::{CredentialPayload, ProviderType},
	config::OAuthSpec,
	error::AuthFlowError,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	provider::{AuthSession, ProviderFuture, oauth::exchange::RelyingParty},
};

/// Random bytes behind a generated state value (43 base64url characters).
pub const STATE_BYTES: usize = 32;
const PKCE_VERIFIER_BYTES: usize = 48;

/// Supported PKCE challenge methods.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PkceCodeChallengeMethod {
	/// SHA-256 based PKCE (RFC 7636 S256).
	S256,
}
impl PkceCodeChallengeMethod {
	/// Returns the RFC 7636 identifier for the challenge method.
	pub fn as_str(self) -> &'static str {
		match self {
			PkceCodeChallengeMethod::S256 => "S256",
		}
	}
}

/// Authorization-code handshake returned by [`OAuthProvider`](crate::provider::OAuthProvider).
pub struct OAuthSession {
	provider: ProviderType,
	state: String,
	auth_url: Url,
	redirect_uri: Url,
	scopes: Vec<String>,
	pkce: Option<PkcePair>,
	relying_party: Arc<RelyingParty>,
}
impl OAuthSession {
	pub(super) fn begin(
		relying_party: Arc<RelyingParty>,
		scopes: Vec<String>,
		state: Option<String>,
		redirect_uri: Url,
	) -> Result<Self, AuthFlowError> {
		let state = match state.filter(|value| !value.trim().is_empty()) {
			Some(state) => state,
			None => generate_state()?,
		};
		let pkce = if relying_party.spec().use_pkce { Some(PkcePair::generate()?) } else { None };
		let auth_url =
			build_auth_url(relying_party.spec(), &redirect_uri, &scopes, &state, pkce.as_ref());

		Ok(Self {
			provider: relying_party.provider().clone(),
			state,
			auth_url,
			redirect_uri,
			scopes,
			pkce,
			relying_party,
		})
	}

	/// Scopes requested by this session.
	pub fn scopes(&self) -> &[String] {
		&self.scopes
	}

	/// Redirect URI embedded in the authorization URL.
	pub fn redirect_uri(&self) -> &Url {
		&self.redirect_uri
	}

	/// PKCE code challenge, when PKCE is enabled.
	pub fn code_challenge(&self) -> Option<&str> {
		self.pkce.as_ref().map(|pkce| pkce.challenge.as_str())
	}

	/// PKCE challenge method, when PKCE is enabled.
	pub fn code_challenge_method(&self) -> Option<PkceCodeChallengeMethod> {
		self.pkce.as_ref().map(|pkce| pkce.method)
	}
}
impl AuthSession for OAuthSession {
	fn provider_type(&self) -> &ProviderType {
		&self.provider
	}

	fn state(&self) -> &str {
		&self.state
	}

	fn auth_url(&self) -> &Url {
		&self.auth_url
	}

	fn finish(self: Box<Self>, code: String) -> ProviderFuture<'static, CredentialPayload> {
		let span = FlowSpan::new(FlowKind::Finish, "finish", &self.provider);

		Box::pin(span.instrument(async move {
			obs::record_flow_outcome(FlowKind::Finish, FlowOutcome::Attempt);

			let Self { redirect_uri, pkce, relying_party, .. } = *self;
			let verifier = pkce.as_ref().map(|pkce| pkce.verifier.as_str());
			let result = relying_party.exchange_code(&code, verifier, &redirect_uri).await;

			obs::record_flow_result(FlowKind::Finish, &result);

			result
		}))
	}
}
impl Debug for OAuthSession {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("OAuthSession")
			.field("provider", &self.provider)
			.field("state", &self.state)
			.field("auth_url", &self.auth_url)
			.field("redirect_uri", &self.redirect_uri)
			.field("scopes", &self.scopes)
			.field("code_challenge", &self.code_challenge())
			.finish()
	}
}

#[derive(Clone)]
struct PkcePair {
	verifier: String,
	challenge: String,
	method: PkceCodeChallengeMethod,
}
impl PkcePair {
	fn generate() -> Result<Self, AuthFlowError> {
		let verifier = random_token(PKCE_VERIFIER_BYTES)?;
		let challenge = compute_pkce_challenge(&verifier);

		Ok(Self { verifier, challenge, method: PkceCodeChallengeMethod::S256 })
	}
}

/// Generates a fresh state value from the operating system RNG.
pub fn generate_state() -> Result<String, AuthFlowError> {
	random_token(STATE_BYTES)
}

fn random_token(len: usize) -> Result<String, AuthFlowError> {
	let mut bytes = vec![0_u8; len];

	OsRng
		.try_fill_bytes(&mut bytes)
		.map_err(|e| AuthFlowError::StateGeneration { source: Box::new(e) })?;

	Ok(URL_SAFE_NO_PAD.encode(bytes))
}

fn compute_pkce_challenge(verifier: &str) -> String {
	let mut hasher = Sha256::new();
	hasher.update(verifier.as_bytes());
	let digest = hasher.finalize();
	URL_SAFE_NO_PAD.encode(digest)
}

fn build_auth_url(
	spec: &OAuthSpec,
	redirect_uri: &Url,
	scopes: &[String],
	state: &str,
	pkce: Option<&PkcePair>,
) -> Url {
	let mut url = spec.auth_url.clone();
	let mut pairs = url.query_pairs_mut();

	pairs.append_pair("response_type", "code");
	pairs.append_pair("client_id", &spec.client_id);
	pairs.append_pair("redirect_uri", redirect_uri.as_str());

	if !scopes.is_empty() {
		pairs.append_pair("scope", &scopes.join(" "));
	}

	pairs.append_pair("state", state);

	if let Some(pkce) = pkce {
		pairs.append_pair("code_challenge", &pkce.challenge);
		pairs.append_pair("code_challenge_method", pkce.method.as_str());
	}

	// BTreeMap iteration keeps extra parameters in key order.
	for (key, value) in &spec.auth_params {
		pairs.append_pair(key, value);
	}

	drop(pairs);

	url
}
