//! Google Cloud Security Command Center integration using workload identity federation.
//!
//! Credentials are collected through the metadata form (project, audience, subject token) and
//! checked against the spec's `credentials_schema`, or [`credentials_schema`] when the spec
//! declares none. Minting trades the subject token for a short-lived Google access token at the
//! STS `v1/token` endpoint (RFC 8693 token exchange) and returns a metadata payload carrying it.

// crates.io
use reqwest::{RequestBuilder, StatusCode};
// self
use crate::{
	_prelude::*,
	auth::{CredentialKind, CredentialPayload, CredentialSubject, OAuthToken, ProviderType},
	config::{AuthKind, ProviderSpec, normalize_scopes},
	error::{AuthFlowError, ErrorClass},
	http::HttpClient,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	operation::{
		ClientDescriptor, OperationDescriptor, OperationResult, PayloadOptions, decode_config,
		health_operation, require_bearer, send_json,
	},
	provider::{
		AuthContext, AuthSession, Builder, BuilderFn, ClientProvider, OperationProvider, Provider,
		ProviderCapabilities, ProviderFuture, ensure_auth_kind,
		oauth::exchange::classify_oauth_error, validate_metadata,
	},
	providers::{api_endpoint, api_http, join_path, shared},
};

/// Provider type served by [`builder`].
pub const GCP_SCC: &str = "gcp_scc";
/// Default security token service root.
pub const STS_API: &str = "https://sts.googleapis.com";
/// Default Security Command Center API root.
pub const SCC_API: &str = "https://securitycenter.googleapis.com";
/// Name of the pooled Security Command Center client.
pub const SECURITY_CENTER_CLIENT: &str = "securitycenter.v2";
/// Scope requested when the metadata lists none.
pub const DEFAULT_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";
/// Subject attribute overriding the stored subject token.
pub const SUBJECT_TOKEN_ATTR: &str = "subject_token";
/// Subject attribute overriding the subject token type.
pub const SUBJECT_TOKEN_TYPE_ATTR: &str = "subject_token_type";

const TOKEN_EXCHANGE_GRANT: &str = "urn:ietf:params:oauth:grant-type:token-exchange";
const ACCESS_TOKEN_TYPE: &str = "urn:ietf:params:oauth:token-type:access_token";
const ID_TOKEN_TYPE: &str = "urn:ietf:params:oauth:token-type:id_token";

/// Metadata form schema used when the spec does not declare one.
pub fn credentials_schema() -> Value {
	serde_json::json!({
		"type": "object",
		"required": ["projectId", "audience"],
		"properties": {
			"projectId": { "type": "string", "minLength": 1, "description": "Quota project." },
			"organizationId": { "type": "string" },
			"audience": {
				"type": "string",
				"pattern": "^//iam\\.googleapis\\.com/",
				"description": "Workload identity pool provider resource name."
			},
			"serviceAccountEmail": { "type": "string" },
			"scopes": { "type": "array", "items": { "type": "string" } },
			"workloadPoolProject": { "type": "string" },
			"subjectToken": { "type": "string" },
			"sourceId": { "type": "string" }
		}
	})
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WorkloadMetadata {
	project_id: Option<String>,
	organization_id: Option<String>,
	audience: Option<String>,
	#[serde(default)]
	scopes: Vec<String>,
	workload_pool_project: Option<String>,
	subject_token: Option<String>,
}
impl WorkloadMetadata {
	fn decode(provider: &ProviderType, data: &Map<String, Value>) -> Result<Self, AuthFlowError> {
		serde_path_to_error::deserialize(Value::Object(data.clone())).map_err(|e| {
			AuthFlowError::InvalidMetadata {
				provider: provider.clone(),
				path: e.path().to_string(),
				message: e.inner().to_string(),
			}
		})
	}

	/// Security Command Center parents the credential can reach.
	fn parents(&self) -> Vec<String> {
		let mut parents = Vec::new();

		if let Some(org) = trimmed(&self.organization_id) {
			parents.push(format!("organizations/{org}"));
		}
		if let Some(project) = trimmed(&self.project_id) {
			parents.push(format!("projects/{project}"));
		}

		parents
	}
}

#[derive(Debug, Deserialize)]
struct StsToken {
	access_token: String,
	#[serde(default)]
	token_type: Option<String>,
	#[serde(default)]
	expires_in: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct StsRejection {
	error: String,
	#[serde(default)]
	error_description: Option<String>,
}

fn trimmed(value: &Option<String>) -> Option<&str> {
	value.as_deref().map(str::trim).filter(|value| !value.is_empty())
}

/// Authenticated Security Command Center REST client.
#[derive(Clone, Debug)]
pub struct SecurityCenterClient {
	http: HttpClient,
	base: Url,
	token: String,
}
impl SecurityCenterClient {
	/// Creates a client for `base` authenticated with `token`.
	pub fn new(http: HttpClient, base: Url, token: impl Into<String>) -> Self {
		Self { http, base, token: token.into() }
	}

	/// Starts a `GET` request for a `v2` resource path.
	pub fn get(&self, path: &str) -> RequestBuilder {
		self.http.get(join_path(&self.base, &format!("v2/{path}"))).bearer_auth(&self.token)
	}
}

/// Provider minting Google access tokens from federated subject tokens.
#[derive(Debug)]
pub struct GcpSccProvider {
	provider_type: ProviderType,
	credentials_schema: Value,
	token_url: Url,
	http: HttpClient,
	clients: Vec<ClientDescriptor>,
	operations: Vec<OperationDescriptor>,
}
impl GcpSccProvider {
	/// Builds a provider from `spec`.
	///
	/// `api_base_url` overrides both the STS and the Security Command Center roots.
	pub fn new(spec: &ProviderSpec) -> Result<Self> {
		let http = api_http()?;
		let credentials_schema = match &spec.credentials_schema {
			Some(schema) if spec.supports_metadata_form() => schema.clone(),
			_ => credentials_schema(),
		};
		let scc_base = spec.api_base_url_or(SCC_API)?;

		Ok(Self {
			provider_type: spec.provider_type.clone(),
			credentials_schema,
			token_url: api_endpoint(spec, STS_API, "v1/token")?,
			clients: vec![security_center_client(scc_base, http.clone())],
			operations: vec![health()],
			http,
		})
	}

	async fn mint_inner(&self, subject: CredentialSubject) -> Result<CredentialPayload> {
		let CredentialSubject { credential, attributes, .. } = subject;

		validate_metadata(&self.provider_type, Some(&self.credentials_schema), &credential.provider_data)?;

		let metadata = WorkloadMetadata::decode(&self.provider_type, &credential.provider_data)?;
		let audience = trimmed(&metadata.audience).ok_or_else(|| AuthFlowError::InvalidMetadata {
			provider: self.provider_type.clone(),
			path: "$.audience".into(),
			message: "a workload identity audience is required".into(),
		})?;
		let subject_token = attributes
			.get(SUBJECT_TOKEN_ATTR)
			.map(|token| token.trim())
			.filter(|token| !token.is_empty())
			.or_else(|| trimmed(&metadata.subject_token))
			.ok_or_else(|| AuthFlowError::TokenUnavailable { provider: self.provider_type.clone() })?;
		let subject_token_type = attributes
			.get(SUBJECT_TOKEN_TYPE_ATTR)
			.map(|kind| kind.trim())
			.filter(|kind| !kind.is_empty())
			.unwrap_or(ID_TOKEN_TYPE);
		let mut scopes = normalize_scopes(&metadata.scopes);

		if scopes.is_empty() {
			scopes.push(DEFAULT_SCOPE.into());
		}

		let scope = scopes.join(" ");
		let options = trimmed(&metadata.workload_pool_project)
			.map(|project| serde_json::json!({ "userProject": project }).to_string());
		let mut form = vec![
			("grant_type", TOKEN_EXCHANGE_GRANT),
			("audience", audience),
			("scope", scope.as_str()),
			("requested_token_type", ACCESS_TOKEN_TYPE),
			("subject_token", subject_token),
			("subject_token_type", subject_token_type),
		];

		if let Some(options) = &options {
			form.push(("options", options.as_str()));
		}

		let token = self.exchange(&form).await?;
		let subject_token = subject_token.to_owned();
		let mut provider_data = credential.provider_data;

		provider_data.insert("scopes".into(), scopes.into());
		provider_data.insert("subjectToken".into(), subject_token.into());

		Ok(CredentialPayload::builder(self.provider_type.clone())
			.kind(CredentialKind::Metadata)
			.oauth_token(token)
			.provider_data(provider_data)
			.build()?)
	}

	async fn exchange(&self, form: &[(&str, &str)]) -> Result<OAuthToken, AuthFlowError> {
		let response = self
			.http
			.post(self.token_url.clone())
			.form(form)
			.send()
			.await
			.map_err(|e| self.exchange_error(ErrorClass::Transient, e.to_string(), Some(e.into())))?;
		let status = response.status();
		let bytes = response
			.bytes()
			.await
			.map_err(|e| self.exchange_error(ErrorClass::Transient, e.to_string(), Some(e.into())))?;

		if !status.is_success() {
			return Err(self.rejection(status, &bytes));
		}

		let issued = serde_json::from_slice::<StsToken>(&bytes).map_err(|e| {
			self.exchange_error(
				ErrorClass::Transient,
				"token response could not be decoded".into(),
				Some(e.into()),
			)
		})?;

		if issued.access_token.trim().is_empty() {
			return Err(self.exchange_error(
				ErrorClass::Transient,
				"token response carried no access token".into(),
				None,
			));
		}

		let mut token = OAuthToken::new(issued.access_token);

		if let Some(token_type) = issued.token_type.filter(|kind| !kind.trim().is_empty()) {
			token = token.with_token_type(token_type);
		}
		if let Some(expires_in) = issued.expires_in.filter(|seconds| *seconds > 0) {
			token = token.with_expires_at(OffsetDateTime::now_utc() + Duration::seconds(expires_in));
		}

		Ok(token)
	}

	fn rejection(&self, status: StatusCode, body: &[u8]) -> AuthFlowError {
		let transient = status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS;

		match serde_json::from_slice::<StsRejection>(body) {
			Ok(rejection) => {
				let class = if transient {
					ErrorClass::Transient
				} else {
					classify_oauth_error(&rejection.error, rejection.error_description.as_deref())
				};
				let message = rejection.error_description.unwrap_or(rejection.error);

				self.exchange_error(class, message, None)
			},
			Err(_) => {
				let class = if transient { ErrorClass::Transient } else { ErrorClass::InvalidGrant };

				self.exchange_error(class, format!("STS returned HTTP {}", status.as_u16()), None)
			},
		}
	}

	fn exchange_error(
		&self,
		class: ErrorClass,
		message: String,
		source: Option<BoxError>,
	) -> AuthFlowError {
		AuthFlowError::TokenExchange { provider: self.provider_type.clone(), class, message, source }
	}
}
impl Provider for GcpSccProvider {
	fn provider_type(&self) -> &ProviderType {
		&self.provider_type
	}

	fn capabilities(&self) -> ProviderCapabilities {
		ProviderCapabilities {
			supports_refresh_tokens: false,
			supports_client_pooling: true,
			supports_metadata_form: true,
		}
	}

	fn begin_auth(&self, _ctx: AuthContext) -> ProviderFuture<'_, Box<dyn AuthSession>> {
		let provider = self.provider_type.clone();

		Box::pin(async move { Err(AuthFlowError::BeginAuthNotSupported { provider }.into()) })
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
		Some(self)
	}

	fn operation_provider(&self) -> Option<&dyn OperationProvider> {
		Some(self)
	}
}
impl ClientProvider for GcpSccProvider {
	fn client_descriptors(&self) -> Vec<ClientDescriptor> {
		self.clients.clone()
	}
}
impl OperationProvider for GcpSccProvider {
	fn operations(&self) -> Vec<OperationDescriptor> {
		self.operations.clone()
	}
}

/// Builder for the `gcp_scc` provider.
pub fn builder() -> Arc<dyn Builder> {
	Arc::new(BuilderFn::new(GCP_SCC, |spec| {
		ensure_auth_kind(spec, &[AuthKind::Metadata])?;

		Ok(shared(GcpSccProvider::new(spec)?))
	}))
}

fn security_center_client(base: Url, http: HttpClient) -> ClientDescriptor {
	ClientDescriptor::new(
		SECURITY_CENTER_CLIENT,
		"Security Command Center v2 client authenticated with the minted access token.",
		move |credential: CredentialPayload, _config| {
			let client = require_bearer(&credential)
				.map(|token| SecurityCenterClient::new(http.clone(), base.clone(), token));

			async move { Ok(client?) }
		},
	)
}

fn health() -> OperationDescriptor {
	health_operation("Validate Security Command Center access by listing sources.", |input| {
		async move {
			let options = decode_config::<PayloadOptions>(&input.config)?;
			let client = input.require_client::<SecurityCenterClient>()?;
			let metadata =
				WorkloadMetadata::decode(&input.credential.provider, &input.credential.provider_data)?;
			let parents = metadata.parents();

			if parents.is_empty() {
				return Err(AuthFlowError::InvalidMetadata {
					provider: input.credential.provider.clone(),
					path: "$.projectId".into(),
					message: "an organization or project is required".into(),
				}
				.into());
			}

			let mut details = Map::new();

			for parent in &parents {
				let request = client.get(&format!("{parent}/sources")).query(&[("pageSize", "1")]);
				let (_, page_details) = send_json(request, options.include_payloads).await?;

				details = page_details;
			}

			details.insert("parents".into(), parents.clone().into());

			Ok(OperationResult::ok(format!(
				"Security Command Center reachable for {} parent(s)",
				parents.len()
			))
			.with_details(details))
		}
	})
	.with_client(SECURITY_CENTER_CLIENT)
}
