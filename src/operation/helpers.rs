//! Shared building blocks for provider operations.

// crates.io
use reqwest::{RequestBuilder, header::ACCEPT};
// self
use crate::{
	_prelude::*,
	auth::CredentialPayload,
	error::{AuthFlowError, OperationError},
	http::HttpClient,
	operation::{
		ConfigMap, OperationDescriptor, OperationInput, OperationKind, OperationResult,
		decode_config,
	},
};

/// Name of the operation every provider should publish for connectivity checks.
pub const HEALTH_OPERATION: &str = "health.default";

/// Config options shared by operations that can echo raw provider payloads.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct PayloadOptions {
	/// Attach the decoded provider response under `details.payload`.
	#[serde(default)]
	pub include_payloads: bool,
}
impl PayloadOptions {
	/// JSON schema accepting only `include_payloads`.
	pub fn schema() -> Value {
		serde_json::json!({
			"type": "object",
			"properties": { "include_payloads": { "type": "boolean" } },
			"additionalProperties": false
		})
	}
}

/// Wraps `source` into an [`OperationError::Failed`] carrying a failed result.
pub fn operation_failure(
	summary: impl Into<String>,
	source: impl Into<BoxError>,
	details: ConfigMap,
) -> Error {
	OperationError::Failed {
		result: Box::new(OperationResult::failed(summary).with_details(details)),
		source: source.into(),
	}
	.into()
}

/// Inserts `payload` under `key` when `include` is set.
pub fn add_payload_if(details: &mut ConfigMap, include: bool, key: &str, payload: Value) {
	if include {
		details.insert(key.to_owned(), payload);
	}
}

/// Returns the bearer secret of `credential` or [`AuthFlowError::TokenUnavailable`].
pub fn require_bearer(credential: &CredentialPayload) -> Result<&str, AuthFlowError> {
	credential
		.bearer_token()
		.ok_or_else(|| AuthFlowError::TokenUnavailable { provider: credential.provider.clone() })
}

/// Sends `request` and decodes a JSON body.
///
/// The returned details always carry `status`; `payload` is attached when `include_payload` is
/// set. An empty body decodes to [`Value::Null`]. Transport failures, non-success statuses, and
/// bodies that are not JSON become [`OperationError::Failed`].
pub async fn send_json(request: RequestBuilder, include_payload: bool) -> Result<(Value, ConfigMap)> {
	let response = request
		.header(ACCEPT, "application/json")
		.send()
		.await
		.map_err(|e| operation_failure("Provider request failed", e, ConfigMap::new()))?;
	let status = response.status();
	let bytes = response
		.bytes()
		.await
		.map_err(|e| operation_failure("Provider response could not be read", e, ConfigMap::new()))?;
	let decoded = if bytes.iter().all(u8::is_ascii_whitespace) {
		Ok(Value::Null)
	} else {
		serde_json::from_slice::<Value>(&bytes)
	};
	let mut details = ConfigMap::new();

	details.insert("status".into(), status.as_u16().into());

	match decoded {
		Ok(body) => {
			add_payload_if(&mut details, include_payload, "payload", body.clone());

			if !status.is_success() {
				return Err(operation_failure(
					format!("Provider returned HTTP {}", status.as_u16()),
					format!("unexpected status {status}"),
					details,
				));
			}

			Ok((body, details))
		},
		Err(e) => {
			add_payload_if(
				&mut details,
				include_payload,
				"payload",
				String::from_utf8_lossy(&bytes).into_owned().into(),
			);

			let summary = if status.is_success() {
				"Provider returned a non-JSON response".to_owned()
			} else {
				format!("Provider returned HTTP {}", status.as_u16())
			};

			Err(operation_failure(summary, e, details))
		},
	}
}

/// Builds a `health.default` descriptor around `run`.
pub fn health_operation<F, Fut>(description: impl Into<String>, run: F) -> OperationDescriptor
where
	F: 'static + Fn(OperationInput) -> Fut + Send + Sync,
	Fut: 'static + Future<Output = Result<OperationResult>> + Send,
{
	OperationDescriptor::new(HEALTH_OPERATION, OperationKind::Health, description, run)
		.with_config_schema(PayloadOptions::schema())
}

/// Health check issuing an authenticated `GET endpoint` with the credential's bearer token.
pub fn bearer_health_operation(endpoint: Url, http: HttpClient) -> OperationDescriptor {
	health_operation(format!("GET {endpoint} with the stored bearer token."), move |input| {
		let endpoint = endpoint.clone();
		let http = http.clone();

		async move {
			let options = decode_config::<PayloadOptions>(&input.config)?;
			let token = require_bearer(&input.credential)?;
			let (_, details) =
				send_json(http.get(endpoint).bearer_auth(token), options.include_payloads).await?;

			Ok(OperationResult::ok("Health check passed").with_details(details))
		}
	})
}
