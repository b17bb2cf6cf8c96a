//! GitHub OAuth app integration.

// crates.io
use reqwest::{
	RequestBuilder,
	header::{HeaderName, USER_AGENT},
};
// self
use crate::{
	_prelude::*,
	auth::CredentialPayload,
	config::AuthKind,
	http::HttpClient,
	operation::{
		ClientDescriptor, ConfigMap, OperationDescriptor, OperationKind, OperationResult,
		PayloadOptions, add_payload_if, decode_config, health_operation, operation_failure,
		require_bearer, send_json,
	},
	provider::{Builder, BuilderFn, OAuthProvider, ensure_auth_kind},
	providers::{api_http, join_path, shared},
};

/// Provider type served by [`builder`].
pub const GITHUB: &str = "github";
/// Default REST API root.
pub const GITHUB_API: &str = "https://api.github.com";
/// Name of the pooled REST client.
pub const GITHUB_REST_CLIENT: &str = "github.rest";
/// Repository inventory operation.
pub const REPOSITORIES_COLLECT: &str = "repositories.collect";

/// Upper bound on `user/repos` pages fetched by one run.
pub const MAX_PAGES: u32 = 10;

const API_VERSION: &str = "2022-11-28";
const AGENT: &str = concat!("integration-registry/", env!("CARGO_PKG_VERSION"));

/// Authenticated GitHub REST client handed to operations.
#[derive(Clone, Debug)]
pub struct GitHubClient {
	http: HttpClient,
	base: Url,
	token: String,
}
impl GitHubClient {
	/// Creates a client for `base` authenticated with `token`.
	pub fn new(http: HttpClient, base: Url, token: impl Into<String>) -> Self {
		Self { http, base, token: token.into() }
	}

	/// Starts a `GET` request for `path` with GitHub's required headers.
	pub fn get(&self, path: &str) -> RequestBuilder {
		self.http
			.get(join_path(&self.base, path))
			.bearer_auth(&self.token)
			.header(USER_AGENT, AGENT)
			.header(HeaderName::from_static("x-github-api-version"), API_VERSION)
	}
}

/// Repository visibility filter accepted by `repositories.collect`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
	/// Every repository the token can see.
	#[default]
	All,
	/// Public repositories only.
	Public,
	/// Private repositories only.
	Private,
}
impl Visibility {
	fn as_str(self) -> &'static str {
		match self {
			Self::All => "all",
			Self::Public => "public",
			Self::Private => "private",
		}
	}
}

#[derive(Debug, Deserialize)]
struct RepositoriesConfig {
	#[serde(default)]
	include_payloads: bool,
	#[serde(default)]
	owner: Option<String>,
	#[serde(default)]
	visibility: Visibility,
	#[serde(default = "default_per_page")]
	per_page: u8,
}

fn default_per_page() -> u8 {
	100
}

#[derive(Debug, Deserialize)]
struct Repository {
	full_name: String,
	#[serde(default)]
	private: bool,
	owner: Owner,
}

#[derive(Debug, Deserialize)]
struct Owner {
	login: String,
}

/// Builder for the `github` provider.
pub fn builder() -> Arc<dyn Builder> {
	Arc::new(BuilderFn::new(GITHUB, |spec| {
		ensure_auth_kind(spec, &[AuthKind::OAuth2])?;

		let base = spec.api_base_url_or(GITHUB_API)?;
		let provider = OAuthProvider::new(spec)?
			.with_clients(vec![rest_client(base, api_http()?)])
			.with_operations(vec![health(), repositories()]);

		Ok(shared(provider))
	}))
}

fn rest_client(base: Url, http: HttpClient) -> ClientDescriptor {
	ClientDescriptor::new(
		GITHUB_REST_CLIENT,
		"GitHub REST API client authenticated with the stored token.",
		move |credential: CredentialPayload, _config| {
			let client = require_bearer(&credential)
				.map(|token| GitHubClient::new(http.clone(), base.clone(), token));

			async move { Ok(client?) }
		},
	)
}

fn health() -> OperationDescriptor {
	health_operation("Fetch the authenticated GitHub user.", |input| async move {
		let options = decode_config::<PayloadOptions>(&input.config)?;
		let client = input.require_client::<GitHubClient>()?;
		let (user, mut details) = send_json(client.get("user"), options.include_payloads).await?;
		let login = user.get("login").and_then(Value::as_str).unwrap_or_default().to_owned();

		details.insert("login".into(), login.clone().into());

		Ok(OperationResult::ok(format!("GitHub token is valid for {login}")).with_details(details))
	})
	.with_client(GITHUB_REST_CLIENT)
}

fn repositories() -> OperationDescriptor {
	OperationDescriptor::new(
		REPOSITORIES_COLLECT,
		OperationKind::DirectoryInspect,
		"List repositories visible to the authenticated user.",
		|input| async move {
			let config = decode_config::<RepositoriesConfig>(&input.config)?;
			let client = input.require_client::<GitHubClient>()?;
			let per_page = config.per_page.to_string();
			let mut repositories = Vec::new();
			let mut payloads = Vec::new();
			let mut details = ConfigMap::new();
			let mut pages = 0;
			let mut truncated = false;

			for page in 1..=MAX_PAGES {
				let page_number = page.to_string();
				let request = client.get("user/repos").query(&[
					("visibility", config.visibility.as_str()),
					("per_page", per_page.as_str()),
					("page", page_number.as_str()),
				]);
				let (body, page_details) = send_json(request, config.include_payloads).await?;
				let batch = match serde_json::from_value::<Vec<Repository>>(body.clone()) {
					Ok(batch) => batch,
					Err(e) =>
						return Err(operation_failure(
							"GitHub returned an unexpected repositories payload",
							e,
							page_details,
						)),
				};
				let full = batch.len() >= usize::from(config.per_page);

				pages = page;
				details = page_details;

				repositories.extend(batch);

				if config.include_payloads {
					payloads.push(body);
				}
				if !full {
					break;
				}
				if page == MAX_PAGES {
					truncated = true;
				}
			}

			let names = repositories
				.iter()
				.filter(|repo| {
					config.owner.as_deref().is_none_or(|owner| repo.owner.login.eq_ignore_ascii_case(owner))
				})
				.map(|repo| repo.full_name.clone())
				.collect::<Vec<_>>();
			let private = repositories.iter().filter(|repo| repo.private).count();

			details.insert("count".into(), names.len().into());
			details.insert("private".into(), private.into());
			details.insert("repositories".into(), names.clone().into());
			details.insert("pages".into(), pages.into());
			details.insert("truncated".into(), truncated.into());
			add_payload_if(&mut details, config.include_payloads, "payload", Value::Array(payloads));

			Ok(OperationResult::ok(format!("Found {} repositories", names.len())).with_details(details))
		},
	)
	.with_client(GITHUB_REST_CLIENT)
	.with_config_schema(serde_json::json!({
		"type": "object",
		"properties": {
			"include_payloads": { "type": "boolean" },
			"owner": { "type": "string", "minLength": 1 },
			"visibility": { "enum": ["all", "public", "private"] },
			"per_page": { "type": "integer", "minimum": 1, "maximum": 100 }
		},
		"additionalProperties": false
	}))
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{_preludet::*, config::ProviderSpec, error::ConfigError, provider::Provider};

	#[tokio::test]
	async fn builds_with_client_and_operations() {
		let spec = oauth_spec(GITHUB, "https://github.com/login/oauth");
		let provider = builder()
			.build(&spec)
			.await
			.expect("Build should succeed.")
			.expect("Provider should exist.");
		let clients = provider.client_provider().expect("Clients should be published.");
		let operations = provider.operation_provider().expect("Operations should be published.");
		let names = operations.operations().into_iter().map(|op| op.name).collect::<Vec<_>>();

		assert_eq!(clients.client_descriptors()[0].name, GITHUB_REST_CLIENT);
		assert_eq!(names, ["health.default", REPOSITORIES_COLLECT]);
		assert!(provider.capabilities().supports_client_pooling);
	}

	#[tokio::test]
	async fn rejects_foreign_auth_kinds() {
		let spec = oauth_spec(GITHUB, "https://github.com").with_auth_kind(AuthKind::ApiToken);
		let Err(err) = builder().build(&spec).await else { panic!("Build should fail.") };

		assert!(matches!(err, Error::Config(ConfigError::AuthKindMismatch { .. })));

		let Err(err) = builder().build(&ProviderSpec::new(GITHUB)).await else {
			panic!("Build should fail.")
		};

		assert!(matches!(err, Error::Config(ConfigError::MissingOAuthConfig { .. })));
	}
}
