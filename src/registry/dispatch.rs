//! Operation dispatch over registered descriptors.

// self
use crate::{
	_prelude::*,
	auth::{CredentialPayload, CredentialSubject, OperationName, ProviderType},
	error::{OperationError, RegistryError},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	operation::{ClientDescriptor, ConfigMap, OperationDescriptor, OperationInput, OperationResult},
	registry::Registry,
};

/// Request to run one named operation.
#[derive(Clone, Debug)]
pub struct OperationRequest {
	/// Provider publishing the operation.
	pub provider: ProviderType,
	/// Operation name.
	pub name: OperationName,
	/// Credential handed to the client builder and the run.
	pub credential: CredentialPayload,
	/// Operation configuration; also used as the client configuration.
	pub config: ConfigMap,
}
impl OperationRequest {
	/// Creates a request with an empty configuration.
	pub fn new(
		provider: impl Into<ProviderType>,
		name: impl Into<OperationName>,
		credential: CredentialPayload,
	) -> Self {
		Self { provider: provider.into(), name: name.into(), credential, config: ConfigMap::new() }
	}

	/// Replaces the configuration.
	pub fn with_config(mut self, config: ConfigMap) -> Self {
		self.config = config;

		self
	}

	/// Sets one configuration entry.
	pub fn with_config_entry(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
		self.config.insert(key.into(), value.into());

		self
	}
}

impl Registry {
	/// Runs the operation named by `request`.
	///
	/// The config is validated against the descriptor schema before the referenced client is
	/// built. A failing run always surfaces as [`OperationError::Failed`] with a failed result.
	pub async fn run_operation(&self, request: OperationRequest) -> Result<OperationResult> {
		let span = FlowSpan::new(FlowKind::Operation, "run_operation", &request.provider);

		span.instrument(async move {
			obs::record_flow_outcome(FlowKind::Operation, FlowOutcome::Attempt);

			let result = self.dispatch(request).await;

			obs::record_flow_result(FlowKind::Operation, &result);

			result
		})
		.await
	}

	/// Creates a [`Dispatcher`] holding a weak handle to this registry.
	pub fn dispatcher(self: &Arc<Self>) -> Dispatcher {
		Dispatcher::new(self)
	}

	async fn dispatch(&self, request: OperationRequest) -> Result<OperationResult> {
		let OperationRequest { provider, name, credential, config } = request;
		let (operation, client) = self.resolve(&provider, &name)?;

		operation.validate(&config)?;

		let mut input = OperationInput::new(credential, config);

		if let Some(client) = client {
			let handle = client
				.build_client(input.credential.clone(), input.config.clone())
				.await
				.map_err(|e| OperationError::ClientBuild {
					provider: provider.clone(),
					client: client.name.clone(),
					source: Box::new(e),
				})?;

			input = input.with_client(handle);
		}

		operation.execute(input).await
	}

	fn resolve(
		&self,
		provider: &ProviderType,
		name: &OperationName,
	) -> Result<(OperationDescriptor, Option<ClientDescriptor>)> {
		let state = self.state.read();

		if !state.providers.contains_key(provider) {
			return Err(RegistryError::ProviderNotFound { provider: provider.clone() }.into());
		}

		let operation = state
			.operations
			.get(provider)
			.and_then(|operations| operations.iter().find(|op| &op.name == name))
			.cloned()
			.ok_or_else(|| OperationError::NotFound {
				provider: provider.clone(),
				operation: name.clone(),
			})?;
		let client = match &operation.client {
			Some(client_name) => Some(
				state
					.clients
					.get(provider)
					.and_then(|clients| clients.iter().find(|c| &c.name == client_name))
					.cloned()
					.ok_or_else(|| OperationError::ClientNotFound {
						provider: provider.clone(),
						client: client_name.clone(),
					})?,
			),
			None => None,
		};

		Ok((operation, client))
	}
}

/// Weak handle for long-lived executors that must not keep the registry alive.
#[derive(Clone, Debug)]
pub struct Dispatcher {
	registry: Weak<Registry>,
}
impl Dispatcher {
	/// Creates a dispatcher for `registry`.
	pub fn new(registry: &Arc<Registry>) -> Self {
		Self { registry: Arc::downgrade(registry) }
	}

	/// Runs an operation, failing with [`RegistryError::RegistryUnavailable`] once the registry
	/// has been dropped.
	pub async fn run(&self, request: OperationRequest) -> Result<OperationResult> {
		self.upgrade()?.run_operation(request).await
	}

	/// Mints through the registry.
	pub async fn mint(&self, subject: CredentialSubject) -> Result<CredentialPayload> {
		self.upgrade()?.mint_payload(subject).await
	}

	/// Returns `true` when `provider` publishes an operation named `name`.
	pub fn is_registered(&self, provider: &str, name: &str) -> bool {
		self.registry.upgrade().is_some_and(|registry| {
			registry.operation_descriptors(provider).iter().any(|op| op.name == name)
		})
	}

	fn upgrade(&self) -> Result<Arc<Registry>> {
		self.registry.upgrade().ok_or_else(|| RegistryError::RegistryUnavailable.into())
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::{AtomicUsize, Ordering};
	// crates.io
	use serde_json::json;
	// self
	use super::*;
	use crate::{
		_preludet::*,
		config::ProviderSpec,
		error::AuthFlowError,
		operation::{OperationKind, OperationStatus, operation_failure},
		provider::Catalog,
	};

	#[derive(Debug)]
	struct Api {
		token: String,
	}

	fn api_client(builds: Arc<AtomicUsize>) -> ClientDescriptor {
		ClientDescriptor::new("api", "API client", move |credential: CredentialPayload, _config| {
			builds.fetch_add(1, Ordering::SeqCst);

			let token = credential.bearer_token().unwrap_or_default().to_owned();

			async move { Ok(Api { token }) }
		})
	}

	fn whoami() -> OperationDescriptor {
		OperationDescriptor::new("whoami", OperationKind::DirectoryInspect, "Echo token.", |input| {
			async move {
				let api = input.require_client::<Api>()?;

				Ok(OperationResult::ok(format!("token {}", api.token)))
			}
		})
		.with_client("api")
		.with_config_schema(json!({
			"type": "object",
			"properties": { "limit": { "type": "integer", "minimum": 1 } },
			"additionalProperties": false
		}))
	}

	async fn registry(provider: FakeProvider) -> Arc<Registry> {
		let catalog = Catalog::new([fake_builder(provider)]).expect("Catalog should build.");

		Arc::new(Registry::build([ProviderSpec::new("acme")], &catalog).await)
	}

	#[tokio::test]
	async fn runs_operation_with_built_client() {
		let builds = Arc::new(AtomicUsize::new(0));
		let registry = registry(
			FakeProvider::new("acme").with_client(api_client(builds.clone())).with_operation(whoami()),
		)
		.await;
		let result = registry
			.run_operation(
				OperationRequest::new("acme", "whoami", oauth_payload("acme", "t-1"))
					.with_config_entry("limit", 5),
			)
			.await
			.expect("Operation should run.");

		assert_eq!(result.status, OperationStatus::Ok);
		assert_eq!(result.summary, "token t-1");
		assert_eq!(builds.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn invalid_config_is_rejected_before_client_build() {
		let builds = Arc::new(AtomicUsize::new(0));
		let registry = registry(
			FakeProvider::new("acme").with_client(api_client(builds.clone())).with_operation(whoami()),
		)
		.await;
		let err = registry
			.run_operation(
				OperationRequest::new("acme", "whoami", oauth_payload("acme", "t-1"))
					.with_config_entry("limit", 0),
			)
			.await
			.expect_err("Operation should be rejected.");

		assert!(matches!(err, Error::Operation(OperationError::InvalidConfig { .. })));
		assert_eq!(builds.load(Ordering::SeqCst), 0);
	}

	#[tokio::test]
	async fn lookup_failures_are_distinct() {
		let registry = registry(FakeProvider::new("acme").with_operation(whoami())).await;
		let credential = oauth_payload("acme", "t");
		let missing_op = registry
			.run_operation(OperationRequest::new("acme", "nope", credential.clone()))
			.await
			.expect_err("Unknown operation should fail.");
		let missing_client = registry
			.run_operation(OperationRequest::new("acme", "whoami", credential.clone()))
			.await
			.expect_err("Missing client should fail.");
		let missing_provider = registry
			.run_operation(OperationRequest::new("ghost", "whoami", credential))
			.await
			.expect_err("Unknown provider should fail.");

		assert!(matches!(missing_op, Error::Operation(OperationError::NotFound { .. })));
		assert!(matches!(missing_client, Error::Operation(OperationError::ClientNotFound { .. })));
		assert!(matches!(missing_provider, Error::Registry(RegistryError::ProviderNotFound { .. })));
	}

	#[tokio::test]
	async fn client_build_failure_is_wrapped() {
		let failing = ClientDescriptor::new("api", "API client", |credential: CredentialPayload, _| {
			async move {
				Err::<Api, _>(AuthFlowError::TokenUnavailable { provider: credential.provider }.into())
			}
		});
		let registry =
			registry(FakeProvider::new("acme").with_client(failing).with_operation(whoami())).await;
		let err = registry
			.run_operation(OperationRequest::new("acme", "whoami", oauth_payload("acme", "t")))
			.await
			.expect_err("Client build should fail.");

		assert!(matches!(err, Error::Operation(OperationError::ClientBuild { .. })));
	}

	#[tokio::test]
	async fn run_failures_carry_failed_results() {
		let explicit = OperationDescriptor::new("explicit", OperationKind::ScanSettings, "", |_| async {
			let mut details = ConfigMap::new();

			details.insert("stage".into(), "scan".into());

			Err(operation_failure("scan failed", "upstream 500", details))
		});
		let implicit = OperationDescriptor::new("implicit", OperationKind::ScanSettings, "", |input| {
			async move {
				Err(AuthFlowError::TokenUnavailable { provider: input.credential.provider }.into())
			}
		});
		let registry =
			registry(FakeProvider::new("acme").with_operation(explicit).with_operation(implicit))
				.await;

		for (name, summary) in
			[("explicit", "scan failed"), ("implicit", "Credential for `acme` does not carry a usable token.")]
		{
			let err = registry
				.run_operation(OperationRequest::new("acme", name, oauth_payload("acme", "t")))
				.await
				.expect_err("Operation should fail.");
			let result = err.operation_result().expect("Failure should carry a result.");

			assert_eq!(result.status, OperationStatus::Failed);
			assert_eq!(result.summary, summary);
		}
	}

	#[tokio::test]
	async fn dispatcher_fails_once_registry_is_dropped() {
		let registry = registry(FakeProvider::new("acme").with_healthy_operation()).await;
		let dispatcher = registry.dispatcher();

		assert!(dispatcher.is_registered("acme", "health.default"));

		let result = dispatcher
			.run(OperationRequest::new("acme", "health.default", oauth_payload("acme", "t")))
			.await
			.expect("Dispatch should succeed.");

		assert_eq!(result.summary, "healthy");

		drop(registry);

		let err = dispatcher
			.run(OperationRequest::new("acme", "health.default", oauth_payload("acme", "t")))
			.await
			.expect_err("Dispatch should fail.");

		assert!(matches!(err, Error::Registry(RegistryError::RegistryUnavailable)));
		assert!(!dispatcher.is_registered("acme", "health.default"));
	}
}
