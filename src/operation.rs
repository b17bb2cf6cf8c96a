//! Client and operation descriptors plus the dispatch contract they plug into.
//!
//! Descriptors are plain data with boxed function slots so providers can publish them without
//! exposing concrete client types. [`sanitize_client_descriptors`] and
//! [`sanitize_operation_descriptors`] drop invalid entries and backfill the owning provider.

pub mod helpers;
pub mod schema;

pub use helpers::*;
pub use schema::*;

// self
use crate::{
	_prelude::*,
	auth::{ClientName, CredentialPayload, OperationName, ProviderType},
	error::OperationError,
};

/// Free-form operation or client configuration.
pub type ConfigMap = Map<String, Value>;
/// Type-erased pooled client handed to operation runs.
pub type ClientHandle = Arc<dyn Any + Send + Sync>;
/// Boxed future returned by [`ClientBuildFn`].
pub type ClientFuture = Pin<Box<dyn Future<Output = Result<ClientHandle>> + Send>>;
/// Client construction function stored in a [`ClientDescriptor`].
pub type ClientBuildFn = Arc<dyn Fn(CredentialPayload, ConfigMap) -> ClientFuture + Send + Sync>;
/// Boxed future returned by [`OperationRunFn`].
pub type OperationFuture = Pin<Box<dyn Future<Output = Result<OperationResult>> + Send>>;
/// Operation body stored in an [`OperationDescriptor`].
pub type OperationRunFn = Arc<dyn Fn(OperationInput) -> OperationFuture + Send + Sync>;

/// Closed set of operation kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
	/// Connectivity and credential check.
	Health,
	/// Security finding collection.
	CollectFindings,
	/// Configuration and settings scan.
	ScanSettings,
	/// Outbound message delivery.
	MessageSend,
	/// Directory, user, or repository inventory.
	DirectoryInspect,
	/// Vulnerability alert collection.
	VulnerabilitiesCollect,
}
impl OperationKind {
	/// Returns the stable label used in descriptors and logs.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Health => "health",
			Self::CollectFindings => "collect_findings",
			Self::ScanSettings => "scan_settings",
			Self::MessageSend => "message_send",
			Self::DirectoryInspect => "directory_inspect",
			Self::VulnerabilitiesCollect => "vulnerabilities_collect",
		}
	}
}
impl Display for OperationKind {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome status of an operation run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
	/// Run completed successfully.
	Ok,
	/// Run failed.
	Failed,
	/// Outcome could not be determined.
	#[default]
	Unknown,
}
impl OperationStatus {
	/// Returns the stable label.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Ok => "ok",
			Self::Failed => "failed",
			Self::Unknown => "unknown",
		}
	}
}

/// Result reported by an operation run.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationResult {
	/// Outcome status.
	pub status: OperationStatus,
	/// One-line human-readable summary.
	pub summary: String,
	/// Structured details for UI and observability.
	#[serde(default, skip_serializing_if = "Map::is_empty")]
	pub details: ConfigMap,
}
impl OperationResult {
	/// Successful result.
	pub fn ok(summary: impl Into<String>) -> Self {
		Self { status: OperationStatus::Ok, summary: summary.into(), details: Map::new() }
	}

	/// Failed result.
	pub fn failed(summary: impl Into<String>) -> Self {
		Self { status: OperationStatus::Failed, summary: summary.into(), details: Map::new() }
	}

	/// Result with an undetermined outcome.
	pub fn unknown(summary: impl Into<String>) -> Self {
		Self { status: OperationStatus::Unknown, summary: summary.into(), details: Map::new() }
	}

	/// Adds one detail entry.
	pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
		self.details.insert(key.into(), value.into());

		self
	}

	/// Merges detail entries.
	pub fn with_details(mut self, details: ConfigMap) -> Self {
		self.details.extend(details);

		self
	}
}

/// Input handed to an operation run.
#[derive(Clone)]
pub struct OperationInput {
	/// Credential to act with.
	pub credential: CredentialPayload,
	/// Operation configuration, already validated against the descriptor schema.
	pub config: ConfigMap,
	/// Pooled client built from the referenced client descriptor, if any.
	pub client: Option<ClientHandle>,
}
impl OperationInput {
	/// Creates an input without a client.
	pub fn new(credential: CredentialPayload, config: ConfigMap) -> Self {
		Self { credential, config, client: None }
	}

	/// Attaches a pooled client.
	pub fn with_client(mut self, client: ClientHandle) -> Self {
		self.client = Some(client);

		self
	}

	/// Returns the client when it has type `T`.
	pub fn client<T>(&self) -> Option<&T>
	where
		T: 'static + Any + Send + Sync,
	{
		self.client.as_deref()?.downcast_ref::<T>()
	}

	/// Returns the client of type `T` or [`OperationError::ClientRequired`].
	pub fn require_client<T>(&self) -> Result<&T, OperationError>
	where
		T: 'static + Any + Send + Sync,
	{
		self.client::<T>()
			.ok_or(OperationError::ClientRequired { expected: std::any::type_name::<T>() })
	}
}
impl Debug for OperationInput {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("OperationInput")
			.field("credential", &self.credential)
			.field("config", &self.config)
			.field("client", &self.client.as_ref().map(|_| ".."))
			.finish()
	}
}

/// Pooled API client a provider can construct.
#[derive(Clone)]
pub struct ClientDescriptor {
	/// Owning provider; backfilled during sanitization when blank.
	pub provider: ProviderType,
	/// Client name referenced by operations.
	pub name: ClientName,
	/// Human-readable description.
	pub description: String,
	/// JSON schema for client configuration.
	pub config_schema: Option<Value>,
	/// Construction function; descriptors without one are invalid.
	pub build: Option<ClientBuildFn>,
}
impl ClientDescriptor {
	/// Creates a descriptor whose builder returns a concrete client type `C`.
	pub fn new<F, Fut, C>(name: impl Into<ClientName>, description: impl Into<String>, build: F) -> Self
	where
		F: 'static + Fn(CredentialPayload, ConfigMap) -> Fut + Send + Sync,
		Fut: 'static + Future<Output = Result<C>> + Send,
		C: 'static + Any + Send + Sync,
	{
		let build: ClientBuildFn =
			Arc::new(move |credential: CredentialPayload, config: ConfigMap| -> ClientFuture {
				let built = build(credential, config);

				Box::pin(async move { built.await.map(|client| Arc::new(client) as ClientHandle) })
			});

		Self {
			provider: ProviderType::default(),
			name: name.into(),
			description: description.into(),
			config_schema: None,
			build: Some(build),
		}
	}

	/// Sets the owning provider.
	pub fn with_provider(mut self, provider: impl Into<ProviderType>) -> Self {
		self.provider = provider.into();

		self
	}

	/// Sets the configuration schema.
	pub fn with_config_schema(mut self, schema: Value) -> Self {
		self.config_schema = Some(schema);

		self
	}

	/// Returns `true` when the descriptor has a name and a build function.
	pub fn is_valid(&self) -> bool {
		!self.name.is_blank() && self.build.is_some()
	}

	/// Builds a client for `credential`.
	pub async fn build_client(
		&self,
		credential: CredentialPayload,
		config: ConfigMap,
	) -> Result<ClientHandle> {
		let build = self.build.clone().ok_or_else(|| OperationError::ClientNotFound {
			provider: self.provider.clone(),
			client: self.name.clone(),
		})?;

		build(credential, config).await
	}
}
impl Debug for ClientDescriptor {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ClientDescriptor")
			.field("provider", &self.provider)
			.field("name", &self.name)
			.field("description", &self.description)
			.field("config_schema", &self.config_schema)
			.field("build", &self.build.as_ref().map(|_| ".."))
			.finish()
	}
}

/// Named, invocable action published by a provider.
#[derive(Clone)]
pub struct OperationDescriptor {
	/// Owning provider; backfilled during sanitization when blank.
	pub provider: ProviderType,
	/// Operation name (e.g. `health.default`).
	pub name: OperationName,
	/// Operation kind.
	pub kind: OperationKind,
	/// Human-readable description.
	pub description: String,
	/// Client descriptor the run expects, if any.
	pub client: Option<ClientName>,
	/// JSON schema the configuration must satisfy before the run starts.
	pub config_schema: Option<Value>,
	/// Operation body; descriptors without one are invalid.
	pub run: Option<OperationRunFn>,
}
impl OperationDescriptor {
	/// Creates a descriptor from an async run function.
	pub fn new<F, Fut>(
		name: impl Into<OperationName>,
		kind: OperationKind,
		description: impl Into<String>,
		run: F,
	) -> Self
	where
		F: 'static + Fn(OperationInput) -> Fut + Send + Sync,
		Fut: 'static + Future<Output = Result<OperationResult>> + Send,
	{
		let run: OperationRunFn =
			Arc::new(move |input: OperationInput| -> OperationFuture { Box::pin(run(input)) });

		Self {
			provider: ProviderType::default(),
			name: name.into(),
			kind,
			description: description.into(),
			client: None,
			config_schema: None,
			run: Some(run),
		}
	}

	/// Sets the owning provider.
	pub fn with_provider(mut self, provider: impl Into<ProviderType>) -> Self {
		self.provider = provider.into();

		self
	}

	/// References a client descriptor by name.
	pub fn with_client(mut self, client: impl Into<ClientName>) -> Self {
		self.client = Some(client.into());

		self
	}

	/// Sets the configuration schema.
	pub fn with_config_schema(mut self, schema: Value) -> Self {
		self.config_schema = Some(schema);

		self
	}

	/// Returns `true` when the descriptor has a name and a run function.
	pub fn is_valid(&self) -> bool {
		!self.name.is_blank() && self.run.is_some()
	}

	/// Checks `config` against the descriptor schema; descriptors without one accept anything.
	pub fn validate(&self, config: &ConfigMap) -> Result<(), OperationError> {
		match &self.config_schema {
			Some(schema) => validate_config(schema, config),
			None => Ok(()),
		}
	}

	/// Validates `input.config` against the schema, then runs the operation.
	pub async fn invoke(&self, input: OperationInput) -> Result<OperationResult> {
		self.validate(&input.config)?;
		self.execute(input).await
	}

	/// Runs the operation without validating its config.
	///
	/// Errors that do not already carry an [`OperationResult`] are wrapped into
	/// [`OperationError::Failed`] so callers always receive a failed result.
	pub(crate) async fn execute(&self, input: OperationInput) -> Result<OperationResult> {
		let run = self.run.clone().ok_or_else(|| OperationError::NotFound {
			provider: self.provider.clone(),
			operation: self.name.clone(),
		})?;

		match run(input).await {
			Ok(result) => Ok(result),
			Err(e) if e.operation_result().is_some() => Err(e),
			Err(e) => Err(OperationError::Failed {
				result: Box::new(OperationResult::failed(e.to_string())),
				source: Box::new(e),
			}
			.into()),
		}
	}
}
impl Debug for OperationDescriptor {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("OperationDescriptor")
			.field("provider", &self.provider)
			.field("name", &self.name)
			.field("kind", &self.kind)
			.field("description", &self.description)
			.field("client", &self.client)
			.field("config_schema", &self.config_schema)
			.field("run", &self.run.as_ref().map(|_| ".."))
			.finish()
	}
}

/// Drops invalid client descriptors and backfills the owning provider.
pub fn sanitize_client_descriptors(
	provider: &ProviderType,
	descriptors: Vec<ClientDescriptor>,
) -> Vec<ClientDescriptor> {
	descriptors
		.into_iter()
		.filter(ClientDescriptor::is_valid)
		.map(|mut descriptor| {
			if descriptor.provider.is_blank() {
				descriptor.provider = provider.clone();
			}

			descriptor
		})
		.collect()
}

/// Drops invalid operation descriptors and backfills the owning provider.
pub fn sanitize_operation_descriptors(
	provider: &ProviderType,
	descriptors: Vec<OperationDescriptor>,
) -> Vec<OperationDescriptor> {
	descriptors
		.into_iter()
		.filter(OperationDescriptor::is_valid)
		.map(|mut descriptor| {
			if descriptor.provider.is_blank() {
				descriptor.provider = provider.clone();
			}

			descriptor
		})
		.collect()
}
