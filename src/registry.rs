//! Composition root owning built providers, their specs, and their descriptor catalogs.
//!
//! [`Registry::build`] turns specs plus a [`Catalog`] into live providers. A spec whose builder
//! fails (or yields nothing) is marked inactive and recorded in [`Registry::build_failures`];
//! it never aborts construction. All read APIs return owned copies so callers can never alias
//! registry internals, and no lock is held across an `.await`.

pub mod dispatch;

pub use dispatch::*;

// self
use crate::{
	_prelude::*,
	auth::{CredentialPayload, CredentialSubject, ProviderType},
	config::{ProviderSpec, SpecLoader},
	error::RegistryError,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	operation::{
		ClientDescriptor, OperationDescriptor, sanitize_client_descriptors,
		sanitize_operation_descriptors,
	},
	provider::{AuthContext, AuthSession, Builder, Catalog, Provider},
};

#[derive(Default)]
struct RegistryState {
	configs: BTreeMap<ProviderType, ProviderSpec>,
	providers: BTreeMap<ProviderType, Arc<dyn Provider>>,
	clients: BTreeMap<ProviderType, Vec<ClientDescriptor>>,
	operations: BTreeMap<ProviderType, Vec<OperationDescriptor>>,
	failures: BTreeMap<ProviderType, String>,
}
impl RegistryState {
	fn install(&mut self, spec: ProviderSpec, provider: Arc<dyn Provider>) {
		let provider_type = spec.provider_type.clone();
		let clients = provider
			.client_provider()
			.map(|p| sanitize_client_descriptors(&provider_type, p.client_descriptors()));
		let operations = provider
			.operation_provider()
			.map(|p| sanitize_operation_descriptors(&provider_type, p.operations()));

		obs::log_registered(
			&provider_type,
			clients.as_ref().map_or(0, Vec::len),
			operations.as_ref().map_or(0, Vec::len),
		);

		match clients {
			Some(clients) => self.clients.insert(provider_type.clone(), clients),
			None => self.clients.remove(&provider_type),
		};
		match operations {
			Some(operations) => self.operations.insert(provider_type.clone(), operations),
			None => self.operations.remove(&provider_type),
		};

		self.failures.remove(&provider_type);
		self.providers.insert(provider_type.clone(), provider);
		self.configs.insert(provider_type, spec);
	}

	fn evict(&mut self, provider_type: &ProviderType) {
		self.providers.remove(provider_type);
		self.clients.remove(provider_type);
		self.operations.remove(provider_type);
	}
}

/// Registry of live providers keyed by [`ProviderType`].
#[derive(Default)]
pub struct Registry {
	state: RwLock<RegistryState>,
}
impl Registry {
	/// Creates an empty registry.
	pub fn new() -> Self {
		Self::default()
	}

	/// Builds every spec with its catalog builder.
	///
	/// Specs with a blank type are ignored. Inactive specs and specs without a builder are
	/// retained for introspection only. Build failures deactivate the spec and are recorded.
	pub async fn build(specs: impl IntoIterator<Item = ProviderSpec>, catalog: &Catalog) -> Self {
		let mut state = RegistryState::default();

		for mut spec in specs {
			let provider_type = spec.provider_type.clone();

			if provider_type.is_blank() {
				obs::log_skipped(&provider_type, "blank provider type");

				continue;
			}
			if !spec.active {
				obs::log_skipped(&provider_type, "inactive");
				state.evict(&provider_type);
				state.configs.insert(provider_type, spec);

				continue;
			}

			let Some(builder) = catalog.get(&provider_type) else {
				obs::log_skipped(&provider_type, "no builder");
				state.evict(&provider_type);
				state.configs.insert(provider_type, spec);

				continue;
			};

			match build_provider(builder.as_ref(), &spec).await {
				Ok(provider) => state.install(spec, provider),
				Err(e) => {
					obs::log_build_failure(&provider_type, &e);
					spec.active = false;
					state.evict(&provider_type);
					state.failures.insert(provider_type.clone(), e.to_string());
					state.configs.insert(provider_type, spec);
				},
			}
		}

		Self { state: RwLock::new(state) }
	}

	/// Loads specs from `loader`, then builds them.
	pub async fn from_loader(loader: &dyn SpecLoader, catalog: &Catalog) -> Result<Self> {
		let specs = loader.load().await?;

		Ok(Self::build(specs, catalog).await)
	}

	/// Returns the live provider registered for `provider_type`.
	pub fn provider(&self, provider_type: &str) -> Option<Arc<dyn Provider>> {
		self.state.read().providers.get(provider_type).cloned()
	}

	/// Returns the spec recorded for `provider_type`, including inactive ones.
	pub fn config(&self, provider_type: &str) -> Option<ProviderSpec> {
		self.state.read().configs.get(provider_type).cloned()
	}

	/// Returns every recorded spec keyed by provider type.
	pub fn provider_configs(&self) -> BTreeMap<ProviderType, ProviderSpec> {
		self.state.read().configs.clone()
	}

	/// Provider types with a live provider, in order.
	pub fn provider_types(&self) -> Vec<ProviderType> {
		self.state.read().providers.keys().cloned().collect()
	}

	/// Client descriptors for `provider_type`; empty when none are published.
	pub fn client_descriptors(&self, provider_type: &str) -> Vec<ClientDescriptor> {
		self.state.read().clients.get(provider_type).cloned().unwrap_or_default()
	}

	/// Client descriptors for every provider that publishes them.
	pub fn client_descriptor_catalog(&self) -> BTreeMap<ProviderType, Vec<ClientDescriptor>> {
		self.state.read().clients.clone()
	}

	/// Operation descriptors for `provider_type`; empty when none are published.
	pub fn operation_descriptors(&self, provider_type: &str) -> Vec<OperationDescriptor> {
		self.state.read().operations.get(provider_type).cloned().unwrap_or_default()
	}

	/// Operation descriptors for every provider that publishes them.
	pub fn operation_descriptor_catalog(&self) -> BTreeMap<ProviderType, Vec<OperationDescriptor>> {
		self.state.read().operations.clone()
	}

	/// Build failure messages keyed by provider type.
	pub fn build_failures(&self) -> BTreeMap<ProviderType, String> {
		self.state.read().failures.clone()
	}

	/// Starts interactive authorization with the provider registered for `provider_type`.
	pub async fn begin_auth(
		&self,
		provider_type: &str,
		ctx: AuthContext,
	) -> Result<Box<dyn AuthSession>> {
		let provider = self.require_provider(provider_type)?;

		provider.begin_auth(ctx).await
	}

	/// Forwards `subject` to its provider's [`Provider::mint`].
	pub async fn mint_payload(&self, subject: CredentialSubject) -> Result<CredentialPayload> {
		let provider = self.require_provider(&subject.provider)?;

		provider.mint(subject).await
	}

	/// Builds `spec` with `builder` and replaces every entry for its provider type.
	///
	/// Unlike [`Registry::build`] this fails fast: nothing changes unless the build succeeds.
	/// An inactive spec is never built; it evicts the live provider and is stored as-is.
	pub async fn upsert_provider(&self, spec: ProviderSpec, builder: &dyn Builder) -> Result<()> {
		if spec.provider_type.is_blank() {
			return Err(RegistryError::ProviderTypeRequired.into());
		}
		if builder.provider_type() != &spec.provider_type {
			return Err(RegistryError::BuilderMismatch {
				expected: spec.provider_type.clone(),
				found: builder.provider_type().clone(),
			}
			.into());
		}
		if !spec.active {
			let provider_type = spec.provider_type.clone();
			let mut state = self.state.write();

			obs::log_skipped(&provider_type, "inactive");
			state.evict(&provider_type);
			state.failures.remove(&provider_type);
			state.configs.insert(provider_type, spec);

			return Ok(());
		}

		let provider = build_provider(builder, &spec).await?;

		self.state.write().install(spec, provider);

		Ok(())
	}

	fn require_provider(&self, provider_type: &str) -> Result<Arc<dyn Provider>> {
		self.provider(provider_type).ok_or_else(|| {
			RegistryError::ProviderNotFound { provider: ProviderType::new(provider_type) }.into()
		})
	}
}
impl Debug for Registry {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let state = self.state.read();

		f.debug_struct("Registry")
			.field("configs", &state.configs.keys().collect::<Vec<_>>())
			.field("providers", &state.providers.keys().collect::<Vec<_>>())
			.field("failures", &state.failures)
			.finish()
	}
}

async fn build_provider(builder: &dyn Builder, spec: &ProviderSpec) -> Result<Arc<dyn Provider>> {
	let span = FlowSpan::new(FlowKind::Build, "build_provider", &spec.provider_type);

	span.instrument(async move {
		obs::record_flow_outcome(FlowKind::Build, FlowOutcome::Attempt);

		let provider = spec.provider_type.clone();
		let result = match builder.build(spec).await {
			Ok(Some(built)) => Ok(built),
			Ok(None) => Err(RegistryError::ProviderNil { provider }.into()),
			Err(e) => Err(RegistryError::ProviderBuildFailed { provider, source: Box::new(e) }.into()),
		};

		obs::record_flow_result(FlowKind::Build, &result);
		obs::record_build_outcome(&spec.provider_type, FlowOutcome::of(&result));

		result
	})
	.await
}
