//! Provider builders and the catalog that indexes them by provider type.

// self
use crate::{
	_prelude::*,
	auth::ProviderType,
	config::{AuthKind, ProviderSpec},
	error::{ConfigError, RegistryError},
	provider::{Provider, ProviderFuture},
};

/// Boxed future returned by [`Builder::build`]; `None` signals a builder that produced nothing.
pub type BuildFuture<'a> = ProviderFuture<'a, Option<Arc<dyn Provider>>>;

/// Constructs providers of one type from specs.
pub trait Builder: Send + Sync {
	/// Provider type this builder serves.
	fn provider_type(&self) -> &ProviderType;

	/// Builds a provider from `spec`.
	fn build<'a>(&'a self, spec: &'a ProviderSpec) -> BuildFuture<'a>;
}

type BuildFn = dyn Fn(&ProviderSpec) -> Result<Option<Arc<dyn Provider>>> + Send + Sync;

/// [`Builder`] backed by a synchronous closure.
#[derive(Clone)]
pub struct BuilderFn {
	provider_type: ProviderType,
	build: Arc<BuildFn>,
}
impl BuilderFn {
	/// Wraps `build` as the builder for `provider_type`.
	pub fn new<F>(provider_type: impl Into<ProviderType>, build: F) -> Self
	where
		F: 'static + Fn(&ProviderSpec) -> Result<Option<Arc<dyn Provider>>> + Send + Sync,
	{
		Self { provider_type: provider_type.into(), build: Arc::new(build) }
	}
}
impl Builder for BuilderFn {
	fn provider_type(&self) -> &ProviderType {
		&self.provider_type
	}

	fn build<'a>(&'a self, spec: &'a ProviderSpec) -> BuildFuture<'a> {
		let built = (self.build)(spec);

		Box::pin(async move { built })
	}
}
impl Debug for BuilderFn {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("BuilderFn").field("provider_type", &self.provider_type).finish()
	}
}

/// Ensures the spec declares one of the auth kinds a builder supports.
pub fn ensure_auth_kind(spec: &ProviderSpec, supported: &[AuthKind]) -> Result<(), ConfigError> {
	match supported.first() {
		Some(_) if supported.contains(&spec.auth_kind) => Ok(()),
		Some(expected) => Err(ConfigError::AuthKindMismatch {
			provider: spec.provider_type.clone(),
			expected: *expected,
			found: spec.auth_kind,
		}),
		None => Ok(()),
	}
}

/// Ordered set of builders with unique provider types.
#[derive(Clone, Default)]
pub struct Catalog {
	builders: Vec<Arc<dyn Builder>>,
}
impl Catalog {
	/// Creates a catalog, rejecting blank or duplicated provider types.
	pub fn new(builders: impl IntoIterator<Item = Arc<dyn Builder>>) -> Result<Self> {
		builders.into_iter().try_fold(Self::default(), Self::with)
	}

	/// Appends a builder, rejecting blank or duplicated provider types.
	pub fn with(mut self, builder: Arc<dyn Builder>) -> Result<Self> {
		let provider_type = builder.provider_type();

		if provider_type.is_blank() {
			return Err(RegistryError::ProviderTypeRequired.into());
		}
		if self.get(provider_type).is_some() {
			return Err(ConfigError::DuplicateBuilder { provider: provider_type.clone() }.into());
		}

		self.builders.push(builder);

		Ok(self)
	}

	/// Returns the builder registered for `provider_type`.
	pub fn get(&self, provider_type: &str) -> Option<&Arc<dyn Builder>> {
		self.builders.iter().find(|builder| builder.provider_type() == provider_type)
	}

	/// Iterates builders in registration order.
	pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Builder>> {
		self.builders.iter()
	}

	/// Provider types served by the catalog, in registration order.
	pub fn provider_types(&self) -> Vec<ProviderType> {
		self.builders.iter().map(|builder| builder.provider_type().clone()).collect()
	}

	/// Number of builders.
	pub fn len(&self) -> usize {
		self.builders.len()
	}

	/// Returns `true` when the catalog holds no builders.
	pub fn is_empty(&self) -> bool {
		self.builders.is_empty()
	}
}
impl Debug for Catalog {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Catalog").field("provider_types", &self.provider_types()).finish()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::_preludet::*;

	#[test]
	fn catalog_rejects_duplicates_and_blank_types() {
		let catalog =
			Catalog::new([nil_builder("github"), nil_builder("slack")]).expect("Catalog should build.");

		assert_eq!(catalog.provider_types(), vec![ProviderType::from("github"), "slack".into()]);
		assert!(catalog.get("slack").is_some());
		assert!(catalog.get("vercel").is_none());

		let err = catalog.clone().with(nil_builder("github")).expect_err("Duplicate should fail.");

		assert!(matches!(err, Error::Config(ConfigError::DuplicateBuilder { .. })));

		let err = Catalog::new([nil_builder(" ")]).expect_err("Blank type should fail.");

		assert!(matches!(err, Error::Registry(RegistryError::ProviderTypeRequired)));
	}

	#[tokio::test]
	async fn builder_fn_forwards_spec() {
		let builder = BuilderFn::new("github", |spec| {
			let provider: Arc<dyn Provider> = Arc::new(FakeProvider::new(spec.provider_type()));

			Ok(Some(provider))
		});
		let spec = ProviderSpec::new("github");
		let provider = builder
			.build(&spec)
			.await
			.expect("Build should succeed.")
			.expect("Builder should yield a provider.");

		assert_eq!(provider.provider_type(), "github");
	}

	#[test]
	fn auth_kind_guard_reports_first_supported_kind() {
		let spec = ProviderSpec::new("api_token");

		assert!(ensure_auth_kind(&spec, &[AuthKind::OAuth2, AuthKind::Oidc]).is_ok());

		let err = ensure_auth_kind(&spec, &[AuthKind::ApiToken]).expect_err("Mismatch should fail.");

		assert!(matches!(
			err,
			ConfigError::AuthKindMismatch { expected: AuthKind::ApiToken, found: AuthKind::OAuth2, .. }
		));
	}
}
