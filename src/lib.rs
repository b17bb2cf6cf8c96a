//! Pluggable integration provider registry: OAuth2/OIDC handshakes, credential minting, pooled
//! client descriptors, and typed operation dispatch behind one uniform provider contract.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod config;
pub mod error;
pub mod http;
pub mod obs;
pub mod operation;
pub mod provider;
pub mod providers;
pub mod registry;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and fixtures for tests; enabled via `cfg(test)` or the `test`
	//! crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		auth::{CredentialPayload, CredentialSubject, OAuthToken, ProviderType},
		config::{OAuthSpec, ProviderSpec},
		operation::{ClientDescriptor, OperationDescriptor, OperationKind, OperationResult},
		provider::{
			AuthContext, AuthSession, Builder, BuilderFn, ClientProvider, OperationProvider,
			Provider, ProviderCapabilities, ProviderFuture,
		},
	};

	/// Builds an OAuth-backed [`ProviderSpec`] whose endpoints live under `base`.
	pub fn oauth_spec(provider: &str, base: &str) -> ProviderSpec {
		let url = |path: &str| {
			Url::parse(&format!("{}{path}", base.trim_end_matches('/')))
				.expect("Fixture endpoint should parse successfully.")
		};
		let oauth = OAuthSpec::new("client-fixture", url("/authorize"), url("/token"), url("/callback"))
			.with_client_secret("secret-fixture")
			.with_scopes(["read", "write"]);

		ProviderSpec::new(provider).with_oauth(oauth)
	}

	/// Builds an OAuth credential payload for `provider` carrying `access`.
	pub fn oauth_payload(provider: &str, access: &str) -> CredentialPayload {
		CredentialPayload::builder(provider)
			.oauth_token(OAuthToken::new(access))
			.build()
			.expect("Fixture payload should build successfully.")
	}

	/// In-memory provider with configurable descriptor sets.
	#[derive(Clone, Default)]
	pub struct FakeProvider {
		/// Provider type reported by [`Provider::provider_type`].
		pub provider_type: ProviderType,
		/// Client descriptors exposed when non-empty.
		pub clients: Vec<ClientDescriptor>,
		/// Operation descriptors exposed when non-empty.
		pub operations: Vec<OperationDescriptor>,
	}
	impl FakeProvider {
		/// Creates a provider without descriptors.
		pub fn new(provider_type: &str) -> Self {
			Self { provider_type: provider_type.into(), ..Default::default() }
		}

		/// Adds a client descriptor.
		pub fn with_client(mut self, descriptor: ClientDescriptor) -> Self {
			self.clients.push(descriptor);

			self
		}

		/// Adds an operation descriptor.
		pub fn with_operation(mut self, descriptor: OperationDescriptor) -> Self {
			self.operations.push(descriptor);

			self
		}

		/// Adds a `health.default` operation that always reports `ok`.
		pub fn with_healthy_operation(self) -> Self {
			self.with_operation(OperationDescriptor::new(
				"health.default",
				OperationKind::Health,
				"Always healthy.",
				|_input| async { Ok(OperationResult::ok("healthy")) },
			))
		}
	}
	impl Provider for FakeProvider {
		fn provider_type(&self) -> &ProviderType {
			&self.provider_type
		}

		fn capabilities(&self) -> ProviderCapabilities {
			ProviderCapabilities {
				supports_refresh_tokens: false,
				supports_client_pooling: !self.clients.is_empty(),
				supports_metadata_form: false,
			}
		}

		fn begin_auth(&self, _ctx: AuthContext) -> ProviderFuture<'_, Box<dyn AuthSession>> {
			let provider = self.provider_type.clone();

			Box::pin(async move {
				Err(crate::error::AuthFlowError::BeginAuthNotSupported { provider }.into())
			})
		}

		fn mint(&self, subject: CredentialSubject) -> ProviderFuture<'_, CredentialPayload> {
			Box::pin(async move { Ok(subject.credential.clone()) })
		}

		fn client_provider(&self) -> Option<&dyn ClientProvider> {
			if self.clients.is_empty() { None } else { Some(self) }
		}

		fn operation_provider(&self) -> Option<&dyn OperationProvider> {
			if self.operations.is_empty() { None } else { Some(self) }
		}
	}
	impl ClientProvider for FakeProvider {
		fn client_descriptors(&self) -> Vec<ClientDescriptor> {
			self.clients.clone()
		}
	}
	impl OperationProvider for FakeProvider {
		fn operations(&self) -> Vec<OperationDescriptor> {
			self.operations.clone()
		}
	}

	/// Builder that always yields a clone of `provider`.
	pub fn fake_builder(provider: FakeProvider) -> Arc<dyn Builder> {
		let provider_type = provider.provider_type.clone();

		Arc::new(BuilderFn::new(provider_type, move |_spec| {
			let built: Arc<dyn Provider> = Arc::new(provider.clone());

			Ok(Some(built))
		}))
	}

	/// Builder whose construction always fails.
	pub fn failing_builder(provider: &str) -> Arc<dyn Builder> {
		Arc::new(BuilderFn::new(provider, |spec| {
			Err(crate::error::ConfigError::MissingOAuthConfig {
				provider: spec.provider_type().clone(),
			}
			.into())
		}))
	}

	/// Builder that reports success without producing a provider.
	pub fn nil_builder(provider: &str) -> Arc<dyn Builder> {
		Arc::new(BuilderFn::new(provider, |_spec| Ok(None)))
	}
}

mod _prelude {
	pub use std::{
		any::Any,
		collections::BTreeMap,
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::{Arc, Weak},
	};

	pub use parking_lot::RwLock;
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize, de::DeserializeOwned};
	pub use serde_json::{Map, Value};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{BoxError, Error, Result};
}

pub use oauth2;
pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
