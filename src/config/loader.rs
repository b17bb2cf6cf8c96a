//! Sources of [`ProviderSpec`] lists.

// std
use std::{
	io::ErrorKind,
	path::{Path, PathBuf},
};
// crates.io
use tokio::fs;
// self
use crate::{_prelude::*, config::ProviderSpec};

/// Boxed future returned by [`SpecLoader::load`].
pub type LoaderFuture<'a> =
	Pin<Box<dyn Future<Output = Result<Vec<ProviderSpec>, LoaderError>> + 'a + Send>>;

/// Errors raised while loading provider specs.
#[derive(Debug, ThisError)]
pub enum LoaderError {
	/// Spec file could not be read.
	#[error("Failed to read provider specs from {}.", .path.display())]
	Io {
		/// File that failed to load.
		path: PathBuf,
		/// Underlying IO failure.
		#[source]
		source: std::io::Error,
	},
	/// Spec file contents are not a valid spec list.
	#[error("Failed to parse provider specs from {} at `{}`.", .path.display(), .source.path())]
	Parse {
		/// File that failed to parse.
		path: PathBuf,
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
}

/// Supplies provider specs to the registry.
pub trait SpecLoader: Send + Sync {
	/// Loads the current spec list.
	fn load(&self) -> LoaderFuture<'_>;
}

/// Loader over a fixed, in-memory spec list.
#[derive(Clone, Debug, Default)]
pub struct StaticLoader(Vec<ProviderSpec>);
impl StaticLoader {
	/// Wraps the provided specs.
	pub fn new(specs: impl IntoIterator<Item = ProviderSpec>) -> Self {
		Self(specs.into_iter().collect())
	}
}
impl SpecLoader for StaticLoader {
	fn load(&self) -> LoaderFuture<'_> {
		let specs = self.0.clone();

		Box::pin(async move { Ok(specs) })
	}
}

/// Loader reading a JSON array of specs from disk.
///
/// A missing or empty file yields an empty list. Reads go through [`tokio::fs`] so loading never
/// blocks a runtime worker.
#[derive(Clone, Debug)]
pub struct JsonFileLoader {
	path: PathBuf,
}
impl JsonFileLoader {
	/// Creates a loader for `path`.
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	/// Returns the configured path.
	pub fn path(&self) -> &Path {
		&self.path
	}

	async fn read(path: &Path) -> Result<Vec<ProviderSpec>, LoaderError> {
		let bytes = match fs::read(path).await {
			Ok(bytes) => bytes,
			Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
			Err(e) => return Err(LoaderError::Io { path: path.to_owned(), source: e }),
		};

		if bytes.iter().all(u8::is_ascii_whitespace) {
			return Ok(Vec::new());
		}

		let de = &mut serde_json::Deserializer::from_slice(&bytes);

		serde_path_to_error::deserialize(de)
			.map_err(|e| LoaderError::Parse { path: path.to_owned(), source: e })
	}
}
impl SpecLoader for JsonFileLoader {
	fn load(&self) -> LoaderFuture<'_> {
		Box::pin(Self::read(&self.path))
	}
}
