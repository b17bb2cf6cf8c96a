//! Opaque names used to key providers, clients, and operations.

// std
use std::{borrow::Borrow, ops::Deref};
// self
use crate::_prelude::*;

macro_rules! def_name {
	($name:ident, $doc:literal, $kind:literal) => {
		#[doc = $doc]
		#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
		#[serde(transparent)]
		pub struct $name(String);
		impl $name {
			/// Wraps the provided value; names are compared by exact string equality.
			pub fn new(value: impl Into<String>) -> Self {
				Self(value.into())
			}

			/// Returns the name as a string slice.
			pub fn as_str(&self) -> &str {
				&self.0
			}

			/// Returns `true` when the name is empty or whitespace only.
			pub fn is_blank(&self) -> bool {
				self.0.trim().is_empty()
			}
		}
		impl Deref for $name {
			type Target = str;

			fn deref(&self) -> &Self::Target {
				&self.0
			}
		}
		impl AsRef<str> for $name {
			fn as_ref(&self) -> &str {
				&self.0
			}
		}
		impl Borrow<str> for $name {
			fn borrow(&self) -> &str {
				&self.0
			}
		}
		impl From<&str> for $name {
			fn from(value: &str) -> Self {
				Self(value.to_owned())
			}
		}
		impl From<String> for $name {
			fn from(value: String) -> Self {
				Self(value)
			}
		}
		impl From<&$name> for $name {
			fn from(value: &$name) -> Self {
				value.clone()
			}
		}
		impl From<$name> for String {
			fn from(value: $name) -> Self {
				value.0
			}
		}
		impl PartialEq<str> for $name {
			fn eq(&self, other: &str) -> bool {
				self.0 == other
			}
		}
		impl PartialEq<&str> for $name {
			fn eq(&self, other: &&str) -> bool {
				self.0 == *other
			}
		}
		impl Debug for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				write!(f, concat!($kind, "({})"), self.0)
			}
		}
		impl Display for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				f.write_str(&self.0)
			}
		}
	};
}

def_name! { ProviderType, "Identifier of an integration provider family (e.g. `github`).", "ProviderType" }
def_name! { ClientName, "Name of a pooled client published by a provider.", "ClientName" }
def_name! { OperationName, "Name of an operation published by a provider (e.g. `health.default`).", "OperationName" }
