//! Optional observability helpers for registry flows.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `integration_registry.flow` with the `flow`,
//!   `stage` (call site), and `provider` fields, plus registry build logs.
//! - Enable `metrics` to increment the `integration_registry_flow_total` counter for every
//!   attempt/success/failure, labeled by `flow` + `outcome`, and the
//!   `integration_registry_build_total` counter labeled by `provider` + `outcome`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Flow kinds observed by the registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// Authorization URL and session creation.
	BeginAuth,
	/// Authorization code exchange.
	Finish,
	/// Credential minting and token refresh.
	Mint,
	/// Provider construction during registry build or upsert.
	Build,
	/// Operation dispatch.
	Operation,
}
impl FlowKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::BeginAuth => "begin_auth",
			FlowKind::Finish => "finish",
			FlowKind::Mint => "mint",
			FlowKind::Build => "build",
			FlowKind::Operation => "operation",
		}
	}
}
impl Display for FlowKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// Entry to a registry helper.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::Success => "success",
			FlowOutcome::Failure => "failure",
		}
	}

	/// Maps a result onto [`FlowOutcome::Success`] or [`FlowOutcome::Failure`].
	pub fn of<T, E>(result: &Result<T, E>) -> Self {
		if result.is_ok() { FlowOutcome::Success } else { FlowOutcome::Failure }
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Records the terminal outcome of `result` for `kind`.
pub fn record_flow_result<T, E>(kind: FlowKind, result: &Result<T, E>) {
	record_flow_outcome(kind, FlowOutcome::of(result));
}
