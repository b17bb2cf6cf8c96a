// self
use crate::{_prelude::*, obs::FlowKind};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedFlow<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedFlow<F> = F;

/// A span builder used by registry flows.
#[derive(Clone, Debug)]
pub struct FlowSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl FlowSpan {
	/// Creates a new span tagged with the flow kind, stage, and provider type.
	pub fn new(kind: FlowKind, stage: &'static str, provider: &str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!(
				"integration_registry.flow",
				flow = kind.as_str(),
				stage,
				provider
			);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, stage, provider);

			Self {}
		}
	}

	/// Enters the span for synchronous sections.
	pub fn entered(self) -> FlowSpanGuard {
		#[cfg(feature = "tracing")]
		{
			FlowSpanGuard { guard: self.span.entered() }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = self;

			FlowSpanGuard {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedFlow<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

/// RAII guard returned by [`FlowSpan::entered`].
pub struct FlowSpanGuard {
	#[cfg(feature = "tracing")]
	#[allow(dead_code)]
	guard: tracing::span::EnteredSpan,
}
impl Debug for FlowSpanGuard {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("FlowSpanGuard(..)")
	}
}

/// Logs a provider that was registered.
pub fn log_registered(provider: &str, clients: usize, operations: usize) {
	#[cfg(feature = "tracing")]
	tracing::debug!(provider, clients, operations, "provider registered");
	#[cfg(not(feature = "tracing"))]
	let _ = (provider, clients, operations);
}

/// Logs a spec that was left out of dispatch.
pub fn log_skipped(provider: &str, reason: &'static str) {
	#[cfg(feature = "tracing")]
	tracing::info!(provider, reason, "provider spec skipped");
	#[cfg(not(feature = "tracing"))]
	let _ = (provider, reason);
}

/// Logs a provider whose build failed; the registry keeps going.
pub fn log_build_failure(provider: &str, error: &dyn StdError) {
	#[cfg(feature = "tracing")]
	tracing::warn!(provider, error = %error, "provider build failed");
	#[cfg(not(feature = "tracing"))]
	let _ = (provider, error);
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn flow_span_noop_without_subscriber() {
		let _guard = FlowSpan::new(FlowKind::Build, "test", "acme").entered();

		log_registered("acme", 1, 2);
		log_skipped("acme", "inactive");
	}

	#[tokio::test]
	async fn instrument_wraps_future() {
		let span = FlowSpan::new(FlowKind::Mint, "instrument_wraps_future", "acme");
		let value = span.instrument(async { 42 }).await;

		assert_eq!(value, 42);
	}
}
