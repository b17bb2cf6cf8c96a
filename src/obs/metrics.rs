// self
use crate::obs::{FlowKind, FlowOutcome};

/// Records a flow outcome via the global metrics recorder (when enabled).
pub fn record_flow_outcome(kind: FlowKind, outcome: FlowOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"integration_registry_flow_total",
			"flow" => kind.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (kind, outcome);
	}
}

/// Records a provider build outcome via the global metrics recorder (when enabled).
pub fn record_build_outcome(provider: &str, outcome: FlowOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"integration_registry_build_total",
			"provider" => provider.to_owned(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (provider, outcome);
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn recorders_noop_without_metrics() {
		record_flow_outcome(FlowKind::Operation, FlowOutcome::Failure);
		record_build_outcome("acme", FlowOutcome::Success);
	}

	#[test]
	fn outcome_follows_result() {
		assert_eq!(FlowOutcome::of(&Ok::<(), ()>(())), FlowOutcome::Success);
		assert_eq!(FlowOutcome::of(&Err::<(), ()>(())), FlowOutcome::Failure);
	}
}
