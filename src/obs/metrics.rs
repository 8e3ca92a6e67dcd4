// self
use crate::{
	auth::PlatformId,
	obs::{FlowKind, FlowOutcome},
};

/// Records a flow outcome via the global metrics recorder (when enabled).
pub fn record_flow_outcome(kind: FlowKind, outcome: FlowOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"platform_broker_flow_total",
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

/// Counts identity documents the descriptor could not extract a user id from.
pub fn record_identity_fault(platform: &PlatformId) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!("platform_broker_identity_fault_total", "platform" => platform.to_string())
			.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = platform;
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn recorders_noop_without_an_installed_recorder() {
		record_flow_outcome(FlowKind::Callback, FlowOutcome::Failure);
		record_identity_fault(&PlatformId::new("github").expect("Platform fixture should be valid."));
	}
}
