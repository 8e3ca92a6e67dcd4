// self
use crate::{
	_prelude::*,
	auth::{PlatformId, TokenKey},
	error::IdentityError,
	obs::FlowKind,
	platform::ExchangeStage,
};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedFlow<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedFlow<F> = F;

/// A span builder used by broker flows.
#[derive(Clone, Debug)]
pub struct FlowSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl FlowSpan {
	/// Creates a new span tagged with the provided flow kind + stage.
	pub fn new(kind: FlowKind, stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!("platform_broker.flow", flow = kind.as_str(), stage);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, stage);

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

/// Logs a rejected correlation state. The caller only ever sees a generic error, so the
/// reason lives here.
pub fn security_event(reason: &'static str) {
	#[cfg(feature = "tracing")]
	tracing::warn!(target: "platform_broker::security", reason, "correlation state rejected");
	#[cfg(not(feature = "tracing"))]
	let _ = reason;
}

/// Logs a descriptor whose user id path did not match the platform response.
pub fn identity_fault(platform: &PlatformId, error: &IdentityError) {
	#[cfg(feature = "tracing")]
	tracing::error!(platform = %platform, error = %error, "identity extraction failed");
	#[cfg(not(feature = "tracing"))]
	let _ = (platform, error);
}

/// Logs a refresh token the platform declared dead.
pub fn refresh_revoked(key: &TokenKey) {
	#[cfg(feature = "tracing")]
	tracing::warn!(token = %key, "refresh token rejected; token marked revoked");
	#[cfg(not(feature = "tracing"))]
	let _ = key;
}

/// Logs a platform refusal together with its classified stage.
pub fn exchange_rejected(
	platform: &PlatformId,
	stage: ExchangeStage,
	status: u16,
	oauth_error: Option<&str>,
) {
	#[cfg(feature = "tracing")]
	tracing::info!(
		platform = %platform,
		stage = stage.as_str(),
		status,
		oauth_error,
		"platform rejected the exchange"
	);
	#[cfg(not(feature = "tracing"))]
	let _ = (platform, stage, status, oauth_error);
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn flow_span_noop_without_subscriber() {
		let _guard = FlowSpan::new(FlowKind::Consent, "test").entered();

		security_event("test");
	}

	#[cfg(feature = "tracing")]
	#[tokio::test]
	async fn instrument_wraps_future() {
		let span = FlowSpan::new(FlowKind::Refresh, "instrument_wraps_future");
		let value = span.instrument(async { 42 }).await;

		assert_eq!(value, 42);
	}
}
