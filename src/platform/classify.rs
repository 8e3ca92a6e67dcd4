//! Error classification hooks for platform token-endpoint failures.
//!
//! Refresh needs to tell a dead refresh token (revoke and stop) from everything else
//! (surface and let the caller decide). Implementations only see crate-owned data so they
//! stay independent of the HTTP client in use.

// self
use crate::_prelude::*;

/// Exchange stage that produced a failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ExchangeStage {
	/// Authorization code, verifier, or assertion exchange.
	Authorization,
	/// Refresh grant.
	Refresh,
	/// OAuth 1.0a request-token call.
	RequestToken,
	/// Identity document fetch.
	UserInfo,
}
impl ExchangeStage {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			ExchangeStage::Authorization => "authorization",
			ExchangeStage::Refresh => "refresh",
			ExchangeStage::RequestToken => "request_token",
			ExchangeStage::UserInfo => "user_info",
		}
	}
}
impl Display for ExchangeStage {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Strategy hook that classifies platform failures.
pub trait ErrorClassifier: Send + Sync {
	/// Maps a failed response into the broker taxonomy.
	fn classify(&self, ctx: &ProviderErrorContext) -> ProviderErrorKind;
}

/// Canonical platform error categories.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderErrorKind {
	/// Platform rejected the grant (bad code, dead refresh token).
	InvalidGrant,
	/// Client authentication failed.
	InvalidClient,
	/// Requested scopes exceed what the grant covers.
	InsufficientScope,
	/// Failure is temporary.
	Transient,
}

/// Context passed to classifiers.
///
/// Only primitive data is carried (status code, OAuth fields, body preview).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderErrorContext {
	/// Stage associated with the failing request.
	pub stage: ExchangeStage,
	/// HTTP status code returned by the platform, when available.
	pub http_status: Option<u16>,
	/// Platform-supplied OAuth `error` field.
	pub oauth_error: Option<String>,
	/// Platform-supplied OAuth `error_description` field.
	pub error_description: Option<String>,
	/// Preview of the response body for unstructured payloads.
	pub body_preview: Option<String>,
	/// Indicates whether the failure originated from the transport layer.
	pub network_error: bool,
}
impl ProviderErrorContext {
	const BODY_PREVIEW_LIMIT: usize = 256;

	/// Creates a new context scoped to the provided stage.
	pub fn new(stage: ExchangeStage) -> Self {
		Self {
			stage,
			http_status: None,
			oauth_error: None,
			error_description: None,
			body_preview: None,
			network_error: false,
		}
	}

	/// Convenience constructor for transport-level failures.
	pub fn network_failure(stage: ExchangeStage) -> Self {
		let mut ctx = Self::new(stage);

		ctx.network_error = true;

		ctx
	}

	/// Adds an HTTP status code.
	pub fn with_http_status(mut self, status: u16) -> Self {
		self.http_status = Some(status);

		self
	}

	/// Adds the OAuth error code string returned by the platform.
	pub fn with_oauth_error(mut self, error: impl Into<String>) -> Self {
		self.oauth_error = Some(error.into());

		self
	}

	/// Adds the OAuth `error_description` field.
	pub fn with_error_description(mut self, description: impl Into<String>) -> Self {
		self.error_description = Some(description.into());

		self
	}

	/// Adds a body preview for platforms that return unstructured payloads.
	pub fn with_body_preview(mut self, body: impl Into<String>) -> Self {
		self.body_preview = Some(truncate_preview(body.into()));

		self
	}
}

/// Default classifier applying RFC 6749 heuristics.
///
/// Structured OAuth fields win, then body hints, then the HTTP status. Network failures are
/// always transient.
#[derive(Debug, Default)]
pub struct DefaultErrorClassifier;
impl ErrorClassifier for DefaultErrorClassifier {
	fn classify(&self, ctx: &ProviderErrorContext) -> ProviderErrorKind {
		if ctx.network_error {
			return ProviderErrorKind::Transient;
		}

		if let Some(kind) =
			classify_oauth_error(ctx.oauth_error.as_deref(), ctx.error_description.as_deref())
		{
			return kind;
		}
		if let Some(kind) = classify_body(ctx.body_preview.as_deref()) {
			return kind;
		}

		classify_status(ctx.http_status)
	}
}

fn truncate_preview(body: String) -> String {
	if body.chars().count() <= ProviderErrorContext::BODY_PREVIEW_LIMIT {
		return body;
	}

	let mut buf = body.chars().take(ProviderErrorContext::BODY_PREVIEW_LIMIT).collect::<String>();

	buf.push('…');

	buf
}

fn classify_oauth_error(
	oauth_error: Option<&str>,
	error_description: Option<&str>,
) -> Option<ProviderErrorKind> {
	oauth_error
		.and_then(match_exact_value)
		.or_else(|| error_description.and_then(match_exact_value))
		.or_else(|| classify_body(error_description))
}

fn match_exact_value(value: &str) -> Option<ProviderErrorKind> {
	if value.eq_ignore_ascii_case("invalid_grant") || value.eq_ignore_ascii_case("access_denied") {
		Some(ProviderErrorKind::InvalidGrant)
	} else if value.eq_ignore_ascii_case("invalid_client")
		|| value.eq_ignore_ascii_case("unauthorized_client")
	{
		Some(ProviderErrorKind::InvalidClient)
	} else if value.eq_ignore_ascii_case("invalid_scope")
		|| value.eq_ignore_ascii_case("insufficient_scope")
	{
		Some(ProviderErrorKind::InsufficientScope)
	} else if value.eq_ignore_ascii_case("temporarily_unavailable")
		|| value.eq_ignore_ascii_case("server_error")
	{
		Some(ProviderErrorKind::Transient)
	} else {
		None
	}
}

fn classify_body(body: Option<&str>) -> Option<ProviderErrorKind> {
	let lowered = body?.to_ascii_lowercase();

	match lowered.as_str() {
		text if text.contains("invalid_grant") || text.contains("revoked") =>
			Some(ProviderErrorKind::InvalidGrant),
		text if text.contains("invalid_client") => Some(ProviderErrorKind::InvalidClient),
		text if text.contains("insufficient_scope") || text.contains("invalid_scope") =>
			Some(ProviderErrorKind::InsufficientScope),
		text if text.contains("temporarily_unavailable") || text.contains("retry") =>
			Some(ProviderErrorKind::Transient),
		_ => None,
	}
}

fn classify_status(status: Option<u16>) -> ProviderErrorKind {
	match status {
		Some(400 | 404 | 410) => ProviderErrorKind::InvalidGrant,
		Some(401) => ProviderErrorKind::InvalidClient,
		Some(403) => ProviderErrorKind::InsufficientScope,
		_ => ProviderErrorKind::Transient,
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn oauth_error_fields_take_precedence() {
		let ctx = ProviderErrorContext::new(ExchangeStage::Refresh)
			.with_http_status(401)
			.with_oauth_error("invalid_grant");

		assert_eq!(DefaultErrorClassifier.classify(&ctx), ProviderErrorKind::InvalidGrant);

		let ctx = ProviderErrorContext::new(ExchangeStage::Refresh)
			.with_http_status(400)
			.with_oauth_error("invalid_client");

		assert_eq!(DefaultErrorClassifier.classify(&ctx), ProviderErrorKind::InvalidClient);
	}

	#[test]
	fn falls_back_to_description_body_and_status() {
		let ctx = ProviderErrorContext::new(ExchangeStage::Refresh)
			.with_http_status(500)
			.with_error_description("invalid_grant: token already used");

		assert_eq!(DefaultErrorClassifier.classify(&ctx), ProviderErrorKind::InvalidGrant);

		let ctx = ProviderErrorContext::new(ExchangeStage::Refresh)
			.with_body_preview("Refresh token has been revoked.");

		assert_eq!(DefaultErrorClassifier.classify(&ctx), ProviderErrorKind::InvalidGrant);

		let ctx = ProviderErrorContext::new(ExchangeStage::Refresh).with_http_status(503);

		assert_eq!(DefaultErrorClassifier.classify(&ctx), ProviderErrorKind::Transient);

		let ctx = ProviderErrorContext::network_failure(ExchangeStage::Refresh);

		assert_eq!(DefaultErrorClassifier.classify(&ctx), ProviderErrorKind::Transient);
	}

	#[test]
	fn body_previews_are_truncated() {
		let ctx = ProviderErrorContext::new(ExchangeStage::UserInfo).with_body_preview("x".repeat(400));
		let preview = ctx.body_preview.expect("Preview should be stored.");

		assert_eq!(preview.chars().count(), ProviderErrorContext::BODY_PREVIEW_LIMIT + 1);
		assert!(preview.ends_with('…'));
	}
}
