//! Normalization of platform token and identity responses.
//!
//! Platforms answer in JSON or form encoding, send `expires_in` as a number or a string,
//! echo scopes as a delimited string or a list, and sometimes report errors with a 200.
//! Everything funnels into [`TokenGrant`] or a [`Rejection`].

// crates.io
use serde_json::{Map, Value};
// self
use crate::{
	_prelude::*,
	auth::{
		DEFAULT_TOKEN_TYPE, OAuthToken, PlatformId, ScopeSet, TokenBuildError, TokenKey,
		TokenSecret,
	},
	exchange::ProviderResponse,
	platform::{ExchangeStage, ProviderErrorContext},
};

/// Token fields extracted from a platform response, before the identity is known.
#[derive(Clone, Debug)]
pub struct TokenGrant {
	/// Access token (OAuth 1.0a token, OpenID 2.0 claimed id).
	pub access_token: TokenSecret,
	/// Refresh token (OAuth 1.0a token secret).
	pub refresh_token: Option<TokenSecret>,
	/// Token type, `Bearer` unless the platform said otherwise.
	pub token_type: String,
	/// Scopes echoed by the platform; `None` when it did not say.
	pub scope: Option<ScopeSet>,
	/// Positive lifetime announced by the platform.
	pub expires_in: Option<Duration>,
	/// Instant the response was received.
	pub issued_at: OffsetDateTime,
}
impl TokenGrant {
	/// Builds a grant for protocols that return a bare credential.
	pub fn bare(
		access_token: impl Into<TokenSecret>,
		token_type: impl Into<String>,
		issued_at: OffsetDateTime,
	) -> Self {
		Self {
			access_token: access_token.into(),
			refresh_token: None,
			token_type: token_type.into(),
			scope: None,
			expires_in: None,
			issued_at,
		}
	}

	/// Turns the grant into a stored token, falling back to `requested` scopes when the
	/// platform did not echo any.
	pub fn into_token(self, key: TokenKey, requested: &ScopeSet) -> Result<OAuthToken, TokenBuildError> {
		let mut builder = OAuthToken::builder(key)
			.access_token(self.access_token)
			.token_type(self.token_type)
			.scope(self.scope.unwrap_or_else(|| requested.clone()))
			.issued_at(self.issued_at);

		if let Some(refresh) = self.refresh_token {
			builder = builder.refresh_token(refresh);
		}
		if let Some(lifetime) = self.expires_in {
			builder = builder.expires_in(lifetime);
		}

		builder.build()
	}
}

/// A platform refusal or an unusable response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rejection {
	/// HTTP status of the response.
	pub status: u16,
	/// OAuth `error` code, when present.
	pub oauth_error: Option<String>,
	/// OAuth `error_description`, when present.
	pub error_description: Option<String>,
	/// Leading part of the body for unstructured payloads.
	pub body_preview: Option<String>,
}
impl Rejection {
	/// Collects whatever diagnostics the response carries.
	pub fn from_response(response: &ProviderResponse, document: Option<&Value>) -> Self {
		let field = |name: &str| document.and_then(|doc| doc.get(name)).and_then(error_text);
		let oauth_error = field("error");
		let error_description = field("error_description");
		let body_preview = match (&oauth_error, response.body.is_empty()) {
			(None, false) => Some(response.text()),
			_ => None,
		};

		Self { status: response.status, oauth_error, error_description, body_preview }
	}

	/// Classifier input for this rejection.
	pub fn context(&self, stage: ExchangeStage) -> ProviderErrorContext {
		let mut ctx = ProviderErrorContext::new(stage).with_http_status(self.status);

		if let Some(error) = &self.oauth_error {
			ctx = ctx.with_oauth_error(error.clone());
		}
		if let Some(description) = &self.error_description {
			ctx = ctx.with_error_description(description.clone());
		}
		if let Some(body) = &self.body_preview {
			ctx = ctx.with_body_preview(body.clone());
		}

		ctx
	}

	/// Converts into the caller-facing error.
	pub fn into_error(self, platform: &PlatformId) -> Error {
		Error::ExchangeFailed { platform: platform.clone(), status: self.status }
	}
}

#[derive(Debug, Deserialize)]
struct RawTokenResponse {
	access_token: Option<String>,
	refresh_token: Option<String>,
	token_type: Option<String>,
	scope: Option<ScopeField>,
	expires_in: Option<Seconds>,
	#[serde(flatten)]
	_extra: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ScopeField {
	Text(String),
	List(Vec<String>),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Seconds {
	Integer(i64),
	Float(f64),
	Text(String),
}
impl Seconds {
	fn whole(&self) -> Option<i64> {
		match self {
			Seconds::Integer(value) => Some(*value),
			Seconds::Float(value) if value.is_finite() => Some(value.trunc() as i64),
			Seconds::Float(_) => None,
			Seconds::Text(text) =>
				text.trim().parse::<f64>().ok().filter(|v| v.is_finite()).map(|v| v.trunc() as i64),
		}
	}
}

/// Parses a response body as JSON, falling back to form encoding.
pub fn parse_document(response: &ProviderResponse) -> Option<Value> {
	if let Ok(value) = serde_json::from_slice::<Value>(&response.body) {
		return Some(value);
	}

	let text = std::str::from_utf8(&response.body).ok()?.trim();

	if text.is_empty() || !text.contains('=') {
		return None;
	}

	Some(form_document(text))
}

/// Decodes `application/x-www-form-urlencoded` text into a JSON object of strings.
pub fn form_document(text: &str) -> Value {
	Value::Object(
		url::form_urlencoded::parse(text.as_bytes())
			.map(|(name, value)| (name.into_owned(), Value::String(value.into_owned())))
			.collect(),
	)
}

/// Normalizes an OAuth 2.0 token endpoint response.
pub fn token_grant(
	response: &ProviderResponse,
	document: Option<&Value>,
	scope_delimiter: &str,
	issued_at: OffsetDateTime,
) -> Result<TokenGrant, Rejection> {
	let reject = || Rejection::from_response(response, document);

	if !response.is_success() {
		return Err(reject());
	}

	let doc = document.ok_or_else(reject)?;

	if doc.get("error").is_some_and(|error| !error.is_null()) {
		return Err(reject());
	}

	let raw: RawTokenResponse = serde_path_to_error::deserialize(doc).map_err(|e| {
		#[cfg(feature = "tracing")]
		tracing::debug!(path = %e.path(), "token response has an unexpected shape");
		#[cfg(not(feature = "tracing"))]
		let _ = e;

		reject()
	})?;
	let access_token = raw.access_token.filter(|token| !token.is_empty()).ok_or_else(reject)?;
	let token_type = match raw.token_type {
		Some(kind) if kind.eq_ignore_ascii_case(DEFAULT_TOKEN_TYPE) => DEFAULT_TOKEN_TYPE.into(),
		Some(kind) if !kind.is_empty() => kind,
		_ => DEFAULT_TOKEN_TYPE.into(),
	};
	let scope = match raw.scope {
		Some(ScopeField::Text(text)) => ScopeSet::parse_delimited(&text, scope_delimiter).ok(),
		Some(ScopeField::List(list)) => ScopeSet::new(list).ok(),
		None => None,
	};
	let expires_in = raw
		.expires_in
		.as_ref()
		.and_then(Seconds::whole)
		.filter(|secs| *secs > 0)
		.map(Duration::seconds);

	Ok(TokenGrant {
		access_token: TokenSecret::new(access_token),
		refresh_token: raw.refresh_token.filter(|token| !token.is_empty()).map(TokenSecret::new),
		token_type,
		scope,
		expires_in,
		issued_at,
	})
}

/// Validates an identity endpoint response and returns its JSON document.
pub fn identity_document(response: &ProviderResponse) -> Result<Value, Rejection> {
	if !response.is_success() {
		return Err(Rejection::from_response(response, None));
	}

	serde_json::from_slice(&response.body).map_err(|_| Rejection::from_response(response, None))
}

fn error_text(value: &Value) -> Option<String> {
	match value {
		Value::String(text) if !text.is_empty() => Some(text.clone()),
		Value::Object(map) => ["type", "code", "message"]
			.iter()
			.find_map(|key| map.get(*key).and_then(error_text)),
		Value::Number(number) => Some(number.to_string()),
		_ => None,
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use serde_json::json;
	use time::macros;
	// self
	use super::*;

	fn response(status: u16, body: &str) -> ProviderResponse {
		ProviderResponse { status, content_type: None, body: body.as_bytes().to_vec() }
	}

	fn grant(status: u16, body: &str, delimiter: &str) -> Result<TokenGrant, Rejection> {
		let response = response(status, body);
		let document = parse_document(&response);

		token_grant(&response, document.as_ref(), delimiter, macros::datetime!(2025-01-01 00:00 UTC))
	}

	#[test]
	fn json_responses_normalize_lenient_fields() {
		let grant = grant(
			200,
			r#"{"access_token":"a","refresh_token":"r","token_type":"bearer","expires_in":"3600","scope":"read,activity:read"}"#,
			",",
		)
		.expect("Lenient responses should normalize.");

		assert_eq!(grant.access_token.expose(), "a");
		assert_eq!(grant.refresh_token.as_ref().map(TokenSecret::expose), Some("r"));
		assert_eq!(grant.token_type, "Bearer");
		assert_eq!(grant.expires_in, Some(Duration::hours(1)));
		assert_eq!(grant.scope.map(|s| s.normalized()), Some("activity:read read".into()));
	}

	#[test]
	fn form_encoded_responses_normalize() {
		let grant = grant(200, "access_token=gho_16C7&scope=repo%2Cgist&token_type=bearer", ",")
			.expect("Form responses should normalize.");

		assert_eq!(grant.access_token.expose(), "gho_16C7");
		assert_eq!(grant.scope.map(|s| s.len()), Some(2));
		assert_eq!(grant.expires_in, None);
	}

	#[test]
	fn missing_or_non_positive_lifetimes_mean_no_expiry() {
		let zero = grant(200, r#"{"access_token":"a","expires_in":0}"#, " ")
			.expect("Zero lifetimes should normalize.");
		let list_scope = grant(200, r#"{"access_token":"a","scope":["b","a"],"expires_in":59.9}"#, " ")
			.expect("List scopes should normalize.");

		assert_eq!(zero.expires_in, None);
		assert_eq!(list_scope.expires_in, Some(Duration::seconds(59)));
		assert_eq!(list_scope.scope.map(|s| s.normalized()), Some("a b".into()));
	}

	#[test]
	fn absurd_lifetimes_do_not_overflow_the_expiry() {
		let key = TokenKey::new(
			"U1".parse().expect("Owner fixture should be valid."),
			"github".parse().expect("Platform fixture should be valid."),
			"42".parse().expect("Platform user fixture should be valid."),
		);

		for body in [
			r#"{"access_token":"a","expires_in":9223372036854775807}"#,
			r#"{"access_token":"a","expires_in":1e300}"#,
			r#"{"access_token":"a","expires_in":"1e300"}"#,
		] {
			let token = grant(200, body, " ")
				.expect("Huge lifetimes should normalize.")
				.into_token(key.clone(), &ScopeSet::default())
				.expect("Huge lifetimes should still build a token.");

			assert_eq!(token.expires_at, None, "{body}");
		}
	}

	#[test]
	fn failures_become_rejections_with_diagnostics() {
		let rejected = grant(400, r#"{"error":"invalid_grant","error_description":"Bad code."}"#, " ")
			.expect_err("Non-2xx responses are rejections.");

		assert_eq!(rejected.status, 400);
		assert_eq!(rejected.oauth_error.as_deref(), Some("invalid_grant"));
		assert_eq!(rejected.body_preview, None);

		let ok_with_error = grant(200, "error=bad_verification_code", " ")
			.expect_err("Errors reported with a 200 are still rejections.");

		assert_eq!(ok_with_error.oauth_error.as_deref(), Some("bad_verification_code"));

		let nested = grant(400, r#"{"error":{"type":"OAuthException","message":"x"}}"#, ",")
			.expect_err("Nested errors are rejections.");

		assert_eq!(nested.oauth_error.as_deref(), Some("OAuthException"));

		let garbage = grant(200, "<html>oops</html>", " ").expect_err("Garbage bodies are rejections.");

		assert_eq!(garbage.body_preview.as_deref(), Some("<html>oops</html>"));
		assert!(grant(200, r#"{"token_type":"bearer"}"#, " ").is_err());
	}

	#[test]
	fn grants_fall_back_to_requested_scopes() {
		let key = TokenKey::new(
			"U1".parse().expect("Owner fixture should be valid."),
			"github".parse().expect("Platform fixture should be valid."),
			"42".parse().expect("Platform user fixture should be valid."),
		);
		let requested = ScopeSet::new(["user:email"]).expect("Scope fixture should be valid.");
		let token = TokenGrant::bare("a", "Bearer", macros::datetime!(2025-01-01 00:00 UTC))
			.into_token(key, &requested)
			.expect("Bare grants should build.");

		assert_eq!(token.scope, requested);
		assert_eq!(token.expires_at, None);
		assert_eq!(
			identity_document(&response(200, r#"{"id":1}"#)).expect("JSON identities parse."),
			json!({ "id": 1 })
		);
		assert_eq!(
			identity_document(&response(401, "")).expect_err("Non-2xx identities fail.").status,
			401
		);
	}
}
