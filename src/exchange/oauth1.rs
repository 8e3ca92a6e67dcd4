//! OAuth 1.0a three-legged exchanges signed with HMAC-SHA1 (RFC 5849).
//!
//! The request-token secret never leaves the broker: it is parked in the consent record and
//! used once to sign the verifier exchange. The resulting token secret is stored as the
//! record's refresh token and signs identity requests.

// crates.io
use base64::{Engine as _, engine::general_purpose::STANDARD};
use hmac::{Hmac, Mac};
use rand::{Rng, distr::Alphanumeric};
use serde_json::Value;
use sha1::Sha1;
use url::form_urlencoded;
// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, TokenSecret},
	error::ConfigError,
	exchange::{
		Exchanged, ProviderResponse, Rejection, TokenGrant, TransportErrorMapper, Upstream,
		form_post, get, identity_document, parse_document,
	},
	http::ProviderHttpClient,
	platform::PlatformDescriptor,
	tenant::OAuthApp,
};

type HmacSha1 = Hmac<Sha1>;

/// Token type recorded for OAuth 1.0a credentials.
pub const OAUTH1_TOKEN_TYPE: &str = "OAuth";

const SIGNATURE_METHOD: &str = "HMAC-SHA1";
const VERSION: &str = "1.0";
const NONCE_LEN: usize = 32;

/// Temporary credentials returned by the request-token endpoint.
#[derive(Clone, Debug)]
pub struct RequestToken {
	/// Public request token, echoed back on the callback.
	pub token: String,
	/// Request-token secret used to sign the verifier exchange.
	pub secret: TokenSecret,
}

/// Signs requests on behalf of one consumer and, optionally, one token.
#[derive(Clone, Copy)]
pub struct Signer<'a> {
	consumer_key: &'a str,
	consumer_secret: &'a str,
	token: Option<&'a str>,
	token_secret: &'a str,
}
impl<'a> Signer<'a> {
	/// Creates a consumer-only signer.
	pub fn new(consumer_key: &'a str, consumer_secret: &'a str) -> Self {
		Self { consumer_key, consumer_secret, token: None, token_secret: "" }
	}

	/// Signs with a token and its secret as well.
	pub fn with_token(mut self, token: &'a str, token_secret: &'a str) -> Self {
		self.token = Some(token);
		self.token_secret = token_secret;

		self
	}

	/// Builds the `Authorization` header with a fresh nonce and the current time.
	pub fn header(
		&self,
		method: &str,
		url: &Url,
		oauth_extra: &[(&str, &str)],
		body: &[(&str, &str)],
	) -> Result<String, ConfigError> {
		let nonce =
			rand::rng().sample_iter(Alphanumeric).take(NONCE_LEN).map(char::from).collect::<String>();

		self.header_at(
			method,
			url,
			oauth_extra,
			body,
			&nonce,
			OffsetDateTime::now_utc().unix_timestamp(),
		)
	}

	/// Builds the `Authorization` header for a fixed nonce and timestamp.
	pub fn header_at(
		&self,
		method: &str,
		url: &Url,
		oauth_extra: &[(&str, &str)],
		body: &[(&str, &str)],
		nonce: &str,
		timestamp: i64,
	) -> Result<String, ConfigError> {
		let timestamp = timestamp.to_string();
		let mut oauth = vec![
			("oauth_consumer_key", self.consumer_key),
			("oauth_nonce", nonce),
			("oauth_signature_method", SIGNATURE_METHOD),
			("oauth_timestamp", timestamp.as_str()),
			("oauth_version", VERSION),
		];

		if let Some(token) = self.token {
			oauth.push(("oauth_token", token));
		}

		oauth.extend_from_slice(oauth_extra);

		let signature = self.sign(method, url, &oauth, body)?;
		let mut fields = oauth
			.iter()
			.map(|(name, value)| (encode(name), encode(value)))
			.chain(std::iter::once(("oauth_signature".to_owned(), encode(&signature))))
			.collect::<Vec<_>>();

		fields.sort();

		let rendered = fields
			.iter()
			.map(|(name, value)| format!("{name}=\"{value}\""))
			.collect::<Vec<_>>()
			.join(", ");

		Ok(format!("OAuth {rendered}"))
	}

	fn sign(
		&self,
		method: &str,
		url: &Url,
		oauth: &[(&str, &str)],
		body: &[(&str, &str)],
	) -> Result<String, ConfigError> {
		let query = url.query_pairs().collect::<Vec<_>>();
		let mut params = oauth
			.iter()
			.chain(body.iter())
			.map(|(name, value)| (encode(name), encode(value)))
			.chain(query.iter().map(|(name, value)| (encode(name), encode(value))))
			.collect::<Vec<_>>();

		params.sort();

		let normalized =
			params.iter().map(|(name, value)| format!("{name}={value}")).collect::<Vec<_>>().join("&");
		let base = format!(
			"{}&{}&{}",
			method.to_ascii_uppercase(),
			encode(&base_url(url)),
			encode(&normalized)
		);
		let key = format!("{}&{}", encode(self.consumer_secret), encode(self.token_secret));
		let mut mac =
			<HmacSha1 as Mac>::new_from_slice(key.as_bytes()).map_err(|_| ConfigError::SigningKey)?;

		mac.update(base.as_bytes());

		Ok(STANDARD.encode(mac.finalize().into_bytes()))
	}
}
impl Debug for Signer<'_> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Signer")
			.field("consumer_key", &self.consumer_key)
			.field("token", &self.token)
			.finish_non_exhaustive()
	}
}

/// Obtains temporary credentials, announcing `callback` as the redirect target.
pub(crate) async fn request_token<C, M>(
	upstream: &Upstream<'_, C, M>,
	descriptor: &PlatformDescriptor,
	app: &OAuthApp,
	callback: &Url,
) -> Result<RequestToken>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	let url = descriptor.endpoints.request_token.as_ref().ok_or_else(|| {
		ConfigError::InvalidSettings {
			field: "request_token_url",
			reason: format!("platform `{}` uses OAuth 1.0a and needs one", descriptor.id),
		}
	})?;
	let header = Signer::new(&app.client_id, app.client_secret.expose()).header(
		"POST",
		url,
		&[("oauth_callback", callback.as_str())],
		&[],
	)?;
	let request = form_post(url, &[], Some(header.as_str()))?;
	let response = upstream.send(&descriptor.id, request).await?;
	let (_, token, secret) =
		token_pair(&response).map_err(|rejection| rejection.into_error(&descriptor.id))?;

	Ok(RequestToken { token, secret: TokenSecret::new(secret) })
}

/// Builds the consent URL for an issued request token.
pub fn authorize_url(descriptor: &PlatformDescriptor, request_token: &str, scope: &ScopeSet) -> Url {
	let mut url = descriptor.endpoints.authorization.clone();
	let mut pairs = url.query_pairs_mut();

	pairs.append_pair("oauth_token", request_token);

	if let Some(joined) = descriptor.join_scopes(scope) {
		pairs.append_pair("scope", &joined);
	}

	for (name, value) in &descriptor.additional_auth_params {
		pairs.append_pair(name, value);
	}

	drop(pairs);

	url
}

/// Trades the request token and verifier for long-lived credentials.
pub(crate) async fn exchange_verifier<C, M>(
	upstream: &Upstream<'_, C, M>,
	descriptor: &PlatformDescriptor,
	app: &OAuthApp,
	request: &RequestToken,
	verifier: &str,
) -> Result<Exchanged>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	let url = &descriptor.endpoints.token;
	let header = Signer::new(&app.client_id, app.client_secret.expose())
		.with_token(&request.token, request.secret.expose())
		.header("POST", url, &[("oauth_verifier", verifier)], &[])?;
	let request = form_post(url, &[], Some(header.as_str()))?;
	let response = upstream.send(&descriptor.id, request).await?;
	let (document, token, secret) =
		token_pair(&response).map_err(|rejection| rejection.into_error(&descriptor.id))?;
	let mut grant = TokenGrant::bare(token, OAUTH1_TOKEN_TYPE, OffsetDateTime::now_utc());

	grant.refresh_token = Some(TokenSecret::new(secret));

	Ok(Exchanged { grant, document })
}

/// Fetches the identity document with a signed GET.
pub(crate) async fn fetch_user_info<C, M>(
	upstream: &Upstream<'_, C, M>,
	descriptor: &PlatformDescriptor,
	app: &OAuthApp,
	user_info: &Url,
	token: &str,
	token_secret: &str,
) -> Result<Value>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	let header = Signer::new(&app.client_id, app.client_secret.expose())
		.with_token(token, token_secret)
		.header("GET", user_info, &[], &[])?;
	let request = get(user_info, &header, &[])?;
	let response = upstream.send(&descriptor.id, request).await?;

	identity_document(&response).map_err(|rejection| rejection.into_error(&descriptor.id))
}

/// RFC 3986 percent-encoding as required by RFC 5849 section 3.6.
pub fn encode(raw: &str) -> String {
	form_urlencoded::byte_serialize(raw.as_bytes())
		.collect::<String>()
		.replace('+', "%20")
		.replace('*', "%2A")
		.replace("%7E", "~")
}

fn base_url(url: &Url) -> String {
	let mut base = format!("{}://{}", url.scheme(), url.host_str().unwrap_or_default());

	if let Some(port) = url.port() {
		base.push_str(&format!(":{port}"));
	}

	base.push_str(url.path());

	base
}

fn token_pair(response: &ProviderResponse) -> Result<(Value, String, String), Rejection> {
	let document = parse_document(response);

	if !response.is_success() {
		return Err(Rejection::from_response(response, document.as_ref()));
	}

	let field = |name: &str| {
		document
			.as_ref()
			.and_then(|doc| doc.get(name))
			.and_then(Value::as_str)
			.filter(|value| !value.is_empty())
			.map(str::to_owned)
	};
	let token = field("oauth_token");
	let secret = field("oauth_token_secret");

	match (token, secret) {
		(Some(token), Some(secret)) => Ok((document.unwrap_or_default(), token, secret)),
		_ => Err(Rejection::from_response(response, document.as_ref())),
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{auth::PlatformId, platform::PlatformRegistry};

	#[test]
	fn signatures_match_the_published_twitter_vector() {
		let url = Url::parse("https://api.twitter.com/1.1/statuses/update.json?include_entities=true")
			.expect("Vector URL should parse.");
		let header = Signer::new(
			"xvz1evFS4wEEPTGEFPHBog",
			"kAcSOqF21Fu85e7zjz7ZN2U4ZRhfV3WpwPAoE3Z7kBw",
		)
		.with_token(
			"370773112-GmHxMAgYyLbNEtIKZeRNFsMKPR9EyMZeS9weJAEb",
			"LswwdoUaIvS8ltyTt5jkRh4J50vUPVVHtR2YPi5kE",
		)
		.header_at(
			"POST",
			&url,
			&[],
			&[("status", "Hello Ladies + Gentlemen, a signed OAuth request!")],
			"kYjzVBB8Y0ZFabxSWbWovY3uYSQ2pTgmZeNu2VS4cg",
			1318622958,
		)
		.expect("Signing should succeed.");

		assert!(header.starts_with("OAuth oauth_consumer_key=\"xvz1evFS4wEEPTGEFPHBog\", "));
		assert!(header.contains("oauth_signature=\"hCtSmYh%2BiHYCEqBWrE7C7hYmtUk%3D\""));
		assert!(header.contains("oauth_timestamp=\"1318622958\""));
		assert!(!header.contains("status="), "Body parameters are signed but not sent in the header.");
	}

	#[test]
	fn percent_encoding_follows_rfc_3986() {
		assert_eq!(encode("Ladies + Gentlemen"), "Ladies%20%2B%20Gentlemen");
		assert_eq!(encode("a*b~c-d._e"), "a%2Ab~c-d._e");
		assert_eq!(encode("☃"), "%E2%98%83");
	}

	#[test]
	fn base_urls_drop_default_ports_and_queries() {
		let default = Url::parse("HTTPS://Example.com:443/path?x=1").expect("URL should parse.");
		let custom = Url::parse("http://example.com:8080/r%20v").expect("URL should parse.");

		assert_eq!(base_url(&default), "https://example.com/path");
		assert_eq!(base_url(&custom), "http://example.com:8080/r%20v");
	}

	#[test]
	fn authorize_urls_carry_the_request_token_and_extras() {
		let trello = PlatformRegistry::builtin()
			.expect("Builtin registry should load.")
			.describe(&PlatformId::new("trello").expect("Platform fixture should be valid."))
			.expect("Trello should be registered.");
		let scope = ScopeSet::new(["read", "write"]).expect("Scope fixture should be valid.");
		let url = authorize_url(&trello, "req-token", &scope);
		let query = url.query_pairs().into_owned().collect::<BTreeMap<_, _>>();

		assert_eq!(query.get("oauth_token").map(String::as_str), Some("req-token"));
		assert_eq!(query.get("scope").map(String::as_str), Some("read,write"));
		assert_eq!(query.get("expiration").map(String::as_str), Some("never"));
	}

	#[test]
	fn token_pairs_require_both_credentials() {
		let ok = ProviderResponse {
			status: 200,
			content_type: None,
			body: b"oauth_token=t&oauth_token_secret=s&user_id=42".to_vec(),
		};
		let (document, token, secret) = token_pair(&ok).expect("Complete pairs should parse.");

		assert_eq!((token.as_str(), secret.as_str()), ("t", "s"));
		assert_eq!(document.get("user_id").and_then(Value::as_str), Some("42"));

		let partial = ProviderResponse { status: 200, content_type: None, body: b"oauth_token=t".to_vec() };

		assert_eq!(token_pair(&partial).expect_err("Missing secrets are rejections.").status, 200);
	}
}
