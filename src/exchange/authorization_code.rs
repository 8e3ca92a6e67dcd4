//! OAuth 2.0 Authorization Code exchanges, with and without PKCE.

// crates.io
use base64::{
	Engine as _,
	engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
};
use rand::{Rng, distr::Alphanumeric};
use serde_json::Value;
use sha2::{Digest, Sha256};
use url::form_urlencoded;
// self
use crate::{
	_prelude::*,
	auth::ScopeSet,
	exchange::{
		Exchanged, Rejection, TokenGrant, TransportErrorMapper, Upstream, form_post, get,
		identity_document, parse_document, token_grant,
	},
	http::ProviderHttpClient,
	platform::{ClientAuthMethod, PlatformDescriptor},
	tenant::OAuthApp,
};

/// PKCE challenge method sent with every PKCE consent URL.
pub const PKCE_CHALLENGE_METHOD: &str = "S256";

const PKCE_VERIFIER_LEN: usize = 64;

/// PKCE verifier and its S256 challenge (RFC 7636).
#[derive(Clone)]
pub struct PkcePair {
	verifier: String,
	challenge: String,
}
impl PkcePair {
	/// Generates a fresh 64-character verifier.
	pub fn generate() -> Self {
		let verifier: String =
			rand::rng().sample_iter(Alphanumeric).take(PKCE_VERIFIER_LEN).map(char::from).collect();

		Self::from_verifier(verifier)
	}

	/// Derives the challenge for an existing verifier.
	pub fn from_verifier(verifier: impl Into<String>) -> Self {
		let verifier = verifier.into();
		let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));

		Self { verifier, challenge }
	}

	/// Secret verifier, kept server side until the code exchange.
	pub fn verifier(&self) -> &str {
		&self.verifier
	}

	/// Public challenge placed in the consent URL.
	pub fn challenge(&self) -> &str {
		&self.challenge
	}
}
impl Debug for PkcePair {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("PkcePair")
			.field("verifier", &"<redacted>")
			.field("challenge", &self.challenge)
			.finish()
	}
}

/// Outcome of a refresh grant.
#[derive(Clone, Debug)]
pub enum RefreshOutcome {
	/// The platform issued new token fields.
	Issued(TokenGrant),
	/// The platform refused; the caller classifies the rejection.
	Rejected(Rejection),
}

/// Builds the consent URL for the Authorization Code grant.
pub fn authorize_url(
	descriptor: &PlatformDescriptor,
	app: &OAuthApp,
	scope: &ScopeSet,
	state: &str,
	pkce: Option<&PkcePair>,
) -> Url {
	let mut url = descriptor.endpoints.authorization.clone();
	let mut pairs = url.query_pairs_mut();

	pairs.append_pair(&descriptor.client_id_param, &app.client_id);
	pairs.append_pair("redirect_uri", app.redirect_uri.as_str());
	pairs.append_pair("response_type", "code");

	if let Some(joined) = descriptor.join_scopes(scope) {
		pairs.append_pair("scope", &joined);
	}

	pairs.append_pair("state", state);

	for (name, value) in &descriptor.additional_auth_params {
		pairs.append_pair(name, value);
	}

	if let Some(pkce) = pkce {
		pairs.append_pair("code_challenge", pkce.challenge());
		pairs.append_pair("code_challenge_method", PKCE_CHALLENGE_METHOD);
	}

	drop(pairs);

	url
}

/// Exchanges an authorization code for token fields.
pub(crate) async fn exchange_code<C, M>(
	upstream: &Upstream<'_, C, M>,
	descriptor: &PlatformDescriptor,
	app: &OAuthApp,
	code: &str,
	verifier: Option<&str>,
) -> Result<Exchanged>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	let mut pairs = vec![
		("grant_type", "authorization_code"),
		("code", code),
		("redirect_uri", app.redirect_uri.as_str()),
	];

	if let Some(verifier) = verifier {
		pairs.push(("code_verifier", verifier));
	}

	token_request(upstream, descriptor, app, pairs)
		.await?
		.map_err(|rejection| rejection.into_error(&descriptor.id))
}

/// Redeems a refresh token. Rejections are returned, not raised, so the caller can decide
/// whether the token is dead.
pub(crate) async fn refresh<C, M>(
	upstream: &Upstream<'_, C, M>,
	descriptor: &PlatformDescriptor,
	app: &OAuthApp,
	refresh_token: &str,
) -> Result<RefreshOutcome>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	let pairs = vec![("grant_type", "refresh_token"), ("refresh_token", refresh_token)];
	let outcome = match token_request(upstream, descriptor, app, pairs).await? {
		Ok(exchanged) => RefreshOutcome::Issued(exchanged.grant),
		Err(rejection) => RefreshOutcome::Rejected(rejection),
	};

	Ok(outcome)
}

/// Fetches the identity document with the access token as a bearer credential.
pub(crate) async fn fetch_user_info<C, M>(
	upstream: &Upstream<'_, C, M>,
	descriptor: &PlatformDescriptor,
	app: &OAuthApp,
	user_info: &Url,
	access_token: &str,
) -> Result<Value>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	let authorization = format!("Bearer {access_token}");
	let mut headers = Vec::new();

	if let Some(header) = &descriptor.client_id_header {
		headers.push((header.as_str(), app.client_id.as_str()));
	}

	let request = get(user_info, &authorization, &headers)?;
	let response = upstream.send(&descriptor.id, request).await?;

	identity_document(&response).map_err(|rejection| rejection.into_error(&descriptor.id))
}

async fn token_request<'p, C, M>(
	upstream: &Upstream<'_, C, M>,
	descriptor: &'p PlatformDescriptor,
	app: &'p OAuthApp,
	mut pairs: Vec<(&'p str, &'p str)>,
) -> Result<Result<Exchanged, Rejection>>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	let authorization = client_authentication(descriptor, app, &mut pairs);
	let request = form_post(&descriptor.endpoints.token, &pairs, authorization.as_deref())?;
	let response = upstream.send(&descriptor.id, request).await?;
	let document = parse_document(&response);
	let grant = token_grant(
		&response,
		document.as_ref(),
		&descriptor.scope_delimiter,
		OffsetDateTime::now_utc(),
	);

	Ok(grant.map(|grant| Exchanged { grant, document: document.unwrap_or_default() }))
}

/// Adds client credentials to the form, or returns the HTTP Basic header carrying them.
fn client_authentication<'p>(
	descriptor: &'p PlatformDescriptor,
	app: &'p OAuthApp,
	pairs: &mut Vec<(&'p str, &'p str)>,
) -> Option<String> {
	match (descriptor.client_auth, app.confidential_secret()) {
		(ClientAuthMethod::ClientSecretBasic, Some(secret)) =>
			Some(basic_authorization(&app.client_id, secret)),
		(_, secret) => {
			pairs.push((descriptor.client_id_param.as_str(), app.client_id.as_str()));

			if let Some(secret) = secret {
				pairs.push(("client_secret", secret));
			}

			None
		},
	}
}

// RFC 6749 section 2.3.1 form-encodes both halves before joining them.
fn basic_authorization(client_id: &str, secret: &str) -> String {
	let id = form_urlencoded::byte_serialize(client_id.as_bytes()).collect::<String>();
	let secret = form_urlencoded::byte_serialize(secret.as_bytes()).collect::<String>();

	format!("Basic {}", STANDARD.encode(format!("{id}:{secret}")))
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{
		auth::{OwnerId, PlatformId},
		platform::PlatformRegistry,
	};

	fn app(platform: &str) -> OAuthApp {
		OAuthApp::new(
			OwnerId::new("U1").expect("Owner fixture should be valid."),
			PlatformId::new(platform).expect("Platform fixture should be valid."),
			"client-1",
			"s3cr:et",
			Url::parse("https://app.example.com/callback").expect("Redirect should parse."),
		)
	}

	fn descriptor(platform: &str) -> Arc<PlatformDescriptor> {
		PlatformRegistry::builtin()
			.expect("Builtin registry should load.")
			.describe(&PlatformId::new(platform).expect("Platform fixture should be valid."))
			.expect("Builtin platform should exist.")
	}

	#[test]
	fn pkce_challenges_follow_rfc_7636() {
		let pair = PkcePair::from_verifier("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk");

		assert_eq!(pair.challenge(), "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM");

		let generated = PkcePair::generate();

		assert_eq!(generated.verifier().len(), 64);
		assert!(!format!("{generated:?}").contains(generated.verifier()));
	}

	#[test]
	fn authorize_urls_carry_descriptor_conventions() {
		let github = descriptor("github");
		let scope = ScopeSet::new(["user:email"]).expect("Scope fixture should be valid.");
		let url = authorize_url(&github, &app("github"), &scope, "st", None);

		assert!(url.as_str().starts_with("https://github.com/login/oauth/authorize?"));
		assert!(url.as_str().contains("scope=user%3Aemail"));
		assert!(url.as_str().contains("client_id=client-1"));
		assert!(url.as_str().contains("state=st"));
		assert!(!url.as_str().contains("code_challenge"));

		let tiktok = descriptor("tiktok");
		let pkce = PkcePair::generate();
		let scope =
			ScopeSet::new(["user.info.basic", "video.list"]).expect("Scope fixture should be valid.");
		let url = authorize_url(&tiktok, &app("tiktok"), &scope, "st", Some(&pkce));
		let query = url.query_pairs().into_owned().collect::<BTreeMap<_, _>>();

		assert_eq!(query.get("client_key").map(String::as_str), Some("client-1"));
		assert_eq!(query.get("scope").map(String::as_str), Some("user.info.basic,video.list"));
		assert_eq!(query.get("code_challenge").map(String::as_str), Some(pkce.challenge()));
		assert_eq!(query.get("code_challenge_method").map(String::as_str), Some("S256"));
		assert!(!url.as_str().contains(pkce.verifier()));
	}

	#[test]
	fn client_authentication_respects_the_descriptor() {
		let post = descriptor("github");
		let app = app("github");
		let mut pairs = Vec::new();

		assert_eq!(client_authentication(&post, &app, &mut pairs), None);
		assert_eq!(pairs, vec![("client_id", "client-1"), ("client_secret", "s3cr:et")]);

		let public = app.clone().public_client();
		let mut pairs = Vec::new();

		assert_eq!(client_authentication(&post, &public, &mut pairs), None);
		assert_eq!(pairs, vec![("client_id", "client-1")]);

		let basic = PlatformDescriptor { client_auth: ClientAuthMethod::ClientSecretBasic, ..(*post).clone() };
		let mut pairs = Vec::new();

		assert_eq!(
			client_authentication(&basic, &app, &mut pairs).as_deref(),
			Some(format!("Basic {}", STANDARD.encode("client-1:s3cr%3Aet")).as_str())
		);
		assert!(pairs.is_empty());
	}
}
