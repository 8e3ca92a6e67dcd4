//! OpenID 2.0 positive assertions verified with a direct `check_authentication` call.

// crates.io
use serde_json::{Value, json};
// self
use crate::{
	_prelude::*,
	error::CorrelationError,
	exchange::{Exchanged, TokenGrant, TransportErrorMapper, Upstream, callback_url, form_post},
	http::ProviderHttpClient,
	platform::PlatformDescriptor,
	tenant::OAuthApp,
};

/// OpenID 2.0 protocol namespace.
pub const OPENID_NS: &str = "http://specs.openid.net/auth/2.0";
/// Token type recorded for verified claimed identifiers.
pub const OPENID_TOKEN_TYPE: &str = "OpenID";

const IDENTIFIER_SELECT: &str = "http://specs.openid.net/auth/2.0/identifier_select";

/// Builds the `checkid_setup` redirect; `return_to` carries the state.
pub fn authorize_url(descriptor: &PlatformDescriptor, app: &OAuthApp, state: &str) -> Url {
	let return_to = callback_url(app, state);
	let realm = format!("{}/", app.redirect_uri.origin().ascii_serialization());
	let mut url = descriptor.endpoints.authorization.clone();
	let mut pairs = url.query_pairs_mut();

	pairs.append_pair("openid.ns", OPENID_NS);
	pairs.append_pair("openid.mode", "checkid_setup");
	pairs.append_pair("openid.claimed_id", IDENTIFIER_SELECT);
	pairs.append_pair("openid.identity", IDENTIFIER_SELECT);
	pairs.append_pair("openid.return_to", return_to.as_str());
	pairs.append_pair("openid.realm", &realm);

	for (name, value) in &descriptor.additional_auth_params {
		pairs.append_pair(name, value);
	}

	drop(pairs);

	url
}

/// Checks that an assertion was issued by the descriptor's OP for the callback being handled
/// and returns the claimed identifier.
pub fn check_assertion(
	descriptor: &PlatformDescriptor,
	app: &OAuthApp,
	params: &BTreeMap<String, String>,
) -> Result<Url, CorrelationError> {
	let param = |name: &str| params.get(name).map(String::as_str).ok_or(CorrelationError::Invalid);
	let op = &descriptor.endpoints.token;

	if param("openid.mode")? != "id_res" {
		return Err(CorrelationError::Invalid);
	}
	if Url::parse(param("openid.op_endpoint")?).ok().as_ref() != Some(op) {
		return Err(CorrelationError::Invalid);
	}
	// The assertion must name the exact callback carrying this state.
	if Url::parse(param("openid.return_to")?).ok() != Some(callback_url(app, param("state")?)) {
		return Err(CorrelationError::Invalid);
	}

	let claimed = Url::parse(param("openid.claimed_id")?).map_err(|_| CorrelationError::Invalid)?;

	if claimed.host_str().is_none() || claimed.host_str() != op.host_str() {
		return Err(CorrelationError::Invalid);
	}

	Ok(claimed)
}

/// Verifies an assertion with the OP and returns the claimed id as a bare credential.
pub(crate) async fn verify_assertion<C, M>(
	upstream: &Upstream<'_, C, M>,
	descriptor: &PlatformDescriptor,
	app: &OAuthApp,
	params: &BTreeMap<String, String>,
) -> Result<Exchanged>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	let claimed = check_assertion(descriptor, app, params)?;
	let pairs = params
		.iter()
		.filter(|(name, _)| name.starts_with("openid.") && name.as_str() != "openid.mode")
		.map(|(name, value)| (name.as_str(), value.as_str()))
		.chain(std::iter::once(("openid.mode", "check_authentication")))
		.collect::<Vec<_>>();
	let request = form_post(&descriptor.endpoints.token, &pairs, None)?;
	let response = upstream.send(&descriptor.id, request).await?;

	if !response.is_success() || !is_valid(&response.text()) {
		return Err(Error::ExchangeFailed { platform: descriptor.id.clone(), status: response.status });
	}

	Ok(Exchanged {
		grant: TokenGrant::bare(claimed.as_str(), OPENID_TOKEN_TYPE, OffsetDateTime::now_utc()),
		document: identity(&claimed),
	})
}

/// Identity document for a claimed id: the URL plus its last path segment as `id`.
pub fn identity(claimed: &Url) -> Value {
	let id = claimed
		.path_segments()
		.and_then(|mut segments| segments.rfind(|segment| !segment.is_empty()))
		.unwrap_or_default();

	json!({ "claimed_id": claimed.as_str(), "id": id })
}

// Key-Value Form Encoding, OpenID 2.0 section 4.1.1.
fn is_valid(body: &str) -> bool {
	body.lines()
		.filter_map(|line| line.split_once(':'))
		.any(|(key, value)| key.trim() == "is_valid" && value.trim() == "true")
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{
		auth::{OwnerId, PlatformId},
		platform::PlatformRegistry,
	};

	fn steam() -> Arc<PlatformDescriptor> {
		PlatformRegistry::builtin()
			.expect("Builtin registry should load.")
			.describe(&PlatformId::new("steam").expect("Platform fixture should be valid."))
			.expect("Steam should be registered.")
	}

	fn app() -> OAuthApp {
		OAuthApp::new(
			OwnerId::new("U1").expect("Owner fixture should be valid."),
			PlatformId::new("steam").expect("Platform fixture should be valid."),
			"realm-owner",
			"unused",
			Url::parse("https://app.example.com/openid/callback").expect("Redirect should parse."),
		)
	}

	fn assertion(op_endpoint: &str, claimed_id: &str) -> BTreeMap<String, String> {
		[
			("openid.ns", OPENID_NS),
			("openid.mode", "id_res"),
			("openid.op_endpoint", op_endpoint),
			("openid.claimed_id", claimed_id),
			("openid.identity", claimed_id),
			("openid.return_to", "https://app.example.com/openid/callback?state=abc"),
			("openid.sig", "sig"),
			("state", "abc"),
		]
		.into_iter()
		.map(|(k, v)| (k.to_owned(), v.to_owned()))
		.collect()
	}

	#[test]
	fn checkid_setup_urls_carry_state_in_return_to() {
		let url = authorize_url(&steam(), &app(), "abc");
		let query = url.query_pairs().into_owned().collect::<BTreeMap<_, _>>();

		assert_eq!(query.get("openid.mode").map(String::as_str), Some("checkid_setup"));
		assert_eq!(
			query.get("openid.return_to").map(String::as_str),
			Some("https://app.example.com/openid/callback?state=abc")
		);
		assert_eq!(query.get("openid.realm").map(String::as_str), Some("https://app.example.com/"));
		assert_eq!(query.get("openid.claimed_id").map(String::as_str), Some(IDENTIFIER_SELECT));
	}

	#[test]
	fn assertions_must_come_from_the_descriptor_endpoint() {
		let steam = steam();
		let claimed = check_assertion(
			&steam,
			&app(),
			&assertion(
				"https://steamcommunity.com/openid/login",
				"https://steamcommunity.com/openid/id/76561197960287930",
			),
		)
		.expect("Matching assertions should pass.");

		assert_eq!(identity(&claimed)["id"], "76561197960287930");
		assert_eq!(
			check_assertion(
				&steam,
				&app(),
				&assertion("https://evil.example/openid/login", "https://evil.example/id/1")
			),
			Err(CorrelationError::Invalid)
		);
		assert_eq!(
			check_assertion(
				&steam,
				&app(),
				&assertion("https://steamcommunity.com/openid/login", "https://evil.example/id/1")
			),
			Err(CorrelationError::Invalid),
			"Claimed ids from another host are rejected."
		);

		let mut replayed = assertion(
			"https://steamcommunity.com/openid/login",
			"https://steamcommunity.com/openid/id/1",
		);

		replayed.insert("state".into(), "another-state".into());

		assert_eq!(
			check_assertion(&steam, &app(), &replayed),
			Err(CorrelationError::Invalid),
			"return_to must match the callback that carries the assertion."
		);

		let mut prefixed = assertion(
			"https://steamcommunity.com/openid/login",
			"https://steamcommunity.com/openid/id/1",
		);

		prefixed.insert(
			"openid.return_to".into(),
			"https://app.example.com/openid/callback-evil?state=abc".into(),
		);

		assert_eq!(check_assertion(&steam, &app(), &prefixed), Err(CorrelationError::Invalid));

		let mut cancelled = assertion(
			"https://steamcommunity.com/openid/login",
			"https://steamcommunity.com/openid/id/1",
		);

		cancelled.insert("openid.mode".into(), "cancel".into());

		assert_eq!(check_assertion(&steam, &app(), &cancelled), Err(CorrelationError::Invalid));
	}

	#[test]
	fn key_value_responses_are_parsed_strictly() {
		assert!(is_valid("ns:http://specs.openid.net/auth/2.0\nis_valid:true\n"));
		assert!(!is_valid("ns:http://specs.openid.net/auth/2.0\nis_valid:false\n"));
		assert!(!is_valid("<html>is_valid:true is a lie</html>"));
	}
}
