//! Redirect callback handling: state verification, one-shot consent consumption, the protocol
//! exchange, identity extraction, and the final token write.

// crates.io
use url::form_urlencoded;
// self
use crate::{
	_prelude::*,
	auth::{OAuthToken, TokenKey, TokenSecret},
	error::{ConfigError, CorrelationError},
	exchange::{
		Exchanged, TransportErrorMapper, authorization_code,
		oauth1::{self, RequestToken},
		openid,
	},
	flows::{Broker, common},
	http::ProviderHttpClient,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	platform::{PlatformDescriptor, ProtocolKind, identity},
	state::ConsentDigest,
	store::{ConsentRecord, ConsentSecret},
	tenant::{ApiKeyHash, OAuthApp},
};

/// Query parameters received on the redirect URI.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CallbackParams(BTreeMap<String, String>);
impl CallbackParams {
	/// Parses a raw query string, with or without the leading `?`.
	pub fn from_query(query: &str) -> Self {
		let query = query.strip_prefix('?').unwrap_or(query);

		Self(form_urlencoded::parse(query.as_bytes()).into_owned().collect())
	}

	/// Builds parameters from already-decoded pairs.
	pub fn from_pairs<I, K, V>(pairs: I) -> Self
	where
		I: IntoIterator<Item = (K, V)>,
		K: Into<String>,
		V: Into<String>,
	{
		Self(pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
	}

	/// Returns a parameter value.
	pub fn get(&self, name: &str) -> Option<&str> {
		self.0.get(name).map(String::as_str)
	}

	/// All parameters.
	pub fn as_map(&self) -> &BTreeMap<String, String> {
		&self.0
	}

	/// True when the user refused consent on the platform.
	pub fn is_denial(&self) -> bool {
		self.0.contains_key("error")
			|| self.0.contains_key("denied")
			|| self.get("openid.mode") == Some("cancel")
	}
}

/// Result of a completed callback.
#[derive(Clone, Debug)]
pub struct CallbackOutcome {
	/// Stored token, keyed by the platform user it belongs to.
	pub token: OAuthToken,
	/// API key the consent was started with.
	pub api_key_hash: ApiKeyHash,
}

impl<C, M> Broker<C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Completes a consent from the platform redirect.
	///
	/// The pending consent is consumed before anything else can fail, so a state is accepted
	/// at most once. The exchange itself runs as a detached task and finishes even if the
	/// caller stops waiting.
	pub async fn handle_callback(&self, params: &CallbackParams) -> Result<CallbackOutcome> {
		const KIND: FlowKind = FlowKind::Callback;

		let span = FlowSpan::new(KIND, "handle_callback");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.complete_callback(params)).await;

		obs::record_result(KIND, &result);

		result
	}

	async fn complete_callback(&self, params: &CallbackParams) -> Result<CallbackOutcome> {
		let now = OffsetDateTime::now_utc();
		let state = params.get("state").ok_or_else(|| rejected("callback carries no state"))?;
		let claims =
			self.codec.decode_at(state, now).map_err(|_| rejected("state failed verification"))?;
		let descriptor = self.registry.describe(&claims.platform)?;
		let owner = self.directory.resolve_api_key(&claims.api_key_hash).await?;

		if owner.as_ref() != Some(&claims.owner) {
			return Err(rejected("api key no longer resolves to the state owner"));
		}

		let record = self
			.store
			.take_consent(&ConsentDigest::of(state), now)
			.await?
			.ok_or_else(|| rejected("consent is unknown, consumed, or expired"))?;

		if record.owner != claims.owner
			|| record.platform != claims.platform
			|| record.api_key_hash != claims.api_key_hash
		{
			return Err(rejected("consent record does not match the state"));
		}
		if params.is_denial() {
			return Err(Error::ConsentDenied { platform: claims.platform });
		}

		let app = self
			.directory
			.find_app(&claims.owner, &claims.platform)
			.await?
			.ok_or_else(|| ConfigError::NoAppConfigured { platform: claims.platform.clone() })?;
		let broker = self.clone();
		let params = params.clone();
		let token =
			common::detach(
				async move { broker.exchange_consent(descriptor, app, record, params).await },
			)
			.await?;

		Ok(CallbackOutcome { token, api_key_hash: claims.api_key_hash })
	}

	async fn exchange_consent(
		self,
		descriptor: Arc<PlatformDescriptor>,
		app: OAuthApp,
		record: ConsentRecord,
		params: CallbackParams,
	) -> Result<OAuthToken> {
		let upstream = self.upstream();
		let exchanged = match descriptor.protocol {
			ProtocolKind::OAuth2 | ProtocolKind::OAuth2Pkce => {
				let code =
					params.get("code").ok_or_else(|| rejected("callback carries no authorization code"))?;
				let verifier = match (&record.secret, descriptor.uses_pkce()) {
					(_, false) => None,
					(ConsentSecret::PkceVerifier { verifier }, true) => Some(verifier.expose()),
					(_, true) => return Err(rejected("consent has no pkce verifier")),
				};

				authorization_code::exchange_code(&upstream, &descriptor, &app, code, verifier).await?
			},
			ProtocolKind::OAuth1a => {
				let ConsentSecret::RequestToken { token, secret } = &record.secret else {
					return Err(rejected("consent has no request token"));
				};

				if params.get("oauth_token") != Some(token.as_str()) {
					return Err(rejected("request token does not match the consent"));
				}

				let verifier =
					params.get("oauth_verifier").ok_or_else(|| rejected("callback carries no verifier"))?;
				let request = RequestToken { token: token.clone(), secret: secret.clone() };

				oauth1::exchange_verifier(&upstream, &descriptor, &app, &request, verifier).await?
			},
			ProtocolKind::OpenId2 =>
				openid::verify_assertion(&upstream, &descriptor, &app, params.as_map()).await?,
		};
		let Exchanged { grant, document } = exchanged;
		let document = match &descriptor.endpoints.user_info {
			Some(user_info) if descriptor.protocol == ProtocolKind::OAuth1a => {
				let token_secret =
					grant.refresh_token.as_ref().map(TokenSecret::expose).unwrap_or_default();

				oauth1::fetch_user_info(
					&upstream,
					&descriptor,
					&app,
					user_info,
					grant.access_token.expose(),
					token_secret,
				)
				.await?
			},
			Some(user_info) =>
				authorization_code::fetch_user_info(
					&upstream,
					&descriptor,
					&app,
					user_info,
					grant.access_token.expose(),
				)
				.await?,
			None => document,
		};
		let user = identity::extract_user_id(&descriptor, &document).inspect_err(|err| {
			obs::identity_fault(&descriptor.id, err);
			obs::record_identity_fault(&descriptor.id);
		})?;
		let key = TokenKey::new(record.owner, descriptor.id.clone(), user);
		let token = grant.into_token(key, &record.scope).map_err(common::map_token_build_error)?;

		self.store.save(token.clone()).await?;

		Ok(token)
	}
}

fn rejected(reason: &'static str) -> Error {
	obs::security_event(reason);

	CorrelationError::Invalid.into()
}
