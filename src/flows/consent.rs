//! Consent URL construction: scope policy, signed state, and the protocol secret parked in the
//! store until the callback arrives.

// self
use crate::{
	_prelude::*,
	auth::{OwnerId, PlatformId, ScopeSet, TokenSecret},
	error::ConfigError,
	exchange::{
		TransportErrorMapper,
		authorization_code::{self, PkcePair},
		callback_url, oauth1, openid,
	},
	flows::{Broker, common},
	http::ProviderHttpClient,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	platform::{PlatformDescriptor, ProtocolKind},
	state::{ConsentClaims, ConsentDigest},
	store::{ConsentRecord, ConsentSecret},
	tenant::{ApiKeyHash, OAuthApp},
};

/// Consent URL handed to the end user's browser.
#[derive(Clone, Debug)]
pub struct ConsentRequest {
	/// Platform page the user must visit.
	pub url: Url,
	/// Signed state embedded in the URL (or in the callback for OAuth 1.0a and OpenID 2.0).
	pub state: String,
	/// Instant after which the callback is refused.
	pub expires_at: OffsetDateTime,
}

impl<C, M> Broker<C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Starts a consent for `owner` on `platform`.
	///
	/// `requested` narrows or widens the app's default scopes; the platform's required scopes
	/// are always added. OAuth 1.0a platforms are contacted once to obtain a request token.
	pub async fn build_consent(
		&self,
		owner: &OwnerId,
		api_key_hash: &ApiKeyHash,
		platform: &PlatformId,
		requested: Option<&ScopeSet>,
	) -> Result<ConsentRequest> {
		const KIND: FlowKind = FlowKind::Consent;

		let span = FlowSpan::new(KIND, "build_consent");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				let descriptor = self.registry.describe(platform)?;
				let app = self
					.directory
					.find_app(owner, platform)
					.await?
					.ok_or_else(|| ConfigError::NoAppConfigured { platform: platform.clone() })?;
				let scope = common::effective_scopes(&descriptor, &app, requested)?;
				let now = OffsetDateTime::now_utc();
				let claims =
					ConsentClaims::new(platform.clone(), api_key_hash.clone(), owner.clone(), now);
				let state = self.codec.encode(&claims)?;
				let (url, secret) = self.consent_target(&descriptor, &app, &scope, &state).await?;
				let expires_at = now + self.codec.ttl();
				let record = ConsentRecord {
					platform: platform.clone(),
					owner: owner.clone(),
					api_key_hash: api_key_hash.clone(),
					scope,
					expires_at,
					secret,
				};

				self.store.put_consent(ConsentDigest::of(&state), record).await?;

				Ok(ConsentRequest { url, state, expires_at })
			})
			.await;

		obs::record_result(KIND, &result);

		result
	}

	async fn consent_target(
		&self,
		descriptor: &PlatformDescriptor,
		app: &OAuthApp,
		scope: &ScopeSet,
		state: &str,
	) -> Result<(Url, ConsentSecret)> {
		match descriptor.protocol {
			ProtocolKind::OAuth2 => Ok((
				authorization_code::authorize_url(descriptor, app, scope, state, None),
				ConsentSecret::None,
			)),
			ProtocolKind::OAuth2Pkce => {
				let pkce = PkcePair::generate();
				let url = authorization_code::authorize_url(descriptor, app, scope, state, Some(&pkce));

				Ok((url, ConsentSecret::PkceVerifier { verifier: TokenSecret::new(pkce.verifier()) }))
			},
			ProtocolKind::OAuth1a => {
				let callback = callback_url(app, state);
				let request =
					oauth1::request_token(&self.upstream(), descriptor, app, &callback).await?;
				let url = oauth1::authorize_url(descriptor, &request.token, scope);

				Ok((url, ConsentSecret::RequestToken { token: request.token, secret: request.secret }))
			},
			ProtocolKind::OpenId2 =>
				Ok((openid::authorize_url(descriptor, app, state), ConsentSecret::None)),
		}
	}
}
