//! Lazy refresh of stale tokens with single-flight guards and CAS rotation.
//!
//! [`Broker::get_token`] hands stale tokens to this module. Each refresh holds a per-[`TokenKey`]
//! guard, re-reads the record (another caller may already have rotated it), sends one
//! `grant_type=refresh_token` request, and writes the result with
//! [`BrokerStore::compare_and_swap_refresh`](crate::store::BrokerStore::compare_and_swap_refresh)
//! so a concurrent rotation by another broker instance is never overwritten. A refresh the
//! platform rejects as `invalid_grant` marks the record revoked.

mod metrics;

pub use metrics::RefreshMetrics;

// self
use crate::{
	_prelude::*,
	auth::{OAuthToken, TokenKey, TokenStatus},
	error::ConfigError,
	exchange::{
		Rejection, TokenGrant, TransportErrorMapper,
		authorization_code::{self, RefreshOutcome},
	},
	flows::{Broker, common},
	http::ProviderHttpClient,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	platform::{ExchangeStage, PlatformDescriptor, ProviderErrorKind},
	store::CompareAndSwapOutcome,
};

impl<C, M> Broker<C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Refreshes the token stored under `key`; runs detached from the caller.
	pub(crate) async fn refresh_stale(
		self,
		descriptor: Arc<PlatformDescriptor>,
		key: TokenKey,
	) -> Result<OAuthToken> {
		const KIND: FlowKind = FlowKind::Refresh;

		let span = FlowSpan::new(KIND, "refresh_stale");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let guard = common::flow_guard(&self, &key);
		let result = span
			.instrument(async {
				let _singleflight = guard.lock().await;

				self.refresh_locked(&descriptor, &key).await
			})
			.await;

		common::release_guard(&self, &key, guard);
		obs::record_result(KIND, &result);

		result
	}

	async fn refresh_locked(
		&self,
		descriptor: &PlatformDescriptor,
		key: &TokenKey,
	) -> Result<OAuthToken> {
		let current = self.store.fetch(key).await?.ok_or(Error::NotFound)?;

		match current.status_at(OffsetDateTime::now_utc(), self.config.refresh_skew) {
			TokenStatus::Active => return Ok(current),
			TokenStatus::Revoked =>
				return Err(Error::RefreshRevoked { platform: key.platform.clone() }),
			TokenStatus::Stale => {},
		}

		let Some(expected) = current.refresh_secret().map(str::to_owned) else {
			return Err(Error::Expired { platform: key.platform.clone() });
		};
		let app = self
			.directory
			.find_app(&key.owner, &key.platform)
			.await?
			.ok_or_else(|| ConfigError::NoAppConfigured { platform: key.platform.clone() })?;

		self.refresh_metrics.record_attempt();

		let result = match authorization_code::refresh(&self.upstream(), descriptor, &app, &expected)
			.await
		{
			Ok(RefreshOutcome::Issued(grant)) => self.rotate(key, current, &expected, grant).await,
			Ok(RefreshOutcome::Rejected(rejection)) =>
				self.refresh_rejected(descriptor, key, &expected, rejection).await,
			Err(err) => Err(err),
		};

		self.refresh_metrics.record_outcome(&result);

		result
	}

	async fn rotate(
		&self,
		key: &TokenKey,
		current: OAuthToken,
		expected: &str,
		grant: TokenGrant,
	) -> Result<OAuthToken> {
		let mut replacement =
			grant.into_token(key.clone(), &current.scope).map_err(common::map_token_build_error)?;

		// Platforms that do not rotate refresh tokens omit them from the response.
		if replacement.refresh_token.is_none() {
			replacement.refresh_token = current.refresh_token;
		}

		match self.store.compare_and_swap_refresh(key, Some(expected), replacement.clone()).await? {
			CompareAndSwapOutcome::Updated => Ok(replacement),
			CompareAndSwapOutcome::RefreshMismatch => self.settled(key).await,
			CompareAndSwapOutcome::Missing => Err(Error::NotFound),
		}
	}

	async fn refresh_rejected(
		&self,
		descriptor: &PlatformDescriptor,
		key: &TokenKey,
		expected: &str,
		rejection: Rejection,
	) -> Result<OAuthToken> {
		obs::exchange_rejected(
			&descriptor.id,
			ExchangeStage::Refresh,
			rejection.status,
			rejection.oauth_error.as_deref(),
		);

		if self.classifier.classify(&rejection.context(ExchangeStage::Refresh))
			!= ProviderErrorKind::InvalidGrant
		{
			return Err(rejection.into_error(&descriptor.id));
		}

		let Some(mut revoked) = self.store.fetch(key).await? else {
			return Err(Error::NotFound);
		};

		revoked.revoke(OffsetDateTime::now_utc());

		// Only the secret the platform just refused is revoked; a concurrent rotation wins.
		match self.store.compare_and_swap_refresh(key, Some(expected), revoked).await? {
			CompareAndSwapOutcome::Updated => {
				self.refresh_metrics.record_revocation();
				obs::refresh_revoked(key);

				Err(Error::RefreshRevoked { platform: key.platform.clone() })
			},
			CompareAndSwapOutcome::RefreshMismatch => self.settled(key).await,
			CompareAndSwapOutcome::Missing => Err(Error::NotFound),
		}
	}

	/// Reads back a record another writer rotated while this refresh was in flight.
	async fn settled(&self, key: &TokenKey) -> Result<OAuthToken> {
		match self.store.fetch(key).await? {
			Some(token) if token.is_revoked() =>
				Err(Error::RefreshRevoked { platform: key.platform.clone() }),
			Some(token) => Ok(token),
			None => Err(Error::NotFound),
		}
	}
}
