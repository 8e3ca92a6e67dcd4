//! Token retrieval, revocation, and bulk cleanup.

// self
use crate::{
	_prelude::*,
	auth::{OAuthToken, OwnerId, PlatformId, TokenKey, TokenStatus},
	exchange::TransportErrorMapper,
	flows::{Broker, common},
	http::ProviderHttpClient,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};

impl<C, M> Broker<C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Returns a usable token for `key`, refreshing it first when it is about to expire.
	///
	/// Tokens inside the configured refresh skew are refreshed once per key no matter how many
	/// callers ask concurrently; platforms without refresh support report
	/// [`Error::Expired`] instead.
	pub async fn get_token(&self, key: &TokenKey) -> Result<OAuthToken> {
		const KIND: FlowKind = FlowKind::Retrieve;

		let span = FlowSpan::new(KIND, "get_token");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				let descriptor = self.registry.describe(&key.platform)?;
				let token = self.store.fetch(key).await?.ok_or(Error::NotFound)?;

				match token.status_at(OffsetDateTime::now_utc(), self.config.refresh_skew) {
					TokenStatus::Active => return Ok(token),
					TokenStatus::Revoked =>
						return Err(Error::RefreshRevoked { platform: key.platform.clone() }),
					TokenStatus::Stale => {},
				}

				if !descriptor.supports_refresh || token.refresh_token.is_none() {
					return Err(Error::Expired { platform: key.platform.clone() });
				}

				let broker = self.clone();
				let key = key.clone();

				common::detach(async move { broker.refresh_stale(descriptor, key).await }).await
			})
			.await;

		obs::record_result(KIND, &result);

		result
	}

	/// Deletes the token for `key`; returns whether one existed.
	pub async fn revoke_token(&self, key: &TokenKey) -> Result<bool> {
		const KIND: FlowKind = FlowKind::Revoke;

		let span = FlowSpan::new(KIND, "revoke_token");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result =
			span.instrument(async move { Ok(self.store.delete(key).await?) }).await;

		obs::record_result(KIND, &result);

		result
	}

	/// Deletes every token `owner` holds on `platform`, typically after the app is removed.
	pub async fn purge_app(&self, owner: &OwnerId, platform: &PlatformId) -> Result<usize> {
		const KIND: FlowKind = FlowKind::Purge;

		let span = FlowSpan::new(KIND, "purge_app");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move { Ok(self.store.delete_platform(owner, platform).await?) })
			.await;

		obs::record_result(KIND, &result);

		result
	}

	/// Drops consents that can no longer complete.
	pub async fn purge_expired_consents(&self, now: OffsetDateTime) -> Result<usize> {
		const KIND: FlowKind = FlowKind::Purge;

		let span = FlowSpan::new(KIND, "purge_expired_consents");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move { Ok(self.store.purge_expired_consents(now).await?) })
			.await;

		obs::record_result(KIND, &result);

		result
	}
}
