//! Thread-safe in-memory [`BrokerStore`] implementation for local development and tests.

// self
use crate::{
	_prelude::*,
	auth::{OAuthToken, OwnerId, PlatformId, TokenKey},
	state::ConsentDigest,
	store::{BrokerStore, CompareAndSwapOutcome, ConsentRecord, StoreFuture, Tables},
};

/// Thread-safe storage backend that keeps records in-process for tests and demos.
///
/// Every operation runs under one lock, which makes consent consumption and refresh CAS
/// atomic within the process.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(Arc<RwLock<Tables>>);
impl MemoryStore {
	/// Number of stored tokens.
	pub fn token_count(&self) -> usize {
		self.0.read().tokens.len()
	}

	/// Number of pending consents, expired ones included.
	pub fn consent_count(&self) -> usize {
		self.0.read().consents.len()
	}
}
impl BrokerStore for MemoryStore {
	fn save(&self, token: OAuthToken) -> StoreFuture<'_, ()> {
		self.0.write().save(token);

		Box::pin(async move { Ok(()) })
	}

	fn fetch<'a>(&'a self, key: &'a TokenKey) -> StoreFuture<'a, Option<OAuthToken>> {
		let found = self.0.read().tokens.get(key).cloned();

		Box::pin(async move { Ok(found) })
	}

	fn compare_and_swap_refresh<'a>(
		&'a self,
		key: &'a TokenKey,
		expected_refresh: Option<&'a str>,
		replacement: OAuthToken,
	) -> StoreFuture<'a, CompareAndSwapOutcome> {
		let outcome = self.0.write().compare_and_swap_refresh(key, expected_refresh, replacement);

		Box::pin(async move { Ok(outcome) })
	}

	fn delete<'a>(&'a self, key: &'a TokenKey) -> StoreFuture<'a, bool> {
		let existed = self.0.write().delete(key);

		Box::pin(async move { Ok(existed) })
	}

	fn delete_platform<'a>(
		&'a self,
		owner: &'a OwnerId,
		platform: &'a PlatformId,
	) -> StoreFuture<'a, usize> {
		let removed = self.0.write().delete_platform(owner, platform);

		Box::pin(async move { Ok(removed) })
	}

	fn put_consent(&self, digest: ConsentDigest, record: ConsentRecord) -> StoreFuture<'_, ()> {
		self.0.write().put_consent(digest, record, OffsetDateTime::now_utc());

		Box::pin(async move { Ok(()) })
	}

	fn take_consent<'a>(
		&'a self,
		digest: &'a ConsentDigest,
		now: OffsetDateTime,
	) -> StoreFuture<'a, Option<ConsentRecord>> {
		let taken = self.0.write().take_consent(digest, now);

		Box::pin(async move { Ok(taken) })
	}

	fn purge_expired_consents(&self, now: OffsetDateTime) -> StoreFuture<'_, usize> {
		let removed = self.0.write().purge_expired_consents(now);

		Box::pin(async move { Ok(removed) })
	}
}
