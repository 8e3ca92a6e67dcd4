//! Storage contracts and built-in store implementations for tokens and consent records.
//!
//! Two namespaces live behind [`BrokerStore`]: tokens keyed by [`TokenKey`] and pending
//! consents keyed by [`ConsentDigest`]. Every mutation that must not race (consent
//! consumption, refresh rotation) is a single store call so backends can make it atomic.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// self
use crate::{
	_prelude::*,
	auth::{OAuthToken, OwnerId, PlatformId, ScopeSet, TokenKey, TokenSecret},
	state::ConsentDigest,
	tenant::ApiKeyHash,
};

/// Boxed future returned by store and directory operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Storage backend contract implemented by broker stores.
pub trait BrokerStore
where
	Self: Send + Sync,
{
	/// Persists or replaces the token stored under `token.key`.
	fn save(&self, token: OAuthToken) -> StoreFuture<'_, ()>;

	/// Fetches the token stored under `key`, if present.
	fn fetch<'a>(&'a self, key: &'a TokenKey) -> StoreFuture<'a, Option<OAuthToken>>;

	/// Atomically replaces the token if its refresh secret still equals `expected_refresh`.
	fn compare_and_swap_refresh<'a>(
		&'a self,
		key: &'a TokenKey,
		expected_refresh: Option<&'a str>,
		replacement: OAuthToken,
	) -> StoreFuture<'a, CompareAndSwapOutcome>;

	/// Deletes the token; returns whether one existed.
	fn delete<'a>(&'a self, key: &'a TokenKey) -> StoreFuture<'a, bool>;

	/// Deletes every token an owner holds for a platform; returns how many were removed.
	fn delete_platform<'a>(
		&'a self,
		owner: &'a OwnerId,
		platform: &'a PlatformId,
	) -> StoreFuture<'a, usize>;

	/// Stores a pending consent; implementations may sweep expired consents at the same time.
	fn put_consent(&self, digest: ConsentDigest, record: ConsentRecord) -> StoreFuture<'_, ()>;

	/// Atomically removes and returns a pending consent.
	///
	/// Expired records are removed as well but reported as absent, so a state can be consumed
	/// at most once whatever the outcome.
	fn take_consent<'a>(
		&'a self,
		digest: &'a ConsentDigest,
		now: OffsetDateTime,
	) -> StoreFuture<'a, Option<ConsentRecord>>;

	/// Drops consents that expired at or before `now`; returns how many were removed.
	fn purge_expired_consents(&self, now: OffsetDateTime) -> StoreFuture<'_, usize>;
}

/// Result of a refresh-token compare-and-swap attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareAndSwapOutcome {
	/// The refresh secret matched the expected value and the record was updated.
	Updated,
	/// The record exists but the expected refresh secret did not match.
	RefreshMismatch,
	/// No record exists under the key.
	Missing,
}

/// Error type produced by [`BrokerStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

/// Server-side half of a consent in flight.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentRecord {
	/// Platform the consent was started for.
	pub platform: PlatformId,
	/// Tenant user owning the consent.
	pub owner: OwnerId,
	/// API key the consent was started with.
	pub api_key_hash: ApiKeyHash,
	/// Effective scopes sent to the platform.
	pub scope: ScopeSet,
	/// Instant after which the consent can no longer complete.
	pub expires_at: OffsetDateTime,
	/// Protocol secret needed to finish the exchange.
	pub secret: ConsentSecret,
}
impl ConsentRecord {
	/// Returns true when the record can no longer be consumed at `now`.
	pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
		now >= self.expires_at
	}
}

/// Protocol-specific secret parked between consent and callback.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConsentSecret {
	/// Nothing to remember (plain OAuth 2.0, OpenID 2.0).
	None,
	/// PKCE verifier matching the challenge in the consent URL.
	PkceVerifier {
		/// Secret verifier.
		verifier: TokenSecret,
	},
	/// OAuth 1.0a temporary credentials.
	RequestToken {
		/// Public request token.
		token: String,
		/// Request-token secret.
		secret: TokenSecret,
	},
}

/// Both namespaces held by the built-in stores, with the mutation rules they share.
#[derive(Clone, Debug, Default)]
pub(crate) struct Tables {
	pub(crate) tokens: HashMap<TokenKey, OAuthToken>,
	pub(crate) consents: HashMap<ConsentDigest, ConsentRecord>,
}
impl Tables {
	pub(crate) fn save(&mut self, token: OAuthToken) {
		self.tokens.insert(token.key.clone(), token);
	}

	pub(crate) fn compare_and_swap_refresh(
		&mut self,
		key: &TokenKey,
		expected_refresh: Option<&str>,
		replacement: OAuthToken,
	) -> CompareAndSwapOutcome {
		let outcome = match self.tokens.get(key) {
			Some(existing) if existing.refresh_secret() == expected_refresh =>
				CompareAndSwapOutcome::Updated,
			Some(_) => CompareAndSwapOutcome::RefreshMismatch,
			None => CompareAndSwapOutcome::Missing,
		};

		if matches!(outcome, CompareAndSwapOutcome::Updated) {
			self.tokens.insert(key.clone(), replacement);
		}

		outcome
	}

	pub(crate) fn delete(&mut self, key: &TokenKey) -> bool {
		self.tokens.remove(key).is_some()
	}

	pub(crate) fn delete_platform(&mut self, owner: &OwnerId, platform: &PlatformId) -> usize {
		let before = self.tokens.len();

		self.tokens.retain(|key, _| !key.belongs_to(owner, platform));

		before - self.tokens.len()
	}

	/// Inserts a pending consent, sweeping any that expired at or before `now` first.
	pub(crate) fn put_consent(
		&mut self,
		digest: ConsentDigest,
		record: ConsentRecord,
		now: OffsetDateTime,
	) {
		self.purge_expired_consents(now);
		self.consents.insert(digest, record);
	}

	pub(crate) fn take_consent(
		&mut self,
		digest: &ConsentDigest,
		now: OffsetDateTime,
	) -> Option<ConsentRecord> {
		self.consents.remove(digest).filter(|record| !record.is_expired_at(now))
	}

	pub(crate) fn purge_expired_consents(&mut self, now: OffsetDateTime) -> usize {
		let before = self.consents.len();

		self.consents.retain(|_, record| !record.is_expired_at(now));

		before - self.consents.len()
	}
}
