//! Simple file-backed [`BrokerStore`] for single-instance deployments.

// std
use std::{
	fs::{self, File},
	io::Write,
	path::{Path, PathBuf},
};
// self
use crate::{
	_prelude::*,
	auth::{OAuthToken, OwnerId, PlatformId, TokenKey},
	state::ConsentDigest,
	store::{BrokerStore, CompareAndSwapOutcome, ConsentRecord, StoreError, StoreFuture, Tables},
};

/// On-disk layout: tokens carry their own key, consents are keyed by digest.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
	tokens: Vec<OAuthToken>,
	consents: BTreeMap<ConsentDigest, ConsentRecord>,
}
impl From<&Tables> for Snapshot {
	fn from(tables: &Tables) -> Self {
		Self {
			tokens: tables.tokens.values().cloned().collect(),
			consents: tables.consents.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
		}
	}
}
impl From<Snapshot> for Tables {
	fn from(snapshot: Snapshot) -> Self {
		Self {
			tokens: snapshot.tokens.into_iter().map(|token| (token.key.clone(), token)).collect(),
			consents: snapshot.consents.into_iter().collect(),
		}
	}
}

/// Persists broker records to a JSON file after each mutation.
#[derive(Clone, Debug)]
pub struct FileStore {
	path: PathBuf,
	inner: Arc<RwLock<Tables>>,
}
impl FileStore {
	/// Opens (or creates) a store at the provided path, eagerly loading existing data.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();

		Self::ensure_parent_exists(&path)?;

		let tables = Self::load_snapshot(&path)?.into();

		Ok(Self { path, inner: Arc::new(RwLock::new(tables)) })
	}

	fn load_snapshot(path: &Path) -> Result<Snapshot, StoreError> {
		if !path.exists() {
			return Ok(Snapshot::default());
		}

		let bytes = fs::read(path).map_err(|e| StoreError::Backend {
			message: format!("Failed to read {}: {e}", path.display()),
		})?;

		if bytes.is_empty() {
			return Ok(Snapshot::default());
		}

		serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization {
			message: format!("Failed to parse {}: {e}", path.display()),
		})
	}

	fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
				message: format!("Failed to create store directory {}: {e}", parent.display()),
			})?;
		}

		Ok(())
	}

	fn persist_locked(&self, tables: &Tables) -> Result<(), StoreError> {
		Self::ensure_parent_exists(&self.path)?;

		let serialized = serde_json::to_vec_pretty(&Snapshot::from(tables)).map_err(|e| {
			StoreError::Serialization { message: format!("Failed to serialize store snapshot: {e}") }
		})?;
		let mut tmp_path = self.path.clone();

		tmp_path.set_extension("tmp");

		{
			let mut file = File::create(&tmp_path).map_err(|e| StoreError::Backend {
				message: format!("Failed to create {}: {e}", tmp_path.display()),
			})?;

			file.write_all(&serialized).map_err(|e| StoreError::Backend {
				message: format!("Failed to write {}: {e}", tmp_path.display()),
			})?;
			file.sync_all().map_err(|e| StoreError::Backend {
				message: format!("Failed to sync {}: {e}", tmp_path.display()),
			})?;
		}

		fs::rename(&tmp_path, &self.path).map_err(|e| StoreError::Backend {
			message: format!("Failed to replace {}: {e}", self.path.display()),
		})
	}

	/// Applies a mutation to a staged copy under the write lock; the copy replaces the live
	/// tables only once it has been persisted.
	fn mutate<T>(
		&self,
		apply: impl FnOnce(&mut Tables) -> T,
		changed: impl FnOnce(&T) -> bool,
	) -> Result<T, StoreError> {
		let mut guard = self.inner.write();
		let mut staged = guard.clone();
		let output = apply(&mut staged);

		if changed(&output) {
			self.persist_locked(&staged)?;

			*guard = staged;
		}

		Ok(output)
	}
}
impl BrokerStore for FileStore {
	fn save(&self, token: OAuthToken) -> StoreFuture<'_, ()> {
		let result = self.mutate(|tables| tables.save(token), |_| true);

		Box::pin(async move { result })
	}

	fn fetch<'a>(&'a self, key: &'a TokenKey) -> StoreFuture<'a, Option<OAuthToken>> {
		let found = self.inner.read().tokens.get(key).cloned();

		Box::pin(async move { Ok(found) })
	}

	fn compare_and_swap_refresh<'a>(
		&'a self,
		key: &'a TokenKey,
		expected_refresh: Option<&'a str>,
		replacement: OAuthToken,
	) -> StoreFuture<'a, CompareAndSwapOutcome> {
		let result = self.mutate(
			|tables| tables.compare_and_swap_refresh(key, expected_refresh, replacement),
			|outcome| matches!(outcome, CompareAndSwapOutcome::Updated),
		);

		Box::pin(async move { result })
	}

	fn delete<'a>(&'a self, key: &'a TokenKey) -> StoreFuture<'a, bool> {
		let result = self.mutate(|tables| tables.delete(key), |existed| *existed);

		Box::pin(async move { result })
	}

	fn delete_platform<'a>(
		&'a self,
		owner: &'a OwnerId,
		platform: &'a PlatformId,
	) -> StoreFuture<'a, usize> {
		let result =
			self.mutate(|tables| tables.delete_platform(owner, platform), |removed| *removed > 0);

		Box::pin(async move { result })
	}

	fn put_consent(&self, digest: ConsentDigest, record: ConsentRecord) -> StoreFuture<'_, ()> {
		let now = OffsetDateTime::now_utc();
		let result = self.mutate(|tables| tables.put_consent(digest, record, now), |_| true);

		Box::pin(async move { result })
	}

	fn take_consent<'a>(
		&'a self,
		digest: &'a ConsentDigest,
		now: OffsetDateTime,
	) -> StoreFuture<'a, Option<ConsentRecord>> {
		let result = self.mutate(
			|tables| {
				let existed = tables.consents.contains_key(digest);

				(existed, tables.take_consent(digest, now))
			},
			|(existed, _)| *existed,
		);

		Box::pin(async move { result.map(|(_, taken)| taken) })
	}

	fn purge_expired_consents(&self, now: OffsetDateTime) -> StoreFuture<'_, usize> {
		let result =
			self.mutate(|tables| tables.purge_expired_consents(now), |removed| *removed > 0);

		Box::pin(async move { result })
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::{env, process};
	// crates.io
	use tokio::runtime::Runtime;
	// self
	use super::*;
	use crate::{auth::ScopeSet, store::ConsentSecret, tenant::ApiKeyHash};

	fn temp_path() -> PathBuf {
		let unique = format!(
			"platform_broker_file_store_{}_{}.json",
			process::id(),
			OffsetDateTime::now_utc().unix_timestamp_nanos(),
		);

		env::temp_dir().join(unique)
	}

	fn build_token() -> OAuthToken {
		let key = TokenKey::new(
			OwnerId::new("U1").expect("Failed to build owner fixture."),
			PlatformId::new("twitter").expect("Failed to build platform fixture."),
			"2244994945".parse().expect("Failed to build platform user fixture."),
		);

		OAuthToken::builder(key)
			.access_token("access-token")
			.refresh_token("refresh-token")
			.scope(ScopeSet::new(["tweet.read"]).expect("Failed to build scope fixture."))
			.expires_in(Duration::hours(1))
			.build()
			.expect("Failed to build file-store test token.")
	}

	#[test]
	fn save_and_reload_round_trip() {
		let path = temp_path();
		let store = FileStore::open(&path).expect("Failed to open file store snapshot.");
		let token = build_token();
		let digest = ConsentDigest::of("state");
		let consent = ConsentRecord {
			platform: token.key.platform.clone(),
			owner: token.key.owner.clone(),
			api_key_hash: ApiKeyHash::from_secret("key"),
			scope: token.scope.clone(),
			expires_at: OffsetDateTime::now_utc() + Duration::minutes(10),
			secret: ConsentSecret::PkceVerifier { verifier: "verifier".into() },
		};
		let rt = Runtime::new().expect("Failed to build Tokio runtime for file store test.");

		rt.block_on(store.save(token.clone())).expect("Failed to save fixture token to file store.");
		rt.block_on(store.put_consent(digest.clone(), consent.clone()))
			.expect("Failed to save fixture consent to file store.");
		drop(store);

		let reopened = FileStore::open(&path).expect("Failed to reopen file store snapshot.");
		let fetched = rt
			.block_on(reopened.fetch(&token.key))
			.expect("Failed to fetch fixture token from file store.")
			.expect("File store lost token after reopen.");

		assert_eq!(fetched.access_token.expose(), "access-token");
		assert_eq!(fetched.refresh_secret(), Some("refresh-token"));
		assert_eq!(
			rt.block_on(reopened.take_consent(&digest, OffsetDateTime::now_utc()))
				.expect("Failed to take fixture consent."),
			Some(consent)
		);
		assert_eq!(
			rt.block_on(reopened.delete_platform(&token.key.owner, &token.key.platform))
				.expect("Failed to purge fixture platform."),
			1
		);
		drop(reopened);

		let emptied = FileStore::open(&path).expect("Failed to reopen emptied snapshot.");

		assert!(
			rt.block_on(emptied.fetch(&token.key))
				.expect("Failed to fetch from emptied store.")
				.is_none()
		);
		assert_eq!(
			rt.block_on(emptied.take_consent(&digest, OffsetDateTime::now_utc()))
				.expect("Failed to take consumed consent."),
			None,
			"Consumed consents stay consumed across restarts."
		);

		fs::remove_file(&path).unwrap_or_else(|e| {
			panic!("Failed to remove temporary file store snapshot {}: {e}", path.display())
		});
	}

	#[test]
	fn failed_writes_leave_memory_untouched() {
		let path = temp_path();
		let store = FileStore::open(&path).expect("Failed to open file store snapshot.");
		let token = build_token();
		let rt = Runtime::new().expect("Failed to build Tokio runtime for file store test.");

		// A directory in place of the snapshot makes the final rename fail.
		fs::create_dir(&path).expect("Failed to create blocking directory.");

		assert!(matches!(
			rt.block_on(store.save(token.clone())),
			Err(StoreError::Backend { .. })
		));
		assert!(
			rt.block_on(store.fetch(&token.key))
				.expect("Failed to fetch from file store.")
				.is_none(),
			"Unpersisted writes must not become visible."
		);

		let mut tmp_path = path.clone();

		tmp_path.set_extension("tmp");

		let _ = fs::remove_file(&tmp_path);

		fs::remove_dir(&path).unwrap_or_else(|e| {
			panic!("Failed to remove blocking directory {}: {e}", path.display())
		});
	}
}
