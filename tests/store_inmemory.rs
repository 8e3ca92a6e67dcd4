#![cfg(all(feature = "reqwest", feature = "test"))]

// crates.io
use time::macros;
// self
use platform_broker::{
	_preludet::*,
	auth::{OAuthToken, OwnerId, PlatformId, ScopeSet, TokenKey},
	state::ConsentDigest,
	store::{BrokerStore, CompareAndSwapOutcome, ConsentRecord, ConsentSecret, MemoryStore},
	tenant::ApiKeyHash,
};

fn make_key(platform: &str, user: &str) -> TokenKey {
	TokenKey::new(
		OwnerId::new("tenant-user-1").expect("Failed to build owner identifier for store tests."),
		PlatformId::new(platform).expect("Failed to build platform identifier for store tests."),
		user.parse().expect("Failed to build platform user identifier for store tests."),
	)
}

fn build_token(key: &TokenKey, access: &str, refresh: Option<&str>) -> OAuthToken {
	let issued = macros::datetime!(2025-11-10 12:00 UTC);
	let mut builder = OAuthToken::builder(key.clone())
		.access_token(access)
		.scope(ScopeSet::new(["email", "profile"]).expect("Failed to build scope fixture."))
		.issued_at(issued)
		.expires_at(issued + Duration::hours(1));

	if let Some(value) = refresh {
		builder = builder.refresh_token(value);
	}

	builder.build().expect("Token fixture should build successfully.")
}

fn build_consent(expires_at: OffsetDateTime) -> ConsentRecord {
	ConsentRecord {
		platform: PlatformId::new("github").expect("Failed to build platform fixture."),
		owner: OwnerId::new("tenant-user-1").expect("Failed to build owner fixture."),
		api_key_hash: ApiKeyHash::from_secret("sk-test"),
		scope: ScopeSet::new(["repo"]).expect("Failed to build scope fixture."),
		expires_at,
		secret: ConsentSecret::None,
	}
}

#[tokio::test]
async fn save_and_fetch_round_trip() {
	let store = MemoryStore::default();
	let key = make_key("github", "4242");
	let token = build_token(&key, "access-1", Some("refresh-1"));

	store.save(token.clone()).await.expect("Saving token fixture into memory store should succeed.");

	let fetched = store
		.fetch(&key)
		.await
		.expect("Fetching token from memory store should succeed.")
		.expect("Stored token should remain present.");

	assert_eq!(fetched.access_token.expose(), "access-1");
	assert_eq!(fetched.refresh_secret(), Some("refresh-1"));
	assert!(
		store
			.fetch(&make_key("github", "other"))
			.await
			.expect("Fetching an unknown key should succeed.")
			.is_none()
	);
}

#[tokio::test]
async fn cas_success_mismatch_and_missing() {
	let store = MemoryStore::default();
	let key = make_key("github", "4242");

	store
		.save(build_token(&key, "access-initial", Some("refresh-old")))
		.await
		.expect("Saving initial token should succeed.");

	let replacement = build_token(&key, "access-new", Some("refresh-new"));
	let outcome = store
		.compare_and_swap_refresh(&key, Some("refresh-old"), replacement)
		.await
		.expect("CAS should succeed when refresh secrets match.");

	assert_eq!(outcome, CompareAndSwapOutcome::Updated);

	let mismatch = store
		.compare_and_swap_refresh(&key, Some("refresh-old"), build_token(&key, "late", Some("late")))
		.await
		.expect("CAS should report a mismatch when secrets differ.");

	assert_eq!(mismatch, CompareAndSwapOutcome::RefreshMismatch);

	let fetched = store
		.fetch(&key)
		.await
		.expect("Fetching updated token should succeed.")
		.expect("Updated token should remain present.");

	assert_eq!(fetched.access_token.expose(), "access-new");

	let other = make_key("github", "missing");
	let missing = store
		.compare_and_swap_refresh(&other, Some("whatever"), build_token(&other, "a", None))
		.await
		.expect("CAS should report a missing record for unknown keys.");

	assert_eq!(missing, CompareAndSwapOutcome::Missing);
}

#[tokio::test]
async fn concurrent_cas_allows_single_winner() {
	let store = MemoryStore::default();
	let key = make_key("github", "4242");

	store
		.save(build_token(&key, "access-base", Some("refresh-base")))
		.await
		.expect("Saving base token should succeed.");

	let tasks = ["a", "b"].map(|suffix| {
		let store = store.clone();
		let key = key.clone();

		tokio::spawn(async move {
			let replacement =
				build_token(&key, &format!("access-{suffix}"), Some(&format!("refresh-{suffix}")));

			store
				.compare_and_swap_refresh(&key, Some("refresh-base"), replacement)
				.await
				.expect("CAS task should complete successfully.")
		})
	});
	let mut successes = 0;

	for task in tasks {
		if task.await.expect("CAS task should not panic.") == CompareAndSwapOutcome::Updated {
			successes += 1;
		}
	}

	assert_eq!(successes, 1, "only one CAS should succeed");

	let final_token = store
		.fetch(&key)
		.await
		.expect("Fetching final token should succeed.")
		.expect("Final token should remain present.");

	assert!(matches!(final_token.refresh_secret(), Some("refresh-a") | Some("refresh-b")));
}

#[tokio::test]
async fn cas_supports_tokens_without_refresh_secrets() {
	let store = MemoryStore::default();
	let key = make_key("github", "4242");

	store.save(build_token(&key, "access", None)).await.expect("Saving token should succeed.");

	let outcome = store
		.compare_and_swap_refresh(&key, None, build_token(&key, "access-updated", None))
		.await
		.expect("CAS should succeed when neither side has a refresh secret.");

	assert_eq!(outcome, CompareAndSwapOutcome::Updated);
}

#[tokio::test]
async fn platform_purges_leave_other_platforms_alone() {
	let store = MemoryStore::default();
	let github = make_key("github", "1");

	store.save(build_token(&github, "a", None)).await.expect("Saving token should succeed.");
	store
		.save(build_token(&make_key("github", "2"), "b", None))
		.await
		.expect("Saving token should succeed.");
	store
		.save(build_token(&make_key("gitlab", "1"), "c", None))
		.await
		.expect("Saving token should succeed.");

	let removed = store
		.delete_platform(&github.owner, &github.platform)
		.await
		.expect("Platform purge should succeed.");

	assert_eq!(removed, 2);
	assert_eq!(store.token_count(), 1);
	assert!(!store.delete(&github).await.expect("Deleting a purged key should succeed."));
}

#[tokio::test]
async fn consents_are_taken_exactly_once() {
	let store = MemoryStore::default();
	let now = OffsetDateTime::now_utc();
	let digest = ConsentDigest::of("state-1");

	store
		.put_consent(digest.clone(), build_consent(now + Duration::minutes(10)))
		.await
		.expect("Storing consent should succeed.");

	let tasks = [0, 1, 2].map(|_| {
		let store = store.clone();
		let digest = digest.clone();

		tokio::spawn(async move {
			store.take_consent(&digest, now).await.expect("Taking consent should succeed.")
		})
	});
	let mut taken = 0;

	for task in tasks {
		if task.await.expect("Consent task should not panic.").is_some() {
			taken += 1;
		}
	}

	assert_eq!(taken, 1);
	assert_eq!(store.consent_count(), 0);
}

#[tokio::test]
async fn storing_a_consent_sweeps_abandoned_ones() {
	let store = MemoryStore::default();
	let now = OffsetDateTime::now_utc();

	store
		.put_consent(ConsentDigest::of("abandoned"), build_consent(now - Duration::seconds(1)))
		.await
		.expect("Storing consent should succeed.");
	store
		.put_consent(ConsentDigest::of("live"), build_consent(now + Duration::minutes(5)))
		.await
		.expect("Storing consent should succeed.");

	assert_eq!(store.consent_count(), 1);
}

#[tokio::test]
async fn expired_consents_are_purged() {
	let store = MemoryStore::default();
	let now = OffsetDateTime::now_utc();

	store
		.put_consent(ConsentDigest::of("short"), build_consent(now + Duration::minutes(1)))
		.await
		.expect("Storing consent should succeed.");
	store
		.put_consent(ConsentDigest::of("long"), build_consent(now + Duration::minutes(5)))
		.await
		.expect("Storing consent should succeed.");

	let later = now + Duration::minutes(2);

	assert_eq!(store.purge_expired_consents(later).await.expect("Purge should succeed."), 1);
	assert_eq!(store.consent_count(), 1);
	assert!(
		store
			.take_consent(&ConsentDigest::of("long"), later)
			.await
			.expect("Taking consent should succeed.")
			.is_some()
	);
}
