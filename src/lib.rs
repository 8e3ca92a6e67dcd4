//! Multi-tenant OAuth platform broker: descriptor-driven consent URLs, signed correlation
//! state, OAuth 2.0/PKCE, OAuth 1.0a and OpenID 2.0 exchanges, table-driven identity
//! extraction, and CAS-backed single-flight token refresh.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod config;
pub mod error;
pub mod exchange;
pub mod flows;
pub mod http;
pub mod obs;
pub mod platform;
pub mod state;
pub mod store;
pub mod tenant;
#[cfg(all(any(test, feature = "test"), feature = "reqwest"))]
#[doc(hidden)]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		auth::{OwnerId, PlatformId},
		config::SigningKey,
		exchange::ReqwestTransportErrorMapper,
		flows::Broker,
		http::ReqwestHttpClient,
		platform::PlatformRegistry,
		state::StateCodec,
		store::{BrokerStore, MemoryStore},
		tenant::{ApiKeyHash, AppDirectory, MemoryDirectory, OAuthApp},
	};

	/// Broker type alias used by reqwest-backed integration tests.
	pub type ReqwestTestBroker = Broker<ReqwestHttpClient, ReqwestTransportErrorMapper>;

	/// Key material shared by every test broker so states can be minted out of band.
	pub const TEST_SIGNING_KEY: [u8; 32] = [7; 32];
	/// Client id registered by [`register_test_app`].
	pub const TEST_CLIENT_ID: &str = "client-it";
	/// Client secret registered by [`register_test_app`].
	pub const TEST_CLIENT_SECRET: &str = "secret-it";
	/// Redirect URI registered by [`register_test_app`].
	pub const TEST_REDIRECT_URI: &str = "https://app.example.com/callback";

	/// Tenant user owning every fixture app.
	pub fn test_owner() -> OwnerId {
		OwnerId::new("tenant-user-1").expect("Test owner should be valid.")
	}

	/// API key hash that resolves to [`test_owner`].
	pub fn test_api_key() -> ApiKeyHash {
		ApiKeyHash::from_secret("pb_test_api_key")
	}

	/// Registers a confidential app for `platform` plus the test API key, returning the app.
	pub fn register_test_app(directory: &MemoryDirectory, platform: &str) -> OAuthApp {
		let app = OAuthApp::new(
			test_owner(),
			PlatformId::new(platform).expect("Test platform should be valid."),
			TEST_CLIENT_ID,
			TEST_CLIENT_SECRET,
			Url::parse(TEST_REDIRECT_URI).expect("Test redirect URI should parse."),
		);

		directory.register_app(app.clone());
		directory.register_api_key(test_api_key(), test_owner());

		app
	}

	/// Builds a reqwest HTTP client that accepts the self-signed certificates produced by
	/// `httpmock` during tests.
	pub fn test_reqwest_http_client() -> ReqwestHttpClient {
		let client = ReqwestClient::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.redirect(reqwest::redirect::Policy::none())
			.build()
			.expect("Failed to build insecure Reqwest client for tests.");

		ReqwestHttpClient::with_client(client)
	}

	/// Returns the state codec used by [`build_reqwest_test_broker`].
	pub fn test_state_codec() -> StateCodec {
		StateCodec::new(
			SigningKey::new(TEST_SIGNING_KEY.to_vec()).expect("Test signing key should be valid."),
		)
	}

	/// Constructs a [`Broker`] backed by an in-memory store and app directory plus the reqwest
	/// transport used across integration tests.
	pub fn build_reqwest_test_broker(
		registry: PlatformRegistry,
	) -> (ReqwestTestBroker, Arc<MemoryStore>, Arc<MemoryDirectory>) {
		let store_backend = Arc::new(MemoryStore::default());
		let store: Arc<dyn BrokerStore> = store_backend.clone();
		let directory_backend = Arc::new(MemoryDirectory::default());
		let directory: Arc<dyn AppDirectory> = directory_backend.clone();
		let broker = Broker::with_http_client(
			store,
			directory,
			registry,
			test_state_codec(),
			test_reqwest_http_client(),
			Arc::new(ReqwestTransportErrorMapper),
		);

		(broker, store_backend, directory_backend)
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(all(test, feature = "reqwest"))] use {color_eyre as _, httpmock as _};
