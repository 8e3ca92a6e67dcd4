//! Tenant-owned registrations read by the broker: OAuth apps and API-key hashes.
//!
//! Tenant management owns these records; the broker only reads them through [`AppDirectory`].

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};
// self
use crate::{
	_prelude::*,
	auth::{OwnerId, PlatformId, ScopeSet},
	store::StoreFuture,
};

/// OAuth client secret (or OAuth 1.0a consumer secret); redacted in every formatter.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientSecret(String);
impl ClientSecret {
	/// Wraps a secret string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the secret. Callers must avoid logging it.
	pub fn expose(&self) -> &str {
		&self.0
	}
}
impl Debug for ClientSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("ClientSecret").field(&"<redacted>").finish()
	}
}
impl Display for ClientSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}

/// One-way hash of a tenant API key (SHA-256, base64url without padding).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApiKeyHash(String);
impl ApiKeyHash {
	/// Hashes a raw API key secret. The raw value is not retained.
	pub fn from_secret(raw: &str) -> Self {
		Self(URL_SAFE_NO_PAD.encode(Sha256::digest(raw.as_bytes())))
	}

	/// Wraps a digest that was already computed by tenant management.
	pub fn from_digest(digest: impl Into<String>) -> Self {
		Self(digest.into())
	}

	/// Returns the encoded digest.
	pub fn as_str(&self) -> &str {
		&self.0
	}
}
impl Display for ApiKeyHash {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.0)
	}
}

/// Tenant registration of client credentials for one platform.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthApp {
	/// Tenant user owning the registration.
	pub owner: OwnerId,
	/// Platform the credentials belong to.
	pub platform: PlatformId,
	/// OAuth client id (OAuth 1.0a consumer key, OpenID 2.0 realm owner).
	pub client_id: String,
	/// OAuth client secret (OAuth 1.0a consumer secret).
	pub client_secret: ClientSecret,
	/// Redirect URI registered with the platform.
	pub redirect_uri: Url,
	/// Scope allow-list; also the default request when the caller asks for nothing.
	pub scopes: Option<ScopeSet>,
	/// Public PKCE client; the client secret is never sent.
	pub public: bool,
}
impl OAuthApp {
	/// Creates a confidential app without a scope override.
	pub fn new(
		owner: OwnerId,
		platform: PlatformId,
		client_id: impl Into<String>,
		client_secret: impl Into<String>,
		redirect_uri: Url,
	) -> Self {
		Self {
			owner,
			platform,
			client_id: client_id.into(),
			client_secret: ClientSecret::new(client_secret),
			redirect_uri,
			scopes: None,
			public: false,
		}
	}

	/// Restricts the app to the provided scopes.
	pub fn with_scopes(mut self, scopes: ScopeSet) -> Self {
		self.scopes = Some(scopes);

		self
	}

	/// Marks the app as a public PKCE client.
	pub fn public_client(mut self) -> Self {
		self.public = true;

		self
	}

	/// Returns the secret to send, or `None` for public clients.
	pub fn confidential_secret(&self) -> Option<&str> {
		if self.public { None } else { Some(self.client_secret.expose()) }
	}
}

/// Read-only view of tenant registrations.
pub trait AppDirectory
where
	Self: Send + Sync,
{
	/// Looks up the app an owner registered for a platform.
	fn find_app<'a>(
		&'a self,
		owner: &'a OwnerId,
		platform: &'a PlatformId,
	) -> StoreFuture<'a, Option<OAuthApp>>;

	/// Resolves an API-key hash to its owner, if the key is still active.
	fn resolve_api_key<'a>(&'a self, api_key: &'a ApiKeyHash) -> StoreFuture<'a, Option<OwnerId>>;
}

/// In-memory [`AppDirectory`] for tests, demos, and single-process deployments.
#[derive(Clone, Debug, Default)]
pub struct MemoryDirectory {
	apps: Arc<RwLock<HashMap<(OwnerId, PlatformId), OAuthApp>>>,
	api_keys: Arc<RwLock<HashMap<ApiKeyHash, OwnerId>>>,
}
impl MemoryDirectory {
	/// Registers or replaces an app.
	pub fn register_app(&self, app: OAuthApp) {
		self.apps.write().insert((app.owner.clone(), app.platform.clone()), app);
	}

	/// Removes an app, returning it when present.
	pub fn remove_app(&self, owner: &OwnerId, platform: &PlatformId) -> Option<OAuthApp> {
		self.apps.write().remove(&(owner.clone(), platform.clone()))
	}

	/// Registers an API-key hash for an owner.
	pub fn register_api_key(&self, api_key: ApiKeyHash, owner: OwnerId) {
		self.api_keys.write().insert(api_key, owner);
	}

	/// Revokes an API-key hash.
	pub fn revoke_api_key(&self, api_key: &ApiKeyHash) -> bool {
		self.api_keys.write().remove(api_key).is_some()
	}
}
impl AppDirectory for MemoryDirectory {
	fn find_app<'a>(
		&'a self,
		owner: &'a OwnerId,
		platform: &'a PlatformId,
	) -> StoreFuture<'a, Option<OAuthApp>> {
		let found = self.apps.read().get(&(owner.clone(), platform.clone())).cloned();

		Box::pin(async move { Ok(found) })
	}

	fn resolve_api_key<'a>(&'a self, api_key: &'a ApiKeyHash) -> StoreFuture<'a, Option<OwnerId>> {
		let found = self.api_keys.read().get(api_key).cloned();

		Box::pin(async move { Ok(found) })
	}
}
