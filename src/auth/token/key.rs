//! Token keys scoping every stored record to an owner, platform, and platform user.

// self
use crate::{
	_prelude::*,
	auth::{OwnerId, PlatformId, PlatformUserId},
};

/// Unique key identifying a stored token: `(owner, platform, platform_user)`.
///
/// The owner component is what isolates tenants from each other; every lookup the broker
/// performs is scoped by it.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TokenKey {
	/// Tenant user that owns the OAuth app the token was issued through.
	pub owner: OwnerId,
	/// Platform that issued the token.
	pub platform: PlatformId,
	/// Platform-scoped identity of the end user.
	pub platform_user: PlatformUserId,
}
impl TokenKey {
	/// Creates a key for the provided tuple.
	pub fn new(owner: OwnerId, platform: PlatformId, platform_user: PlatformUserId) -> Self {
		Self { owner, platform, platform_user }
	}

	/// Returns true when the key belongs to the provided owner/platform pair.
	pub fn belongs_to(&self, owner: &OwnerId, platform: &PlatformId) -> bool {
		&self.owner == owner && &self.platform == platform
	}
}
impl Display for TokenKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "{}/{}/{}", self.owner, self.platform, self.platform_user)
	}
}
