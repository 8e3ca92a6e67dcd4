//! Canonical token records, lifecycle helpers, and builders.

// self
use crate::{
	_prelude::*,
	auth::{
		ScopeSet,
		token::{key::TokenKey, secret::TokenSecret},
	},
};

/// Token type recorded when a platform omits `token_type`.
pub const DEFAULT_TOKEN_TYPE: &str = "Bearer";

/// Current lifecycle status for a token record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenStatus {
	/// Token is usable.
	Active,
	/// Token expired (or is about to, within the skew buffer).
	Stale,
	/// A refresh was rejected by the platform; terminal until the user re-consents.
	Revoked,
}

/// Errors produced by [`OAuthTokenBuilder`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum TokenBuildError {
	/// Issued when no access token value was provided.
	#[error("Access token is required.")]
	MissingAccessToken,
}

/// Normalized token record shared by every protocol family.
///
/// OAuth 1.0a records carry the token secret in `refresh_token`; they are never refreshed
/// because their descriptors disable refresh.
#[derive(Clone, Serialize, Deserialize)]
pub struct OAuthToken {
	/// Owner/platform/platform-user tuple the record is stored under.
	pub key: TokenKey,
	/// Access token secret; callers must avoid logging it.
	pub access_token: TokenSecret,
	/// Refresh token (or OAuth 1.0a token secret), if the platform issued one.
	pub refresh_token: Option<TokenSecret>,
	/// Token type, `Bearer` unless the platform said otherwise.
	pub token_type: String,
	/// Normalized scopes granted to this record.
	pub scope: ScopeSet,
	/// Instant the broker received the token.
	pub issued_at: OffsetDateTime,
	/// Expiry instant, when the platform announced one.
	pub expires_at: Option<OffsetDateTime>,
	/// Set once a refresh was rejected as revoked.
	pub revoked_at: Option<OffsetDateTime>,
}
impl OAuthToken {
	/// Returns a builder for the provided key.
	pub fn builder(key: TokenKey) -> OAuthTokenBuilder {
		OAuthTokenBuilder::new(key)
	}

	/// Computes the lifecycle status at `instant`, treating tokens that expire within `skew`
	/// as already stale.
	pub fn status_at(&self, instant: OffsetDateTime, skew: Duration) -> TokenStatus {
		if self.revoked_at.is_some() {
			return TokenStatus::Revoked;
		}

		match self.expires_at {
			Some(expires_at) if instant + skew >= expires_at => TokenStatus::Stale,
			_ => TokenStatus::Active,
		}
	}

	/// Returns `true` if the record is stale at `instant` given `skew`.
	pub fn is_stale_at(&self, instant: OffsetDateTime, skew: Duration) -> bool {
		matches!(self.status_at(instant, skew), TokenStatus::Stale)
	}

	/// Returns `true` if the record has been revoked.
	pub fn is_revoked(&self) -> bool {
		self.revoked_at.is_some()
	}

	/// Marks the record as revoked.
	pub fn revoke(&mut self, instant: OffsetDateTime) {
		self.revoked_at = Some(instant);
	}

	/// Returns the refresh secret as a plain string slice.
	pub fn refresh_secret(&self) -> Option<&str> {
		self.refresh_token.as_ref().map(TokenSecret::expose)
	}
}
impl Debug for OAuthToken {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("OAuthToken")
			.field("key", &self.key)
			.field("access_token", &"<redacted>")
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.field("token_type", &self.token_type)
			.field("scope", &self.scope)
			.field("issued_at", &self.issued_at)
			.field("expires_at", &self.expires_at)
			.field("revoked_at", &self.revoked_at)
			.finish()
	}
}

/// Builder for [`OAuthToken`].
#[derive(Clone, Debug)]
pub struct OAuthTokenBuilder {
	key: TokenKey,
	access_token: Option<TokenSecret>,
	refresh_token: Option<TokenSecret>,
	token_type: Option<String>,
	scope: ScopeSet,
	issued_at: Option<OffsetDateTime>,
	expires_at: Option<OffsetDateTime>,
	expires_in: Option<Duration>,
}
impl OAuthTokenBuilder {
	fn new(key: TokenKey) -> Self {
		Self {
			key,
			access_token: None,
			refresh_token: None,
			token_type: None,
			scope: ScopeSet::default(),
			issued_at: None,
			expires_at: None,
			expires_in: None,
		}
	}

	/// Provides the access token value.
	pub fn access_token(mut self, token: impl Into<TokenSecret>) -> Self {
		self.access_token = Some(token.into());

		self
	}

	/// Provides the refresh token value.
	pub fn refresh_token(mut self, token: impl Into<TokenSecret>) -> Self {
		self.refresh_token = Some(token.into());

		self
	}

	/// Overrides the token type.
	pub fn token_type(mut self, token_type: impl Into<String>) -> Self {
		self.token_type = Some(token_type.into());

		self
	}

	/// Sets the granted scopes.
	pub fn scope(mut self, scope: ScopeSet) -> Self {
		self.scope = scope;

		self
	}

	/// Sets the issued-at instant.
	pub fn issued_at(mut self, instant: OffsetDateTime) -> Self {
		self.issued_at = Some(instant);

		self
	}

	/// Sets an absolute expiry instant.
	pub fn expires_at(mut self, instant: OffsetDateTime) -> Self {
		self.expires_at = Some(instant);

		self
	}

	/// Sets a relative expiry duration from the issued instant.
	pub fn expires_in(mut self, duration: Duration) -> Self {
		self.expires_in = Some(duration);

		self
	}

	/// Consumes the builder and produces an [`OAuthToken`].
	pub fn build(self) -> Result<OAuthToken, TokenBuildError> {
		let access_token = self.access_token.ok_or(TokenBuildError::MissingAccessToken)?;
		let issued_at = self.issued_at.unwrap_or_else(OffsetDateTime::now_utc);
		// Lifetimes past the representable range mean no expiry.
		let expires_at =
			self.expires_at.or_else(|| self.expires_in.and_then(|delta| issued_at.checked_add(delta)));

		Ok(OAuthToken {
			key: self.key,
			access_token,
			refresh_token: self.refresh_token,
			token_type: self.token_type.unwrap_or_else(|| DEFAULT_TOKEN_TYPE.into()),
			scope: self.scope,
			issued_at,
			expires_at,
			revoked_at: None,
		})
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;
	use crate::auth::{OwnerId, PlatformId, PlatformUserId};

	fn key() -> TokenKey {
		TokenKey::new(
			OwnerId::new("owner-1").expect("Owner fixture should be valid."),
			PlatformId::new("github").expect("Platform fixture should be valid."),
			PlatformUserId::new("583231").expect("Platform user fixture should be valid."),
		)
	}

	#[test]
	fn status_transitions_cover_all_states() {
		let issued = macros::datetime!(2025-01-01 00:00 UTC);
		let mut record = OAuthToken::builder(key())
			.access_token("access")
			.refresh_token("refresh")
			.issued_at(issued)
			.expires_in(Duration::hours(1))
			.build()
			.expect("Token builder should succeed for status transitions.");
		let skew = Duration::seconds(60);

		assert_eq!(record.status_at(macros::datetime!(2025-01-01 00:30 UTC), skew), TokenStatus::Active);
		assert_eq!(
			record.status_at(macros::datetime!(2025-01-01 00:59:30 UTC), skew),
			TokenStatus::Stale,
			"Tokens inside the skew buffer are already stale."
		);
		assert_eq!(record.status_at(macros::datetime!(2025-01-01 02:00 UTC), skew), TokenStatus::Stale);

		record.revoke(macros::datetime!(2025-01-01 00:10 UTC));

		assert_eq!(record.status_at(macros::datetime!(2025-01-01 00:30 UTC), skew), TokenStatus::Revoked);
	}

	#[test]
	fn tokens_without_expiry_never_go_stale() {
		let record = OAuthToken::builder(key())
			.access_token("long-lived")
			.build()
			.expect("Tokens without expiry should build.");

		assert_eq!(record.expires_at, None);
		assert_eq!(record.token_type, DEFAULT_TOKEN_TYPE);
		assert!(!record.is_stale_at(macros::datetime!(2999-01-01 00:00 UTC), Duration::hours(1)));
	}

	#[test]
	fn unrepresentable_lifetimes_mean_no_expiry() {
		let record = OAuthToken::builder(key())
			.access_token("access")
			.issued_at(macros::datetime!(2025-01-01 00:00 UTC))
			.expires_in(Duration::seconds(i64::MAX))
			.build()
			.expect("Huge lifetimes should still build.");

		assert_eq!(record.expires_at, None);
	}

	#[test]
	fn builder_requires_an_access_token() {
		let err = OAuthToken::builder(key()).build().expect_err("Access token is mandatory.");

		assert_eq!(err, TokenBuildError::MissingAccessToken);
	}

	#[test]
	fn debug_output_redacts_secrets() {
		let record = OAuthToken::builder(key())
			.access_token("very-secret-access")
			.refresh_token("very-secret-refresh")
			.build()
			.expect("Token builder should succeed.");
		let rendered = format!("{record:?}");

		assert!(!rendered.contains("very-secret"));
		assert!(rendered.contains("<redacted>"));
	}
}
