//! Broker runtime settings and signing key material.

// crates.io
use base64::{
	Engine as _,
	engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
};
use oauth2::http::HeaderValue;
use rand::Rng;
// self
use crate::{_prelude::*, error::ConfigError};

/// Minimum accepted signing key length in bytes.
pub const MIN_SIGNING_KEY_LEN: usize = 32;
/// `User-Agent` sent when no configuration overrides it.
pub const DEFAULT_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Tunable timings and identity for a broker instance.
///
/// Durations are expressed in whole seconds when loaded from JSON; omitted fields fall back to
/// [`BrokerConfig::default`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
	/// Lifetime of a consent record and of the signed state.
	#[serde(rename = "consent_ttl_secs", with = "seconds")]
	pub consent_ttl: Duration,
	/// Tokens expiring within this window are refreshed lazily.
	#[serde(rename = "refresh_skew_secs", with = "seconds")]
	pub refresh_skew: Duration,
	/// Tolerated clock drift for states minted by a peer instance.
	#[serde(rename = "state_clock_skew_secs", with = "seconds")]
	pub state_clock_skew: Duration,
	/// `User-Agent` sent on every platform request.
	pub user_agent: String,
}
impl BrokerConfig {
	/// Parses and validates a JSON document.
	pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
		let mut de = serde_json::Deserializer::from_str(raw);
		let config: Self = serde_path_to_error::deserialize(&mut de)
			.map_err(|source| ConfigError::Parse { source })?;

		config.validate()?;

		Ok(config)
	}

	/// Checks the settings for values the broker cannot operate with.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if !self.consent_ttl.is_positive() {
			return Err(ConfigError::InvalidSettings {
				field: "consent_ttl_secs",
				reason: "must be positive".into(),
			});
		}
		if self.refresh_skew.is_negative() {
			return Err(ConfigError::InvalidSettings {
				field: "refresh_skew_secs",
				reason: "must not be negative".into(),
			});
		}
		if self.state_clock_skew.is_negative() {
			return Err(ConfigError::InvalidSettings {
				field: "state_clock_skew_secs",
				reason: "must not be negative".into(),
			});
		}
		if self.user_agent.trim().is_empty() || HeaderValue::from_str(&self.user_agent).is_err() {
			return Err(ConfigError::InvalidSettings {
				field: "user_agent",
				reason: "must be a non-empty header value".into(),
			});
		}

		Ok(())
	}
}
impl Default for BrokerConfig {
	fn default() -> Self {
		Self {
			consent_ttl: Duration::minutes(10),
			refresh_skew: Duration::seconds(60),
			state_clock_skew: Duration::seconds(30),
			user_agent: DEFAULT_USER_AGENT.into(),
		}
	}
}

/// HMAC key used to authenticate correlation state.
#[derive(Clone, PartialEq, Eq)]
pub struct SigningKey(Arc<[u8]>);
impl SigningKey {
	/// Wraps raw key bytes, rejecting keys shorter than [`MIN_SIGNING_KEY_LEN`].
	pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self, ConfigError> {
		let bytes = bytes.into();

		if bytes.len() < MIN_SIGNING_KEY_LEN {
			return Err(ConfigError::InvalidSettings {
				field: "signing_key",
				reason: format!("must be at least {MIN_SIGNING_KEY_LEN} bytes"),
			});
		}

		Ok(Self(Arc::from(bytes)))
	}

	/// Decodes a standard or URL-safe base64 key.
	pub fn from_base64(encoded: &str) -> Result<Self, ConfigError> {
		let trimmed = encoded.trim();
		let bytes = STANDARD
			.decode(trimmed)
			.or_else(|_| URL_SAFE_NO_PAD.decode(trimmed.trim_end_matches('=')))
			.map_err(|e| ConfigError::InvalidSettings {
				field: "signing_key",
				reason: e.to_string(),
			})?;

		Self::new(bytes)
	}

	/// Generates a fresh random key of [`MIN_SIGNING_KEY_LEN`] bytes.
	pub fn generate() -> Self {
		let mut bytes = [0_u8; MIN_SIGNING_KEY_LEN];

		rand::rng().fill(&mut bytes);

		Self(Arc::from(bytes.to_vec()))
	}

	pub(crate) fn as_bytes(&self) -> &[u8] {
		&self.0
	}
}
impl Debug for SigningKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("SigningKey").field(&"<redacted>").finish()
	}
}

mod seconds {
	// crates.io
	use serde::{Deserializer, Serializer};
	// self
	use crate::_prelude::*;

	pub fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_i64(value.whole_seconds())
	}

	pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
	where
		D: Deserializer<'de>,
	{
		i64::deserialize(deserializer).map(Duration::seconds)
	}
}
