//! Signed correlation state threaded through the platform redirect.
//!
//! A state token is `base64url(json claims) "." base64url(HMAC-SHA256(key, first segment))`.
//! Tokens are self-contained, so any broker instance holding the signing key can verify a
//! callback. Single use is enforced by consuming the consent record keyed by
//! [`ConsentDigest`], not by the codec.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use rand::{Rng, distr::Alphanumeric};
use sha2::{Digest, Sha256};
// self
use crate::{
	_prelude::*,
	auth::{OwnerId, PlatformId},
	config::{BrokerConfig, SigningKey},
	error::{ConfigError, CorrelationError},
	tenant::ApiKeyHash,
};

type HmacSha256 = Hmac<Sha256>;

const NONCE_LEN: usize = 24;

/// Claims carried inside a state token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentClaims {
	/// Platform the consent was started for.
	#[serde(rename = "p")]
	pub platform: PlatformId,
	/// Hash of the API key the tenant authenticated with.
	#[serde(rename = "k")]
	pub api_key_hash: ApiKeyHash,
	/// Tenant user owning the consent.
	#[serde(rename = "o")]
	pub owner: OwnerId,
	/// Random value making every state unique.
	#[serde(rename = "n")]
	pub nonce: String,
	/// Mint instant, checked against the TTL on decode.
	#[serde(rename = "t", with = "time::serde::timestamp")]
	pub issued_at: OffsetDateTime,
}
impl ConsentClaims {
	/// Creates claims with a fresh random nonce.
	pub fn new(
		platform: PlatformId,
		api_key_hash: ApiKeyHash,
		owner: OwnerId,
		issued_at: OffsetDateTime,
	) -> Self {
		let nonce = rand::rng().sample_iter(Alphanumeric).take(NONCE_LEN).map(char::from).collect();

		Self { platform, api_key_hash, owner, nonce, issued_at }
	}
}

/// Lookup key for a consent record: SHA-256 of the encoded state, base64url.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConsentDigest(String);
impl ConsentDigest {
	/// Derives the digest for an encoded state token.
	pub fn of(state: &str) -> Self {
		Self(URL_SAFE_NO_PAD.encode(Sha256::digest(state.as_bytes())))
	}

	/// Returns the encoded digest.
	pub fn as_str(&self) -> &str {
		&self.0
	}
}
impl Display for ConsentDigest {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.0)
	}
}

/// Stateless HMAC codec for [`ConsentClaims`].
#[derive(Clone, Debug)]
pub struct StateCodec {
	current: SigningKey,
	previous: Vec<SigningKey>,
	ttl: Duration,
	clock_skew: Duration,
}
impl StateCodec {
	/// Creates a codec signing with `key` and the default TTL and clock skew.
	pub fn new(key: SigningKey) -> Self {
		let defaults = BrokerConfig::default();

		Self {
			current: key,
			previous: Vec::new(),
			ttl: defaults.consent_ttl,
			clock_skew: defaults.state_clock_skew,
		}
	}

	/// Accepts tokens signed with a key that has been rotated out.
	pub fn with_previous_key(mut self, key: SigningKey) -> Self {
		self.previous.push(key);

		self
	}

	/// Overrides the TTL and tolerated future skew.
	pub fn with_window(mut self, ttl: Duration, clock_skew: Duration) -> Self {
		self.ttl = ttl;
		self.clock_skew = clock_skew;

		self
	}

	/// Maximum age of an accepted token.
	pub fn ttl(&self) -> Duration {
		self.ttl
	}

	/// Encodes and signs the claims.
	pub fn encode(&self, claims: &ConsentClaims) -> Result<String, ConfigError> {
		let json = serde_json::to_vec(claims).map_err(|e| ConfigError::InvalidSettings {
			field: "state",
			reason: e.to_string(),
		})?;
		let payload = URL_SAFE_NO_PAD.encode(json);
		let mut mac = mac_for(&self.current).ok_or(ConfigError::SigningKey)?;

		mac.update(payload.as_bytes());

		let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

		Ok(format!("{payload}.{signature}"))
	}

	/// Decodes a token against the current clock.
	pub fn decode(&self, token: &str) -> Result<ConsentClaims, CorrelationError> {
		self.decode_at(token, OffsetDateTime::now_utc())
	}

	/// Decodes a token as of `now`. Every failure is [`CorrelationError::Invalid`].
	pub fn decode_at(
		&self,
		token: &str,
		now: OffsetDateTime,
	) -> Result<ConsentClaims, CorrelationError> {
		let (payload, signature) = token.split_once('.').ok_or(CorrelationError::Invalid)?;
		let signature =
			URL_SAFE_NO_PAD.decode(signature).map_err(|_| CorrelationError::Invalid)?;

		if !self.verify(payload.as_bytes(), &signature) {
			return Err(CorrelationError::Invalid);
		}

		let json = URL_SAFE_NO_PAD.decode(payload).map_err(|_| CorrelationError::Invalid)?;
		let claims: ConsentClaims =
			serde_json::from_slice(&json).map_err(|_| CorrelationError::Invalid)?;

		if now - claims.issued_at > self.ttl || claims.issued_at - now > self.clock_skew {
			return Err(CorrelationError::Invalid);
		}

		Ok(claims)
	}

	fn verify(&self, payload: &[u8], signature: &[u8]) -> bool {
		std::iter::once(&self.current).chain(self.previous.iter()).any(|key| {
			mac_for(key)
				.map(|mut mac| {
					mac.update(payload);

					mac.verify_slice(signature).is_ok()
				})
				.unwrap_or(false)
		})
	}
}

fn mac_for(key: &SigningKey) -> Option<HmacSha256> {
	<HmacSha256 as Mac>::new_from_slice(key.as_bytes()).ok()
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	fn key(byte: u8) -> SigningKey {
		SigningKey::new(vec![byte; 32]).expect("Signing key fixture should be valid.")
	}

	fn claims(issued_at: OffsetDateTime) -> ConsentClaims {
		ConsentClaims::new(
			PlatformId::new("github").expect("Platform fixture should be valid."),
			ApiKeyHash::from_secret("raw-key"),
			OwnerId::new("U1").expect("Owner fixture should be valid."),
			issued_at,
		)
	}

	#[test]
	fn tokens_round_trip_within_the_ttl() {
		let now = macros::datetime!(2025-03-01 12:00 UTC);
		let codec = StateCodec::new(key(1));
		let claims = claims(now);
		let token = codec.encode(&claims).expect("Encoding should succeed.");
		let decoded = codec
			.decode_at(&token, now + Duration::minutes(9))
			.expect("Nine-minute-old state should decode.");

		assert_eq!(decoded, claims);
		assert!(!token.contains('='), "Tokens must be URL safe without padding.");
	}

	#[test]
	fn expired_future_and_tampered_tokens_are_invalid() {
		let now = macros::datetime!(2025-03-01 12:00 UTC);
		let codec = StateCodec::new(key(1));
		let token = codec.encode(&claims(now)).expect("Encoding should succeed.");

		assert_eq!(
			codec.decode_at(&token, now + Duration::minutes(11)),
			Err(CorrelationError::Invalid),
			"States older than the ten-minute TTL are rejected."
		);
		assert_eq!(
			codec.decode_at(&token, now - Duration::minutes(5)),
			Err(CorrelationError::Invalid),
			"States minted in the future beyond the skew are rejected."
		);

		let (payload, signature) = token.split_once('.').expect("Token should have two parts.");
		let forged_claims = {
			let mut forged = claims(now);

			forged.owner = OwnerId::new("attacker").expect("Owner fixture should be valid.");

			URL_SAFE_NO_PAD.encode(serde_json::to_vec(&forged).expect("Claims serialize."))
		};

		assert_eq!(
			codec.decode_at(&format!("{forged_claims}.{signature}"), now),
			Err(CorrelationError::Invalid)
		);
		assert_eq!(codec.decode_at(payload, now), Err(CorrelationError::Invalid));
		assert_eq!(codec.decode_at("not a token", now), Err(CorrelationError::Invalid));
	}

	#[test]
	fn rotated_keys_still_verify() {
		let now = macros::datetime!(2025-03-01 12:00 UTC);
		let old = StateCodec::new(key(1));
		let token = old.encode(&claims(now)).expect("Encoding should succeed.");
		let rotated = StateCodec::new(key(2)).with_previous_key(key(1));

		assert!(rotated.decode_at(&token, now).is_ok());
		assert_eq!(StateCodec::new(key(2)).decode_at(&token, now), Err(CorrelationError::Invalid));
	}

	#[test]
	fn digests_are_stable_and_distinct() {
		assert_eq!(ConsentDigest::of("state-a"), ConsentDigest::of("state-a"));
		assert_ne!(ConsentDigest::of("state-a"), ConsentDigest::of("state-b"));
	}
}
