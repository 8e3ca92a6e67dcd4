//! Strongly typed identifiers enforced across the broker domain.

// std
use std::{borrow::Borrow, ops::Deref};
// self
use crate::_prelude::*;

macro_rules! def_id {
	($name:ident, $doc:literal, $kind:literal) => {
		#[doc = $doc]
		#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
		#[serde(try_from = "String", into = "String")]
		pub struct $name(String);
		impl $name {
			/// Creates a new identifier after validation.
			pub fn new(value: impl AsRef<str>) -> Result<Self, IdentifierError> {
				let view = value.as_ref();

				validate_view($kind, view)?;

				Ok(Self(view.to_owned()))
			}
		}
		impl Deref for $name {
			type Target = str;

			fn deref(&self) -> &Self::Target {
				&self.0
			}
		}
		impl AsRef<str> for $name {
			fn as_ref(&self) -> &str {
				&self.0
			}
		}
		impl From<$name> for String {
			fn from(value: $name) -> Self {
				value.0
			}
		}
		impl TryFrom<String> for $name {
			type Error = IdentifierError;

			fn try_from(value: String) -> Result<Self, Self::Error> {
				validate_view($kind, &value)?;

				Ok(Self(value))
			}
		}
		impl Borrow<str> for $name {
			fn borrow(&self) -> &str {
				&self.0
			}
		}
		impl Debug for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				write!(f, concat!($kind, "({})"), self.0)
			}
		}
		impl Display for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				f.write_str(&self.0)
			}
		}
		impl FromStr for $name {
			type Err = IdentifierError;

			fn from_str(s: &str) -> Result<Self, Self::Err> {
				Self::new(s)
			}
		}
	};
}

const IDENTIFIER_MAX_LEN: usize = 128;

/// Error returned when identifier validation fails.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ThisError)]
pub enum IdentifierError {
	/// The identifier was empty or whitespace.
	#[error("{kind} identifier cannot be empty.")]
	Empty {
		/// Kind of identifier (owner, platform, platform user).
		kind: &'static str,
	},
	/// The identifier contains whitespace characters.
	#[error("{kind} identifier contains whitespace.")]
	ContainsWhitespace {
		/// Kind of identifier (owner, platform, platform user).
		kind: &'static str,
	},
	/// The identifier exceeded the allowed character count.
	#[error("{kind} identifier exceeds {max} characters.")]
	TooLong {
		/// Kind of identifier (owner, platform, platform user).
		kind: &'static str,
		/// Maximum permitted character count.
		max: usize,
	},
}

def_id! { OwnerId, "Identifier of the tenant user that owns OAuth apps and tokens.", "Owner" }
def_id! { PlatformId, "Identifier for a platform descriptor (e.g. `github`).", "Platform" }
def_id! { PlatformUserId, "Stable user identifier assigned by a platform.", "PlatformUser" }

fn validate_view(kind: &'static str, view: &str) -> Result<(), IdentifierError> {
	if view.is_empty() {
		return Err(IdentifierError::Empty { kind });
	}
	if view.chars().any(char::is_whitespace) {
		return Err(IdentifierError::ContainsWhitespace { kind });
	}
	if view.len() > IDENTIFIER_MAX_LEN {
		return Err(IdentifierError::TooLong { kind, max: IDENTIFIER_MAX_LEN });
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn identifiers_reject_padding_and_blank_values() {
		assert!(OwnerId::new(" owner-123").is_err(), "Leading whitespace must be rejected.");
		assert!(OwnerId::new("owner-123 ").is_err(), "Trailing whitespace must be rejected.");

		let owner = OwnerId::new("owner-123").expect("Owner fixture should be considered valid.");

		assert_eq!(owner.as_ref(), "owner-123");
		assert!(PlatformId::new("").is_err());
		assert!(PlatformUserId::new("with space").is_err());
	}

	#[test]
	fn serde_round_trip_enforces_validation() {
		let platform: PlatformId =
			serde_json::from_str("\"github\"").expect("Platform should deserialize successfully.");

		assert_eq!(platform.as_ref(), "github");
		assert!(serde_json::from_str::<PlatformId>("\"with space\"").is_err());
		assert_eq!(format!("{platform:?}"), "Platform(github)");
	}

	#[test]
	fn unicode_whitespace_and_length_limits() {
		let nbsp = format!("user{}id", '\u{00A0}');

		assert!(PlatformUserId::new(&nbsp).is_err());

		let exact = "7".repeat(IDENTIFIER_MAX_LEN);

		PlatformUserId::new(&exact).expect("Exact length should succeed.");

		let too_long = "7".repeat(IDENTIFIER_MAX_LEN + 1);

		assert!(matches!(
			PlatformUserId::new(&too_long),
			Err(IdentifierError::TooLong { kind: "PlatformUser", .. })
		));
	}

	#[test]
	fn borrow_supports_fast_lookup() {
		let map: HashMap<PlatformId, u8> = HashMap::from_iter([(
			PlatformId::new("discord").expect("Platform used for lookup should be valid."),
			7_u8,
		)]);

		assert_eq!(map.get("discord"), Some(&7));
	}
}
