//! Table-driven extraction of platform user ids from identity documents.

// crates.io
use serde_json::Value;
// self
use crate::{
	_prelude::*,
	auth::PlatformUserId,
	error::IdentityError,
	platform::PlatformDescriptor,
};

/// Walks `descriptor.user_id_path` through `document` and returns the platform user id.
///
/// String leaves are used verbatim and numeric leaves are rendered in decimal. Any other
/// shape, or a path that does not resolve, is an [`IdentityError`].
pub fn extract_user_id(
	descriptor: &PlatformDescriptor,
	document: &Value,
) -> Result<PlatformUserId, IdentityError> {
	let path = descriptor.user_id_path.to_string();
	let missing =
		|| IdentityError::FieldMissing { platform: descriptor.id.clone(), path: path.clone() };
	let mut cursor = document;

	for segment in descriptor.user_id_path.segments() {
		cursor = step(cursor, segment).ok_or_else(missing)?;
	}

	let raw = match cursor {
		Value::String(text) if !text.is_empty() => text.clone(),
		Value::Number(number) => number.to_string(),
		Value::Null => return Err(missing()),
		_ => {
			return Err(IdentityError::InvalidValue {
				platform: descriptor.id.clone(),
				path: path.clone(),
			});
		},
	};

	PlatformUserId::new(raw)
		.map_err(|_| IdentityError::InvalidValue { platform: descriptor.id.clone(), path })
}

fn step<'a>(value: &'a Value, segment: &str) -> Option<&'a Value> {
	match value {
		Value::Object(map) => map.get(segment),
		Value::Array(items) => match segment.parse::<usize>() {
			Ok(index) => items.get(index),
			Err(_) => items.first().and_then(|first| step(first, segment)),
		},
		_ => None,
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use serde_json::json;
	// self
	use super::*;
	use crate::{
		auth::PlatformId,
		platform::{ProtocolKind, UserIdPath},
	};

	fn descriptor(path: &str) -> PlatformDescriptor {
		PlatformDescriptor::builder(
			PlatformId::new("fixture").expect("Platform fixture should be valid."),
			ProtocolKind::OAuth2,
		)
		.authorization_endpoint(Url::parse("https://fixture.test/auth").expect("URL parses."))
		.token_endpoint(Url::parse("https://fixture.test/token").expect("URL parses."))
		.user_id_path(path.parse::<UserIdPath>().expect("Paths always parse."))
		.build()
		.expect("Fixture descriptor should build.")
	}

	#[test]
	fn numeric_ids_render_as_decimal_strings() {
		let id = extract_user_id(&descriptor("id"), &json!({ "id": 583231, "login": "octocat" }))
			.expect("GitHub-style ids should extract.");

		assert_eq!(id.as_ref(), "583231");
	}

	#[test]
	fn nested_and_array_shapes_resolve() {
		let twitch = json!({ "data": [{ "id": "141981764", "login": "twitchdev" }] });

		assert_eq!(
			extract_user_id(&descriptor("data.0.id"), &twitch)
				.expect("Indexed paths should extract.")
				.as_ref(),
			"141981764"
		);
		assert_eq!(
			extract_user_id(&descriptor("data.id"), &twitch)
				.expect("Key segments should descend into the first array element.")
				.as_ref(),
			"141981764"
		);
		assert_eq!(
			extract_user_id(
				&descriptor("owner.user.id"),
				&json!({ "owner": { "type": "user", "user": { "id": "5d3b-11ee" } } })
			)
			.expect("Deeply nested ids should extract.")
			.as_ref(),
			"5d3b-11ee"
		);
	}

	#[test]
	fn missing_fields_are_reported_with_their_path() {
		let err = extract_user_id(&descriptor("user.encodedId"), &json!({ "user": {} }))
			.expect_err("Missing leaves must fail.");

		assert_eq!(
			err,
			IdentityError::FieldMissing {
				platform: PlatformId::new("fixture").expect("Platform fixture should be valid."),
				path: "user.encodedId".into(),
			}
		);
		assert!(matches!(
			extract_user_id(&descriptor("data.3.id"), &json!({ "data": [] })),
			Err(IdentityError::FieldMissing { .. })
		));
		assert!(matches!(
			extract_user_id(&descriptor("id"), &json!({ "id": { "nested": true } })),
			Err(IdentityError::InvalidValue { .. })
		));
	}
}
