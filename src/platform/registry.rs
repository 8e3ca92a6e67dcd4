//! Immutable platform registry and its JSON catalog loader.
//!
//! The registry is assembled once at startup and then shared read-only. Loading fails fast:
//! an unknown `protocolKind`, a duplicate id, or a descriptor that violates its invariants
//! aborts the whole load instead of silently skipping the entry.

// std
use std::collections::btree_map::Entry;
// self
use crate::{
	_prelude::*,
	auth::{IdentifierError, PlatformId, PlatformUserId, ScopeSet, ScopeValidationError},
	error::ConfigError,
	platform::{
		ClientAuthMethod, DescriptorError, PlatformDescriptor, ProtocolKind, UserIdPath, catalog,
		identity,
	},
};

/// Errors raised while loading the registry.
#[derive(Debug, ThisError)]
pub enum RegistryError {
	/// A catalog entry named a protocol family the broker does not implement.
	#[error("Platform `{platform}` declares unknown protocol kind `{kind}`.")]
	UnknownProtocol {
		/// Identifier of the offending entry.
		platform: String,
		/// Protocol string as written in the catalog.
		kind: String,
	},
	/// Two entries share an identifier.
	#[error("Platform `{platform}` is declared more than once.")]
	Duplicate {
		/// Duplicated identifier.
		platform: PlatformId,
	},
	/// An entry violated descriptor invariants.
	#[error("Platform `{platform}` descriptor is invalid.")]
	Descriptor {
		/// Identifier of the offending entry.
		platform: PlatformId,
		/// Validation failure.
		#[source]
		source: DescriptorError,
	},
	/// An entry carried an unusable identifier.
	#[error("Platform identifier `{id}` is invalid.")]
	InvalidId {
		/// Identifier as written in the catalog.
		id: String,
		/// Validation failure.
		#[source]
		source: IdentifierError,
	},
	/// An entry carried an unusable required scope.
	#[error("Platform `{platform}` declares invalid required scopes.")]
	InvalidScope {
		/// Identifier of the offending entry.
		platform: PlatformId,
		/// Validation failure.
		#[source]
		source: ScopeValidationError,
	},
	/// A built-in endpoint failed to parse.
	#[error("Platform `{platform}` declares an unparsable endpoint.")]
	InvalidEndpoint {
		/// Identifier of the offending entry.
		platform: String,
		/// Parse failure.
		#[source]
		source: url::ParseError,
	},
	/// The catalog document is not valid JSON for the expected shape.
	#[error("Platform catalog is invalid at `{}`.", .source.path())]
	Parse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
}

/// Read-only catalog of platform descriptors keyed by id.
#[derive(Clone, Debug, Default)]
pub struct PlatformRegistry {
	descriptors: BTreeMap<PlatformId, Arc<PlatformDescriptor>>,
}
impl PlatformRegistry {
	/// Loads the built-in catalog.
	pub fn builtin() -> Result<Self, RegistryError> {
		Self::from_descriptors(catalog::builtin_descriptors()?)
	}

	/// Builds a registry from descriptors, rejecting duplicate ids.
	pub fn from_descriptors(
		descriptors: impl IntoIterator<Item = PlatformDescriptor>,
	) -> Result<Self, RegistryError> {
		descriptors.into_iter().try_fold(Self::default(), Self::with_descriptor)
	}

	/// Parses a JSON catalog (an array of camelCase descriptor records).
	pub fn from_json(raw: &str) -> Result<Self, RegistryError> {
		let mut de = serde_json::Deserializer::from_str(raw);
		let records: Vec<DescriptorRecord> = serde_path_to_error::deserialize(&mut de)
			.map_err(|source| RegistryError::Parse { source })?;
		let descriptors =
			records.into_iter().map(DescriptorRecord::into_descriptor).collect::<Result<Vec<_>, _>>()?;

		Self::from_descriptors(descriptors)
	}

	/// Adds one descriptor, rejecting a duplicate id.
	pub fn with_descriptor(mut self, descriptor: PlatformDescriptor) -> Result<Self, RegistryError> {
		match self.descriptors.entry(descriptor.id.clone()) {
			Entry::Occupied(entry) =>
				return Err(RegistryError::Duplicate { platform: entry.key().clone() }),
			Entry::Vacant(entry) => {
				entry.insert(Arc::new(descriptor));
			},
		}

		Ok(self)
	}

	/// Adds every descriptor of `other`, rejecting ids already present.
	pub fn merge(self, other: Self) -> Result<Self, RegistryError> {
		other
			.descriptors
			.into_values()
			.map(Arc::unwrap_or_clone)
			.try_fold(self, Self::with_descriptor)
	}

	/// Returns the descriptor for `platform`, if registered.
	pub fn get(&self, platform: &PlatformId) -> Option<&Arc<PlatformDescriptor>> {
		self.descriptors.get(platform)
	}

	/// Resolves a descriptor or reports the platform as unsupported.
	pub fn describe(&self, platform: &PlatformId) -> Result<Arc<PlatformDescriptor>, ConfigError> {
		self.get(platform)
			.cloned()
			.ok_or_else(|| ConfigError::UnsupportedPlatform { platform: platform.clone() })
	}

	/// Descriptors ordered by platform id.
	pub fn list(&self) -> impl Iterator<Item = &PlatformDescriptor> {
		self.descriptors.values().map(AsRef::as_ref)
	}

	/// Number of registered platforms.
	pub fn len(&self) -> usize {
		self.descriptors.len()
	}

	/// Returns true when nothing is registered.
	pub fn is_empty(&self) -> bool {
		self.descriptors.is_empty()
	}

	/// Extracts the platform user id from a raw identity document.
	pub fn extract_user_id(
		&self,
		platform: &PlatformId,
		document: &serde_json::Value,
	) -> Result<PlatformUserId> {
		let descriptor = self.describe(platform)?;

		Ok(identity::extract_user_id(&descriptor, document)?)
	}
}

/// Wire shape of one JSON catalog entry.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct DescriptorRecord {
	id: String,
	display_name: Option<String>,
	auth_url: Url,
	token_url: Url,
	user_info_url: Option<Url>,
	request_token_url: Option<Url>,
	protocol_kind: String,
	scope_delimiter: Option<String>,
	#[serde(default)]
	required_scopes: Vec<String>,
	#[serde(default)]
	additional_auth_params: BTreeMap<String, String>,
	user_id_field_path: Option<Vec<String>>,
	supports_refresh: Option<bool>,
	client_auth: Option<ClientAuthMethod>,
	client_id_param: Option<String>,
	client_id_header: Option<String>,
}
impl DescriptorRecord {
	fn into_descriptor(self) -> Result<PlatformDescriptor, RegistryError> {
		let protocol = self
			.protocol_kind
			.parse::<ProtocolKind>()
			.map_err(|kind| RegistryError::UnknownProtocol { platform: self.id.clone(), kind })?;
		let id = PlatformId::new(&self.id)
			.map_err(|source| RegistryError::InvalidId { id: self.id.clone(), source })?;
		let required_scopes = ScopeSet::new(self.required_scopes)
			.map_err(|source| RegistryError::InvalidScope { platform: id.clone(), source })?;
		let mut builder = PlatformDescriptor::builder(id.clone(), protocol)
			.authorization_endpoint(self.auth_url)
			.token_endpoint(self.token_url)
			.required_scopes(required_scopes);

		if let Some(name) = self.display_name {
			builder = builder.display_name(name);
		}
		if let Some(url) = self.user_info_url {
			builder = builder.user_info_endpoint(url);
		}
		if let Some(url) = self.request_token_url {
			builder = builder.request_token_endpoint(url);
		}
		if let Some(delimiter) = self.scope_delimiter {
			builder = builder.scope_delimiter(delimiter);
		}
		for (name, value) in self.additional_auth_params {
			builder = builder.auth_param(name, value);
		}
		if let Some(path) = self.user_id_field_path {
			builder = builder.user_id_path(UserIdPath::new(path));
		}
		if let Some(supported) = self.supports_refresh {
			builder = builder.supports_refresh(supported);
		}
		if let Some(method) = self.client_auth {
			builder = builder.client_auth(method);
		}
		if let Some(param) = self.client_id_param {
			builder = builder.client_id_param(param);
		}
		if let Some(header) = self.client_id_header {
			builder = builder.client_id_header(header);
		}

		builder.build().map_err(|source| RegistryError::Descriptor { platform: id, source })
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	const CUSTOM_CATALOG: &str = r#"[
		{
			"id": "acme",
			"displayName": "Acme",
			"authUrl": "https://id.acme.test/authorize",
			"tokenUrl": "https://id.acme.test/token",
			"userInfoUrl": "https://api.acme.test/me",
			"protocolKind": "OAuth2PKCE",
			"scopeDelimiter": "+",
			"requiredScopes": ["profile"],
			"additionalAuthParams": { "prompt": "consent" },
			"userIdFieldPath": ["user", "user_id"]
		}
	]"#;

	fn platform(id: &str) -> PlatformId {
		PlatformId::new(id).expect("Platform fixture should be valid.")
	}

	#[test]
	fn json_catalog_loads_camel_case_records() {
		let registry = PlatformRegistry::from_json(CUSTOM_CATALOG).expect("Catalog should load.");
		let acme = registry.describe(&platform("acme")).expect("Acme should be registered.");

		assert_eq!(acme.protocol, ProtocolKind::OAuth2Pkce);
		assert_eq!(acme.scope_delimiter, "+");
		assert_eq!(acme.user_id_path.to_string(), "user.user_id");
		assert_eq!(acme.additional_auth_params.get("prompt").map(String::as_str), Some("consent"));
		assert!(acme.supports_refresh);
	}

	#[test]
	fn unknown_protocols_and_duplicates_are_fatal() {
		let unknown = CUSTOM_CATALOG.replace("OAuth2PKCE", "saml2");

		assert!(matches!(
			PlatformRegistry::from_json(&unknown),
			Err(RegistryError::UnknownProtocol { kind, .. }) if kind == "saml2"
		));

		let single = CUSTOM_CATALOG.trim().trim_start_matches('[').trim_end_matches(']');
		let doubled = format!("[{single},{single}]");

		assert!(matches!(
			PlatformRegistry::from_json(&doubled),
			Err(RegistryError::Duplicate { .. })
		));
		assert!(matches!(
			PlatformRegistry::from_json(r#"[{"id":"acme"}]"#),
			Err(RegistryError::Parse { .. })
		));
	}

	#[test]
	fn descriptor_invariants_are_enforced_on_load() {
		let insecure = CUSTOM_CATALOG.replace("https://id.acme.test/token", "http://id.acme.test/token");

		assert!(matches!(
			PlatformRegistry::from_json(&insecure),
			Err(RegistryError::Descriptor { source: DescriptorError::InsecureEndpoint { .. }, .. })
		));

		let oauth1_without_request_token = CUSTOM_CATALOG.replace("OAuth2PKCE", "oauth1a");

		assert!(matches!(
			PlatformRegistry::from_json(&oauth1_without_request_token),
			Err(RegistryError::Descriptor {
				source: DescriptorError::MissingRequestTokenEndpoint,
				..
			})
		));
	}

	#[test]
	fn unknown_platforms_are_unsupported() {
		let registry = PlatformRegistry::from_json(CUSTOM_CATALOG).expect("Catalog should load.");

		assert!(matches!(
			registry.describe(&platform("nope")),
			Err(ConfigError::UnsupportedPlatform { .. })
		));
		assert!(matches!(
			registry.extract_user_id(&platform("nope"), &serde_json::json!({})),
			Err(Error::Config(ConfigError::UnsupportedPlatform { .. }))
		));
	}

	#[test]
	fn merge_keeps_ids_unique() {
		let custom = PlatformRegistry::from_json(CUSTOM_CATALOG).expect("Catalog should load.");
		let builtin = PlatformRegistry::builtin().expect("Built-in catalog should load.");
		let total = builtin.len();
		let merged = builtin.merge(custom.clone()).expect("Disjoint registries should merge.");

		assert_eq!(merged.len(), total + 1);
		assert!(matches!(merged.merge(custom), Err(RegistryError::Duplicate { .. })));
	}
}
