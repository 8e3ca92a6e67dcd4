//! Platform descriptor data structures shared by every flow.
//!
//! A descriptor is the single declaration of everything the broker needs to talk to a
//! platform: endpoints, protocol family, scope conventions, extra authorize parameters, and
//! where the user id lives in the identity document. Adding a platform means adding one
//! descriptor, never a code branch.

/// Builder API for assembling platform descriptors.
pub mod builder;

pub use builder::*;

// self
use crate::{
	_prelude::*,
	auth::{PlatformId, ScopeSet},
};

/// Protocol family selecting the exchange strategy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProtocolKind {
	/// OAuth 2.0 Authorization Code.
	#[serde(rename = "oauth2")]
	OAuth2,
	/// OAuth 2.0 Authorization Code with an S256 PKCE challenge.
	#[serde(rename = "oauth2_pkce")]
	OAuth2Pkce,
	/// OAuth 1.0a three-legged flow signed with HMAC-SHA1.
	#[serde(rename = "oauth1a")]
	OAuth1a,
	/// OpenID 2.0 positive assertion verified via `check_authentication`.
	#[serde(rename = "openid2")]
	OpenId2,
}
impl ProtocolKind {
	/// Returns the stable label used in catalogs, spans, and metrics.
	pub const fn as_str(self) -> &'static str {
		match self {
			ProtocolKind::OAuth2 => "oauth2",
			ProtocolKind::OAuth2Pkce => "oauth2_pkce",
			ProtocolKind::OAuth1a => "oauth1a",
			ProtocolKind::OpenId2 => "openid2",
		}
	}

	/// Returns true for the OAuth 2.0 families.
	pub const fn is_oauth2(self) -> bool {
		matches!(self, ProtocolKind::OAuth2 | ProtocolKind::OAuth2Pkce)
	}
}
impl Display for ProtocolKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
impl FromStr for ProtocolKind {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let folded = s
			.chars()
			.filter(|c| c.is_ascii_alphanumeric())
			.map(|c| c.to_ascii_lowercase())
			.collect::<String>();

		match folded.as_str() {
			"oauth2" => Ok(ProtocolKind::OAuth2),
			"oauth2pkce" => Ok(ProtocolKind::OAuth2Pkce),
			"oauth1a" => Ok(ProtocolKind::OAuth1a),
			"openid2" => Ok(ProtocolKind::OpenId2),
			_ => Err(s.to_owned()),
		}
	}
}

/// Client authentication modes for token endpoint calls.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientAuthMethod {
	/// Form POST body parameters for `client_id`/`client_secret`.
	#[default]
	ClientSecretPost,
	/// HTTP Basic with `client_id`/`client_secret`.
	ClientSecretBasic,
}

/// Endpoint set declared by a platform descriptor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformEndpoints {
	/// Browser-facing consent endpoint (OpenID 2.0 OP endpoint).
	pub authorization: Url,
	/// Token endpoint (OAuth 1.0a access-token URL, OpenID 2.0 verification endpoint).
	pub token: Url,
	/// Identity endpoint; when absent the identity is read from the token response.
	pub user_info: Option<Url>,
	/// OAuth 1.0a request-token endpoint.
	pub request_token: Option<Url>,
}

/// Ordered field path locating the user id inside an identity document.
///
/// Segments are object keys or decimal array indexes. A key segment applied to an array
/// descends into the array's first element.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserIdPath(Vec<String>);
impl UserIdPath {
	/// Creates a path from its segments.
	pub fn new<I, S>(segments: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		Self(segments.into_iter().map(Into::into).collect())
	}

	/// Returns the segments in walk order.
	pub fn segments(&self) -> &[String] {
		&self.0
	}

	/// Returns true when the path has no segments.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}
impl Display for UserIdPath {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.0.join("."))
	}
}
impl FromStr for UserIdPath {
	type Err = std::convert::Infallible;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Ok(Self::new(s.split('.').filter(|segment| !segment.is_empty())))
	}
}

/// Immutable platform descriptor consumed by flows.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformDescriptor {
	/// Descriptor identifier.
	pub id: PlatformId,
	/// Human-readable platform name.
	pub display_name: String,
	/// Protocol family driving the exchange strategy.
	pub protocol: ProtocolKind,
	/// Endpoint definitions exposed by the platform.
	pub endpoints: PlatformEndpoints,
	/// Separator used when joining scopes into the consent URL.
	pub scope_delimiter: String,
	/// Scopes always requested for this platform.
	pub required_scopes: ScopeSet,
	/// Extra query parameters appended to the consent URL.
	pub additional_auth_params: BTreeMap<String, String>,
	/// Where the user id lives in the identity document.
	pub user_id_path: UserIdPath,
	/// Whether stale tokens can be refreshed.
	pub supports_refresh: bool,
	/// How client credentials reach the token endpoint.
	pub client_auth: ClientAuthMethod,
	/// Parameter name carrying the client id (`client_key` on some platforms).
	pub client_id_param: String,
	/// Header that must carry the client id on identity requests.
	pub client_id_header: Option<String>,
}
impl PlatformDescriptor {
	/// Creates a new builder for the provided identifier and protocol.
	pub fn builder(id: PlatformId, protocol: ProtocolKind) -> PlatformDescriptorBuilder {
		PlatformDescriptorBuilder::new(id, protocol)
	}

	/// Joins scopes with the platform delimiter; `None` for an empty set.
	pub fn join_scopes(&self, scopes: &ScopeSet) -> Option<String> {
		scopes.join(&self.scope_delimiter)
	}

	/// Returns true when the descriptor asks for a PKCE challenge.
	pub fn uses_pkce(&self) -> bool {
		matches!(self.protocol, ProtocolKind::OAuth2Pkce)
	}
}
