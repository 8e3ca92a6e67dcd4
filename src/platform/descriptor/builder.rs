// self
use crate::{
	_prelude::*,
	auth::{PlatformId, ScopeSet},
	platform::{
		ClientAuthMethod, PlatformDescriptor, PlatformEndpoints, ProtocolKind, UserIdPath,
	},
};

/// Authorize parameters the broker always controls itself.
const RESERVED_AUTH_PARAMS: [&str; 6] = [
	"code_challenge",
	"code_challenge_method",
	"redirect_uri",
	"response_type",
	"scope",
	"state",
];

/// Errors raised while constructing or validating descriptors.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum DescriptorError {
	/// Authorization endpoint is mandatory.
	#[error("Missing authorization endpoint.")]
	MissingAuthorizationEndpoint,
	/// Token endpoint is mandatory.
	#[error("Missing token endpoint.")]
	MissingTokenEndpoint,
	/// OAuth 1.0a needs a request-token endpoint.
	#[error("OAuth 1.0a descriptors require a request-token endpoint.")]
	MissingRequestTokenEndpoint,
	/// Endpoints must use HTTPS.
	#[error("The {endpoint} endpoint must use HTTPS: {url}.")]
	InsecureEndpoint {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Endpoint URL that failed validation.
		url: String,
	},
	/// The protocol family has no refresh grant.
	#[error("The {protocol} protocol cannot support refresh.")]
	RefreshUnsupported {
		/// Offending protocol family.
		protocol: ProtocolKind,
	},
	/// Scope delimiters must be printable and non-empty.
	#[error("Scope delimiter must be a non-empty printable string.")]
	InvalidScopeDelimiter {
		/// Invalid delimiter that was supplied.
		delimiter: String,
	},
	/// The identity document cannot be walked with an empty path.
	#[error("User id field path must not be empty.")]
	MissingUserIdPath,
	/// Extra authorize parameters cannot shadow broker-controlled ones.
	#[error("Authorize parameter `{name}` is reserved.")]
	ReservedAuthParam {
		/// Offending parameter name.
		name: String,
	},
}

/// Builder for [`PlatformDescriptor`] values.
#[derive(Debug)]
pub struct PlatformDescriptorBuilder {
	/// Identifier for the descriptor being constructed.
	pub id: PlatformId,
	/// Protocol family of the platform.
	pub protocol: ProtocolKind,
	/// Human-readable name; defaults to the identifier.
	pub display_name: Option<String>,
	/// Consent endpoint.
	pub authorization_endpoint: Option<Url>,
	/// Token endpoint.
	pub token_endpoint: Option<Url>,
	/// Optional identity endpoint.
	pub user_info_endpoint: Option<Url>,
	/// OAuth 1.0a request-token endpoint.
	pub request_token_endpoint: Option<Url>,
	/// Scope separator.
	pub scope_delimiter: String,
	/// Scopes always requested.
	pub required_scopes: ScopeSet,
	/// Extra consent URL parameters.
	pub additional_auth_params: BTreeMap<String, String>,
	/// User id location in the identity document.
	pub user_id_path: UserIdPath,
	/// Refresh support; defaults to true for OAuth 2.0 families.
	pub supports_refresh: bool,
	/// Client authentication mode for the token endpoint.
	pub client_auth: ClientAuthMethod,
	/// Parameter name carrying the client id.
	pub client_id_param: String,
	/// Header carrying the client id on identity requests.
	pub client_id_header: Option<String>,
}
impl PlatformDescriptorBuilder {
	/// Creates a new builder seeded with the provided identifier and protocol.
	pub fn new(id: PlatformId, protocol: ProtocolKind) -> Self {
		Self {
			id,
			protocol,
			display_name: None,
			authorization_endpoint: None,
			token_endpoint: None,
			user_info_endpoint: None,
			request_token_endpoint: None,
			scope_delimiter: " ".into(),
			required_scopes: ScopeSet::default(),
			additional_auth_params: BTreeMap::new(),
			user_id_path: UserIdPath::new(["id"]),
			supports_refresh: protocol.is_oauth2(),
			client_auth: ClientAuthMethod::default(),
			client_id_param: "client_id".into(),
			client_id_header: None,
		}
	}

	/// Sets the display name.
	pub fn display_name(mut self, name: impl Into<String>) -> Self {
		self.display_name = Some(name.into());

		self
	}

	/// Sets the authorization endpoint.
	pub fn authorization_endpoint(mut self, url: Url) -> Self {
		self.authorization_endpoint = Some(url);

		self
	}

	/// Sets the token endpoint.
	pub fn token_endpoint(mut self, url: Url) -> Self {
		self.token_endpoint = Some(url);

		self
	}

	/// Sets the identity endpoint.
	pub fn user_info_endpoint(mut self, url: Url) -> Self {
		self.user_info_endpoint = Some(url);

		self
	}

	/// Sets the OAuth 1.0a request-token endpoint.
	pub fn request_token_endpoint(mut self, url: Url) -> Self {
		self.request_token_endpoint = Some(url);

		self
	}

	/// Overrides the scope delimiter.
	pub fn scope_delimiter(mut self, delimiter: impl Into<String>) -> Self {
		self.scope_delimiter = delimiter.into();

		self
	}

	/// Sets the scopes always requested.
	pub fn required_scopes(mut self, scopes: ScopeSet) -> Self {
		self.required_scopes = scopes;

		self
	}

	/// Adds an extra consent URL parameter.
	pub fn auth_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.additional_auth_params.insert(name.into(), value.into());

		self
	}

	/// Sets the user id field path.
	pub fn user_id_path(mut self, path: UserIdPath) -> Self {
		self.user_id_path = path;

		self
	}

	/// Overrides refresh support.
	pub fn supports_refresh(mut self, supported: bool) -> Self {
		self.supports_refresh = supported;

		self
	}

	/// Overrides the client authentication mode.
	pub fn client_auth(mut self, method: ClientAuthMethod) -> Self {
		self.client_auth = method;

		self
	}

	/// Overrides the client id parameter name.
	pub fn client_id_param(mut self, name: impl Into<String>) -> Self {
		self.client_id_param = name.into();

		self
	}

	/// Sends the client id in `header` on identity requests.
	pub fn client_id_header(mut self, header: impl Into<String>) -> Self {
		self.client_id_header = Some(header.into());

		self
	}

	/// Consumes the builder and validates the resulting descriptor.
	pub fn build(self) -> Result<PlatformDescriptor, DescriptorError> {
		let authorization =
			self.authorization_endpoint.ok_or(DescriptorError::MissingAuthorizationEndpoint)?;
		let token = self.token_endpoint.ok_or(DescriptorError::MissingTokenEndpoint)?;
		let endpoints = PlatformEndpoints {
			authorization,
			token,
			user_info: self.user_info_endpoint,
			request_token: self.request_token_endpoint,
		};
		let descriptor = PlatformDescriptor {
			display_name: self.display_name.unwrap_or_else(|| self.id.to_string()),
			id: self.id,
			protocol: self.protocol,
			endpoints,
			scope_delimiter: self.scope_delimiter,
			required_scopes: self.required_scopes,
			additional_auth_params: self.additional_auth_params,
			user_id_path: self.user_id_path,
			supports_refresh: self.supports_refresh,
			client_auth: self.client_auth,
			client_id_param: self.client_id_param,
			client_id_header: self.client_id_header,
		};

		descriptor.validate()?;

		Ok(descriptor)
	}
}

impl PlatformDescriptor {
	/// Validates invariants for the descriptor.
	fn validate(&self) -> Result<(), DescriptorError> {
		validate_endpoint("authorization", &self.endpoints.authorization)?;
		validate_endpoint("token", &self.endpoints.token)?;

		if let Some(user_info) = self.endpoints.user_info.as_ref() {
			validate_endpoint("user_info", user_info)?;
		}

		match (self.protocol, self.endpoints.request_token.as_ref()) {
			(ProtocolKind::OAuth1a, None) => return Err(DescriptorError::MissingRequestTokenEndpoint),
			(_, Some(request_token)) => validate_endpoint("request_token", request_token)?,
			_ => (),
		}

		if self.supports_refresh && !self.protocol.is_oauth2() {
			return Err(DescriptorError::RefreshUnsupported { protocol: self.protocol });
		}
		if self.scope_delimiter.is_empty() || self.scope_delimiter.chars().any(char::is_control) {
			return Err(DescriptorError::InvalidScopeDelimiter {
				delimiter: self.scope_delimiter.clone(),
			});
		}
		if self.user_id_path.is_empty() {
			return Err(DescriptorError::MissingUserIdPath);
		}
		if let Some(name) = self.additional_auth_params.keys().find(|name| {
			RESERVED_AUTH_PARAMS.contains(&name.as_str()) || **name == self.client_id_param
		}) {
			return Err(DescriptorError::ReservedAuthParam { name: name.clone() });
		}

		Ok(())
	}
}

fn validate_endpoint(name: &'static str, url: &Url) -> Result<(), DescriptorError> {
	if url.scheme() != "https" {
		Err(DescriptorError::InsecureEndpoint { endpoint: name, url: url.to_string() })
	} else {
		Ok(())
	}
}
