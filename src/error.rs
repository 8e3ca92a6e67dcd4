//! Broker-level error types shared across flows, platforms, and stores.

// self
use crate::{_prelude::*, auth::PlatformId};

/// Broker-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical broker error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem or caller mistake.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Correlation state was rejected.
	#[error(transparent)]
	Correlation(#[from] CorrelationError),
	/// Platform user identifier could not be extracted.
	#[error(transparent)]
	Identity(#[from] IdentityError),
	/// Transport failure (DNS, TCP, TLS).
	#[error(transparent)]
	Transport(#[from] TransportError),

	/// Platform rejected an exchange or returned a malformed body.
	#[error("Platform `{platform}` rejected the exchange with HTTP status {status}.")]
	ExchangeFailed {
		/// Platform that rejected the exchange.
		platform: PlatformId,
		/// Raw HTTP status for diagnostics.
		status: u16,
	},
	/// End user refused consent at the platform.
	#[error("Consent was denied on platform `{platform}`.")]
	ConsentDenied {
		/// Platform that reported the refusal.
		platform: PlatformId,
	},
	/// Refresh token was rejected; the user must consent again.
	#[error("Refresh token for platform `{platform}` has been revoked.")]
	RefreshRevoked {
		/// Platform that rejected the refresh.
		platform: PlatformId,
	},
	/// Stored token expired and cannot be refreshed.
	#[error("Token for platform `{platform}` has expired and cannot be refreshed.")]
	Expired {
		/// Platform owning the expired token.
		platform: PlatformId,
	},
	/// No token is stored for the requested key.
	#[error("Token was not found.")]
	NotFound,
}

/// Configuration and validation failures raised by the broker.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// Platform id is not part of the registry.
	#[error("Platform `{platform}` is not supported.")]
	UnsupportedPlatform {
		/// Requested platform identifier.
		platform: PlatformId,
	},
	/// Tenant has not registered an app for the platform.
	#[error("No OAuth app is configured for platform `{platform}`.")]
	NoAppConfigured {
		/// Requested platform identifier.
		platform: PlatformId,
	},
	/// Requested scope is outside the app allow-list.
	#[error("Scope `{scope}` is not allowed for this app.")]
	ScopeNotAllowed {
		/// First offending scope.
		scope: String,
	},
	/// Request scopes cannot be normalized.
	#[error("Requested scopes are invalid.")]
	InvalidScope(#[from] crate::auth::ScopeValidationError),
	/// Token record builder validation failed.
	#[error("Unable to build token record.")]
	TokenBuild(#[from] crate::auth::TokenBuildError),
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
	/// A MAC implementation refused the supplied key.
	#[error("Signing key was rejected by the MAC implementation.")]
	SigningKey,
	/// JSON configuration could not be parsed.
	#[error("Configuration JSON is invalid at `{}`.", .source.path())]
	Parse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// A configuration value failed validation.
	#[error("Setting `{field}` is invalid: {reason}.")]
	InvalidSettings {
		/// Offending setting name.
		field: &'static str,
		/// Why the value was rejected.
		reason: String,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Correlation state failures.
///
/// Every failure collapses into [`CorrelationError::Invalid`] so callers never learn which check
/// rejected the state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ThisError)]
pub enum CorrelationError {
	/// State is malformed, expired, forged, consumed, or bound to another tenant.
	#[error("Authorization state is invalid.")]
	Invalid,
}

/// Identity extraction failures; these point at a descriptor bug rather than a caller mistake.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum IdentityError {
	/// The user-id field path did not resolve.
	#[error("Platform `{platform}` response is missing the user id at `{path}`.")]
	FieldMissing {
		/// Platform whose descriptor was applied.
		platform: PlatformId,
		/// Dotted field path that failed to resolve.
		path: String,
	},
	/// The field resolved to a value that cannot be used as an identifier.
	#[error("Platform `{platform}` returned an unusable user id at `{path}`.")]
	InvalidValue {
		/// Platform whose descriptor was applied.
		platform: PlatformId,
		/// Dotted field path that resolved to the value.
		path: String,
	},
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the platform.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the platform.")]
	Io(#[from] std::io::Error),
	/// The platform did not answer in time.
	#[error("Request to the platform timed out.")]
	Timeout,
	/// The detached exchange task stopped before producing a result.
	#[error("Exchange task was interrupted before completion.")]
	Interrupted,
	/// Any other transport failure.
	#[error("HTTP client error occurred while calling the platform: {message}.")]
	Other {
		/// Transport-supplied message.
		message: String,
	},
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn correlation_errors_do_not_leak_the_failed_check() {
		let err: Error = CorrelationError::Invalid.into();

		assert_eq!(err.to_string(), "Authorization state is invalid.");
	}

	#[test]
	fn exchange_failures_carry_the_raw_status() {
		let err = Error::ExchangeFailed {
			platform: PlatformId::new("github").expect("Platform fixture should be valid."),
			status: 401,
		};

		assert!(err.to_string().contains("401"));
		assert!(err.to_string().contains("github"));
	}

	#[test]
	fn config_parse_errors_report_the_json_path() {
		#[derive(Debug, Deserialize)]
		#[allow(dead_code)]
		struct Sample {
			ttl: u32,
		}

		let mut de = serde_json::Deserializer::from_str(r#"{"ttl":"ten"}"#);
		let source = serde_path_to_error::deserialize::<_, Sample>(&mut de)
			.expect_err("String ttl must be rejected.");
		let err = ConfigError::Parse { source };

		assert!(err.to_string().contains("ttl"), "Unexpected message: {err}.");
	}
}
