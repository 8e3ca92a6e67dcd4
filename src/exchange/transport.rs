// crates.io
use oauth2::HttpClientError;
// self
use crate::{
	_prelude::*,
	auth::PlatformId,
	error::{ConfigError, TransportError},
	http::ResponseMetadata,
};

/// Maps HTTP transport failures into broker [`Error`] values.
pub trait TransportErrorMapper<E>
where
	Self: 'static + Send + Sync,
	E: 'static + Send + Sync + StdError,
{
	/// Converts an [`HttpClientError`] emitted by the transport into a broker error.
	fn map_transport_error(
		&self,
		platform: &PlatformId,
		metadata: Option<&ResponseMetadata>,
		error: HttpClientError<E>,
	) -> Error;
}

/// Default mapper for reqwest-backed transports.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransportErrorMapper;
#[cfg(feature = "reqwest")]
impl TransportErrorMapper<ReqwestError> for ReqwestTransportErrorMapper {
	fn map_transport_error(
		&self,
		platform: &PlatformId,
		meta: Option<&ResponseMetadata>,
		err: HttpClientError<ReqwestError>,
	) -> Error {
		match err {
			HttpClientError::Reqwest(inner) => map_reqwest_error(platform, meta, *inner),
			HttpClientError::Http(inner) => ConfigError::from(inner).into(),
			HttpClientError::Io(inner) => TransportError::Io(inner).into(),
			HttpClientError::Other(message) => TransportError::Other { message }.into(),
			_ => TransportError::Other { message: format!("unknown failure calling `{platform}`") }
				.into(),
		}
	}
}

#[cfg(feature = "reqwest")]
fn map_reqwest_error(
	platform: &PlatformId,
	meta: Option<&ResponseMetadata>,
	err: ReqwestError,
) -> Error {
	if err.is_builder() {
		return ConfigError::from(err).into();
	}
	if err.is_timeout() {
		return TransportError::Timeout.into();
	}
	// A body that failed mid-read still has a status worth reporting.
	if let Some(status) = meta.and_then(|value| value.status)
		&& err.is_body()
	{
		return Error::ExchangeFailed { platform: platform.clone(), status };
	}

	TransportError::from(err).into()
}
