//! Protocol adapters that talk to platform endpoints.
//!
//! One module per protocol family; [`crate::platform::ProtocolKind`] picks which one runs.
//! Every adapter sends through [`Upstream`], which applies the broker `User-Agent`, captures
//! response metadata, and maps transport failures through the configured
//! [`TransportErrorMapper`].

pub mod authorization_code;
pub mod normalize;
pub mod oauth1;
pub mod openid;

mod transport;

pub use normalize::*;
pub use transport::*;

// crates.io
use oauth2::{
	AsyncHttpClient, HttpRequest, HttpResponse,
	http::{
		HeaderValue, Method, Request,
		header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, USER_AGENT},
	},
};
use url::form_urlencoded::Serializer;
// self
use crate::{
	_prelude::*,
	auth::PlatformId,
	error::ConfigError,
	http::{ProviderHttpClient, ResponseMetadataSlot},
	tenant::OAuthApp,
};

/// Boxed future returned by platform calls.
pub type ExchangeFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + 'a + Send>>;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
const JSON_ACCEPT: &str = "application/json";

/// Raw platform response captured before normalization.
#[derive(Clone, Debug)]
pub struct ProviderResponse {
	/// HTTP status code.
	pub status: u16,
	/// `Content-Type` header, when present and readable.
	pub content_type: Option<String>,
	/// Response body.
	pub body: Vec<u8>,
}
impl ProviderResponse {
	fn from_http(response: HttpResponse) -> Self {
		let status = response.status().as_u16();
		let content_type = response
			.headers()
			.get(CONTENT_TYPE)
			.and_then(|value| value.to_str().ok())
			.map(str::to_owned);

		Self { status, content_type, body: response.into_body() }
	}

	/// Returns true for 2xx statuses.
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}

	/// Body decoded as UTF-8, replacing invalid sequences.
	pub fn text(&self) -> String {
		String::from_utf8_lossy(&self.body).into_owned()
	}
}

/// Token fields plus the raw document the platform returned alongside them.
#[derive(Clone, Debug)]
pub struct Exchanged {
	/// Normalized token fields.
	pub grant: TokenGrant,
	/// Raw response document, used for identity when the platform has no identity endpoint.
	pub document: serde_json::Value,
}

/// Borrowed view of the broker transport used by the protocol adapters.
pub(crate) struct Upstream<'a, C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	http_client: &'a C,
	mapper: &'a M,
	user_agent: &'a HeaderValue,
}
impl<'a, C, M> Upstream<'a, C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	pub(crate) fn new(http_client: &'a C, mapper: &'a M, user_agent: &'a HeaderValue) -> Self {
		Self { http_client, mapper, user_agent }
	}

	/// Sends one request and returns the raw response, whatever its status.
	pub(crate) fn send(
		&self,
		platform: &'a PlatformId,
		mut request: HttpRequest,
	) -> ExchangeFuture<'a, ProviderResponse> {
		let slot = ResponseMetadataSlot::default();
		let handle = self.http_client.with_metadata(slot.clone());
		let mapper = self.mapper;

		request.headers_mut().insert(USER_AGENT, self.user_agent.clone());

		Box::pin(async move {
			let response = handle
				.call(request)
				.await
				.map_err(|err| mapper.map_transport_error(platform, slot.take().as_ref(), err))?;

			Ok(ProviderResponse::from_http(response))
		})
	}
}

/// Redirect URI with the state appended, for protocols that cannot carry a `state` parameter.
pub fn callback_url(app: &OAuthApp, state: &str) -> Url {
	let mut url = app.redirect_uri.clone();

	url.query_pairs_mut().append_pair("state", state);

	url
}

/// Builds a form-encoded POST.
pub(crate) fn form_post(
	url: &Url,
	pairs: &[(&str, &str)],
	authorization: Option<&str>,
) -> Result<HttpRequest> {
	let body = Serializer::new(String::new()).extend_pairs(pairs.iter().copied()).finish();
	let mut builder = Request::builder()
		.method(Method::POST)
		.uri(url.as_str())
		.header(CONTENT_TYPE, FORM_CONTENT_TYPE)
		.header(ACCEPT, JSON_ACCEPT);

	if let Some(value) = authorization {
		builder = builder.header(AUTHORIZATION, value);
	}

	Ok(builder.body(body.into_bytes()).map_err(ConfigError::from)?)
}

/// Builds a GET carrying `authorization` and any extra headers.
pub(crate) fn get(
	url: &Url,
	authorization: &str,
	headers: &[(&str, &str)],
) -> Result<HttpRequest> {
	let mut builder = Request::builder()
		.method(Method::GET)
		.uri(url.as_str())
		.header(ACCEPT, JSON_ACCEPT)
		.header(AUTHORIZATION, authorization);

	for (name, value) in headers {
		builder = builder.header(*name, *value);
	}

	Ok(builder.body(Vec::new()).map_err(ConfigError::from)?)
}
