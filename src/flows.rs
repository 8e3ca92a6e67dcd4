//! Broker facade and the operations it exposes: consent, callback, retrieval, refresh.

pub mod callback;
pub mod common;
pub mod consent;
pub mod refresh;
pub mod tokens;

pub use callback::*;
pub use consent::*;
pub use refresh::*;

// crates.io
use oauth2::http::HeaderValue;
// self
use crate::{
	_prelude::*,
	auth::TokenKey,
	config::{BrokerConfig, DEFAULT_USER_AGENT},
	error::ConfigError,
	exchange::{TransportErrorMapper, Upstream},
	http::ProviderHttpClient,
	platform::{DefaultErrorClassifier, ErrorClassifier, PlatformRegistry},
	state::StateCodec,
	store::BrokerStore,
	tenant::AppDirectory,
};
#[cfg(feature = "reqwest")]
use crate::{exchange::ReqwestTransportErrorMapper, http::ReqwestHttpClient};

#[cfg(feature = "reqwest")]
/// Broker specialized for the crate's default reqwest transport stack.
pub type ReqwestBroker = Broker<ReqwestHttpClient, ReqwestTransportErrorMapper>;

/// Coordinates consent, callback, and token lifecycles across every registered platform.
///
/// The broker is tenant-agnostic: each call names the owner and platform, and per-tenant OAuth
/// apps come from the [`AppDirectory`]. Cloning is cheap and every clone shares the same
/// stores, registry, and single-flight guards.
pub struct Broker<C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// HTTP client wrapper used for every outbound platform request.
	pub http_client: Arc<C>,
	/// Mapper applied to transport-layer errors before surfacing them to callers.
	pub transport_mapper: Arc<M>,
	/// Token and consent store.
	pub store: Arc<dyn BrokerStore>,
	/// Source of per-tenant OAuth apps and API key ownership.
	pub directory: Arc<dyn AppDirectory>,
	/// Platform descriptors.
	pub registry: Arc<PlatformRegistry>,
	/// Classifier applied to rejected refresh grants.
	pub classifier: Arc<dyn ErrorClassifier>,
	/// Shared counters for refresh grants sent to platforms.
	pub refresh_metrics: Arc<RefreshMetrics>,
	codec: Arc<StateCodec>,
	config: Arc<BrokerConfig>,
	user_agent: HeaderValue,
	flow_guards: Arc<Mutex<HashMap<TokenKey, Arc<AsyncMutex<()>>>>>,
}
impl<C, M> Broker<C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a broker that reuses the caller-provided transport + mapper pair.
	pub fn with_http_client(
		store: Arc<dyn BrokerStore>,
		directory: Arc<dyn AppDirectory>,
		registry: PlatformRegistry,
		codec: StateCodec,
		http_client: impl Into<Arc<C>>,
		mapper: impl Into<Arc<M>>,
	) -> Self {
		Self {
			http_client: http_client.into(),
			transport_mapper: mapper.into(),
			store,
			directory,
			registry: Arc::new(registry),
			classifier: Arc::new(DefaultErrorClassifier),
			refresh_metrics: Default::default(),
			codec: Arc::new(codec),
			config: Default::default(),
			user_agent: HeaderValue::from_static(DEFAULT_USER_AGENT),
			flow_guards: Default::default(),
		}
	}

	/// Applies validated settings; the state codec adopts the consent window.
	pub fn with_config(mut self, config: BrokerConfig) -> Result<Self, ConfigError> {
		config.validate()?;

		self.user_agent = HeaderValue::from_str(&config.user_agent).map_err(|_| {
			ConfigError::InvalidSettings {
				field: "user_agent",
				reason: "must be a visible ASCII header value".into(),
			}
		})?;
		self.codec = Arc::new(
			StateCodec::clone(&self.codec).with_window(config.consent_ttl, config.state_clock_skew),
		);
		self.config = Arc::new(config);

		Ok(self)
	}

	/// Replaces the classifier used for rejected refresh grants.
	pub fn with_classifier(mut self, classifier: Arc<dyn ErrorClassifier>) -> Self {
		self.classifier = classifier;

		self
	}

	/// Active settings.
	pub fn config(&self) -> &BrokerConfig {
		&self.config
	}

	/// State codec used to sign consent states.
	pub fn codec(&self) -> &StateCodec {
		&self.codec
	}

	pub(crate) fn upstream(&self) -> Upstream<'_, C, M> {
		Upstream::new(self.http_client.as_ref(), self.transport_mapper.as_ref(), &self.user_agent)
	}
}
#[cfg(feature = "reqwest")]
impl Broker<ReqwestHttpClient, ReqwestTransportErrorMapper> {
	/// Creates a broker with its own reqwest-backed transport.
	pub fn new(
		store: Arc<dyn BrokerStore>,
		directory: Arc<dyn AppDirectory>,
		registry: PlatformRegistry,
		codec: StateCodec,
	) -> Result<Self, ConfigError> {
		Ok(Self::with_http_client(
			store,
			directory,
			registry,
			codec,
			ReqwestHttpClient::new()?,
			Arc::new(ReqwestTransportErrorMapper),
		))
	}
}
impl<C, M> Clone for Broker<C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn clone(&self) -> Self {
		Self {
			http_client: self.http_client.clone(),
			transport_mapper: self.transport_mapper.clone(),
			store: self.store.clone(),
			directory: self.directory.clone(),
			registry: self.registry.clone(),
			classifier: self.classifier.clone(),
			refresh_metrics: self.refresh_metrics.clone(),
			codec: self.codec.clone(),
			config: self.config.clone(),
			user_agent: self.user_agent.clone(),
			flow_guards: self.flow_guards.clone(),
		}
	}
}
impl<C, M> Debug for Broker<C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Broker")
			.field("platforms", &self.registry.len())
			.field("config", &self.config)
			.field("codec", &self.codec)
			.finish_non_exhaustive()
	}
}
