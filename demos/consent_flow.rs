//! Walks one tenant through a full consent against a mocked OAuth 2.0 platform: build the
//! consent URL, answer the redirect, then read the stored token back.

// std
use std::sync::Arc;
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
use serde_json::json;
use url::Url;
// self
use platform_broker::{
	auth::{OwnerId, PlatformId},
	config::SigningKey,
	exchange::ReqwestTransportErrorMapper,
	flows::{Broker, CallbackParams},
	http::ReqwestHttpClient,
	platform::PlatformRegistry,
	reqwest::Client,
	state::StateCodec,
	store::{BrokerStore, MemoryStore},
	tenant::{ApiKeyHash, AppDirectory, MemoryDirectory, OAuthApp},
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let token_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"demo-access\",\"refresh_token\":\"demo-refresh\",\"expires_in\":3600}",
			);
		})
		.await;
	let user_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/user");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"id\":4242,\"login\":\"octo\"}");
		})
		.await;
	let catalog = json!([{
		"id": "demohub",
		"displayName": "Demo Hub",
		"authUrl": server.url("/authorize"),
		"tokenUrl": server.url("/token"),
		"userInfoUrl": server.url("/user"),
		"protocolKind": "oauth2",
		"requiredScopes": ["profile"]
	}]);
	let registry = PlatformRegistry::from_json(&catalog.to_string())?;
	let owner = OwnerId::new("tenant-acme")?;
	let platform = PlatformId::new("demohub")?;
	let api_key = ApiKeyHash::from_secret("pb_demo_api_key");
	let directory = Arc::new(MemoryDirectory::default());

	directory.register_api_key(api_key.clone(), owner.clone());
	directory.register_app(OAuthApp::new(
		owner.clone(),
		platform.clone(),
		"demo-client",
		"demo-secret",
		Url::parse("https://app.example.com/oauth/callback")?,
	));

	let store: Arc<dyn BrokerStore> = Arc::new(MemoryStore::default());
	let apps: Arc<dyn AppDirectory> = directory;
	let http_client = ReqwestHttpClient::with_client(
		Client::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.build()?,
	);
	let broker = <Broker<ReqwestHttpClient, ReqwestTransportErrorMapper>>::with_http_client(
		store,
		apps,
		registry,
		StateCodec::new(SigningKey::generate()),
		http_client,
		Arc::new(ReqwestTransportErrorMapper),
	);
	let consent = broker.build_consent(&owner, &api_key, &platform, None).await?;

	println!("Send the user to: {}.", consent.url);

	// The platform redirects back with the state it was given plus an authorization code.
	let redirect = format!("state={}&code=demo-code", consent.state);
	let outcome = broker.handle_callback(&CallbackParams::from_query(&redirect)).await?;

	println!("Stored token for {}.", outcome.token.key);

	let token = broker.get_token(&outcome.token.key).await?;

	println!("Access token: {}.", token.access_token.expose());

	token_mock.assert_async().await;
	user_mock.assert_async().await;

	Ok(())
}
