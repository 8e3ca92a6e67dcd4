//! Built-in platform catalog.
//!
//! Every supported platform is one row below. Endpoints, scope conventions, extra authorize
//! parameters, and the user id location all live in the row so no flow ever branches on a
//! platform name.

// self
use crate::{
	_prelude::*,
	auth::{PlatformId, ScopeSet},
	platform::{
		ClientAuthMethod, PlatformDescriptor, ProtocolKind, RegistryError, UserIdPath,
	},
};

struct Entry {
	id: &'static str,
	name: &'static str,
	protocol: ProtocolKind,
	auth: &'static str,
	token: &'static str,
	user_info: Option<&'static str>,
	request_token: Option<&'static str>,
	delimiter: &'static str,
	required: &'static [&'static str],
	params: &'static [(&'static str, &'static str)],
	user_id: &'static [&'static str],
	refresh: bool,
	client_auth: ClientAuthMethod,
	client_id_param: &'static str,
	client_id_header: Option<&'static str>,
}

const OAUTH2: Entry = Entry {
	id: "",
	name: "",
	protocol: ProtocolKind::OAuth2,
	auth: "",
	token: "",
	user_info: None,
	request_token: None,
	delimiter: " ",
	required: &[],
	params: &[],
	user_id: &["id"],
	refresh: true,
	client_auth: ClientAuthMethod::ClientSecretPost,
	client_id_param: "client_id",
	client_id_header: None,
};
const OAUTH2_PKCE: Entry = Entry { protocol: ProtocolKind::OAuth2Pkce, ..OAUTH2 };
const OAUTH1A: Entry = Entry { protocol: ProtocolKind::OAuth1a, refresh: false, ..OAUTH2 };
const OPENID2: Entry = Entry { protocol: ProtocolKind::OpenId2, refresh: false, ..OAUTH2 };

const ENTRIES: &[Entry] = &[
	Entry {
		id: "asana",
		name: "Asana",
		auth: "https://app.asana.com/-/oauth_authorize",
		token: "https://app.asana.com/-/oauth_token",
		user_id: &["data", "id"],
		..OAUTH2
	},
	Entry {
		id: "atlassian",
		name: "Atlassian",
		auth: "https://auth.atlassian.com/authorize",
		token: "https://auth.atlassian.com/oauth/token",
		user_info: Some("https://api.atlassian.com/me"),
		required: &["read:me", "offline_access"],
		params: &[("audience", "api.atlassian.com"), ("prompt", "consent")],
		user_id: &["account_id"],
		..OAUTH2
	},
	Entry {
		id: "bitbucket",
		name: "Bitbucket",
		auth: "https://bitbucket.org/site/oauth2/authorize",
		token: "https://bitbucket.org/site/oauth2/access_token",
		user_info: Some("https://api.bitbucket.org/2.0/user"),
		required: &["account"],
		user_id: &["uuid"],
		client_auth: ClientAuthMethod::ClientSecretBasic,
		..OAUTH2
	},
	Entry {
		id: "box",
		name: "Box",
		auth: "https://account.box.com/api/oauth2/authorize",
		token: "https://api.box.com/oauth2/token",
		user_info: Some("https://api.box.com/2.0/users/me"),
		..OAUTH2
	},
	Entry {
		id: "discord",
		name: "Discord",
		auth: "https://discord.com/oauth2/authorize",
		token: "https://discord.com/api/oauth2/token",
		user_info: Some("https://discord.com/api/users/@me"),
		required: &["identify"],
		..OAUTH2
	},
	Entry {
		id: "dropbox",
		name: "Dropbox",
		auth: "https://www.dropbox.com/oauth2/authorize",
		token: "https://api.dropboxapi.com/oauth2/token",
		params: &[("token_access_type", "offline")],
		user_id: &["account_id"],
		..OAUTH2_PKCE
	},
	Entry {
		id: "facebook",
		name: "Facebook",
		auth: "https://www.facebook.com/v19.0/dialog/oauth",
		token: "https://graph.facebook.com/v19.0/oauth/access_token",
		user_info: Some("https://graph.facebook.com/me?fields=id,name"),
		delimiter: ",",
		required: &["public_profile", "email"],
		refresh: false,
		..OAUTH2
	},
	Entry {
		id: "figma",
		name: "Figma",
		auth: "https://www.figma.com/oauth",
		token: "https://api.figma.com/v1/oauth/token",
		user_info: Some("https://api.figma.com/v1/me"),
		delimiter: ",",
		required: &["current_user:read"],
		..OAUTH2
	},
	Entry {
		id: "fitbit",
		name: "Fitbit",
		auth: "https://www.fitbit.com/oauth2/authorize",
		token: "https://api.fitbit.com/oauth2/token",
		user_info: Some("https://api.fitbit.com/1/user/-/profile.json"),
		required: &["profile"],
		user_id: &["user", "encodedId"],
		client_auth: ClientAuthMethod::ClientSecretBasic,
		..OAUTH2_PKCE
	},
	Entry {
		id: "github",
		name: "GitHub",
		auth: "https://github.com/login/oauth/authorize",
		token: "https://github.com/login/oauth/access_token",
		user_info: Some("https://api.github.com/user"),
		required: &["user:email"],
		..OAUTH2
	},
	Entry {
		id: "gitlab",
		name: "GitLab",
		auth: "https://gitlab.com/oauth/authorize",
		token: "https://gitlab.com/oauth/token",
		user_info: Some("https://gitlab.com/api/v4/user"),
		required: &["read_user"],
		..OAUTH2_PKCE
	},
	Entry {
		id: "google",
		name: "Google",
		auth: "https://accounts.google.com/o/oauth2/v2/auth",
		token: "https://oauth2.googleapis.com/token",
		user_info: Some("https://openidconnect.googleapis.com/v1/userinfo"),
		required: &["openid", "email"],
		params: &[("access_type", "offline"), ("prompt", "consent")],
		user_id: &["sub"],
		..OAUTH2
	},
	Entry {
		id: "hubspot",
		name: "HubSpot",
		auth: "https://app.hubspot.com/oauth/authorize",
		token: "https://api.hubapi.com/oauth/v1/token",
		user_info: Some("https://api.hubapi.com/account-info/v3/details"),
		required: &["oauth"],
		user_id: &["portalId"],
		..OAUTH2
	},
	Entry {
		id: "instagram",
		name: "Instagram",
		auth: "https://api.instagram.com/oauth/authorize",
		token: "https://api.instagram.com/oauth/access_token",
		user_info: Some("https://graph.instagram.com/me?fields=id,username"),
		delimiter: ",",
		required: &["user_profile"],
		refresh: false,
		..OAUTH2
	},
	Entry {
		id: "linkedin",
		name: "LinkedIn",
		auth: "https://www.linkedin.com/oauth/v2/authorization",
		token: "https://www.linkedin.com/oauth/v2/accessToken",
		user_info: Some("https://api.linkedin.com/v2/userinfo"),
		required: &["openid", "profile", "email"],
		user_id: &["sub"],
		..OAUTH2
	},
	Entry {
		id: "mailchimp",
		name: "Mailchimp",
		auth: "https://login.mailchimp.com/oauth2/authorize",
		token: "https://login.mailchimp.com/oauth2/token",
		user_info: Some("https://login.mailchimp.com/oauth2/metadata"),
		user_id: &["user_id"],
		refresh: false,
		..OAUTH2
	},
	Entry {
		id: "microsoft",
		name: "Microsoft",
		auth: "https://login.microsoftonline.com/common/oauth2/v2.0/authorize",
		token: "https://login.microsoftonline.com/common/oauth2/v2.0/token",
		user_info: Some("https://graph.microsoft.com/oidc/userinfo"),
		required: &["openid", "profile", "offline_access", "User.Read"],
		user_id: &["sub"],
		..OAUTH2_PKCE
	},
	Entry {
		id: "notion",
		name: "Notion",
		auth: "https://api.notion.com/v1/oauth/authorize",
		token: "https://api.notion.com/v1/oauth/token",
		params: &[("owner", "user")],
		user_id: &["owner", "user", "id"],
		refresh: false,
		client_auth: ClientAuthMethod::ClientSecretBasic,
		..OAUTH2
	},
	Entry {
		id: "paypal",
		name: "PayPal",
		auth: "https://www.paypal.com/signin/authorize",
		token: "https://api-m.paypal.com/v1/oauth2/token",
		user_info: Some("https://api-m.paypal.com/v1/identity/oauth2/userinfo?schema=paypalv1.1"),
		required: &["openid"],
		user_id: &["user_id"],
		client_auth: ClientAuthMethod::ClientSecretBasic,
		..OAUTH2
	},
	Entry {
		id: "pinterest",
		name: "Pinterest",
		auth: "https://www.pinterest.com/oauth/",
		token: "https://api.pinterest.com/v5/oauth/token",
		user_info: Some("https://api.pinterest.com/v5/user_account"),
		delimiter: ",",
		required: &["user_accounts:read"],
		user_id: &["username"],
		client_auth: ClientAuthMethod::ClientSecretBasic,
		..OAUTH2
	},
	Entry {
		id: "reddit",
		name: "Reddit",
		auth: "https://www.reddit.com/api/v1/authorize",
		token: "https://www.reddit.com/api/v1/access_token",
		user_info: Some("https://oauth.reddit.com/api/v1/me"),
		required: &["identity"],
		params: &[("duration", "permanent")],
		client_auth: ClientAuthMethod::ClientSecretBasic,
		..OAUTH2
	},
	Entry {
		id: "salesforce",
		name: "Salesforce",
		auth: "https://login.salesforce.com/services/oauth2/authorize",
		token: "https://login.salesforce.com/services/oauth2/token",
		user_info: Some("https://login.salesforce.com/services/oauth2/userinfo"),
		required: &["openid", "refresh_token", "api"],
		user_id: &["user_id"],
		..OAUTH2_PKCE
	},
	Entry {
		id: "slack",
		name: "Slack",
		auth: "https://slack.com/oauth/v2/authorize",
		token: "https://slack.com/api/oauth.v2.access",
		delimiter: ",",
		user_id: &["authed_user", "id"],
		..OAUTH2
	},
	Entry {
		id: "spotify",
		name: "Spotify",
		auth: "https://accounts.spotify.com/authorize",
		token: "https://accounts.spotify.com/api/token",
		user_info: Some("https://api.spotify.com/v1/me"),
		required: &["user-read-email"],
		client_auth: ClientAuthMethod::ClientSecretBasic,
		..OAUTH2
	},
	Entry {
		id: "steam",
		name: "Steam",
		auth: "https://steamcommunity.com/openid/login",
		token: "https://steamcommunity.com/openid/login",
		..OPENID2
	},
	Entry {
		id: "strava",
		name: "Strava",
		auth: "https://www.strava.com/oauth/authorize",
		token: "https://www.strava.com/oauth/token",
		delimiter: ",",
		required: &["read"],
		params: &[("approval_prompt", "auto")],
		user_id: &["athlete", "id"],
		..OAUTH2
	},
	Entry {
		id: "tiktok",
		name: "TikTok",
		auth: "https://www.tiktok.com/v2/auth/authorize/",
		token: "https://open.tiktokapis.com/v2/oauth/token/",
		user_info: Some("https://open.tiktokapis.com/v2/user/info/?fields=open_id"),
		delimiter: ",",
		required: &["user.info.basic"],
		user_id: &["data", "user", "open_id"],
		client_id_param: "client_key",
		..OAUTH2_PKCE
	},
	Entry {
		id: "trello",
		name: "Trello",
		auth: "https://trello.com/1/OAuthAuthorizeToken",
		token: "https://trello.com/1/OAuthGetAccessToken",
		request_token: Some("https://trello.com/1/OAuthGetRequestToken"),
		user_info: Some("https://api.trello.com/1/members/me"),
		delimiter: ",",
		required: &["read"],
		params: &[("expiration", "never")],
		..OAUTH1A
	},
	Entry {
		id: "tumblr",
		name: "Tumblr",
		auth: "https://www.tumblr.com/oauth/authorize",
		token: "https://www.tumblr.com/oauth/access_token",
		request_token: Some("https://www.tumblr.com/oauth/request_token"),
		user_info: Some("https://api.tumblr.com/v2/user/info"),
		user_id: &["response", "user", "name"],
		..OAUTH1A
	},
	Entry {
		id: "twitch",
		name: "Twitch",
		auth: "https://id.twitch.tv/oauth2/authorize",
		token: "https://id.twitch.tv/oauth2/token",
		user_info: Some("https://api.twitch.tv/helix/users"),
		required: &["user:read:email"],
		user_id: &["data", "0", "id"],
		client_id_header: Some("Client-Id"),
		..OAUTH2
	},
	Entry {
		id: "twitter",
		name: "X (Twitter)",
		auth: "https://twitter.com/i/oauth2/authorize",
		token: "https://api.twitter.com/2/oauth2/token",
		user_info: Some("https://api.twitter.com/2/users/me"),
		required: &["users.read", "tweet.read", "offline.access"],
		user_id: &["data", "id"],
		client_auth: ClientAuthMethod::ClientSecretBasic,
		..OAUTH2_PKCE
	},
	Entry {
		id: "twitter_oauth1",
		name: "X (Twitter) OAuth 1.0a",
		auth: "https://api.twitter.com/oauth/authenticate",
		token: "https://api.twitter.com/oauth/access_token",
		request_token: Some("https://api.twitter.com/oauth/request_token"),
		user_info: Some("https://api.twitter.com/1.1/account/verify_credentials.json"),
		user_id: &["id_str"],
		..OAUTH1A
	},
	Entry {
		id: "vk",
		name: "VK",
		auth: "https://oauth.vk.com/authorize",
		token: "https://oauth.vk.com/access_token",
		delimiter: ",",
		required: &["email"],
		params: &[("v", "5.131")],
		user_id: &["user_id"],
		refresh: false,
		..OAUTH2
	},
	Entry {
		id: "wordpress",
		name: "WordPress.com",
		auth: "https://public-api.wordpress.com/oauth2/authorize",
		token: "https://public-api.wordpress.com/oauth2/token",
		user_info: Some("https://public-api.wordpress.com/rest/v1.1/me"),
		user_id: &["ID"],
		refresh: false,
		..OAUTH2
	},
	Entry {
		id: "yahoo",
		name: "Yahoo",
		auth: "https://api.login.yahoo.com/oauth2/request_auth",
		token: "https://api.login.yahoo.com/oauth2/get_token",
		user_info: Some("https://api.login.yahoo.com/openid/v1/userinfo"),
		required: &["openid"],
		user_id: &["sub"],
		client_auth: ClientAuthMethod::ClientSecretBasic,
		..OAUTH2
	},
	Entry {
		id: "yandex",
		name: "Yandex",
		auth: "https://oauth.yandex.com/authorize",
		token: "https://oauth.yandex.com/token",
		user_info: Some("https://login.yandex.ru/info?format=json"),
		..OAUTH2
	},
	Entry {
		id: "zoom",
		name: "Zoom",
		auth: "https://zoom.us/oauth/authorize",
		token: "https://zoom.us/oauth/token",
		user_info: Some("https://api.zoom.us/v2/users/me"),
		client_auth: ClientAuthMethod::ClientSecretBasic,
		..OAUTH2
	},
];

/// Builds and validates every built-in descriptor.
pub fn builtin_descriptors() -> Result<Vec<PlatformDescriptor>, RegistryError> {
	ENTRIES.iter().map(Entry::to_descriptor).collect()
}

impl Entry {
	fn to_descriptor(&self) -> Result<PlatformDescriptor, RegistryError> {
		let id = PlatformId::new(self.id)
			.map_err(|source| RegistryError::InvalidId { id: self.id.into(), source })?;
		let parse = |raw: &str| {
			Url::parse(raw)
				.map_err(|source| RegistryError::InvalidEndpoint { platform: self.id.into(), source })
		};
		let required = ScopeSet::new(self.required.iter().copied())
			.map_err(|source| RegistryError::InvalidScope { platform: id.clone(), source })?;
		let mut builder = PlatformDescriptor::builder(id.clone(), self.protocol)
			.display_name(self.name)
			.authorization_endpoint(parse(self.auth)?)
			.token_endpoint(parse(self.token)?)
			.scope_delimiter(self.delimiter)
			.required_scopes(required)
			.user_id_path(UserIdPath::new(self.user_id.iter().copied()))
			.supports_refresh(self.refresh)
			.client_auth(self.client_auth)
			.client_id_param(self.client_id_param);

		if let Some(url) = self.user_info {
			builder = builder.user_info_endpoint(parse(url)?);
		}
		if let Some(url) = self.request_token {
			builder = builder.request_token_endpoint(parse(url)?);
		}
		if let Some(header) = self.client_id_header {
			builder = builder.client_id_header(header);
		}
		for (name, value) in self.params {
			builder = builder.auth_param(*name, *value);
		}

		builder.build().map_err(|source| RegistryError::Descriptor { platform: id, source })
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::collections::HashSet;
	// self
	use super::*;

	#[test]
	fn every_builtin_descriptor_validates() {
		let descriptors = builtin_descriptors().expect("Built-in catalog should be valid.");
		let ids = descriptors.iter().map(|d| d.id.to_string()).collect::<HashSet<_>>();

		assert!(descriptors.len() >= 35, "Catalog shrank to {} entries.", descriptors.len());
		assert_eq!(ids.len(), descriptors.len(), "Catalog ids must be unique.");
	}

	#[test]
	fn required_scopes_survive_their_platform_delimiter() {
		for descriptor in builtin_descriptors().expect("Built-in catalog should be valid.") {
			let Some(joined) = descriptor.join_scopes(&descriptor.required_scopes) else {
				continue;
			};
			let parsed = ScopeSet::parse_delimited(&joined, &descriptor.scope_delimiter)
				.expect("Joined scopes should parse back.");

			assert_eq!(parsed, descriptor.required_scopes, "Round trip failed for {}.", descriptor.id);
		}
	}

	#[test]
	fn protocol_families_are_declared_per_platform() {
		let descriptors = builtin_descriptors().expect("Built-in catalog should be valid.");
		let find = |id: &str| {
			descriptors.iter().find(|d| d.id.as_ref() == id).expect("Platform should be listed.")
		};

		assert_eq!(find("trello").protocol, ProtocolKind::OAuth1a);
		assert!(!find("trello").supports_refresh);
		assert_eq!(find("steam").protocol, ProtocolKind::OpenId2);
		assert!(find("twitter").uses_pkce());
		assert_eq!(find("facebook").scope_delimiter, ",");
		assert_eq!(find("tiktok").client_id_param, "client_key");
		assert_eq!(find("twitch").client_id_header.as_deref(), Some("Client-Id"));
	}
}
