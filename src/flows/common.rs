//! Shared helpers for flow implementations (scope policy, detached tasks, guards).

// std
use std::panic;
// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, TokenBuildError, TokenKey},
	error::{ConfigError, TransportError},
	exchange::TransportErrorMapper,
	flows::Broker,
	http::ProviderHttpClient,
	platform::PlatformDescriptor,
	tenant::OAuthApp,
};

/// Resolves the scopes sent to the platform for one consent.
///
/// An empty request falls back to the app's configured scopes. When the app restricts scopes,
/// anything requested outside that list (or the platform's required scopes) is refused. The
/// platform's required scopes are always added.
pub fn effective_scopes(
	descriptor: &PlatformDescriptor,
	app: &OAuthApp,
	requested: Option<&ScopeSet>,
) -> Result<ScopeSet, ConfigError> {
	let requested = match requested {
		Some(scope) if !scope.is_empty() => scope.clone(),
		_ => app.scopes.clone().unwrap_or_default(),
	};

	if let Some(allowed) = &app.scopes {
		let permitted = allowed.union(&descriptor.required_scopes);

		if let Some(scope) = requested.first_outside(&permitted) {
			return Err(ConfigError::ScopeNotAllowed { scope: scope.to_owned() });
		}
	}

	Ok(requested.union(&descriptor.required_scopes))
}

/// Runs `task` on the current Tokio runtime so it completes even if the caller goes away.
///
/// Outside a runtime the task is awaited inline.
pub(crate) async fn detach<F, T>(task: F) -> Result<T>
where
	F: 'static + Send + Future<Output = Result<T>>,
	T: 'static + Send,
{
	match tokio::runtime::Handle::try_current() {
		Ok(handle) => match handle.spawn(task).await {
			Ok(result) => result,
			Err(err) if err.is_panic() => panic::resume_unwind(err.into_panic()),
			Err(_) => Err(TransportError::Interrupted.into()),
		},
		Err(_) => task.await,
	}
}

/// Returns (and creates on demand) the single-flight guard for a token key.
pub(crate) fn flow_guard<C, M>(broker: &Broker<C, M>, key: &TokenKey) -> Arc<AsyncMutex<()>>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	let mut guards = broker.flow_guards.lock();

	guards.entry(key.clone()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
}

/// Drops the caller's guard handle and forgets the entry once nobody else holds it.
pub(crate) fn release_guard<C, M>(broker: &Broker<C, M>, key: &TokenKey, guard: Arc<AsyncMutex<()>>)
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	let mut guards = broker.flow_guards.lock();

	drop(guard);

	if guards.get(key).is_some_and(|entry| Arc::strong_count(entry) == 1) {
		guards.remove(key);
	}
}

/// Normalizes token builder errors into broker errors.
pub(crate) fn map_token_build_error(err: TokenBuildError) -> Error {
	ConfigError::from(err).into()
}
