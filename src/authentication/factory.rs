//! Factory wiring the plugin and host flow from settings
//!
//! Builds the FIDO client and user directory, runs the plugin's `init` and
//! returns a ready `LoginFlow`. Initialization failure is returned to the
//! caller; the host must not accept logins without it.

use std::sync::Arc;

use crate::authentication::flow::LoginFlow;
use crate::authentication::traits::PersonAuthentication;
use crate::authentication::u2f::U2fAuthenticator;
use crate::directory::{InMemoryUserDirectory, UserDirectory};
use crate::fido::{FidoClient, FidoClientError, HttpFidoClient, InitializationError};
use crate::settings::U2fSettings;

/// Errors raised while assembling the authentication stack
#[derive(Debug, thiserror::Error)]
pub enum FactoryError {
    #[error("failed to build FIDO client: {0}")]
    Client(#[from] FidoClientError),

    #[error("U2F plugin initialization failed: {0}")]
    Initialization(#[from] InitializationError),
}

/// Factory for the U2F authentication stack
pub struct AuthenticationServiceFactory;

impl AuthenticationServiceFactory {
    /// Build the stack against the configured FIDO server
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built or the plugin
    /// fails to initialize.
    pub async fn create_login_flow(settings: &U2fSettings) -> Result<LoginFlow, FactoryError> {
        let fido: Arc<dyn FidoClient> = Arc::new(HttpFidoClient::new(settings.request_timeout())?);
        let directory: Arc<dyn UserDirectory> =
            Arc::new(InMemoryUserDirectory::from_settings(&settings.users));
        Self::create_login_flow_with(settings, fido, directory).await
    }

    /// Build the stack with explicit collaborators
    ///
    /// # Errors
    ///
    /// Returns an error if the plugin fails to initialize.
    pub async fn create_login_flow_with(
        settings: &U2fSettings,
        fido: Arc<dyn FidoClient>,
        directory: Arc<dyn UserDirectory>,
    ) -> Result<LoginFlow, FactoryError> {
        log::info!("🏭 Starting authentication service factory...");

        let retry_policy = settings.retry_policy();
        log::info!(
            "   └─ FIDO server: {} (metadata attempts: {}, delay: {}ms)",
            settings.u2f.server_uri,
            retry_policy.max_attempts,
            retry_policy.delay.as_millis()
        );
        log::info!("   └─ Application id: {}", settings.u2f.application_id);

        let plugin: Arc<dyn PersonAuthentication> =
            Arc::new(U2fAuthenticator::new(fido, directory, retry_policy));
        let configuration = plugin.init(&settings.configuration_attributes()).await?;

        log::info!(
            "✅ U2F authentication configured ({} steps, metadata version {})",
            plugin.get_count_authentication_steps(&configuration),
            configuration.metadata.version
        );
        Ok(LoginFlow::new(plugin, configuration))
    }
}
