//! Test fixtures providing pre-built test objects
//!
//! Two directory users cover both device-step paths: `alice` has no enrolled
//! device (registration), `bob` has one for the test application
//! (authentication).

use std::sync::Arc;
use std::time::Duration;

use crate::authentication::traits::{ConfigurationAttributes, PersonAuthentication};
use crate::authentication::u2f::{U2fAuthenticator, ATTR_APPLICATION_ID, ATTR_SERVER_URI};
use crate::authentication::LoginFlow;
use crate::directory::{hash_password, InMemoryUserDirectory};
use crate::fido::{FidoClient, MetaDataConfiguration, RetryPolicy};
use crate::settings::{U2fSettings, UserSettings};

pub const TEST_SERVER_URI: &str = "https://idp.example.com";
pub const TEST_APPLICATION_ID: &str = "https://app.example.com";

/// Central fixture provider for all test data
pub struct TestFixtures;

impl TestFixtures {
    #[must_use]
    pub fn metadata() -> MetaDataConfiguration {
        MetaDataConfiguration {
            version: "2.0".to_string(),
            issuer: TEST_SERVER_URI.to_string(),
            registration_endpoint: format!("{TEST_SERVER_URI}/restv1/fido/u2f/registration"),
            authentication_endpoint: format!("{TEST_SERVER_URI}/restv1/fido/u2f/authentication"),
        }
    }

    #[must_use]
    pub fn attributes() -> ConfigurationAttributes {
        ConfigurationAttributes::new()
            .with(ATTR_SERVER_URI, TEST_SERVER_URI)
            .with(ATTR_APPLICATION_ID, TEST_APPLICATION_ID)
    }

    /// Retry policy with a short delay for tests running on the real clock
    #[must_use]
    pub fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 5,
            delay: Duration::from_millis(1),
        }
    }

    #[must_use]
    pub fn users() -> Vec<UserSettings> {
        vec![
            UserSettings {
                user_name: "alice".to_string(),
                user_id: "alice".to_string(),
                inum: "@!A11CE".to_string(),
                password_sha256: hash_password("alice-password"),
                devices: Vec::new(),
            },
            UserSettings {
                user_name: "bob".to_string(),
                user_id: "bob".to_string(),
                inum: "@!B0B".to_string(),
                password_sha256: hash_password("bob-password"),
                devices: vec![TEST_APPLICATION_ID.to_string()],
            },
        ]
    }

    /// Settings pointing at the test server with the fixture users
    #[must_use]
    pub fn settings() -> U2fSettings {
        let mut settings = U2fSettings::default();
        settings.u2f.server_uri = TEST_SERVER_URI.to_string();
        settings.u2f.application_id = TEST_APPLICATION_ID.to_string();
        settings.metadata.retry_delay_ms = 1;
        settings.session.cookie_secure = false;
        settings.users = Self::users();
        settings
    }

    #[must_use]
    pub fn directory() -> InMemoryUserDirectory {
        InMemoryUserDirectory::from_settings(&Self::users())
    }

    /// Initialized login flow running against `fido`
    ///
    /// # Panics
    ///
    /// Panics if the plugin fails to initialize.
    pub async fn login_flow(fido: Arc<dyn FidoClient>) -> LoginFlow {
        let plugin: Arc<dyn PersonAuthentication> = Arc::new(U2fAuthenticator::new(
            fido,
            Arc::new(Self::directory()),
            Self::fast_retry(),
        ));
        let configuration = plugin
            .init(&Self::attributes())
            .await
            .expect("plugin should initialize against the test server");
        LoginFlow::new(plugin, configuration)
    }
}
