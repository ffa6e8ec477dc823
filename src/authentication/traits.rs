//! Host-facing authentication plugin interface
//!
//! The host holds a plugin as `Arc<dyn PersonAuthentication>` and drives it
//! through a fixed lifecycle: `init` once at startup, then for each step of a
//! login `prepare_for_step` followed by `authenticate`. Read-only
//! configuration produced by `init` is passed back into every call; per-login
//! state is passed in as a `SessionState`.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::fido::{InitializationError, MetaDataConfiguration};
use crate::models::Credentials;
use crate::session::SessionState;

/// Host-supplied plugin configuration attributes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigurationAttributes(HashMap<String, String>);

impl ConfigurationAttributes {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    #[must_use]
    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.0.insert(key.to_string(), value.to_string());
        self
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Fetch a non-empty attribute
    ///
    /// # Errors
    ///
    /// Returns `InitializationError::MissingAttribute` if the key is absent or
    /// its value is blank.
    pub fn require(&self, key: &str) -> Result<&str, InitializationError> {
        self.get(key)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| InitializationError::MissingAttribute(key.to_string()))
    }
}

/// Submitted form parameters of the current request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestParameters(HashMap<String, Vec<String>>);

impl RequestParameters {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style append
    #[must_use]
    pub fn with(mut self, name: &str, value: &str) -> Self {
        self.0
            .entry(name.to_string())
            .or_default()
            .push(value.to_string());
        self
    }

    /// First non-empty value submitted for `name`
    #[must_use]
    pub fn first_value(&self, name: &str) -> Option<&str> {
        self.0
            .get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RequestParameters {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map: HashMap<String, Vec<String>> = HashMap::new();
        for (k, v) in iter {
            map.entry(k.into()).or_default().push(v.into());
        }
        Self(map)
    }
}

/// Read-only configuration handle produced once by `init`
#[derive(Debug, Clone)]
pub struct PluginConfiguration {
    pub attributes: ConfigurationAttributes,
    pub metadata: Arc<MetaDataConfiguration>,
}

/// Multi-step person authentication plugin
#[async_trait]
pub trait PersonAuthentication: Send + Sync {
    /// Initialize the plugin, producing the configuration handle for all
    /// later calls
    ///
    /// # Errors
    ///
    /// Returns an error if required attributes are missing or remote
    /// configuration cannot be obtained. The host must not accept logins then.
    async fn init(
        &self,
        attributes: &ConfigurationAttributes,
    ) -> Result<PluginConfiguration, InitializationError>;

    /// Release plugin resources on shutdown
    fn destroy(&self, configuration: &PluginConfiguration) -> bool;

    /// Version of this interface the plugin implements
    fn get_api_version(&self) -> u32 {
        1
    }

    /// Whether this plugin may be used for the current login at all
    fn is_valid_authentication_method(&self, _configuration: &PluginConfiguration) -> bool {
        true
    }

    /// Plugin to switch to when `is_valid_authentication_method` is false
    fn get_alternative_authentication_method(
        &self,
        _configuration: &PluginConfiguration,
    ) -> Option<String> {
        None
    }

    /// Prepare `step` before its page is rendered
    async fn prepare_for_step(
        &self,
        configuration: &PluginConfiguration,
        parameters: &RequestParameters,
        session: &mut SessionState,
        step: u32,
    ) -> bool;

    /// Process the submitted form of `step`
    async fn authenticate(
        &self,
        configuration: &PluginConfiguration,
        credentials: &Credentials,
        parameters: &RequestParameters,
        session: &mut SessionState,
        step: u32,
    ) -> bool;

    /// Extra request parameters the host should carry into `step`
    fn get_extra_parameters_for_step(
        &self,
        configuration: &PluginConfiguration,
        step: u32,
    ) -> Option<Vec<String>>;

    /// Total number of steps in a login
    fn get_count_authentication_steps(&self, configuration: &PluginConfiguration) -> u32;

    /// Page to render for `step`; empty means the host's default page
    fn get_page_for_step(&self, configuration: &PluginConfiguration, step: u32) -> String;

    /// Called when the user logs out
    fn logout(&self, configuration: &PluginConfiguration, parameters: &RequestParameters) -> bool;
}
