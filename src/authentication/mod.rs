//! Authentication module: the plugin interface, the U2F plugin, the host flow
//! driving it and the factory wiring them from settings.

pub mod factory;
pub mod flow;
pub mod traits;
pub mod u2f;

pub use factory::{AuthenticationServiceFactory, FactoryError};
pub use flow::{LoginFlow, PendingRequests, StepOutcome};
pub use traits::{
    ConfigurationAttributes, PersonAuthentication, PluginConfiguration, RequestParameters,
};
pub use u2f::U2fAuthenticator;
