#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![deny(warnings)]
#![allow(clippy::multiple_crate_versions)]

/// Version of the u2f-stepauth application
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod authentication;
pub mod directory;
pub mod fido;
pub mod handlers;
pub mod models;
pub mod session;
pub mod settings;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

/// Re-export commonly used items
pub use authentication::{
    AuthenticationServiceFactory, LoginFlow, PersonAuthentication, PluginConfiguration,
    U2fAuthenticator,
};
pub use handlers::configure_routes;
pub use settings::U2fSettings;
