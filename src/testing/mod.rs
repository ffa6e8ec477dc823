//! Testing utilities
//!
//! Shared by unit tests and, behind the `testing` feature, by the integration
//! tests under `tests/`.
//!
//! - [`fixtures`] - Pre-built test data (metadata, users, settings, flows)
//! - [`mock`] - Scripted FIDO U2F server
//!
//! ```rust,ignore
//! use u2f_stepauth::testing::{fixtures::TestFixtures, mock::MockFidoClient};
//!
//! let fido = std::sync::Arc::new(MockFidoClient::new());
//! let flow = TestFixtures::login_flow(fido.clone()).await;
//! ```

pub mod fixtures;
pub mod mock;

pub use fixtures::TestFixtures;
pub use mock::MockFidoClient;
