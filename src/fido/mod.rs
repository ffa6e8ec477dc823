//! FIDO U2F server integration
//!
//! The plugin drives FIDO U2F through this module only: the client
//! capability, its HTTP implementation, metadata loading and the workflow
//! broker used by the step logic.

pub mod broker;
pub mod client;
pub mod http;
pub mod metadata;
pub mod types;

pub use broker::{DeviceWorkflowBroker, WorkflowError};
pub use client::{FidoClient, FidoClientError};
pub use http::HttpFidoClient;
pub use metadata::{FetchOutcome, InitializationError, MetadataLoader, RetryPolicy};
pub use types::{
    AuthenticationRequest, MetaDataConfiguration, RegistrationRequest, WorkflowStatus,
    RESULT_SUCCESS,
};
