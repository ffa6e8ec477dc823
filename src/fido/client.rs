//! FIDO client capability
//!
//! Everything the plugin needs from a FIDO U2F server, expressed as one
//! async trait so the step logic can run against the real HTTP client or a
//! scripted mock.

use async_trait::async_trait;

use crate::fido::types::{
    AuthenticationRequest, MetaDataConfiguration, RegistrationRequest, WorkflowStatus,
};

/// HTTP status the FIDO server uses when it is temporarily overloaded
pub const STATUS_SERVICE_UNAVAILABLE: u16 = 503;

/// HTTP status the FIDO server uses when no device context matches
pub const STATUS_NOT_FOUND: u16 = 404;

/// Errors returned by a FIDO client call
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FidoClientError {
    /// The server answered with a non-success HTTP status
    #[error("FIDO server returned status {status}: {message}")]
    Status { status: u16, message: String },

    /// The request never produced a response (connect, timeout, I/O)
    #[error("FIDO transport failure: {0}")]
    Transport(String),

    /// The response body could not be understood
    #[error("invalid FIDO server response: {0}")]
    InvalidResponse(String),
}

impl FidoClientError {
    #[must_use]
    pub fn status(status: u16, message: &str) -> Self {
        FidoClientError::Status {
            status,
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn is_service_unavailable(&self) -> bool {
        matches!(self, FidoClientError::Status { status, .. } if *status == STATUS_SERVICE_UNAVAILABLE)
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, FidoClientError::Status { status, .. } if *status == STATUS_NOT_FOUND)
    }
}

/// Remote FIDO U2F server operations
#[async_trait]
pub trait FidoClient: Send + Sync {
    /// Fetch the server configuration document from `metadata_url`
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, the server answers with a
    /// non-success status, or the document cannot be parsed.
    async fn fetch_metadata(
        &self,
        metadata_url: &str,
    ) -> Result<MetaDataConfiguration, FidoClientError>;

    /// Start the registration workflow for `user_id`
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects the request or is unreachable.
    async fn start_registration(
        &self,
        metadata: &MetaDataConfiguration,
        user_id: &str,
        application_id: &str,
        session_state: &str,
    ) -> Result<RegistrationRequest, FidoClientError>;

    /// Finish the registration workflow with the client-signed token response
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects the request or is unreachable.
    async fn finish_registration(
        &self,
        metadata: &MetaDataConfiguration,
        user_id: &str,
        token_response: &str,
    ) -> Result<WorkflowStatus, FidoClientError>;

    /// Start the authentication workflow for `user_id`
    ///
    /// # Errors
    ///
    /// Returns a `404` status error when the server has no device for the
    /// user, or any other error if the request fails.
    async fn start_authentication(
        &self,
        metadata: &MetaDataConfiguration,
        user_id: &str,
        key_handle: Option<&str>,
        application_id: &str,
        session_state: &str,
    ) -> Result<AuthenticationRequest, FidoClientError>;

    /// Finish the authentication workflow with the client-signed token response
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects the request or is unreachable.
    async fn finish_authentication(
        &self,
        metadata: &MetaDataConfiguration,
        user_id: &str,
        token_response: &str,
    ) -> Result<WorkflowStatus, FidoClientError>;
}
