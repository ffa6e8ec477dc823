//! Device workflow broker
//!
//! Forwards registration and authentication start/finish calls to the FIDO
//! client and folds their failures into the two tiers the step logic cares
//! about: a soft "no device" miss and everything else.

use std::sync::Arc;

use crate::fido::client::{FidoClient, FidoClientError};
use crate::fido::types::{AuthenticationRequest, MetaDataConfiguration, RegistrationRequest};

/// Failure of a broker call
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkflowError {
    /// The server has no matching device context for the user
    #[error("no matching device context on the FIDO server")]
    NotFound,

    /// Any other remote or transport failure
    #[error("FIDO workflow call failed: {0}")]
    Remote(#[from] FidoClientError),
}

/// Issues FIDO sub-workflow calls against one metadata configuration
pub struct DeviceWorkflowBroker<'a> {
    client: &'a dyn FidoClient,
    metadata: &'a MetaDataConfiguration,
}

impl<'a> DeviceWorkflowBroker<'a> {
    #[must_use]
    pub fn new(client: &'a Arc<dyn FidoClient>, metadata: &'a MetaDataConfiguration) -> Self {
        Self {
            client: client.as_ref(),
            metadata,
        }
    }

    /// Start device registration
    ///
    /// # Errors
    ///
    /// Returns `WorkflowError::Remote` if the FIDO server call fails.
    pub async fn start_registration(
        &self,
        user_id: &str,
        application_id: &str,
        session_ref: &str,
    ) -> Result<RegistrationRequest, WorkflowError> {
        Ok(self
            .client
            .start_registration(self.metadata, user_id, application_id, session_ref)
            .await?)
    }

    /// Finish device registration; `true` iff the server reports success
    ///
    /// # Errors
    ///
    /// Returns `WorkflowError::Remote` if the FIDO server call fails.
    pub async fn finish_registration(
        &self,
        user_id: &str,
        token_response: &str,
    ) -> Result<bool, WorkflowError> {
        let status = self
            .client
            .finish_registration(self.metadata, user_id, token_response)
            .await?;
        log::debug!("U2F. Registration status from FIDO server: {}", status.status);
        Ok(status.is_success())
    }

    /// Start device authentication
    ///
    /// # Errors
    ///
    /// Returns `WorkflowError::NotFound` when the server has no device for the
    /// user and `WorkflowError::Remote` for any other failure.
    pub async fn start_authentication(
        &self,
        user_id: &str,
        key_handle: Option<&str>,
        application_id: &str,
        session_ref: &str,
    ) -> Result<AuthenticationRequest, WorkflowError> {
        self.client
            .start_authentication(self.metadata, user_id, key_handle, application_id, session_ref)
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    WorkflowError::NotFound
                } else {
                    WorkflowError::Remote(e)
                }
            })
    }

    /// Finish device authentication; `true` iff the server reports success
    ///
    /// # Errors
    ///
    /// Returns `WorkflowError::Remote` if the FIDO server call fails.
    pub async fn finish_authentication(
        &self,
        user_id: &str,
        token_response: &str,
    ) -> Result<bool, WorkflowError> {
        let status = self
            .client
            .finish_authentication(self.metadata, user_id, token_response)
            .await?;
        log::debug!("U2F. Authentication status from FIDO server: {}", status.status);
        Ok(status.is_success())
    }
}
