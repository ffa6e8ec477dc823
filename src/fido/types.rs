//! FIDO U2F server data types
//!
//! The plugin never looks inside challenge objects. They are carried as
//! opaque JSON between the start call, the page and the finish call.

use serde::{Deserialize, Serialize};

/// Status literal the FIDO server returns for a completed workflow
pub const RESULT_SUCCESS: &str = "success";

/// Well-known path of the FIDO U2F configuration document
pub const METADATA_PATH: &str = "/.well-known/fido-u2f-configuration";

/// Server-advertised FIDO U2F configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaDataConfiguration {
    pub version: String,
    pub issuer: String,
    pub registration_endpoint: String,
    pub authentication_endpoint: String,
}

/// Registration challenge produced by starting the registration workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegistrationRequest(pub serde_json::Value);

/// Authentication challenge produced by starting the authentication workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthenticationRequest(pub serde_json::Value);

/// Result of a finish call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowStatus {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub challenge: Option<String>,
}

impl WorkflowStatus {
    #[must_use]
    pub fn new(status: &str) -> Self {
        Self {
            status: status.to_string(),
            challenge: None,
        }
    }

    /// Only the exact success literal counts; everything else is failure
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == RESULT_SUCCESS
    }
}

/// Build the metadata document URL from the configured server base URI
#[must_use]
pub fn metadata_url(server_uri: &str) -> String {
    format!("{}{METADATA_PATH}", server_uri.trim_end_matches('/'))
}
