//! Core data types shared by the plugin, the directory and the host
//!
//! These are plain serializable records. The directory owns users and device
//! registrations; the plugin only reads them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Step handling the primary (password) credential check
pub const STEP_PRIMARY_CREDENTIAL: u32 = 1;

/// Step handling the U2F device interaction
pub const STEP_DEVICE_INTERACTION: u32 = 2;

/// Transient acknowledgement slot after the last real step
pub const STEP_ACKNOWLEDGEMENT: u32 = 3;

/// A user resolved from the directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Login name, as typed by the user
    pub user_name: String,
    /// Identifier sent to the FIDO server
    pub user_id: String,
    /// Directory-internal identifier used to look up device registrations
    pub inum: String,
}

impl User {
    #[must_use]
    pub fn new(user_name: &str, user_id: &str, inum: &str) -> Self {
        Self {
            user_name: user_name.to_string(),
            user_id: user_id.to_string(),
            inum: inum.to_string(),
        }
    }
}

/// A previously enrolled U2F device for a given application id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRegistration {
    pub user_inum: String,
    pub application_id: String,
    pub key_handle: Option<String>,
}

/// Username/password pair submitted in step 1
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    #[must_use]
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            username: username.to_string(),
            password: password.to_string(),
        }
    }
}

/// Which U2F sub-workflow the client claims to be finishing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMethod {
    /// Device registration
    Enroll,
    /// Authentication with an enrolled device
    Authenticate,
}

impl AuthMethod {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            AuthMethod::Enroll => "enroll",
            AuthMethod::Authenticate => "authenticate",
        }
    }
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for an `authMethod` tag that is neither `enroll` nor `authenticate`
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown authentication method: {0}")]
pub struct UnknownAuthMethod(pub String);

impl FromStr for AuthMethod {
    type Err = UnknownAuthMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "enroll" => Ok(AuthMethod::Enroll),
            "authenticate" => Ok(AuthMethod::Authenticate),
            other => Err(UnknownAuthMethod(other.to_string())),
        }
    }
}

/// Body of the `/ping` health check
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub message: String,
    pub version: String,
}
