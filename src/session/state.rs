//! Per-session login state
//!
//! Everything that must survive between the step-1 request and the step-2
//! requests lives here, never in the plugin. The host owns one
//! `SessionState` per login session and lends it to each step call.

use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::fido::{AuthenticationRequest, RegistrationRequest};
use crate::models::{AuthMethod, User, STEP_PRIMARY_CREDENTIAL};

/// Session key holding the pending registration request (JSON)
pub const FIDO_U2F_REGISTRATION_REQUEST: &str = "fido_u2f_registration_request";

/// Session key holding the pending authentication request (JSON)
pub const FIDO_U2F_AUTHENTICATION_REQUEST: &str = "fido_u2f_authentication_request";

/// Session key recording which workflow was started server-side
pub const FIDO_U2F_WORKFLOW: &str = "fido_u2f_workflow";

/// Session-scoped key/value store plus the authenticated user
#[derive(Debug, Clone)]
pub struct SessionState {
    session_id: String,
    authenticated_user: Option<User>,
    attributes: HashMap<String, String>,
    current_step: u32,
    completed: bool,
    created_at: DateTime<Utc>,
}

impl SessionState {
    #[must_use]
    pub fn new(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            authenticated_user: None,
            attributes: HashMap::new(),
            current_step: STEP_PRIMARY_CREDENTIAL,
            completed: false,
            created_at: Utc::now(),
        }
    }

    /// Session identifier, `None` when it is empty
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        Some(self.session_id.as_str()).filter(|id| !id.is_empty())
    }

    #[must_use]
    pub fn authenticated_user(&self) -> Option<&User> {
        self.authenticated_user.as_ref()
    }

    /// Record the user confirmed by the primary credential step
    ///
    /// The user is written once per session. Returns `false` and keeps the
    /// existing user if a different one was already recorded.
    pub fn set_authenticated_user(&mut self, user: User) -> bool {
        match &self.authenticated_user {
            Some(existing) if *existing != user => {
                log::warn!(
                    "Session {} already bound to user {}, refusing {}",
                    self.session_id,
                    existing.user_name,
                    user.user_name
                );
                false
            }
            _ => {
                self.authenticated_user = Some(user);
                true
            }
        }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: &str, value: String) {
        self.attributes.insert(key.to_string(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.attributes.remove(key)
    }

    /// Store a started registration workflow, clearing any authentication one
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be serialized.
    pub fn store_registration_request(
        &mut self,
        request: &RegistrationRequest,
    ) -> Result<(), serde_json::Error> {
        let json = serde_json::to_string(request)?;
        self.remove(FIDO_U2F_AUTHENTICATION_REQUEST);
        self.set(FIDO_U2F_REGISTRATION_REQUEST, json);
        self.set(FIDO_U2F_WORKFLOW, AuthMethod::Enroll.to_string());
        Ok(())
    }

    /// Store a started authentication workflow, clearing any registration one
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be serialized.
    pub fn store_authentication_request(
        &mut self,
        request: &AuthenticationRequest,
    ) -> Result<(), serde_json::Error> {
        let json = serde_json::to_string(request)?;
        self.remove(FIDO_U2F_REGISTRATION_REQUEST);
        self.set(FIDO_U2F_AUTHENTICATION_REQUEST, json);
        self.set(FIDO_U2F_WORKFLOW, AuthMethod::Authenticate.to_string());
        Ok(())
    }

    /// Drop both pending requests and the started workflow marker
    pub fn clear_pending_workflow(&mut self) {
        self.remove(FIDO_U2F_REGISTRATION_REQUEST);
        self.remove(FIDO_U2F_AUTHENTICATION_REQUEST);
        self.remove(FIDO_U2F_WORKFLOW);
    }

    /// Workflow started by the last step-2 preparation, if any
    #[must_use]
    pub fn started_workflow(&self) -> Option<AuthMethod> {
        self.get(FIDO_U2F_WORKFLOW).and_then(|tag| tag.parse().ok())
    }

    #[must_use]
    pub fn pending_registration_request(&self) -> Option<RegistrationRequest> {
        self.get(FIDO_U2F_REGISTRATION_REQUEST)
            .and_then(|json| serde_json::from_str(json).ok())
    }

    #[must_use]
    pub fn pending_authentication_request(&self) -> Option<AuthenticationRequest> {
        self.get(FIDO_U2F_AUTHENTICATION_REQUEST)
            .and_then(|json| serde_json::from_str(json).ok())
    }

    #[must_use]
    pub fn current_step(&self) -> u32 {
        self.current_step
    }

    pub fn set_current_step(&mut self, step: u32) {
        self.current_step = step;
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn mark_completed(&mut self) {
        self.completed = true;
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}
