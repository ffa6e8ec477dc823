//! Host-side step orchestration
//!
//! `LoginFlow` drives any `PersonAuthentication` plugin through a login the
//! way the host server would: it tracks the current step in the session,
//! refuses out-of-order submissions and, once the last step succeeds, runs
//! the acknowledgement slot and marks the session completed.

use serde::Serialize;
use std::sync::Arc;

use crate::authentication::traits::{PersonAuthentication, PluginConfiguration, RequestParameters};
use crate::models::{AuthMethod, Credentials, STEP_DEVICE_INTERACTION, STEP_PRIMARY_CREDENTIAL};
use crate::session::SessionState;

/// Result of submitting one step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// Step accepted; render `page` for `step` next
    NextStep { step: u32, page: String },
    /// All steps accepted
    Completed,
    /// `step` was rejected or submitted out of order
    Failed { step: u32 },
}

/// Challenge data the device-interaction page hands to the browser
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingRequests {
    pub auth_method: Option<AuthMethod>,
    pub registration_request: Option<serde_json::Value>,
    pub authentication_request: Option<serde_json::Value>,
}

#[derive(Clone)]
pub struct LoginFlow {
    plugin: Arc<dyn PersonAuthentication>,
    configuration: Arc<PluginConfiguration>,
}

impl LoginFlow {
    #[must_use]
    pub fn new(plugin: Arc<dyn PersonAuthentication>, configuration: PluginConfiguration) -> Self {
        Self {
            plugin,
            configuration: Arc::new(configuration),
        }
    }

    #[must_use]
    pub fn configuration(&self) -> &PluginConfiguration {
        &self.configuration
    }

    /// Run step 1 and prepare the following step
    pub async fn submit_credentials(
        &self,
        session: &mut SessionState,
        credentials: &Credentials,
        parameters: &RequestParameters,
    ) -> StepOutcome {
        if let Some(outcome) = self.reject_out_of_order(session, STEP_PRIMARY_CREDENTIAL) {
            return outcome;
        }

        if !self.plugin.is_valid_authentication_method(&self.configuration) {
            log::warn!(
                "Authentication method unavailable, alternative: {:?}",
                self.plugin
                    .get_alternative_authentication_method(&self.configuration)
            );
            return StepOutcome::Failed {
                step: STEP_PRIMARY_CREDENTIAL,
            };
        }

        let accepted = self
            .plugin
            .prepare_for_step(&self.configuration, parameters, session, STEP_PRIMARY_CREDENTIAL)
            .await
            && self
                .plugin
                .authenticate(
                    &self.configuration,
                    credentials,
                    parameters,
                    session,
                    STEP_PRIMARY_CREDENTIAL,
                )
                .await;

        if !accepted {
            return StepOutcome::Failed {
                step: STEP_PRIMARY_CREDENTIAL,
            };
        }
        self.advance(session, STEP_PRIMARY_CREDENTIAL, parameters).await
    }

    /// Run the device interaction step with the browser's signed response
    pub async fn submit_token_response(
        &self,
        session: &mut SessionState,
        parameters: &RequestParameters,
    ) -> StepOutcome {
        if let Some(outcome) = self.reject_out_of_order(session, STEP_DEVICE_INTERACTION) {
            return outcome;
        }

        let accepted = self
            .plugin
            .authenticate(
                &self.configuration,
                &Credentials::default(),
                parameters,
                session,
                STEP_DEVICE_INTERACTION,
            )
            .await;

        if !accepted {
            return StepOutcome::Failed {
                step: STEP_DEVICE_INTERACTION,
            };
        }
        self.advance(session, STEP_DEVICE_INTERACTION, parameters).await
    }

    /// Requests started by the last device-step preparation
    #[must_use]
    pub fn pending_requests(&self, session: &SessionState) -> PendingRequests {
        PendingRequests {
            auth_method: session.started_workflow(),
            registration_request: session.pending_registration_request().map(|r| r.0),
            authentication_request: session.pending_authentication_request().map(|r| r.0),
        }
    }

    #[must_use]
    pub fn page_for_step(&self, step: u32) -> String {
        self.plugin.get_page_for_step(&self.configuration, step)
    }

    #[must_use]
    pub fn logout(&self, parameters: &RequestParameters) -> bool {
        self.plugin.logout(&self.configuration, parameters)
    }

    /// Release the plugin on shutdown
    #[must_use]
    pub fn destroy(&self) -> bool {
        self.plugin.destroy(&self.configuration)
    }

    fn reject_out_of_order(&self, session: &SessionState, step: u32) -> Option<StepOutcome> {
        if session.is_completed() || session.current_step() != step {
            log::warn!(
                "Rejected submission for step {step}; session is at step {} (completed: {})",
                session.current_step(),
                session.is_completed()
            );
            return Some(StepOutcome::Failed { step });
        }
        None
    }

    async fn advance(
        &self,
        session: &mut SessionState,
        finished_step: u32,
        parameters: &RequestParameters,
    ) -> StepOutcome {
        let next_step = finished_step + 1;
        let step_count = self
            .plugin
            .get_count_authentication_steps(&self.configuration);

        if let Some(extra) = self
            .plugin
            .get_extra_parameters_for_step(&self.configuration, next_step)
        {
            log::debug!("Step {next_step} carries extra parameters: {extra:?}");
        }

        let prepared = self
            .plugin
            .prepare_for_step(&self.configuration, parameters, session, next_step)
            .await;

        if finished_step >= step_count {
            if !prepared {
                log::warn!("Acknowledgement step {next_step} was not accepted");
            }
            session.set_current_step(next_step);
            session.mark_completed();
            log::info!("Login completed after {step_count} steps");
            return StepOutcome::Completed;
        }

        if !prepared {
            return StepOutcome::Failed { step: next_step };
        }
        session.set_current_step(next_step);
        StepOutcome::NextStep {
            step: next_step,
            page: self.page_for_step(next_step),
        }
    }
}
