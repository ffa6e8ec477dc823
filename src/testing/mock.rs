//! Mock objects and fake implementations for testing
//!
//! `MockFidoClient` stands in for a FIDO U2F server. Every call is recorded,
//! metadata fetches can be scripted as a sequence of results, and the
//! outcome of each workflow call can be overridden.

use async_trait::async_trait;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::time::Instant;

use crate::fido::{
    AuthenticationRequest, FidoClient, FidoClientError, MetaDataConfiguration,
    RegistrationRequest, WorkflowStatus, RESULT_SUCCESS,
};
use crate::testing::fixtures::TestFixtures;

#[derive(Default)]
struct MockState {
    calls: Vec<String>,
    metadata_script: VecDeque<Result<MetaDataConfiguration, FidoClientError>>,
    metadata_fetch_times: Vec<Instant>,
    start_registration_error: Option<FidoClientError>,
    start_authentication_error: Option<FidoClientError>,
    finish_registration_error: Option<FidoClientError>,
    finish_authentication_error: Option<FidoClientError>,
    registration_status: Option<String>,
    authentication_status: Option<String>,
}

/// Scripted in-process FIDO U2F server
#[derive(Default)]
pub struct MockFidoClient {
    state: Mutex<MockState>,
}

impl MockFidoClient {
    /// Mock that serves the fixture metadata and succeeds every workflow
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Results for successive metadata fetches; once drained, fetches succeed
    pub fn script_metadata(&self, results: Vec<Result<MetaDataConfiguration, FidoClientError>>) {
        self.state().metadata_script = results.into();
    }

    /// Fail the next `count` metadata fetches with `error`, then succeed
    pub fn fail_metadata_times(&self, count: usize, error: &FidoClientError) {
        self.script_metadata(vec![Err(error.clone()); count]);
    }

    pub fn fail_start_registration(&self, error: FidoClientError) {
        self.state().start_registration_error = Some(error);
    }

    pub fn fail_start_authentication(&self, error: FidoClientError) {
        self.state().start_authentication_error = Some(error);
    }

    pub fn fail_finish_registration(&self, error: FidoClientError) {
        self.state().finish_registration_error = Some(error);
    }

    pub fn fail_finish_authentication(&self, error: FidoClientError) {
        self.state().finish_authentication_error = Some(error);
    }

    /// Status literal returned by `finish_registration`
    pub fn set_registration_status(&self, status: &str) {
        self.state().registration_status = Some(status.to_string());
    }

    /// Status literal returned by `finish_authentication`
    pub fn set_authentication_status(&self, status: &str) {
        self.state().authentication_status = Some(status.to_string());
    }

    /// Every call made so far, as `operation:arg:arg...`
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    #[must_use]
    pub fn metadata_fetches(&self) -> usize {
        self.state().metadata_fetch_times.len()
    }

    /// Instants of every metadata fetch, on the tokio clock
    #[must_use]
    pub fn metadata_fetch_times(&self) -> Vec<Instant> {
        self.state().metadata_fetch_times.clone()
    }

    fn record(&self, call: String) {
        self.state().calls.push(call);
    }
}

#[async_trait]
impl FidoClient for MockFidoClient {
    async fn fetch_metadata(
        &self,
        metadata_url: &str,
    ) -> Result<MetaDataConfiguration, FidoClientError> {
        let mut state = self.state();
        state.calls.push(format!("fetch_metadata:{metadata_url}"));
        state.metadata_fetch_times.push(Instant::now());
        state
            .metadata_script
            .pop_front()
            .unwrap_or_else(|| Ok(TestFixtures::metadata()))
    }

    async fn start_registration(
        &self,
        metadata: &MetaDataConfiguration,
        user_id: &str,
        application_id: &str,
        session_state: &str,
    ) -> Result<RegistrationRequest, FidoClientError> {
        self.record(format!(
            "start_registration:{user_id}:{application_id}:{session_state}"
        ));
        if let Some(error) = self.state().start_registration_error.clone() {
            return Err(error);
        }
        Ok(RegistrationRequest(json!({
            "registerRequests": [{
                "version": metadata.version,
                "challenge": format!("reg-challenge-{user_id}"),
                "appId": application_id,
            }],
            "authenticateRequests": [],
        })))
    }

    async fn finish_registration(
        &self,
        _metadata: &MetaDataConfiguration,
        user_id: &str,
        token_response: &str,
    ) -> Result<WorkflowStatus, FidoClientError> {
        self.record(format!("finish_registration:{user_id}:{token_response}"));
        let state = self.state();
        if let Some(error) = state.finish_registration_error.clone() {
            return Err(error);
        }
        Ok(WorkflowStatus::new(
            state.registration_status.as_deref().unwrap_or(RESULT_SUCCESS),
        ))
    }

    async fn start_authentication(
        &self,
        metadata: &MetaDataConfiguration,
        user_id: &str,
        key_handle: Option<&str>,
        application_id: &str,
        session_state: &str,
    ) -> Result<AuthenticationRequest, FidoClientError> {
        self.record(format!(
            "start_authentication:{user_id}:{application_id}:{session_state}"
        ));
        if let Some(error) = self.state().start_authentication_error.clone() {
            return Err(error);
        }
        Ok(AuthenticationRequest(json!({
            "authenticateRequests": [{
                "version": metadata.version,
                "challenge": format!("auth-challenge-{user_id}"),
                "appId": application_id,
                "keyHandle": key_handle.unwrap_or("kh-1"),
            }],
        })))
    }

    async fn finish_authentication(
        &self,
        _metadata: &MetaDataConfiguration,
        user_id: &str,
        token_response: &str,
    ) -> Result<WorkflowStatus, FidoClientError> {
        self.record(format!("finish_authentication:{user_id}:{token_response}"));
        let state = self.state();
        if let Some(error) = state.finish_authentication_error.clone() {
            return Err(error);
        }
        Ok(WorkflowStatus::new(
            state.authentication_status.as_deref().unwrap_or(RESULT_SUCCESS),
        ))
    }
}
