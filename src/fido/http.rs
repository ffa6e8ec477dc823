//! `reqwest` implementation of the FIDO client capability
//!
//! Talks to an oxAuth-style FIDO U2F REST API: workflows are started with a
//! GET on the advertised endpoint and finished with a form POST to the same
//! endpoint.

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;

use crate::fido::client::{FidoClient, FidoClientError};
use crate::fido::types::{
    AuthenticationRequest, MetaDataConfiguration, RegistrationRequest, WorkflowStatus,
};

/// Default per-request timeout for calls to the FIDO server
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// FIDO client backed by a shared `reqwest::Client`
#[derive(Clone)]
pub struct HttpFidoClient {
    client: Client,
}

impl HttpFidoClient {
    /// Create a client with the given per-request timeout
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(timeout: Duration) -> Result<Self, FidoClientError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FidoClientError::Transport(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Build the URL that starts a registration workflow
    ///
    /// # Errors
    ///
    /// Returns an error if the advertised endpoint is not a valid URL.
    pub fn registration_start_url(
        metadata: &MetaDataConfiguration,
        user_id: &str,
        application_id: &str,
        session_state: &str,
    ) -> Result<Url, FidoClientError> {
        let mut url = parse_endpoint(&metadata.registration_endpoint)?;
        url.query_pairs_mut()
            .append_pair("username", user_id)
            .append_pair("application", application_id)
            .append_pair("session_state", session_state);
        Ok(url)
    }

    /// Build the URL that starts an authentication workflow
    ///
    /// # Errors
    ///
    /// Returns an error if the advertised endpoint is not a valid URL.
    pub fn authentication_start_url(
        metadata: &MetaDataConfiguration,
        user_id: &str,
        key_handle: Option<&str>,
        application_id: &str,
        session_state: &str,
    ) -> Result<Url, FidoClientError> {
        let mut url = parse_endpoint(&metadata.authentication_endpoint)?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("username", user_id);
            if let Some(key_handle) = key_handle {
                query.append_pair("keyhandle", key_handle);
            }
            query
                .append_pair("application", application_id)
                .append_pair("session_state", session_state);
        }
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, FidoClientError> {
        log::debug!("FIDO GET {url}");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FidoClientError::Transport(e.to_string()))?;
        read_json(response).await
    }

    async fn post_token<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        user_id: &str,
        token_response: &str,
    ) -> Result<T, FidoClientError> {
        let url = parse_endpoint(endpoint)?;
        log::debug!("FIDO POST {url}");
        let response = self
            .client
            .post(url)
            .form(&[("username", user_id), ("tokenResponse", token_response)])
            .send()
            .await
            .map_err(|e| FidoClientError::Transport(e.to_string()))?;
        read_json(response).await
    }
}

fn parse_endpoint(endpoint: &str) -> Result<Url, FidoClientError> {
    Url::parse(endpoint)
        .map_err(|e| FidoClientError::InvalidResponse(format!("Invalid endpoint '{endpoint}': {e}")))
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, FidoClientError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(FidoClientError::Status {
            status: status.as_u16(),
            message: body,
        });
    }

    response
        .json()
        .await
        .map_err(|e| FidoClientError::InvalidResponse(e.to_string()))
}

#[async_trait]
impl FidoClient for HttpFidoClient {
    async fn fetch_metadata(
        &self,
        metadata_url: &str,
    ) -> Result<MetaDataConfiguration, FidoClientError> {
        let url = parse_endpoint(metadata_url)?;
        self.get_json(url).await
    }

    async fn start_registration(
        &self,
        metadata: &MetaDataConfiguration,
        user_id: &str,
        application_id: &str,
        session_state: &str,
    ) -> Result<RegistrationRequest, FidoClientError> {
        let url = Self::registration_start_url(metadata, user_id, application_id, session_state)?;
        self.get_json(url).await
    }

    async fn finish_registration(
        &self,
        metadata: &MetaDataConfiguration,
        user_id: &str,
        token_response: &str,
    ) -> Result<WorkflowStatus, FidoClientError> {
        self.post_token(&metadata.registration_endpoint, user_id, token_response)
            .await
    }

    async fn start_authentication(
        &self,
        metadata: &MetaDataConfiguration,
        user_id: &str,
        key_handle: Option<&str>,
        application_id: &str,
        session_state: &str,
    ) -> Result<AuthenticationRequest, FidoClientError> {
        let url = Self::authentication_start_url(
            metadata,
            user_id,
            key_handle,
            application_id,
            session_state,
        )?;
        self.get_json(url).await
    }

    async fn finish_authentication(
        &self,
        metadata: &MetaDataConfiguration,
        user_id: &str,
        token_response: &str,
    ) -> Result<WorkflowStatus, FidoClientError> {
        self.post_token(&metadata.authentication_endpoint, user_id, token_response)
            .await
    }
}
