//! FIDO server metadata loading with bounded retry
//!
//! Runs once while the plugin initializes. Transient failures (server
//! overloaded, transport errors) are retried after a constant delay; anything
//! else aborts initialization immediately.

use std::sync::Arc;
use std::time::Duration;

use crate::fido::client::{FidoClient, FidoClientError};
use crate::fido::types::{metadata_url, MetaDataConfiguration};

/// Default number of metadata fetch attempts
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default delay between metadata fetch attempts
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(3);

/// Errors that make plugin initialization fail
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InitializationError {
    /// A required configuration attribute is absent or empty
    #[error("missing configuration attribute: {0}")]
    MissingAttribute(String),

    /// Every allowed attempt failed with a retryable error
    #[error("metadata unavailable after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        attempts: u32,
        last_error: FidoClientError,
    },

    /// The server returned an error that retrying cannot fix
    #[error("metadata fetch failed on attempt {attempt}: {error}")]
    Fatal {
        attempt: u32,
        error: FidoClientError,
    },
}

/// Constant-delay retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

/// Outcome of a single fetch attempt
#[derive(Debug)]
pub enum FetchOutcome {
    Loaded(MetaDataConfiguration),
    Retryable(FidoClientError),
    Fatal(FidoClientError),
}

impl FetchOutcome {
    /// Classify the result of one metadata fetch
    #[must_use]
    pub fn classify(result: Result<MetaDataConfiguration, FidoClientError>) -> Self {
        match result {
            Ok(metadata) => FetchOutcome::Loaded(metadata),
            Err(e @ FidoClientError::Transport(_)) => FetchOutcome::Retryable(e),
            Err(e) if e.is_service_unavailable() => FetchOutcome::Retryable(e),
            Err(e) => FetchOutcome::Fatal(e),
        }
    }
}

/// Downloads the FIDO server configuration
pub struct MetadataLoader {
    client: Arc<dyn FidoClient>,
    policy: RetryPolicy,
}

impl MetadataLoader {
    #[must_use]
    pub fn new(client: Arc<dyn FidoClient>, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }

    /// Load the metadata document advertised under `server_uri`
    ///
    /// # Errors
    ///
    /// Returns `InitializationError::Fatal` on the first non-retryable failure
    /// and `InitializationError::RetriesExhausted` when the last allowed
    /// attempt also fails.
    pub async fn load(&self, server_uri: &str) -> Result<MetaDataConfiguration, InitializationError> {
        let url = metadata_url(server_uri);
        let max_attempts = self.policy.max_attempts.max(1);
        log::info!("U2F. Downloading metadata from {url}");

        let mut attempt = 1;
        loop {
            log::info!("U2F. Attempting to load metadata: {attempt}/{max_attempts}");

            match FetchOutcome::classify(self.client.fetch_metadata(&url).await) {
                FetchOutcome::Loaded(metadata) => {
                    log::info!(
                        "U2F. Metadata loaded on attempt {attempt} (issuer: {})",
                        metadata.issuer
                    );
                    return Ok(metadata);
                }
                FetchOutcome::Fatal(error) => {
                    log::error!("U2F. Metadata fetch failed permanently: {error}");
                    return Err(InitializationError::Fatal { attempt, error });
                }
                FetchOutcome::Retryable(error) => {
                    if attempt >= max_attempts {
                        log::error!(
                            "U2F. Metadata still unavailable after {attempt} attempts: {error}"
                        );
                        return Err(InitializationError::RetriesExhausted {
                            attempts: attempt,
                            last_error: error,
                        });
                    }
                    log::warn!(
                        "U2F. Metadata fetch failed ({error}), retrying in {}ms",
                        self.policy.delay.as_millis()
                    );
                    tokio::time::sleep(self.policy.delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
