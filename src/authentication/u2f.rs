//! Password + FIDO U2F two-step authentication plugin
//!
//! Step 1 verifies the password against the user directory. Step 2 starts
//! either the registration or the authentication workflow on the FIDO server,
//! depending on whether the user already has an enrolled device, and finishes
//! it when the browser posts back the signed token response.

use async_trait::async_trait;
use std::sync::Arc;

use crate::authentication::traits::{
    ConfigurationAttributes, PersonAuthentication, PluginConfiguration, RequestParameters,
};
use crate::directory::UserDirectory;
use crate::fido::{
    DeviceWorkflowBroker, FidoClient, InitializationError, MetadataLoader, RetryPolicy,
    WorkflowError,
};
use crate::models::{
    AuthMethod, Credentials, DeviceRegistration, User, STEP_ACKNOWLEDGEMENT, STEP_DEVICE_INTERACTION,
    STEP_PRIMARY_CREDENTIAL,
};
use crate::session::SessionState;

/// Attribute holding the FIDO server base URI
pub const ATTR_SERVER_URI: &str = "u2f_server_uri";

/// Attribute holding the U2F application id
pub const ATTR_APPLICATION_ID: &str = "u2f_application_id";

/// Request parameter carrying the client-signed challenge response
pub const PARAM_TOKEN_RESPONSE: &str = "tokenResponse";

/// Request parameter carrying the `enroll`/`authenticate` tag
pub const PARAM_AUTH_METHOD: &str = "authMethod";

/// Page rendered for the device interaction step
pub const U2F_LOGIN_PAGE: &str = "/auth/u2f/login";

/// Number of real authentication steps
pub const AUTHENTICATION_STEP_COUNT: u32 = 2;

/// The U2F plugin. Holds only shared collaborators, never per-login state.
pub struct U2fAuthenticator {
    fido: Arc<dyn FidoClient>,
    directory: Arc<dyn UserDirectory>,
    retry_policy: RetryPolicy,
}

impl U2fAuthenticator {
    #[must_use]
    pub fn new(
        fido: Arc<dyn FidoClient>,
        directory: Arc<dyn UserDirectory>,
        retry_policy: RetryPolicy,
    ) -> Self {
        Self {
            fido,
            directory,
            retry_policy,
        }
    }

    fn broker<'a>(&'a self, configuration: &'a PluginConfiguration) -> DeviceWorkflowBroker<'a> {
        DeviceWorkflowBroker::new(&self.fido, &configuration.metadata)
    }

    async fn authenticate_primary(&self, credentials: &Credentials, session: &mut SessionState) -> bool {
        log::info!("U2F. Authenticate for step 1");

        if credentials.username.is_empty() || credentials.password.is_empty() {
            log::warn!("U2F. Authenticate for step 1. Username or password is empty");
            return false;
        }

        if !self
            .directory
            .authenticate(&credentials.username, &credentials.password)
            .await
        {
            log::warn!(
                "U2F. Authenticate for step 1. Invalid credentials for user {}",
                credentials.username
            );
            return false;
        }

        match self.directory.find_user(&credentials.username).await {
            Ok(Some(user)) => session.set_authenticated_user(user),
            Ok(None) => {
                log::error!(
                    "U2F. Authenticate for step 1. User {} vanished from the directory",
                    credentials.username
                );
                false
            }
            Err(e) => {
                log::error!("U2F. Authenticate for step 1. Directory lookup failed: {e}");
                false
            }
        }
    }

    async fn prepare_device_step(
        &self,
        configuration: &PluginConfiguration,
        session: &mut SessionState,
    ) -> bool {
        log::info!("U2F. Prepare for step 2");

        let Some(session_id) = session.session_id().map(ToString::to_string) else {
            log::warn!("U2F. Prepare for step 2. Failed to determine session_state");
            return false;
        };

        let Some(user) = session.authenticated_user().cloned() else {
            log::warn!("U2F. Prepare for step 2. Failed to determine user name");
            return false;
        };

        let Some(application_id) = configuration.attributes.get(ATTR_APPLICATION_ID) else {
            log::error!("U2F. Prepare for step 2. {ATTR_APPLICATION_ID} is not configured");
            return false;
        };

        let registrations = match self
            .directory
            .find_device_registrations(&user.inum, application_id)
            .await
        {
            Ok(registrations) => registrations,
            Err(e) => {
                log::error!("U2F. Prepare for step 2. Failed to look up device registrations: {e}");
                return false;
            }
        };

        let broker = self.broker(configuration);

        if registrations.is_empty() {
            log::info!("U2F. Prepare for step 2. Call FIDO U2F in order to start registration workflow");
            match broker
                .start_registration(&user.user_id, application_id, &session_id)
                .await
            {
                Ok(request) => store_or_fail(session.store_registration_request(&request)),
                Err(e) => {
                    log::error!("U2F. Prepare for step 2. Failed to start registration workflow: {e}");
                    false
                }
            }
        } else {
            log::info!("U2F. Prepare for step 2. Call FIDO U2F in order to start authentication workflow");
            match broker
                .start_authentication(&user.user_id, None, application_id, &session_id)
                .await
            {
                Ok(request) => store_or_fail(session.store_authentication_request(&request)),
                Err(WorkflowError::NotFound) => {
                    log::warn!(
                        "U2F. Prepare for step 2. FIDO server has no device for user {}",
                        user.user_name
                    );
                    session.clear_pending_workflow();
                    true
                }
                Err(e) => {
                    log::error!("U2F. Prepare for step 2. Failed to start authentication workflow: {e}");
                    false
                }
            }
        }
    }

    async fn authenticate_device(
        &self,
        configuration: &PluginConfiguration,
        parameters: &RequestParameters,
        session: &mut SessionState,
    ) -> bool {
        log::info!("U2F. Authenticate for step 2");

        let Some(token_response) = parameters.first_value(PARAM_TOKEN_RESPONSE) else {
            log::warn!("U2F. Authenticate for step 2. tokenResponse is empty");
            return false;
        };

        let Some(auth_method_tag) = parameters.first_value(PARAM_AUTH_METHOD) else {
            log::warn!("U2F. Authenticate for step 2. authMethod is empty");
            return false;
        };

        let Some(user) = session.authenticated_user().cloned() else {
            log::warn!("U2F. Authenticate for step 2. Failed to determine user name");
            return false;
        };

        let auth_method = match auth_method_tag.parse::<AuthMethod>() {
            Ok(method) => method,
            Err(e) => {
                log::warn!("U2F. Authenticate for step 2. {e}");
                return false;
            }
        };

        match session.started_workflow() {
            Some(started) if started == auth_method => {}
            Some(started) => {
                log::warn!(
                    "U2F. Authenticate for step 2. Client submitted '{auth_method}' but '{started}' was started"
                );
                return false;
            }
            None => {
                log::warn!("U2F. Authenticate for step 2. No U2F workflow was started for this session");
                return false;
            }
        }

        let result = self
            .finish_workflow(configuration, auth_method, &user, token_response)
            .await;
        session.clear_pending_workflow();

        if result && auth_method == AuthMethod::Enroll {
            self.record_enrollment(configuration, &user).await;
        }
        result
    }

    async fn record_enrollment(&self, configuration: &PluginConfiguration, user: &User) {
        let Some(application_id) = configuration.attributes.get(ATTR_APPLICATION_ID) else {
            return;
        };
        let registration = DeviceRegistration {
            user_inum: user.inum.clone(),
            application_id: application_id.to_string(),
            key_handle: None,
        };
        if let Err(e) = self.directory.record_device_registration(registration).await {
            log::warn!("U2F. Failed to record enrolled device for user {}: {e}", user.user_name);
        }
    }

    async fn finish_workflow(
        &self,
        configuration: &PluginConfiguration,
        auth_method: AuthMethod,
        user: &User,
        token_response: &str,
    ) -> bool {
        let broker = self.broker(configuration);
        let outcome = match auth_method {
            AuthMethod::Authenticate => {
                log::info!("U2F. Authenticate for step 2. Call FIDO U2F in order to finish authentication workflow");
                broker
                    .finish_authentication(&user.user_id, token_response)
                    .await
            }
            AuthMethod::Enroll => {
                log::info!("U2F. Authenticate for step 2. Call FIDO U2F in order to finish registration workflow");
                broker.finish_registration(&user.user_id, token_response).await
            }
        };

        match outcome {
            Ok(true) => true,
            Ok(false) => {
                log::warn!(
                    "U2F. Authenticate for step 2. Get invalid {auth_method} status from FIDO U2F server"
                );
                false
            }
            Err(e) => {
                log::error!("U2F. Authenticate for step 2. Failed to finish {auth_method} workflow: {e}");
                false
            }
        }
    }
}

fn store_or_fail(result: Result<(), serde_json::Error>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            log::error!("U2F. Prepare for step 2. Failed to store workflow request: {e}");
            false
        }
    }
}

#[async_trait]
impl PersonAuthentication for U2fAuthenticator {
    async fn init(
        &self,
        attributes: &ConfigurationAttributes,
    ) -> Result<PluginConfiguration, InitializationError> {
        log::info!("U2F. Initialization");

        let server_uri = attributes.require(ATTR_SERVER_URI)?;
        let application_id = attributes.require(ATTR_APPLICATION_ID)?;

        let loader = MetadataLoader::new(self.fido.clone(), self.retry_policy);
        let metadata = loader.load(server_uri).await?;

        log::info!("U2F. Initialized successfully");
        Ok(PluginConfiguration {
            // Step calls read the validated, trimmed values
            attributes: attributes
                .clone()
                .with(ATTR_SERVER_URI, server_uri)
                .with(ATTR_APPLICATION_ID, application_id),
            metadata: Arc::new(metadata),
        })
    }

    fn destroy(&self, _configuration: &PluginConfiguration) -> bool {
        log::info!("U2F. Destroyed successfully");
        true
    }

    async fn prepare_for_step(
        &self,
        configuration: &PluginConfiguration,
        _parameters: &RequestParameters,
        session: &mut SessionState,
        step: u32,
    ) -> bool {
        match step {
            STEP_PRIMARY_CREDENTIAL => true,
            STEP_DEVICE_INTERACTION => self.prepare_device_step(configuration, session).await,
            STEP_ACKNOWLEDGEMENT => {
                log::info!("U2F. Prepare for step 3");
                true
            }
            _ => false,
        }
    }

    async fn authenticate(
        &self,
        configuration: &PluginConfiguration,
        credentials: &Credentials,
        parameters: &RequestParameters,
        session: &mut SessionState,
        step: u32,
    ) -> bool {
        match step {
            STEP_PRIMARY_CREDENTIAL => self.authenticate_primary(credentials, session).await,
            STEP_DEVICE_INTERACTION => {
                self.authenticate_device(configuration, parameters, session)
                    .await
            }
            _ => false,
        }
    }

    fn get_extra_parameters_for_step(
        &self,
        _configuration: &PluginConfiguration,
        _step: u32,
    ) -> Option<Vec<String>> {
        None
    }

    fn get_count_authentication_steps(&self, _configuration: &PluginConfiguration) -> u32 {
        AUTHENTICATION_STEP_COUNT
    }

    fn get_page_for_step(&self, _configuration: &PluginConfiguration, step: u32) -> String {
        if step == STEP_DEVICE_INTERACTION {
            U2F_LOGIN_PAGE.to_string()
        } else {
            String::new()
        }
    }

    fn logout(&self, _configuration: &PluginConfiguration, _parameters: &RequestParameters) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fido::FidoClientError;
    use crate::session::{FIDO_U2F_AUTHENTICATION_REQUEST, FIDO_U2F_REGISTRATION_REQUEST};
    use crate::testing::fixtures::{TestFixtures, TEST_APPLICATION_ID, TEST_SERVER_URI};
    use crate::testing::mock::MockFidoClient;

    struct Harness {
        fido: Arc<MockFidoClient>,
        plugin: U2fAuthenticator,
        configuration: PluginConfiguration,
    }

    async fn harness() -> Harness {
        let fido = Arc::new(MockFidoClient::new());
        let directory = Arc::new(TestFixtures::directory());
        let plugin = U2fAuthenticator::new(fido.clone(), directory, TestFixtures::fast_retry());
        let configuration = plugin
            .init(&TestFixtures::attributes())
            .await
            .expect("init should succeed against the mock");
        Harness {
            fido,
            plugin,
            configuration,
        }
    }

    async fn logged_in(h: &Harness, user: &str, password: &str) -> SessionState {
        let mut session = SessionState::new("sess-1");
        assert!(
            h.plugin
                .authenticate(
                    &h.configuration,
                    &Credentials::new(user, password),
                    &RequestParameters::new(),
                    &mut session,
                    1,
                )
                .await
        );
        session
    }

    fn device_params(method: &str, token: &str) -> RequestParameters {
        RequestParameters::new()
            .with(PARAM_AUTH_METHOD, method)
            .with(PARAM_TOKEN_RESPONSE, token)
    }

    #[tokio::test]
    async fn test_init_requires_attributes() {
        let plugin = U2fAuthenticator::new(
            Arc::new(MockFidoClient::new()),
            Arc::new(TestFixtures::directory()),
            TestFixtures::fast_retry(),
        );
        let attributes = ConfigurationAttributes::new().with(ATTR_SERVER_URI, "https://idp");
        assert_eq!(
            plugin.init(&attributes).await.unwrap_err(),
            InitializationError::MissingAttribute(ATTR_APPLICATION_ID.to_string())
        );
    }

    #[tokio::test]
    async fn test_init_trims_configured_application_id() {
        let fido = Arc::new(MockFidoClient::new());
        let plugin = U2fAuthenticator::new(
            fido.clone(),
            Arc::new(TestFixtures::directory()),
            TestFixtures::fast_retry(),
        );
        let attributes = ConfigurationAttributes::new()
            .with(ATTR_SERVER_URI, &format!(" {TEST_SERVER_URI} "))
            .with(ATTR_APPLICATION_ID, &format!("  {TEST_APPLICATION_ID}\t"));
        let configuration = plugin.init(&attributes).await.unwrap();
        assert_eq!(
            configuration.attributes.get(ATTR_APPLICATION_ID),
            Some(TEST_APPLICATION_ID)
        );

        let mut session = SessionState::new("sess-1");
        assert!(
            plugin
                .authenticate(
                    &configuration,
                    &Credentials::new("bob", "bob-password"),
                    &RequestParameters::new(),
                    &mut session,
                    1,
                )
                .await
        );
        assert!(
            plugin
                .prepare_for_step(&configuration, &RequestParameters::new(), &mut session, 2)
                .await
        );
        assert_eq!(session.started_workflow(), Some(AuthMethod::Authenticate));
        assert!(fido.calls().contains(&format!(
            "start_authentication:bob:{TEST_APPLICATION_ID}:sess-1"
        )));
    }

    #[tokio::test]
    async fn test_step_one_truth_table() {
        let h = harness().await;
        let params = RequestParameters::new();
        for (user, password, expected) in [
            ("alice", "alice-password", true),
            ("", "alice-password", false),
            ("alice", "", false),
            ("alice", "wrong", false),
            ("nobody", "alice-password", false),
        ] {
            let mut session = SessionState::new("s");
            let ok = h
                .plugin
                .authenticate(
                    &h.configuration,
                    &Credentials::new(user, password),
                    &params,
                    &mut session,
                    1,
                )
                .await;
            assert_eq!(ok, expected, "user={user:?} password={password:?}");
            assert_eq!(session.authenticated_user().is_some(), expected);
        }
    }

    #[tokio::test]
    async fn test_prepare_selects_registration_without_devices() {
        let h = harness().await;
        let mut session = logged_in(&h, "alice", "alice-password").await;

        assert!(
            h.plugin
                .prepare_for_step(&h.configuration, &RequestParameters::new(), &mut session, 2)
                .await
        );
        assert_eq!(session.started_workflow(), Some(AuthMethod::Enroll));
        assert!(session.pending_registration_request().is_some());
        assert!(session.get(FIDO_U2F_AUTHENTICATION_REQUEST).is_none());

        let calls = h.fido.calls();
        assert!(calls.contains(&format!(
            "start_registration:alice:{TEST_APPLICATION_ID}:sess-1"
        )));
    }

    #[tokio::test]
    async fn test_prepare_selects_authentication_with_devices() {
        let h = harness().await;
        let mut session = logged_in(&h, "bob", "bob-password").await;

        assert!(
            h.plugin
                .prepare_for_step(&h.configuration, &RequestParameters::new(), &mut session, 2)
                .await
        );
        assert_eq!(session.started_workflow(), Some(AuthMethod::Authenticate));
        assert!(session.pending_authentication_request().is_some());
        assert!(session.get(FIDO_U2F_REGISTRATION_REQUEST).is_none());
    }

    #[tokio::test]
    async fn test_prepare_requires_user_and_session_id() {
        let h = harness().await;

        let mut anonymous = SessionState::new("sess-1");
        assert!(
            !h.plugin
                .prepare_for_step(&h.configuration, &RequestParameters::new(), &mut anonymous, 2)
                .await
        );

        let mut no_id = SessionState::new("");
        no_id.set_authenticated_user(User::new("alice", "alice", "@!A11CE"));
        assert!(
            !h.plugin
                .prepare_for_step(&h.configuration, &RequestParameters::new(), &mut no_id, 2)
                .await
        );
        assert!(h.fido.calls().iter().all(|c| !c.starts_with("start_")));
    }

    #[tokio::test]
    async fn test_not_found_on_start_authentication_is_soft() {
        let h = harness().await;
        h.fido
            .fail_start_authentication(FidoClientError::status(404, "no device"));
        let mut session = logged_in(&h, "bob", "bob-password").await;
        // Stale payload from an earlier attempt must not survive
        session.set(FIDO_U2F_REGISTRATION_REQUEST, "{}".to_string());

        assert!(
            h.plugin
                .prepare_for_step(&h.configuration, &RequestParameters::new(), &mut session, 2)
                .await
        );
        assert_eq!(session.started_workflow(), None);
        assert!(session.get(FIDO_U2F_REGISTRATION_REQUEST).is_none());

        // Nothing was started, so any submission fails locally
        assert!(
            !h.plugin
                .authenticate(
                    &h.configuration,
                    &Credentials::default(),
                    &device_params("authenticate", "token"),
                    &mut session,
                    2,
                )
                .await
        );
    }

    #[tokio::test]
    async fn test_other_start_errors_fail_the_step() {
        let h = harness().await;
        h.fido
            .fail_start_authentication(FidoClientError::status(500, "boom"));
        let mut session = logged_in(&h, "bob", "bob-password").await;
        assert!(
            !h.plugin
                .prepare_for_step(&h.configuration, &RequestParameters::new(), &mut session, 2)
                .await
        );
    }

    #[tokio::test]
    async fn test_enroll_success_and_failure() {
        let h = harness().await;
        let mut session = logged_in(&h, "alice", "alice-password").await;
        h.plugin
            .prepare_for_step(&h.configuration, &RequestParameters::new(), &mut session, 2)
            .await;

        h.fido.set_registration_status("failed");
        assert!(
            !h.plugin
                .authenticate(
                    &h.configuration,
                    &Credentials::default(),
                    &device_params("enroll", "token"),
                    &mut session,
                    2,
                )
                .await
        );

        h.plugin
            .prepare_for_step(&h.configuration, &RequestParameters::new(), &mut session, 2)
            .await;
        h.fido.set_registration_status("success");
        assert!(
            h.plugin
                .authenticate(
                    &h.configuration,
                    &Credentials::default(),
                    &device_params("enroll", "token"),
                    &mut session,
                    2,
                )
                .await
        );
        assert_eq!(session.started_workflow(), None);

        // The enrolled device now routes the next login to authentication
        let mut next = logged_in(&h, "alice", "alice-password").await;
        h.plugin
            .prepare_for_step(&h.configuration, &RequestParameters::new(), &mut next, 2)
            .await;
        assert_eq!(next.started_workflow(), Some(AuthMethod::Authenticate));
    }

    #[tokio::test]
    async fn test_unknown_auth_method_always_fails() {
        let h = harness().await;
        let mut session = logged_in(&h, "alice", "alice-password").await;
        h.plugin
            .prepare_for_step(&h.configuration, &RequestParameters::new(), &mut session, 2)
            .await;

        assert!(
            !h.plugin
                .authenticate(
                    &h.configuration,
                    &Credentials::default(),
                    &device_params("sms", "valid-token"),
                    &mut session,
                    2,
                )
                .await
        );
        assert!(h.fido.calls().iter().all(|c| !c.starts_with("finish_")));
    }

    #[tokio::test]
    async fn test_auth_method_mismatch_fails_locally() {
        let h = harness().await;
        let mut session = logged_in(&h, "bob", "bob-password").await;
        h.plugin
            .prepare_for_step(&h.configuration, &RequestParameters::new(), &mut session, 2)
            .await;

        assert!(
            !h.plugin
                .authenticate(
                    &h.configuration,
                    &Credentials::default(),
                    &device_params("enroll", "token"),
                    &mut session,
                    2,
                )
                .await
        );
        assert!(h.fido.calls().iter().all(|c| !c.starts_with("finish_")));
        // The started workflow is still pending for a correct resubmission
        assert_eq!(session.started_workflow(), Some(AuthMethod::Authenticate));
    }

    #[tokio::test]
    async fn test_missing_token_or_method_fails() {
        let h = harness().await;
        let mut session = logged_in(&h, "alice", "alice-password").await;
        h.plugin
            .prepare_for_step(&h.configuration, &RequestParameters::new(), &mut session, 2)
            .await;

        for params in [
            RequestParameters::new().with(PARAM_AUTH_METHOD, "enroll"),
            RequestParameters::new().with(PARAM_TOKEN_RESPONSE, "token"),
            device_params("enroll", ""),
        ] {
            assert!(
                !h.plugin
                    .authenticate(
                        &h.configuration,
                        &Credentials::default(),
                        &params,
                        &mut session,
                        2,
                    )
                    .await
            );
        }
    }

    #[tokio::test]
    async fn test_step_bounds() {
        let h = harness().await;
        let mut session = SessionState::new("s");
        let params = RequestParameters::new();
        assert!(h.plugin.prepare_for_step(&h.configuration, &params, &mut session, 1).await);
        assert!(h.plugin.prepare_for_step(&h.configuration, &params, &mut session, 3).await);
        assert!(!h.plugin.prepare_for_step(&h.configuration, &params, &mut session, 0).await);
        assert!(!h.plugin.prepare_for_step(&h.configuration, &params, &mut session, 4).await);
        assert!(
            !h.plugin
                .authenticate(&h.configuration, &Credentials::default(), &params, &mut session, 3)
                .await
        );
    }

    #[tokio::test]
    async fn test_static_answers() {
        let h = harness().await;
        let c = &h.configuration;
        assert_eq!(h.plugin.get_count_authentication_steps(c), 2);
        assert_eq!(h.plugin.get_page_for_step(c, 2), U2F_LOGIN_PAGE);
        assert_eq!(h.plugin.get_page_for_step(c, 1), "");
        assert_eq!(h.plugin.get_page_for_step(c, 3), "");
        assert_eq!(h.plugin.get_extra_parameters_for_step(c, 2), None);
        assert_eq!(h.plugin.get_api_version(), 1);
        assert!(h.plugin.is_valid_authentication_method(c));
        assert_eq!(h.plugin.get_alternative_authentication_method(c), None);
        assert!(h.plugin.logout(c, &RequestParameters::new()));
        assert!(h.plugin.destroy(c));
    }
}
