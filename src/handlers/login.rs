// Login handlers: primary credentials, U2F device step and logout
use crate::authentication::{LoginFlow, RequestParameters, StepOutcome};
use crate::models::{Credentials, STEP_DEVICE_INTERACTION};
use crate::session::{session_id_from_request, CookieFactory, SessionHandle, SessionRegistry};
use actix_web::{web, HttpRequest, HttpResponse, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

/// Submitted form fields, repeated names kept in order
pub type FormFields = web::Form<Vec<(String, String)>>;

/// JSON answer to every step submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepResponse {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

impl StepResponse {
    fn next_step(step: u32, page: String) -> Self {
        Self {
            status: "next_step".to_string(),
            step: Some(step),
            page: Some(page).filter(|p| !p.is_empty()),
            user: None,
        }
    }

    fn authenticated(user: Option<String>) -> Self {
        Self {
            status: "authenticated".to_string(),
            step: None,
            page: None,
            user,
        }
    }

    fn failed(step: u32) -> Self {
        Self {
            status: "failed".to_string(),
            step: Some(step),
            page: None,
            user: None,
        }
    }
}

fn error_response(mut builder: actix_web::HttpResponseBuilder, error: &str, message: &str) -> HttpResponse {
    builder.json(serde_json::json!({
        "error": error,
        "message": message
    }))
}

async fn current_session(req: &HttpRequest, registry: &SessionRegistry) -> Option<(String, SessionHandle)> {
    let session_id = session_id_from_request(req)?;
    let handle = registry.get(&session_id).await?;
    Some((session_id, handle))
}

/// Turn a step outcome into the HTTP answer; finished logins are discarded
async fn respond(
    outcome: StepOutcome,
    session_id: &str,
    user: Option<String>,
    registry: &SessionRegistry,
    cookies: &CookieFactory,
) -> HttpResponse {
    match outcome {
        StepOutcome::NextStep { step, page } => {
            debug!("Session {session_id} advanced to step {step}");
            HttpResponse::Ok()
                .cookie(cookies.session_cookie(session_id))
                .json(StepResponse::next_step(step, page))
        }
        StepOutcome::Completed => {
            info!(
                "Session {session_id} authenticated for {}",
                user.as_deref().unwrap_or("unknown user")
            );
            registry.remove(session_id).await;
            HttpResponse::Ok()
                .cookie(cookies.expired_session_cookie())
                .json(StepResponse::authenticated(user))
        }
        StepOutcome::Failed { step } => {
            warn!("Session {session_id} failed at step {step}");
            registry.remove(session_id).await;
            HttpResponse::Unauthorized()
                .cookie(cookies.expired_session_cookie())
                .json(StepResponse::failed(step))
        }
    }
}

/// Primary credential step; always starts a fresh login session
///
/// # Errors
/// Never fails; rejected credentials answer `401`
pub async fn login(
    req: HttpRequest,
    form: FormFields,
    flow: web::Data<LoginFlow>,
    registry: web::Data<SessionRegistry>,
    cookies: web::Data<CookieFactory>,
) -> Result<HttpResponse> {
    if let Some(previous) = session_id_from_request(&req) {
        registry.remove(&previous).await;
    }

    let parameters: RequestParameters = form.into_inner().into_iter().collect();
    let credentials = Credentials::new(
        parameters.first_value("username").unwrap_or_default(),
        parameters.first_value("password").unwrap_or_default(),
    );

    let (session_id, handle) = registry.create().await;
    let (outcome, user) = {
        let mut session = handle.lock().await;
        let outcome = flow
            .submit_credentials(&mut session, &credentials, &parameters)
            .await;
        (outcome, session.authenticated_user().map(|u| u.user_name.clone()))
    };

    Ok(respond(outcome, &session_id, user, &registry, &cookies).await)
}

/// Challenge data for the device page
///
/// # Errors
/// Never fails; a missing session answers `401`, a session on another step `409`
pub async fn u2f_challenge(
    req: HttpRequest,
    flow: web::Data<LoginFlow>,
    registry: web::Data<SessionRegistry>,
) -> Result<HttpResponse> {
    let Some((_, handle)) = current_session(&req, &registry).await else {
        return Ok(error_response(
            HttpResponse::Unauthorized(),
            "no_session",
            "No login in progress",
        ));
    };

    let session = handle.lock().await;
    if session.is_completed() || session.current_step() != STEP_DEVICE_INTERACTION {
        return Ok(error_response(
            HttpResponse::Conflict(),
            "wrong_step",
            "Login is not waiting for a U2F device",
        ));
    }
    Ok(HttpResponse::Ok().json(flow.pending_requests(&session)))
}

/// Device step: the browser posts `authMethod` and `tokenResponse`
///
/// # Errors
/// Never fails; a rejected response answers `401`
pub async fn u2f_response(
    req: HttpRequest,
    form: FormFields,
    flow: web::Data<LoginFlow>,
    registry: web::Data<SessionRegistry>,
    cookies: web::Data<CookieFactory>,
) -> Result<HttpResponse> {
    let Some((session_id, handle)) = current_session(&req, &registry).await else {
        return Ok(error_response(
            HttpResponse::Unauthorized(),
            "no_session",
            "No login in progress",
        ));
    };

    let parameters: RequestParameters = form.into_inner().into_iter().collect();
    let (outcome, user) = {
        let mut session = handle.lock().await;
        let outcome = flow.submit_token_response(&mut session, &parameters).await;
        (outcome, session.authenticated_user().map(|u| u.user_name.clone()))
    };

    Ok(respond(outcome, &session_id, user, &registry, &cookies).await)
}

/// Drop the login session and tell the plugin
///
/// # Errors
/// Never fails
pub async fn logout(
    req: HttpRequest,
    form: Option<FormFields>,
    flow: web::Data<LoginFlow>,
    registry: web::Data<SessionRegistry>,
    cookies: web::Data<CookieFactory>,
) -> Result<HttpResponse> {
    if let Some(session_id) = session_id_from_request(&req) {
        registry.remove(&session_id).await;
        debug!("Removed login session {session_id}");
    }

    let parameters: RequestParameters = form
        .map(|f| f.into_inner().into_iter().collect())
        .unwrap_or_default();
    let accepted = flow.logout(&parameters);

    Ok(HttpResponse::Ok()
        .cookie(cookies.expired_session_cookie())
        .json(serde_json::json!({
            "status": if accepted { "logged_out" } else { "logout_refused" }
        })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::configure_routes;
    use crate::session::SESSION_COOKIE_NAME;
    use crate::testing::{MockFidoClient, TestFixtures};
    use actix_web::cookie::Cookie;
    use actix_web::{http::StatusCode, test, App};
    use std::sync::Arc;

    macro_rules! app {
        ($flow:expr) => {
            test::init_service(
                App::new()
                    .app_data(web::Data::new($flow))
                    .app_data(web::Data::new(SessionRegistry::new(10)))
                    .app_data(web::Data::new(CookieFactory::new(false, 10)))
                    .configure(configure_routes),
            )
        };
    }

    fn session_cookie(resp: &actix_web::dev::ServiceResponse) -> Option<Cookie<'static>> {
        resp.response()
            .cookies()
            .find(|c| c.name() == SESSION_COOKIE_NAME)
            .map(Cookie::into_owned)
    }

    #[actix_web::test]
    async fn test_enrollment_over_http() {
        let flow = TestFixtures::login_flow(Arc::new(MockFidoClient::new())).await;
        let app = app!(flow).await;

        let req = test::TestRequest::post()
            .uri("/auth/login")
            .set_form([("username", "alice"), ("password", "alice-password")])
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let cookie = session_cookie(&resp).expect("session cookie");
        let body: StepResponse = test::read_body_json(resp).await;
        assert_eq!(body.step, Some(2));
        assert_eq!(body.page.as_deref(), Some("/auth/u2f/login"));

        let req = test::TestRequest::get()
            .uri("/auth/u2f/login")
            .cookie(cookie.clone())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let pending: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(pending["auth_method"], "enroll");
        assert!(pending["registration_request"].is_object());

        let req = test::TestRequest::post()
            .uri("/auth/u2f/login")
            .cookie(cookie)
            .set_form([("authMethod", "enroll"), ("tokenResponse", "signed")])
            .to_request();
        let body: StepResponse = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body.status, "authenticated");
        assert_eq!(body.user.as_deref(), Some("alice"));
    }

    #[actix_web::test]
    async fn test_completed_logins_are_discarded() {
        let flow = TestFixtures::login_flow(Arc::new(MockFidoClient::new())).await;
        let registry = SessionRegistry::new(10);
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(flow))
                .app_data(web::Data::new(registry.clone()))
                .app_data(web::Data::new(CookieFactory::new(false, 10)))
                .configure(configure_routes),
        )
        .await;

        for _ in 0..3 {
            let req = test::TestRequest::post()
                .uri("/auth/login")
                .set_form([("username", "bob"), ("password", "bob-password")])
                .to_request();
            let resp = test::call_service(&app, req).await;
            let cookie = session_cookie(&resp).expect("session cookie");

            let req = test::TestRequest::post()
                .uri("/auth/u2f/login")
                .cookie(cookie.clone())
                .set_form([("authMethod", "authenticate"), ("tokenResponse", "signed")])
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::OK);
            assert_eq!(
                session_cookie(&resp).map(|c| c.value().to_string()),
                Some(String::new())
            );
            let body: StepResponse = test::read_body_json(resp).await;
            assert_eq!(body.status, "authenticated");

            // The finished login cannot be replayed
            let req = test::TestRequest::get()
                .uri("/auth/u2f/login")
                .cookie(cookie)
                .to_request();
            assert_eq!(
                test::call_service(&app, req).await.status(),
                StatusCode::UNAUTHORIZED
            );
        }

        assert_eq!(registry.len().await, 0);
    }

    #[actix_web::test]
    async fn test_wrong_password_is_unauthorized() {
        let flow = TestFixtures::login_flow(Arc::new(MockFidoClient::new())).await;
        let app = app!(flow).await;

        let req = test::TestRequest::post()
            .uri("/auth/login")
            .set_form([("username", "alice"), ("password", "guess")])
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(session_cookie(&resp).map(|c| c.value().to_string()), Some(String::new()));
    }

    #[actix_web::test]
    async fn test_device_step_requires_session() {
        let flow = TestFixtures::login_flow(Arc::new(MockFidoClient::new())).await;
        let app = app!(flow).await;

        let req = test::TestRequest::get().uri("/auth/u2f/login").to_request();
        assert_eq!(
            test::call_service(&app, req).await.status(),
            StatusCode::UNAUTHORIZED
        );

        let req = test::TestRequest::post()
            .uri("/auth/u2f/login")
            .cookie(Cookie::new(SESSION_COOKIE_NAME, "forged"))
            .set_form([("authMethod", "enroll"), ("tokenResponse", "signed")])
            .to_request();
        assert_eq!(
            test::call_service(&app, req).await.status(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[actix_web::test]
    async fn test_rejected_device_response_discards_session() {
        let fido = Arc::new(MockFidoClient::new());
        fido.set_authentication_status("failed");
        let flow = TestFixtures::login_flow(fido).await;
        let app = app!(flow).await;

        let req = test::TestRequest::post()
            .uri("/auth/login")
            .set_form([("username", "bob"), ("password", "bob-password")])
            .to_request();
        let resp = test::call_service(&app, req).await;
        let cookie = session_cookie(&resp).expect("session cookie");

        let req = test::TestRequest::get()
            .uri("/auth/u2f/login")
            .cookie(cookie.clone())
            .to_request();
        let pending: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(pending["auth_method"], "authenticate");
        assert!(pending["authentication_request"].is_object());

        let req = test::TestRequest::post()
            .uri("/auth/u2f/login")
            .cookie(cookie.clone())
            .set_form([("authMethod", "authenticate"), ("tokenResponse", "signed")])
            .to_request();
        assert_eq!(
            test::call_service(&app, req).await.status(),
            StatusCode::UNAUTHORIZED
        );

        // The failed login cannot be resumed
        let req = test::TestRequest::get()
            .uri("/auth/u2f/login")
            .cookie(cookie)
            .to_request();
        assert_eq!(
            test::call_service(&app, req).await.status(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[actix_web::test]
    async fn test_logout_clears_cookie() {
        let flow = TestFixtures::login_flow(Arc::new(MockFidoClient::new())).await;
        let app = app!(flow).await;

        let req = test::TestRequest::post()
            .uri("/auth/logout")
            .cookie(Cookie::new(SESSION_COOKIE_NAME, "whatever"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(session_cookie(&resp).map(|c| c.value().to_string()), Some(String::new()));
    }
}
