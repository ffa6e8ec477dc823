use actix_web::cookie::{time::Duration, Cookie, SameSite};
use actix_web::HttpRequest;

/// Cookie carrying the login session id
pub const SESSION_COOKIE_NAME: &str = "u2f_session";

/// Options for cookie creation
pub struct CookieOptions {
    pub http_only: bool,
    pub secure: bool,
    pub same_site: SameSite,
    pub path: String,
    pub max_age: Duration,
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            http_only: true,
            secure: true,
            same_site: SameSite::Strict,
            path: "/".to_string(),
            max_age: Duration::minutes(10),
        }
    }
}

/// Builds the session cookie with the configured security flags
#[derive(Clone)]
pub struct CookieFactory {
    cookie_secure: bool,
    login_timeout_minutes: i64,
}

impl CookieFactory {
    #[must_use]
    pub fn new(cookie_secure: bool, login_timeout_minutes: i64) -> Self {
        Self {
            cookie_secure,
            login_timeout_minutes,
        }
    }

    fn build(&self, value: String, options: CookieOptions) -> Cookie<'static> {
        Cookie::build(SESSION_COOKIE_NAME, value)
            .http_only(options.http_only)
            .secure(self.cookie_secure && options.secure)
            .same_site(options.same_site)
            .path(options.path)
            .max_age(options.max_age)
            .finish()
    }

    /// Cookie binding the browser to `session_id`
    #[must_use]
    pub fn session_cookie(&self, session_id: &str) -> Cookie<'static> {
        self.build(
            session_id.to_string(),
            CookieOptions {
                same_site: SameSite::Lax,
                max_age: Duration::minutes(self.login_timeout_minutes),
                ..Default::default()
            },
        )
    }

    /// Cookie that clears the session id in the browser
    #[must_use]
    pub fn expired_session_cookie(&self) -> Cookie<'static> {
        self.build(
            String::new(),
            CookieOptions {
                max_age: Duration::ZERO,
                ..Default::default()
            },
        )
    }
}

/// Read the session id from the request cookie, if any
#[must_use]
pub fn session_id_from_request(req: &HttpRequest) -> Option<String> {
    req.cookie(SESSION_COOKIE_NAME)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn test_session_cookie_flags() {
        let factory = CookieFactory::new(true, 15);
        let cookie = factory.session_cookie("abc");
        assert_eq!(cookie.name(), SESSION_COOKIE_NAME);
        assert_eq!(cookie.value(), "abc");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.max_age(), Some(Duration::minutes(15)));
    }

    #[test]
    fn test_insecure_cookie_when_disabled() {
        let factory = CookieFactory::new(false, 15);
        assert_eq!(factory.session_cookie("abc").secure(), Some(false));
    }

    #[test]
    fn test_expired_cookie_clears_value() {
        let cookie = CookieFactory::new(true, 15).expired_session_cookie();
        assert_eq!(cookie.value(), "");
        assert_eq!(cookie.max_age(), Some(Duration::ZERO));
    }

    #[test]
    fn test_session_id_from_request() {
        let req = TestRequest::default()
            .cookie(Cookie::new(SESSION_COOKIE_NAME, "sess-1"))
            .to_http_request();
        assert_eq!(session_id_from_request(&req), Some("sess-1".to_string()));

        let empty = TestRequest::default()
            .cookie(Cookie::new(SESSION_COOKIE_NAME, ""))
            .to_http_request();
        assert_eq!(session_id_from_request(&empty), None);
    }
}
