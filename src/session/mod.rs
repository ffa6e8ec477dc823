//! Session Management Module
//!
//! Login sessions for the two-step flow: the per-session state handed to the
//! plugin, the registry that owns all live sessions, and the cookie that ties
//! a browser to its session.
//!
//! # Modules
//!
//! - [`state`] - Session-scoped state threaded between authentication steps
//! - [`registry`] - In-memory registry of live login sessions
//! - [`cookie`] - Session cookie helpers

pub mod cookie;
pub mod registry;
pub mod state;

// Re-export commonly used items for convenience
pub use cookie::{session_id_from_request, CookieFactory, SESSION_COOKIE_NAME};
pub use registry::{SessionHandle, SessionRegistry};
pub use state::{
    SessionState, FIDO_U2F_AUTHENTICATION_REQUEST, FIDO_U2F_REGISTRATION_REQUEST,
    FIDO_U2F_WORKFLOW,
};
