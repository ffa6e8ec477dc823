// HTTP request handlers for the two-step login
pub mod health;
pub mod login;

use actix_web::web;

// Re-export the main handler functions
pub use health::health;
pub use login::{login, logout, u2f_challenge, u2f_response, StepResponse};

/// Register every route of the login host
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg
        // Primary credential step
        .route("/auth/login", web::post().to(login))
        // U2F device step
        .route("/auth/u2f/login", web::get().to(u2f_challenge))
        .route("/auth/u2f/login", web::post().to(u2f_response))
        .route("/auth/logout", web::post().to(logout))
        // Health endpoint
        .route("/ping", web::get().to(health));
}
