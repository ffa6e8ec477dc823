#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![deny(warnings)]
#![allow(clippy::multiple_crate_versions)]

use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::Context;
use u2f_stepauth::{
    authentication::{AuthenticationServiceFactory, LoginFlow},
    configure_routes,
    session::{CookieFactory, SessionRegistry},
    settings::U2fSettings,
};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration from Settings.toml and environment variables
    // This also loads .env file and initializes the logger
    let settings = U2fSettings::load()
        .map_err(|e| anyhow::anyhow!("Failed to load settings: {e}"))?;

    // Logins are refused outright while the plugin is not initialized
    let flow = AuthenticationServiceFactory::create_login_flow(&settings)
        .await
        .context("Failed to initialize U2F authentication")?;

    let result = start_server(flow.clone(), &settings).await;

    if !flow.destroy() {
        log::warn!("U2F plugin did not release its resources cleanly");
    }
    result.context("HTTP server failed")
}

/// Start the login host
///
/// # Errors
///
/// Returns an error if:
/// - Server binding fails
/// - Server fails to start
async fn start_server(flow: LoginFlow, settings: &U2fSettings) -> std::io::Result<()> {
    let bind_address = settings.get_bind_address();
    print_startup_info(&bind_address, settings);

    let registry = SessionRegistry::new(settings.session.login_timeout_minutes);
    let cookies = CookieFactory::new(
        settings.session.cookie_secure,
        settings.session.login_timeout_minutes,
    );

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(flow.clone()))
            .app_data(web::Data::new(registry.clone()))
            .app_data(web::Data::new(cookies.clone()))
            .wrap(Logger::default())
            .configure(configure_routes)
    })
    .bind(&bind_address)?
    .run()
    .await
}

fn print_startup_info(bind_address: &str, settings: &U2fSettings) {
    println!("Starting U2F step authentication on http://{bind_address}");
    println!("FIDO U2F server: {}", settings.u2f.server_uri);
    println!("Application id:  {}", settings.u2f.application_id);
    println!();
    println!("Login endpoints:");
    println!("  POST /auth/login      - Step 1: username and password");
    println!("  GET  /auth/u2f/login  - Step 2: pending U2F challenge");
    println!("  POST /auth/u2f/login  - Step 2: authMethod and tokenResponse");
    println!("  POST /auth/logout     - Drop the login session");
    println!();
    println!("System endpoints:");
    println!("  GET  /ping            - Health check");
}
