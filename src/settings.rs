use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::authentication::traits::ConfigurationAttributes;
use crate::authentication::u2f::{ATTR_APPLICATION_ID, ATTR_SERVER_URI};
use crate::fido::metadata::{DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY};
use crate::fido::RetryPolicy;

/// Environment variable naming a directory with an overriding `Settings.toml`
pub const SECRETS_DIR_ENV: &str = "U2F_SECRETS_DIR";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct U2fSettings {
    pub application: ApplicationSettings,
    pub u2f: U2fServerSettings,
    pub metadata: MetadataSettings,
    pub session: SessionSettings,
    pub logging: LoggingSettings,
    pub users: Vec<UserSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct U2fServerSettings {
    /// Base URI of the FIDO U2F server; the well-known path is appended
    pub server_uri: String,
    /// U2F application id (facet) devices are registered for
    pub application_id: String,
    /// Timeout for every individual FIDO request
    pub request_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataSettings {
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub cookie_secure: bool,
    /// Unfinished logins older than this are discarded
    pub login_timeout_minutes: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
}

/// A directory user for the bundled in-memory directory
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct UserSettings {
    pub user_name: String,
    pub user_id: String,
    pub inum: String,
    /// Base64 SHA-256 digest of the password
    pub password_sha256: String,
    /// Application ids this user already has an enrolled device for
    pub devices: Vec<String>,
}

impl Default for ApplicationSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for U2fServerSettings {
    fn default() -> Self {
        Self {
            server_uri: String::new(),
            application_id: String::new(),
            request_timeout_seconds: 30,
        }
    }
}

impl Default for MetadataSettings {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay_ms: u64::try_from(DEFAULT_RETRY_DELAY.as_millis()).unwrap_or(3000),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            cookie_secure: true,
            login_timeout_minutes: 10,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl U2fSettings {
    /// Load settings from configuration files and environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Logger initialization fails
    /// - Settings file cannot be read or parsed
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        Self::load_env_file();

        let mut settings = Self::load_base_settings()?;
        Self::apply_env_overrides(&mut settings);
        settings.logger_builder().try_init()?;

        Ok(settings)
    }

    /// Logger filtered by `logging.level`, which `RUST_LOG` overrides
    #[must_use]
    pub fn logger_builder(&self) -> env_logger::Builder {
        let mut builder = env_logger::Builder::new();
        builder.parse_filters(&self.logging.level);
        builder
    }

    /// Load base settings with the following priority (highest to lowest):
    /// 1. Environment variables (applied separately after loading base settings)
    /// 2. Settings.toml in `U2F_SECRETS_DIR` (if specified and exists)
    /// 3. Settings.toml in current directory (if exists)
    /// 4. Default settings
    ///
    /// # Errors
    ///
    /// Returns an error if a settings file cannot be read or parsed
    fn load_base_settings() -> Result<Self, Box<dyn std::error::Error>> {
        let mut settings = Self::default();

        let default_config_path = Path::new("Settings.toml");
        if default_config_path.exists() {
            settings = Self::from_file(default_config_path)?;
            println!(
                "✓ Loaded base settings from {}",
                default_config_path.display()
            );
        }

        if let Ok(secrets_dir) = std::env::var(SECRETS_DIR_ENV) {
            let secrets_path = Path::new(&secrets_dir).join("Settings.toml");
            if secrets_path.exists() {
                settings = Self::from_file(&secrets_path)?;
                println!("✓ Overriding settings from {}", secrets_path.display());
            } else {
                println!(
                    "ℹ {SECRETS_DIR_ENV} set but no Settings.toml found at: {}",
                    secrets_path.display()
                );
            }
        }

        Ok(settings)
    }

    /// Parse one TOML settings file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid TOML
    pub fn from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let toml_content = fs::read_to_string(path)?;
        Ok(basic_toml::from_str(&toml_content)?)
    }

    /// Apply environment variable overrides to settings
    pub fn apply_env_overrides(settings: &mut Self) {
        Self::apply_application_env_overrides(&mut settings.application);
        Self::apply_u2f_env_overrides(&mut settings.u2f);
        Self::apply_metadata_env_overrides(&mut settings.metadata);
        Self::apply_session_env_overrides(&mut settings.session);
        Self::apply_logging_env_overrides(&mut settings.logging);
    }

    fn apply_application_env_overrides(app_settings: &mut ApplicationSettings) {
        if let Ok(host) = std::env::var("HOST") {
            app_settings.host = host;
        }
        Self::apply_parsed_env_override("PORT", &mut app_settings.port);
    }

    fn apply_u2f_env_overrides(u2f_settings: &mut U2fServerSettings) {
        if let Ok(server_uri) = std::env::var("U2F_SERVER_URI") {
            u2f_settings.server_uri = server_uri;
        }
        if let Ok(application_id) = std::env::var("U2F_APPLICATION_ID") {
            u2f_settings.application_id = application_id;
        }
    }

    fn apply_metadata_env_overrides(metadata_settings: &mut MetadataSettings) {
        Self::apply_parsed_env_override(
            "METADATA_MAX_ATTEMPTS",
            &mut metadata_settings.max_attempts,
        );
        Self::apply_parsed_env_override(
            "METADATA_RETRY_DELAY_MS",
            &mut metadata_settings.retry_delay_ms,
        );
    }

    fn apply_session_env_overrides(session_settings: &mut SessionSettings) {
        Self::apply_parsed_env_override("SESSION_COOKIE_SECURE", &mut session_settings.cookie_secure);
        Self::apply_parsed_env_override(
            "LOGIN_TIMEOUT_MINUTES",
            &mut session_settings.login_timeout_minutes,
        );
    }

    fn apply_logging_env_overrides(logging_settings: &mut LoggingSettings) {
        if let Ok(log_level) = std::env::var("RUST_LOG") {
            logging_settings.level = log_level;
        }
    }

    /// Overwrite `target` when `env_var` is set and parses; ignore it otherwise
    fn apply_parsed_env_override<T: std::str::FromStr>(env_var: &str, target: &mut T) {
        if let Ok(value_str) = std::env::var(env_var) {
            if let Ok(value) = value_str.parse::<T>() {
                *target = value;
            }
        }
    }

    /// Load environment variables from .env file
    fn load_env_file() {
        if let Ok(contents) = std::fs::read_to_string(".env") {
            for line in contents.lines() {
                if let Some((key, value)) = line.split_once('=') {
                    std::env::set_var(key.trim(), value.trim());
                }
            }
        }
    }

    /// Get the bind address for the server
    #[must_use]
    pub fn get_bind_address(&self) -> String {
        format!("{}:{}", self.application.host, self.application.port)
    }

    /// Attributes handed to the plugin's `init`
    #[must_use]
    pub fn configuration_attributes(&self) -> ConfigurationAttributes {
        ConfigurationAttributes::new()
            .with(ATTR_SERVER_URI, &self.u2f.server_uri)
            .with(ATTR_APPLICATION_ID, &self.u2f.application_id)
    }

    /// Metadata retry policy
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.metadata.max_attempts.max(1),
            delay: Duration::from_millis(self.metadata.retry_delay_ms),
        }
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.u2f.request_timeout_seconds)
    }
}
