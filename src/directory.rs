//! User directory capability
//!
//! Password verification and device registration lookups come from the
//! directory. `InMemoryUserDirectory` backs the bundled host from the
//! `[[users]]` settings table.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::models::{DeviceRegistration, User};
use crate::settings::UserSettings;

/// Directory lookup failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DirectoryError {
    #[error("no user with inum {0}")]
    UnknownInum(String),
}

/// Read access to users and their enrolled U2F devices
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Check a username/password pair
    async fn authenticate(&self, user_name: &str, password: &str) -> bool;

    /// Resolve a user by login name
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be queried.
    async fn find_user(&self, user_name: &str) -> Result<Option<User>, DirectoryError>;

    /// All device registrations of `user_inum` for `application_id`
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be queried.
    async fn find_device_registrations(
        &self,
        user_inum: &str,
        application_id: &str,
    ) -> Result<Vec<DeviceRegistration>, DirectoryError>;

    /// Remember a device enrolled through a finished registration workflow.
    /// Directories the FIDO server writes to itself keep the default no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be updated.
    async fn record_device_registration(
        &self,
        _registration: DeviceRegistration,
    ) -> Result<(), DirectoryError> {
        Ok(())
    }
}

/// Hash a password the way `password_sha256` is stored in settings
#[must_use]
pub fn hash_password(password: &str) -> String {
    STANDARD.encode(Sha256::digest(password.as_bytes()))
}

struct DirectoryEntry {
    user: User,
    password_sha256: String,
}

/// Directory held in memory, seeded from settings
#[derive(Default)]
pub struct InMemoryUserDirectory {
    users: RwLock<HashMap<String, DirectoryEntry>>,
    registrations: RwLock<Vec<DeviceRegistration>>,
}

impl InMemoryUserDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a directory from the configured users and their devices
    #[must_use]
    pub fn from_settings(users: &[UserSettings]) -> Self {
        let mut entries = HashMap::new();
        let mut registrations = Vec::new();

        for settings in users {
            let user = User::new(&settings.user_name, &settings.user_id, &settings.inum);
            for application_id in &settings.devices {
                registrations.push(DeviceRegistration {
                    user_inum: user.inum.clone(),
                    application_id: application_id.clone(),
                    key_handle: None,
                });
            }
            entries.insert(
                settings.user_name.clone(),
                DirectoryEntry {
                    user,
                    password_sha256: settings.password_sha256.clone(),
                },
            );
        }

        log::info!(
            "Loaded {} users and {} device registrations into the directory",
            entries.len(),
            registrations.len()
        );

        Self {
            users: RwLock::new(entries),
            registrations: RwLock::new(registrations),
        }
    }

    /// Add or replace a user with a plaintext password
    pub async fn add_user(&self, user: User, password: &str) {
        let entry = DirectoryEntry {
            password_sha256: hash_password(password),
            user,
        };
        self.users
            .write()
            .await
            .insert(entry.user.user_name.clone(), entry);
    }

    /// Record an enrolled device, e.g. after a successful registration
    pub async fn add_device_registration(&self, registration: DeviceRegistration) {
        self.registrations.write().await.push(registration);
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn authenticate(&self, user_name: &str, password: &str) -> bool {
        let users = self.users.read().await;
        users
            .get(user_name)
            .is_some_and(|entry| entry.password_sha256 == hash_password(password))
    }

    async fn find_user(&self, user_name: &str) -> Result<Option<User>, DirectoryError> {
        Ok(self
            .users
            .read()
            .await
            .get(user_name)
            .map(|entry| entry.user.clone()))
    }

    async fn find_device_registrations(
        &self,
        user_inum: &str,
        application_id: &str,
    ) -> Result<Vec<DeviceRegistration>, DirectoryError> {
        Ok(self
            .registrations
            .read()
            .await
            .iter()
            .filter(|r| r.user_inum == user_inum && r.application_id == application_id)
            .cloned()
            .collect())
    }

    async fn record_device_registration(
        &self,
        registration: DeviceRegistration,
    ) -> Result<(), DirectoryError> {
        let known = self
            .users
            .read()
            .await
            .values()
            .any(|entry| entry.user.inum == registration.user_inum);
        if !known {
            return Err(DirectoryError::UnknownInum(registration.user_inum));
        }
        self.add_device_registration(registration).await;
        Ok(())
    }
}
