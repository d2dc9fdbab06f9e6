use rand::{rng, Rng};
use rand::distr::Alphanumeric;

use crate::common::Settings;

/// Length of generated passwords.
pub const GENERATED_PASSWORD_LENGTH: usize = 12;

/// Creates a random alphanumeric string.
pub fn create_random_string(length: usize) -> String {
    rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

/// The `SessionCredentials` struct holds the secrets of one invocation. They are resolved once
/// and shared by every generated artifact so that the artifacts always agree.
#[derive(Clone)]
pub struct SessionCredentials {
    vnc_password: String,
    gateway_username: String,
    gateway_password: String,
    generated: bool,
}

impl SessionCredentials {
    /// Uses the passwords from the settings, generating the missing ones.
    pub fn resolve(settings: &Settings) -> Self {
        let vnc_password = settings.vnc_password.clone().filter(|password| !password.is_empty());
        let gateway_password = settings.gateway.password.clone().filter(|password| !password.is_empty());
        let generated = vnc_password.is_none() || gateway_password.is_none();

        Self {
            vnc_password: vnc_password.unwrap_or_else(|| create_random_string(GENERATED_PASSWORD_LENGTH)),
            gateway_username: settings.gateway.username.clone(),
            gateway_password: gateway_password.unwrap_or_else(|| create_random_string(GENERATED_PASSWORD_LENGTH)),
            generated,
        }
    }

    pub fn vnc_password(&self) -> &str {
        &self.vnc_password
    }

    pub fn gateway_username(&self) -> &str {
        &self.gateway_username
    }

    pub fn gateway_password(&self) -> &str {
        &self.gateway_password
    }

    /// True if at least one password was generated rather than configured.
    pub fn generated(&self) -> bool {
        self.generated
    }
}
