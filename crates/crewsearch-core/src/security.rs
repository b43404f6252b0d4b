use std::env;

use crate::CrewSearchError;

/// Wrapper around sensitive values to reduce accidental logging.
#[derive(Clone)]
pub struct SecretValue(String);

impl SecretValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl std::fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "***redacted***")
    }
}

/// Require that a given environment variable is set and non-empty.
pub fn require_env(var: &str) -> Result<SecretValue, CrewSearchError> {
    match env::var(var) {
        Ok(value) if !value.trim().is_empty() => Ok(SecretValue(value)),
        _ => Err(CrewSearchError::MissingSecret(var.to_string())),
    }
}

/// Where a provider credential comes from.
///
/// `Env` is read on every call, so a key exported after startup is picked up
/// by the next request. `Static` pins the key for the lifetime of the value.
#[derive(Debug, Clone)]
pub enum CredentialSource {
    Env(String),
    Static(SecretValue),
}

impl CredentialSource {
    pub fn env(var: impl Into<String>) -> Self {
        Self::Env(var.into())
    }

    pub fn resolve(&self) -> Result<SecretValue, CrewSearchError> {
        match self {
            Self::Env(var) => require_env(var),
            Self::Static(secret) if secret.is_blank() => Err(CrewSearchError::MissingSecret(
                "explicit search credential".to_string(),
            )),
            Self::Static(secret) => Ok(secret.clone()),
        }
    }
}
