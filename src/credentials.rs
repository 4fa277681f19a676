//! Outbound mail account credentials
//!
//! Credentials come either from environment variables or from a JSON secret
//! document of the form `{"username": "...", "password": "..."}` (the shape a
//! secrets manager returns as its secret string).

use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::PathBuf;
use thiserror::Error;

pub const USERNAME_VAR: &str = "PERFDIGEST_SMTP_USERNAME";
pub const PASSWORD_VAR: &str = "PERFDIGEST_SMTP_PASSWORD";

/// Errors retrieving credentials
#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("Credential not set: {0}")]
    Missing(String),

    #[error("Failed to read secret file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid secret document: {0}")]
    Json(#[from] serde_json::Error),
}

/// Username and password for the mail account
#[derive(Clone, Deserialize, PartialEq, Eq)]
pub struct MailCredentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for MailCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Something that can hand out mail credentials
pub trait CredentialSource {
    fn credentials(&self) -> Result<MailCredentials, CredentialError>;
}

/// Reads `PERFDIGEST_SMTP_USERNAME` / `PERFDIGEST_SMTP_PASSWORD`
#[derive(Debug, Clone, Default)]
pub struct EnvCredentials;

impl CredentialSource for EnvCredentials {
    fn credentials(&self) -> Result<MailCredentials, CredentialError> {
        let read = |var: &str| {
            std::env::var(var)
                .ok()
                .filter(|value| !value.is_empty())
                .ok_or_else(|| CredentialError::Missing(var.to_string()))
        };

        Ok(MailCredentials {
            username: read(USERNAME_VAR)?,
            password: read(PASSWORD_VAR)?,
        })
    }
}

/// Reads a JSON secret document from disk
#[derive(Debug, Clone)]
pub struct SecretFileCredentials {
    path: PathBuf,
}

impl SecretFileCredentials {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CredentialSource for SecretFileCredentials {
    fn credentials(&self) -> Result<MailCredentials, CredentialError> {
        let content = fs::read_to_string(&self.path).map_err(|source| CredentialError::Io {
            path: self.path.display().to_string(),
            source,
        })?;
        let creds: MailCredentials = serde_json::from_str(&content)?;

        if creds.username.is_empty() {
            return Err(CredentialError::Missing("username".to_string()));
        }
        if creds.password.is_empty() {
            return Err(CredentialError::Missing("password".to_string()));
        }
        Ok(creds)
    }
}
