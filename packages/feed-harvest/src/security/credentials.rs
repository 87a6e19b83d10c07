//! Login credentials, resolved from explicit values or the environment.

use secrecy::{ExposeSecret, SecretBox};
use std::fmt;

use crate::error::AuthError;

/// Environment variable holding the login username.
pub const USERNAME_ENV: &str = "LINKEDIN_USERNAME";

/// Environment variable holding the login password.
pub const PASSWORD_ENV: &str = "LINKEDIN_PASSWORD";

/// Password or API key. Formats as `[REDACTED]` in logs and errors.
pub struct SecretString(SecretBox<str>);

impl SecretString {
    pub fn new(value: impl Into<String>) -> Self {
        Self(SecretBox::new(value.into().into_boxed_str()))
    }

    /// The plain value, for the login form or an auth header.
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    pub fn is_empty(&self) -> bool {
        self.expose().is_empty()
    }
}

impl Clone for SecretString {
    fn clone(&self) -> Self {
        Self::new(self.expose())
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretString([REDACTED])")
    }
}

impl From<String> for SecretString {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for SecretString {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Login credentials for the target site.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<SecretString>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Explicit values win over `LINKEDIN_USERNAME` / `LINKEDIN_PASSWORD`.
    pub fn resolve(username: Option<String>, password: Option<String>) -> Result<Self, AuthError> {
        Self::resolve_with(username, password, |key| std::env::var(key).ok())
    }

    /// Read both values from the environment.
    pub fn from_env() -> Result<Self, AuthError> {
        Self::resolve(None, None)
    }

    fn resolve_with(
        username: Option<String>,
        password: Option<String>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, AuthError> {
        let username = username
            .filter(|u| !u.trim().is_empty())
            .or_else(|| lookup(USERNAME_ENV))
            .filter(|u| !u.trim().is_empty())
            .ok_or(AuthError::MissingCredentials)?;
        let password = password
            .filter(|p| !p.is_empty())
            .or_else(|| lookup(PASSWORD_ENV))
            .filter(|p| !p.is_empty())
            .ok_or(AuthError::MissingCredentials)?;

        Ok(Self::new(username, password))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |key| {
            pairs
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn test_secret_redacted_but_exposable() {
        let secret = SecretString::from("hunter2");
        assert_eq!(format!("{:?}", secret), "SecretString([REDACTED])");
        assert_eq!(secret.clone().expose(), "hunter2");
        assert!(SecretString::new("").is_empty());
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let creds = Credentials::new("ada@example.com", "hunter2");
        let debug = format!("{:?}", creds);
        assert!(debug.contains("ada@example.com"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_explicit_values_win() {
        let creds = Credentials::resolve_with(
            Some("explicit".into()),
            Some("pw".into()),
            env(&[(USERNAME_ENV, "from-env"), (PASSWORD_ENV, "env-pw")]),
        )
        .unwrap();
        assert_eq!(creds.username, "explicit");
        assert_eq!(creds.password.expose(), "pw");
    }

    #[test]
    fn test_falls_back_to_env() {
        let creds = Credentials::resolve_with(
            None,
            None,
            env(&[(USERNAME_ENV, "from-env"), (PASSWORD_ENV, "env-pw")]),
        )
        .unwrap();
        assert_eq!(creds.username, "from-env");
    }

    #[test]
    fn test_missing_password_is_error() {
        let result = Credentials::resolve_with(Some("user".into()), None, env(&[]));
        assert!(matches!(result, Err(AuthError::MissingCredentials)));
    }
}
