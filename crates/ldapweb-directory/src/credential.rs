//! Per-request credentials.

use ldapweb_core::{build_dn, DirectoryConfig, Error, Result};
use secrecy::{ExposeSecret, SecretString};

/// A user's directory login for the duration of one operation.
///
/// The DN is always derived from the username through the configured template, so the same raw
/// username feeds both the bind and the lookup filter.
#[derive(Debug)]
pub struct Credential {
    username: String,
    dn: String,
    password: SecretString,
}

impl Credential {
    /// Builds a credential for `username`, deriving its DN from the configured template.
    #[must_use]
    pub fn new(
        config: &DirectoryConfig,
        username: impl Into<String>,
        password: SecretString,
    ) -> Self {
        let username = username.into();
        Self {
            dn: build_dn(config.dn_template(), &username),
            username,
            password,
        }
    }

    /// Username as typed by the user.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Distinguished name the user binds as.
    #[must_use]
    pub fn dn(&self) -> &str {
        &self.dn
    }

    /// Current password.
    #[must_use]
    pub const fn password(&self) -> &SecretString {
        &self.password
    }
}

/// A requested password change as submitted through a form.
#[derive(Debug)]
pub struct PasswordChange {
    new_password: SecretString,
    new_password_confirmation: SecretString,
}

impl PasswordChange {
    /// Creates a password change request.
    #[must_use]
    pub fn new(new_password: SecretString, new_password_confirmation: SecretString) -> Self {
        Self {
            new_password,
            new_password_confirmation,
        }
    }

    /// The new password.
    #[must_use]
    pub const fn new_password(&self) -> &SecretString {
        &self.new_password
    }

    /// Checks that both entries match.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ValidationError`] when the confirmation differs.
    pub fn validate(&self) -> Result<()> {
        if self.new_password.expose_secret() != self.new_password_confirmation.expose_secret() {
            return Err(Error::ValidationError("passwords don't match".to_string()));
        }
        Ok(())
    }
}
