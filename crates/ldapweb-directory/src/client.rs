//! Directory client implementation.
//!
//! Every operation runs on its own connection, bound as the acting user. Nothing is pooled: the
//! directory server enforces access control per user and per operation.

use crate::{
    credential::{Credential, PasswordChange},
    entry::DirectoryEntry,
    Result,
};
use async_trait::async_trait;
use ldap3::{
    exop::PasswordModify, DerefAliases, LdapConnAsync, LdapConnSettings, LdapError, LdapResult,
    Mod, Scope, SearchOptions,
};
use ldapweb_core::{build_filter, DirectoryConfig, Error};
use native_tls::{Certificate, TlsConnector};
use secrecy::{ExposeSecret, SecretString};
use std::collections::HashSet;
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

/// Multi-valued attribute holding a user's mail aliases.
pub const MAIL_ALIAS_ATTRIBUTE: &str = "mailalias";

// `*` asks for every user attribute.
const ALL_USER_ATTRIBUTES: &[&str] = &["*"];

/// LDAP modification request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryModification {
    /// Add attribute values, keeping the existing ones.
    Add {
        /// Attribute to modify.
        attribute: String,
        /// Values to add.
        values: Vec<String>,
    },
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub(crate) trait LdapSession: Send {
    async fn simple_bind(&mut self, dn: &str, password: &str) -> Result<()>;
    async fn search(&mut self, base_dn: &str, filter: &str) -> Result<Vec<DirectoryEntry>>;
    async fn modify(&mut self, dn: &str, modifications: &[DirectoryModification]) -> Result<()>;
    async fn password_modify(&mut self, user_id: &str, old: &str, new: &str) -> Result<()>;
    async fn unbind(&mut self) -> Result<()>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub(crate) trait LdapConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn LdapSession>>;
}

/// Directory client with pluggable LDAP backend.
pub struct DirectoryClient {
    config: Arc<DirectoryConfig>,
    connector: Box<dyn LdapConnector>,
}

impl DirectoryClient {
    /// Creates a directory client that uses the real LDAP connector.
    #[must_use]
    pub fn new(config: DirectoryConfig) -> Self {
        let config = Arc::new(config);
        let connector: Box<dyn LdapConnector> = Box::new(RealLdapConnector::new(config.clone()));
        Self { config, connector }
    }

    #[cfg(test)]
    #[must_use]
    pub(crate) fn with_connector(
        config: DirectoryConfig,
        connector: Box<dyn LdapConnector>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            connector,
        }
    }

    /// Returns the configuration the client was built with.
    #[must_use]
    pub fn config(&self) -> &DirectoryConfig {
        &self.config
    }

    /// Builds the credential for `username` using the configured DN template.
    #[must_use]
    pub fn credential(&self, username: impl Into<String>, password: SecretString) -> Credential {
        Credential::new(&self.config, username, password)
    }

    /// Opens a connection and binds as `dn`.
    ///
    /// The returned connection belongs to the caller, who must [`DirectoryConnection::close`] it.
    /// An empty password is refused without contacting the server: servers accept a DN with an
    /// empty password as an unauthenticated bind.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionError`] if the server cannot be reached and
    /// [`Error::AuthenticationError`] if the password is empty or the server rejects the bind.
    pub async fn bind_as(&self, dn: &str, password: &SecretString) -> Result<DirectoryConnection> {
        if password.expose_secret().is_empty() {
            debug!(dn, "refusing bind with empty password");
            return Err(Error::wrong_credentials());
        }

        let mut session = self.connector.connect().await?;
        debug!(dn, "connected to directory, binding");

        match session.simple_bind(dn, password.expose_secret()).await {
            Ok(()) => Ok(DirectoryConnection {
                session,
                config: self.config.clone(),
                closed: false,
            }),
            Err(err) => {
                if let Err(unbind_err) = session.unbind().await {
                    warn!(dn, "failed to close connection after rejected bind: {unbind_err}");
                }
                Err(err)
            }
        }
    }

    /// Binds as the user and returns every entry matching their lookup filter.
    ///
    /// # Errors
    ///
    /// Propagates the errors of [`DirectoryClient::bind_as`] and
    /// [`DirectoryConnection::search`].
    #[instrument(skip_all, fields(username = credential.username(), operation = "lookup"))]
    pub async fn lookup_user(&self, credential: &Credential) -> Result<Vec<DirectoryEntry>> {
        let mut connection = self.bind_as(credential.dn(), credential.password()).await?;
        let result = connection.search(credential.username()).await;
        connection.release().await;
        result
    }

    /// Binds as the user and replaces their password.
    ///
    /// The confirmation is checked before any connection is opened.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ValidationError`] when the confirmation differs, otherwise propagates
    /// the errors of [`DirectoryClient::bind_as`] and [`DirectoryConnection::change_password`].
    #[instrument(skip_all, fields(username = credential.username(), operation = "change_password"))]
    pub async fn change_user_password(
        &self,
        credential: &Credential,
        change: &PasswordChange,
    ) -> Result<()> {
        change.validate()?;

        let mut connection = self.bind_as(credential.dn(), credential.password()).await?;
        let result = connection
            .change_password(credential.dn(), credential.password(), change.new_password())
            .await;
        connection.release().await;
        result
    }

    /// Binds as the user and adds a mail alias to their entry.
    ///
    /// # Errors
    ///
    /// Propagates the errors of [`DirectoryClient::bind_as`] and
    /// [`DirectoryConnection::add_mail_alias`].
    #[instrument(skip_all, fields(username = credential.username(), operation = "add_mail_alias"))]
    pub async fn add_user_mail_alias(&self, credential: &Credential, alias: &str) -> Result<()> {
        let mut connection = self.bind_as(credential.dn(), credential.password()).await?;
        let result = connection.add_mail_alias(credential.dn(), alias).await;
        connection.release().await;
        result
    }
}

/// An authenticated session with the directory server.
///
/// Close it with [`DirectoryConnection::close`]. Dropping it unclosed tears the transport down
/// without a proper unbind.
pub struct DirectoryConnection {
    session: Box<dyn LdapSession>,
    config: Arc<DirectoryConfig>,
    closed: bool,
}

impl DirectoryConnection {
    /// Looks up `username` with the configured filter template under the base DN.
    ///
    /// Entries, attributes and values come back in the order the server sent them. The request
    /// itself carries no size or time limit. The configured operation timeout still bounds how
    /// long the client waits for the answer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DirectoryOperationError`] if the server rejects the search or the
    /// operation timeout elapses, and [`Error::ConnectionError`] if the transport fails.
    pub async fn search(&mut self, username: &str) -> Result<Vec<DirectoryEntry>> {
        let filter = build_filter(self.config.user_filter_template(), username);
        let entries = self
            .session
            .search(self.config.base_dn(), &filter)
            .await?;
        debug!(username, count = entries.len(), "lookup finished");
        Ok(entries)
    }

    /// Issues a password modify request for `dn`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DirectoryOperationError`] if the server rejects the change. Neither
    /// password ever appears in the message.
    pub async fn change_password(
        &mut self,
        dn: &str,
        old_password: &SecretString,
        new_password: &SecretString,
    ) -> Result<()> {
        let old = old_password.expose_secret();
        let new = new_password.expose_secret();
        self.session
            .password_modify(dn, old, new)
            .await
            .map_err(|err| redact(err, &[old, new]))?;
        info!(dn, "password changed");
        Ok(())
    }

    /// Adds `alias` to the mail alias attribute of `dn`.
    ///
    /// Existing values are kept. Duplicates are left for the server to reject.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DirectoryOperationError`] if the server rejects the modification.
    pub async fn add_mail_alias(&mut self, dn: &str, alias: &str) -> Result<()> {
        self.session
            .modify(
                dn,
                &[DirectoryModification::Add {
                    attribute: MAIL_ALIAS_ATTRIBUTE.to_string(),
                    values: vec![alias.to_string()],
                }],
            )
            .await?;
        info!(dn, alias, "mail alias added");
        Ok(())
    }

    /// Unbinds and closes the connection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionError`] if the unbind could not be sent.
    pub async fn close(mut self) -> Result<()> {
        self.closed = true;
        self.session.unbind().await
    }

    async fn release(self) {
        if let Err(err) = self.close().await {
            warn!("failed to close directory connection: {err}");
        }
    }
}

impl Drop for DirectoryConnection {
    fn drop(&mut self) {
        if !self.closed {
            warn!("directory connection dropped without close");
        }
    }
}

/// Real LDAP connector backed by `ldap3`.
struct RealLdapConnector {
    config: Arc<DirectoryConfig>,
}

impl RealLdapConnector {
    fn new(config: Arc<DirectoryConfig>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl LdapConnector for RealLdapConnector {
    async fn connect(&self) -> Result<Box<dyn LdapSession>> {
        let settings = build_ldap_settings(&self.config)?;
        let url = self.config.url()?;
        let (conn, ldap) = LdapConnAsync::with_settings(settings, url.as_str())
            .await
            .map_err(connection_error)?;
        ldap3::drive!(conn);
        Ok(Box::new(RealLdapSession {
            inner: ldap,
            operation_timeout: self.config.operation_timeout(),
        }))
    }
}

struct RealLdapSession {
    inner: ldap3::Ldap,
    operation_timeout: Duration,
}

#[async_trait]
impl LdapSession for RealLdapSession {
    async fn simple_bind(&mut self, dn: &str, password: &str) -> Result<()> {
        let result = timeout(self.operation_timeout, self.inner.simple_bind(dn, password))
            .await
            .map_err(|_| Error::ConnectionError("directory bind timed out".to_string()))?
            .map_err(connection_error)?;
        check_bind_result(dn, &result)
    }

    async fn search(&mut self, base_dn: &str, filter: &str) -> Result<Vec<DirectoryEntry>> {
        let options = SearchOptions::new()
            .deref(DerefAliases::Never)
            .sizelimit(0)
            .timelimit(0);
        let result = timeout(
            self.operation_timeout,
            self.inner.with_search_options(options).search(
                base_dn,
                Scope::Subtree,
                filter,
                ALL_USER_ATTRIBUTES.to_vec(),
            ),
        )
        .await
        .map_err(|_| Error::operation("search", "timed out"))?
        .map_err(|err| operation_error("search", err))?;

        let (entries, _) = result
            .success()
            .map_err(|err| operation_error("search", err))?;
        entries
            .into_iter()
            .filter(|entry| !entry.is_ref() && !entry.is_intermediate())
            .map(DirectoryEntry::from_result_entry)
            .collect()
    }

    async fn modify(&mut self, dn: &str, modifications: &[DirectoryModification]) -> Result<()> {
        let mods = modifications
            .iter()
            .map(|m| match m {
                DirectoryModification::Add { attribute, values } => Mod::Add(
                    attribute.clone(),
                    values.iter().cloned().collect::<HashSet<_>>(),
                ),
            })
            .collect::<Vec<_>>();

        let result = timeout(self.operation_timeout, self.inner.modify(dn, mods))
            .await
            .map_err(|_| Error::operation("modify", "timed out"))?
            .map_err(|err| operation_error("modify", err))?;
        result
            .success()
            .map_err(|err| operation_error("modify", err))?;
        Ok(())
    }

    async fn password_modify(&mut self, user_id: &str, old: &str, new: &str) -> Result<()> {
        let request = PasswordModify {
            user_id: Some(user_id),
            old_pass: Some(old),
            new_pass: Some(new),
        };
        let result = timeout(self.operation_timeout, self.inner.extended(request))
            .await
            .map_err(|_| Error::operation("change_password", "timed out"))?
            .map_err(|err| operation_error("change_password", err))?;
        result
            .success()
            .map_err(|err| operation_error("change_password", err))?;
        Ok(())
    }

    async fn unbind(&mut self) -> Result<()> {
        timeout(self.operation_timeout, self.inner.unbind())
            .await
            .map_err(|_| Error::ConnectionError("directory unbind timed out".to_string()))?
            .map_err(connection_error)?;
        Ok(())
    }
}

fn build_ldap_settings(config: &DirectoryConfig) -> Result<LdapConnSettings> {
    let mut settings = LdapConnSettings::new().set_conn_timeout(config.connection_timeout());

    if !config.use_tls() {
        return Ok(settings);
    }

    if !config.tls_verify() {
        let connector = TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|err| {
                Error::ConfigError(format!("failed to construct TLS connector: {err}"))
            })?;
        settings = settings.set_connector(connector).set_no_tls_verify(true);
    } else if let Some(cert_path) = config.tls_ca_cert() {
        let pem = fs::read(cert_path).map_err(|err| {
            Error::ConfigError(format!(
                "failed to read directory CA certificate {}: {err}",
                cert_path.display()
            ))
        })?;
        let certificate = Certificate::from_pem(&pem).map_err(|err| {
            Error::ConfigError(format!("invalid directory CA certificate: {err}"))
        })?;
        let connector = TlsConnector::builder()
            .add_root_certificate(certificate)
            .build()
            .map_err(|err| {
                Error::ConfigError(format!("failed to load directory CA certificate: {err}"))
            })?;
        settings = settings.set_connector(connector);
    }

    Ok(settings)
}

fn check_bind_result(dn: &str, result: &LdapResult) -> Result<()> {
    if result.rc != 0 {
        debug!(dn, rc = result.rc, reason = %result.text, "bind rejected");
        return Err(Error::wrong_credentials());
    }
    Ok(())
}

fn connection_error(err: LdapError) -> Error {
    Error::ConnectionError(err.to_string())
}

fn operation_error(operation: &str, err: LdapError) -> Error {
    match err {
        LdapError::LdapResult { result } => {
            Error::operation(operation, describe_result(result.rc, &result.text))
        }
        LdapError::Io { .. }
        | LdapError::EndOfStream
        | LdapError::OpSend { .. }
        | LdapError::ResultRecv { .. } => connection_error(err),
        other => Error::operation(operation, other.to_string()),
    }
}

fn describe_result(rc: u32, text: &str) -> String {
    let name = match rc {
        3 => "timeLimitExceeded",
        4 => "sizeLimitExceeded",
        16 => "noSuchAttribute",
        17 => "undefinedAttributeType",
        19 => "constraintViolation",
        20 => "attributeOrValueExists",
        21 => "invalidAttributeSyntax",
        32 => "noSuchObject",
        50 => "insufficientAccessRights",
        53 => "unwillingToPerform",
        65 => "objectClassViolation",
        _ => "",
    };

    match (name.is_empty(), text.trim().is_empty()) {
        (true, true) => format!("rc={rc}"),
        (true, false) => format!("rc={rc}: {}", text.trim()),
        (false, true) => format!("{name} (rc={rc})"),
        (false, false) => format!("{name} (rc={rc}): {}", text.trim()),
    }
}

fn redact(err: Error, secrets: &[&str]) -> Error {
    let scrub = |message: String| {
        secrets
            .iter()
            .filter(|secret| !secret.is_empty())
            .fold(message, |acc, secret| acc.replace(secret, "***"))
    };

    match err {
        Error::DirectoryOperationError { operation, message } => Error::DirectoryOperationError {
            operation,
            message: scrub(message),
        },
        Error::ConnectionError(message) => Error::ConnectionError(scrub(message)),
        other => other,
    }
}
