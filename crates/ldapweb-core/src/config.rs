//! Directory connection configuration.
//!
//! The configuration is loaded once when the embedding process starts and is shared read-only by
//! every request afterwards. Any error returned here is meant to abort startup.

use crate::template::validate_template;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;
use validator::{Validate, ValidationError};

/// Default connection timeout (seconds).
pub const DEFAULT_CONNECTION_TIMEOUT_SECS: u64 = 10;
/// Default operation timeout (seconds).
pub const DEFAULT_OPERATION_TIMEOUT_SECS: u64 = 10;

/// Environment variable prefix used by [`DirectoryConfig::from_env`].
pub const ENV_PREFIX: &str = "LDAPWEB_";

/// Configuration for reaching the directory server.
///
/// Every way of obtaining one (constructor, environment, deserialization) validates it, so a
/// config with a malformed template never exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(try_from = "RawDirectoryConfig")]
pub struct DirectoryConfig {
    /// Directory server host name or address
    #[validate(length(min = 1))]
    host: String,

    /// Directory server TCP port
    #[validate(range(min = 1))]
    port: u16,

    /// Search base for user lookups
    #[validate(length(min = 1))]
    base_dn: String,

    /// Bind DN template, `%s` is replaced by the username
    #[validate(custom(function = "template_field"))]
    dn_template: String,

    /// Lookup filter template, `%s` is replaced by the username
    #[validate(custom(function = "template_field"))]
    user_filter_template: String,

    /// Connect with `ldaps://` instead of `ldap://`
    use_tls: bool,

    /// Whether to verify the server certificate
    tls_verify: bool,

    /// Optional path to a PEM CA certificate
    #[serde(skip_serializing_if = "Option::is_none")]
    tls_ca_cert: Option<PathBuf>,

    /// Connection timeout in seconds
    #[validate(range(min = 1, max = 300))]
    connection_timeout_secs: u64,

    /// Per-operation timeout in seconds
    #[validate(range(min = 1, max = 300))]
    operation_timeout_secs: u64,
}

// Wire form of `DirectoryConfig`, checked before it becomes one.
#[derive(Deserialize)]
struct RawDirectoryConfig {
    host: String,
    port: u16,
    base_dn: String,
    dn_template: String,
    user_filter_template: String,
    #[serde(default)]
    use_tls: bool,
    #[serde(default = "default_tls_verify")]
    tls_verify: bool,
    #[serde(default)]
    tls_ca_cert: Option<PathBuf>,
    #[serde(default = "default_connection_timeout_secs")]
    connection_timeout_secs: u64,
    #[serde(default = "default_operation_timeout_secs")]
    operation_timeout_secs: u64,
}

impl TryFrom<RawDirectoryConfig> for DirectoryConfig {
    type Error = Error;

    fn try_from(raw: RawDirectoryConfig) -> Result<Self> {
        Self {
            host: raw.host,
            port: raw.port,
            base_dn: raw.base_dn,
            dn_template: raw.dn_template,
            user_filter_template: raw.user_filter_template,
            use_tls: raw.use_tls,
            tls_verify: raw.tls_verify,
            tls_ca_cert: raw.tls_ca_cert,
            connection_timeout_secs: raw.connection_timeout_secs,
            operation_timeout_secs: raw.operation_timeout_secs,
        }
        .checked()
    }
}

const fn default_tls_verify() -> bool {
    true
}

const fn default_connection_timeout_secs() -> u64 {
    DEFAULT_CONNECTION_TIMEOUT_SECS
}

const fn default_operation_timeout_secs() -> u64 {
    DEFAULT_OPERATION_TIMEOUT_SECS
}

fn template_field(template: &str) -> std::result::Result<(), ValidationError> {
    validate_template(template).map_err(|message| {
        let mut err = ValidationError::new("template_placeholder");
        err.message = Some(message.into());
        err
    })
}

impl DirectoryConfig {
    /// Creates a new directory configuration from the required settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if a value is empty, the port is zero, or a template does
    /// not carry exactly one `%s` placeholder.
    pub fn new(
        host: impl Into<String>,
        port: u16,
        base_dn: impl Into<String>,
        dn_template: impl Into<String>,
        user_filter_template: impl Into<String>,
    ) -> Result<Self> {
        let config = Self {
            host: host.into(),
            port,
            base_dn: base_dn.into(),
            dn_template: dn_template.into(),
            user_filter_template: user_filter_template.into(),
            use_tls: false,
            tls_verify: default_tls_verify(),
            tls_ca_cert: None,
            connection_timeout_secs: DEFAULT_CONNECTION_TIMEOUT_SECS,
            operation_timeout_secs: DEFAULT_OPERATION_TIMEOUT_SECS,
        };
        config.checked()
    }

    /// Loads the configuration from `LDAPWEB_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if a required variable is missing or a value cannot be
    /// parsed.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads the configuration through an arbitrary key lookup.
    ///
    /// Keys are the full variable names, e.g. `LDAPWEB_HOST`.
    ///
    /// # Errors
    ///
    /// See [`DirectoryConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));
        let required = |name: &str| {
            get(name).ok_or_else(|| {
                Error::ConfigError(format!("missing required setting {ENV_PREFIX}{name}"))
            })
        };

        let port = required("PORT")?;
        let port = port.trim().parse::<u16>().map_err(|_| {
            Error::ConfigError(format!("bad directory port configured: `{port}`"))
        })?;

        let mut config = Self::new(
            required("HOST")?,
            port,
            required("BASEDN")?,
            required("DN_TEMPLATE")?,
            required("USERFILTER_TEMPLATE")?,
        )?;

        if let Some(value) = get("USE_TLS") {
            config.use_tls = parse_flag("USE_TLS", &value)?;
        }
        if let Some(value) = get("TLS_VERIFY") {
            config.tls_verify = parse_flag("TLS_VERIFY", &value)?;
        }
        if let Some(value) = get("TLS_CA_CERT") {
            config.tls_ca_cert = Some(PathBuf::from(value));
        }
        if let Some(value) = get("CONNECTION_TIMEOUT_SECS") {
            config.connection_timeout_secs = parse_secs("CONNECTION_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = get("OPERATION_TIMEOUT_SECS") {
            config.operation_timeout_secs = parse_secs("OPERATION_TIMEOUT_SECS", &value)?;
        }

        config.checked()
    }

    /// Validates the configuration, e.g. after builder overrides.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] describing every invalid field.
    pub fn checked(self) -> Result<Self> {
        self.validate()?;
        self.url()?;
        Ok(self)
    }

    /// Returns the directory host.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the directory port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Returns the search base for user lookups.
    #[must_use]
    pub fn base_dn(&self) -> &str {
        &self.base_dn
    }

    /// Returns the bind DN template.
    #[must_use]
    pub fn dn_template(&self) -> &str {
        &self.dn_template
    }

    /// Returns the filter template used for user lookups.
    #[must_use]
    pub fn user_filter_template(&self) -> &str {
        &self.user_filter_template
    }

    /// Returns whether connections use `ldaps://`.
    #[must_use]
    pub const fn use_tls(&self) -> bool {
        self.use_tls
    }

    /// Returns whether TLS certificate verification is enabled.
    #[must_use]
    pub const fn tls_verify(&self) -> bool {
        self.tls_verify
    }

    /// Optional custom CA certificate path.
    #[must_use]
    pub fn tls_ca_cert(&self) -> Option<&PathBuf> {
        self.tls_ca_cert.as_ref()
    }

    /// Returns the connection timeout duration.
    #[must_use]
    pub const fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }

    /// Returns the operation timeout duration.
    #[must_use]
    pub const fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }

    /// Builds the directory URL from host, port and scheme.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if the host cannot form a valid URL.
    pub fn url(&self) -> Result<Url> {
        let scheme = if self.use_tls { "ldaps" } else { "ldap" };
        let host = if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        Ok(Url::parse(&format!("{scheme}://{host}:{}", self.port))?)
    }

    /// Switches to `ldaps://`.
    #[must_use]
    pub const fn with_tls(mut self, use_tls: bool) -> Self {
        self.use_tls = use_tls;
        self
    }

    /// Enables or disables TLS certificate verification.
    #[must_use]
    pub const fn with_tls_verification(mut self, verify: bool) -> Self {
        self.tls_verify = verify;
        self
    }

    /// Sets the custom CA certificate path for TLS verification.
    #[must_use]
    pub fn with_tls_ca_cert(mut self, path: PathBuf) -> Self {
        self.tls_ca_cert = Some(path);
        self
    }

    /// Overrides the connection timeout in seconds.
    #[must_use]
    pub const fn with_connection_timeout_secs(mut self, seconds: u64) -> Self {
        self.connection_timeout_secs = seconds;
        self
    }

    /// Overrides the operation timeout in seconds.
    #[must_use]
    pub const fn with_operation_timeout_secs(mut self, seconds: u64) -> Self {
        self.operation_timeout_secs = seconds;
        self
    }
}

fn parse_flag(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(Error::ConfigError(format!(
            "{ENV_PREFIX}{name} must be a boolean, got `{other}`"
        ))),
    }
}

fn parse_secs(name: &str, value: &str) -> Result<u64> {
    value.trim().parse::<u64>().map_err(|_| {
        Error::ConfigError(format!(
            "{ENV_PREFIX}{name} must be a number of seconds, got `{value}`"
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn sample_env() -> HashMap<String, String> {
        [
            ("LDAPWEB_HOST", "dir.example.com"),
            ("LDAPWEB_PORT", "389"),
            ("LDAPWEB_BASEDN", "dc=example,dc=com"),
            ("LDAPWEB_DN_TEMPLATE", "uid=%s,ou=people,dc=example,dc=com"),
            ("LDAPWEB_USERFILTER_TEMPLATE", "(uid=%s)"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    #[test]
    fn loads_required_settings() {
        let env = sample_env();
        let config = DirectoryConfig::from_lookup(|key| env.get(key).cloned()).unwrap();

        assert_eq!(config.host(), "dir.example.com");
        assert_eq!(config.port(), 389);
        assert_eq!(config.base_dn(), "dc=example,dc=com");
        assert_eq!(config.user_filter_template(), "(uid=%s)");
        assert!(!config.use_tls());
        assert!(config.tls_verify());
        assert_eq!(config.url().unwrap().as_str(), "ldap://dir.example.com:389");
    }

    #[test]
    fn unparseable_port_is_fatal() {
        let mut env = sample_env();
        env.insert("LDAPWEB_PORT".to_string(), "ldap".to_string());
        let err = DirectoryConfig::from_lookup(|key| env.get(key).cloned()).unwrap_err();
        assert!(matches!(err, Error::ConfigError(msg) if msg.contains("bad directory port")));
    }

    #[test]
    fn missing_setting_is_fatal() {
        let mut env = sample_env();
        env.remove("LDAPWEB_BASEDN");
        let err = DirectoryConfig::from_lookup(|key| env.get(key).cloned()).unwrap_err();
        assert_eq!(
            err,
            Error::ConfigError("missing required setting LDAPWEB_BASEDN".to_string())
        );
    }

    #[test]
    fn optional_overrides() {
        let mut env = sample_env();
        env.insert("LDAPWEB_USE_TLS".to_string(), "true".to_string());
        env.insert("LDAPWEB_PORT".to_string(), "636".to_string());
        env.insert("LDAPWEB_TLS_VERIFY".to_string(), "no".to_string());
        env.insert("LDAPWEB_OPERATION_TIMEOUT_SECS".to_string(), "30".to_string());
        let config = DirectoryConfig::from_lookup(|key| env.get(key).cloned()).unwrap();

        assert!(config.use_tls());
        assert!(!config.tls_verify());
        assert_eq!(config.operation_timeout(), Duration::from_secs(30));
        assert_eq!(config.url().unwrap().as_str(), "ldaps://dir.example.com:636");
    }

    #[test]
    fn rejects_template_without_placeholder() {
        let err = DirectoryConfig::new(
            "dir.example.com",
            389,
            "dc=example,dc=com",
            "uid=admin,dc=example,dc=com",
            "(uid=%s)",
        )
        .unwrap_err();
        assert!(matches!(err, Error::ConfigError(msg) if msg.contains("dn_template")));
    }

    #[test]
    fn deserialized_config_applies_defaults() {
        let json = r#"{
            "host": "::1",
            "port": 389,
            "base_dn": "dc=example,dc=com",
            "dn_template": "uid=%s,ou=people,dc=example,dc=com",
            "user_filter_template": "(uid=%s)"
        }"#;
        let config: DirectoryConfig = serde_json::from_str(json).unwrap();

        assert_eq!(
            config.connection_timeout(),
            Duration::from_secs(DEFAULT_CONNECTION_TIMEOUT_SECS)
        );
        assert_eq!(config.url().unwrap().as_str(), "ldap://[::1]:389");
    }

    #[test]
    fn deserializing_a_bad_template_fails() {
        let json = r#"{
            "host": "dir.example.com",
            "port": 389,
            "base_dn": "dc=example,dc=com",
            "dn_template": "uid=%s,ou=%s,dc=example,dc=com",
            "user_filter_template": "(uid=%s)"
        }"#;
        let err = serde_json::from_str::<DirectoryConfig>(json).unwrap_err();
        assert!(err.to_string().contains("dn_template"), "{err}");
    }

    #[test]
    fn serialized_config_reads_back() {
        let config = DirectoryConfig::new(
            "dir.example.com",
            636,
            "dc=example,dc=com",
            "uid=%s,ou=people,dc=example,dc=com",
            "(uid=%s)",
        )
        .unwrap()
        .with_tls(true);
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(serde_json::from_str::<DirectoryConfig>(&json).unwrap(), config);
    }
}
