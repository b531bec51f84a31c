//! Directory access for self-service accounts.
//!
//! A user's own credentials are forwarded to the directory server for every operation: the
//! client opens a connection, binds as the user, runs one search, modify or password change, and
//! closes the connection again. There is no service account and no connection reuse.

#![deny(missing_docs)]

mod client;
mod credential;
mod entry;

pub use client::{
    DirectoryClient, DirectoryConnection, DirectoryModification, MAIL_ALIAS_ATTRIBUTE,
};
pub use credential::{Credential, PasswordChange};
pub use entry::{DirectoryAttribute, DirectoryEntry};
pub use ldapweb_core::{build_dn, build_filter, DirectoryConfig, Error};

/// Convenient result alias that reuses the core error type.
pub type Result<T> = ldapweb_core::Result<T>;
