//! # ldapweb-core
//!
//! Core types for self-service directory accounts.
//!
//! This crate holds what every layer shares: the error taxonomy, the directory configuration,
//! the username templating rule, and a session-store abstraction for the embedding web layer.
//!
//! ## Modules
//!
//! - [`error`] - Error kinds and their serializable responses
//! - [`config`] - Directory connection configuration and loading
//! - [`template`] - Username substitution into DN and filter templates
//! - [`session`] - Session storage kept outside the directory client

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod session;
pub mod template;

pub use config::DirectoryConfig;
pub use error::{Error, ErrorResponse, Result};
pub use session::{MemorySessionStore, Session, SessionId, SessionStore};
pub use template::{build_dn, build_filter};
