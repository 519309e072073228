//! Authentication state for the upstream finance backend.
//!
//! This module provides:
//! - `SessionCredentials`: the cookie set that authenticates requests
//! - `CredentialStore`: persists the cookie set to disk and keeps the
//!   re-authentication PIN in the OS keychain
//!
//! The cookie jar is rewritten after every request so a refreshed session
//! survives a restart.

pub mod credentials;
pub mod session;

pub use credentials::{CredentialStore, Pin};
pub use session::SessionCredentials;
