//! Session-aware client for the upstream finance backend.
//!
//! This module provides the `SessionClient`, which attaches the stored
//! session cookies to every call, keeps the cookie jar in sync with what
//! the upstream sets, and re-authenticates with the account PIN once when
//! the session has expired.
//!
//! The HTTP layer sits behind the `Transport` trait; `HttpTransport` is the
//! reqwest implementation used outside of tests.

pub mod client;
pub mod error;
pub mod transport;

pub use client::{ApiResponse, SessionClient};
pub use error::ApiError;
pub use transport::{HttpTransport, Transport, TransportRequest, TransportResponse};
