//! paywatch-core - detect incoming payments on a personal finance account.
//!
//! The caller registers an invoice (an expected amount), then polls for it:
//!
//! 1. [`InvoiceRegistry::create`] hands out an amount no other pending
//!    invoice uses, bumping by one minor unit on collision.
//! 2. [`PaymentMatcher::check_paid`] lists recent credits through the
//!    [`SessionClient`] and looks for one with that exact amount, made after
//!    the invoice was created.
//! 3. The [`SessionClient`] keeps the captured browser session alive,
//!    re-authenticating with the account PIN when it expires.
//!
//! State (pending invoices, session cookies) lives as JSON files in the
//! data directory; the PIN lives in the OS keychain.

pub mod api;
pub mod auth;
pub mod config;
pub mod invoice;
pub mod models;
pub mod payment;
pub mod storage;
pub mod utils;

pub use api::{ApiError, ApiResponse, HttpTransport, SessionClient, Transport};
pub use auth::{CredentialStore, Pin, SessionCredentials};
pub use config::Config;
pub use invoice::InvoiceRegistry;
pub use models::{IncomingOperation, Invoice, OperationEffect};
pub use payment::{PaymentCheck, PaymentMatcher};
pub use storage::StorageError;
