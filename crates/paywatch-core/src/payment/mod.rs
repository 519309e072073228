//! Payment detection: match pending invoices against incoming operations.
//!
//! A check lists the latest page of credits and looks for the first
//! operation whose amount equals the invoice amount and whose time is
//! strictly after the invoice was created. A matched invoice is cleared so
//! the same payment can never be redeemed twice.

pub mod matcher;

pub use matcher::{PaymentCheck, PaymentMatcher, OPERATIONS_PAGE_SIZE};
