//! Persistent registry of pending invoices.
//!
//! An invoice is identified by its amount alone, so the registry hands out
//! amounts: asking for `100.00` when that amount is already pending yields
//! `100.01`, then `100.02`, and so on. The registry is rewritten to
//! `invoices.json` on every change.

pub mod registry;

pub use registry::InvoiceRegistry;
