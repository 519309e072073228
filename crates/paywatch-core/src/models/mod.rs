//! Data models for invoices and upstream operations.
//!
//! - `Invoice`: a locally registered expected payment, keyed by amount
//! - `IncomingOperation`: a transaction fetched from the upstream
//! - `OperationEffect`: credit/debit filter for operation listing

pub mod invoice;
pub mod operation;

pub use invoice::Invoice;
pub use operation::{
    ClientOperationsRequest, ClientOperationsResponse, IncomingOperation, OperationEffect,
};
