//! Domain model for a pending invoice.

use chrono::{DateTime, SubsecRound, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::IncomingOperation;
use crate::utils::{normalize_amount, now_seconds};

/// An expected payment. The amount is the key: no two live invoices share one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub amount: Decimal,
    #[serde(with = "crate::utils::format::timestamp")]
    pub created_at: DateTime<Utc>,
    /// Caller metadata (order id, chat id, ...), stored as-is.
    #[serde(default)]
    pub payload: Value,
}

impl Invoice {
    pub fn new(amount: Decimal, payload: Value) -> Self {
        Self::with_created_at(amount, payload, now_seconds())
    }

    pub fn with_created_at(amount: Decimal, payload: Value, created_at: DateTime<Utc>) -> Self {
        Self {
            amount: normalize_amount(amount),
            created_at,
            payload,
        }
    }

    /// An operation pays this invoice when the amounts are equal and the
    /// operation happened strictly after the invoice was issued.
    ///
    /// `created_at` only has whole-second precision, so the operation time is
    /// compared at that precision too: anything within the creation second may
    /// predate the invoice and never counts.
    pub fn is_paid_by(&self, operation: &IncomingOperation) -> bool {
        operation.amount == self.amount && operation.timestamp.trunc_subsecs(0) > self.created_at
    }
}
