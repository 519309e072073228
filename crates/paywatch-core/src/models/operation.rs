//! Upstream operation listing types.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::utils::{amount_from_minor_units, parse_upstream_time};

/// Which side of the ledger to list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationEffect {
    #[default]
    #[serde(rename = "EFFECT_CREDIT")]
    Credit,
    #[serde(rename = "EFFECT_DEBIT")]
    Debit,
}

/// A transaction fetched from the upstream. Lives only for one check.
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingOperation {
    /// Currency units (minor units already divided by 100).
    pub amount: Decimal,
    pub timestamp: DateTime<Utc>,
    /// The item exactly as the upstream returned it.
    pub raw: Value,
}

impl IncomingOperation {
    pub fn from_raw(raw: Value) -> Result<Self> {
        let minor = match raw.get("accountAmount") {
            Some(Value::Number(n)) => n.as_i64(),
            Some(Value::String(s)) => s.parse::<i64>().ok(),
            _ => None,
        }
        .context("Operation has no integral accountAmount")?;

        let time = raw
            .get("time")
            .and_then(Value::as_str)
            .context("Operation has no time")?;
        let timestamp = parse_upstream_time(time)
            .with_context(|| format!("Unrecognized operation time '{}'", time))?;

        Ok(Self {
            amount: amount_from_minor_units(minor),
            timestamp,
            raw,
        })
    }

    /// Upstream operation id, when present.
    pub fn id(&self) -> Option<&str> {
        self.raw.get("id").and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursors {
    pub next: Option<String>,
    pub prev: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OperationFilter {
    pub categories: Vec<String>,
    pub effect: OperationEffect,
}

/// Body of a `clientOperations` call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientOperationsRequest {
    pub filter: OperationFilter,
    pub cursors: Cursors,
    pub per_page: u32,
}

impl ClientOperationsRequest {
    /// First page, no category filter.
    pub fn first_page(effect: OperationEffect, per_page: u32) -> Self {
        Self {
            filter: OperationFilter {
                categories: Vec::new(),
                effect,
            },
            cursors: Cursors::default(),
            per_page,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientOperationsResponse {
    #[serde(default)]
    pub items: Vec<Value>,
    #[serde(default)]
    pub cursors: Option<Cursors>,
}
