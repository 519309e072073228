use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Result};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::models::Invoice;
use crate::storage::JsonFile;
use crate::utils::normalize_amount;

/// Registry file name in the data directory
const INVOICES_FILE: &str = "invoices.json";

/// On-disk layout: amount string -> invoice record.
type StoredInvoices = BTreeMap<String, Invoice>;

pub struct InvoiceRegistry {
    file: JsonFile,
    step: Decimal,
    /// Single-writer lock; held across check, insert and persist.
    invoices: Mutex<BTreeMap<Decimal, Invoice>>,
}

impl InvoiceRegistry {
    /// Open the registry in `data_dir`, loading any pending invoices.
    /// A malformed registry file is an error, never silently reset.
    pub fn open(data_dir: &Path) -> Result<Self> {
        let file = JsonFile::new(data_dir.join(INVOICES_FILE));
        let stored: StoredInvoices = file.load()?.unwrap_or_default();

        let mut invoices = BTreeMap::new();
        for (key, mut invoice) in stored {
            invoice.amount = normalize_amount(invoice.amount);
            if key != invoice.amount.to_string() {
                warn!(
                    key = %key,
                    amount = %invoice.amount,
                    "Registry key disagrees with record, using record amount"
                );
            }
            invoices.insert(invoice.amount, invoice);
        }
        debug!(pending = invoices.len(), path = %file.path().display(), "Opened invoice registry");

        Ok(Self {
            file,
            step: Decimal::new(1, 2),
            invoices: Mutex::new(invoices),
        })
    }

    /// Use a different collision step than the default 0.01.
    pub fn with_step(mut self, step: Decimal) -> Result<Self> {
        self.step = Self::validate_step(step)?;
        Ok(self)
    }

    pub fn step(&self) -> Decimal {
        self.step
    }

    /// Register a new invoice and return the amount it was assigned.
    pub fn create(&self, amount: Decimal, payload: Value) -> Result<Decimal> {
        self.create_with_step(amount, payload, self.step)
    }

    /// Like [`create`](Self::create) with a one-off collision step.
    pub fn create_with_step(
        &self,
        amount: Decimal,
        payload: Value,
        step: Decimal,
    ) -> Result<Decimal> {
        let step = Self::validate_step(step)?;
        let requested = normalize_amount(amount);
        if requested <= Decimal::ZERO {
            bail!("Invoice amount must be positive, got {}", amount);
        }

        let mut invoices = self.invoices.lock();
        let mut assigned = requested;
        while invoices.contains_key(&assigned) {
            assigned = normalize_amount(assigned + step);
        }

        invoices.insert(assigned, Invoice::new(assigned, payload));
        if let Err(e) = self.persist(&invoices) {
            invoices.remove(&assigned);
            return Err(e);
        }

        info!(requested = %requested, assigned = %assigned, "Invoice created");
        Ok(assigned)
    }

    pub fn get(&self, amount: Decimal) -> Option<Invoice> {
        self.invoices.lock().get(&normalize_amount(amount)).cloned()
    }

    /// Insert or replace the invoice at `amount`.
    pub fn set(&self, amount: Decimal, mut invoice: Invoice) -> Result<()> {
        let amount = normalize_amount(amount);
        invoice.amount = amount;

        let mut invoices = self.invoices.lock();
        let previous = invoices.insert(amount, invoice);
        if let Err(e) = self.persist(&invoices) {
            match previous {
                Some(previous) => invoices.insert(amount, previous),
                None => invoices.remove(&amount),
            };
            return Err(e);
        }
        Ok(())
    }

    /// Remove the invoice at `amount`. Returns false if there was none.
    pub fn delete(&self, amount: Decimal) -> Result<bool> {
        let amount = normalize_amount(amount);

        let mut invoices = self.invoices.lock();
        let Some(removed) = invoices.remove(&amount) else {
            return Ok(false);
        };
        if let Err(e) = self.persist(&invoices) {
            invoices.insert(amount, removed);
            return Err(e);
        }

        info!(amount = %amount, "Invoice removed");
        Ok(true)
    }

    /// Pending invoices, lowest amount first.
    pub fn list(&self) -> Vec<Invoice> {
        self.invoices.lock().values().cloned().collect()
    }

    pub fn contains(&self, amount: Decimal) -> bool {
        self.invoices.lock().contains_key(&normalize_amount(amount))
    }

    pub fn len(&self) -> usize {
        self.invoices.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.invoices.lock().is_empty()
    }

    fn persist(&self, invoices: &BTreeMap<Decimal, Invoice>) -> Result<()> {
        let stored: StoredInvoices = invoices
            .iter()
            .map(|(amount, invoice)| (amount.to_string(), invoice.clone()))
            .collect();
        self.file.save(&stored)
    }

    fn validate_step(step: Decimal) -> Result<Decimal> {
        let step = normalize_amount(step);
        if step <= Decimal::ZERO {
            bail!("Amount step must be at least one minor unit");
        }
        Ok(step)
    }
}
