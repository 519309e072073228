use std::sync::Arc;

use anyhow::Result;
use rust_decimal::Decimal;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::api::{HttpTransport, SessionClient, Transport};
use crate::auth::{CredentialStore, Pin, SessionCredentials};
use crate::config::Config;
use crate::invoice::InvoiceRegistry;
use crate::models::{
    ClientOperationsRequest, ClientOperationsResponse, IncomingOperation, OperationEffect,
};
use crate::utils::normalize_amount;

/// Operation listing endpoint
const CLIENT_OPERATIONS: &str = "clientOperations";

/// Only the first page is read; a check runs soon after the invoice is issued.
pub const OPERATIONS_PAGE_SIZE: u32 = 100;

/// Outcome of a payment check that reached a verdict. Failing to reach or
/// authenticate to the upstream is an `Err`, never one of these.
#[derive(Debug, Clone, PartialEq)]
pub enum PaymentCheck {
    /// The operation that paid the invoice.
    Paid(IncomingOperation),
    /// Invoice is pending; nothing matching has arrived yet.
    NotPaid,
    /// No pending invoice for that amount.
    NoInvoice,
}

impl PaymentCheck {
    pub fn is_paid(&self) -> bool {
        matches!(self, PaymentCheck::Paid(_))
    }

    pub fn operation(&self) -> Option<&IncomingOperation> {
        match self {
            PaymentCheck::Paid(operation) => Some(operation),
            _ => None,
        }
    }
}

pub struct PaymentMatcher<T: Transport = HttpTransport> {
    client: SessionClient<T>,
    registry: InvoiceRegistry,
    cancel: Option<watch::Receiver<bool>>,
}

impl PaymentMatcher<HttpTransport> {
    /// Wire up registry, credential store and HTTP client from configuration.
    /// `seed` replaces the stored cookie jar when given.
    pub fn from_config(
        config: &Config,
        seed: Option<SessionCredentials>,
        pin: Pin,
    ) -> Result<Self> {
        let data_dir = config.data_dir()?;
        let registry = InvoiceRegistry::open(&data_dir)?.with_step(config.amount_step)?;
        let store = Arc::new(CredentialStore::new(&data_dir, config.keyring_account.clone()));
        let credentials = store.resolve_cookies(seed)?;
        let client = SessionClient::from_config(config, store, credentials, pin)?;
        Ok(Self::new(client, registry))
    }
}

impl<T: Transport> PaymentMatcher<T> {
    pub fn new(client: SessionClient<T>, registry: InvoiceRegistry) -> Self {
        Self {
            client,
            registry,
            cancel: None,
        }
    }

    /// Abort upstream calls once `cancel` reads `true`.
    pub fn with_cancellation(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn client(&self) -> &SessionClient<T> {
        &self.client
    }

    pub fn registry(&self) -> &InvoiceRegistry {
        &self.registry
    }

    pub fn create_invoice(&self, amount: Decimal, payload: Value) -> Result<Decimal> {
        self.registry.create(amount, payload)
    }

    pub fn delete_invoice(&self, amount: Decimal) -> Result<bool> {
        self.registry.delete(amount)
    }

    /// First page of operations with the given effect, in upstream order.
    /// Items that cannot be read are skipped.
    pub async fn list_incoming(&self, effect: OperationEffect) -> Result<Vec<IncomingOperation>> {
        let request = ClientOperationsRequest::first_page(effect, OPERATIONS_PAGE_SIZE);
        let response = self
            .client
            .call_with(CLIENT_OPERATIONS, &request, self.cancel.clone())
            .await?;
        let page: ClientOperationsResponse = response.json()?;

        let total = page.items.len();
        let operations: Vec<IncomingOperation> = page
            .items
            .into_iter()
            .filter_map(|raw| match IncomingOperation::from_raw(raw) {
                Ok(operation) => Some(operation),
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable operation");
                    None
                }
            })
            .collect();

        debug!(total = total, parsed = operations.len(), ?effect, "Listed operations");
        Ok(operations)
    }

    /// Check whether the invoice at `amount` has been paid. With
    /// `auto_clear`, a matched invoice is removed from the registry.
    pub async fn check_paid(&self, amount: Decimal, auto_clear: bool) -> Result<PaymentCheck> {
        let amount = normalize_amount(amount);
        let Some(invoice) = self.registry.get(amount) else {
            debug!(amount = %amount, "No pending invoice");
            return Ok(PaymentCheck::NoInvoice);
        };

        let operations = self.list_incoming(OperationEffect::Credit).await?;
        let Some(operation) = operations.into_iter().find(|op| invoice.is_paid_by(op)) else {
            debug!(amount = %amount, "No matching payment yet");
            return Ok(PaymentCheck::NotPaid);
        };

        if auto_clear && !self.registry.delete(amount)? {
            // Cleared by a concurrent check between our read and now
            return Ok(PaymentCheck::NoInvoice);
        }

        info!(
            amount = %amount,
            operation = operation.id().unwrap_or("-"),
            paid_at = %operation.timestamp,
            "Invoice paid"
        );
        Ok(PaymentCheck::Paid(operation))
    }
}
