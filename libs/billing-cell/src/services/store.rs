// libs/billing-cell/src/services/store.rs
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::error::BillingError;
use crate::models::Invoice;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum InvoiceStoreError {
    #[error("{0} not found")]
    NotFound(String),

    /// The appointment already has an invoice.
    #[error("Appointment {0} is already invoiced")]
    Duplicate(Uuid),

    /// The invoice changed since it was read.
    #[error("Stale write for invoice {0}")]
    StaleWrite(Uuid),

    #[error("Backend error: {0}")]
    Backend(String),
}

impl From<InvoiceStoreError> for BillingError {
    fn from(err: InvoiceStoreError) -> Self {
        match err {
            InvoiceStoreError::NotFound(entity) => BillingError::NotFound(entity),
            InvoiceStoreError::Duplicate(_) => BillingError::logical(ALREADY_INVOICED_MESSAGE),
            other => BillingError::Storage(other.to_string()),
        }
    }
}

pub const ALREADY_INVOICED_MESSAGE: &str = "An invoice already exists for this appointment";

/// Invoices are keyed by id and unique per appointment. Updates are conditional
/// on `updated_at` so concurrent line-item appends cannot lose each other's work.
#[async_trait]
pub trait InvoiceStore: Send + Sync {
    async fn find_invoice_for_appointment(&self, appointment_id: Uuid) -> Result<Option<Invoice>, InvoiceStoreError>;

    async fn load_invoice(&self, invoice_id: Uuid) -> Result<Invoice, InvoiceStoreError>;

    async fn insert_invoice(&self, invoice: &Invoice) -> Result<(), InvoiceStoreError>;

    async fn update_invoice(&self, invoice: &Invoice, expected_updated_at: DateTime<Utc>) -> Result<(), InvoiceStoreError>;
}

#[derive(Default)]
pub struct MemoryInvoiceStore {
    invoices: RwLock<HashMap<Uuid, Invoice>>,
}

impl MemoryInvoiceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InvoiceStore for MemoryInvoiceStore {
    async fn find_invoice_for_appointment(&self, appointment_id: Uuid) -> Result<Option<Invoice>, InvoiceStoreError> {
        Ok(self.invoices.read().await
            .values()
            .find(|invoice| invoice.appointment_id == appointment_id)
            .cloned())
    }

    async fn load_invoice(&self, invoice_id: Uuid) -> Result<Invoice, InvoiceStoreError> {
        self.invoices.read().await
            .get(&invoice_id)
            .cloned()
            .ok_or_else(|| InvoiceStoreError::NotFound("Invoice".to_string()))
    }

    async fn insert_invoice(&self, invoice: &Invoice) -> Result<(), InvoiceStoreError> {
        let mut invoices = self.invoices.write().await;
        if invoices.values().any(|existing| existing.appointment_id == invoice.appointment_id) {
            return Err(InvoiceStoreError::Duplicate(invoice.appointment_id));
        }
        invoices.insert(invoice.id, invoice.clone());
        debug!("Memory store inserted invoice {}", invoice.id);
        Ok(())
    }

    async fn update_invoice(&self, invoice: &Invoice, expected_updated_at: DateTime<Utc>) -> Result<(), InvoiceStoreError> {
        let mut invoices = self.invoices.write().await;
        let stored = invoices
            .get_mut(&invoice.id)
            .ok_or_else(|| InvoiceStoreError::NotFound("Invoice".to_string()))?;

        if stored.updated_at != expected_updated_at {
            return Err(InvoiceStoreError::StaleWrite(invoice.id));
        }

        *stored = invoice.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{InvoiceStatus, timestamp_now};

    fn invoice(appointment_id: Uuid) -> Invoice {
        let now = timestamp_now();
        Invoice {
            id: Uuid::new_v4(),
            appointment_id,
            flat_rate: 5000,
            hourly_rate: 0,
            minutes_billed: 0,
            daily_rate: 0,
            days_billed: 0,
            processing_fee: 0,
            currency_code: "EUR".to_string(),
            line_items: Vec::new(),
            total_from_line_items: 0,
            status: InvoiceStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_one_invoice_per_appointment() {
        let store = MemoryInvoiceStore::new();
        let appointment_id = Uuid::new_v4();
        let first = invoice(appointment_id);

        store.insert_invoice(&first).await.unwrap();
        assert_eq!(
            store.insert_invoice(&invoice(appointment_id)).await,
            Err(InvoiceStoreError::Duplicate(appointment_id))
        );
        assert_eq!(store.find_invoice_for_appointment(appointment_id).await.unwrap(), Some(first));
        assert_eq!(store.find_invoice_for_appointment(Uuid::new_v4()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_update_is_conditional_on_revision() {
        let store = MemoryInvoiceStore::new();
        let original = invoice(Uuid::new_v4());
        store.insert_invoice(&original).await.unwrap();

        let mut paid = original.clone();
        paid.status = InvoiceStatus::Paid;
        paid.updated_at = original.next_revision();

        store.update_invoice(&paid, original.updated_at).await.unwrap();
        assert_eq!(
            store.update_invoice(&paid, original.updated_at).await,
            Err(InvoiceStoreError::StaleWrite(original.id))
        );
        assert!(store.load_invoice(original.id).await.unwrap().is_paid());
    }
}
