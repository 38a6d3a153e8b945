// libs/billing-cell/src/services/supabase_store.rs
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Method;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use shared_database::supabase::{DatabaseError, SupabaseClient};

use crate::models::Invoice;
use crate::services::store::{InvoiceStore, InvoiceStoreError};

const INVOICES: &str = "/rest/v1/invoices";

/// PostgREST-backed invoices. `line_items` is a jsonb column and `appointment_id`
/// carries a unique index, so a second invoice for an appointment comes back as 409.
pub struct SupabaseInvoiceStore {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseInvoiceStore {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    async fn fetch_one(&self, filter: &str) -> Result<Option<Invoice>, InvoiceStoreError> {
        let path = format!("{}?{}&limit=1", INVOICES, filter);
        debug!("Fetching invoice: {}", path);

        let rows: Vec<Invoice> = self.supabase
            .request(Method::GET, &path, None, None)
            .await
            .map_err(store_error)?;
        Ok(rows.into_iter().next())
    }
}

fn store_error(err: DatabaseError) -> InvoiceStoreError {
    match err {
        DatabaseError::NotFound(detail) => InvoiceStoreError::NotFound(detail),
        other => InvoiceStoreError::Backend(other.to_string()),
    }
}

fn encode_row(invoice: &Invoice) -> Result<Value, InvoiceStoreError> {
    serde_json::to_value(invoice).map_err(|e| InvoiceStoreError::Backend(format!("Failed to encode invoice: {}", e)))
}

#[async_trait]
impl InvoiceStore for SupabaseInvoiceStore {
    async fn find_invoice_for_appointment(&self, appointment_id: Uuid) -> Result<Option<Invoice>, InvoiceStoreError> {
        self.fetch_one(&format!("appointment_id=eq.{}", appointment_id)).await
    }

    async fn load_invoice(&self, invoice_id: Uuid) -> Result<Invoice, InvoiceStoreError> {
        self.fetch_one(&format!("id=eq.{}", invoice_id))
            .await?
            .ok_or_else(|| InvoiceStoreError::NotFound("Invoice".to_string()))
    }

    async fn insert_invoice(&self, invoice: &Invoice) -> Result<(), InvoiceStoreError> {
        let result: Result<Vec<Value>, DatabaseError> = self.supabase
            .request(Method::POST, INVOICES, None, Some(encode_row(invoice)?))
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(DatabaseError::Constraint(_)) => Err(InvoiceStoreError::Duplicate(invoice.appointment_id)),
            Err(e) => Err(store_error(e)),
        }
    }

    async fn update_invoice(&self, invoice: &Invoice, expected_updated_at: DateTime<Utc>) -> Result<(), InvoiceStoreError> {
        let revision = expected_updated_at.to_rfc3339_opts(SecondsFormat::Micros, true);
        let path = format!("{}?id=eq.{}&updated_at=eq.{}", INVOICES, invoice.id, urlencoding::encode(&revision));

        let rows: Vec<Value> = self.supabase
            .request(Method::PATCH, &path, None, Some(encode_row(invoice)?))
            .await
            .map_err(store_error)?;

        if rows.is_empty() {
            return match self.fetch_one(&format!("id=eq.{}", invoice.id)).await? {
                Some(_) => Err(InvoiceStoreError::StaleWrite(invoice.id)),
                None => Err(InvoiceStoreError::NotFound("Invoice".to_string())),
            };
        }
        Ok(())
    }
}
