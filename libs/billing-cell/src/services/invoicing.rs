// libs/billing-cell/src/services/invoicing.rs
use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use appointment_cell::models::{Appointment, AppointmentStatus};
use appointment_cell::services::store::AppointmentStore;
use shared_config::AppConfig;

use crate::error::BillingError;
use crate::models::{
    timestamp_now, AddLineItemRequest, CreateInvoiceRequest, Invoice, InvoiceStatus, PayInvoiceRequest,
};
use crate::services::calculator::{line_items_total, parse_billing_params, parse_line_item};
use crate::services::store::{InvoiceStore, InvoiceStoreError, ALREADY_INVOICED_MESSAGE};

static CURRENCY_CODE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Z]{3}$").expect("currency code pattern is valid")
});

pub const PAID_INVOICE_MESSAGE: &str = "Paid invoices cannot be modified";
pub const CONCURRENT_INVOICE_UPDATE_MESSAGE: &str =
    "The invoice was changed by someone else while this request was processed; please retry";

/// Creates one invoice per completed appointment and keeps its totals in step
/// with its line items until it is paid.
pub struct InvoicingService {
    appointments: Arc<dyn AppointmentStore>,
    invoices: Arc<dyn InvoiceStore>,
    default_currency: String,
    write_retries: u32,
}

impl InvoicingService {
    pub fn new(
        appointments: Arc<dyn AppointmentStore>,
        invoices: Arc<dyn InvoiceStore>,
        default_currency: impl Into<String>,
    ) -> Self {
        Self {
            appointments,
            invoices,
            default_currency: default_currency.into(),
            write_retries: 3,
        }
    }

    pub fn from_config(
        appointments: Arc<dyn AppointmentStore>,
        invoices: Arc<dyn InvoiceStore>,
        config: &AppConfig,
    ) -> Self {
        Self {
            write_retries: config.status_write_retries.max(1),
            ..Self::new(appointments, invoices, config.default_currency.clone())
        }
    }

    #[instrument(skip(self, request), fields(appointment_id = %request.appointment_id, actor = %request.acting_party_id))]
    pub async fn create_invoice(&self, request: CreateInvoiceRequest) -> Result<Invoice, BillingError> {
        let params = parse_billing_params(&request.billing)?;
        let currency_code = self.currency_code(request.currency_code.as_deref())?;
        let line_items = request.line_items.iter()
            .map(parse_line_item)
            .collect::<Result<Vec<_>, _>>()?;

        let appointment = self.load_appointment(request.appointment_id, request.acting_party_id).await?;
        if appointment.provider_id != request.acting_party_id {
            return Err(BillingError::logical("Only the provider may invoice an appointment"));
        }
        if appointment.status != AppointmentStatus::Completed {
            return Err(BillingError::logical("Invoices can only be created for completed appointments"));
        }
        if self.invoices.find_invoice_for_appointment(appointment.id).await?.is_some() {
            return Err(BillingError::logical(ALREADY_INVOICED_MESSAGE));
        }

        let now = timestamp_now();
        let invoice = Invoice {
            id: Uuid::new_v4(),
            appointment_id: appointment.id,
            flat_rate: params.flat_rate,
            hourly_rate: params.hourly_rate,
            minutes_billed: params.minutes_billed,
            daily_rate: params.daily_rate,
            days_billed: params.days_billed,
            processing_fee: params.processing_fee,
            currency_code,
            total_from_line_items: line_items_total(&line_items)?,
            line_items,
            status: InvoiceStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        // Rejects totals that cannot be represented before anything is stored.
        invoice.grand_total(true)?;

        self.invoices.insert_invoice(&invoice).await?;

        info!("Invoice {} created for appointment {} ({} line items)",
              invoice.id, invoice.appointment_id, invoice.line_items.len());
        Ok(invoice)
    }

    #[instrument(skip(self, request), fields(actor = %request.acting_party_id))]
    pub async fn add_line_item(&self, invoice_id: Uuid, request: AddLineItemRequest) -> Result<Invoice, BillingError> {
        let item = parse_line_item(&request.item)?;

        self.update_pending(invoice_id, request.acting_party_id, |invoice| {
            invoice.line_items.push(item.clone());
            invoice.total_from_line_items = line_items_total(&invoice.line_items)?;
            invoice.grand_total(true)?;
            Ok(())
        }).await
    }

    #[instrument(skip(self, request), fields(actor = %request.acting_party_id))]
    pub async fn mark_invoice_paid(&self, invoice_id: Uuid, request: PayInvoiceRequest) -> Result<Invoice, BillingError> {
        self.update_pending(invoice_id, request.acting_party_id, |invoice| {
            invoice.status = InvoiceStatus::Paid;
            Ok(())
        }).await
    }

    /// Either party to the appointment may read its invoice.
    pub async fn get_invoice(&self, invoice_id: Uuid, actor_id: Uuid) -> Result<Invoice, BillingError> {
        let invoice = self.invoices.load_invoice(invoice_id).await?;
        self.invoice_appointment(&invoice, actor_id).await?;
        Ok(invoice)
    }

    // ==============================================================================
    // PRIVATE HELPER METHODS
    // ==============================================================================

    fn currency_code(&self, requested: Option<&str>) -> Result<String, BillingError> {
        let code = requested.unwrap_or(&self.default_currency);
        if !CURRENCY_CODE_PATTERN.is_match(code) {
            return Err(BillingError::validation(format!(
                "currency_code must be three uppercase letters, got '{}'", code
            )));
        }
        Ok(code.to_string())
    }

    /// Appointments the actor is not a party to are reported as missing.
    async fn load_appointment(&self, appointment_id: Uuid, actor_id: Uuid) -> Result<Appointment, BillingError> {
        let appointment = self.appointments.load_appointment(appointment_id).await?;
        if !appointment.is_party(actor_id) {
            return Err(BillingError::NotFound("Appointment".to_string()));
        }
        Ok(appointment)
    }

    /// The invoice's appointment, provided the actor is one of its parties.
    async fn invoice_appointment(&self, invoice: &Invoice, actor_id: Uuid) -> Result<Appointment, BillingError> {
        match self.load_appointment(invoice.appointment_id, actor_id).await {
            Err(BillingError::NotFound(_)) => Err(BillingError::invoice_not_found()),
            other => other,
        }
    }

    /// Read-modify-write on a pending invoice, retried when another writer got there first.
    async fn update_pending<F>(&self, invoice_id: Uuid, actor_id: Uuid, apply: F) -> Result<Invoice, BillingError>
    where
        F: Fn(&mut Invoice) -> Result<(), BillingError>,
    {
        for attempt in 1..=self.write_retries {
            let current = self.invoices.load_invoice(invoice_id).await?;
            let appointment = self.invoice_appointment(&current, actor_id).await?;
            if appointment.provider_id != actor_id {
                return Err(BillingError::logical("Only the provider may modify an invoice"));
            }
            if current.is_paid() {
                return Err(BillingError::logical(PAID_INVOICE_MESSAGE));
            }

            let mut updated = current.clone();
            apply(&mut updated)?;
            updated.updated_at = current.next_revision();

            match self.invoices.update_invoice(&updated, current.updated_at).await {
                Ok(()) => {
                    info!("Invoice {} updated (status {}, line item total {})",
                          invoice_id, updated.status, updated.total_from_line_items);
                    return Ok(updated);
                }
                Err(InvoiceStoreError::StaleWrite(_)) => {
                    warn!("Write to invoice {} was stale (attempt {})", invoice_id, attempt);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(BillingError::logical(CONCURRENT_INVOICE_UPDATE_MESSAGE))
    }
}
