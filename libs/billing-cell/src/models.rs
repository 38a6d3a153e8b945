// libs/billing-cell/src/models.rs
use std::fmt;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Number;
use uuid::Uuid;

use crate::error::BillingError;
use crate::services::calculator;

// ==============================================================================
// INVOICE MODELS
// ==============================================================================

/// Monetary fields are integers in minor currency units.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Invoice {
    pub id: Uuid,
    pub appointment_id: Uuid,
    pub flat_rate: i64,
    pub hourly_rate: i64,
    pub minutes_billed: i64,
    pub daily_rate: i64,
    pub days_billed: i64,
    pub processing_fee: i64,
    pub currency_code: String,
    pub line_items: Vec<InvoiceLineItem>,
    /// Always the sum of `amount_in_minor_units * quantity` over `line_items`.
    pub total_from_line_items: i64,
    pub status: InvoiceStatus,
    pub created_at: DateTime<Utc>,
    /// Doubles as the revision token for conditional writes.
    pub updated_at: DateTime<Utc>,
}

impl Invoice {
    pub fn params(&self) -> BillingParams {
        BillingParams {
            flat_rate: self.flat_rate,
            hourly_rate: self.hourly_rate,
            minutes_billed: self.minutes_billed,
            daily_rate: self.daily_rate,
            days_billed: self.days_billed,
            processing_fee: self.processing_fee,
        }
    }

    pub fn grand_total(&self, include_processing_fee: bool) -> Result<i64, BillingError> {
        calculator::compute_total(&self.params(), &self.line_items, include_processing_fee)
    }

    pub fn is_paid(&self) -> bool {
        self.status == InvoiceStatus::Paid
    }

    /// Next `updated_at`, kept at database precision and strictly after the current one.
    pub fn next_revision(&self) -> DateTime<Utc> {
        let now = timestamp_now();
        if now > self.updated_at {
            now
        } else {
            self.updated_at + chrono::Duration::microseconds(1)
        }
    }
}

/// Current time truncated to microseconds, the precision Postgres stores.
pub fn timestamp_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Pending,
    Paid,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Pending => "pending",
            InvoiceStatus::Paid => "paid",
        }
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InvoiceLineItem {
    pub id: Uuid,
    /// May be negative for discounts and credits.
    pub amount_in_minor_units: i64,
    pub quantity: i64,
    pub item_type: LineItemType,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LineItemType {
    Materials,
    Tax,
}

/// Validated billing parameters, all in minor units except the two counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BillingParams {
    pub flat_rate: i64,
    pub hourly_rate: i64,
    pub minutes_billed: i64,
    pub daily_rate: i64,
    pub days_billed: i64,
    pub processing_fee: i64,
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

/// Billing parameters as they arrive on the wire. Numbers are kept untyped so a
/// fractional amount can be reported against its field instead of failing to parse.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BillingInput {
    pub flat_rate: Option<Number>,
    pub hourly_rate: Option<Number>,
    pub minutes_billed: Option<Number>,
    pub daily_rate: Option<Number>,
    pub days_billed: Option<Number>,
    pub processing_fee: Option<Number>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItemInput {
    pub amount_in_minor_units: Number,
    pub quantity: Number,
    pub item_type: LineItemType,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateInvoiceRequest {
    pub appointment_id: Uuid,
    pub acting_party_id: Uuid,
    #[serde(default)]
    pub billing: BillingInput,
    #[serde(default)]
    pub line_items: Vec<LineItemInput>,
    /// Falls back to the configured default currency.
    pub currency_code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddLineItemRequest {
    pub acting_party_id: Uuid,
    pub item: LineItemInput,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayInvoiceRequest {
    pub acting_party_id: Uuid,
}

/// Totals reported alongside an invoice.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct InvoiceTotals {
    pub total_from_line_items: i64,
    pub grand_total: i64,
    pub grand_total_with_processing_fee: i64,
}

impl InvoiceTotals {
    pub fn of(invoice: &Invoice) -> Result<Self, BillingError> {
        Ok(Self {
            total_from_line_items: invoice.total_from_line_items,
            grand_total: invoice.grand_total(false)?,
            grand_total_with_processing_fee: invoice.grand_total(true)?,
        })
    }
}
