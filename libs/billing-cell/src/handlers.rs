// libs/billing-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_models::error::AppError;

use crate::error::BillingError;
use crate::models::{AddLineItemRequest, CreateInvoiceRequest, Invoice, InvoiceTotals, PayInvoiceRequest};
use crate::services::invoicing::InvoicingService;

#[derive(Debug, Deserialize)]
pub struct ActorQuery {
    pub actor_id: Uuid,
}

fn invoice_body(invoice: &Invoice) -> Result<Value, BillingError> {
    Ok(json!({
        "invoice": invoice,
        "totals": InvoiceTotals::of(invoice)?,
    }))
}

pub async fn create_invoice(
    State(service): State<Arc<InvoicingService>>,
    Json(request): Json<CreateInvoiceRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let invoice = service.create_invoice(request).await?;
    Ok((StatusCode::CREATED, Json(invoice_body(&invoice)?)))
}

pub async fn get_invoice(
    State(service): State<Arc<InvoicingService>>,
    Path(invoice_id): Path<Uuid>,
    Query(query): Query<ActorQuery>,
) -> Result<Json<Value>, AppError> {
    let invoice = service.get_invoice(invoice_id, query.actor_id).await?;
    Ok(Json(invoice_body(&invoice)?))
}

pub async fn add_line_item(
    State(service): State<Arc<InvoicingService>>,
    Path(invoice_id): Path<Uuid>,
    Json(request): Json<AddLineItemRequest>,
) -> Result<Json<Value>, AppError> {
    let invoice = service.add_line_item(invoice_id, request).await?;
    Ok(Json(invoice_body(&invoice)?))
}

pub async fn pay_invoice(
    State(service): State<Arc<InvoicingService>>,
    Path(invoice_id): Path<Uuid>,
    Json(request): Json<PayInvoiceRequest>,
) -> Result<Json<Value>, AppError> {
    let invoice = service.mark_invoice_paid(invoice_id, request).await?;
    Ok(Json(invoice_body(&invoice)?))
}
