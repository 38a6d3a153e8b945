// libs/billing-cell/src/router.rs
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};

use crate::handlers;
use crate::services::invoicing::InvoicingService;

pub fn billing_routes(service: Arc<InvoicingService>) -> Router {
    Router::new()
        .route("/", post(handlers::create_invoice))
        .route("/{invoice_id}", get(handlers::get_invoice))
        .route("/{invoice_id}/line-items", post(handlers::add_line_item))
        .route("/{invoice_id}/pay", post(handlers::pay_invoice))
        .with_state(service)
}
