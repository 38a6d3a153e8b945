use std::sync::Arc;

use axum::{
    Router,
    routing::get,
};

use appointment_cell::{appointment_routes, AppointmentBookingService};
use billing_cell::{billing_routes, InvoicingService};

pub struct AppServices {
    pub booking: Arc<AppointmentBookingService>,
    pub invoicing: Arc<InvoicingService>,
}

pub fn create_router(services: AppServices) -> Router {
    Router::new()
        .route("/", get(|| async { "Field service scheduling API is running!" }))
        .nest("/appointments", appointment_routes(services.booking))
        .nest("/invoices", billing_routes(services.invoicing))
}
