use std::sync::Arc;

use anyhow::Context;
use dotenv::dotenv;
use tokio::net::TcpListener;
use tower_http::cors::{CorsLayer, Any};
use tower_http::trace::{self, TraceLayer};
use tracing::{Level, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod router;

use appointment_cell::{AppointmentBookingService, AppointmentStore, MemoryAppointmentStore, SupabaseAppointmentStore};
use billing_cell::{InvoiceStore, InvoicingService, MemoryInvoiceStore, SupabaseInvoiceStore};
use shared_config::{AppConfig, StorageBackend};
use shared_database::SupabaseClient;

use crate::router::AppServices;

fn build_stores(config: &AppConfig) -> (Arc<dyn AppointmentStore>, Arc<dyn InvoiceStore>) {
    match config.storage_backend {
        StorageBackend::Supabase if config.is_supabase_configured() => {
            info!("Using Supabase storage at {}", config.supabase_url);
            let supabase = Arc::new(SupabaseClient::new(config));
            (
                Arc::new(SupabaseAppointmentStore::new(Arc::clone(&supabase))),
                Arc::new(SupabaseInvoiceStore::new(supabase)),
            )
        }
        StorageBackend::Supabase => {
            warn!("Supabase storage selected but SUPABASE_URL or keys are missing; using in-memory storage");
            (Arc::new(MemoryAppointmentStore::new()), Arc::new(MemoryInvoiceStore::new()))
        }
        StorageBackend::Memory => {
            info!("Using in-memory storage");
            (Arc::new(MemoryAppointmentStore::new()), Arc::new(MemoryInvoiceStore::new()))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Loading Env Vars
    dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting field service scheduling API");

    let config = AppConfig::from_env();
    let (appointment_store, invoice_store) = build_stores(&config);

    let services = AppServices {
        booking: Arc::new(AppointmentBookingService::from_config(Arc::clone(&appointment_store), &config)),
        invoicing: Arc::new(InvoicingService::from_config(appointment_store, invoice_store, &config)),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = router::create_router(services)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new()
                    .level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new()
                    .level(Level::INFO)),
        )
        .layer(cors);

    let listener = TcpListener::bind(config.bind_address.as_str())
        .await
        .with_context(|| format!("failed to bind {}", config.bind_address))?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .await
        .context("server terminated unexpectedly")?;

    Ok(())
}
