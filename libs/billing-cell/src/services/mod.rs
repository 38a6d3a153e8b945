pub mod calculator;
pub mod invoicing;
pub mod store;
pub mod supabase_store;

pub use calculator::compute_total;
pub use invoicing::InvoicingService;
pub use store::{InvoiceStore, InvoiceStoreError, MemoryInvoiceStore};
pub use supabase_store::SupabaseInvoiceStore;
