use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;

pub struct TestConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_service_role_key: String,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
            supabase_service_role_key: "test-service-role-key".to_string(),
        }
    }
}

impl TestConfig {
    /// Points the Supabase backend at a mock server.
    pub fn with_url(url: &str) -> Self {
        Self {
            supabase_url: url.to_string(),
            ..Self::default()
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_anon_key: self.supabase_anon_key.clone(),
            supabase_service_role_key: self.supabase_service_role_key.clone(),
            ..AppConfig::default()
        }
    }
}

/// PostgREST row shapes as the Supabase stores read and write them.
pub struct MockSupabaseResponses;

impl MockSupabaseResponses {
    pub fn address() -> Value {
        json!({
            "line1": "12 Harbour Road",
            "line2": null,
            "city": "Portland",
            "region": "ME",
            "postal_code": "04101",
            "country": "US"
        })
    }

    pub fn client_profile_row(client_id: Uuid, timezone: &str) -> Value {
        json!({
            "id": client_id,
            "timezone": timezone,
            "address": Self::address()
        })
    }

    pub fn appointment_row(
        appointment_id: Uuid,
        provider_id: Uuid,
        client_id: Uuid,
        start_instant: &str,
        end_instant: &str,
        status: &str,
    ) -> Value {
        json!({
            "id": appointment_id,
            "provider_id": provider_id,
            "client_id": client_id,
            "start_instant": start_instant,
            "end_instant": end_instant,
            "timezone": "America/New_York",
            "address": Self::address(),
            "summary": "Furnace inspection",
            "notes": "Side door code 4410",
            "priority": "P2",
            "status": status,
            "rating_of_service": null,
            "rating_of_client": null,
            "overlap_acknowledged": false,
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        })
    }

    pub fn invoice_row(invoice_id: Uuid, appointment_id: Uuid, status: &str) -> Value {
        json!({
            "id": invoice_id,
            "appointment_id": appointment_id,
            "flat_rate": 10000,
            "hourly_rate": 5000,
            "minutes_billed": 90,
            "daily_rate": 0,
            "days_billed": 0,
            "processing_fee": 300,
            "currency_code": "USD",
            "line_items": [
                { "id": Uuid::new_v4(), "amount_in_minor_units": 1250, "quantity": 2, "item_type": "materials", "description": "Filter" }
            ],
            "total_from_line_items": 2500,
            "status": status,
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        })
    }

    pub fn error_response(message: &str, code: &str) -> Value {
        json!({
            "message": message,
            "code": code
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_creation() {
        let config = TestConfig::with_url("http://127.0.0.1:9999").to_app_config();

        assert_eq!(config.supabase_url, "http://127.0.0.1:9999");
        assert_eq!(config.supabase_anon_key, "test-anon-key");
        assert!(config.is_supabase_configured());
    }

    #[test]
    fn test_rows_carry_ids() {
        let id = Uuid::new_v4();
        let row = MockSupabaseResponses::client_profile_row(id, "Europe/Berlin");
        assert_eq!(row["id"], json!(id));
        assert_eq!(row["timezone"], "Europe/Berlin");
    }
}
