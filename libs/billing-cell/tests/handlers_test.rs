use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::{Duration, TimeZone, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use appointment_cell::models::{
    ActivityAction, Appointment, AppointmentActivity, AppointmentStatus, Priority, ServiceAddress,
};
use appointment_cell::services::store::{AppointmentStore, MemoryAppointmentStore};
use billing_cell::{billing_routes, InvoicingService, MemoryInvoiceStore};
use shared_utils::test_utils::TestConfig;

struct TestApp {
    router: Router,
    appointment_id: Uuid,
    provider_id: Uuid,
    client_id: Uuid,
}

async fn create_test_app() -> TestApp {
    let appointments = Arc::new(MemoryAppointmentStore::new());
    let provider_id = Uuid::new_v4();
    let client_id = Uuid::new_v4();
    let start = Utc.with_ymd_and_hms(2024, 9, 9, 15, 0, 0).unwrap();

    let appointment = Appointment {
        id: Uuid::new_v4(),
        provider_id,
        client_id,
        start_instant: start,
        end_instant: start + Duration::hours(2),
        timezone: "Australia/Sydney".to_string(),
        address: ServiceAddress::default(),
        summary: "Roof inspection".to_string(),
        notes: None,
        priority: Priority::P3,
        status: AppointmentStatus::Completed,
        rating_of_service: None,
        rating_of_client: None,
        overlap_acknowledged: false,
        created_at: start,
        updated_at: start,
    };
    let booked = AppointmentActivity::new(appointment.id, appointment.provider_id, ActivityAction::Booked, None);
    appointments.insert_appointment(&appointment, &booked).await.unwrap();

    let mut config = TestConfig::default().to_app_config();
    config.default_currency = "AUD".to_string();

    let service = InvoicingService::from_config(appointments, Arc::new(MemoryInvoiceStore::new()), &config);
    TestApp {
        router: billing_routes(Arc::new(service)),
        appointment_id: appointment.id,
        provider_id,
        client_id,
    }
}

async fn send(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    (status, json)
}

#[tokio::test]
async fn test_invoice_routes() {
    let app = create_test_app().await;

    let (status, body) = send(&app.router, "POST", "/", Some(json!({
        "appointment_id": app.appointment_id,
        "acting_party_id": app.provider_id,
        "billing": { "daily_rate": 45000, "days_billed": 1, "processing_fee": 150 },
        "line_items": [
            { "amount_in_minor_units": 3200, "quantity": 3, "item_type": "materials", "description": "Tiles" }
        ]
    }))).await;

    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["invoice"]["currency_code"], "AUD");
    assert_eq!(body["totals"]["total_from_line_items"], 9600);
    assert_eq!(body["totals"]["grand_total"], 54600);
    assert_eq!(body["totals"]["grand_total_with_processing_fee"], 54750);
    let invoice_id = body["invoice"]["id"].as_str().unwrap().to_string();

    let (status, body) = send(&app.router, "POST", &format!("/{}/line-items", invoice_id), Some(json!({
        "acting_party_id": app.provider_id,
        "item": { "amount_in_minor_units": 960, "quantity": 1, "item_type": "tax" }
    }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totals"]["total_from_line_items"], 10560);

    let (status, body) = send(&app.router, "GET", &format!("/{}?actor_id={}", invoice_id, app.client_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["invoice"]["status"], "pending");

    let (status, body) = send(&app.router, "POST", &format!("/{}/pay", invoice_id), Some(json!({
        "acting_party_id": app.provider_id
    }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["invoice"]["status"], "paid");

    let (status, body) = send(&app.router, "POST", &format!("/{}/pay", invoice_id), Some(json!({
        "acting_party_id": app.provider_id
    }))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "Paid invoices cannot be modified");
}

#[tokio::test]
async fn test_fractional_money_is_rejected() {
    let app = create_test_app().await;

    let (status, body) = send(&app.router, "POST", "/", Some(json!({
        "appointment_id": app.appointment_id,
        "acting_party_id": app.provider_id,
        "billing": { "flat_rate": 120.75 }
    }))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("flat_rate"));

    let (status, _) = send(&app.router, "GET", &format!("/{}?actor_id={}", Uuid::new_v4(), app.provider_id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
