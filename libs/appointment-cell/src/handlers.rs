// libs/appointment-cell/src/handlers.rs
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

use crate::models::{
    BookAppointmentRequest, ChangeStatusRequest, RateAppointmentRequest, RatingKind,
    RescheduleAppointmentRequest,
};
use crate::services::booking::AppointmentBookingService;

#[derive(Debug, Deserialize)]
pub struct ActorQuery {
    pub actor_id: Uuid,
}

pub async fn book_appointment(
    State(service): State<Arc<AppointmentBookingService>>,
    Json(request): Json<BookAppointmentRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let appointment = service.book_appointment(request).await?;
    let view = service.appointment_view(appointment.id, appointment.provider_id).await?;

    Ok((StatusCode::CREATED, Json(json!({
        "success": true,
        "appointment": view,
        "overlap_acknowledged": appointment.overlap_acknowledged,
    }))))
}

pub async fn get_appointment(
    State(service): State<Arc<AppointmentBookingService>>,
    Path(appointment_id): Path<Uuid>,
    Query(query): Query<ActorQuery>,
) -> Result<Json<Value>, AppError> {
    let view = service.appointment_view(appointment_id, query.actor_id).await?;
    Ok(Json(json!({ "appointment": view })))
}

pub async fn change_status(
    State(service): State<Arc<AppointmentBookingService>>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<ChangeStatusRequest>,
) -> Result<Json<Value>, AppError> {
    let actor_id = request.acting_party_id;
    service.change_status(appointment_id, request).await?;
    let view = service.appointment_view(appointment_id, actor_id).await?;

    Ok(Json(json!({
        "success": true,
        "appointment": view,
    })))
}

pub async fn reschedule_appointment(
    State(service): State<Arc<AppointmentBookingService>>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<RescheduleAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let actor_id = request.acting_party_id;
    service.reschedule_appointment(appointment_id, request).await?;
    let view = service.appointment_view(appointment_id, actor_id).await?;

    Ok(Json(json!({
        "success": true,
        "appointment": view,
    })))
}

pub async fn rate_service(
    State(service): State<Arc<AppointmentBookingService>>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<RateAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let outcome = service.record_rating(appointment_id, RatingKind::Service, request).await?;
    Ok(Json(json!(outcome)))
}

pub async fn rate_client(
    State(service): State<Arc<AppointmentBookingService>>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<RateAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let outcome = service.record_rating(appointment_id, RatingKind::Client, request).await?;
    Ok(Json(json!(outcome)))
}

pub async fn list_activity(
    State(service): State<Arc<AppointmentBookingService>>,
    Path(appointment_id): Path<Uuid>,
    Query(query): Query<ActorQuery>,
) -> Result<Json<Value>, AppError> {
    let activity = service.list_activity(appointment_id, query.actor_id).await?;
    Ok(Json(json!({ "activity": activity })))
}
