// libs/appointment-cell/src/services/supabase_store.rs
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use shared_database::supabase::{DatabaseError, SupabaseClient};

use crate::models::{
    timestamp_now, Appointment, AppointmentActivity, AppointmentStatus, ClientProfile, RatingKind,
    RatingOutcome,
};
use crate::services::store::{AppointmentStore, StoreError};

const APPOINTMENTS: &str = "/rest/v1/appointments";
const ACTIVITIES: &str = "/rest/v1/appointment_activities";
const CLIENT_PROFILES: &str = "/rest/v1/client_profiles";
const BOOK_APPOINTMENT: &str = "/rest/v1/rpc/book_appointment";
const UPDATE_APPOINTMENT: &str = "/rest/v1/rpc/update_appointment";
const RATE_APPOINTMENT: &str = "/rest/v1/rpc/rate_appointment";

/// PostgREST-backed store. The `appointments` table is expected to carry an
/// exclusion constraint over `(provider_id, tstzrange(start_instant, end_instant))`
/// for scheduled rows that did not acknowledge an overlap, plus a unique index on
/// `(provider_id, start_instant)` for scheduled rows; violations surface as HTTP 409.
///
/// Writes go through database functions that change the appointment row and insert
/// its `appointment_activities` entry in one transaction:
/// - `book_appointment(appointment, activity)` inserts both.
/// - `update_appointment(appointment, expected_updated_at, activity)` replaces the row
///   only while its `updated_at` still matches, and returns the rows it changed.
/// - `rate_appointment(appointment_id, rating_column, rating, updated_at, activity)`
///   sets the column only while it is null, and returns the rows it changed.
pub struct SupabaseAppointmentStore {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseAppointmentStore {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    async fn fetch_appointment(&self, appointment_id: Uuid) -> Result<Option<Appointment>, StoreError> {
        let path = format!("{}?id=eq.{}&limit=1", APPOINTMENTS, appointment_id);
        let rows: Vec<Appointment> = self.supabase
            .request(Method::GET, &path, None, None)
            .await
            .map_err(store_error)?;
        Ok(rows.into_iter().next())
    }
}

fn timestamp(instant: DateTime<Utc>) -> String {
    urlencoding::encode(&instant.to_rfc3339_opts(SecondsFormat::Micros, true)).into_owned()
}

fn store_error(err: DatabaseError) -> StoreError {
    match err {
        DatabaseError::Constraint(detail) => StoreError::Exclusion(detail),
        DatabaseError::NotFound(detail) => StoreError::NotFound(detail),
        other => StoreError::Backend(other.to_string()),
    }
}

fn encode_row<T: serde::Serialize>(row: &T) -> Result<Value, StoreError> {
    serde_json::to_value(row).map_err(|e| StoreError::Backend(format!("Failed to encode row: {}", e)))
}

#[async_trait]
impl AppointmentStore for SupabaseAppointmentStore {
    async fn find_scheduled_appointments(
        &self,
        provider_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude_appointment_id: Option<Uuid>,
    ) -> Result<Vec<Appointment>, StoreError> {
        let mut query_parts = vec![
            format!("provider_id=eq.{}", provider_id),
            format!("status=eq.{}", AppointmentStatus::Scheduled),
            format!("start_instant=lt.{}", timestamp(end)),
            format!("end_instant=gt.{}", timestamp(start)),
        ];

        if let Some(exclude_id) = exclude_appointment_id {
            query_parts.push(format!("id=neq.{}", exclude_id));
        }

        let path = format!("{}?{}&order=start_instant.asc", APPOINTMENTS, query_parts.join("&"));
        debug!("Querying scheduled appointments: {}", path);

        self.supabase
            .request(Method::GET, &path, None, None)
            .await
            .map_err(store_error)
    }

    async fn load_appointment(&self, appointment_id: Uuid) -> Result<Appointment, StoreError> {
        self.fetch_appointment(appointment_id)
            .await?
            .ok_or_else(|| StoreError::NotFound("Appointment".to_string()))
    }

    async fn insert_appointment(
        &self,
        appointment: &Appointment,
        activity: &AppointmentActivity,
    ) -> Result<(), StoreError> {
        let body = json!({
            "appointment": encode_row(appointment)?,
            "activity": encode_row(activity)?,
        });

        let _: Vec<Value> = self.supabase
            .request(Method::POST, BOOK_APPOINTMENT, None, Some(body))
            .await
            .map_err(store_error)?;
        Ok(())
    }

    async fn update_appointment(
        &self,
        appointment: &Appointment,
        expected_updated_at: DateTime<Utc>,
        activity: &AppointmentActivity,
    ) -> Result<(), StoreError> {
        let body = json!({
            "appointment": encode_row(appointment)?,
            "expected_updated_at": expected_updated_at.to_rfc3339_opts(SecondsFormat::Micros, true),
            "activity": encode_row(activity)?,
        });

        let rows: Vec<Value> = self.supabase
            .request(Method::POST, UPDATE_APPOINTMENT, None, Some(body))
            .await
            .map_err(store_error)?;

        if rows.is_empty() {
            // Either the row is gone or someone else wrote it first.
            return match self.fetch_appointment(appointment.id).await? {
                Some(_) => Err(StoreError::StaleWrite(appointment.id)),
                None => Err(StoreError::NotFound("Appointment".to_string())),
            };
        }
        Ok(())
    }

    async fn record_rating(
        &self,
        appointment_id: Uuid,
        kind: RatingKind,
        rating: u8,
        activity: &AppointmentActivity,
    ) -> Result<RatingOutcome, StoreError> {
        let column = kind.column();
        let body = json!({
            "appointment_id": appointment_id,
            "rating_column": column,
            "rating": rating,
            "updated_at": timestamp_now().to_rfc3339_opts(SecondsFormat::Micros, true),
            "activity": encode_row(activity)?,
        });

        let rows: Vec<Value> = self.supabase
            .request(Method::POST, RATE_APPOINTMENT, None, Some(body))
            .await
            .map_err(store_error)?;

        if !rows.is_empty() {
            return Ok(RatingOutcome::Recorded { rating });
        }

        let stored = self.load_appointment(appointment_id).await?;
        stored.rating(kind)
            .map(|existing| RatingOutcome::AlreadyRated { existing })
            .ok_or_else(|| StoreError::Backend(format!(
                "{} update on appointment {} matched no row", column, appointment_id
            )))
    }

    async fn list_activity(&self, appointment_id: Uuid) -> Result<Vec<AppointmentActivity>, StoreError> {
        let path = format!("{}?appointment_id=eq.{}&order=created_at.asc", ACTIVITIES, appointment_id);
        self.supabase
            .request(Method::GET, &path, None, None)
            .await
            .map_err(store_error)
    }

    async fn load_client_profile(&self, client_id: Uuid) -> Result<ClientProfile, StoreError> {
        let path = format!("{}?id=eq.{}&limit=1", CLIENT_PROFILES, client_id);
        let rows: Vec<ClientProfile> = self.supabase
            .request(Method::GET, &path, None, None)
            .await
            .map_err(store_error)?;

        rows.into_iter()
            .next()
            .ok_or_else(|| StoreError::NotFound("Client profile".to_string()))
    }
}
