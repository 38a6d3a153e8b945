// libs/appointment-cell/src/services/store.rs
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::error::AppointmentError;
use crate::models::{
    Appointment, AppointmentActivity, AppointmentStatus, ClientProfile, RatingKind, RatingOutcome,
};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),

    /// The write would break the per-provider exclusion rule on scheduled intervals.
    #[error("Exclusion constraint violated: {0}")]
    Exclusion(String),

    /// A conditional write found the row at a different revision than expected.
    #[error("Stale write for appointment {0}")]
    StaleWrite(Uuid),

    #[error("Backend error: {0}")]
    Backend(String),
}

impl From<StoreError> for AppointmentError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(entity) => AppointmentError::NotFound(entity),
            StoreError::Backend(msg) => AppointmentError::Storage(msg),
            // Workflows translate these where they have enough context; this is the fallback.
            StoreError::Exclusion(_) => AppointmentError::Conflict { count: 1 },
            StoreError::StaleWrite(id) => AppointmentError::Storage(format!("Concurrent update of appointment {}", id)),
        }
    }
}

/// Persistence collaborator for the scheduling core. Implementations must make
/// `insert_appointment`/`update_appointment` reject writes that leave two scheduled
/// appointments of one provider sharing a start instant, or overlapping unless the
/// written appointment acknowledged the overlap.
///
/// Every write that changes an appointment takes the activity entry describing it;
/// the row and its entry are committed together or not at all.
#[async_trait]
pub trait AppointmentStore: Send + Sync {
    /// Scheduled appointments of `provider_id` whose interval overlaps `[start, end)`,
    /// ordered by start instant.
    async fn find_scheduled_appointments(
        &self,
        provider_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude_appointment_id: Option<Uuid>,
    ) -> Result<Vec<Appointment>, StoreError>;

    async fn load_appointment(&self, appointment_id: Uuid) -> Result<Appointment, StoreError>;

    async fn insert_appointment(
        &self,
        appointment: &Appointment,
        activity: &AppointmentActivity,
    ) -> Result<(), StoreError>;

    /// Compare-and-swap on `updated_at`: fails with `StaleWrite` unless the stored
    /// row is still at `expected_updated_at`.
    async fn update_appointment(
        &self,
        appointment: &Appointment,
        expected_updated_at: DateTime<Utc>,
        activity: &AppointmentActivity,
    ) -> Result<(), StoreError>;

    /// Sets the rating only if it is still unset. The activity entry is written
    /// only when the rating is recorded.
    async fn record_rating(
        &self,
        appointment_id: Uuid,
        kind: RatingKind,
        rating: u8,
        activity: &AppointmentActivity,
    ) -> Result<RatingOutcome, StoreError>;

    async fn list_activity(&self, appointment_id: Uuid) -> Result<Vec<AppointmentActivity>, StoreError>;

    async fn load_client_profile(&self, client_id: Uuid) -> Result<ClientProfile, StoreError>;
}

pub fn intervals_overlap(
    start_a: DateTime<Utc>,
    end_a: DateTime<Utc>,
    start_b: DateTime<Utc>,
    end_b: DateTime<Utc>,
) -> bool {
    start_a < end_b && start_b < end_a
}

// ==============================================================================
// IN-MEMORY STORE
// ==============================================================================

#[derive(Default)]
struct Tables {
    appointments: HashMap<Uuid, Appointment>,
    activity: Vec<AppointmentActivity>,
}

/// Appointments and their activity share one lock so a write and its audit entry
/// land together.
#[derive(Default)]
pub struct MemoryAppointmentStore {
    tables: RwLock<Tables>,
    clients: RwLock<HashMap<Uuid, ClientProfile>>,
}

impl MemoryAppointmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_client_profile(&self, profile: ClientProfile) {
        self.clients.write().await.insert(profile.id, profile);
    }

    pub async fn all_appointments(&self) -> Vec<Appointment> {
        let mut all: Vec<Appointment> = self.tables.read().await.appointments.values().cloned().collect();
        all.sort_by_key(|appointment| appointment.start_instant);
        all
    }

    fn check_exclusion(
        appointments: &HashMap<Uuid, Appointment>,
        candidate: &Appointment,
    ) -> Result<(), StoreError> {
        if candidate.status != AppointmentStatus::Scheduled {
            return Ok(());
        }

        let clash = appointments.values()
            .filter(|other| other.id != candidate.id)
            .filter(|other| other.provider_id == candidate.provider_id)
            .filter(|other| other.status == AppointmentStatus::Scheduled)
            .find(|other| {
                other.start_instant == candidate.start_instant
                    || (!candidate.overlap_acknowledged && intervals_overlap(
                        other.start_instant,
                        other.end_instant,
                        candidate.start_instant,
                        candidate.end_instant,
                    ))
            });

        match clash {
            Some(other) => Err(StoreError::Exclusion(format!(
                "appointment {} clashes with {}", candidate.id, other.id
            ))),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl AppointmentStore for MemoryAppointmentStore {
    async fn find_scheduled_appointments(
        &self,
        provider_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude_appointment_id: Option<Uuid>,
    ) -> Result<Vec<Appointment>, StoreError> {
        let tables = self.tables.read().await;

        let mut found: Vec<Appointment> = tables.appointments.values()
            .filter(|apt| apt.provider_id == provider_id)
            .filter(|apt| apt.status == AppointmentStatus::Scheduled)
            .filter(|apt| Some(apt.id) != exclude_appointment_id)
            .filter(|apt| intervals_overlap(apt.start_instant, apt.end_instant, start, end))
            .cloned()
            .collect();

        found.sort_by_key(|apt| apt.start_instant);
        debug!("Memory store found {} scheduled appointments for provider {}", found.len(), provider_id);
        Ok(found)
    }

    async fn load_appointment(&self, appointment_id: Uuid) -> Result<Appointment, StoreError> {
        self.tables.read().await
            .appointments
            .get(&appointment_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound("Appointment".to_string()))
    }

    async fn insert_appointment(
        &self,
        appointment: &Appointment,
        activity: &AppointmentActivity,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;

        if tables.appointments.contains_key(&appointment.id) {
            return Err(StoreError::Backend(format!("duplicate appointment id {}", appointment.id)));
        }
        Self::check_exclusion(&tables.appointments, appointment)?;

        tables.appointments.insert(appointment.id, appointment.clone());
        tables.activity.push(activity.clone());
        Ok(())
    }

    async fn update_appointment(
        &self,
        appointment: &Appointment,
        expected_updated_at: DateTime<Utc>,
        activity: &AppointmentActivity,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;

        let stored_revision = tables.appointments.get(&appointment.id)
            .map(|stored| stored.updated_at)
            .ok_or_else(|| StoreError::NotFound("Appointment".to_string()))?;

        if stored_revision != expected_updated_at {
            return Err(StoreError::StaleWrite(appointment.id));
        }
        Self::check_exclusion(&tables.appointments, appointment)?;

        tables.appointments.insert(appointment.id, appointment.clone());
        tables.activity.push(activity.clone());
        Ok(())
    }

    async fn record_rating(
        &self,
        appointment_id: Uuid,
        kind: RatingKind,
        rating: u8,
        activity: &AppointmentActivity,
    ) -> Result<RatingOutcome, StoreError> {
        let mut tables = self.tables.write().await;

        let appointment = tables.appointments.get_mut(&appointment_id)
            .ok_or_else(|| StoreError::NotFound("Appointment".to_string()))?;

        if let Some(existing) = appointment.rating(kind) {
            return Ok(RatingOutcome::AlreadyRated { existing });
        }

        match kind {
            RatingKind::Service => appointment.rating_of_service = Some(rating),
            RatingKind::Client => appointment.rating_of_client = Some(rating),
        }
        appointment.updated_at = appointment.next_revision();
        tables.activity.push(activity.clone());
        Ok(RatingOutcome::Recorded { rating })
    }

    async fn list_activity(&self, appointment_id: Uuid) -> Result<Vec<AppointmentActivity>, StoreError> {
        Ok(self.tables.read().await.activity.iter()
            .filter(|entry| entry.appointment_id == appointment_id)
            .cloned()
            .collect())
    }

    async fn load_client_profile(&self, client_id: Uuid) -> Result<ClientProfile, StoreError> {
        self.clients.read().await
            .get(&client_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound("Client profile".to_string()))
    }
}
