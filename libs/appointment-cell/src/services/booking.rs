// libs/appointment-cell/src/services/booking.rs
use std::sync::Arc;

use tracing::{info, instrument, warn};
use uuid::Uuid;

use shared_config::AppConfig;

use crate::error::AppointmentError;
use crate::models::{
    timestamp_now, ActivityAction, Appointment, AppointmentActivity, AppointmentStatus,
    AppointmentValidationRules, AppointmentView, BookAppointmentRequest, ChangeStatusRequest,
    RateAppointmentRequest, RatingKind, RatingOutcome, RescheduleAppointmentRequest,
};
use crate::services::conflict::{assess_conflicts, ConflictDetectionService};
use crate::services::consistency::ProviderLocks;
use crate::services::lifecycle::AppointmentLifecycleService;
use crate::services::store::{AppointmentStore, StoreError};
use crate::services::timezone::{TimeConversionService, TimeUnit};

pub const CONCURRENT_UPDATE_MESSAGE: &str =
    "The appointment was changed by someone else while this request was processed; please retry";

/// Sequences time conversion, conflict detection, the lifecycle validator and
/// persistence for every appointment workflow.
pub struct AppointmentBookingService {
    store: Arc<dyn AppointmentStore>,
    time_service: TimeConversionService,
    conflict_service: ConflictDetectionService,
    lifecycle_service: AppointmentLifecycleService,
    locks: ProviderLocks,
    validation_rules: AppointmentValidationRules,
}

impl AppointmentBookingService {
    pub fn new(store: Arc<dyn AppointmentStore>, validation_rules: AppointmentValidationRules) -> Self {
        Self {
            time_service: TimeConversionService::new(validation_rules.ambiguous_time),
            conflict_service: ConflictDetectionService::new(Arc::clone(&store)),
            lifecycle_service: AppointmentLifecycleService::new(),
            locks: ProviderLocks::new(),
            store,
            validation_rules,
        }
    }

    pub fn from_config(store: Arc<dyn AppointmentStore>, config: &AppConfig) -> Self {
        Self::new(store, AppointmentValidationRules::from_config(config))
    }

    pub fn time_service(&self) -> &TimeConversionService {
        &self.time_service
    }

    /// Provider-initiated booking; the appointment is created directly as `scheduled`.
    #[instrument(skip(self, request), fields(provider_id = %request.provider_id, client_id = %request.client_id))]
    pub async fn book_appointment(&self, request: BookAppointmentRequest) -> Result<Appointment, AppointmentError> {
        self.validate_duration(request.duration_minutes)?;
        if request.summary.trim().is_empty() {
            return Err(AppointmentError::validation("Appointment summary is required"));
        }

        let profile = self.store.load_client_profile(request.client_id).await?;
        let timezone = request.timezone.clone().unwrap_or_else(|| profile.timezone.clone());

        let start = self.time_service.to_instant(&request.local_start, &timezone)?;
        let end = self.time_service.add(start, request.duration_minutes, TimeUnit::Minutes)?;

        let _lock = self.locks.acquire(request.provider_id).await;

        let assessment = self.conflict_service.check_booking(
            request.provider_id,
            start,
            end,
            None,
            request.override_warnings,
        ).await?;

        if assessment.overridden > 0 {
            warn!("Booking over {} overlapping appointments at caller's request", assessment.overridden);
        }

        let now = timestamp_now();
        let appointment = Appointment {
            id: Uuid::new_v4(),
            provider_id: request.provider_id,
            client_id: request.client_id,
            start_instant: start,
            end_instant: end,
            timezone,
            address: profile.address,
            summary: request.summary,
            notes: request.notes,
            priority: request.priority,
            status: AppointmentStatus::Scheduled,
            rating_of_service: None,
            rating_of_client: None,
            overlap_acknowledged: assessment.overridden > 0,
            created_at: now,
            updated_at: now,
        };

        let activity = AppointmentActivity::new(appointment.id, appointment.provider_id, ActivityAction::Booked, None);
        match self.store.insert_appointment(&appointment, &activity).await {
            Ok(()) => {}
            Err(StoreError::Exclusion(detail)) => {
                warn!("Store rejected booking: {}", detail);
                return Err(self.exclusion_error(&appointment, None).await);
            }
            Err(e) => return Err(e.into()),
        }

        info!("Appointment {} booked for provider {} at {}",
              appointment.id, appointment.provider_id, appointment.start_instant.to_rfc3339());
        Ok(appointment)
    }

    /// Validates and applies a status transition as one compare-and-swap write.
    #[instrument(skip(self, request), fields(target = %request.target_status, actor = %request.acting_party_id))]
    pub async fn change_status(
        &self,
        appointment_id: Uuid,
        request: ChangeStatusRequest,
    ) -> Result<Appointment, AppointmentError> {
        let target = request.target_status;

        for attempt in 1..=self.validation_rules.status_write_retries {
            let current = self.get_appointment(appointment_id, request.acting_party_id).await?;
            self.lifecycle_service.validate_transition(current.status, target)?;

            if current.status == target {
                info!("Appointment {} is already {}; nothing to change", appointment_id, target);
                return Ok(current);
            }

            let mut updated = current.clone();
            updated.status = target;
            updated.updated_at = current.next_revision();

            // Re-entering `scheduled` must keep the provider's calendar free of overlaps.
            let _lock = if target == AppointmentStatus::Scheduled {
                let lock = self.locks.acquire(current.provider_id).await;
                self.conflict_service.check_booking(
                    current.provider_id,
                    current.start_instant,
                    current.end_instant,
                    Some(current.id),
                    false,
                ).await?;
                updated.overlap_acknowledged = false;
                Some(lock)
            } else {
                None
            };

            let activity = AppointmentActivity::new(
                appointment_id,
                request.acting_party_id,
                ActivityAction::for_status_change(target),
                request.note.clone(),
            );

            match self.store.update_appointment(&updated, current.updated_at, &activity).await {
                Ok(()) => {
                    info!("Appointment {} moved from {} to {}", appointment_id, current.status, target);
                    return Ok(updated);
                }
                Err(StoreError::StaleWrite(_)) => {
                    warn!("Status write for appointment {} was stale (attempt {})", appointment_id, attempt);
                }
                Err(StoreError::Exclusion(_)) => {
                    return Err(self.exclusion_error(&updated, Some(updated.id)).await);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(AppointmentError::logical(CONCURRENT_UPDATE_MESSAGE))
    }

    /// Moves an appointment to a new local start in its own (immutable) timezone.
    #[instrument(skip(self, request), fields(actor = %request.acting_party_id))]
    pub async fn reschedule_appointment(
        &self,
        appointment_id: Uuid,
        request: RescheduleAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        if let Some(minutes) = request.new_duration_minutes {
            self.validate_duration(minutes)?;
        }

        // The provider never changes, so the lock can be taken before the row is
        // read; every attempt then reads and writes under it.
        let provider_id = self.get_appointment(appointment_id, request.acting_party_id).await?.provider_id;
        let _lock = self.locks.acquire(provider_id).await;

        for attempt in 1..=self.validation_rules.status_write_retries {
            let current = self.get_appointment(appointment_id, request.acting_party_id).await?;
            self.lifecycle_service.validate_transition(current.status, AppointmentStatus::Scheduled)?;

            let duration_minutes = request.new_duration_minutes.unwrap_or_else(|| current.duration_minutes());
            let start = self.time_service.to_instant(&request.new_local_start, &current.timezone)?;
            let end = self.time_service.add(start, duration_minutes, TimeUnit::Minutes)?;

            self.conflict_service.check_booking(current.provider_id, start, end, Some(current.id), false).await?;

            let mut updated = current.clone();
            updated.start_instant = start;
            updated.end_instant = end;
            updated.status = AppointmentStatus::Scheduled;
            updated.overlap_acknowledged = false;
            updated.updated_at = current.next_revision();

            let activity = AppointmentActivity::new(
                appointment_id,
                request.acting_party_id,
                ActivityAction::Rescheduled,
                request.reason.clone(),
            );

            match self.store.update_appointment(&updated, current.updated_at, &activity).await {
                Ok(()) => {
                    info!("Appointment {} rescheduled to {}", appointment_id, start.to_rfc3339());
                    return Ok(updated);
                }
                Err(StoreError::StaleWrite(_)) => {
                    warn!("Reschedule write for appointment {} was stale (attempt {})", appointment_id, attempt);
                }
                Err(StoreError::Exclusion(_)) => {
                    return Err(self.exclusion_error(&updated, Some(updated.id)).await);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(AppointmentError::logical(CONCURRENT_UPDATE_MESSAGE))
    }

    /// Sets a rating once. A repeat attempt is an expected, benign outcome and
    /// reports the stored value without changing it.
    #[instrument(skip(self, request), fields(actor = %request.acting_party_id))]
    pub async fn record_rating(
        &self,
        appointment_id: Uuid,
        kind: RatingKind,
        request: RateAppointmentRequest,
    ) -> Result<RatingOutcome, AppointmentError> {
        let rating = u8::try_from(request.rating)
            .ok()
            .filter(|value| (1..=5).contains(value))
            .ok_or_else(|| AppointmentError::validation("Ratings must be whole numbers from 1 to 5"))?;

        let appointment = self.get_appointment(appointment_id, request.acting_party_id).await?;
        match kind {
            RatingKind::Service if appointment.client_id != request.acting_party_id => {
                return Err(AppointmentError::logical("Only the client may rate the service"));
            }
            RatingKind::Client if appointment.provider_id != request.acting_party_id => {
                return Err(AppointmentError::logical("Only the provider may rate the client"));
            }
            _ => {}
        }

        let activity = AppointmentActivity::new(appointment_id, request.acting_party_id, kind.activity(), None);
        let outcome = self.store.record_rating(appointment_id, kind, rating, &activity).await?;
        match outcome {
            RatingOutcome::Recorded { .. } => {
                info!("Recorded {} for appointment {}", kind.column(), appointment_id);
            }
            RatingOutcome::AlreadyRated { existing } => {
                info!("Appointment {} already has {} = {}", appointment_id, kind.column(), existing);
            }
        }

        Ok(outcome)
    }

    /// Loads an appointment the actor is a party to. Appointments belonging to
    /// others are reported exactly like missing ones.
    pub async fn get_appointment(&self, appointment_id: Uuid, actor_id: Uuid) -> Result<Appointment, AppointmentError> {
        let appointment = self.store.load_appointment(appointment_id).await?;
        if !appointment.is_party(actor_id) {
            return Err(AppointmentError::appointment_not_found());
        }
        Ok(appointment)
    }

    pub async fn appointment_view(&self, appointment_id: Uuid, actor_id: Uuid) -> Result<AppointmentView, AppointmentError> {
        let appointment = self.get_appointment(appointment_id, actor_id).await?;
        let local_start = self.time_service.to_local(appointment.start_instant, &appointment.timezone)?;
        let local_end = self.time_service.to_local(appointment.end_instant, &appointment.timezone)?;
        Ok(AppointmentView::project(&appointment, actor_id, local_start, local_end))
    }

    pub async fn list_activity(&self, appointment_id: Uuid, actor_id: Uuid) -> Result<Vec<AppointmentActivity>, AppointmentError> {
        self.get_appointment(appointment_id, actor_id).await?;
        let mut entries = self.store.list_activity(appointment_id).await?;
        entries.sort_by_key(|entry| entry.created_at);
        Ok(entries)
    }

    // ==============================================================================
    // PRIVATE HELPER METHODS
    // ==============================================================================

    fn validate_duration(&self, minutes: i64) -> Result<(), AppointmentError> {
        let rules = &self.validation_rules;
        if minutes < rules.min_duration_minutes || minutes > rules.max_duration_minutes {
            return Err(AppointmentError::validation(format!(
                "Appointment duration must be between {} and {} minutes",
                rules.min_duration_minutes, rules.max_duration_minutes
            )));
        }
        Ok(())
    }

    /// Maps a backstop rejection to the error the caller would have seen had the
    /// competing write landed before our conflict check.
    async fn exclusion_error(&self, appointment: &Appointment, exclude: Option<Uuid>) -> AppointmentError {
        let conflicts = match self.conflict_service.find_conflicts(
            appointment.provider_id,
            appointment.start_instant,
            appointment.end_instant,
            exclude,
        ).await {
            Ok(conflicts) => conflicts,
            Err(e) => return e,
        };

        match assess_conflicts(appointment.start_instant, &conflicts, false) {
            Err(error) => error,
            Ok(_) => AppointmentError::Conflict { count: 1 },
        }
    }
}
