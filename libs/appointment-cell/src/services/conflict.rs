// libs/appointment-cell/src/services/conflict.rs
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::AppointmentError;
use crate::models::Appointment;
use crate::services::store::AppointmentStore;

pub const IDENTICAL_START_MESSAGE: &str = "Appointments may not begin at the same time";

/// The four overlap cases, spelled out so boundary inclusivity is visible:
/// back-to-back intervals never conflict.
pub fn is_conflict(
    existing_start: DateTime<Utc>,
    existing_end: DateTime<Utc>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> bool {
    let starts_inside = existing_start >= start && existing_start < end;
    let ends_inside = existing_end > start && existing_end <= end;
    let contains_proposed = existing_start < start && existing_end > end;
    let inside_proposed = existing_start > start && existing_end < end;

    starts_inside || ends_inside || contains_proposed || inside_proposed
}

/// Outcome of a conflict check that did not block the booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConflictAssessment {
    /// Soft overlaps tolerated because the caller overrode them.
    pub overridden: usize,
}

/// Hard rule first (identical start, never overridable), then soft overlaps.
pub fn assess_conflicts(
    proposed_start: DateTime<Utc>,
    conflicts: &[Appointment],
    override_warnings: bool,
) -> Result<ConflictAssessment, AppointmentError> {
    if conflicts.iter().any(|apt| apt.start_instant == proposed_start) {
        return Err(AppointmentError::logical(IDENTICAL_START_MESSAGE));
    }

    if !conflicts.is_empty() && !override_warnings {
        return Err(AppointmentError::Conflict { count: conflicts.len() });
    }

    Ok(ConflictAssessment { overridden: conflicts.len() })
}

pub struct ConflictDetectionService {
    store: Arc<dyn AppointmentStore>,
}

impl ConflictDetectionService {
    pub fn new(store: Arc<dyn AppointmentStore>) -> Self {
        Self { store }
    }

    /// Scheduled appointments of the provider that conflict with `[start, end)`,
    /// ordered by start instant.
    pub async fn find_conflicts(
        &self,
        provider_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude_appointment_id: Option<Uuid>,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        if end <= start {
            return Err(AppointmentError::validation("Appointment end must be after its start"));
        }

        debug!("Checking conflicts for provider {} from {} to {}",
               provider_id, start.to_rfc3339(), end.to_rfc3339());

        let candidates = self.store
            .find_scheduled_appointments(provider_id, start, end, exclude_appointment_id)
            .await?;

        let mut conflicts: Vec<Appointment> = candidates.into_iter()
            .filter(|apt| is_conflict(apt.start_instant, apt.end_instant, start, end))
            .collect();
        conflicts.sort_by_key(|apt| apt.start_instant);

        if !conflicts.is_empty() {
            warn!("Conflict detected for provider {} - {} overlapping appointments",
                  provider_id, conflicts.len());
        }

        Ok(conflicts)
    }

    /// Runs the query and the classification together; this is what booking,
    /// rescheduling and reinstating call.
    pub async fn check_booking(
        &self,
        provider_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude_appointment_id: Option<Uuid>,
        override_warnings: bool,
    ) -> Result<ConflictAssessment, AppointmentError> {
        let conflicts = self.find_conflicts(provider_id, start, end, exclude_appointment_id).await?;
        assess_conflicts(start, &conflicts, override_warnings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::{Duration, TimeZone};

    use crate::models::{ActivityAction, AppointmentActivity, AppointmentStatus, Priority, ServiceAddress};
    use crate::services::store::MemoryAppointmentStore;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 6, hour, minute, 0).unwrap()
    }

    fn scheduled(provider_id: Uuid, start: DateTime<Utc>, end: DateTime<Utc>) -> Appointment {
        Appointment {
            id: Uuid::new_v4(),
            provider_id,
            client_id: Uuid::new_v4(),
            start_instant: start,
            end_instant: end,
            timezone: "UTC".to_string(),
            address: ServiceAddress::default(),
            summary: "Inspection".to_string(),
            notes: None,
            priority: Priority::P1,
            status: AppointmentStatus::Scheduled,
            rating_of_service: None,
            rating_of_client: None,
            overlap_acknowledged: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_four_way_predicate_matches_interval_overlap() {
        let (start, end) = (at(10, 0), at(11, 0));

        assert!(is_conflict(at(10, 30), at(11, 30), start, end), "existing starts inside");
        assert!(is_conflict(at(9, 30), at(10, 30), start, end), "existing ends inside");
        assert!(is_conflict(at(9, 0), at(12, 0), start, end), "existing contains proposed");
        assert!(is_conflict(at(10, 15), at(10, 45), start, end), "proposed contains existing");
        assert!(is_conflict(at(10, 0), at(11, 0), start, end), "identical interval");

        assert!(!is_conflict(at(9, 0), at(10, 0), start, end), "existing ends at proposed start");
        assert!(!is_conflict(at(11, 0), at(12, 0), start, end), "existing starts at proposed end");

        for minute in (0..180).step_by(5) {
            let s = at(9, 0) + Duration::minutes(minute);
            let e = s + Duration::minutes(25);
            assert_eq!(is_conflict(s, e, start, end), s < end && e > start);
        }
    }

    #[test]
    fn test_assessment_rules() {
        let provider = Uuid::new_v4();
        let one = vec![scheduled(provider, at(10, 30), at(11, 30))];
        let same_start = vec![scheduled(provider, at(10, 0), at(10, 15))];

        assert_eq!(assess_conflicts(at(10, 0), &[], false), Ok(ConflictAssessment { overridden: 0 }));
        assert_eq!(assess_conflicts(at(10, 0), &one, false), Err(AppointmentError::Conflict { count: 1 }));
        assert_eq!(assess_conflicts(at(10, 0), &one, true), Ok(ConflictAssessment { overridden: 1 }));
        assert_matches!(
            assess_conflicts(at(10, 0), &same_start, true),
            Err(AppointmentError::Logical(msg)) if msg == IDENTICAL_START_MESSAGE
        );
    }

    #[tokio::test]
    async fn test_find_conflicts_against_store() {
        let store = Arc::new(MemoryAppointmentStore::new());
        let provider = Uuid::new_v4();
        let other_provider = Uuid::new_v4();

        let second = scheduled(provider, at(11, 0), at(12, 0));
        let first = scheduled(provider, at(9, 0), at(10, 30));
        for apt in [&second, &first, &scheduled(other_provider, at(10, 0), at(11, 0))] {
            let booked = AppointmentActivity::new(apt.id, apt.provider_id, ActivityAction::Booked, None);
            store.insert_appointment(apt, &booked).await.unwrap();
        }

        let detector = ConflictDetectionService::new(store);

        let conflicts = detector.find_conflicts(provider, at(10, 0), at(11, 30), None).await.unwrap();
        assert_eq!(conflicts.iter().map(|a| a.id).collect::<Vec<_>>(), vec![first.id, second.id]);

        let error = detector.check_booking(provider, at(10, 0), at(11, 30), None, false).await.unwrap_err();
        assert_eq!(error.to_string(), "2 existing appointments overlap with this one");

        let back_to_back = detector.find_conflicts(provider, at(10, 30), at(11, 0), None).await.unwrap();
        assert!(back_to_back.is_empty());
    }

    #[tokio::test]
    async fn test_rejects_empty_interval() {
        let detector = ConflictDetectionService::new(Arc::new(MemoryAppointmentStore::new()));
        let result = detector.find_conflicts(Uuid::new_v4(), at(10, 0), at(10, 0), None).await;
        assert_matches!(result, Err(AppointmentError::Validation(_)));
    }
}
