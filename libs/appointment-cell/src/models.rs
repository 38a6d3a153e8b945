// libs/appointment-cell/src/models.rs
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Duration, SubsecRound, Utc};
use std::fmt;

use shared_config::AppConfig;

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Appointment {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub client_id: Uuid,
    pub start_instant: DateTime<Utc>,
    pub end_instant: DateTime<Utc>,
    /// IANA zone inherited from the client's address at booking time.
    pub timezone: String,
    pub address: ServiceAddress,
    pub summary: String,
    pub notes: Option<String>,
    pub priority: Priority,
    pub status: AppointmentStatus,
    pub rating_of_service: Option<u8>,
    pub rating_of_client: Option<u8>,
    /// Set when the booking was made over soft conflicts with `override_warnings`.
    #[serde(default)]
    pub overlap_acknowledged: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    pub fn duration(&self) -> Duration {
        self.end_instant - self.start_instant
    }

    pub fn duration_minutes(&self) -> i64 {
        self.duration().num_minutes()
    }

    pub fn is_party(&self, actor_id: Uuid) -> bool {
        self.provider_id == actor_id || self.client_id == actor_id
    }

    pub fn rating(&self, kind: RatingKind) -> Option<u8> {
        match kind {
            RatingKind::Service => self.rating_of_service,
            RatingKind::Client => self.rating_of_client,
        }
    }

    /// `updated_at` for the next write. Strictly later than the current one so
    /// conditional writes keyed on it cannot be replayed.
    pub fn next_revision(&self) -> DateTime<Utc> {
        let now = timestamp_now();
        if now > self.updated_at {
            now
        } else {
            self.updated_at + Duration::microseconds(1)
        }
    }
}

/// Postgres keeps microseconds; revisions compared for equality must round-trip.
pub fn timestamp_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Requested,
    Scheduled,
    Canceled,
    InProgress,
    Missed,
    PendingResolution,
    Completed,
}

impl AppointmentStatus {
    pub const ALL: [AppointmentStatus; 7] = [
        AppointmentStatus::Requested,
        AppointmentStatus::Scheduled,
        AppointmentStatus::Canceled,
        AppointmentStatus::InProgress,
        AppointmentStatus::Missed,
        AppointmentStatus::PendingResolution,
        AppointmentStatus::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Requested => "requested",
            AppointmentStatus::Scheduled => "scheduled",
            AppointmentStatus::Canceled => "canceled",
            AppointmentStatus::InProgress => "in_progress",
            AppointmentStatus::Missed => "missed",
            AppointmentStatus::PendingResolution => "pending_resolution",
            AppointmentStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Informational only; never consulted by conflict rules.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Priority {
    P0,
    P1,
    #[default]
    P2,
    P3,
}

/// Snapshot of the client's address, copied onto the appointment at booking time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ServiceAddress {
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub region: Option<String>,
    pub postal_code: String,
    pub country: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientProfile {
    pub id: Uuid,
    pub timezone: String,
    pub address: ServiceAddress,
}

// ==============================================================================
// ACTIVITY TRAIL
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActivityAction {
    Booked,
    Rescheduled,
    Reinstated,
    Canceled,
    Started,
    Missed,
    MovedToPendingResolution,
    Completed,
    RatedService,
    RatedClient,
}

impl ActivityAction {
    /// The action recorded when an appointment is moved into `status` by ChangeStatus.
    pub fn for_status_change(status: AppointmentStatus) -> Self {
        match status {
            AppointmentStatus::Requested | AppointmentStatus::Scheduled => ActivityAction::Reinstated,
            AppointmentStatus::Canceled => ActivityAction::Canceled,
            AppointmentStatus::InProgress => ActivityAction::Started,
            AppointmentStatus::Missed => ActivityAction::Missed,
            AppointmentStatus::PendingResolution => ActivityAction::MovedToPendingResolution,
            AppointmentStatus::Completed => ActivityAction::Completed,
        }
    }
}

/// Append-only audit record; one per state-changing action.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppointmentActivity {
    pub id: Uuid,
    pub appointment_id: Uuid,
    pub acting_party_id: Uuid,
    pub action: ActivityAction,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AppointmentActivity {
    pub fn new(appointment_id: Uuid, acting_party_id: Uuid, action: ActivityAction, note: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            appointment_id,
            acting_party_id,
            action,
            note,
            created_at: Utc::now(),
        }
    }
}

// ==============================================================================
// RATINGS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RatingKind {
    Service,
    Client,
}

impl RatingKind {
    pub fn column(&self) -> &'static str {
        match self {
            RatingKind::Service => "rating_of_service",
            RatingKind::Client => "rating_of_client",
        }
    }

    pub fn activity(&self) -> ActivityAction {
        match self {
            RatingKind::Service => ActivityAction::RatedService,
            RatingKind::Client => ActivityAction::RatedClient,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RatingOutcome {
    Recorded { rating: u8 },
    AlreadyRated { existing: u8 },
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookAppointmentRequest {
    pub provider_id: Uuid,
    pub client_id: Uuid,
    /// Wall-clock start, `YYYY-MM-DD HH:MM:SS`.
    pub local_start: String,
    /// Overrides the timezone taken from the client's profile.
    pub timezone: Option<String>,
    pub duration_minutes: i64,
    #[serde(default)]
    pub priority: Priority,
    pub summary: String,
    pub notes: Option<String>,
    #[serde(default)]
    pub override_warnings: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeStatusRequest {
    pub target_status: AppointmentStatus,
    pub acting_party_id: Uuid,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RescheduleAppointmentRequest {
    pub new_local_start: String,
    /// Keeps the current duration when absent.
    pub new_duration_minutes: Option<i64>,
    pub acting_party_id: Uuid,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateAppointmentRequest {
    pub acting_party_id: Uuid,
    pub rating: i64,
}

// ==============================================================================
// VIEW PROJECTION
// ==============================================================================

/// What a party may see of an appointment. The provider owns the calendar and
/// sees everything; the client does not see private notes or their own rating.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppointmentView {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub client_id: Uuid,
    pub start_instant: DateTime<Utc>,
    pub end_instant: DateTime<Utc>,
    pub local_start: String,
    pub local_end: String,
    pub timezone: String,
    pub address: ServiceAddress,
    pub summary: String,
    pub priority: Priority,
    pub status: AppointmentStatus,
    pub rating_of_service: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating_of_client: Option<u8>,
}

impl AppointmentView {
    pub fn project(appointment: &Appointment, actor_id: Uuid, local_start: String, local_end: String) -> Self {
        let is_owner = appointment.provider_id == actor_id;

        Self {
            id: appointment.id,
            provider_id: appointment.provider_id,
            client_id: appointment.client_id,
            start_instant: appointment.start_instant,
            end_instant: appointment.end_instant,
            local_start,
            local_end,
            timezone: appointment.timezone.clone(),
            address: appointment.address.clone(),
            summary: appointment.summary.clone(),
            priority: appointment.priority,
            status: appointment.status,
            rating_of_service: appointment.rating_of_service,
            notes: if is_owner { appointment.notes.clone() } else { None },
            rating_of_client: if is_owner { appointment.rating_of_client } else { None },
        }
    }
}

// ==============================================================================
// VALIDATION MODELS
// ==============================================================================

/// Resolution for local times that occur twice when clocks fall back.
/// Local times skipped by a spring-forward transition are always rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AmbiguousTimePolicy {
    #[default]
    Earliest,
    Latest,
    Reject,
}

impl AmbiguousTimePolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "earliest" => Some(AmbiguousTimePolicy::Earliest),
            "latest" => Some(AmbiguousTimePolicy::Latest),
            "reject" => Some(AmbiguousTimePolicy::Reject),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppointmentValidationRules {
    pub min_duration_minutes: i64,
    pub max_duration_minutes: i64,
    pub ambiguous_time: AmbiguousTimePolicy,
    pub status_write_retries: u32,
}

impl Default for AppointmentValidationRules {
    fn default() -> Self {
        Self {
            min_duration_minutes: 1,
            max_duration_minutes: 600,
            ambiguous_time: AmbiguousTimePolicy::Earliest,
            status_write_retries: 3,
        }
    }
}

impl AppointmentValidationRules {
    pub fn from_config(config: &AppConfig) -> Self {
        let ambiguous_time = AmbiguousTimePolicy::parse(&config.ambiguous_local_time)
            .unwrap_or_else(|| {
                tracing::warn!("Unknown ambiguous local time policy '{}', using earliest",
                               config.ambiguous_local_time);
                AmbiguousTimePolicy::Earliest
            });

        Self {
            min_duration_minutes: config.min_appointment_minutes,
            max_duration_minutes: config.max_appointment_minutes,
            ambiguous_time,
            status_write_retries: config.status_write_retries.max(1),
        }
    }
}
