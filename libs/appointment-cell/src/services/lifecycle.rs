// libs/appointment-cell/src/services/lifecycle.rs
use tracing::{debug, warn};

use crate::error::AppointmentError;
use crate::models::AppointmentStatus;

/// Legal sources for entering one target status, with the message surfaced
/// when the current status does not qualify.
#[derive(Debug, Clone, Copy)]
pub struct TransitionRule {
    pub target: AppointmentStatus,
    pub sources: &'static [AppointmentStatus],
    pub rejection: &'static str,
}

// `requested` has no rule: nothing transitions into it.
pub const TRANSITION_RULES: &[TransitionRule] = &[
    TransitionRule {
        target: AppointmentStatus::Scheduled,
        sources: &[
            AppointmentStatus::Missed,
            AppointmentStatus::Canceled,
            AppointmentStatus::Requested,
            AppointmentStatus::Scheduled,
        ],
        rejection: "Appointments that have already been started cannot be rescheduled",
    },
    TransitionRule {
        target: AppointmentStatus::Canceled,
        sources: &[AppointmentStatus::Scheduled],
        rejection: "Only scheduled appointments may be canceled",
    },
    TransitionRule {
        target: AppointmentStatus::InProgress,
        sources: &[AppointmentStatus::Scheduled],
        rejection: "Only scheduled appointments may be started",
    },
    TransitionRule {
        target: AppointmentStatus::Missed,
        sources: &[AppointmentStatus::Scheduled],
        rejection: "Only scheduled appointments can be missed",
    },
    TransitionRule {
        target: AppointmentStatus::PendingResolution,
        sources: &[AppointmentStatus::InProgress],
        rejection: "Only in-progress appointments can be moved to a pending-resolution state",
    },
    TransitionRule {
        target: AppointmentStatus::Completed,
        sources: &[
            AppointmentStatus::Scheduled,
            AppointmentStatus::InProgress,
            AppointmentStatus::PendingResolution,
            AppointmentStatus::Missed,
        ],
        rejection: "A canceled appointment cannot be completed",
    },
];

pub const REQUESTED_IS_INITIAL_ONLY: &str = "Appointments cannot be returned to the requested state";

pub fn rule_for(target: AppointmentStatus) -> Option<&'static TransitionRule> {
    TRANSITION_RULES.iter().find(|rule| rule.target == target)
}

/// Storage-independent validator; callers apply the mutation only after it succeeds.
#[derive(Debug, Clone, Copy, Default)]
pub struct AppointmentLifecycleService;

impl AppointmentLifecycleService {
    pub fn new() -> Self {
        Self
    }

    pub fn validate_transition(
        &self,
        current_status: AppointmentStatus,
        target_status: AppointmentStatus,
    ) -> Result<(), AppointmentError> {
        debug!("Validating status transition from {} to {}", current_status, target_status);

        let rule = rule_for(target_status)
            .ok_or_else(|| AppointmentError::logical(REQUESTED_IS_INITIAL_ONLY))?;

        if !rule.sources.contains(&current_status) {
            warn!("Invalid status transition attempted: {} -> {}", current_status, target_status);
            return Err(AppointmentError::logical(rule.rejection));
        }

        Ok(())
    }

    /// Every status `current_status` may legally move into.
    pub fn valid_targets(&self, current_status: AppointmentStatus) -> Vec<AppointmentStatus> {
        TRANSITION_RULES.iter()
            .filter(|rule| rule.sources.contains(&current_status))
            .map(|rule| rule.target)
            .collect()
    }
}
