// src/services/attempt_policy.rs

use chrono::{DateTime, Utc};

use crate::{error::GradingError, models::assignment::Assignment};

/// Gatekeeper for new attempts.
///
/// The check and the increment are only safe when applied to an assignment
/// the caller holds exclusively (a locked row, a guarded map entry): stores
/// run `record_attempt_start` inside the same transaction that creates the
/// submission.
pub struct AttemptPolicy;

impl AttemptPolicy {
    /// Fails closed when no attempts remain or the due date has passed.
    pub fn check(assignment: &Assignment, now: DateTime<Utc>) -> Result<(), GradingError> {
        if assignment.attempts_used >= assignment.max_attempts {
            return Err(GradingError::AttemptLimitExceeded {
                used: assignment.attempts_used,
                max: assignment.max_attempts,
            });
        }
        if let Some(due_at) = assignment.due_at {
            if now > due_at {
                return Err(GradingError::PastDue { due_at });
            }
        }
        Ok(())
    }

    pub fn can_start(assignment: &Assignment, now: DateTime<Utc>) -> bool {
        Self::check(assignment, now).is_ok()
    }

    /// Consumes one attempt and returns its number (1-based).
    pub fn record_attempt_start(
        assignment: &mut Assignment,
        now: DateTime<Utc>,
    ) -> Result<i32, GradingError> {
        Self::check(assignment, now)?;
        assignment.attempts_used += 1;
        Ok(assignment.attempts_used)
    }
}
