use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::ids::{ActivityId, AssignmentId, ProfessionalId, ProgramId, StudentId};
use crate::model::progress::completion_percent;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AssignmentError {
    #[error("unknown assignment status: {0}")]
    UnknownStatus(String),

    #[error("progress must be between 0 and 100, got {0}")]
    InvalidProgress(u8),

    #[error("assignment is {0} and no longer records progress")]
    NotActive(AssignmentStatus),
}

//
// ─── STATUS ────────────────────────────────────────────────────────────────────
//

/// Lifecycle of a student ↔ program link.
///
/// `Inactive` is the soft-delete state; assignments are never removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssignmentStatus {
    Active,
    Paused,
    Completed,
    Cancelled,
    Inactive,
}

impl AssignmentStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            AssignmentStatus::Active => "active",
            AssignmentStatus::Paused => "paused",
            AssignmentStatus::Completed => "completed",
            AssignmentStatus::Cancelled => "cancelled",
            AssignmentStatus::Inactive => "inactive",
        }
    }

    /// # Errors
    ///
    /// Returns `AssignmentError::UnknownStatus` for unrecognized values.
    pub fn parse(s: &str) -> Result<Self, AssignmentError> {
        match s {
            "active" => Ok(AssignmentStatus::Active),
            "paused" => Ok(AssignmentStatus::Paused),
            "completed" => Ok(AssignmentStatus::Completed),
            "cancelled" => Ok(AssignmentStatus::Cancelled),
            "inactive" => Ok(AssignmentStatus::Inactive),
            other => Err(AssignmentError::UnknownStatus(other.to_owned())),
        }
    }

    /// Removed assignments (`Cancelled`/`Inactive`) no longer accept progress.
    #[must_use]
    pub fn is_removed(self) -> bool {
        matches!(self, AssignmentStatus::Cancelled | AssignmentStatus::Inactive)
    }
}

impl fmt::Display for AssignmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//
// ─── UPDATES ───────────────────────────────────────────────────────────────────
//

/// Partial update of an assignment's progress fields.
///
/// When `completed_activities` is present, `progress` is recomputed from the
/// program's real activity count and any supplied `progress` is ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssignmentProgressUpdate {
    pub progress: Option<u8>,
    pub completed_activities: Option<BTreeSet<ActivityId>>,
}

//
// ─── ASSIGNMENT ────────────────────────────────────────────────────────────────
//

/// Links one student to one program and tracks aggregate progress.
///
/// Invariant: `progress == completion_percent(|completed_activities|, total)`
/// for the program total last used to record progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    id: AssignmentId,
    student_id: StudentId,
    program_id: ProgramId,
    assigned_by: Option<ProfessionalId>,
    assigned_at: DateTime<Utc>,
    status: AssignmentStatus,
    progress: u8,
    completed_activities: BTreeSet<ActivityId>,
}

impl Assignment {
    /// Rehydrates an assignment from storage.
    ///
    /// # Errors
    ///
    /// Returns `AssignmentError::InvalidProgress` if `progress > 100`.
    #[allow(clippy::too_many_arguments)]
    pub fn from_persisted(
        id: AssignmentId,
        student_id: StudentId,
        program_id: ProgramId,
        assigned_by: Option<ProfessionalId>,
        assigned_at: DateTime<Utc>,
        status: AssignmentStatus,
        progress: u8,
        completed_activities: BTreeSet<ActivityId>,
    ) -> Result<Self, AssignmentError> {
        if progress > 100 {
            return Err(AssignmentError::InvalidProgress(progress));
        }
        Ok(Self {
            id,
            student_id,
            program_id,
            assigned_by,
            assigned_at,
            status,
            progress,
            completed_activities,
        })
    }

    #[must_use]
    pub fn id(&self) -> AssignmentId {
        self.id
    }

    #[must_use]
    pub fn student_id(&self) -> StudentId {
        self.student_id
    }

    #[must_use]
    pub fn program_id(&self) -> ProgramId {
        self.program_id
    }

    #[must_use]
    pub fn assigned_by(&self) -> Option<ProfessionalId> {
        self.assigned_by
    }

    #[must_use]
    pub fn assigned_at(&self) -> DateTime<Utc> {
        self.assigned_at
    }

    #[must_use]
    pub fn status(&self) -> AssignmentStatus {
        self.status
    }

    #[must_use]
    pub fn progress(&self) -> u8 {
        self.progress
    }

    #[must_use]
    pub fn completed_activities(&self) -> &BTreeSet<ActivityId> {
        &self.completed_activities
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == AssignmentStatus::Active
    }

    /// Records a completed activity and recomputes progress from `total`.
    ///
    /// Completing the same activity twice leaves the set unchanged.
    /// Returns `true` if the activity was newly recorded.
    ///
    /// # Errors
    ///
    /// Returns `AssignmentError::NotActive` for removed assignments.
    pub fn record_completion(
        &mut self,
        activity: ActivityId,
        total: usize,
    ) -> Result<bool, AssignmentError> {
        if self.status.is_removed() {
            return Err(AssignmentError::NotActive(self.status));
        }
        let inserted = self.completed_activities.insert(activity);
        self.recompute(total);
        Ok(inserted)
    }

    /// Applies a partial progress update.
    ///
    /// # Errors
    ///
    /// Returns `AssignmentError::InvalidProgress` for an explicit progress
    /// above 100, or `NotActive` if the assignment was removed.
    pub fn apply_update(
        &mut self,
        update: AssignmentProgressUpdate,
        total: usize,
    ) -> Result<(), AssignmentError> {
        if self.status.is_removed() {
            return Err(AssignmentError::NotActive(self.status));
        }
        if let Some(completed) = update.completed_activities {
            self.completed_activities = completed;
            self.recompute(total);
        } else if let Some(progress) = update.progress {
            if progress > 100 {
                return Err(AssignmentError::InvalidProgress(progress));
            }
            self.progress = progress;
        }
        Ok(())
    }

    pub fn set_status(&mut self, status: AssignmentStatus) {
        self.status = status;
    }

    /// Soft-deletes the assignment.
    pub fn deactivate(&mut self) {
        self.status = AssignmentStatus::Inactive;
    }

    fn recompute(&mut self, total: usize) {
        self.progress = completion_percent(self.completed_activities.len(), total);
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    fn assignment() -> Assignment {
        Assignment::from_persisted(
            AssignmentId::new(1),
            StudentId::new(1),
            ProgramId::new(1),
            Some(ProfessionalId::new(2)),
            fixed_now(),
            AssignmentStatus::Active,
            0,
            BTreeSet::new(),
        )
        .unwrap()
    }

    #[test]
    fn completion_recomputes_from_real_total() {
        let mut a = assignment();
        assert!(a.record_completion(ActivityId::new(1), 4).unwrap());
        assert_eq!(a.progress(), 25);
        assert!(a.record_completion(ActivityId::new(2), 4).unwrap());
        assert_eq!(a.progress(), 50);
    }

    #[test]
    fn repeated_completion_is_deduplicated() {
        let mut a = assignment();
        a.record_completion(ActivityId::new(1), 3).unwrap();
        assert!(!a.record_completion(ActivityId::new(1), 3).unwrap());
        assert_eq!(a.completed_activities().len(), 1);
        assert_eq!(a.progress(), 33);
    }

    #[test]
    fn zero_total_never_divides() {
        let mut a = assignment();
        a.record_completion(ActivityId::new(1), 0).unwrap();
        assert_eq!(a.progress(), 0);
    }

    #[test]
    fn update_with_activities_ignores_supplied_progress() {
        let mut a = assignment();
        a.apply_update(
            AssignmentProgressUpdate {
                progress: Some(90),
                completed_activities: Some([ActivityId::new(1)].into()),
            },
            2,
        )
        .unwrap();
        assert_eq!(a.progress(), 50);
    }

    #[test]
    fn progress_only_update_is_range_checked() {
        let mut a = assignment();
        a.apply_update(
            AssignmentProgressUpdate {
                progress: Some(40),
                completed_activities: None,
            },
            10,
        )
        .unwrap();
        assert_eq!(a.progress(), 40);

        let err = a
            .apply_update(
                AssignmentProgressUpdate {
                    progress: Some(101),
                    completed_activities: None,
                },
                10,
            )
            .unwrap_err();
        assert_eq!(err, AssignmentError::InvalidProgress(101));
    }

    #[test]
    fn removed_assignment_rejects_progress() {
        let mut a = assignment();
        a.deactivate();
        assert_eq!(a.status(), AssignmentStatus::Inactive);
        let err = a.record_completion(ActivityId::new(1), 2).unwrap_err();
        assert_eq!(err, AssignmentError::NotActive(AssignmentStatus::Inactive));
    }

    #[test]
    fn status_parse_round_trips() {
        for status in [
            AssignmentStatus::Active,
            AssignmentStatus::Paused,
            AssignmentStatus::Completed,
            AssignmentStatus::Cancelled,
            AssignmentStatus::Inactive,
        ] {
            assert_eq!(AssignmentStatus::parse(status.as_str()).unwrap(), status);
        }
    }
}
