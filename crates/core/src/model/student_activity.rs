use std::fmt;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::activity::ActivityAnswers;
use crate::model::ids::{ActivityId, ModuleId, ProgramId, StudentId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum StudentActivityError {
    #[error("unknown activity status: {0}")]
    UnknownStatus(String),

    #[error("activity is already completed")]
    AlreadyCompleted,

    #[error("a persisted progress record cannot be locked")]
    LockedRecord,

    #[error("completed_at is before started_at")]
    InvalidTimeRange,

    #[error("status {status} is inconsistent with completed_at")]
    InconsistentCompletion { status: ActivityStatus },
}

//
// ─── STATUS ────────────────────────────────────────────────────────────────────
//

/// Per-student state of a one-shot program activity.
///
/// `Locked` is never persisted: it is the state of an activity with no record.
/// `Reviewed` exists for records marked by a professional after completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActivityStatus {
    Locked,
    InProgress,
    Completed,
    Reviewed,
}

impl ActivityStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ActivityStatus::Locked => "locked",
            ActivityStatus::InProgress => "in_progress",
            ActivityStatus::Completed => "completed",
            ActivityStatus::Reviewed => "reviewed",
        }
    }

    /// # Errors
    ///
    /// Returns `StudentActivityError::UnknownStatus` for unrecognized values.
    pub fn parse(s: &str) -> Result<Self, StudentActivityError> {
        match s {
            "locked" => Ok(ActivityStatus::Locked),
            "in_progress" => Ok(ActivityStatus::InProgress),
            "completed" => Ok(ActivityStatus::Completed),
            "reviewed" => Ok(ActivityStatus::Reviewed),
            other => Err(StudentActivityError::UnknownStatus(other.to_owned())),
        }
    }

    #[must_use]
    pub fn is_done(self) -> bool {
        matches!(self, ActivityStatus::Completed | ActivityStatus::Reviewed)
    }

    /// Status of an activity given its (possibly absent) progress record.
    #[must_use]
    pub fn of(record: Option<&StudentActivity>) -> Self {
        record.map_or(ActivityStatus::Locked, StudentActivity::status)
    }
}

impl fmt::Display for ActivityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//
// ─── ACTIVITY REFERENCE ────────────────────────────────────────────────────────
//

/// Where an activity lives inside a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ActivityRef {
    pub program_id: ProgramId,
    pub module_id: ModuleId,
    pub activity_id: ActivityId,
}

impl ActivityRef {
    #[must_use]
    pub fn new(program_id: ProgramId, module_id: ModuleId, activity_id: ActivityId) -> Self {
        Self {
            program_id,
            module_id,
            activity_id,
        }
    }
}

//
// ─── PROGRESS RECORD ───────────────────────────────────────────────────────────
//

/// Progress record keyed by `(student_id, activity_id)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudentActivity {
    student_id: StudentId,
    activity: ActivityRef,
    status: ActivityStatus,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    time_spent_minutes: u32,
    answers: Option<ActivityAnswers>,
    notes: Option<String>,
    points_earned: Option<u32>,
    updated_at: DateTime<Utc>,
}

impl StudentActivity {
    /// `locked → in_progress`: a fresh record with no time spent.
    #[must_use]
    pub fn start(student_id: StudentId, activity: ActivityRef, now: DateTime<Utc>) -> Self {
        Self {
            student_id,
            activity,
            status: ActivityStatus::InProgress,
            started_at: now,
            completed_at: None,
            time_spent_minutes: 0,
            answers: None,
            notes: None,
            points_earned: None,
            updated_at: now,
        }
    }

    /// Rehydrates a record from storage, re-checking the state invariants.
    ///
    /// # Errors
    ///
    /// Returns `StudentActivityError` if the record is locked, if completion
    /// fields disagree with the status, or if it completes before it starts.
    #[allow(clippy::too_many_arguments)]
    pub fn from_persisted(
        student_id: StudentId,
        activity: ActivityRef,
        status: ActivityStatus,
        started_at: DateTime<Utc>,
        completed_at: Option<DateTime<Utc>>,
        time_spent_minutes: u32,
        answers: Option<ActivityAnswers>,
        notes: Option<String>,
        points_earned: Option<u32>,
        updated_at: DateTime<Utc>,
    ) -> Result<Self, StudentActivityError> {
        if status == ActivityStatus::Locked {
            return Err(StudentActivityError::LockedRecord);
        }
        if status.is_done() != completed_at.is_some() {
            return Err(StudentActivityError::InconsistentCompletion { status });
        }
        if completed_at.is_some_and(|done| done < started_at) {
            return Err(StudentActivityError::InvalidTimeRange);
        }
        Ok(Self {
            student_id,
            activity,
            status,
            started_at,
            completed_at,
            time_spent_minutes,
            answers,
            notes,
            points_earned,
            updated_at,
        })
    }

    /// `in_progress → in_progress`: overwrite answers and accumulated time.
    ///
    /// Last write wins; the status never changes.
    ///
    /// # Errors
    ///
    /// Returns `StudentActivityError::AlreadyCompleted` once the activity is
    /// done, so drafts cannot rewrite submitted answers.
    pub fn save_draft(
        &mut self,
        answers: Option<ActivityAnswers>,
        time_spent_minutes: u32,
        now: DateTime<Utc>,
    ) -> Result<(), StudentActivityError> {
        if self.status.is_done() {
            return Err(StudentActivityError::AlreadyCompleted);
        }
        if answers.is_some() {
            self.answers = answers;
        }
        self.time_spent_minutes = time_spent_minutes;
        self.updated_at = now;
        Ok(())
    }

    /// `in_progress → completed`. Not reversible.
    ///
    /// # Errors
    ///
    /// Returns `StudentActivityError::AlreadyCompleted` if already done.
    pub fn complete(
        &mut self,
        answers: Option<ActivityAnswers>,
        notes: Option<String>,
        points: u32,
        now: DateTime<Utc>,
    ) -> Result<(), StudentActivityError> {
        if self.status.is_done() {
            return Err(StudentActivityError::AlreadyCompleted);
        }
        let completed_at = now.max(self.started_at);
        self.status = ActivityStatus::Completed;
        self.completed_at = Some(completed_at);
        if answers.is_some() {
            self.answers = answers;
        }
        self.notes = notes.filter(|n| !n.trim().is_empty());
        self.points_earned = Some(points);
        self.updated_at = completed_at;
        Ok(())
    }

    #[must_use]
    pub fn student_id(&self) -> StudentId {
        self.student_id
    }

    #[must_use]
    pub fn activity(&self) -> ActivityRef {
        self.activity
    }

    #[must_use]
    pub fn activity_id(&self) -> ActivityId {
        self.activity.activity_id
    }

    #[must_use]
    pub fn status(&self) -> ActivityStatus {
        self.status
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    #[must_use]
    pub fn time_spent_minutes(&self) -> u32 {
        self.time_spent_minutes
    }

    #[must_use]
    pub fn answers(&self) -> Option<&ActivityAnswers> {
        self.answers.as_ref()
    }

    #[must_use]
    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    #[must_use]
    pub fn points_earned(&self) -> Option<u32> {
        self.points_earned
    }

    #[must_use]
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
