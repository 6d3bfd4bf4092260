use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::activity::ActivityAnswers;
use crate::model::day::DayOfWeek;
use crate::model::ids::{ActivityId, ScheduleId, StudentId};
use crate::model::progress::completion_percent;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ScheduleProgressError {
    #[error("completed flag disagrees with completed_at")]
    InconsistentCompletion,
}

/// Identity of a schedule progress record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScheduleProgressKey {
    pub student_id: StudentId,
    pub schedule_id: ScheduleId,
    pub activity_id: ActivityId,
}

impl ScheduleProgressKey {
    #[must_use]
    pub fn new(student_id: StudentId, schedule_id: ScheduleId, activity_id: ActivityId) -> Self {
        Self {
            student_id,
            schedule_id,
            activity_id,
        }
    }
}

/// Optional details stored alongside a completion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleCompletion {
    pub time_spent_minutes: Option<u32>,
    pub answers: Option<ActivityAnswers>,
    pub notes: Option<String>,
}

/// Mutations a schedule progress record accepts.
///
/// Every change upserts a record except `Uncomplete`, which leaves a missing
/// record missing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleProgressChange {
    Complete(ScheduleCompletion),
    Uncomplete,
    SetTime(u32),
    SetNotes(String),
}

/// Progress of one student on one scheduled activity.
///
/// Invariant: `completed` iff `completed_at.is_some()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleActivityProgress {
    key: ScheduleProgressKey,
    day: DayOfWeek,
    completed: bool,
    completed_at: Option<DateTime<Utc>>,
    time_spent_minutes: u32,
    answers: Option<ActivityAnswers>,
    notes: Option<String>,
    updated_at: DateTime<Utc>,
}

impl ScheduleActivityProgress {
    fn stub(key: ScheduleProgressKey, day: DayOfWeek, now: DateTime<Utc>) -> Self {
        Self {
            key,
            day,
            completed: false,
            completed_at: None,
            time_spent_minutes: 0,
            answers: None,
            notes: None,
            updated_at: now,
        }
    }

    /// Rehydrates a record from storage.
    ///
    /// # Errors
    ///
    /// Returns `ScheduleProgressError::InconsistentCompletion` if `completed`
    /// and `completed_at` disagree.
    #[allow(clippy::too_many_arguments)]
    pub fn from_persisted(
        key: ScheduleProgressKey,
        day: DayOfWeek,
        completed: bool,
        completed_at: Option<DateTime<Utc>>,
        time_spent_minutes: u32,
        answers: Option<ActivityAnswers>,
        notes: Option<String>,
        updated_at: DateTime<Utc>,
    ) -> Result<Self, ScheduleProgressError> {
        if completed != completed_at.is_some() {
            return Err(ScheduleProgressError::InconsistentCompletion);
        }
        Ok(Self {
            key,
            day,
            completed,
            completed_at,
            time_spent_minutes,
            answers,
            notes,
            updated_at,
        })
    }

    /// Applies `change` to the current record (if any) and returns the record
    /// to persist. `None` means nothing should be written.
    ///
    /// Backends call this inside their transaction so the read and the
    /// conditional insert-or-update happen together.
    #[must_use]
    pub fn apply(
        existing: Option<Self>,
        key: ScheduleProgressKey,
        day: DayOfWeek,
        change: ScheduleProgressChange,
        now: DateTime<Utc>,
    ) -> Option<Self> {
        let mut record = match (existing, &change) {
            (None, ScheduleProgressChange::Uncomplete) => return None,
            (None, _) => Self::stub(key, day, now),
            (Some(record), _) => record,
        };

        match change {
            ScheduleProgressChange::Complete(details) => {
                record.day = day;
                record.completed = true;
                record.completed_at = Some(now);
                if let Some(minutes) = details.time_spent_minutes {
                    record.time_spent_minutes = minutes;
                }
                if details.answers.is_some() {
                    record.answers = details.answers;
                }
                if let Some(notes) = details.notes {
                    record.notes = Some(notes).filter(|n| !n.trim().is_empty());
                }
            }
            ScheduleProgressChange::Uncomplete => {
                record.completed = false;
                record.completed_at = None;
            }
            ScheduleProgressChange::SetTime(minutes) => {
                record.time_spent_minutes = minutes;
            }
            ScheduleProgressChange::SetNotes(notes) => {
                record.notes = Some(notes).filter(|n| !n.trim().is_empty());
            }
        }
        record.updated_at = now;
        Some(record)
    }

    #[must_use]
    pub fn key(&self) -> ScheduleProgressKey {
        self.key
    }

    #[must_use]
    pub fn activity_id(&self) -> ActivityId {
        self.key.activity_id
    }

    #[must_use]
    pub fn day(&self) -> DayOfWeek {
        self.day
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.completed
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
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

/// `round(100 * completed / total)`; the caller supplies `total`.
#[must_use]
pub fn completion_percentage(completed: usize, total: usize) -> u8 {
    completion_percent(completed, total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;
    use chrono::Duration;

    fn key() -> ScheduleProgressKey {
        ScheduleProgressKey::new(StudentId::new(1), ScheduleId::new(2), ActivityId::new(3))
    }

    fn complete(existing: Option<ScheduleActivityProgress>) -> ScheduleActivityProgress {
        ScheduleActivityProgress::apply(
            existing,
            key(),
            DayOfWeek::Monday,
            ScheduleProgressChange::Complete(ScheduleCompletion {
                time_spent_minutes: Some(12),
                answers: None,
                notes: Some("feito".into()),
            }),
            fixed_now(),
        )
        .unwrap()
    }

    #[test]
    fn complete_inserts_when_missing() {
        let record = complete(None);
        assert!(record.is_completed());
        assert_eq!(record.completed_at(), Some(fixed_now()));
        assert_eq!(record.time_spent_minutes(), 12);
        assert_eq!(record.notes(), Some("feito"));
    }

    #[test]
    fn uncomplete_clears_completion_and_keeps_day() {
        let record = complete(None);
        let later = fixed_now() + Duration::hours(1);
        let undone = ScheduleActivityProgress::apply(
            Some(record),
            key(),
            DayOfWeek::Friday,
            ScheduleProgressChange::Uncomplete,
            later,
        )
        .unwrap();
        assert!(!undone.is_completed());
        assert!(undone.completed_at().is_none());
        assert_eq!(undone.day(), DayOfWeek::Monday);
        assert_eq!(undone.time_spent_minutes(), 12);
    }

    #[test]
    fn uncomplete_without_record_is_noop() {
        let out = ScheduleActivityProgress::apply(
            None,
            key(),
            DayOfWeek::Monday,
            ScheduleProgressChange::Uncomplete,
            fixed_now(),
        );
        assert!(out.is_none());
    }

    #[test]
    fn time_and_notes_both_upsert_stubs() {
        let timed = ScheduleActivityProgress::apply(
            None,
            key(),
            DayOfWeek::Monday,
            ScheduleProgressChange::SetTime(30),
            fixed_now(),
        )
        .unwrap();
        assert!(!timed.is_completed());
        assert_eq!(timed.time_spent_minutes(), 30);

        let noted = ScheduleActivityProgress::apply(
            None,
            key(),
            DayOfWeek::Monday,
            ScheduleProgressChange::SetNotes("obs".into()),
            fixed_now(),
        )
        .unwrap();
        assert!(!noted.is_completed());
        assert!(noted.completed_at().is_none());
        assert_eq!(noted.notes(), Some("obs"));
    }

    #[test]
    fn recompleting_keeps_prior_details_not_overridden() {
        let first = complete(None);
        let again = ScheduleActivityProgress::apply(
            Some(first),
            key(),
            DayOfWeek::Monday,
            ScheduleProgressChange::Complete(ScheduleCompletion::default()),
            fixed_now(),
        )
        .unwrap();
        assert_eq!(again.time_spent_minutes(), 12);
        assert_eq!(again.notes(), Some("feito"));
    }

    #[test]
    fn persisted_record_must_be_consistent() {
        let err = ScheduleActivityProgress::from_persisted(
            key(),
            DayOfWeek::Monday,
            true,
            None,
            0,
            None,
            None,
            fixed_now(),
        )
        .unwrap_err();
        assert_eq!(err, ScheduleProgressError::InconsistentCompletion);
    }

    #[test]
    fn three_of_ten_is_thirty_percent() {
        assert_eq!(completion_percentage(3, 10), 30);
        assert_eq!(completion_percentage(0, 0), 0);
    }
}
