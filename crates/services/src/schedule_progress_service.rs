use std::collections::BTreeMap;
use std::sync::Arc;

use nexus_core::model::{
    ActivityId, DayOfWeek, Identity, ScheduleActivityProgress, ScheduleCompletion, ScheduleId,
    ScheduleProgressChange, ScheduleProgressKey, StudentId, WeeklySchedule, completion_percentage,
};
use serde::Serialize;
use storage::repository::{ScheduleProgressRepository, ScheduleRepository, StorageError};

use crate::Clock;
use crate::error::ScheduleProgressServiceError;

/// Completion stats of one student on one weekly schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduleSummary {
    pub schedule_id: ScheduleId,
    pub completed: usize,
    pub total: usize,
    pub percent: u8,
    pub minutes_spent: u64,
}

/// Tracks recurring weekly-schedule activities. Unlike program activities,
/// completion here is reversible.
#[derive(Clone)]
pub struct ScheduleProgressService {
    clock: Clock,
    schedules: Arc<dyn ScheduleRepository>,
    progress: Arc<dyn ScheduleProgressRepository>,
}

impl ScheduleProgressService {
    #[must_use]
    pub fn new(
        clock: Clock,
        schedules: Arc<dyn ScheduleRepository>,
        progress: Arc<dyn ScheduleProgressRepository>,
    ) -> Self {
        Self {
            clock,
            schedules,
            progress,
        }
    }

    /// Mark a scheduled activity done on `day`, creating the record if needed.
    ///
    /// # Errors
    ///
    /// Returns `NotAuthenticated` before any store access, `ScheduleNotFound`,
    /// `ActivityNotScheduled`, `WrongDay` when `day` is not the activity's
    /// day, `Activity` for answers of another type, or `Storage`.
    pub async fn complete_activity(
        &self,
        identity: &Identity,
        schedule_id: ScheduleId,
        activity_id: ActivityId,
        day: DayOfWeek,
        details: ScheduleCompletion,
    ) -> Result<ScheduleActivityProgress, ScheduleProgressServiceError> {
        let student_id = require_student(identity)?;
        let schedule = self.load(schedule_id).await?;
        let Some((scheduled_day, definition)) = schedule.find_activity(activity_id) else {
            return Err(ScheduleProgressServiceError::ActivityNotScheduled {
                activity: activity_id,
                schedule: schedule_id,
            });
        };
        if scheduled_day != day {
            return Err(ScheduleProgressServiceError::WrongDay {
                activity: activity_id,
                expected: scheduled_day,
                found: day,
            });
        }
        if let Some(answers) = &details.answers {
            answers.check_type(definition.activity_type)?;
        }

        let record = self
            .write(
                student_id,
                schedule_id,
                activity_id,
                day,
                ScheduleProgressChange::Complete(details),
            )
            .await?
            .ok_or(StorageError::NotFound)?;
        tracing::info!(
            student = %student_id,
            schedule = %schedule_id,
            activity = %activity_id,
            day = %day,
            "schedule activity completed"
        );
        Ok(record)
    }

    /// Clear completion. Returns `None` when no record existed (nothing is
    /// written in that case).
    ///
    /// # Errors
    ///
    /// Returns `NotAuthenticated`, `ScheduleNotFound`,
    /// `ActivityNotScheduled`, or `Storage`.
    pub async fn uncomplete_activity(
        &self,
        identity: &Identity,
        schedule_id: ScheduleId,
        activity_id: ActivityId,
    ) -> Result<Option<ScheduleActivityProgress>, ScheduleProgressServiceError> {
        let student_id = require_student(identity)?;
        let day = self.scheduled_day(schedule_id, activity_id).await?;
        let record = self
            .write(
                student_id,
                schedule_id,
                activity_id,
                day,
                ScheduleProgressChange::Uncomplete,
            )
            .await?;
        tracing::info!(
            student = %student_id,
            schedule = %schedule_id,
            activity = %activity_id,
            existed = record.is_some(),
            "schedule activity uncompleted"
        );
        Ok(record)
    }

    /// Overwrite the minutes spent, creating the record if needed.
    ///
    /// # Errors
    ///
    /// Returns `NotAuthenticated`, `ScheduleNotFound`,
    /// `ActivityNotScheduled`, or `Storage`.
    pub async fn update_activity_time(
        &self,
        identity: &Identity,
        schedule_id: ScheduleId,
        activity_id: ActivityId,
        minutes: u32,
    ) -> Result<ScheduleActivityProgress, ScheduleProgressServiceError> {
        let student_id = require_student(identity)?;
        let day = self.scheduled_day(schedule_id, activity_id).await?;
        let record = self
            .write(
                student_id,
                schedule_id,
                activity_id,
                day,
                ScheduleProgressChange::SetTime(minutes),
            )
            .await?
            .ok_or(StorageError::NotFound)?;
        tracing::debug!(activity = %activity_id, minutes, "schedule activity time updated");
        Ok(record)
    }

    /// Replace the notes, creating the record if needed. Blank notes clear
    /// them.
    ///
    /// # Errors
    ///
    /// Returns `NotAuthenticated`, `ScheduleNotFound`,
    /// `ActivityNotScheduled`, or `Storage`.
    pub async fn add_activity_notes(
        &self,
        identity: &Identity,
        schedule_id: ScheduleId,
        activity_id: ActivityId,
        notes: String,
    ) -> Result<ScheduleActivityProgress, ScheduleProgressServiceError> {
        let student_id = require_student(identity)?;
        let day = self.scheduled_day(schedule_id, activity_id).await?;
        let record = self
            .write(
                student_id,
                schedule_id,
                activity_id,
                day,
                ScheduleProgressChange::SetNotes(notes),
            )
            .await?
            .ok_or(StorageError::NotFound)?;
        tracing::debug!(activity = %activity_id, "schedule activity notes updated");
        Ok(record)
    }

    /// Records of one schedule keyed by activity.
    ///
    /// # Errors
    ///
    /// Returns `ScheduleProgressServiceError::Storage` if repository access
    /// fails.
    pub async fn get_student_schedule_progress(
        &self,
        student_id: StudentId,
        schedule_id: ScheduleId,
    ) -> Result<BTreeMap<ActivityId, ScheduleActivityProgress>, ScheduleProgressServiceError>
    {
        Ok(self
            .progress
            .progress_for_schedule(student_id, schedule_id)
            .await?
            .into_iter()
            .map(|r| (r.activity_id(), r))
            .collect())
    }

    /// Every record of the student across schedules, most recently completed
    /// first.
    ///
    /// # Errors
    ///
    /// Returns `ScheduleProgressServiceError::Storage` if repository access
    /// fails.
    pub async fn get_student_overall_progress(
        &self,
        student_id: StudentId,
    ) -> Result<Vec<ScheduleActivityProgress>, ScheduleProgressServiceError> {
        Ok(self.progress.progress_for_student(student_id).await?)
    }

    /// `round(100 * completed / total)` with a caller-supplied total; 0 when
    /// `total` is 0.
    #[must_use]
    pub fn completion_percentage(completed: usize, total: usize) -> u8 {
        completion_percentage(completed, total)
    }

    /// Completion stats using the schedule's own activity count. Records for
    /// activities no longer in the schedule are ignored.
    ///
    /// # Errors
    ///
    /// Returns `ScheduleNotFound` or `Storage`.
    pub async fn schedule_summary(
        &self,
        student_id: StudentId,
        schedule_id: ScheduleId,
    ) -> Result<ScheduleSummary, ScheduleProgressServiceError> {
        let schedule = self.load(schedule_id).await?;
        let records: Vec<ScheduleActivityProgress> = self
            .progress
            .progress_for_schedule(student_id, schedule_id)
            .await?
            .into_iter()
            .filter(|r| schedule.day_of(r.activity_id()).is_some())
            .collect();

        let completed = records.iter().filter(|r| r.is_completed()).count();
        let total = schedule.total_activities();
        let minutes_spent = records
            .iter()
            .map(|r| u64::from(r.time_spent_minutes()))
            .sum();

        Ok(ScheduleSummary {
            schedule_id,
            completed,
            total,
            percent: completion_percentage(completed, total),
            minutes_spent,
        })
    }

    async fn load(
        &self,
        schedule_id: ScheduleId,
    ) -> Result<WeeklySchedule, ScheduleProgressServiceError> {
        self.schedules
            .get_schedule(schedule_id)
            .await?
            .ok_or(ScheduleProgressServiceError::ScheduleNotFound(schedule_id))
    }

    async fn scheduled_day(
        &self,
        schedule_id: ScheduleId,
        activity_id: ActivityId,
    ) -> Result<DayOfWeek, ScheduleProgressServiceError> {
        self.load(schedule_id)
            .await?
            .day_of(activity_id)
            .ok_or(ScheduleProgressServiceError::ActivityNotScheduled {
                activity: activity_id,
                schedule: schedule_id,
            })
    }

    async fn write(
        &self,
        student_id: StudentId,
        schedule_id: ScheduleId,
        activity_id: ActivityId,
        day: DayOfWeek,
        change: ScheduleProgressChange,
    ) -> Result<Option<ScheduleActivityProgress>, ScheduleProgressServiceError> {
        let key = ScheduleProgressKey::new(student_id, schedule_id, activity_id);
        Ok(self
            .progress
            .apply_schedule_change(key, day, change, self.clock.now())
            .await?)
    }
}

fn require_student(identity: &Identity) -> Result<StudentId, ScheduleProgressServiceError> {
    identity
        .student_id()
        .ok_or(ScheduleProgressServiceError::NotAuthenticated)
}
