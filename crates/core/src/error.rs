use thiserror::Error;

use crate::model::{
    ActivityError, AssignmentError, DayParseError, ProgramError, ScheduleError,
    ScheduleProgressError, StudentActivityError, StudentError,
};

/// Umbrella over the domain validation errors, for callers that do not care
/// which entity rejected the input.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Activity(#[from] ActivityError),
    #[error(transparent)]
    Program(#[from] ProgramError),
    #[error(transparent)]
    Student(#[from] StudentError),
    #[error(transparent)]
    Assignment(#[from] AssignmentError),
    #[error(transparent)]
    StudentActivity(#[from] StudentActivityError),
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
    #[error(transparent)]
    ScheduleProgress(#[from] ScheduleProgressError),
    #[error(transparent)]
    Day(#[from] DayParseError),
}
