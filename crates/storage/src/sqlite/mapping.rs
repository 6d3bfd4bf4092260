use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use nexus_core::model::{
    ActivityAnswers, ActivityId, ActivityRef, ActivityStatus, Assignment, AssignmentId,
    AssignmentStatus, DayOfWeek, ModuleId, ProfessionalId, ProgramId, ScheduleActivityProgress,
    ScheduleId, ScheduleProgressKey, Student, StudentActivity, StudentId,
};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn db(e: sqlx::Error) -> StorageError {
    tracing::warn!(error = %e, "sqlite query failed");
    StorageError::Connection(e.to_string())
}

pub(crate) fn id_to_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

fn i64_to_u32(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

fn get_u64(row: &SqliteRow, field: &'static str) -> Result<u64, StorageError> {
    i64_to_u64(field, row.try_get::<i64, _>(field).map_err(ser)?)
}

fn get_u32(row: &SqliteRow, field: &'static str) -> Result<u32, StorageError> {
    i64_to_u32(field, row.try_get::<i64, _>(field).map_err(ser)?)
}

pub(crate) fn answers_to_json(
    answers: Option<&ActivityAnswers>,
) -> Result<Option<String>, StorageError> {
    answers.map(serde_json::to_string).transpose().map_err(ser)
}

fn answers_from_json(raw: Option<String>) -> Result<Option<ActivityAnswers>, StorageError> {
    raw.as_deref()
        .map(serde_json::from_str)
        .transpose()
        .map_err(ser)
}

pub(crate) fn activity_set_to_json(set: &BTreeSet<ActivityId>) -> Result<String, StorageError> {
    serde_json::to_string(set).map_err(ser)
}

pub(crate) fn map_assignment_row(row: &SqliteRow) -> Result<Assignment, StorageError> {
    let status: String = row.try_get("status").map_err(ser)?;
    let progress = u8::try_from(row.try_get::<i64, _>("progress").map_err(ser)?)
        .map_err(|_| StorageError::Serialization("progress overflow".into()))?;
    let completed: String = row.try_get("completed_activities").map_err(ser)?;
    let completed: BTreeSet<ActivityId> = serde_json::from_str(&completed).map_err(ser)?;
    let assigned_by = row
        .try_get::<Option<i64>, _>("assigned_by")
        .map_err(ser)?
        .map(|v| i64_to_u64("assigned_by", v).map(ProfessionalId::new))
        .transpose()?;

    Assignment::from_persisted(
        AssignmentId::new(get_u64(row, "id")?),
        StudentId::new(get_u64(row, "student_id")?),
        ProgramId::new(get_u64(row, "program_id")?),
        assigned_by,
        row.try_get("assigned_at").map_err(ser)?,
        AssignmentStatus::parse(&status).map_err(ser)?,
        progress,
        completed,
    )
    .map_err(ser)
}

pub(crate) fn map_student_activity_row(row: &SqliteRow) -> Result<StudentActivity, StorageError> {
    let status: String = row.try_get("status").map_err(ser)?;
    let points_earned = row
        .try_get::<Option<i64>, _>("points_earned")
        .map_err(ser)?
        .map(|v| i64_to_u32("points_earned", v))
        .transpose()?;
    let completed_at: Option<DateTime<Utc>> = row.try_get("completed_at").map_err(ser)?;

    StudentActivity::from_persisted(
        StudentId::new(get_u64(row, "student_id")?),
        ActivityRef::new(
            ProgramId::new(get_u64(row, "program_id")?),
            ModuleId::new(get_u64(row, "module_id")?),
            ActivityId::new(get_u64(row, "activity_id")?),
        ),
        ActivityStatus::parse(&status).map_err(ser)?,
        row.try_get("started_at").map_err(ser)?,
        completed_at,
        get_u32(row, "time_spent")?,
        answers_from_json(row.try_get("answers").map_err(ser)?)?,
        row.try_get("notes").map_err(ser)?,
        points_earned,
        row.try_get("updated_at").map_err(ser)?,
    )
    .map_err(ser)
}

pub(crate) fn map_schedule_progress_row(
    row: &SqliteRow,
) -> Result<ScheduleActivityProgress, StorageError> {
    let day: String = row.try_get("day").map_err(ser)?;
    let completed = row.try_get::<i64, _>("completed").map_err(ser)? != 0;

    ScheduleActivityProgress::from_persisted(
        ScheduleProgressKey::new(
            StudentId::new(get_u64(row, "student_id")?),
            ScheduleId::new(get_u64(row, "schedule_id")?),
            ActivityId::new(get_u64(row, "activity_id")?),
        ),
        DayOfWeek::parse(&day).map_err(ser)?,
        completed,
        row.try_get("completed_at").map_err(ser)?,
        get_u32(row, "time_spent")?,
        answers_from_json(row.try_get("answers").map_err(ser)?)?,
        row.try_get("notes").map_err(ser)?,
        row.try_get("updated_at").map_err(ser)?,
    )
    .map_err(ser)
}

pub(crate) fn map_student_row(
    row: &SqliteRow,
    assigned_programs: BTreeSet<ProgramId>,
) -> Result<Student, StorageError> {
    Student::from_persisted(
        StudentId::new(get_u64(row, "id")?),
        row.try_get::<String, _>("name").map_err(ser)?,
        assigned_programs,
        get_u64(row, "total_points")?,
        get_u32(row, "streak")?,
        get_u32(row, "level")?,
        row.try_get::<i64, _>("active").map_err(ser)? != 0,
        row.try_get("created_at").map_err(ser)?,
    )
    .map_err(ser)
}

pub(crate) fn program_id_from_row(
    row: &SqliteRow,
    field: &'static str,
) -> Result<ProgramId, StorageError> {
    Ok(ProgramId::new(get_u64(row, field)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_ids_are_rejected() {
        assert!(matches!(
            i64_to_u64("student_id", -1),
            Err(StorageError::Serialization(_))
        ));
        assert!(id_to_i64("student_id", u64::MAX).is_err());
    }

    #[test]
    fn answers_json_round_trips_tagged_variant() {
        let answers = ActivityAnswers::text("olá");
        let json = answers_to_json(Some(&answers)).unwrap().unwrap();
        assert!(json.contains("\"type\":\"text\""));
        assert_eq!(answers_from_json(Some(json)).unwrap(), Some(answers));
        assert_eq!(answers_from_json(None).unwrap(), None);
    }
}
