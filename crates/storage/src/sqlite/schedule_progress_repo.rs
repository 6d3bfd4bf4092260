use chrono::{DateTime, Utc};
use nexus_core::model::{
    DayOfWeek, ScheduleActivityProgress, ScheduleId, ScheduleProgressChange, ScheduleProgressKey,
    StudentId,
};
use sqlx::SqliteConnection;

use super::{
    SqliteRepository,
    mapping::{answers_to_json, db, id_to_i64, map_schedule_progress_row},
};
use crate::repository::{ScheduleProgressRepository, StorageError};

const PROGRESS_COLUMNS: &str = r"
    student_id, schedule_id, activity_id, day, completed, completed_at,
    time_spent, answers, notes, updated_at
";

async fn fetch_progress(
    conn: &mut SqliteConnection,
    key: ScheduleProgressKey,
) -> Result<Option<ScheduleActivityProgress>, StorageError> {
    let row = sqlx::query(&format!(
        r"
            SELECT {PROGRESS_COLUMNS}
            FROM schedule_progress
            WHERE student_id = ?1 AND schedule_id = ?2 AND activity_id = ?3
        "
    ))
    .bind(id_to_i64("student_id", key.student_id.value())?)
    .bind(id_to_i64("schedule_id", key.schedule_id.value())?)
    .bind(id_to_i64("activity_id", key.activity_id.value())?)
    .fetch_optional(&mut *conn)
    .await
    .map_err(db)?;

    row.as_ref().map(map_schedule_progress_row).transpose()
}

async fn write_progress(
    conn: &mut SqliteConnection,
    record: &ScheduleActivityProgress,
) -> Result<(), StorageError> {
    let key = record.key();

    sqlx::query(&format!(
        r"
            INSERT INTO schedule_progress ({PROGRESS_COLUMNS})
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(student_id, schedule_id, activity_id) DO UPDATE SET
                day = excluded.day,
                completed = excluded.completed,
                completed_at = excluded.completed_at,
                time_spent = excluded.time_spent,
                answers = excluded.answers,
                notes = excluded.notes,
                updated_at = excluded.updated_at
        "
    ))
    .bind(id_to_i64("student_id", key.student_id.value())?)
    .bind(id_to_i64("schedule_id", key.schedule_id.value())?)
    .bind(id_to_i64("activity_id", key.activity_id.value())?)
    .bind(record.day().as_str())
    .bind(i64::from(record.is_completed()))
    .bind(record.completed_at())
    .bind(i64::from(record.time_spent_minutes()))
    .bind(answers_to_json(record.answers())?)
    .bind(record.notes())
    .bind(record.updated_at())
    .execute(&mut *conn)
    .await
    .map_err(db)?;

    Ok(())
}

#[async_trait::async_trait]
impl ScheduleProgressRepository for SqliteRepository {
    async fn apply_schedule_change(
        &self,
        key: ScheduleProgressKey,
        day: DayOfWeek,
        change: ScheduleProgressChange,
        now: DateTime<Utc>,
    ) -> Result<Option<ScheduleActivityProgress>, StorageError> {
        let mut tx = self.pool.begin().await.map_err(db)?;

        let existing = fetch_progress(&mut tx, key).await?;
        let Some(updated) = ScheduleActivityProgress::apply(existing, key, day, change, now) else {
            return Ok(None);
        };
        write_progress(&mut tx, &updated).await?;

        tx.commit().await.map_err(db)?;
        Ok(Some(updated))
    }

    async fn get_schedule_progress(
        &self,
        key: ScheduleProgressKey,
    ) -> Result<Option<ScheduleActivityProgress>, StorageError> {
        let mut conn = self.pool.acquire().await.map_err(db)?;
        fetch_progress(&mut conn, key).await
    }

    async fn progress_for_schedule(
        &self,
        student: StudentId,
        schedule: ScheduleId,
    ) -> Result<Vec<ScheduleActivityProgress>, StorageError> {
        let rows = sqlx::query(&format!(
            r"
                SELECT {PROGRESS_COLUMNS}
                FROM schedule_progress
                WHERE student_id = ?1 AND schedule_id = ?2
                ORDER BY activity_id
            "
        ))
        .bind(id_to_i64("student_id", student.value())?)
        .bind(id_to_i64("schedule_id", schedule.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;

        rows.iter().map(map_schedule_progress_row).collect()
    }

    async fn progress_for_student(
        &self,
        student: StudentId,
    ) -> Result<Vec<ScheduleActivityProgress>, StorageError> {
        let rows = sqlx::query(&format!(
            r"
                SELECT {PROGRESS_COLUMNS}
                FROM schedule_progress
                WHERE student_id = ?1
                ORDER BY completed_at DESC,
                         schedule_id, activity_id
            "
        ))
        .bind(id_to_i64("student_id", student.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;

        rows.iter().map(map_schedule_progress_row).collect()
    }
}
