use nexus_core::model::{ActivityId, ProgramId, StudentActivity, StudentId};
use sqlx::SqliteConnection;

use super::{
    SqliteRepository,
    assignment_repo::{find_active_in, write_assignment},
    mapping::{answers_to_json, db, id_to_i64, map_student_activity_row},
};
use crate::repository::{
    CompletionCommit, CompletionOutcome, ProgressPersistence, StorageError,
    StudentActivityRepository,
};

const RECORD_COLUMNS: &str = r"
    student_id, activity_id, program_id, module_id, status, started_at,
    completed_at, time_spent, answers, notes, points_earned, updated_at
";

async fn fetch_record(
    conn: &mut SqliteConnection,
    student: StudentId,
    activity: ActivityId,
) -> Result<Option<StudentActivity>, StorageError> {
    let row = sqlx::query(&format!(
        "SELECT {RECORD_COLUMNS} FROM student_activities WHERE student_id = ?1 AND activity_id = ?2"
    ))
    .bind(id_to_i64("student_id", student.value())?)
    .bind(id_to_i64("activity_id", activity.value())?)
    .fetch_optional(&mut *conn)
    .await
    .map_err(db)?;

    row.as_ref().map(map_student_activity_row).transpose()
}

async fn write_record(
    conn: &mut SqliteConnection,
    record: &StudentActivity,
) -> Result<(), StorageError> {
    let activity = record.activity();

    sqlx::query(&format!(
        r"
            INSERT INTO student_activities ({RECORD_COLUMNS})
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            ON CONFLICT(student_id, activity_id) DO UPDATE SET
                program_id = excluded.program_id,
                module_id = excluded.module_id,
                status = excluded.status,
                started_at = excluded.started_at,
                completed_at = excluded.completed_at,
                time_spent = excluded.time_spent,
                answers = excluded.answers,
                notes = excluded.notes,
                points_earned = excluded.points_earned,
                updated_at = excluded.updated_at
        "
    ))
    .bind(id_to_i64("student_id", record.student_id().value())?)
    .bind(id_to_i64("activity_id", activity.activity_id.value())?)
    .bind(id_to_i64("program_id", activity.program_id.value())?)
    .bind(id_to_i64("module_id", activity.module_id.value())?)
    .bind(record.status().as_str())
    .bind(record.started_at())
    .bind(record.completed_at())
    .bind(i64::from(record.time_spent_minutes()))
    .bind(answers_to_json(record.answers())?)
    .bind(record.notes())
    .bind(record.points_earned().map(i64::from))
    .bind(record.updated_at())
    .execute(&mut *conn)
    .await
    .map_err(db)?;

    Ok(())
}

#[async_trait::async_trait]
impl StudentActivityRepository for SqliteRepository {
    async fn get_student_activity(
        &self,
        student: StudentId,
        activity: ActivityId,
    ) -> Result<Option<StudentActivity>, StorageError> {
        let mut conn = self.pool.acquire().await.map_err(db)?;
        fetch_record(&mut conn, student, activity).await
    }

    async fn upsert_student_activity(&self, record: &StudentActivity) -> Result<(), StorageError> {
        let mut conn = self.pool.acquire().await.map_err(db)?;
        write_record(&mut conn, record).await
    }

    async fn activities_for_program(
        &self,
        student: StudentId,
        program: ProgramId,
    ) -> Result<Vec<StudentActivity>, StorageError> {
        let rows = sqlx::query(&format!(
            r"
                SELECT {RECORD_COLUMNS}
                FROM student_activities
                WHERE student_id = ?1 AND program_id = ?2
                ORDER BY activity_id
            "
        ))
        .bind(id_to_i64("student_id", student.value())?)
        .bind(id_to_i64("program_id", program.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;

        rows.iter().map(map_student_activity_row).collect()
    }
}

#[async_trait::async_trait]
impl ProgressPersistence for SqliteRepository {
    async fn commit_completion(
        &self,
        commit: CompletionCommit,
    ) -> Result<CompletionOutcome, StorageError> {
        let record = commit.record;
        let student = record.student_id();
        let student_id = id_to_i64("student_id", student.value())?;

        // Dropping the transaction on an early return rolls it back.
        let mut tx = self.pool.begin().await.map_err(db)?;

        if fetch_record(&mut tx, student, record.activity_id())
            .await?
            .is_some_and(|existing| existing.status().is_done())
        {
            return Err(StorageError::Conflict);
        }

        let points = i64::from(record.points_earned().unwrap_or(0));
        let total_points: Option<i64> = sqlx::query_scalar(
            r"
                UPDATE students
                SET total_points = total_points + ?2
                WHERE id = ?1
                RETURNING total_points
            ",
        )
        .bind(student_id)
        .bind(points)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db)?;
        let total_points = total_points.ok_or(StorageError::NotFound)?;
        let total_points = u64::try_from(total_points)
            .map_err(|_| StorageError::Serialization("total_points sign overflow".into()))?;

        let assignment =
            match find_active_in(&mut tx, student, record.activity().program_id).await? {
                Some(mut assignment) => {
                    assignment
                        .record_completion(record.activity_id(), commit.program_total)
                        .map_err(|_| StorageError::Conflict)?;
                    write_assignment(&mut tx, &assignment).await?;
                    Some(assignment)
                }
                None => None,
            };

        write_record(&mut tx, &record).await?;
        tx.commit().await.map_err(db)?;

        tracing::debug!(
            student = %student,
            activity = %record.activity_id(),
            total_points,
            "activity completion committed"
        );

        Ok(CompletionOutcome {
            assignment,
            total_points,
        })
    }
}
