use nexus_core::model::{Assignment, AssignmentId, AssignmentStatus, ProgramId, StudentId};
use sqlx::SqliteConnection;

use super::{
    SqliteRepository,
    mapping::{activity_set_to_json, db, id_to_i64, map_assignment_row},
};
use crate::repository::{AssignmentRepository, NewAssignmentRecord, StorageError};

const ASSIGNMENT_COLUMNS: &str =
    "id, student_id, program_id, assigned_by, assigned_at, status, progress, completed_activities";

pub(super) async fn find_active_in(
    conn: &mut SqliteConnection,
    student: StudentId,
    program: ProgramId,
) -> Result<Option<Assignment>, StorageError> {
    let row = sqlx::query(&format!(
        r"
            SELECT {ASSIGNMENT_COLUMNS}
            FROM assignments
            WHERE student_id = ?1 AND program_id = ?2 AND status = ?3
            ORDER BY assigned_at DESC, id DESC
            LIMIT 1
        "
    ))
    .bind(id_to_i64("student_id", student.value())?)
    .bind(id_to_i64("program_id", program.value())?)
    .bind(AssignmentStatus::Active.as_str())
    .fetch_optional(&mut *conn)
    .await
    .map_err(db)?;

    row.as_ref().map(map_assignment_row).transpose()
}

/// Overwrites the mutable columns. Returns `NotFound` when no row matched.
pub(super) async fn write_assignment(
    conn: &mut SqliteConnection,
    assignment: &Assignment,
) -> Result<(), StorageError> {
    let res = sqlx::query(
        r"
            UPDATE assignments
            SET status = ?2, progress = ?3, completed_activities = ?4
            WHERE id = ?1
        ",
    )
    .bind(id_to_i64("assignment_id", assignment.id().value())?)
    .bind(assignment.status().as_str())
    .bind(i64::from(assignment.progress()))
    .bind(activity_set_to_json(assignment.completed_activities())?)
    .execute(&mut *conn)
    .await
    .map_err(db)?;

    if res.rows_affected() == 0 {
        return Err(StorageError::NotFound);
    }
    Ok(())
}

#[async_trait::async_trait]
impl AssignmentRepository for SqliteRepository {
    async fn insert_new_assignment(
        &self,
        record: NewAssignmentRecord,
    ) -> Result<AssignmentId, StorageError> {
        let assigned_by = record
            .assigned_by
            .map(|p| id_to_i64("assigned_by", p.value()))
            .transpose()?;

        let res = sqlx::query(
            r"
                INSERT INTO assignments (
                    student_id, program_id, assigned_by, assigned_at,
                    status, progress, completed_activities
                )
                VALUES (?1, ?2, ?3, ?4, ?5, 0, '[]')
            ",
        )
        .bind(id_to_i64("student_id", record.student_id.value())?)
        .bind(id_to_i64("program_id", record.program_id.value())?)
        .bind(assigned_by)
        .bind(record.assigned_at)
        .bind(AssignmentStatus::Active.as_str())
        .execute(&self.pool)
        .await
        .map_err(db)?;

        let id = u64::try_from(res.last_insert_rowid())
            .map_err(|_| StorageError::Serialization("assignment_id sign overflow".into()))?;
        Ok(AssignmentId::new(id))
    }

    async fn get_assignment(&self, id: AssignmentId) -> Result<Option<Assignment>, StorageError> {
        let row = sqlx::query(&format!(
            "SELECT {ASSIGNMENT_COLUMNS} FROM assignments WHERE id = ?1"
        ))
        .bind(id_to_i64("assignment_id", id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(db)?;

        row.as_ref().map(map_assignment_row).transpose()
    }

    async fn update_assignment(&self, assignment: &Assignment) -> Result<(), StorageError> {
        let mut conn = self.pool.acquire().await.map_err(db)?;
        write_assignment(&mut conn, assignment).await
    }

    async fn active_assignments(
        &self,
        student: StudentId,
    ) -> Result<Vec<Assignment>, StorageError> {
        let rows = sqlx::query(&format!(
            r"
                SELECT {ASSIGNMENT_COLUMNS}
                FROM assignments
                WHERE student_id = ?1 AND status = ?2
                ORDER BY assigned_at DESC, id DESC
            "
        ))
        .bind(id_to_i64("student_id", student.value())?)
        .bind(AssignmentStatus::Active.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;

        rows.iter().map(map_assignment_row).collect()
    }

    async fn find_active_assignment(
        &self,
        student: StudentId,
        program: ProgramId,
    ) -> Result<Option<Assignment>, StorageError> {
        let mut conn = self.pool.acquire().await.map_err(db)?;
        find_active_in(&mut conn, student, program).await
    }
}
