use std::collections::BTreeSet;

use nexus_core::model::{ProgramId, Student, StudentId};
use sqlx::SqliteConnection;

use super::{
    SqliteRepository,
    mapping::{db, id_to_i64, map_student_row, program_id_from_row},
};
use crate::repository::{StorageError, StudentRepository};

pub(super) async fn fetch_student(
    conn: &mut SqliteConnection,
    id: StudentId,
) -> Result<Option<Student>, StorageError> {
    let id = id_to_i64("student_id", id.value())?;
    let Some(row) = sqlx::query(
        r"
            SELECT id, name, total_points, streak, level, active, created_at
            FROM students
            WHERE id = ?1
        ",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(db)?
    else {
        return Ok(None);
    };

    let program_rows = sqlx::query(
        "SELECT program_id FROM student_programs WHERE student_id = ?1 ORDER BY program_id",
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await
    .map_err(db)?;

    let mut programs = BTreeSet::new();
    for row in &program_rows {
        programs.insert(program_id_from_row(row, "program_id")?);
    }
    map_student_row(&row, programs).map(Some)
}

#[async_trait::async_trait]
impl StudentRepository for SqliteRepository {
    async fn upsert_student(&self, student: &Student) -> Result<(), StorageError> {
        let id = id_to_i64("student_id", student.id().value())?;
        let total_points = id_to_i64("total_points", student.total_points())?;

        let mut tx = self.pool.begin().await.map_err(db)?;
        sqlx::query(
            r"
                INSERT INTO students (id, name, total_points, streak, level, active, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    total_points = excluded.total_points,
                    streak = excluded.streak,
                    level = excluded.level,
                    active = excluded.active
            ",
        )
        .bind(id)
        .bind(student.name())
        .bind(total_points)
        .bind(i64::from(student.streak()))
        .bind(i64::from(student.level()))
        .bind(i64::from(student.is_active()))
        .bind(student.created_at())
        .execute(&mut *tx)
        .await
        .map_err(db)?;

        sqlx::query("DELETE FROM student_programs WHERE student_id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(db)?;
        for program in student.assigned_programs() {
            sqlx::query("INSERT INTO student_programs (student_id, program_id) VALUES (?1, ?2)")
                .bind(id)
                .bind(id_to_i64("program_id", program.value())?)
                .execute(&mut *tx)
                .await
                .map_err(db)?;
        }

        tx.commit().await.map_err(db)?;
        Ok(())
    }

    async fn get_student(&self, id: StudentId) -> Result<Option<Student>, StorageError> {
        let mut conn = self.pool.acquire().await.map_err(db)?;
        fetch_student(&mut conn, id).await
    }

    async fn add_assigned_program(
        &self,
        id: StudentId,
        program: ProgramId,
    ) -> Result<(), StorageError> {
        let student = id_to_i64("student_id", id.value())?;
        let mut tx = self.pool.begin().await.map_err(db)?;

        let exists = sqlx::query("SELECT 1 FROM students WHERE id = ?1")
            .bind(student)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db)?;
        if exists.is_none() {
            return Err(StorageError::NotFound);
        }

        sqlx::query(
            r"
                INSERT INTO student_programs (student_id, program_id)
                VALUES (?1, ?2)
                ON CONFLICT(student_id, program_id) DO NOTHING
            ",
        )
        .bind(student)
        .bind(id_to_i64("program_id", program.value())?)
        .execute(&mut *tx)
        .await
        .map_err(db)?;

        tx.commit().await.map_err(db)?;
        Ok(())
    }
}
