use nexus_core::model::{ProfessionalId, Program, ProgramId, ScheduleId, StudentId, WeeklySchedule};
use serde::de::DeserializeOwned;
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use super::{
    SqliteRepository,
    mapping::{db, id_to_i64, ser},
};
use crate::repository::{ProgramRepository, ScheduleRepository, StorageError};

// Programs and schedules are authored as whole documents; the body column
// holds the JSON and the scalar columns exist for lookups.
fn body_from_row<T: DeserializeOwned>(row: &SqliteRow) -> Result<T, StorageError> {
    let body: String = row.try_get("body").map_err(ser)?;
    serde_json::from_str(&body).map_err(ser)
}

#[async_trait::async_trait]
impl ProgramRepository for SqliteRepository {
    async fn upsert_program(&self, program: &Program) -> Result<(), StorageError> {
        let body = serde_json::to_string(program).map_err(ser)?;

        sqlx::query(
            r"
                INSERT INTO programs (id, owner_id, title, body)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(id) DO UPDATE SET
                    owner_id = excluded.owner_id,
                    title = excluded.title,
                    body = excluded.body
            ",
        )
        .bind(id_to_i64("program_id", program.id().value())?)
        .bind(id_to_i64("owner_id", program.owner().value())?)
        .bind(program.title())
        .bind(body)
        .execute(&self.pool)
        .await
        .map_err(db)?;

        Ok(())
    }

    async fn get_program(&self, id: ProgramId) -> Result<Option<Program>, StorageError> {
        let row = sqlx::query("SELECT body FROM programs WHERE id = ?1")
            .bind(id_to_i64("program_id", id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(db)?;

        row.as_ref().map(body_from_row).transpose()
    }

    async fn programs_by_owner(
        &self,
        owner: ProfessionalId,
    ) -> Result<Vec<Program>, StorageError> {
        let rows = sqlx::query("SELECT body FROM programs WHERE owner_id = ?1 ORDER BY id")
            .bind(id_to_i64("owner_id", owner.value())?)
            .fetch_all(&self.pool)
            .await
            .map_err(db)?;

        rows.iter().map(body_from_row).collect()
    }
}

#[async_trait::async_trait]
impl ScheduleRepository for SqliteRepository {
    async fn upsert_schedule(&self, schedule: &WeeklySchedule) -> Result<(), StorageError> {
        let id = id_to_i64("schedule_id", schedule.id().value())?;
        let body = serde_json::to_string(schedule).map_err(ser)?;

        let mut tx = self.pool.begin().await.map_err(db)?;
        sqlx::query(
            r"
                INSERT INTO schedules (id, owner_id, title, body)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(id) DO UPDATE SET
                    owner_id = excluded.owner_id,
                    title = excluded.title,
                    body = excluded.body
            ",
        )
        .bind(id)
        .bind(id_to_i64("owner_id", schedule.owner().value())?)
        .bind(schedule.title())
        .bind(body)
        .execute(&mut *tx)
        .await
        .map_err(db)?;

        sqlx::query("DELETE FROM schedule_students WHERE schedule_id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(db)?;
        for student in schedule.assigned_students() {
            sqlx::query("INSERT INTO schedule_students (schedule_id, student_id) VALUES (?1, ?2)")
                .bind(id)
                .bind(id_to_i64("student_id", student.value())?)
                .execute(&mut *tx)
                .await
                .map_err(db)?;
        }

        tx.commit().await.map_err(db)?;
        Ok(())
    }

    async fn get_schedule(&self, id: ScheduleId) -> Result<Option<WeeklySchedule>, StorageError> {
        let row = sqlx::query("SELECT body FROM schedules WHERE id = ?1")
            .bind(id_to_i64("schedule_id", id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(db)?;

        row.as_ref().map(body_from_row).transpose()
    }

    async fn schedules_for_student(
        &self,
        student: StudentId,
    ) -> Result<Vec<WeeklySchedule>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT s.body
                FROM schedules s
                JOIN schedule_students ss ON ss.schedule_id = s.id
                WHERE ss.student_id = ?1
                ORDER BY s.id
            ",
        )
        .bind(id_to_i64("student_id", student.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;

        rows.iter().map(body_from_row).collect()
    }
}
