use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

const SCHEMA_V1: &[&str] = &[
    r"
    CREATE TABLE IF NOT EXISTS students (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        total_points INTEGER NOT NULL DEFAULT 0 CHECK (total_points >= 0),
        streak INTEGER NOT NULL DEFAULT 0 CHECK (streak >= 0),
        level INTEGER NOT NULL DEFAULT 1 CHECK (level >= 1),
        active INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL
    );
    ",
    r"
    CREATE TABLE IF NOT EXISTS student_programs (
        student_id INTEGER NOT NULL,
        program_id INTEGER NOT NULL,
        PRIMARY KEY (student_id, program_id),
        FOREIGN KEY (student_id) REFERENCES students(id) ON DELETE CASCADE
    );
    ",
    r"
    CREATE TABLE IF NOT EXISTS programs (
        id INTEGER PRIMARY KEY,
        owner_id INTEGER NOT NULL,
        title TEXT NOT NULL,
        body TEXT NOT NULL
    );
    ",
    r"
    CREATE TABLE IF NOT EXISTS schedules (
        id INTEGER PRIMARY KEY,
        owner_id INTEGER NOT NULL,
        title TEXT NOT NULL,
        body TEXT NOT NULL
    );
    ",
    r"
    CREATE TABLE IF NOT EXISTS schedule_students (
        schedule_id INTEGER NOT NULL,
        student_id INTEGER NOT NULL,
        PRIMARY KEY (schedule_id, student_id),
        FOREIGN KEY (schedule_id) REFERENCES schedules(id) ON DELETE CASCADE
    );
    ",
    r"
    CREATE TABLE IF NOT EXISTS assignments (
        id INTEGER PRIMARY KEY,
        student_id INTEGER NOT NULL,
        program_id INTEGER NOT NULL,
        assigned_by INTEGER,
        assigned_at TEXT NOT NULL,
        status TEXT NOT NULL,
        progress INTEGER NOT NULL DEFAULT 0 CHECK (progress BETWEEN 0 AND 100),
        completed_activities TEXT NOT NULL DEFAULT '[]'
    );
    ",
    r"
    CREATE TABLE IF NOT EXISTS student_activities (
        student_id INTEGER NOT NULL,
        activity_id INTEGER NOT NULL,
        program_id INTEGER NOT NULL,
        module_id INTEGER NOT NULL,
        status TEXT NOT NULL,
        started_at TEXT NOT NULL,
        completed_at TEXT,
        time_spent INTEGER NOT NULL DEFAULT 0 CHECK (time_spent >= 0),
        answers TEXT,
        notes TEXT,
        points_earned INTEGER,
        updated_at TEXT NOT NULL,
        PRIMARY KEY (student_id, activity_id)
    );
    ",
    r"
    CREATE TABLE IF NOT EXISTS schedule_progress (
        student_id INTEGER NOT NULL,
        schedule_id INTEGER NOT NULL,
        activity_id INTEGER NOT NULL,
        day TEXT NOT NULL,
        completed INTEGER NOT NULL DEFAULT 0,
        completed_at TEXT,
        time_spent INTEGER NOT NULL DEFAULT 0 CHECK (time_spent >= 0),
        answers TEXT,
        notes TEXT,
        updated_at TEXT NOT NULL,
        PRIMARY KEY (student_id, schedule_id, activity_id),
        CHECK ((completed = 1) = (completed_at IS NOT NULL))
    );
    ",
    r"
    CREATE INDEX IF NOT EXISTS idx_assignments_student_status_assigned
        ON assignments (student_id, status, assigned_at);
    ",
    r"
    CREATE INDEX IF NOT EXISTS idx_student_activities_student_program
        ON student_activities (student_id, program_id);
    ",
    r"
    CREATE INDEX IF NOT EXISTS idx_schedule_progress_student_completed
        ON schedule_progress (student_id, completed_at);
    ",
];

/// Applies pending schema versions, each in its own transaction.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    if !is_applied(pool, 1).await? {
        let mut tx = pool.begin().await?;
        for &statement in SCHEMA_V1 {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        sqlx::query(
            r"
                INSERT INTO schema_migrations (version, applied_at)
                VALUES (?1, ?2)
                ON CONFLICT(version) DO NOTHING
            ",
        )
        .bind(1_i64)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        tracing::info!(version = 1, "applied schema migration");
    }

    Ok(())
}
