use std::sync::Arc;

use storage::repository::Storage;

use crate::Clock;
use crate::activity_progress_service::ActivityProgressService;
use crate::assignment_service::AssignmentService;
use crate::error::NexusServicesError;
use crate::schedule_progress_service::ScheduleProgressService;

/// Composition root: wires every service to one injected `Storage` and
/// `Clock`.
#[derive(Clone)]
pub struct NexusServices {
    assignments: Arc<AssignmentService>,
    activity_progress: Arc<ActivityProgressService>,
    schedule_progress: Arc<ScheduleProgressService>,
}

impl NexusServices {
    #[must_use]
    pub fn new(storage: &Storage, clock: Clock) -> Self {
        let assignments = Arc::new(AssignmentService::new(
            clock,
            Arc::clone(&storage.students),
            Arc::clone(&storage.programs),
            Arc::clone(&storage.assignments),
        ));
        let activity_progress = Arc::new(ActivityProgressService::new(
            clock,
            Arc::clone(&storage.programs),
            Arc::clone(&storage.student_activities),
            Arc::clone(&storage.completions),
        ));
        let schedule_progress = Arc::new(ScheduleProgressService::new(
            clock,
            Arc::clone(&storage.schedules),
            Arc::clone(&storage.schedule_progress),
        ));

        Self {
            assignments,
            activity_progress,
            schedule_progress,
        }
    }

    /// Services over a fresh in-memory store. Returns the store too so
    /// callers can seed documents.
    #[must_use]
    pub fn in_memory(clock: Clock) -> (Self, Storage) {
        let storage = Storage::in_memory();
        (Self::new(&storage, clock), storage)
    }

    /// Build services backed by `SQLite` storage.
    ///
    /// # Errors
    ///
    /// Returns `NexusServicesError` if the connection or migrations fail.
    pub async fn new_sqlite(db_url: &str, clock: Clock) -> Result<Self, NexusServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        tracing::info!(url = db_url, "services ready");
        Ok(Self::new(&storage, clock))
    }

    #[must_use]
    pub fn assignments(&self) -> Arc<AssignmentService> {
        Arc::clone(&self.assignments)
    }

    #[must_use]
    pub fn activity_progress(&self) -> Arc<ActivityProgressService> {
        Arc::clone(&self.activity_progress)
    }

    #[must_use]
    pub fn schedule_progress(&self) -> Arc<ScheduleProgressService> {
        Arc::clone(&self.schedule_progress)
    }
}
