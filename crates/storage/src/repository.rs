use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nexus_core::model::{
    ActivityId, Assignment, AssignmentId, AssignmentStatus, DayOfWeek, ProfessionalId, Program,
    ProgramId, ScheduleActivityProgress, ScheduleId, ScheduleProgressChange, ScheduleProgressKey,
    Student, StudentActivity, StudentId, WeeklySchedule,
};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("operation not supported by this backend: {0}")]
    Unsupported(&'static str),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

//
// ─── RECORDS ───────────────────────────────────────────────────────────────────
//

/// Insert shape for a new assignment; the backend allocates the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAssignmentRecord {
    pub student_id: StudentId,
    pub program_id: ProgramId,
    pub assigned_by: Option<ProfessionalId>,
    pub assigned_at: DateTime<Utc>,
}

impl NewAssignmentRecord {
    /// Materializes the record as a fresh active assignment with no progress.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Serialization` if rehydration rejects the record.
    pub fn into_assignment(self, id: AssignmentId) -> Result<Assignment, StorageError> {
        Assignment::from_persisted(
            id,
            self.student_id,
            self.program_id,
            self.assigned_by,
            self.assigned_at,
            AssignmentStatus::Active,
            0,
            Default::default(),
        )
        .map_err(|e| StorageError::Serialization(e.to_string()))
    }
}

/// Everything written when a student completes a program activity.
///
/// Backends apply it in one transaction: the progress record is upserted,
/// the student's active assignment for the program (if any) records the
/// activity against `program_total`, and the student's points are
/// incremented by the record's `points_earned`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionCommit {
    pub record: StudentActivity,
    pub program_total: usize,
}

/// What a completion commit changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionOutcome {
    pub assignment: Option<Assignment>,
    pub total_points: u64,
}

//
// ─── REPOSITORY TRAITS ─────────────────────────────────────────────────────────
//

#[async_trait]
pub trait StudentRepository: Send + Sync {
    /// Persist or update a student, including the assigned program set.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the student cannot be stored.
    async fn upsert_student(&self, student: &Student) -> Result<(), StorageError>;

    /// Fetch a student by ID. Returns `Ok(None)` when missing.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn get_student(&self, id: StudentId) -> Result<Option<Student>, StorageError>;

    /// Atomically add `program` to the student's assigned set (set union).
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Unsupported` when the backend has no atomic
    /// union primitive; callers fall back to read-modify-write.
    /// Returns `StorageError::NotFound` if the student does not exist.
    async fn add_assigned_program(
        &self,
        id: StudentId,
        program: ProgramId,
    ) -> Result<(), StorageError>;
}

#[async_trait]
pub trait ProgramRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` if the program cannot be stored.
    async fn upsert_program(&self, program: &Program) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn get_program(&self, id: ProgramId) -> Result<Option<Program>, StorageError>;

    /// Programs authored by `owner`, ordered by ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn programs_by_owner(&self, owner: ProfessionalId)
    -> Result<Vec<Program>, StorageError>;
}

#[async_trait]
pub trait ScheduleRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` if the schedule cannot be stored.
    async fn upsert_schedule(&self, schedule: &WeeklySchedule) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn get_schedule(&self, id: ScheduleId) -> Result<Option<WeeklySchedule>, StorageError>;

    /// Schedules the student is assigned to, ordered by ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn schedules_for_student(
        &self,
        student: StudentId,
    ) -> Result<Vec<WeeklySchedule>, StorageError>;
}

#[async_trait]
pub trait AssignmentRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` if the assignment cannot be stored.
    async fn insert_new_assignment(
        &self,
        record: NewAssignmentRecord,
    ) -> Result<AssignmentId, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn get_assignment(&self, id: AssignmentId) -> Result<Option<Assignment>, StorageError>;

    /// Overwrite status, progress and completed activities.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the assignment does not exist.
    async fn update_assignment(&self, assignment: &Assignment) -> Result<(), StorageError>;

    /// Active assignments for a student, most recently assigned first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn active_assignments(&self, student: StudentId)
    -> Result<Vec<Assignment>, StorageError>;

    /// The active assignment linking `student` to `program`, if any.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn find_active_assignment(
        &self,
        student: StudentId,
        program: ProgramId,
    ) -> Result<Option<Assignment>, StorageError>;
}

#[async_trait]
pub trait StudentActivityRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn get_student_activity(
        &self,
        student: StudentId,
        activity: ActivityId,
    ) -> Result<Option<StudentActivity>, StorageError>;

    /// Last-write-wins upsert keyed by `(student, activity)`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the record cannot be stored.
    async fn upsert_student_activity(&self, record: &StudentActivity) -> Result<(), StorageError>;

    /// All progress records of a student inside one program.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn activities_for_program(
        &self,
        student: StudentId,
        program: ProgramId,
    ) -> Result<Vec<StudentActivity>, StorageError>;
}

/// Multi-record write for activity completion.
#[async_trait]
pub trait ProgressPersistence: Send + Sync {
    /// Apply a `CompletionCommit` atomically.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the stored record is already
    /// completed, `StorageError::NotFound` if the student is missing, or other
    /// storage errors. Nothing is written on error.
    async fn commit_completion(
        &self,
        commit: CompletionCommit,
    ) -> Result<CompletionOutcome, StorageError>;
}

#[async_trait]
pub trait ScheduleProgressRepository: Send + Sync {
    /// Read the record for `key`, apply `change` and write the result, all in
    /// one transaction. Returns the stored record, or `None` if the change was
    /// a no-op.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn apply_schedule_change(
        &self,
        key: ScheduleProgressKey,
        day: DayOfWeek,
        change: ScheduleProgressChange,
        now: DateTime<Utc>,
    ) -> Result<Option<ScheduleActivityProgress>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn get_schedule_progress(
        &self,
        key: ScheduleProgressKey,
    ) -> Result<Option<ScheduleActivityProgress>, StorageError>;

    /// Records of one student for one schedule, ordered by activity ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn progress_for_schedule(
        &self,
        student: StudentId,
        schedule: ScheduleId,
    ) -> Result<Vec<ScheduleActivityProgress>, StorageError>;

    /// Every record of a student, most recently completed first; records that
    /// are not completed come last.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn progress_for_student(
        &self,
        student: StudentId,
    ) -> Result<Vec<ScheduleActivityProgress>, StorageError>;
}

/// Orders schedule records by `completed_at` descending, incomplete last.
pub(crate) fn sort_by_completion_desc(records: &mut [ScheduleActivityProgress]) {
    records.sort_by(|a, b| {
        b.completed_at()
            .cmp(&a.completed_at())
            .then_with(|| a.key().cmp(&b.key()))
    });
}

//
// ─── IN-MEMORY BACKEND ─────────────────────────────────────────────────────────
//

#[derive(Default)]
struct MemoryState {
    students: HashMap<StudentId, Student>,
    programs: BTreeMap<ProgramId, Program>,
    schedules: BTreeMap<ScheduleId, WeeklySchedule>,
    assignments: BTreeMap<AssignmentId, Assignment>,
    next_assignment_id: u64,
    student_activities: HashMap<(StudentId, ActivityId), StudentActivity>,
    schedule_progress: BTreeMap<ScheduleProgressKey, ScheduleActivityProgress>,
}

/// In-memory repository for tests and prototyping.
///
/// All collections sit behind one lock, so every trait method (including
/// the multi-record commits) is atomic.
#[derive(Clone)]
pub struct InMemoryRepository {
    state: Arc<Mutex<MemoryState>>,
    atomic_union: bool,
}

impl Default for InMemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState::default())),
            atomic_union: true,
        }
    }

    /// Variant whose `add_assigned_program` reports `Unsupported`, as some
    /// document stores do for array-union writes.
    #[must_use]
    pub fn without_atomic_union() -> Self {
        Self {
            atomic_union: false,
            ..Self::new()
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, StorageError> {
        self.state
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }
}

fn find_active(
    state: &MemoryState,
    student: StudentId,
    program: ProgramId,
) -> Option<AssignmentId> {
    state
        .assignments
        .values()
        .filter(|a| a.is_active() && a.student_id() == student && a.program_id() == program)
        .max_by_key(|a| (a.assigned_at(), a.id()))
        .map(Assignment::id)
}

#[async_trait]
impl StudentRepository for InMemoryRepository {
    async fn upsert_student(&self, student: &Student) -> Result<(), StorageError> {
        self.lock()?.students.insert(student.id(), student.clone());
        Ok(())
    }

    async fn get_student(&self, id: StudentId) -> Result<Option<Student>, StorageError> {
        Ok(self.lock()?.students.get(&id).cloned())
    }

    async fn add_assigned_program(
        &self,
        id: StudentId,
        program: ProgramId,
    ) -> Result<(), StorageError> {
        if !self.atomic_union {
            return Err(StorageError::Unsupported("array union"));
        }
        let mut guard = self.lock()?;
        let student = guard.students.get_mut(&id).ok_or(StorageError::NotFound)?;
        student.assign_program(program);
        Ok(())
    }
}

#[async_trait]
impl ProgramRepository for InMemoryRepository {
    async fn upsert_program(&self, program: &Program) -> Result<(), StorageError> {
        self.lock()?.programs.insert(program.id(), program.clone());
        Ok(())
    }

    async fn get_program(&self, id: ProgramId) -> Result<Option<Program>, StorageError> {
        Ok(self.lock()?.programs.get(&id).cloned())
    }

    async fn programs_by_owner(
        &self,
        owner: ProfessionalId,
    ) -> Result<Vec<Program>, StorageError> {
        Ok(self
            .lock()?
            .programs
            .values()
            .filter(|p| p.owner() == owner)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ScheduleRepository for InMemoryRepository {
    async fn upsert_schedule(&self, schedule: &WeeklySchedule) -> Result<(), StorageError> {
        self.lock()?.schedules.insert(schedule.id(), schedule.clone());
        Ok(())
    }

    async fn get_schedule(&self, id: ScheduleId) -> Result<Option<WeeklySchedule>, StorageError> {
        Ok(self.lock()?.schedules.get(&id).cloned())
    }

    async fn schedules_for_student(
        &self,
        student: StudentId,
    ) -> Result<Vec<WeeklySchedule>, StorageError> {
        Ok(self
            .lock()?
            .schedules
            .values()
            .filter(|s| s.is_assigned(student))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl AssignmentRepository for InMemoryRepository {
    async fn insert_new_assignment(
        &self,
        record: NewAssignmentRecord,
    ) -> Result<AssignmentId, StorageError> {
        let mut guard = self.lock()?;
        guard.next_assignment_id += 1;
        let id = AssignmentId::new(guard.next_assignment_id);
        let assignment = record.into_assignment(id)?;
        guard.assignments.insert(id, assignment);
        Ok(id)
    }

    async fn get_assignment(&self, id: AssignmentId) -> Result<Option<Assignment>, StorageError> {
        Ok(self.lock()?.assignments.get(&id).cloned())
    }

    async fn update_assignment(&self, assignment: &Assignment) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        let slot = guard
            .assignments
            .get_mut(&assignment.id())
            .ok_or(StorageError::NotFound)?;
        *slot = assignment.clone();
        Ok(())
    }

    async fn active_assignments(
        &self,
        student: StudentId,
    ) -> Result<Vec<Assignment>, StorageError> {
        let guard = self.lock()?;
        let mut out: Vec<Assignment> = guard
            .assignments
            .values()
            .filter(|a| a.is_active() && a.student_id() == student)
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            b.assigned_at()
                .cmp(&a.assigned_at())
                .then_with(|| b.id().cmp(&a.id()))
        });
        Ok(out)
    }

    async fn find_active_assignment(
        &self,
        student: StudentId,
        program: ProgramId,
    ) -> Result<Option<Assignment>, StorageError> {
        let guard = self.lock()?;
        Ok(find_active(&guard, student, program).and_then(|id| guard.assignments.get(&id).cloned()))
    }
}

#[async_trait]
impl StudentActivityRepository for InMemoryRepository {
    async fn get_student_activity(
        &self,
        student: StudentId,
        activity: ActivityId,
    ) -> Result<Option<StudentActivity>, StorageError> {
        Ok(self
            .lock()?
            .student_activities
            .get(&(student, activity))
            .cloned())
    }

    async fn upsert_student_activity(&self, record: &StudentActivity) -> Result<(), StorageError> {
        self.lock()?
            .student_activities
            .insert((record.student_id(), record.activity_id()), record.clone());
        Ok(())
    }

    async fn activities_for_program(
        &self,
        student: StudentId,
        program: ProgramId,
    ) -> Result<Vec<StudentActivity>, StorageError> {
        let guard = self.lock()?;
        let mut out: Vec<StudentActivity> = guard
            .student_activities
            .values()
            .filter(|r| r.student_id() == student && r.activity().program_id == program)
            .cloned()
            .collect();
        out.sort_by_key(StudentActivity::activity_id);
        Ok(out)
    }
}

#[async_trait]
impl ProgressPersistence for InMemoryRepository {
    async fn commit_completion(
        &self,
        commit: CompletionCommit,
    ) -> Result<CompletionOutcome, StorageError> {
        let mut guard = self.lock()?;
        let state = &mut *guard;
        let record = commit.record;
        let key = (record.student_id(), record.activity_id());

        if state
            .student_activities
            .get(&key)
            .is_some_and(|existing| existing.status().is_done())
        {
            return Err(StorageError::Conflict);
        }
        if !state.students.contains_key(&record.student_id()) {
            return Err(StorageError::NotFound);
        }

        // Stage the assignment first so a failure leaves nothing written.
        let assignment = match find_active(state, record.student_id(), record.activity().program_id)
        {
            Some(id) => {
                let mut staged = state
                    .assignments
                    .get(&id)
                    .cloned()
                    .ok_or(StorageError::NotFound)?;
                staged
                    .record_completion(record.activity_id(), commit.program_total)
                    .map_err(|_| StorageError::Conflict)?;
                Some(staged)
            }
            None => None,
        };

        let student = state
            .students
            .get_mut(&record.student_id())
            .ok_or(StorageError::NotFound)?;
        student.award_points(record.points_earned().unwrap_or(0));
        let total_points = student.total_points();

        if let Some(updated) = &assignment {
            state.assignments.insert(updated.id(), updated.clone());
        }
        state.student_activities.insert(key, record);

        Ok(CompletionOutcome {
            assignment,
            total_points,
        })
    }
}

#[async_trait]
impl ScheduleProgressRepository for InMemoryRepository {
    async fn apply_schedule_change(
        &self,
        key: ScheduleProgressKey,
        day: DayOfWeek,
        change: ScheduleProgressChange,
        now: DateTime<Utc>,
    ) -> Result<Option<ScheduleActivityProgress>, StorageError> {
        let mut guard = self.lock()?;
        let existing = guard.schedule_progress.get(&key).cloned();
        let updated = ScheduleActivityProgress::apply(existing, key, day, change, now);
        if let Some(record) = &updated {
            guard.schedule_progress.insert(key, record.clone());
        }
        Ok(updated)
    }

    async fn get_schedule_progress(
        &self,
        key: ScheduleProgressKey,
    ) -> Result<Option<ScheduleActivityProgress>, StorageError> {
        Ok(self.lock()?.schedule_progress.get(&key).cloned())
    }

    async fn progress_for_schedule(
        &self,
        student: StudentId,
        schedule: ScheduleId,
    ) -> Result<Vec<ScheduleActivityProgress>, StorageError> {
        Ok(self
            .lock()?
            .schedule_progress
            .values()
            .filter(|r| r.key().student_id == student && r.key().schedule_id == schedule)
            .cloned()
            .collect())
    }

    async fn progress_for_student(
        &self,
        student: StudentId,
    ) -> Result<Vec<ScheduleActivityProgress>, StorageError> {
        let mut out: Vec<ScheduleActivityProgress> = self
            .lock()?
            .schedule_progress
            .values()
            .filter(|r| r.key().student_id == student)
            .cloned()
            .collect();
        sort_by_completion_desc(&mut out);
        Ok(out)
    }
}

//
// ─── STORAGE AGGREGATE ─────────────────────────────────────────────────────────
//

/// Aggregates the repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub students: Arc<dyn StudentRepository>,
    pub programs: Arc<dyn ProgramRepository>,
    pub schedules: Arc<dyn ScheduleRepository>,
    pub assignments: Arc<dyn AssignmentRepository>,
    pub student_activities: Arc<dyn StudentActivityRepository>,
    pub completions: Arc<dyn ProgressPersistence>,
    pub schedule_progress: Arc<dyn ScheduleProgressRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_repository(InMemoryRepository::new())
    }

    /// Wire every repository slot to one backend.
    pub fn from_repository<R>(repo: R) -> Self
    where
        R: StudentRepository
            + ProgramRepository
            + ScheduleRepository
            + AssignmentRepository
            + StudentActivityRepository
            + ProgressPersistence
            + ScheduleProgressRepository
            + Clone
            + 'static,
    {
        Self {
            students: Arc::new(repo.clone()),
            programs: Arc::new(repo.clone()),
            schedules: Arc::new(repo.clone()),
            assignments: Arc::new(repo.clone()),
            student_activities: Arc::new(repo.clone()),
            completions: Arc::new(repo.clone()),
            schedule_progress: Arc::new(repo),
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
