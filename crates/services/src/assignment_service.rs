use std::sync::Arc;

use nexus_core::model::{
    Assignment, AssignmentId, AssignmentProgressUpdate, AssignmentStatus, ProfessionalId,
    ProgramId, StudentId,
};
use storage::repository::{
    AssignmentRepository, NewAssignmentRecord, ProgramRepository, StorageError, StudentRepository,
};

use crate::Clock;
use crate::error::AssignmentServiceError;

/// What `assign_program_to_student` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssignProgramOutcome {
    /// The program was added to the student's set; carries the active
    /// assignment record.
    Assigned(Assignment),
    /// The student already had the program with an active assignment.
    /// Nothing was written.
    AlreadyAssigned,
}

/// The assignment ledger: which students follow which programs, and how far
/// along they are.
#[derive(Clone)]
pub struct AssignmentService {
    clock: Clock,
    students: Arc<dyn StudentRepository>,
    programs: Arc<dyn ProgramRepository>,
    assignments: Arc<dyn AssignmentRepository>,
}

impl AssignmentService {
    #[must_use]
    pub fn new(
        clock: Clock,
        students: Arc<dyn StudentRepository>,
        programs: Arc<dyn ProgramRepository>,
        assignments: Arc<dyn AssignmentRepository>,
    ) -> Self {
        Self {
            clock,
            students,
            programs,
            assignments,
        }
    }

    /// Assign `program` to `student`. Idempotent.
    ///
    /// Uses the store's atomic set union when available and falls back to a
    /// read-modify-write of the set otherwise. The student is re-read
    /// afterwards and the call fails unless the program is present.
    ///
    /// A program already in the set but without an active assignment (removed
    /// earlier, or an interrupted call) gets a fresh assignment record.
    ///
    /// # Errors
    ///
    /// Returns `StudentNotFound`/`ProgramNotFound` for missing documents,
    /// `NotPersisted` if the write could not be confirmed, or `Storage` for
    /// backend failures.
    pub async fn assign_program_to_student(
        &self,
        student_id: StudentId,
        program_id: ProgramId,
        assigned_by: Option<ProfessionalId>,
    ) -> Result<AssignProgramOutcome, AssignmentServiceError> {
        let student = self
            .students
            .get_student(student_id)
            .await?
            .ok_or(AssignmentServiceError::StudentNotFound(student_id))?;
        let already_in_set = student.is_assigned(program_id);
        if already_in_set
            && self
                .assignments
                .find_active_assignment(student_id, program_id)
                .await?
                .is_some()
        {
            tracing::debug!(student = %student_id, program = %program_id, "program already assigned");
            return Ok(AssignProgramOutcome::AlreadyAssigned);
        }
        if self.programs.get_program(program_id).await?.is_none() {
            return Err(AssignmentServiceError::ProgramNotFound(program_id));
        }
        if !already_in_set {
            self.add_to_assigned_set(student_id, program_id).await?;
        }

        let assignment = match self
            .assignments
            .find_active_assignment(student_id, program_id)
            .await?
        {
            Some(existing) => existing,
            None => {
                let id = self
                    .assignments
                    .insert_new_assignment(NewAssignmentRecord {
                        student_id,
                        program_id,
                        assigned_by,
                        assigned_at: self.clock.now(),
                    })
                    .await?;
                self.assignments
                    .get_assignment(id)
                    .await?
                    .ok_or(AssignmentServiceError::AssignmentNotFound(id))?
            }
        };

        tracing::info!(
            student = %student_id,
            program = %program_id,
            assignment = %assignment.id(),
            "program assigned"
        );
        Ok(AssignProgramOutcome::Assigned(assignment))
    }

    async fn add_to_assigned_set(
        &self,
        student_id: StudentId,
        program_id: ProgramId,
    ) -> Result<(), AssignmentServiceError> {
        match self.students.add_assigned_program(student_id, program_id).await {
            Ok(()) => {}
            Err(StorageError::Unsupported(what)) => {
                tracing::debug!(what, "atomic union unavailable, rewriting assigned set");
                let mut fresh = self
                    .students
                    .get_student(student_id)
                    .await?
                    .ok_or(AssignmentServiceError::StudentNotFound(student_id))?;
                if fresh.assign_program(program_id) {
                    self.students.upsert_student(&fresh).await?;
                }
            }
            Err(StorageError::NotFound) => {
                return Err(AssignmentServiceError::StudentNotFound(student_id));
            }
            Err(e) => return Err(e.into()),
        }

        let confirmed = self
            .students
            .get_student(student_id)
            .await?
            .is_some_and(|s| s.is_assigned(program_id));
        if !confirmed {
            tracing::warn!(student = %student_id, program = %program_id, "assignment not visible after write");
            return Err(AssignmentServiceError::NotPersisted {
                student: student_id,
                program: program_id,
            });
        }
        Ok(())
    }

    /// Active assignments of a student, most recently assigned first.
    ///
    /// # Errors
    ///
    /// Returns `AssignmentServiceError::Storage` if repository access fails.
    pub async fn get_student_assignments(
        &self,
        student_id: StudentId,
    ) -> Result<Vec<Assignment>, AssignmentServiceError> {
        Ok(self.assignments.active_assignments(student_id).await?)
    }

    /// Apply a partial progress update.
    ///
    /// When `completed_activities` is given, `progress` is recomputed from the
    /// program's real activity count and any supplied `progress` is ignored.
    ///
    /// # Errors
    ///
    /// Returns `AssignmentNotFound`/`ProgramNotFound` for missing records,
    /// `ActivityNotInProgram` for foreign activity ids, `Assignment` for
    /// out-of-range progress or removed assignments, or `Storage`.
    pub async fn update_assignment_progress(
        &self,
        assignment_id: AssignmentId,
        update: AssignmentProgressUpdate,
    ) -> Result<Assignment, AssignmentServiceError> {
        let mut assignment = self.load(assignment_id).await?;
        let program = self
            .programs
            .get_program(assignment.program_id())
            .await?
            .ok_or(AssignmentServiceError::ProgramNotFound(assignment.program_id()))?;

        if let Some(unknown) = update
            .completed_activities
            .iter()
            .flatten()
            .find(|id| !program.contains_activity(**id))
        {
            return Err(AssignmentServiceError::ActivityNotInProgram {
                activity: *unknown,
                program: program.id(),
            });
        }

        assignment.apply_update(update, program.total_activities())?;
        self.assignments.update_assignment(&assignment).await?;
        tracing::debug!(
            assignment = %assignment_id,
            progress = assignment.progress(),
            "assignment progress updated"
        );
        Ok(assignment)
    }

    /// Soft-delete: flips the status to inactive.
    ///
    /// # Errors
    ///
    /// Returns `AssignmentNotFound` or `Storage`.
    pub async fn remove_assignment(
        &self,
        assignment_id: AssignmentId,
    ) -> Result<(), AssignmentServiceError> {
        let mut assignment = self.load(assignment_id).await?;
        assignment.deactivate();
        self.assignments.update_assignment(&assignment).await?;
        tracing::info!(assignment = %assignment_id, "assignment removed");
        Ok(())
    }

    /// Pause, resume, complete or cancel an assignment.
    ///
    /// # Errors
    ///
    /// Returns `AssignmentNotFound` or `Storage`.
    pub async fn set_assignment_status(
        &self,
        assignment_id: AssignmentId,
        status: AssignmentStatus,
    ) -> Result<Assignment, AssignmentServiceError> {
        let mut assignment = self.load(assignment_id).await?;
        assignment.set_status(status);
        self.assignments.update_assignment(&assignment).await?;
        tracing::info!(assignment = %assignment_id, status = %status, "assignment status changed");
        Ok(assignment)
    }

    async fn load(&self, id: AssignmentId) -> Result<Assignment, AssignmentServiceError> {
        self.assignments
            .get_assignment(id)
            .await?
            .ok_or(AssignmentServiceError::AssignmentNotFound(id))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use async_trait::async_trait;
    use nexus_core::model::{
        Activity, ActivityContent, ActivityId, Module, ModuleId, Program, Student,
    };
    use nexus_core::time::fixed_now;
    use storage::repository::{InMemoryRepository, StorageError};

    fn program(id: u64, activities: u64) -> Program {
        let activities = (1..=activities)
            .map(|a| {
                Activity::new(
                    ActivityId::new(a),
                    format!("A{a}"),
                    ActivityContent::Text { body: "b".into() },
                    None,
                    5,
                    true,
                )
                .unwrap()
            })
            .collect();
        Program::new(
            ProgramId::new(id),
            ProfessionalId::new(1),
            "Programa",
            None,
            vec![Module::new(ModuleId::new(1), "M", activities)],
        )
        .unwrap()
    }

    async fn seeded(repo: InMemoryRepository) -> AssignmentService {
        repo.upsert_student(&Student::new(StudentId::new(1), "Ana", fixed_now()).unwrap())
            .await
            .unwrap();
        repo.upsert_program(&program(1, 4)).await.unwrap();
        let repo = Arc::new(repo);
        AssignmentService::new(Clock::Fixed(fixed_now()), repo.clone(), repo.clone(), repo)
    }

    /// Accepts writes but never lets them show up on read.
    struct ForgetfulStudents {
        inner: InMemoryRepository,
    }

    #[async_trait]
    impl StudentRepository for ForgetfulStudents {
        async fn upsert_student(&self, _student: &Student) -> Result<(), StorageError> {
            Ok(())
        }

        async fn get_student(&self, id: StudentId) -> Result<Option<Student>, StorageError> {
            self.inner.get_student(id).await
        }

        async fn add_assigned_program(
            &self,
            _id: StudentId,
            _program: ProgramId,
        ) -> Result<(), StorageError> {
            Err(StorageError::Unsupported("array union"))
        }
    }

    #[tokio::test]
    async fn assigning_twice_keeps_one_entry() {
        let service = seeded(InMemoryRepository::new()).await;

        let first = service
            .assign_program_to_student(StudentId::new(1), ProgramId::new(1), None)
            .await
            .unwrap();
        assert!(matches!(first, AssignProgramOutcome::Assigned(_)));
        let second = service
            .assign_program_to_student(StudentId::new(1), ProgramId::new(1), None)
            .await
            .unwrap();
        assert_eq!(second, AssignProgramOutcome::AlreadyAssigned);

        let assignments = service
            .get_student_assignments(StudentId::new(1))
            .await
            .unwrap();
        assert_eq!(assignments.len(), 1);
        assert_eq!(assignments[0].status(), AssignmentStatus::Active);
    }

    #[tokio::test]
    async fn reassigning_after_removal_opens_a_new_assignment() {
        let service = seeded(InMemoryRepository::new()).await;
        let AssignProgramOutcome::Assigned(first) = service
            .assign_program_to_student(StudentId::new(1), ProgramId::new(1), None)
            .await
            .unwrap()
        else {
            panic!("expected a new assignment");
        };
        service.remove_assignment(first.id()).await.unwrap();

        let again = service
            .assign_program_to_student(StudentId::new(1), ProgramId::new(1), None)
            .await
            .unwrap();
        let AssignProgramOutcome::Assigned(second) = again else {
            panic!("expected a new assignment, got {again:?}");
        };
        assert_ne!(second.id(), first.id());

        let active = service
            .get_student_assignments(StudentId::new(1))
            .await
            .unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id(), second.id());
    }

    #[tokio::test]
    async fn set_entry_without_record_is_repaired() {
        let repo = InMemoryRepository::new();
        let service = seeded(repo.clone()).await;
        let mut student = repo.get_student(StudentId::new(1)).await.unwrap().unwrap();
        assert!(student.assign_program(ProgramId::new(1)));
        repo.upsert_student(&student).await.unwrap();

        let outcome = service
            .assign_program_to_student(StudentId::new(1), ProgramId::new(1), None)
            .await
            .unwrap();
        assert!(matches!(outcome, AssignProgramOutcome::Assigned(_)));

        let active = service
            .get_student_assignments(StudentId::new(1))
            .await
            .unwrap();
        assert_eq!(active.len(), 1);
        let student = repo.get_student(StudentId::new(1)).await.unwrap().unwrap();
        assert_eq!(
            student.assigned_programs(),
            &BTreeSet::from([ProgramId::new(1)])
        );
    }

    #[tokio::test]
    async fn fallback_path_rewrites_the_set() {
        let repo = InMemoryRepository::without_atomic_union();
        let service = seeded(repo.clone()).await;

        service
            .assign_program_to_student(StudentId::new(1), ProgramId::new(1), None)
            .await
            .unwrap();

        let student = repo.get_student(StudentId::new(1)).await.unwrap().unwrap();
        assert_eq!(
            student.assigned_programs(),
            &BTreeSet::from([ProgramId::new(1)])
        );
    }

    #[tokio::test]
    async fn lost_write_is_reported() {
        let repo = InMemoryRepository::new();
        repo.upsert_student(&Student::new(StudentId::new(1), "Ana", fixed_now()).unwrap())
            .await
            .unwrap();
        repo.upsert_program(&program(1, 2)).await.unwrap();
        let service = AssignmentService::new(
            Clock::Fixed(fixed_now()),
            Arc::new(ForgetfulStudents {
                inner: repo.clone(),
            }),
            Arc::new(repo.clone()),
            Arc::new(repo),
        );

        let err = service
            .assign_program_to_student(StudentId::new(1), ProgramId::new(1), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AssignmentServiceError::NotPersisted { .. }));
    }

    #[tokio::test]
    async fn missing_student_is_fatal() {
        let service = seeded(InMemoryRepository::new()).await;
        let err = service
            .assign_program_to_student(StudentId::new(42), ProgramId::new(1), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AssignmentServiceError::StudentNotFound(_)));
        assert_eq!(err.user_message(), "Aluno não encontrado.");
    }

    #[tokio::test]
    async fn progress_update_recomputes_from_real_total() {
        let service = seeded(InMemoryRepository::new()).await;
        let AssignProgramOutcome::Assigned(assignment) = service
            .assign_program_to_student(StudentId::new(1), ProgramId::new(1), None)
            .await
            .unwrap()
        else {
            panic!("expected a new assignment");
        };

        let updated = service
            .update_assignment_progress(
                assignment.id(),
                AssignmentProgressUpdate {
                    progress: Some(90),
                    completed_activities: Some(BTreeSet::from([
                        ActivityId::new(1),
                        ActivityId::new(2),
                        ActivityId::new(3),
                    ])),
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.progress(), 75);

        let err = service
            .update_assignment_progress(
                assignment.id(),
                AssignmentProgressUpdate {
                    progress: None,
                    completed_activities: Some(BTreeSet::from([ActivityId::new(99)])),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AssignmentServiceError::ActivityNotInProgram { .. }
        ));
    }

    #[tokio::test]
    async fn removed_assignment_leaves_active_list() {
        let service = seeded(InMemoryRepository::new()).await;
        let AssignProgramOutcome::Assigned(assignment) = service
            .assign_program_to_student(StudentId::new(1), ProgramId::new(1), None)
            .await
            .unwrap()
        else {
            panic!("expected a new assignment");
        };

        service.remove_assignment(assignment.id()).await.unwrap();
        assert!(
            service
                .get_student_assignments(StudentId::new(1))
                .await
                .unwrap()
                .is_empty()
        );

        let err = service
            .update_assignment_progress(
                assignment.id(),
                AssignmentProgressUpdate {
                    progress: Some(10),
                    completed_activities: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AssignmentServiceError::Assignment(_)));
    }

    #[tokio::test]
    async fn paused_assignment_can_resume() {
        let service = seeded(InMemoryRepository::new()).await;
        let AssignProgramOutcome::Assigned(assignment) = service
            .assign_program_to_student(StudentId::new(1), ProgramId::new(1), None)
            .await
            .unwrap()
        else {
            panic!("expected a new assignment");
        };

        service
            .set_assignment_status(assignment.id(), AssignmentStatus::Paused)
            .await
            .unwrap();
        assert!(
            service
                .get_student_assignments(StudentId::new(1))
                .await
                .unwrap()
                .is_empty()
        );
        let resumed = service
            .set_assignment_status(assignment.id(), AssignmentStatus::Active)
            .await
            .unwrap();
        assert!(resumed.is_active());
    }
}
