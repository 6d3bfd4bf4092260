use std::collections::HashMap;
use std::sync::Arc;

use nexus_core::model::{
    Activity, ActivityAnswers, ActivityId, ActivityRef, ActivityStatus, Assignment, Identity,
    ModuleId, Program, ProgramId, StudentActivity, StudentId, completion_percent,
};
use nexus_core::time::ActivityTimer;
use serde::Serialize;
use storage::repository::{
    CompletionCommit, ProgramRepository, ProgressPersistence, StorageError,
    StudentActivityRepository,
};

use crate::Clock;
use crate::error::ActivityProgressError;

/// Result of completing a program activity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedActivity {
    pub record: StudentActivity,
    /// The active assignment after recording the activity, if the student
    /// has one for the program.
    pub assignment: Option<Assignment>,
    pub total_points: u64,
    /// `(correct, total)` for quiz activities.
    pub quiz_score: Option<(usize, usize)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleProgress {
    pub module_id: ModuleId,
    pub title: String,
    pub completed: usize,
    pub total: usize,
    pub percent: u8,
}

/// Per-module and overall progress of one student in one program, computed
/// from the program's real activity counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgramProgress {
    pub program_id: ProgramId,
    pub modules: Vec<ModuleProgress>,
    pub completed: usize,
    pub total: usize,
    pub percent: u8,
    pub points_earned: u64,
}

/// Tracks one-shot program activities: `locked → in_progress → completed`.
#[derive(Clone)]
pub struct ActivityProgressService {
    clock: Clock,
    programs: Arc<dyn ProgramRepository>,
    records: Arc<dyn StudentActivityRepository>,
    completions: Arc<dyn ProgressPersistence>,
}

impl ActivityProgressService {
    #[must_use]
    pub fn new(
        clock: Clock,
        programs: Arc<dyn ProgramRepository>,
        records: Arc<dyn StudentActivityRepository>,
        completions: Arc<dyn ProgressPersistence>,
    ) -> Self {
        Self {
            clock,
            programs,
            records,
            completions,
        }
    }

    /// The student's record for `activity`, or `None` if never started.
    ///
    /// # Errors
    ///
    /// Returns `ActivityProgressError::Storage` if repository access fails.
    pub async fn get_student_activity_progress(
        &self,
        student_id: StudentId,
        activity_id: ActivityId,
    ) -> Result<Option<StudentActivity>, ActivityProgressError> {
        Ok(self
            .records
            .get_student_activity(student_id, activity_id)
            .await?)
    }

    /// An activity without a record is locked.
    ///
    /// # Errors
    ///
    /// Returns `ActivityProgressError::Storage` if repository access fails.
    pub async fn is_locked(
        &self,
        student_id: StudentId,
        activity_id: ActivityId,
    ) -> Result<bool, ActivityProgressError> {
        let record = self
            .get_student_activity_progress(student_id, activity_id)
            .await?;
        Ok(ActivityStatus::of(record.as_ref()) == ActivityStatus::Locked)
    }

    /// `locked → in_progress`. Starting an activity that already has a record
    /// returns that record untouched.
    ///
    /// # Errors
    ///
    /// Returns `NotAuthenticated` before any store access when `identity` is
    /// not a student, `ProgramNotFound`/`ActivityNotFound` for unknown
    /// references, or `Storage`.
    pub async fn start_activity(
        &self,
        identity: &Identity,
        activity: ActivityRef,
    ) -> Result<StudentActivity, ActivityProgressError> {
        let student_id = require_student(identity)?;
        self.locate(activity).await?;

        if let Some(existing) = self
            .records
            .get_student_activity(student_id, activity.activity_id)
            .await?
        {
            return Ok(existing);
        }

        let record = StudentActivity::start(student_id, activity, self.clock.now());
        self.records.upsert_student_activity(&record).await?;
        tracing::info!(student = %student_id, activity = %activity.activity_id, "activity started");
        Ok(record)
    }

    /// Overwrite answers and accumulated minutes without changing status.
    /// Creates the in-progress record if the activity was never started.
    ///
    /// # Errors
    ///
    /// Returns `NotAuthenticated`, `ProgramNotFound`/`ActivityNotFound`,
    /// `Activity` when the answers do not fit the activity type, `Progress`
    /// once the activity is completed, or `Storage`.
    pub async fn save_draft(
        &self,
        identity: &Identity,
        activity: ActivityRef,
        answers: Option<ActivityAnswers>,
        time_spent_minutes: u32,
    ) -> Result<StudentActivity, ActivityProgressError> {
        let student_id = require_student(identity)?;
        let (_, definition) = self.locate(activity).await?;
        if let Some(answers) = &answers {
            answers.check_type(definition.activity_type())?;
        }

        let now = self.clock.now();
        let mut record = self
            .records
            .get_student_activity(student_id, activity.activity_id)
            .await?
            .unwrap_or_else(|| StudentActivity::start(student_id, activity, now));
        record.save_draft(answers, time_spent_minutes, now)?;
        self.records.upsert_student_activity(&record).await?;

        tracing::debug!(
            student = %student_id,
            activity = %activity.activity_id,
            minutes = time_spent_minutes,
            "draft saved"
        );
        Ok(record)
    }

    /// Timer for the one-minute "time spent" ticks of an open activity view,
    /// resuming from the minutes already recorded.
    ///
    /// # Errors
    ///
    /// Returns `NotAuthenticated` or `Storage`.
    pub async fn resume_timer(
        &self,
        identity: &Identity,
        activity_id: ActivityId,
    ) -> Result<ActivityTimer, ActivityProgressError> {
        let student_id = require_student(identity)?;
        let base = self
            .records
            .get_student_activity(student_id, activity_id)
            .await?
            .map_or(0, |r| r.time_spent_minutes());
        Ok(ActivityTimer::resume(self.clock.now(), base))
    }

    /// `in_progress → completed`.
    ///
    /// Awards the activity's points (10 when unset) and records the activity
    /// on the student's active assignment in the same transaction as the
    /// progress record.
    ///
    /// # Errors
    ///
    /// Returns `NotAuthenticated`, `ProgramNotFound`/`ActivityNotFound`,
    /// `AlreadyCompleted`, `Activity` for mismatched answers,
    /// `StudentNotFound`, or `Storage`. Nothing is written on error.
    pub async fn complete_activity(
        &self,
        identity: &Identity,
        activity: ActivityRef,
        answers: Option<ActivityAnswers>,
        notes: Option<String>,
    ) -> Result<CompletedActivity, ActivityProgressError> {
        let student_id = require_student(identity)?;
        let (program, definition) = self.locate(activity).await?;
        if let Some(answers) = &answers {
            answers.check_type(definition.activity_type())?;
        }
        let quiz_score = answers
            .as_ref()
            .and_then(|a| definition.content().quiz_score(a));
        let points = definition.points_or_default();

        let now = self.clock.now();
        let mut record = self
            .records
            .get_student_activity(student_id, activity.activity_id)
            .await?
            .unwrap_or_else(|| StudentActivity::start(student_id, activity, now));
        if record.status().is_done() {
            return Err(ActivityProgressError::AlreadyCompleted(activity.activity_id));
        }
        record.complete(answers, notes, points, now)?;

        let outcome = self
            .completions
            .commit_completion(CompletionCommit {
                record: record.clone(),
                program_total: program.total_activities(),
            })
            .await
            .map_err(|e| match e {
                StorageError::Conflict => {
                    ActivityProgressError::AlreadyCompleted(activity.activity_id)
                }
                StorageError::NotFound => ActivityProgressError::StudentNotFound(student_id),
                other => other.into(),
            })?;

        tracing::info!(
            student = %student_id,
            activity = %activity.activity_id,
            points,
            total_points = outcome.total_points,
            "activity completed"
        );
        Ok(CompletedActivity {
            record,
            assignment: outcome.assignment,
            total_points: outcome.total_points,
            quiz_score,
        })
    }

    /// Progress of `student_id` through `program_id`, per module and overall.
    ///
    /// # Errors
    ///
    /// Returns `ProgramNotFound` or `Storage`.
    pub async fn program_progress(
        &self,
        student_id: StudentId,
        program_id: ProgramId,
    ) -> Result<ProgramProgress, ActivityProgressError> {
        let program = self.load_program(program_id).await?;
        let records: HashMap<ActivityId, StudentActivity> = self
            .records
            .activities_for_program(student_id, program_id)
            .await?
            .into_iter()
            .map(|r| (r.activity_id(), r))
            .collect();

        let done = |id: &ActivityId| records.get(id).is_some_and(|r| r.status().is_done());
        let modules: Vec<ModuleProgress> = program
            .modules()
            .iter()
            .map(|module| {
                let total = module.total_activities();
                let completed = module
                    .activities
                    .iter()
                    .filter(|a| done(&a.id()))
                    .count();
                ModuleProgress {
                    module_id: module.id,
                    title: module.title.clone(),
                    completed,
                    total,
                    percent: completion_percent(completed, total),
                }
            })
            .collect();

        let completed = modules.iter().map(|m| m.completed).sum();
        let total = program.total_activities();
        let points_earned = records
            .values()
            .filter_map(StudentActivity::points_earned)
            .map(u64::from)
            .sum();

        Ok(ProgramProgress {
            program_id,
            modules,
            completed,
            total,
            percent: completion_percent(completed, total),
            points_earned,
        })
    }

    async fn load_program(&self, id: ProgramId) -> Result<Program, ActivityProgressError> {
        self.programs
            .get_program(id)
            .await?
            .ok_or(ActivityProgressError::ProgramNotFound(id))
    }

    /// Loads the program and checks that the activity sits in the given
    /// module.
    async fn locate(
        &self,
        activity: ActivityRef,
    ) -> Result<(Program, Activity), ActivityProgressError> {
        let program = self.load_program(activity.program_id).await?;
        let definition = match program.find_activity(activity.activity_id) {
            Some((module, definition)) if module.id == activity.module_id => definition.clone(),
            _ => {
                return Err(ActivityProgressError::ActivityNotFound {
                    activity: activity.activity_id,
                    program: activity.program_id,
                });
            }
        };
        Ok((program, definition))
    }
}

fn require_student(identity: &Identity) -> Result<StudentId, ActivityProgressError> {
    identity
        .student_id()
        .ok_or(ActivityProgressError::NotAuthenticated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use nexus_core::model::{
        ActivityContent, Module, ProfessionalId, QuizQuestion, Student,
    };
    use nexus_core::time::fixed_now;
    use storage::repository::{InMemoryRepository, StudentRepository};

    const STUDENT: Identity = Identity::Student(StudentId::new(1));

    fn quiz() -> Activity {
        Activity::new(
            ActivityId::new(2),
            "Quiz",
            ActivityContent::Quiz {
                questions: vec![
                    QuizQuestion {
                        prompt: "1 + 1".into(),
                        options: vec!["1".into(), "2".into()],
                        correct_option: 1,
                    },
                    QuizQuestion {
                        prompt: "2 + 2".into(),
                        options: vec!["4".into(), "5".into()],
                        correct_option: 0,
                    },
                ],
            },
            Some(30),
            5,
            true,
        )
        .unwrap()
    }

    fn text(id: u64) -> Activity {
        Activity::new(
            ActivityId::new(id),
            format!("Texto {id}"),
            ActivityContent::Text { body: "b".into() },
            None,
            5,
            true,
        )
        .unwrap()
    }

    fn activity_ref(module: u64, activity: u64) -> ActivityRef {
        ActivityRef::new(
            ProgramId::new(1),
            ModuleId::new(module),
            ActivityId::new(activity),
        )
    }

    async fn service() -> (ActivityProgressService, InMemoryRepository) {
        let repo = InMemoryRepository::new();
        repo.upsert_student(&Student::new(StudentId::new(1), "Ana", fixed_now()).unwrap())
            .await
            .unwrap();
        let program = Program::new(
            ProgramId::new(1),
            ProfessionalId::new(1),
            "Programa",
            None,
            vec![
                Module::new(ModuleId::new(1), "Um", vec![text(1), quiz()]),
                Module::new(ModuleId::new(2), "Dois", vec![text(3)]),
            ],
        )
        .unwrap();
        repo.upsert_program(&program).await.unwrap();

        let shared = Arc::new(repo.clone());
        let service = ActivityProgressService::new(
            Clock::Fixed(fixed_now()),
            shared.clone(),
            shared.clone(),
            shared,
        );
        (service, repo)
    }

    #[tokio::test]
    async fn anonymous_callers_are_rejected() {
        let (service, _) = service().await;
        let err = service
            .start_activity(&Identity::Anonymous, activity_ref(1, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, ActivityProgressError::NotAuthenticated));
    }

    #[tokio::test]
    async fn start_is_idempotent() {
        let (service, _) = service().await;
        let first = service
            .start_activity(&STUDENT, activity_ref(1, 1))
            .await
            .unwrap();
        service
            .save_draft(&STUDENT, activity_ref(1, 1), None, 4)
            .await
            .unwrap();
        let again = service
            .start_activity(&STUDENT, activity_ref(1, 1))
            .await
            .unwrap();
        assert_eq!(again.started_at(), first.started_at());
        assert_eq!(again.time_spent_minutes(), 4);
    }

    #[tokio::test]
    async fn activity_must_belong_to_module() {
        let (service, _) = service().await;
        let err = service
            .start_activity(&STUDENT, activity_ref(2, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, ActivityProgressError::ActivityNotFound { .. }));
    }

    #[tokio::test]
    async fn draft_rejects_answers_of_another_type() {
        let (service, _) = service().await;
        let err = service
            .save_draft(
                &STUDENT,
                activity_ref(1, 2),
                Some(ActivityAnswers::text("x")),
                1,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ActivityProgressError::Activity(_)));
    }

    #[tokio::test]
    async fn quiz_completion_scores_and_awards_points() {
        let (service, repo) = service().await;
        let done = service
            .complete_activity(
                &STUDENT,
                activity_ref(1, 2),
                Some(ActivityAnswers::Quiz {
                    selected: vec![Some(1), Some(1)],
                }),
                None,
            )
            .await
            .unwrap();
        assert_eq!(done.quiz_score, Some((1, 2)));
        assert_eq!(done.record.points_earned(), Some(30));
        assert_eq!(done.total_points, 30);
        assert!(done.assignment.is_none());

        let student = repo.get_student(StudentId::new(1)).await.unwrap().unwrap();
        assert_eq!(student.total_points(), 30);
    }

    #[tokio::test]
    async fn completing_twice_is_rejected() {
        let (service, _) = service().await;
        service
            .complete_activity(&STUDENT, activity_ref(1, 1), None, None)
            .await
            .unwrap();
        let err = service
            .complete_activity(&STUDENT, activity_ref(1, 1), None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ActivityProgressError::AlreadyCompleted(_)));
    }

    #[tokio::test]
    async fn program_progress_counts_per_module() {
        let (service, _) = service().await;
        service
            .complete_activity(&STUDENT, activity_ref(1, 1), None, None)
            .await
            .unwrap();
        service
            .start_activity(&STUDENT, activity_ref(2, 3))
            .await
            .unwrap();

        let progress = service
            .program_progress(StudentId::new(1), ProgramId::new(1))
            .await
            .unwrap();
        assert_eq!(progress.completed, 1);
        assert_eq!(progress.total, 3);
        assert_eq!(progress.percent, 33);
        assert_eq!(progress.points_earned, 10);
        assert_eq!(progress.modules[0].percent, 50);
        assert_eq!(progress.modules[1].percent, 0);
    }

    #[tokio::test]
    async fn timer_resumes_from_recorded_minutes() {
        let (service, _) = service().await;
        service
            .save_draft(&STUDENT, activity_ref(1, 1), None, 6)
            .await
            .unwrap();
        let timer = service
            .resume_timer(&STUDENT, ActivityId::new(1))
            .await
            .unwrap();
        assert_eq!(timer.elapsed_minutes(fixed_now() + Duration::minutes(2)), 8);
    }
}
