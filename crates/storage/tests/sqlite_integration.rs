use std::collections::BTreeSet;

use chrono::Duration;
use nexus_core::model::{
    Activity, ActivityAnswers, ActivityContent, ActivityId, ActivityRef, ActivityStatus,
    ActivityType, AssignmentStatus, DayOfWeek, Module, ModuleId, ProfessionalId, Program,
    ProgramId, ScheduleActivity, ScheduleCompletion, ScheduleId, ScheduleProgressChange,
    ScheduleProgressKey, Student, StudentActivity, StudentId, WeekDaySchedule, WeeklySchedule,
};
use nexus_core::time::fixed_now;
use storage::repository::{
    AssignmentRepository, CompletionCommit, NewAssignmentRecord, ProgramRepository,
    ProgressPersistence, ScheduleProgressRepository, ScheduleRepository, StorageError,
    StudentActivityRepository, StudentRepository,
};
use storage::sqlite::SqliteRepository;

async fn connect(name: &str) -> SqliteRepository {
    let repo = SqliteRepository::connect(&format!("sqlite:file:{name}?mode=memory&cache=shared"))
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");
    repo
}

fn text_activity(id: u64) -> Activity {
    Activity::new(
        ActivityId::new(id),
        format!("Atividade {id}"),
        ActivityContent::Text {
            body: "Escreva".into(),
        },
        None,
        5,
        true,
    )
    .unwrap()
}

fn program(id: u64, activities: &[u64]) -> Program {
    Program::new(
        ProgramId::new(id),
        ProfessionalId::new(1),
        "Programa",
        None,
        vec![Module::new(
            ModuleId::new(1),
            "Módulo",
            activities.iter().copied().map(text_activity).collect(),
        )],
    )
    .unwrap()
}

fn completed(student: u64, program: u64, activity: u64, points: u32) -> StudentActivity {
    let mut record = StudentActivity::start(
        StudentId::new(student),
        ActivityRef::new(
            ProgramId::new(program),
            ModuleId::new(1),
            ActivityId::new(activity),
        ),
        fixed_now(),
    );
    record
        .complete(
            Some(ActivityAnswers::text("feito")),
            Some("ok".into()),
            points,
            fixed_now() + Duration::minutes(3),
        )
        .unwrap();
    record
}

#[tokio::test]
async fn sqlite_student_union_is_idempotent() {
    let repo = connect("memdb_student_union").await;
    let student = Student::new(StudentId::new(1), "Ana", fixed_now()).unwrap();
    repo.upsert_student(&student).await.unwrap();

    repo.add_assigned_program(StudentId::new(1), ProgramId::new(7))
        .await
        .unwrap();
    repo.add_assigned_program(StudentId::new(1), ProgramId::new(7))
        .await
        .unwrap();

    let fetched = repo.get_student(StudentId::new(1)).await.unwrap().unwrap();
    assert_eq!(
        fetched.assigned_programs(),
        &BTreeSet::from([ProgramId::new(7)])
    );

    let err = repo
        .add_assigned_program(StudentId::new(2), ProgramId::new(7))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::NotFound));
}

#[tokio::test]
async fn sqlite_documents_round_trip() {
    let repo = connect("memdb_documents").await;
    let program = program(3, &[1, 2, 3]);
    repo.upsert_program(&program).await.unwrap();
    assert_eq!(
        repo.get_program(ProgramId::new(3)).await.unwrap(),
        Some(program.clone())
    );
    assert_eq!(
        repo.programs_by_owner(ProfessionalId::new(1)).await.unwrap(),
        vec![program]
    );

    let schedule = WeeklySchedule::new(
        ScheduleId::new(1),
        ProfessionalId::new(1),
        "Semana",
        vec![WeekDaySchedule {
            day: DayOfWeek::Tuesday,
            activities: vec![ScheduleActivity {
                id: ActivityId::new(50),
                title: "Meditar".into(),
                activity_type: ActivityType::Habit,
                description: None,
                start_time: None,
                duration_minutes: 10,
                points: Some(3),
            }],
        }],
        BTreeSet::from([StudentId::new(4)]),
    )
    .unwrap();
    repo.upsert_schedule(&schedule).await.unwrap();

    let for_student = repo.schedules_for_student(StudentId::new(4)).await.unwrap();
    assert_eq!(for_student, vec![schedule]);
    assert!(
        repo.schedules_for_student(StudentId::new(5))
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn sqlite_assignments_filter_and_order() {
    let repo = connect("memdb_assignments").await;
    let record = |program: u64, minutes: i64| NewAssignmentRecord {
        student_id: StudentId::new(1),
        program_id: ProgramId::new(program),
        assigned_by: Some(ProfessionalId::new(9)),
        assigned_at: fixed_now() + Duration::minutes(minutes),
    };

    let first = repo.insert_new_assignment(record(1, 0)).await.unwrap();
    let second = repo.insert_new_assignment(record(2, 10)).await.unwrap();
    let third = repo.insert_new_assignment(record(3, 20)).await.unwrap();

    let mut paused = repo.get_assignment(third).await.unwrap().unwrap();
    paused.set_status(AssignmentStatus::Paused);
    repo.update_assignment(&paused).await.unwrap();

    let ids: Vec<_> = repo
        .active_assignments(StudentId::new(1))
        .await
        .unwrap()
        .iter()
        .map(|a| a.id())
        .collect();
    assert_eq!(ids, vec![second, first]);

    let found = repo
        .find_active_assignment(StudentId::new(1), ProgramId::new(1))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.id(), first);
    assert_eq!(found.assigned_by(), Some(ProfessionalId::new(9)));
}

#[tokio::test]
async fn sqlite_completion_commit_is_atomic() {
    let repo = connect("memdb_completion").await;
    repo.upsert_student(&Student::new(StudentId::new(1), "Ana", fixed_now()).unwrap())
        .await
        .unwrap();
    repo.insert_new_assignment(NewAssignmentRecord {
        student_id: StudentId::new(1),
        program_id: ProgramId::new(1),
        assigned_by: None,
        assigned_at: fixed_now(),
    })
    .await
    .unwrap();

    let commit = CompletionCommit {
        record: completed(1, 1, 2, 10),
        program_total: 4,
    };
    let outcome = repo.commit_completion(commit.clone()).await.unwrap();
    assert_eq!(outcome.total_points, 10);
    assert_eq!(outcome.assignment.unwrap().progress(), 25);

    let stored = repo
        .get_student_activity(StudentId::new(1), ActivityId::new(2))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status(), ActivityStatus::Completed);
    assert_eq!(stored.points_earned(), Some(10));
    assert_eq!(stored.answers(), Some(&ActivityAnswers::text("feito")));

    let err = repo.commit_completion(commit).await.unwrap_err();
    assert!(matches!(err, StorageError::Conflict));
    let student = repo.get_student(StudentId::new(1)).await.unwrap().unwrap();
    assert_eq!(student.total_points(), 10);
}

#[tokio::test]
async fn sqlite_completion_rolls_back_for_missing_student() {
    let repo = connect("memdb_rollback").await;
    let err = repo
        .commit_completion(CompletionCommit {
            record: completed(8, 1, 2, 10),
            program_total: 4,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::NotFound));
    assert!(
        repo.activities_for_program(StudentId::new(8), ProgramId::new(1))
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn sqlite_schedule_progress_upserts_and_orders() {
    let repo = connect("memdb_schedule_progress").await;
    let key = |a| ScheduleProgressKey::new(StudentId::new(1), ScheduleId::new(1), ActivityId::new(a));

    let none = repo
        .apply_schedule_change(
            key(1),
            DayOfWeek::Monday,
            ScheduleProgressChange::Uncomplete,
            fixed_now(),
        )
        .await
        .unwrap();
    assert!(none.is_none());
    assert!(repo.get_schedule_progress(key(1)).await.unwrap().is_none());

    repo.apply_schedule_change(
        key(1),
        DayOfWeek::Monday,
        ScheduleProgressChange::Complete(ScheduleCompletion {
            time_spent_minutes: Some(12),
            ..ScheduleCompletion::default()
        }),
        fixed_now(),
    )
    .await
    .unwrap();
    repo.apply_schedule_change(
        key(2),
        DayOfWeek::Monday,
        ScheduleProgressChange::Complete(ScheduleCompletion::default()),
        fixed_now() + Duration::hours(2),
    )
    .await
    .unwrap();
    let noted = repo
        .apply_schedule_change(
            key(3),
            DayOfWeek::Friday,
            ScheduleProgressChange::SetNotes("cansado".into()),
            fixed_now(),
        )
        .await
        .unwrap()
        .unwrap();
    assert!(!noted.is_completed());
    assert_eq!(noted.notes(), Some("cansado"));

    let order: Vec<u64> = repo
        .progress_for_student(StudentId::new(1))
        .await
        .unwrap()
        .iter()
        .map(|r| r.activity_id().value())
        .collect();
    assert_eq!(order, vec![2, 1, 3]);

    let undone = repo
        .apply_schedule_change(
            key(1),
            DayOfWeek::Monday,
            ScheduleProgressChange::Uncomplete,
            fixed_now(),
        )
        .await
        .unwrap()
        .unwrap();
    assert!(!undone.is_completed());
    assert_eq!(undone.time_spent_minutes(), 12);
    assert_eq!(
        repo.progress_for_schedule(StudentId::new(1), ScheduleId::new(1))
            .await
            .unwrap()
            .len(),
        3
    );
}
