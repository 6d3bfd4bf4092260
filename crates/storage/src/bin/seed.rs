use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, NaiveTime, Utc};
use nexus_core::model::{
    Activity, ActivityContent, ActivityId, ActivityType, DayOfWeek, Module, ModuleId,
    ProfessionalId, Program, ProgramId, QuizQuestion, ScheduleActivity, ScheduleId, Student,
    StudentId, WeekDaySchedule, WeeklySchedule,
};
use storage::repository::Storage;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
struct Args {
    db_url: String,
    students: u32,
    now: Option<DateTime<Utc>>,
}

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidDbUrl { raw: String },
    InvalidNow { raw: String },
    InvalidStudents { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidNow { raw } => {
                write!(f, "invalid --now value (expected RFC3339): {raw}")
            }
            ArgsError::InvalidStudents { raw } => write!(f, "invalid --students value: {raw}"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn parse_now(raw: String) -> Result<DateTime<Utc>, ArgsError> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| ArgsError::InvalidNow { raw })
}

impl Args {
    fn parse() -> Result<Self, ArgsError> {
        let mut db_url =
            std::env::var("NEXUS_DB_URL").unwrap_or_else(|_| "sqlite:nexus.sqlite3".into());
        let mut students = std::env::var("NEXUS_STUDENTS")
            .ok()
            .and_then(|value| value.parse::<u32>().ok())
            .unwrap_or(3);
        let mut now = std::env::var("NEXUS_NOW").ok().map(parse_now).transpose()?;

        let mut args = std::env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = value;
                }
                "--students" => {
                    let value = require_value(&mut args, "--students")?;
                    students = value
                        .parse::<u32>()
                        .map_err(|_| ArgsError::InvalidStudents { raw: value.clone() })?;
                }
                "--now" => {
                    now = Some(parse_now(require_value(&mut args, "--now")?)?);
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self {
            db_url,
            students,
            now,
        })
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p storage --bin seed -- [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <sqlite_url>         SQLite URL (default: sqlite:nexus.sqlite3)");
    eprintln!("  --students <n>            Number of sample students (default: 3)");
    eprintln!("  --now <rfc3339>           Fixed current time for deterministic seeding");
    eprintln!("  -h, --help                Show this help");
    eprintln!();
    eprintln!("Environment (same as flags):");
    eprintln!("  NEXUS_DB_URL, NEXUS_STUDENTS, NEXUS_NOW");
    eprintln!("Logging: RUST_LOG (default: info)");
}

const OWNER: ProfessionalId = ProfessionalId::new(1);

fn sample_program() -> Result<Program, nexus_core::Error> {
    let welcome = Module::new(
        ModuleId::new(1),
        "Boas-vindas",
        vec![
            Activity::new(
                ActivityId::new(1),
                "Apresentação",
                ActivityContent::Text {
                    body: "Conte um pouco sobre você.".into(),
                },
                None,
                10,
                true,
            )?,
            Activity::new(
                ActivityId::new(2),
                "Vídeo introdutório",
                ActivityContent::video("https://videos.example.org/intro")?,
                Some(5),
                8,
                false,
            )?,
        ],
    );
    let routine = Module::new(
        ModuleId::new(2),
        "Rotina",
        vec![
            Activity::new(
                ActivityId::new(3),
                "Checklist matinal",
                ActivityContent::Checklist {
                    items: vec!["Acordar".into(), "Beber água".into(), "Alongar".into()],
                },
                None,
                5,
                true,
            )?,
            Activity::new(
                ActivityId::new(4),
                "Quiz de revisão",
                ActivityContent::Quiz {
                    questions: vec![QuizQuestion {
                        prompt: "Quantas horas de sono são recomendadas?".into(),
                        options: vec!["4".into(), "8".into(), "12".into()],
                        correct_option: 1,
                    }],
                },
                Some(20),
                5,
                true,
            )?,
        ],
    );

    Ok(Program::new(
        ProgramId::new(1),
        OWNER,
        "Organização pessoal",
        Some("Programa introdutório de hábitos".into()),
        vec![welcome, routine],
    )?)
}

fn sample_schedule(students: BTreeSet<StudentId>) -> Result<WeeklySchedule, nexus_core::Error> {
    let slot = |id: u64, title: &str, kind: ActivityType, hour: u32| ScheduleActivity {
        id: ActivityId::new(id),
        title: title.to_owned(),
        activity_type: kind,
        description: None,
        start_time: NaiveTime::from_hms_opt(hour, 0, 0),
        duration_minutes: 30,
        points: None,
    };
    let days = vec![
        WeekDaySchedule {
            day: DayOfWeek::Monday,
            activities: vec![
                slot(101, "Planejar a semana", ActivityType::Text, 8),
                slot(102, "Caminhada", ActivityType::Habit, 18),
            ],
        },
        WeekDaySchedule {
            day: DayOfWeek::Wednesday,
            activities: vec![slot(103, "Leitura", ActivityType::Text, 20)],
        },
        WeekDaySchedule {
            day: DayOfWeek::Friday,
            activities: vec![slot(104, "Revisão semanal", ActivityType::Checklist, 17)],
        },
    ];

    Ok(WeeklySchedule::new(
        ScheduleId::new(1),
        OWNER,
        "Rotina semanal",
        days,
        students,
    )?)
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse().map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let storage = Storage::sqlite(&args.db_url).await?;
    let now = args.now.unwrap_or_else(Utc::now);

    let program = sample_program()?;
    storage.programs.upsert_program(&program).await?;

    let mut ids = BTreeSet::new();
    for i in 1..=args.students {
        let id = StudentId::new(u64::from(i));
        if storage.students.get_student(id).await?.is_none() {
            let student = Student::new(id, format!("Aluno {i}"), now)?;
            storage.students.upsert_student(&student).await?;
        }
        ids.insert(id);
    }

    let schedule = sample_schedule(ids)?;
    storage.schedules.upsert_schedule(&schedule).await?;

    tracing::info!(
        program = %program.id(),
        schedule = %schedule.id(),
        students = args.students,
        "seed complete"
    );
    println!(
        "Seeded program {} ({} activities), schedule {} and {} students into {}",
        program.id(),
        program.total_activities(),
        schedule.id(),
        args.students,
        args.db_url
    );

    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
