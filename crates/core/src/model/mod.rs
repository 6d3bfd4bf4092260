mod activity;
mod assignment;
mod day;
mod identity;
mod ids;
mod program;
mod progress;
mod schedule;
mod schedule_progress;
mod student;
mod student_activity;

pub use ids::{
    ActivityId, AssignmentId, ModuleId, ParseIdError, ProfessionalId, ProgramId, ScheduleId,
    StudentId,
};

pub use activity::{
    Activity, ActivityAnswers, ActivityContent, ActivityError, ActivityType,
    DEFAULT_ACTIVITY_POINTS, QuizQuestion,
};
pub use assignment::{Assignment, AssignmentError, AssignmentProgressUpdate, AssignmentStatus};
pub use day::{DayOfWeek, DayParseError};
pub use identity::{Identity, ProfessionalRole};
pub use program::{Module, Program, ProgramError};
pub use progress::completion_percent;
pub use schedule::{ScheduleActivity, ScheduleError, WeekDaySchedule, WeeklySchedule};
pub use schedule_progress::{
    ScheduleActivityProgress, ScheduleCompletion, ScheduleProgressChange, ScheduleProgressError,
    ScheduleProgressKey, completion_percentage,
};
pub use student::{Student, StudentError};
pub use student_activity::{ActivityRef, ActivityStatus, StudentActivity, StudentActivityError};
