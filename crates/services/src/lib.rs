#![forbid(unsafe_code)]

pub mod activity_progress_service;
pub mod app_services;
pub mod assignment_service;
pub mod error;
pub mod schedule_progress_service;

pub use nexus_core::Clock;

pub use activity_progress_service::{
    ActivityProgressService, CompletedActivity, ModuleProgress, ProgramProgress,
};
pub use app_services::NexusServices;
pub use assignment_service::{AssignProgramOutcome, AssignmentService};
pub use error::{
    ActivityProgressError, AssignmentServiceError, NexusServicesError,
    ScheduleProgressServiceError,
};
pub use schedule_progress_service::{ScheduleProgressService, ScheduleSummary};
