//! Shared error types for the services crate.
//!
//! Every error keeps its technical `Display` for logs and offers
//! `user_message()` with the Portuguese text shown to end users.

use thiserror::Error;

use nexus_core::model::{
    ActivityError, ActivityId, AssignmentError, AssignmentId, DayOfWeek, ProgramId, ScheduleId,
    StudentActivityError, StudentId,
};
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

const GENERIC_FAILURE: &str = "Não foi possível concluir a operação. Tente novamente.";

/// Errors emitted by `AssignmentService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AssignmentServiceError {
    #[error("student {0} not found")]
    StudentNotFound(StudentId),
    #[error("program {0} not found")]
    ProgramNotFound(ProgramId),
    #[error("assignment {0} not found")]
    AssignmentNotFound(AssignmentId),
    #[error("activity {activity} is not part of program {program}")]
    ActivityNotInProgram {
        activity: ActivityId,
        program: ProgramId,
    },
    #[error("program {program} missing from student {student} after write")]
    NotPersisted {
        student: StudentId,
        program: ProgramId,
    },
    #[error(transparent)]
    Assignment(#[from] AssignmentError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl AssignmentServiceError {
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::StudentNotFound(_) => "Aluno não encontrado.",
            Self::ProgramNotFound(_) => "Programa não encontrado.",
            Self::AssignmentNotFound(_) => "Atribuição não encontrada.",
            Self::ActivityNotInProgram { .. } => "A atividade não pertence a este programa.",
            Self::NotPersisted { .. } => {
                "Não foi possível atribuir o programa ao aluno. Tente novamente."
            }
            Self::Assignment(AssignmentError::InvalidProgress(_)) => {
                "O progresso deve estar entre 0 e 100."
            }
            Self::Assignment(AssignmentError::NotActive(_)) => "Esta atribuição foi removida.",
            Self::Assignment(_) | Self::Storage(_) => GENERIC_FAILURE,
        }
    }
}

/// Errors emitted by `ActivityProgressService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ActivityProgressError {
    #[error("no authenticated student")]
    NotAuthenticated,
    #[error("student {0} not found")]
    StudentNotFound(StudentId),
    #[error("program {0} not found")]
    ProgramNotFound(ProgramId),
    #[error("activity {activity} not found in program {program}")]
    ActivityNotFound {
        activity: ActivityId,
        program: ProgramId,
    },
    #[error("activity {0} is already completed")]
    AlreadyCompleted(ActivityId),
    #[error(transparent)]
    Activity(#[from] ActivityError),
    #[error(transparent)]
    Progress(#[from] StudentActivityError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ActivityProgressError {
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::NotAuthenticated => "Faça login para continuar.",
            Self::StudentNotFound(_) => "Aluno não encontrado.",
            Self::ProgramNotFound(_) => "Programa não encontrado.",
            Self::ActivityNotFound { .. } => "Atividade não encontrada.",
            Self::AlreadyCompleted(_) | Self::Progress(StudentActivityError::AlreadyCompleted) => {
                "Esta atividade já foi concluída."
            }
            Self::Activity(ActivityError::AnswerTypeMismatch { .. }) => {
                "As respostas não correspondem ao tipo da atividade."
            }
            Self::Activity(_) | Self::Progress(_) | Self::Storage(_) => {
                "Erro ao salvar o progresso da atividade. Tente novamente."
            }
        }
    }
}

/// Errors emitted by `ScheduleProgressService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ScheduleProgressServiceError {
    #[error("no authenticated student")]
    NotAuthenticated,
    #[error("schedule {0} not found")]
    ScheduleNotFound(ScheduleId),
    #[error("activity {activity} is not part of schedule {schedule}")]
    ActivityNotScheduled {
        activity: ActivityId,
        schedule: ScheduleId,
    },
    #[error("activity {activity} is scheduled on {expected}, not {found}")]
    WrongDay {
        activity: ActivityId,
        expected: DayOfWeek,
        found: DayOfWeek,
    },
    #[error(transparent)]
    Activity(#[from] ActivityError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ScheduleProgressServiceError {
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::NotAuthenticated => "Faça login para continuar.",
            Self::ScheduleNotFound(_) => "Cronograma não encontrado.",
            Self::ActivityNotScheduled { .. } => "Atividade não encontrada no cronograma.",
            Self::WrongDay { .. } => "Esta atividade não está agendada para este dia.",
            Self::Activity(ActivityError::AnswerTypeMismatch { .. }) => {
                "As respostas não correspondem ao tipo da atividade."
            }
            Self::Activity(_) | Self::Storage(_) => {
                "Erro ao atualizar o progresso do cronograma. Tente novamente."
            }
        }
    }
}

/// Errors emitted while bootstrapping `NexusServices`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum NexusServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl NexusServicesError {
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        "Não foi possível conectar ao banco de dados."
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus_core::model::{ActivityType, AssignmentStatus};

    #[test]
    fn storage_failures_share_a_generic_message() {
        let err = AssignmentServiceError::from(StorageError::Connection("io".into()));
        assert_eq!(err.user_message(), GENERIC_FAILURE);
        assert_eq!(err.to_string(), "connection error: io");
    }

    #[test]
    fn domain_errors_get_specific_messages() {
        let removed =
            AssignmentServiceError::from(AssignmentError::NotActive(AssignmentStatus::Inactive));
        assert_eq!(removed.user_message(), "Esta atribuição foi removida.");

        let mismatch = ActivityProgressError::from(ActivityError::AnswerTypeMismatch {
            expected: ActivityType::Quiz,
            found: ActivityType::Text,
        });
        assert_eq!(
            mismatch.user_message(),
            "As respostas não correspondem ao tipo da atividade."
        );

        let done = ActivityProgressError::from(StudentActivityError::AlreadyCompleted);
        assert_eq!(done.user_message(), "Esta atividade já foi concluída.");
    }
}
