use std::fmt;

use crate::model::ids::{ProfessionalId, StudentId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProfessionalRole {
    Psychologist,
    Psychiatrist,
    Monitor,
    Coordinator,
}

impl ProfessionalRole {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ProfessionalRole::Psychologist => "psychologist",
            ProfessionalRole::Psychiatrist => "psychiatrist",
            ProfessionalRole::Monitor => "monitor",
            ProfessionalRole::Coordinator => "coordinator",
        }
    }
}

impl fmt::Display for ProfessionalRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who is calling, as resolved by the authentication provider.
///
/// The ledger never talks to the provider itself; callers hand it the
/// resolved identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Identity {
    #[default]
    Anonymous,
    Student(StudentId),
    Professional {
        id: ProfessionalId,
        role: ProfessionalRole,
    },
}

impl Identity {
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        !matches!(self, Identity::Anonymous)
    }

    #[must_use]
    pub fn student_id(&self) -> Option<StudentId> {
        match self {
            Identity::Student(id) => Some(*id),
            _ => None,
        }
    }

    #[must_use]
    pub fn professional_id(&self) -> Option<ProfessionalId> {
        match self {
            Identity::Professional { id, .. } => Some(*id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymous_is_not_authenticated() {
        let who = Identity::default();
        assert!(!who.is_authenticated());
        assert_eq!(who.student_id(), None);
    }

    #[test]
    fn professional_has_no_student_id() {
        let who = Identity::Professional {
            id: ProfessionalId::new(3),
            role: ProfessionalRole::Monitor,
        };
        assert!(who.is_authenticated());
        assert_eq!(who.student_id(), None);
        assert_eq!(who.professional_id(), Some(ProfessionalId::new(3)));
    }
}
