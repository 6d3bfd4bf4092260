use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Error type for parsing an identifier from a string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    kind: &'static str,
}

impl ParseIdError {
    /// Name of the identifier type that failed to parse.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        self.kind
    }
}

impl fmt::Display for ParseIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to parse {} from string", self.kind)
    }
}

impl std::error::Error for ParseIdError {}

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            #[doc = concat!("Creates a new `", stringify!($name), "`")]
            #[must_use]
            pub const fn new(id: u64) -> Self {
                Self(id)
            }

            /// Returns the underlying u64 value
            #[must_use]
            pub const fn value(&self) -> u64 {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim()
                    .parse::<u64>()
                    .map(Self::new)
                    .map_err(|_| ParseIdError {
                        kind: stringify!($name),
                    })
            }
        }
    };
}

define_id!(
    /// Unique identifier for a Student
    StudentId
);
define_id!(
    /// Unique identifier for a Professional (psychologist, monitor, ...)
    ProfessionalId
);
define_id!(
    /// Unique identifier for a Program
    ProgramId
);
define_id!(
    /// Unique identifier for a Module inside a Program
    ModuleId
);
define_id!(
    /// Unique identifier for an Activity, either inside a Program module or
    /// embedded in a weekly schedule
    ActivityId
);
define_id!(
    /// Unique identifier for an Assignment (student ↔ program link)
    AssignmentId
);
define_id!(
    /// Unique identifier for a WeeklySchedule
    ScheduleId
);

// ─── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn student_id_display() {
        let id = StudentId::new(42);
        assert_eq!(id.to_string(), "42");
        assert_eq!(format!("{id:?}"), "StudentId(42)");
    }

    #[test]
    fn program_id_from_str() {
        let id: ProgramId = "123".parse().unwrap();
        assert_eq!(id, ProgramId::new(123));
    }

    #[test]
    fn activity_id_from_str_invalid_names_kind() {
        let err = "abc".parse::<ActivityId>().unwrap_err();
        assert_eq!(err.kind(), "ActivityId");
        assert_eq!(err.to_string(), "failed to parse ActivityId from string");
    }

    #[test]
    fn ids_serialize_as_plain_numbers() {
        let json = serde_json::to_string(&ScheduleId::new(7)).unwrap();
        assert_eq!(json, "7");
        let back: ScheduleId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ScheduleId::new(7));
    }
}
