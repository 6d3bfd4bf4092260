use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::ids::{ProgramId, StudentId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum StudentError {
    #[error("student name cannot be empty")]
    EmptyName,

    #[error("student level must be >= 1")]
    InvalidLevel,
}

/// A student profile as seen by the progress ledger.
///
/// Students are never deleted; `deactivate` flips `active` off instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Student {
    id: StudentId,
    name: String,
    assigned_programs: BTreeSet<ProgramId>,
    total_points: u64,
    streak: u32,
    level: u32,
    active: bool,
    created_at: DateTime<Utc>,
}

impl Student {
    /// Creates a fresh, active student with no points and level 1.
    ///
    /// # Errors
    ///
    /// Returns `StudentError::EmptyName` if the name is blank.
    pub fn new(
        id: StudentId,
        name: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, StudentError> {
        Self::from_persisted(id, name, BTreeSet::new(), 0, 0, 1, true, created_at)
    }

    /// Rehydrates a student from storage.
    ///
    /// # Errors
    ///
    /// Returns `StudentError` if the persisted name or level is invalid.
    #[allow(clippy::too_many_arguments)]
    pub fn from_persisted(
        id: StudentId,
        name: impl Into<String>,
        assigned_programs: BTreeSet<ProgramId>,
        total_points: u64,
        streak: u32,
        level: u32,
        active: bool,
        created_at: DateTime<Utc>,
    ) -> Result<Self, StudentError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(StudentError::EmptyName);
        }
        if level == 0 {
            return Err(StudentError::InvalidLevel);
        }
        Ok(Self {
            id,
            name,
            assigned_programs,
            total_points,
            streak,
            level,
            active,
            created_at,
        })
    }

    #[must_use]
    pub fn id(&self) -> StudentId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn assigned_programs(&self) -> &BTreeSet<ProgramId> {
        &self.assigned_programs
    }

    #[must_use]
    pub fn is_assigned(&self, program: ProgramId) -> bool {
        self.assigned_programs.contains(&program)
    }

    /// Adds `program` to the assigned set. Returns `false` if already present.
    pub fn assign_program(&mut self, program: ProgramId) -> bool {
        self.assigned_programs.insert(program)
    }

    #[must_use]
    pub fn total_points(&self) -> u64 {
        self.total_points
    }

    /// Numeric point award; saturates rather than overflowing.
    pub fn award_points(&mut self, points: u32) {
        self.total_points = self.total_points.saturating_add(u64::from(points));
    }

    #[must_use]
    pub fn streak(&self) -> u32 {
        self.streak
    }

    #[must_use]
    pub fn level(&self) -> u32 {
        self.level
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn deactivate(&mut self) {
        self.active = false;
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    fn student() -> Student {
        Student::new(StudentId::new(1), "Ana", fixed_now()).unwrap()
    }

    #[test]
    fn new_student_starts_at_level_one() {
        let s = student();
        assert_eq!(s.level(), 1);
        assert_eq!(s.total_points(), 0);
        assert!(s.is_active());
    }

    #[test]
    fn assigning_twice_keeps_one_entry() {
        let mut s = student();
        assert!(s.assign_program(ProgramId::new(3)));
        assert!(!s.assign_program(ProgramId::new(3)));
        assert_eq!(s.assigned_programs().len(), 1);
    }

    #[test]
    fn points_accumulate_numerically() {
        let mut s = student();
        s.award_points(10);
        s.award_points(15);
        assert_eq!(s.total_points(), 25);
    }

    #[test]
    fn zero_level_is_rejected() {
        let err = Student::from_persisted(
            StudentId::new(1),
            "Ana",
            BTreeSet::new(),
            0,
            0,
            0,
            true,
            fixed_now(),
        )
        .unwrap_err();
        assert_eq!(err, StudentError::InvalidLevel);
    }

    #[test]
    fn deactivate_keeps_the_record() {
        let mut s = student();
        s.deactivate();
        assert!(!s.is_active());
        assert_eq!(s.name(), "Ana");
    }
}
