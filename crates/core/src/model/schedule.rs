use std::collections::{BTreeSet, HashSet};

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::activity::ActivityType;
use crate::model::day::DayOfWeek;
use crate::model::ids::{ActivityId, ProfessionalId, ScheduleId, StudentId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ScheduleError {
    #[error("schedule title cannot be empty")]
    EmptyTitle,

    #[error("schedule activity title cannot be empty")]
    EmptyActivityTitle,

    #[error("activity {0} appears more than once in the schedule")]
    DuplicateActivity(ActivityId),
}

/// Activity definition embedded directly in a weekly schedule.
///
/// Denormalized: it does not reference program activities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleActivity {
    pub id: ActivityId,
    pub title: String,
    pub activity_type: ActivityType,
    pub description: Option<String>,
    pub start_time: Option<NaiveTime>,
    pub duration_minutes: u32,
    pub points: Option<u32>,
}

/// Ordered activities for one day of the week.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeekDaySchedule {
    pub day: DayOfWeek,
    pub activities: Vec<ScheduleActivity>,
}

/// Recurring weekly routine, independent of program assignments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklySchedule {
    id: ScheduleId,
    owner: ProfessionalId,
    title: String,
    days: Vec<WeekDaySchedule>,
    assigned_students: BTreeSet<StudentId>,
}

impl WeeklySchedule {
    /// Builds a schedule with exactly one `WeekDaySchedule` per day, Monday
    /// first. Days missing from `days` are filled in empty; repeated days are
    /// merged in order.
    ///
    /// # Errors
    ///
    /// Returns `ScheduleError` for blank titles or an activity id used twice
    /// (progress is keyed by activity, so each id may sit on one day only).
    pub fn new(
        id: ScheduleId,
        owner: ProfessionalId,
        title: impl Into<String>,
        days: Vec<WeekDaySchedule>,
        assigned_students: BTreeSet<StudentId>,
    ) -> Result<Self, ScheduleError> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(ScheduleError::EmptyTitle);
        }

        let mut week: Vec<WeekDaySchedule> = DayOfWeek::ALL
            .into_iter()
            .map(|day| WeekDaySchedule {
                day,
                activities: Vec::new(),
            })
            .collect();
        let mut seen = HashSet::new();
        for entry in days {
            for activity in &entry.activities {
                if activity.title.trim().is_empty() {
                    return Err(ScheduleError::EmptyActivityTitle);
                }
                if !seen.insert(activity.id) {
                    return Err(ScheduleError::DuplicateActivity(activity.id));
                }
            }
            week[entry.day.index()].activities.extend(entry.activities);
        }

        Ok(Self {
            id,
            owner,
            title,
            days: week,
            assigned_students,
        })
    }

    #[must_use]
    pub fn id(&self) -> ScheduleId {
        self.id
    }

    #[must_use]
    pub fn owner(&self) -> ProfessionalId {
        self.owner
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn days(&self) -> &[WeekDaySchedule] {
        &self.days
    }

    #[must_use]
    pub fn activities_on(&self, day: DayOfWeek) -> &[ScheduleActivity] {
        self.days
            .get(day.index())
            .map_or(&[], |d| d.activities.as_slice())
    }

    #[must_use]
    pub fn total_activities(&self) -> usize {
        self.days.iter().map(|d| d.activities.len()).sum()
    }

    /// Finds an activity and the day it is scheduled on.
    #[must_use]
    pub fn find_activity(&self, id: ActivityId) -> Option<(DayOfWeek, &ScheduleActivity)> {
        self.days.iter().find_map(|d| {
            d.activities
                .iter()
                .find(|a| a.id == id)
                .map(|a| (d.day, a))
        })
    }

    #[must_use]
    pub fn day_of(&self, id: ActivityId) -> Option<DayOfWeek> {
        self.find_activity(id).map(|(day, _)| day)
    }

    #[must_use]
    pub fn assigned_students(&self) -> &BTreeSet<StudentId> {
        &self.assigned_students
    }

    #[must_use]
    pub fn is_assigned(&self, student: StudentId) -> bool {
        self.assigned_students.contains(&student)
    }

    /// Returns `false` if the student was already assigned.
    pub fn assign_student(&mut self, student: StudentId) -> bool {
        self.assigned_students.insert(student)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: u64) -> ScheduleActivity {
        ScheduleActivity {
            id: ActivityId::new(id),
            title: format!("Rotina {id}"),
            activity_type: ActivityType::Habit,
            description: None,
            start_time: NaiveTime::from_hms_opt(8, 0, 0),
            duration_minutes: 15,
            points: None,
        }
    }

    fn schedule(days: Vec<WeekDaySchedule>) -> Result<WeeklySchedule, ScheduleError> {
        WeeklySchedule::new(
            ScheduleId::new(1),
            ProfessionalId::new(1),
            "Semana",
            days,
            BTreeSet::new(),
        )
    }

    #[test]
    fn always_has_seven_days_in_order() {
        let s = schedule(vec![WeekDaySchedule {
            day: DayOfWeek::Friday,
            activities: vec![item(1)],
        }])
        .unwrap();
        assert_eq!(s.days().len(), 7);
        assert_eq!(s.days()[0].day, DayOfWeek::Monday);
        assert_eq!(s.activities_on(DayOfWeek::Friday).len(), 1);
        assert!(s.activities_on(DayOfWeek::Monday).is_empty());
    }

    #[test]
    fn locates_activity_day() {
        let s = schedule(vec![
            WeekDaySchedule {
                day: DayOfWeek::Monday,
                activities: vec![item(1), item(2)],
            },
            WeekDaySchedule {
                day: DayOfWeek::Sunday,
                activities: vec![item(3)],
            },
        ])
        .unwrap();
        assert_eq!(s.total_activities(), 3);
        assert_eq!(s.day_of(ActivityId::new(3)), Some(DayOfWeek::Sunday));
        assert_eq!(s.day_of(ActivityId::new(9)), None);
    }

    #[test]
    fn activity_ids_are_unique_across_days() {
        let err = schedule(vec![
            WeekDaySchedule {
                day: DayOfWeek::Monday,
                activities: vec![item(1)],
            },
            WeekDaySchedule {
                day: DayOfWeek::Tuesday,
                activities: vec![item(1)],
            },
        ])
        .unwrap_err();
        assert_eq!(err, ScheduleError::DuplicateActivity(ActivityId::new(1)));
    }

    #[test]
    fn assign_student_is_idempotent() {
        let mut s = schedule(vec![]).unwrap();
        assert!(s.assign_student(StudentId::new(4)));
        assert!(!s.assign_student(StudentId::new(4)));
        assert!(s.is_assigned(StudentId::new(4)));
    }
}
