use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::activity::Activity;
use crate::model::ids::{ActivityId, ModuleId, ProfessionalId, ProgramId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProgramError {
    #[error("program title cannot be empty")]
    EmptyTitle,

    #[error("module title cannot be empty")]
    EmptyModuleTitle,

    #[error("duplicate module id {0}")]
    DuplicateModule(ModuleId),

    #[error("duplicate activity id {0}")]
    DuplicateActivity(ActivityId),
}

/// Ordered group of activities inside a program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    pub id: ModuleId,
    pub title: String,
    pub activities: Vec<Activity>,
}

impl Module {
    #[must_use]
    pub fn new(id: ModuleId, title: impl Into<String>, activities: Vec<Activity>) -> Self {
        Self {
            id,
            title: title.into(),
            activities,
        }
    }

    #[must_use]
    pub fn total_activities(&self) -> usize {
        self.activities.len()
    }
}

/// A professional-authored program: ordered modules of ordered activities.
///
/// Module and activity ids are referenced by progress records, so the
/// structure is validated once on construction and never re-keyed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    id: ProgramId,
    owner: ProfessionalId,
    title: String,
    description: Option<String>,
    modules: Vec<Module>,
}

impl Program {
    /// Creates a validated program.
    ///
    /// # Errors
    ///
    /// Returns `ProgramError` for blank titles or ids that repeat across the
    /// program.
    pub fn new(
        id: ProgramId,
        owner: ProfessionalId,
        title: impl Into<String>,
        description: Option<String>,
        modules: Vec<Module>,
    ) -> Result<Self, ProgramError> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(ProgramError::EmptyTitle);
        }

        let mut module_ids = HashSet::new();
        let mut activity_ids = HashSet::new();
        for module in &modules {
            if module.title.trim().is_empty() {
                return Err(ProgramError::EmptyModuleTitle);
            }
            if !module_ids.insert(module.id) {
                return Err(ProgramError::DuplicateModule(module.id));
            }
            for activity in &module.activities {
                if !activity_ids.insert(activity.id()) {
                    return Err(ProgramError::DuplicateActivity(activity.id()));
                }
            }
        }

        Ok(Self {
            id,
            owner,
            title,
            description: description.filter(|d| !d.trim().is_empty()),
            modules,
        })
    }

    #[must_use]
    pub fn id(&self) -> ProgramId {
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
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    #[must_use]
    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    /// Number of activities across every module.
    #[must_use]
    pub fn total_activities(&self) -> usize {
        self.modules.iter().map(Module::total_activities).sum()
    }

    #[must_use]
    pub fn find_activity(&self, id: ActivityId) -> Option<(&Module, &Activity)> {
        self.modules.iter().find_map(|module| {
            module
                .activities
                .iter()
                .find(|a| a.id() == id)
                .map(|a| (module, a))
        })
    }

    #[must_use]
    pub fn contains_activity(&self, id: ActivityId) -> bool {
        self.find_activity(id).is_some()
    }

    pub fn activity_ids(&self) -> impl Iterator<Item = ActivityId> + '_ {
        self.modules
            .iter()
            .flat_map(|m| m.activities.iter().map(Activity::id))
    }
}
