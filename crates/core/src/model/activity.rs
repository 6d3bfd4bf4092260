use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::model::day::DayOfWeek;
use crate::model::ids::ActivityId;

/// Points awarded for completing an activity whose `points` are unset.
pub const DEFAULT_ACTIVITY_POINTS: u32 = 10;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ActivityError {
    #[error("activity title cannot be empty")]
    EmptyTitle,

    #[error("unknown activity type: {0}")]
    UnknownType(String),

    #[error("video url must use http or https: {0}")]
    InvalidVideoUrl(String),

    #[error("checklist must contain at least one item")]
    EmptyChecklist,

    #[error("quiz must contain at least one question")]
    EmptyQuiz,

    #[error("quiz question {question} has no option at index {index}")]
    InvalidCorrectOption { question: usize, index: usize },

    #[error("habit must be scheduled on at least one day")]
    EmptyHabitDays,

    #[error("answers for a {found} activity cannot be stored on a {expected} activity")]
    AnswerTypeMismatch {
        expected: ActivityType,
        found: ActivityType,
    },
}

//
// ─── ACTIVITY TYPE ─────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityType {
    Text,
    Checklist,
    Video,
    Quiz,
    File,
    Habit,
}

impl ActivityType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ActivityType::Text => "text",
            ActivityType::Checklist => "checklist",
            ActivityType::Video => "video",
            ActivityType::Quiz => "quiz",
            ActivityType::File => "file",
            ActivityType::Habit => "habit",
        }
    }

    /// Parses the lowercase storage representation.
    ///
    /// # Errors
    ///
    /// Returns `ActivityError::UnknownType` for anything else.
    pub fn parse(s: &str) -> Result<Self, ActivityError> {
        match s {
            "text" => Ok(ActivityType::Text),
            "checklist" => Ok(ActivityType::Checklist),
            "video" => Ok(ActivityType::Video),
            "quiz" => Ok(ActivityType::Quiz),
            "file" => Ok(ActivityType::File),
            "habit" => Ok(ActivityType::Habit),
            other => Err(ActivityError::UnknownType(other.to_owned())),
        }
    }
}

impl fmt::Display for ActivityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//
// ─── CONTENT ───────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub prompt: String,
    pub options: Vec<String>,
    pub correct_option: usize,
}

impl QuizQuestion {
    #[must_use]
    pub fn is_correct(&self, selected: Option<usize>) -> bool {
        selected == Some(self.correct_option)
    }
}

/// Type-specific payload of an activity definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ActivityContent {
    Text { body: String },
    Checklist { items: Vec<String> },
    Video { url: Url },
    Quiz { questions: Vec<QuizQuestion> },
    File { reference: String },
    Habit { days: BTreeSet<DayOfWeek>, times_per_day: u32 },
}

impl ActivityContent {
    /// Builds video content, accepting only http(s) URLs.
    ///
    /// # Errors
    ///
    /// Returns `ActivityError::InvalidVideoUrl` if the URL does not parse or
    /// uses another scheme.
    pub fn video(raw: &str) -> Result<Self, ActivityError> {
        let url = Url::parse(raw.trim())
            .map_err(|_| ActivityError::InvalidVideoUrl(raw.to_owned()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ActivityError::InvalidVideoUrl(raw.to_owned()));
        }
        Ok(Self::Video { url })
    }

    #[must_use]
    pub fn activity_type(&self) -> ActivityType {
        match self {
            ActivityContent::Text { .. } => ActivityType::Text,
            ActivityContent::Checklist { .. } => ActivityType::Checklist,
            ActivityContent::Video { .. } => ActivityType::Video,
            ActivityContent::Quiz { .. } => ActivityType::Quiz,
            ActivityContent::File { .. } => ActivityType::File,
            ActivityContent::Habit { .. } => ActivityType::Habit,
        }
    }

    fn validate(&self) -> Result<(), ActivityError> {
        match self {
            ActivityContent::Checklist { items } if items.is_empty() => {
                Err(ActivityError::EmptyChecklist)
            }
            ActivityContent::Quiz { questions } => {
                if questions.is_empty() {
                    return Err(ActivityError::EmptyQuiz);
                }
                for (question, q) in questions.iter().enumerate() {
                    if q.correct_option >= q.options.len() {
                        return Err(ActivityError::InvalidCorrectOption {
                            question,
                            index: q.correct_option,
                        });
                    }
                }
                Ok(())
            }
            ActivityContent::Habit { days, .. } if days.is_empty() => {
                Err(ActivityError::EmptyHabitDays)
            }
            _ => Ok(()),
        }
    }

    /// Scores quiz answers as `(correct, total)`.
    ///
    /// Returns `None` unless both the content and the answers are quizzes.
    #[must_use]
    pub fn quiz_score(&self, answers: &ActivityAnswers) -> Option<(usize, usize)> {
        let (ActivityContent::Quiz { questions }, ActivityAnswers::Quiz { selected }) =
            (self, answers)
        else {
            return None;
        };
        let correct = questions
            .iter()
            .enumerate()
            .filter(|(i, q)| q.is_correct(selected.get(*i).copied().flatten()))
            .count();
        Some((correct, questions.len()))
    }
}

//
// ─── ANSWERS ───────────────────────────────────────────────────────────────────
//

/// Student answers, one shape per activity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ActivityAnswers {
    Text {
        response: String,
    },
    Checklist {
        checked: BTreeSet<usize>,
    },
    Video {
        watched: bool,
        seconds_watched: u32,
    },
    /// One entry per question; `None` means unanswered.
    Quiz {
        selected: Vec<Option<usize>>,
    },
    File {
        reference: String,
    },
    Habit {
        days_done: BTreeSet<DayOfWeek>,
    },
}

impl ActivityAnswers {
    #[must_use]
    pub fn text(response: impl Into<String>) -> Self {
        Self::Text {
            response: response.into(),
        }
    }

    #[must_use]
    pub fn activity_type(&self) -> ActivityType {
        match self {
            ActivityAnswers::Text { .. } => ActivityType::Text,
            ActivityAnswers::Checklist { .. } => ActivityType::Checklist,
            ActivityAnswers::Video { .. } => ActivityType::Video,
            ActivityAnswers::Quiz { .. } => ActivityType::Quiz,
            ActivityAnswers::File { .. } => ActivityType::File,
            ActivityAnswers::Habit { .. } => ActivityType::Habit,
        }
    }

    /// Ensures the answers fit an activity of the given type.
    ///
    /// # Errors
    ///
    /// Returns `ActivityError::AnswerTypeMismatch` when the variants differ.
    pub fn check_type(&self, expected: ActivityType) -> Result<(), ActivityError> {
        let found = self.activity_type();
        if found == expected {
            Ok(())
        } else {
            Err(ActivityError::AnswerTypeMismatch { expected, found })
        }
    }
}

//
// ─── ACTIVITY ──────────────────────────────────────────────────────────────────
//

/// Smallest unit of work inside a program module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    id: ActivityId,
    title: String,
    content: ActivityContent,
    points: Option<u32>,
    estimated_minutes: u32,
    is_required: bool,
}

impl Activity {
    /// Creates a validated activity.
    ///
    /// # Errors
    ///
    /// Returns `ActivityError` if the title is blank or the content payload is
    /// malformed (empty checklist, quiz answer key out of range, ...).
    pub fn new(
        id: ActivityId,
        title: impl Into<String>,
        content: ActivityContent,
        points: Option<u32>,
        estimated_minutes: u32,
        is_required: bool,
    ) -> Result<Self, ActivityError> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(ActivityError::EmptyTitle);
        }
        content.validate()?;

        Ok(Self {
            id,
            title,
            content,
            points,
            estimated_minutes,
            is_required,
        })
    }

    #[must_use]
    pub fn id(&self) -> ActivityId {
        self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn content(&self) -> &ActivityContent {
        &self.content
    }

    #[must_use]
    pub fn activity_type(&self) -> ActivityType {
        self.content.activity_type()
    }

    #[must_use]
    pub fn points(&self) -> Option<u32> {
        self.points
    }

    /// Points awarded on completion, falling back to `DEFAULT_ACTIVITY_POINTS`.
    #[must_use]
    pub fn points_or_default(&self) -> u32 {
        self.points.unwrap_or(DEFAULT_ACTIVITY_POINTS)
    }

    #[must_use]
    pub fn estimated_minutes(&self) -> u32 {
        self.estimated_minutes
    }

    #[must_use]
    pub fn is_required(&self) -> bool {
        self.is_required
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
