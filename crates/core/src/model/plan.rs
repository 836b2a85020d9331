use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::model::position::Position;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StudyPlanError {
    #[error("study plan is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

//
// ─── KNOWLEDGE LEVEL ───────────────────────────────────────────────────────────
//

/// Learner level assessed at onboarding, also used as lesson difficulty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KnowledgeLevel {
    #[default]
    Beginner,
    Intermediate,
    Advanced,
}

impl KnowledgeLevel {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            KnowledgeLevel::Beginner => "beginner",
            KnowledgeLevel::Intermediate => "intermediate",
            KnowledgeLevel::Advanced => "advanced",
        }
    }
}

impl fmt::Display for KnowledgeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown knowledge level: {0}")]
pub struct ParseKnowledgeLevelError(String);

impl FromStr for KnowledgeLevel {
    type Err = ParseKnowledgeLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "beginner" => Ok(Self::Beginner),
            "intermediate" => Ok(Self::Intermediate),
            "advanced" => Ok(Self::Advanced),
            other => Err(ParseKnowledgeLevelError(other.to_owned())),
        }
    }
}

// Generated plans sometimes carry free-form difficulty labels; those are dropped.
fn lenient_level<'de, D>(deserializer: D) -> Result<Option<KnowledgeLevel>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.and_then(|s| s.parse().ok()))
}

//
// ─── PLAN TREE ─────────────────────────────────────────────────────────────────
//

/// Practice exercise attached to a lesson.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Exercise {
    pub description: String,
    pub code_template: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_output: Option<String>,
    pub hints: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Lesson {
    pub name: String,
    pub content: String,
    pub objectives: Vec<String>,
    pub exercise: Exercise,
    #[serde(
        deserialize_with = "lenient_level",
        skip_serializing_if = "Option::is_none"
    )]
    pub difficulty: Option<KnowledgeLevel>,
}

impl Lesson {
    #[must_use]
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Module {
    pub name: String,
    pub description: String,
    pub lessons: Vec<Lesson>,
}

impl Module {
    #[must_use]
    pub fn new(name: impl Into<String>, lessons: Vec<Lesson>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            lessons,
        }
    }

    /// Number of lessons in this module.
    #[must_use]
    pub fn lesson_count(&self) -> u32 {
        len_u32(self.lessons.len())
    }
}

/// Generated curriculum: ordered modules, each with ordered lessons.
///
/// Read-only once generated; progress tracking only reads lengths and entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StudyPlan {
    pub title: String,
    pub modules: Vec<Module>,
}

impl StudyPlan {
    #[must_use]
    pub fn new(title: impl Into<String>, modules: Vec<Module>) -> Self {
        Self {
            title: title.into(),
            modules,
        }
    }

    /// Parse a persisted plan blob.
    ///
    /// Missing `modules`/`lessons` arrays are treated as empty.
    ///
    /// # Errors
    ///
    /// Returns `StudyPlanError::Json` if the blob is not a JSON object of the expected shape.
    pub fn from_json(raw: &str) -> Result<Self, StudyPlanError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// # Errors
    ///
    /// Returns `StudyPlanError::Json` if serialization fails.
    pub fn to_json(&self) -> Result<String, StudyPlanError> {
        Ok(serde_json::to_string(self)?)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    #[must_use]
    pub fn module_count(&self) -> u32 {
        len_u32(self.modules.len())
    }

    /// Module by 1-based number.
    #[must_use]
    pub fn module(&self, number: u32) -> Option<&Module> {
        let index = usize::try_from(number.checked_sub(1)?).ok()?;
        self.modules.get(index)
    }

    /// Lesson at the given position, if the position is inside the plan.
    #[must_use]
    pub fn lesson(&self, position: Position) -> Option<&Lesson> {
        self.module(position.module())?
            .lessons
            .get(position.lesson_index())
    }

    /// Lesson count of the 1-based module, zero when the module does not exist.
    #[must_use]
    pub fn lesson_count(&self, module_number: u32) -> u32 {
        self.module(module_number).map_or(0, Module::lesson_count)
    }

    /// Sum of lesson counts over all modules.
    #[must_use]
    pub fn total_lessons(&self) -> u32 {
        self.modules
            .iter()
            .fold(0_u32, |acc, m| acc.saturating_add(m.lesson_count()))
    }
}

pub(crate) fn len_u32(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_lessons_default_to_empty() {
        let plan = StudyPlan::from_json(
            r#"{"modules":[{"name":"Basics"},{"name":"Loops","lessons":[{"name":"for"}]}]}"#,
        )
        .unwrap();
        assert_eq!(plan.module_count(), 2);
        assert_eq!(plan.lesson_count(1), 0);
        assert_eq!(plan.lesson_count(2), 1);
        assert_eq!(plan.total_lessons(), 1);
    }

    #[test]
    fn empty_object_is_empty_plan() {
        let plan = StudyPlan::from_json("{}").unwrap();
        assert!(plan.is_empty());
        assert_eq!(plan.total_lessons(), 0);
    }

    #[test]
    fn malformed_blob_is_a_typed_error() {
        let err = StudyPlan::from_json(r#"{"modules": 5}"#).unwrap_err();
        assert!(matches!(err, StudyPlanError::Json(_)));
    }

    #[test]
    fn lookups_are_one_based() {
        let plan = StudyPlan::new(
            "Python",
            vec![Module::new(
                "Basics",
                vec![Lesson::new("Variables", ""), Lesson::new("Types", "")],
            )],
        );
        assert!(plan.module(0).is_none());
        assert_eq!(plan.module(1).unwrap().name, "Basics");
        let lesson = plan.lesson(Position::new(1, 2).unwrap()).unwrap();
        assert_eq!(lesson.name, "Types");
        assert!(plan.lesson(Position::new(1, 3).unwrap()).is_none());
        assert!(plan.lesson(Position::new(2, 1).unwrap()).is_none());
        assert_eq!(plan.lesson_count(9), 0);
    }

    #[test]
    fn exercise_fields_use_camel_case() {
        let plan = StudyPlan::from_json(
            r#"{"modules":[{"name":"M","lessons":[{"name":"L","difficulty":"hard",
                "exercise":{"description":"d","codeTemplate":"print()","expectedOutput":"x"}}]}]}"#,
        )
        .unwrap();
        let lesson = plan.lesson(Position::start()).unwrap();
        assert_eq!(lesson.exercise.code_template, "print()");
        assert_eq!(lesson.exercise.expected_output.as_deref(), Some("x"));
        assert!(lesson.exercise.hints.is_empty());
        assert_eq!(lesson.difficulty, None);
    }

    #[test]
    fn knowledge_level_parses_case_insensitive() {
        assert_eq!(
            "Advanced".parse::<KnowledgeLevel>().unwrap(),
            KnowledgeLevel::Advanced
        );
        assert!("expert".parse::<KnowledgeLevel>().is_err());
    }
}
