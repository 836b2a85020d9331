use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::model::plan::len_u32;
use crate::model::position::Position;

//
// ─── UNDERSTANDING ─────────────────────────────────────────────────────────────
//

/// Self-reported (or assessed) understanding of a finished lesson.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Understanding {
    Poor,
    #[default]
    Fair,
    Good,
    Excellent,
}

impl Understanding {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Understanding::Poor => "poor",
            Understanding::Fair => "fair",
            Understanding::Good => "good",
            Understanding::Excellent => "excellent",
        }
    }
}

impl fmt::Display for Understanding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid understanding level: {0}")]
pub struct ParseUnderstandingError(String);

impl FromStr for Understanding {
    type Err = ParseUnderstandingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "poor" => Ok(Self::Poor),
            "fair" => Ok(Self::Fair),
            "good" => Ok(Self::Good),
            "excellent" => Ok(Self::Excellent),
            other => Err(ParseUnderstandingError(other.to_owned())),
        }
    }
}

//
// ─── RECORDS ───────────────────────────────────────────────────────────────────
//

/// A lesson marked as finished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedLesson {
    pub position: Position,
    pub completed_at: DateTime<Utc>,
    pub understanding: Understanding,
}

impl CompletedLesson {
    #[must_use]
    pub fn new(
        position: Position,
        understanding: Understanding,
        completed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            position,
            completed_at,
            understanding,
        }
    }
}

/// Result of marking a lesson completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkOutcome {
    NewlyCompleted,
    AlreadyCompleted,
}

//
// ─── COMPLETION SET ────────────────────────────────────────────────────────────
//

/// Completed lessons keyed by position, kept in insertion order for history display.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<CompletedLesson>", into = "Vec<CompletedLesson>")]
pub struct CompletedLessons {
    records: Vec<CompletedLesson>,
    index: HashSet<Position>,
}

impl CompletedLessons {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from persisted records; later duplicates of a position are dropped.
    pub fn from_records(records: impl IntoIterator<Item = CompletedLesson>) -> Self {
        let mut set = Self::new();
        for record in records {
            set.insert(record);
        }
        set
    }

    /// Record `position` as completed unless it already is.
    pub fn mark(
        &mut self,
        position: Position,
        understanding: Understanding,
        completed_at: DateTime<Utc>,
    ) -> MarkOutcome {
        if self.insert(CompletedLesson::new(position, understanding, completed_at)) {
            MarkOutcome::NewlyCompleted
        } else {
            MarkOutcome::AlreadyCompleted
        }
    }

    /// Insert a record; returns false if its position was already present.
    pub fn insert(&mut self, record: CompletedLesson) -> bool {
        if !self.index.insert(record.position) {
            return false;
        }
        self.records.push(record);
        true
    }

    #[must_use]
    pub fn contains(&self, position: Position) -> bool {
        self.index.contains(&position)
    }

    #[must_use]
    pub fn get(&self, position: Position) -> Option<&CompletedLesson> {
        if !self.contains(position) {
            return None;
        }
        self.records.iter().find(|r| r.position == position)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Number of distinct completed lessons as `u32`.
    #[must_use]
    pub fn count(&self) -> u32 {
        len_u32(self.records.len())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CompletedLesson> {
        self.records.iter()
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.index.clear();
    }
}

impl From<Vec<CompletedLesson>> for CompletedLessons {
    fn from(records: Vec<CompletedLesson>) -> Self {
        Self::from_records(records)
    }
}

impl From<CompletedLessons> for Vec<CompletedLesson> {
    fn from(set: CompletedLessons) -> Self {
        set.records
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
