use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum PositionError {
    #[error("module number must be >= 1")]
    ZeroModule,

    #[error("lesson number must be >= 1")]
    ZeroLesson,
}

//
// ─── POSITION ──────────────────────────────────────────────────────────────────
//

/// Pointer into a study plan: 1-based module and lesson numbers.
///
/// Ordering is lexicographic on `(module, lesson)`, which is the order in which
/// a learner walks through the plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "RawPosition", into = "RawPosition")]
pub struct Position {
    module: u32,
    lesson: u32,
}

impl Position {
    /// Creates a position from 1-based module and lesson numbers.
    ///
    /// # Errors
    ///
    /// Returns `PositionError` if either number is zero.
    pub fn new(module: u32, lesson: u32) -> Result<Self, PositionError> {
        if module == 0 {
            return Err(PositionError::ZeroModule);
        }
        if lesson == 0 {
            return Err(PositionError::ZeroLesson);
        }
        Ok(Self { module, lesson })
    }

    /// First lesson of the first module.
    #[must_use]
    pub fn start() -> Self {
        Self {
            module: 1,
            lesson: 1,
        }
    }

    #[must_use]
    pub fn module(&self) -> u32 {
        self.module
    }

    #[must_use]
    pub fn lesson(&self) -> u32 {
        self.lesson
    }

    /// Zero-based module index into `StudyPlan::modules`.
    #[must_use]
    pub fn module_index(&self) -> usize {
        to_index(self.module)
    }

    /// Zero-based lesson index into `Module::lessons`.
    #[must_use]
    pub fn lesson_index(&self) -> usize {
        to_index(self.lesson)
    }
}

impl Default for Position {
    fn default() -> Self {
        Self::start()
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "M{}L{}", self.module, self.lesson)
    }
}

fn to_index(number: u32) -> usize {
    usize::try_from(number.saturating_sub(1)).unwrap_or(usize::MAX)
}

#[derive(Serialize, Deserialize)]
struct RawPosition {
    module: u32,
    lesson: u32,
}

impl TryFrom<RawPosition> for Position {
    type Error = PositionError;

    fn try_from(raw: RawPosition) -> Result<Self, Self::Error> {
        Position::new(raw.module, raw.lesson)
    }
}

impl From<Position> for RawPosition {
    fn from(p: Position) -> Self {
        Self {
            module: p.module,
            lesson: p.lesson,
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_numbers() {
        assert_eq!(Position::new(0, 1).unwrap_err(), PositionError::ZeroModule);
        assert_eq!(Position::new(1, 0).unwrap_err(), PositionError::ZeroLesson);
    }

    #[test]
    fn orders_lexicographically() {
        let a = Position::new(1, 9).unwrap();
        let b = Position::new(2, 1).unwrap();
        let c = Position::new(2, 2).unwrap();
        assert!(a < b);
        assert!(b < c);
        assert_eq!(Position::start(), Position::new(1, 1).unwrap());
    }

    #[test]
    fn indexes_are_zero_based() {
        let p = Position::new(3, 2).unwrap();
        assert_eq!(p.module_index(), 2);
        assert_eq!(p.lesson_index(), 1);
        assert_eq!(p.to_string(), "M3L2");
    }

    #[test]
    fn deserialize_rejects_zero() {
        let ok: Position = serde_json::from_str(r#"{"module":2,"lesson":1}"#).unwrap();
        assert_eq!(ok, Position::new(2, 1).unwrap());
        assert!(serde_json::from_str::<Position>(r#"{"module":0,"lesson":1}"#).is_err());
    }
}
