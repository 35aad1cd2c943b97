use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown mode: {0:?} (expected teach, practice or test)")]
pub struct ModeError(pub String);

/// Conversation mode of a session.
///
/// The set is closed: every dispatch site matches all three variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Structured, exam-oriented explanations.
    #[default]
    Teach,
    /// Five practice problems with worked solutions.
    Practice,
    /// Backend-graded multiple-choice test.
    Test,
}

impl Mode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Teach => "teach",
            Mode::Practice => "practice",
            Mode::Test => "test",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = ModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "teach" => Ok(Mode::Teach),
            "practice" => Ok(Mode::Practice),
            "test" => Ok(Mode::Test),
            _ => Err(ModeError(s.to_string())),
        }
    }
}
