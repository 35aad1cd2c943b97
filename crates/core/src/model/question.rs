use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ChoiceError {
    #[error("invalid answer token {0:?}: expected one of a, b, c, d")]
    InvalidToken(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuestionError {
    #[error("question topic cannot be empty")]
    EmptyTopic,

    #[error("question prompt cannot be empty")]
    EmptyPrompt,

    #[error("expected exactly 4 choices, found {found}")]
    ChoiceCount { found: usize },

    #[error("choice {0} appears more than once")]
    DuplicateChoice(ChoiceToken),

    #[error("choice {0} has no text")]
    EmptyChoice(ChoiceToken),

    #[error("question has already been answered")]
    AlreadyAnswered,
}

//
// ─── CHOICE TOKEN ──────────────────────────────────────────────────────────────
//

/// One of the four labels a multiple-choice question can be answered with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChoiceToken {
    A,
    B,
    C,
    D,
}

impl ChoiceToken {
    pub const ALL: [ChoiceToken; 4] = [
        ChoiceToken::A,
        ChoiceToken::B,
        ChoiceToken::C,
        ChoiceToken::D,
    ];

    /// Parses a single answer token, case-insensitive, ignoring surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Returns `ChoiceError::InvalidToken` for anything other than `a`, `b`, `c` or `d`.
    pub fn parse(input: &str) -> Result<Self, ChoiceError> {
        match input.trim().to_ascii_lowercase().as_str() {
            "a" => Ok(Self::A),
            "b" => Ok(Self::B),
            "c" => Ok(Self::C),
            "d" => Ok(Self::D),
            _ => Err(ChoiceError::InvalidToken(input.to_string())),
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ChoiceToken::A => "a",
            ChoiceToken::B => "b",
            ChoiceToken::C => "c",
            ChoiceToken::D => "d",
        }
    }

    fn index(self) -> usize {
        match self {
            ChoiceToken::A => 0,
            ChoiceToken::B => 1,
            ChoiceToken::C => 2,
            ChoiceToken::D => 3,
        }
    }
}

impl fmt::Display for ChoiceToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChoiceToken {
    type Err = ChoiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

//
// ─── QUESTION ──────────────────────────────────────────────────────────────────
//

/// A labeled option as shown to the student.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    pub label: ChoiceToken,
    pub text: String,
}

/// A generated multiple-choice question.
///
/// Content is immutable once constructed; only the answer slot is filled,
/// exactly once, by the test that owns it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    topic: String,
    prompt: String,
    choices: [String; 4],
    correct: ChoiceToken,
    user_answer: Option<ChoiceToken>,
    is_correct: Option<bool>,
}

impl Question {
    /// Validate and build a question from untrusted parts.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError` if the topic or prompt is empty, if there are not
    /// exactly four choices, if a label repeats, or if a choice has no text.
    pub fn new(
        topic: impl Into<String>,
        prompt: impl Into<String>,
        choices: Vec<Choice>,
        correct: ChoiceToken,
    ) -> Result<Self, QuestionError> {
        let topic = topic.into().trim().to_string();
        if topic.is_empty() {
            return Err(QuestionError::EmptyTopic);
        }
        let prompt = prompt.into().trim().to_string();
        if prompt.is_empty() {
            return Err(QuestionError::EmptyPrompt);
        }
        if choices.len() != ChoiceToken::ALL.len() {
            return Err(QuestionError::ChoiceCount {
                found: choices.len(),
            });
        }

        let mut slots: [Option<String>; 4] = Default::default();
        for choice in choices {
            let text = choice.text.trim().to_string();
            if text.is_empty() {
                return Err(QuestionError::EmptyChoice(choice.label));
            }
            let slot = &mut slots[choice.label.index()];
            if slot.is_some() {
                return Err(QuestionError::DuplicateChoice(choice.label));
            }
            *slot = Some(text);
        }

        // Four choices with no duplicates cover every label, so each slot is filled.
        let [Some(a), Some(b), Some(c), Some(d)] = slots else {
            return Err(QuestionError::ChoiceCount { found: 0 });
        };

        Ok(Self {
            topic,
            prompt,
            choices: [a, b, c, d],
            correct,
            user_answer: None,
            is_correct: None,
        })
    }

    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    #[must_use]
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    #[must_use]
    pub fn choice_text(&self, label: ChoiceToken) -> &str {
        &self.choices[label.index()]
    }

    #[must_use]
    pub fn choices(&self) -> Vec<Choice> {
        ChoiceToken::ALL
            .iter()
            .map(|label| Choice {
                label: *label,
                text: self.choice_text(*label).to_string(),
            })
            .collect()
    }

    /// Ground truth. Never part of the caller-facing view of an unanswered question.
    #[must_use]
    pub fn correct_choice(&self) -> ChoiceToken {
        self.correct
    }

    #[must_use]
    pub fn user_answer(&self) -> Option<ChoiceToken> {
        self.user_answer
    }

    #[must_use]
    pub fn is_correct(&self) -> Option<bool> {
        self.is_correct
    }

    #[must_use]
    pub fn is_answered(&self) -> bool {
        self.user_answer.is_some()
    }

    /// Records the student's answer and grades it by token equality.
    pub(crate) fn record_answer(&mut self, token: ChoiceToken) -> Result<bool, QuestionError> {
        if self.user_answer.is_some() {
            return Err(QuestionError::AlreadyAnswered);
        }
        let correct = token == self.correct;
        self.user_answer = Some(token);
        self.is_correct = Some(correct);
        Ok(correct)
    }

    /// Caller-facing view: prompt and choices only.
    #[must_use]
    pub fn view(&self) -> QuestionView {
        QuestionView {
            prompt: self.prompt.clone(),
            choices: self.choices(),
        }
    }
}

/// What a caller may see of a question before it is answered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionView {
    pub prompt: String,
    pub choices: Vec<Choice>,
}

impl fmt::Display for QuestionView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.prompt)?;
        for choice in &self.choices {
            writeln!(f, "{}) {}", choice.label, choice.text)?;
        }
        Ok(())
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
