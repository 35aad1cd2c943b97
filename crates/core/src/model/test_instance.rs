use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::model::question::{ChoiceToken, Question, QuestionError, QuestionView};

/// Number of questions in every generated test.
pub const QUESTIONS_PER_TEST: usize = 5;

/// Minimum correct answers for a test not to count against its topic.
pub const PASS_THRESHOLD: u32 = 3;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TestError {
    #[error("a test needs exactly 5 questions, found {found}")]
    QuestionCount { found: usize },

    #[error("question topic {found:?} does not match test topic {expected:?}")]
    TopicMismatch { expected: String, found: String },

    #[error("test already completed")]
    Completed,

    #[error(transparent)]
    Question(#[from] QuestionError),
}

//
// ─── SCORE ─────────────────────────────────────────────────────────────────────
//

/// Result of a completed test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestScore {
    pub correct: u32,
    pub total: u32,
}

impl TestScore {
    /// Fraction of correct answers, `0.0` for an empty score.
    #[must_use]
    pub fn accuracy(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            f64::from(self.correct) / f64::from(self.total)
        }
    }

    /// True when fewer than `PASS_THRESHOLD` answers were correct.
    #[must_use]
    pub fn is_below_threshold(&self) -> bool {
        self.correct < PASS_THRESHOLD
    }
}

//
// ─── ANSWER OUTCOME ────────────────────────────────────────────────────────────
//

/// Local evaluation of a single answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerOutcome {
    /// 1-based number of the question just answered.
    pub number: usize,
    pub answer: ChoiceToken,
    pub correct_choice: ChoiceToken,
    pub is_correct: bool,
    /// The next question, absent once the test is complete.
    pub next: Option<QuestionView>,
    /// Final score, present only when this answer completed the test.
    pub score: Option<TestScore>,
}

//
// ─── TEST INSTANCE ─────────────────────────────────────────────────────────────
//

/// One locked-topic set of questions with answer and evaluation state.
///
/// Question order is fixed at construction. The cursor only moves forward,
/// one step per accepted answer.
#[derive(Clone)]
pub struct TestInstance {
    topic: String,
    questions: Vec<Question>,
    cursor: usize,
    correct: u32,
    started_at: DateTime<Utc>,
}

impl TestInstance {
    /// Build a test from validated questions.
    ///
    /// # Errors
    ///
    /// Returns `TestError::QuestionCount` unless exactly `QUESTIONS_PER_TEST`
    /// questions are given, and `TestError::TopicMismatch` if any question
    /// belongs to another topic.
    pub fn new(
        topic: impl Into<String>,
        questions: Vec<Question>,
        started_at: DateTime<Utc>,
    ) -> Result<Self, TestError> {
        let topic = topic.into().trim().to_string();
        if questions.len() != QUESTIONS_PER_TEST {
            return Err(TestError::QuestionCount {
                found: questions.len(),
            });
        }
        if let Some(stray) = questions.iter().find(|q| q.topic() != topic) {
            return Err(TestError::TopicMismatch {
                expected: topic,
                found: stray.topic().to_string(),
            });
        }
        if questions.iter().any(Question::is_answered) {
            return Err(QuestionError::AlreadyAnswered.into());
        }

        Ok(Self {
            topic,
            questions,
            cursor: 0,
            correct: 0,
            started_at,
        })
    }

    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    /// Index of the next unanswered question.
    #[must_use]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    #[must_use]
    pub fn correct_so_far(&self) -> u32 {
        self.correct
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.questions.len()
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.cursor >= self.questions.len()
    }

    #[must_use]
    pub fn current_question(&self) -> Option<&Question> {
        self.questions.get(self.cursor)
    }

    /// Final score once every question has been answered.
    #[must_use]
    pub fn score(&self) -> Option<TestScore> {
        self.is_complete().then(|| TestScore {
            correct: self.correct,
            total: u32::try_from(self.questions.len()).unwrap_or(u32::MAX),
        })
    }

    /// Grade the current question against its stored correct choice and advance.
    ///
    /// # Errors
    ///
    /// Returns `TestError::Completed` if every question is already answered.
    pub fn answer(&mut self, token: ChoiceToken) -> Result<AnswerOutcome, TestError> {
        let Some(question) = self.questions.get_mut(self.cursor) else {
            return Err(TestError::Completed);
        };

        let is_correct = question.record_answer(token)?;
        let correct_choice = question.correct_choice();
        if is_correct {
            self.correct = self.correct.saturating_add(1);
        }
        self.cursor += 1;

        Ok(AnswerOutcome {
            number: self.cursor,
            answer: token,
            correct_choice,
            is_correct,
            next: self.current_question().map(Question::view),
            score: self.score(),
        })
    }
}

impl fmt::Debug for TestInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestInstance")
            .field("topic", &self.topic)
            .field("questions_len", &self.questions.len())
            .field("cursor", &self.cursor)
            .field("correct", &self.correct)
            .field("started_at", &self.started_at)
            .finish_non_exhaustive()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::question::Choice;
    use crate::time::fixed_now;

    fn question(topic: &str, correct: ChoiceToken) -> Question {
        let choices = ChoiceToken::ALL
            .iter()
            .map(|label| Choice {
                label: *label,
                text: format!("option {label}"),
            })
            .collect();
        Question::new(topic, "Pick one", choices, correct).unwrap()
    }

    fn build_test(topic: &str) -> TestInstance {
        let questions = (0..QUESTIONS_PER_TEST)
            .map(|_| question(topic, ChoiceToken::B))
            .collect();
        TestInstance::new(topic, questions, fixed_now()).unwrap()
    }

    #[test]
    fn rejects_wrong_question_count() {
        let questions = vec![question("Optics", ChoiceToken::A)];
        let err = TestInstance::new("Optics", questions, fixed_now()).unwrap_err();
        assert_eq!(err, TestError::QuestionCount { found: 1 });
    }

    #[test]
    fn rejects_mixed_topics() {
        let mut questions: Vec<_> = (0..4).map(|_| question("Optics", ChoiceToken::A)).collect();
        questions.push(question("Acoustics", ChoiceToken::A));
        let err = TestInstance::new("Optics", questions, fixed_now()).unwrap_err();
        assert!(matches!(err, TestError::TopicMismatch { .. }));
    }

    #[test]
    fn every_question_shares_the_test_topic() {
        let test = build_test("Fourier Series");
        assert!(test.questions().iter().all(|q| q.topic() == "Fourier Series"));
    }

    #[test]
    fn answers_advance_and_score() {
        let mut test = build_test("Optics");
        let answers = [
            ChoiceToken::B,
            ChoiceToken::A,
            ChoiceToken::B,
            ChoiceToken::C,
            ChoiceToken::D,
        ];

        for (idx, token) in answers.iter().enumerate() {
            assert_eq!(test.cursor(), idx);
            let outcome = test.answer(*token).unwrap();
            assert_eq!(outcome.number, idx + 1);
            assert_eq!(outcome.correct_choice, ChoiceToken::B);
            assert_eq!(outcome.is_correct, *token == ChoiceToken::B);
        }

        assert!(test.is_complete());
        let score = test.score().unwrap();
        assert_eq!(score, TestScore { correct: 2, total: 5 });
        assert!(score.is_below_threshold());
        assert!((score.accuracy() - 0.4).abs() < f64::EPSILON);
        assert_eq!(test.answer(ChoiceToken::A), Err(TestError::Completed));
    }

    #[test]
    fn last_answer_carries_score_and_no_next_question() {
        let mut test = build_test("Optics");
        for _ in 0..QUESTIONS_PER_TEST - 1 {
            let outcome = test.answer(ChoiceToken::B).unwrap();
            assert!(outcome.next.is_some());
            assert!(outcome.score.is_none());
        }
        let last = test.answer(ChoiceToken::B).unwrap();
        assert!(last.next.is_none());
        assert_eq!(last.score, Some(TestScore { correct: 5, total: 5 }));
    }
}
