use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use study_core::Clock;
use study_core::model::{
    ChoiceToken, Question, QuestionView, Session, TestInstance, TestScore,
};

use crate::error::{EngineError, TestGenerationError};
use crate::generation::GenerationClient;
use crate::mcq::parse_questions;
use crate::prompts::PromptBuilder;

/// What the caller learns from a test-mode turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TestFeedback {
    /// A test was generated; the first question is shown.
    Started {
        topic: String,
        number: usize,
        total: usize,
        question: QuestionView,
    },
    /// An answer was graded and another question follows.
    Answered {
        number: usize,
        total: usize,
        your_answer: ChoiceToken,
        correct_choice: ChoiceToken,
        is_correct: bool,
        next: QuestionView,
    },
    /// The last answer was graded and the test is over.
    Completed {
        number: usize,
        total: usize,
        your_answer: ChoiceToken,
        correct_choice: ChoiceToken,
        is_correct: bool,
        score: TestScore,
        accuracy: f64,
        weak_topic_recorded: bool,
    },
}

impl fmt::Display for TestFeedback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestFeedback::Started {
                topic,
                number,
                total,
                question,
            } => {
                writeln!(f, "Test on {topic}. Answer with a, b, c or d.\n")?;
                write!(f, "Question {number} of {total}: {question}")
            }
            TestFeedback::Answered {
                number,
                total,
                your_answer,
                correct_choice,
                is_correct,
                next,
            } => {
                write_verdict(f, *your_answer, *correct_choice, *is_correct)?;
                write!(f, "\nQuestion {} of {total}: {next}", number + 1)
            }
            TestFeedback::Completed {
                your_answer,
                correct_choice,
                is_correct,
                score,
                weak_topic_recorded,
                ..
            } => {
                write_verdict(f, *your_answer, *correct_choice, *is_correct)?;
                write!(
                    f,
                    "\nTest complete: {} of {} correct.",
                    score.correct, score.total
                )?;
                if *weak_topic_recorded {
                    write!(f, " This topic will get extra attention when you study it next.")?;
                }
                write!(f, " Back to teach mode.")
            }
        }
    }
}

fn write_verdict(
    f: &mut fmt::Formatter<'_>,
    answer: ChoiceToken,
    correct: ChoiceToken,
    is_correct: bool,
) -> fmt::Result {
    if is_correct {
        writeln!(f, "Correct! The answer is {correct}.")
    } else {
        writeln!(f, "Incorrect: you answered {answer}, the correct answer is {correct}.")
    }
}

/// The multiple-choice test state machine.
///
/// The model is consulted only to write questions. Grading, scoring and
/// weak-topic bookkeeping are local and deterministic.
#[derive(Clone)]
pub struct TestEngine {
    clock: Clock,
    generation: Arc<dyn GenerationClient>,
    prompts: PromptBuilder,
}

impl TestEngine {
    #[must_use]
    pub fn new(clock: Clock, generation: Arc<dyn GenerationClient>) -> Self {
        Self {
            clock,
            generation,
            prompts: PromptBuilder::new(),
        }
    }

    /// Generate a test on `topic` and attach it to the session.
    ///
    /// The session is only touched once a complete, valid test exists; on any
    /// failure it keeps its prior mode and no test.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Generation` if the model call fails and
    /// `EngineError::TestGeneration` if its output does not validate.
    pub async fn start(
        &self,
        session: &mut Session,
        topic: &str,
        context: &[String],
    ) -> Result<TestFeedback, EngineError> {
        let prompt = self.prompts.test_generation(topic, context);
        let raw = self.generation.generate(&prompt).await?;

        let test = parse_questions(&raw, topic)
            .and_then(|questions| {
                TestInstance::new(topic, questions, self.clock.now()).map_err(Into::into)
            })
            .inspect_err(|err| {
                warn!(session_id = %session.id(), error = %err, "generated test rejected");
            })?;

        let Some(first) = test.current_question().map(Question::view) else {
            return Err(TestGenerationError::QuestionCount { found: 0 }.into());
        };
        let feedback = TestFeedback::Started {
            topic: test.topic().to_string(),
            number: 1,
            total: test.total(),
            question: first,
        };

        info!(session_id = %session.id(), topic = %test.topic(), "test started");
        session.begin_test(test);
        Ok(feedback)
    }

    /// Grade `input` against the current question and advance.
    ///
    /// Anything other than `a`-`d` is rejected before the session is touched,
    /// so the same question stays current. The answer that completes the test
    /// applies its score, weak-topic and mode consequences in the same step.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::InvalidAnswerToken` for bad input and
    /// `EngineError::NoActiveTest` when no test is awaiting an answer.
    pub fn answer(&self, session: &mut Session, input: &str) -> Result<TestFeedback, EngineError> {
        let token = ChoiceToken::parse(input).inspect_err(|_| {
            warn!(session_id = %session.id(), "rejected answer token");
        })?;

        let test = session.active_test_mut().ok_or(EngineError::NoActiveTest)?;
        let total = test.total();
        let outcome = test.answer(token)?;

        if let Some(next) = outcome.next {
            return Ok(TestFeedback::Answered {
                number: outcome.number,
                total,
                your_answer: outcome.answer,
                correct_choice: outcome.correct_choice,
                is_correct: outcome.is_correct,
                next,
            });
        }

        let completion = session.complete_test().ok_or(EngineError::NoActiveTest)?;
        info!(
            session_id = %session.id(),
            topic = %completion.topic,
            correct = completion.score.correct,
            total = completion.score.total,
            weak_topic_recorded = completion.weak_topic_recorded,
            "test completed"
        );

        Ok(TestFeedback::Completed {
            number: outcome.number,
            total,
            your_answer: outcome.answer,
            correct_choice: outcome.correct_choice,
            is_correct: outcome.is_correct,
            score: completion.score,
            accuracy: completion.score.accuracy(),
            weak_topic_recorded: completion.weak_topic_recorded,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GenerationError;
    use crate::generation::Prompt;
    use crate::mcq::fixtures::response;
    use async_trait::async_trait;
    use study_core::model::{Mode, SessionId, TestState};
    use study_core::time::{fixed_clock, fixed_now};

    struct Canned(Result<String, GenerationError>);

    #[async_trait]
    impl GenerationClient for Canned {
        async fn generate(&self, _prompt: &Prompt) -> Result<String, GenerationError> {
            self.0.clone()
        }
    }

    fn engine(reply: Result<String, GenerationError>) -> TestEngine {
        TestEngine::new(fixed_clock(), Arc::new(Canned(reply)))
    }

    fn session() -> Session {
        Session::new(SessionId::generate(), fixed_now())
    }

    #[tokio::test]
    async fn start_attaches_test_and_enters_test_mode() {
        let engine = engine(Ok(response(&["b"; 5])));
        let mut s = session();

        let feedback = engine.start(&mut s, "Fourier Series", &[]).await.unwrap();

        assert!(matches!(feedback, TestFeedback::Started { number: 1, total: 5, .. }));
        assert_eq!(s.mode(), Mode::Test);
        assert_eq!(s.test_state(), TestState::AwaitingAnswer { cursor: 0 });
    }

    #[tokio::test]
    async fn malformed_output_leaves_session_untouched() {
        let engine = engine(Ok(response(&["b"; 3])));
        let mut s = session();
        s.switch_mode(Mode::Practice);

        let err = engine.start(&mut s, "Optics", &[]).await.unwrap_err();

        assert!(matches!(
            err,
            EngineError::TestGeneration(TestGenerationError::QuestionCount { found: 3 })
        ));
        assert_eq!(s.mode(), Mode::Practice);
        assert!(s.active_test().is_none());
    }

    #[tokio::test]
    async fn generation_failure_propagates() {
        let engine = engine(Err(GenerationError::Unavailable("down".into())));
        let mut s = session();
        let err = engine.start(&mut s, "Optics", &[]).await.unwrap_err();
        assert!(matches!(err, EngineError::Generation(GenerationError::Unavailable(_))));
        assert_eq!(s.mode(), Mode::Teach);
    }

    #[tokio::test]
    async fn invalid_token_does_not_advance() {
        let engine = engine(Ok(response(&["b"; 5])));
        let mut s = session();
        engine.start(&mut s, "Optics", &[]).await.unwrap();

        for bad in ["z", "", "ab", "e"] {
            let err = engine.answer(&mut s, bad).unwrap_err();
            assert!(matches!(err, EngineError::InvalidAnswerToken(_)));
        }

        assert_eq!(s.test_state(), TestState::AwaitingAnswer { cursor: 0 });
        assert!(s.active_test().unwrap().questions().iter().all(|q| !q.is_answered()));
    }

    #[tokio::test]
    async fn answering_all_questions_completes() {
        let engine = engine(Ok(response(&["a", "b", "c", "d", "a"])));
        let mut s = session();
        engine.start(&mut s, "Optics", &[]).await.unwrap();

        for token in ["A", "b", "c", "d"] {
            let feedback = engine.answer(&mut s, token).unwrap();
            assert!(matches!(feedback, TestFeedback::Answered { is_correct: true, .. }));
        }
        let last = engine.answer(&mut s, "a").unwrap();

        match last {
            TestFeedback::Completed {
                score,
                weak_topic_recorded,
                ..
            } => {
                assert_eq!(score, TestScore { correct: 5, total: 5 });
                assert!(!weak_topic_recorded);
            }
            other => panic!("expected completion, got {other:?}"),
        }
        assert_eq!(s.mode(), Mode::Teach);
        assert!(s.weak_topics().is_empty());
        assert!(matches!(engine.answer(&mut s, "a"), Err(EngineError::NoActiveTest)));
    }

    #[test]
    fn feedback_renders_verdicts() {
        let text = TestFeedback::Completed {
            number: 5,
            total: 5,
            your_answer: ChoiceToken::A,
            correct_choice: ChoiceToken::C,
            is_correct: false,
            score: TestScore { correct: 2, total: 5 },
            accuracy: 0.4,
            weak_topic_recorded: true,
        }
        .to_string();
        assert!(text.contains("correct answer is c"));
        assert!(text.contains("2 of 5"));
        assert!(text.contains("teach mode"));
    }
}
