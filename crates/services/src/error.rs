//! Shared error types for the services crate.

use thiserror::Error;

use storage::StorageError;
use study_core::model::{ChoiceError, QuestionError, SessionId, TestError};

/// Failures of the external text-generation service.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum GenerationError {
    /// Transient: timeouts, connection failures, rate limits, 5xx.
    #[error("generation service unavailable: {0}")]
    Unavailable(String),
    /// Permanent for this request: bad request, auth, unusable response.
    #[error("generation request rejected: {0}")]
    Rejected(String),
}

impl From<reqwest::Error> for GenerationError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            Self::Unavailable(err.to_string())
        } else {
            Self::Rejected(err.to_string())
        }
    }
}

/// Model output that cannot be turned into a valid test.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TestGenerationError {
    #[error("model output is not a question list: {0}")]
    Malformed(String),

    #[error("expected 5 questions, model produced {found}")]
    QuestionCount { found: usize },

    #[error("question {number}: unknown choice label {raw:?}")]
    InvalidChoiceLabel { number: usize, raw: String },

    #[error("question {number}: correct choice {raw:?} is not one of a, b, c, d")]
    InvalidCorrectChoice { number: usize, raw: String },

    #[error("question {number} is invalid: {source}")]
    InvalidQuestion {
        number: usize,
        #[source]
        source: QuestionError,
    },

    #[error(transparent)]
    Test(#[from] TestError),
}

/// Errors surfaced by `SessionEngine`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineError {
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),

    #[error("test generation failed: {0}")]
    TestGeneration(#[from] TestGenerationError),

    #[error(transparent)]
    InvalidAnswerToken(#[from] ChoiceError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("no topic given and no topic discussed yet")]
    MissingTopic,

    #[error("no test in progress")]
    NoActiveTest,

    #[error("document contains no text")]
    EmptyDocument,

    #[error(transparent)]
    Storage(StorageError),
}

impl From<StorageError> for EngineError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(id) => Self::SessionNotFound(id),
            other => Self::Storage(other),
        }
    }
}

impl From<TestError> for EngineError {
    fn from(err: TestError) -> Self {
        match err {
            TestError::Completed => Self::NoActiveTest,
            other => Self::TestGeneration(TestGenerationError::Test(other)),
        }
    }
}

impl EngineError {
    /// Stable machine-readable tag for transports.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::SessionNotFound(_) => "session_not_found",
            EngineError::TestGeneration(_) => "test_generation_error",
            EngineError::InvalidAnswerToken(_) => "invalid_answer_token",
            EngineError::Generation(GenerationError::Unavailable(_)) => "generation_unavailable",
            EngineError::Generation(_) => "generation_rejected",
            EngineError::MissingTopic => "missing_topic",
            EngineError::NoActiveTest => "no_active_test",
            EngineError::EmptyDocument => "empty_document",
            EngineError::Storage(_) => "storage_error",
        }
    }
}
