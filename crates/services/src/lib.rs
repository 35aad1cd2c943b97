#![forbid(unsafe_code)]

pub mod config;
pub mod engine;
pub mod error;
pub mod generation;
pub mod mcq;
pub mod prompts;
pub mod test_engine;
pub mod topics;

pub use study_core::Clock;

pub use config::EngineConfig;
pub use engine::{ChatResponse, IngestReport, SessionEngine};
pub use error::{EngineError, GenerationError, TestGenerationError};
pub use generation::{GenerationClient, GenerationConfig, OpenAiCompatClient, Prompt};
pub use prompts::{DocumentContext, OUT_OF_SYLLABUS_ANSWER, PromptBuilder, PromptContext};
pub use test_engine::{TestEngine, TestFeedback};
pub use topics::{TopicExtractor, parse_topics, parse_units};
