//! Per-turn orchestration over sessions, prompts, retrieval and the test
//! state machine.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, instrument};

use storage::SessionRepository;
use study_core::Clock;
use study_core::model::{
    DocumentKind, DocumentOutline, Mode, Session, SessionId, SessionSnapshot, SyllabusScope,
    SyllabusUnit, TestScore, TestState,
};
use study_core::retrieval::{KeywordIndex, RetrievalIndex, split_text};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::generation::GenerationClient;
use crate::prompts::{DocumentContext, OUT_OF_SYLLABUS_ANSWER, PromptBuilder, PromptContext};
use crate::test_engine::{TestEngine, TestFeedback};
use crate::topics::TopicExtractor;

/// Words of a message kept when it becomes the locked topic.
const TOPIC_WORDS: usize = 6;

/// Result of one chat turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatResponse {
    pub session_id: SessionId,
    /// Mode after the turn; a completed test reports `teach`.
    pub mode: Mode,
    pub answer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test: Option<TestFeedback>,
    pub score: Option<TestScore>,
    pub weak_topics: BTreeMap<String, u32>,
    /// Set when an uploaded syllabus does not cover the requested topic and
    /// nothing was generated.
    pub out_of_scope: bool,
}

/// Result of a document upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub session_id: SessionId,
    pub chunks: usize,
    pub kind: DocumentKind,
    pub topics: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub units: Vec<SyllabusUnit>,
}

/// Outcome of a teach or practice turn.
enum Reply {
    Answer(String),
    OutOfScope,
}

/// Entry point for every transport.
///
/// Each turn holds its session's lock from mode switch to final state
/// change, so requests for one session are serialized while different
/// sessions proceed independently.
#[derive(Clone)]
pub struct SessionEngine {
    config: EngineConfig,
    sessions: Arc<dyn SessionRepository>,
    generation: Arc<dyn GenerationClient>,
    prompts: PromptBuilder,
    tests: TestEngine,
    topics: TopicExtractor,
}

impl SessionEngine {
    #[must_use]
    pub fn new(
        clock: Clock,
        config: EngineConfig,
        sessions: Arc<dyn SessionRepository>,
        generation: Arc<dyn GenerationClient>,
    ) -> Self {
        Self {
            config,
            sessions,
            tests: TestEngine::new(clock, Arc::clone(&generation)),
            topics: TopicExtractor::new(Arc::clone(&generation)),
            generation,
            prompts: PromptBuilder::new(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    //
    // ─── LIFECYCLE ─────────────────────────────────────────────────────────────
    //

    pub async fn create_session(&self) -> SessionId {
        self.sessions.create().await
    }

    /// Discard the session and everything it holds; the caller adopts the
    /// returned id.
    pub async fn reset_session(&self, id: SessionId) -> SessionId {
        self.sessions.reset(id).await
    }

    /// # Errors
    ///
    /// Returns `EngineError::SessionNotFound` for unknown or expired ids.
    pub async fn snapshot(&self, id: SessionId) -> Result<SessionSnapshot, EngineError> {
        let handle = self.sessions.get(id).await?;
        let session = handle.lock().await;
        Ok(session.snapshot())
    }

    /// Drop sessions idle for longer than the configured TTL.
    pub async fn purge_expired(&self) -> Vec<SessionId> {
        self.sessions.purge_expired(self.config.session_ttl).await
    }

    //
    // ─── DOCUMENTS ─────────────────────────────────────────────────────────────
    //

    /// Replace the session's document index with one built over `chunks`.
    ///
    /// The index and outline are prepared before the session lock is taken;
    /// the swap itself is a single assignment.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::SessionNotFound` for unknown ids and
    /// `EngineError::EmptyDocument` when every chunk is blank.
    #[instrument(skip(self, id, chunks), fields(session_id = %id))]
    pub async fn ingest_chunks(
        &self,
        id: SessionId,
        chunks: Vec<String>,
    ) -> Result<IngestReport, EngineError> {
        let chunks: Vec<String> = chunks
            .into_iter()
            .filter(|chunk| !chunk.trim().is_empty())
            .collect();
        if chunks.is_empty() {
            return Err(EngineError::EmptyDocument);
        }
        let text = chunks.join("\n\n");
        self.ingest(id, chunks, &text).await
    }

    /// Split raw extracted text into overlapping chunks and ingest them.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::SessionNotFound` for unknown ids and
    /// `EngineError::EmptyDocument` when the text is blank.
    #[instrument(skip(self, id, text), fields(session_id = %id, len = text.len()))]
    pub async fn ingest_text(
        &self,
        id: SessionId,
        text: &str,
    ) -> Result<IngestReport, EngineError> {
        let chunks = split_text(text, self.config.chunk);
        if chunks.is_empty() {
            return Err(EngineError::EmptyDocument);
        }
        self.ingest(id, chunks, text).await
    }

    /// Attach an externally built index, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::SessionNotFound` for unknown ids.
    pub async fn install_index(
        &self,
        id: SessionId,
        index: Box<dyn RetrievalIndex>,
        outline: DocumentOutline,
    ) -> Result<(), EngineError> {
        let handle = self.sessions.get(id).await?;
        handle.lock().await.replace_documents(index, outline);
        Ok(())
    }

    async fn ingest(
        &self,
        id: SessionId,
        chunks: Vec<String>,
        text: &str,
    ) -> Result<IngestReport, EngineError> {
        // Fail fast before paying for extraction.
        self.sessions.get(id).await?;

        let count = chunks.len();
        let index = KeywordIndex::build(chunks);
        let outline = if self.config.extract_topics {
            self.topics.extract(text).await
        } else {
            DocumentOutline::default()
        };

        // The session may have been reset or expired during extraction.
        let handle = self.sessions.get(id).await?;
        let report = IngestReport {
            session_id: id,
            chunks: count,
            kind: outline.kind(),
            topics: outline.topics().to_vec(),
            units: outline.units().to_vec(),
        };
        handle
            .lock()
            .await
            .replace_documents(Box::new(index), outline);
        info!(
            chunks = count,
            kind = %report.kind,
            topics = report.topics.len(),
            "documents ingested"
        );

        Ok(report)
    }

    //
    // ─── CHAT ──────────────────────────────────────────────────────────────────
    //

    /// Run one chat turn in `mode`.
    ///
    /// Switching away from test mode abandons an unfinished test, but only
    /// once the new turn has been answered. Entering test mode only sticks
    /// once a valid test has been generated. A teach or practice topic that
    /// an uploaded syllabus does not cover gets a fixed reply and changes
    /// nothing.
    ///
    /// # Errors
    ///
    /// Returns the `EngineError` of whichever step failed; the session is left
    /// as it was before the failing step.
    #[instrument(skip(self, id, mode, message), fields(session_id = %id, mode = %mode))]
    pub async fn handle(
        &self,
        id: SessionId,
        mode: Mode,
        message: &str,
    ) -> Result<ChatResponse, EngineError> {
        let handle = self.sessions.get(id).await?;
        let mut session = handle.lock().await;

        let (answer, test, out_of_scope) = match mode {
            Mode::Teach | Mode::Practice => {
                match self.converse(&mut session, mode, message).await? {
                    Reply::Answer(answer) => {
                        if let Some(abandoned) = session.switch_mode(mode) {
                            info!(
                                topic = %abandoned.topic(),
                                answered = abandoned.cursor(),
                                "unfinished test abandoned"
                            );
                        }
                        (answer, None, false)
                    }
                    Reply::OutOfScope => (OUT_OF_SYLLABUS_ANSWER.to_string(), None, true),
                }
            }
            Mode::Test => {
                let feedback = match session.test_state() {
                    TestState::AwaitingAnswer { .. } => self.tests.answer(&mut session, message)?,
                    TestState::Idle => self.start_test(&mut session, message).await?,
                };
                (feedback.to_string(), Some(feedback), false)
            }
        };

        Ok(ChatResponse {
            session_id: session.id(),
            mode: session.mode(),
            answer,
            test,
            score: session.score(),
            weak_topics: session.weak_topics().to_map(),
            out_of_scope,
        })
    }

    async fn converse(
        &self,
        session: &mut Session,
        mode: Mode,
        message: &str,
    ) -> Result<Reply, EngineError> {
        let topic = derive_topic(message).or_else(|| session.current_topic().map(str::to_string));

        let documents = if session.has_documents() {
            match session
                .document_outline()
                .scope_of(topic.as_deref().unwrap_or_default())
            {
                SyllabusScope::NotSyllabus => DocumentContext::Reference,
                SyllabusScope::Unstructured => DocumentContext::UnstructuredSyllabus,
                SyllabusScope::InScope { unit } => DocumentContext::Syllabus { unit },
                SyllabusScope::OutOfScope => {
                    info!(topic = topic.as_deref().unwrap_or_default(), "topic outside syllabus");
                    return Ok(Reply::OutOfScope);
                }
            }
        } else {
            DocumentContext::NoDocuments
        };

        let chunks = session.retrieve(message, self.config.retrieval_top_k);
        debug!(retrieved = chunks.len(), "context retrieved");
        let weak_topic = weak_topic_for(session, message, topic.as_deref());

        let prompt = self.prompts.build(
            mode,
            &PromptContext {
                message,
                topic: topic.as_deref(),
                chunks: &chunks,
                weak_topic: weak_topic.as_deref(),
                documents,
            },
        );
        let answer = self.generation.generate(&prompt).await?;

        if let Some(topic) = topic {
            session.set_current_topic(topic);
        }
        Ok(Reply::Answer(answer))
    }

    async fn start_test(
        &self,
        session: &mut Session,
        message: &str,
    ) -> Result<TestFeedback, EngineError> {
        let topic = match message.trim() {
            "" => session
                .current_topic()
                .map(str::to_string)
                .ok_or(EngineError::MissingTopic)?,
            given => given.to_string(),
        };
        let context = session.retrieve(&topic, self.config.retrieval_top_k);
        self.tests.start(session, &topic, &context).await
    }
}

/// The weak topic to reinforce this turn: one named in the message, else
/// this turn's topic when it has crossed the failure threshold.
fn weak_topic_for(session: &Session, message: &str, topic: Option<&str>) -> Option<String> {
    let tracker = session.weak_topics();
    tracker
        .weak_topic_in(message)
        .or_else(|| topic.filter(|topic| tracker.hint(topic)))
        .map(str::to_string)
}

/// Topic label for a teach or practice message: its first few words with
/// trailing punctuation removed.
#[must_use]
pub fn derive_topic(message: &str) -> Option<String> {
    let topic = message
        .split_whitespace()
        .take(TOPIC_WORDS)
        .collect::<Vec<_>>()
        .join(" ");
    let topic = topic.trim_end_matches(|c: char| c.is_ascii_punctuation());
    (!topic.is_empty()).then(|| topic.to_string())
}
