use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::model::document::{DocumentKind, DocumentOutline, SyllabusUnit};
use crate::model::ids::SessionId;
use crate::model::mode::Mode;
use crate::model::question::QuestionView;
use crate::model::test_instance::{TestInstance, TestScore};
use crate::model::weak_topics::WeakTopicTracker;
use crate::retrieval::RetrievalIndex;

//
// ─── TEST STATE ────────────────────────────────────────────────────────────────
//

/// Resting states of the test state machine between requests.
///
/// Generation and evaluation happen inside a single locked request, so they
/// are never observable here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TestState {
    Idle,
    AwaitingAnswer { cursor: usize },
}

/// Effect of completing a test on the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCompletion {
    pub topic: String,
    pub score: TestScore,
    pub weak_topic_recorded: bool,
}

//
// ─── SESSION ───────────────────────────────────────────────────────────────────
//

/// Isolated per-user state: mode, document index, active test, score and weak topics.
pub struct Session {
    id: SessionId,
    mode: Mode,
    document_index: Option<Box<dyn RetrievalIndex>>,
    document_outline: DocumentOutline,
    active_test: Option<TestInstance>,
    score: Option<TestScore>,
    weak_topics: WeakTopicTracker,
    current_topic: Option<String>,
    created_at: DateTime<Utc>,
}

impl Session {
    /// A session with default field values.
    #[must_use]
    pub fn new(id: SessionId, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            mode: Mode::default(),
            document_index: None,
            document_outline: DocumentOutline::default(),
            active_test: None,
            score: None,
            weak_topics: WeakTopicTracker::new(),
            current_topic: None,
            created_at,
        }
    }

    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    #[must_use]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn score(&self) -> Option<TestScore> {
        self.score
    }

    #[must_use]
    pub fn weak_topics(&self) -> &WeakTopicTracker {
        &self.weak_topics
    }

    #[must_use]
    pub fn current_topic(&self) -> Option<&str> {
        self.current_topic.as_deref()
    }

    pub fn set_current_topic(&mut self, topic: impl Into<String>) {
        let topic = topic.into();
        if !topic.trim().is_empty() {
            self.current_topic = Some(topic.trim().to_string());
        }
    }

    #[must_use]
    pub fn active_test(&self) -> Option<&TestInstance> {
        self.active_test.as_ref()
    }

    pub fn active_test_mut(&mut self) -> Option<&mut TestInstance> {
        self.active_test.as_mut()
    }

    #[must_use]
    pub fn test_state(&self) -> TestState {
        match &self.active_test {
            Some(test) if !test.is_complete() => TestState::AwaitingAnswer {
                cursor: test.cursor(),
            },
            _ => TestState::Idle,
        }
    }

    //
    // ─── DOCUMENTS ─────────────────────────────────────────────────────────────
    //

    #[must_use]
    pub fn has_documents(&self) -> bool {
        self.document_index.is_some()
    }

    #[must_use]
    pub fn document_outline(&self) -> &DocumentOutline {
        &self.document_outline
    }

    #[must_use]
    pub fn document_topics(&self) -> &[String] {
        self.document_outline.topics()
    }

    /// Replace the document index and its outline wholesale; there is no
    /// incremental merge.
    pub fn replace_documents(&mut self, index: Box<dyn RetrievalIndex>, outline: DocumentOutline) {
        self.document_index = Some(index);
        self.document_outline = outline;
    }

    /// Top-`k` chunks for `query`; empty when no documents were uploaded.
    #[must_use]
    pub fn retrieve(&self, query: &str, k: usize) -> Vec<String> {
        self.document_index
            .as_ref()
            .map(|index| index.query(query, k))
            .unwrap_or_default()
    }

    //
    // ─── MODE & TEST TRANSITIONS ───────────────────────────────────────────────
    //

    /// Switch to `mode`. Leaving test mode discards any unfinished test
    /// without scoring it; the discarded test is returned.
    pub fn switch_mode(&mut self, mode: Mode) -> Option<TestInstance> {
        if self.mode == mode {
            return None;
        }
        let abandoned = if self.mode == Mode::Test {
            self.active_test.take()
        } else {
            None
        };
        self.mode = mode;
        abandoned
    }

    /// Attach a freshly generated test and enter test mode.
    pub fn begin_test(&mut self, test: TestInstance) {
        self.current_topic = Some(test.topic().to_string());
        self.active_test = Some(test);
        self.mode = Mode::Test;
    }

    /// Apply the consequences of a fully answered test in one step: write the
    /// score, count a below-threshold result against the topic, return to
    /// teach mode and detach the test.
    ///
    /// Returns `None` (and changes nothing) unless the active test is complete.
    pub fn complete_test(&mut self) -> Option<TestCompletion> {
        let score = self.active_test.as_ref()?.score()?;
        let test = self.active_test.take()?;

        let weak_topic_recorded = score.is_below_threshold();
        if weak_topic_recorded {
            self.weak_topics.record(test.topic());
        }
        self.score = Some(score);
        self.mode = Mode::Teach;

        Some(TestCompletion {
            topic: test.topic().to_string(),
            score,
            weak_topic_recorded,
        })
    }

    /// Read-only view that never exposes unanswered ground truth.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id,
            mode: self.mode,
            has_documents: self.has_documents(),
            document_chunks: self.document_index.as_ref().map_or(0, |idx| idx.len()),
            document_kind: self.has_documents().then(|| self.document_outline.kind()),
            document_topics: self.document_outline.topics().to_vec(),
            syllabus_units: self.document_outline.units().to_vec(),
            current_topic: self.current_topic.clone(),
            test: self.active_test.as_ref().map(|test| TestProgress {
                topic: test.topic().to_string(),
                answered: test.cursor(),
                total: test.total(),
                correct_so_far: test.correct_so_far(),
                current: test.current_question().map(|q| q.view()),
            }),
            score: self.score,
            weak_topics: self.weak_topics.to_map(),
            created_at: self.created_at,
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("mode", &self.mode)
            .field("has_documents", &self.document_index.is_some())
            .field("active_test", &self.active_test)
            .field("score", &self.score)
            .field("weak_topics", &self.weak_topics)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

//
// ─── SNAPSHOT ──────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestProgress {
    pub topic: String,
    pub answered: usize,
    pub total: usize,
    pub correct_so_far: u32,
    pub current: Option<QuestionView>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub id: SessionId,
    pub mode: Mode,
    pub has_documents: bool,
    pub document_chunks: usize,
    pub document_kind: Option<DocumentKind>,
    pub document_topics: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub syllabus_units: Vec<SyllabusUnit>,
    pub current_topic: Option<String>,
    pub test: Option<TestProgress>,
    pub score: Option<TestScore>,
    pub weak_topics: BTreeMap<String, u32>,
    pub created_at: DateTime<Utc>,
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
