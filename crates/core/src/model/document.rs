use serde::{Deserialize, Serialize};
use std::fmt;

use crate::model::text::{contains_phrase, words};

/// What an uploaded document is, as judged by the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Syllabus,
    LectureNotes,
    Textbook,
    #[default]
    Other,
}

impl DocumentKind {
    /// Map a free-form classifier answer onto a kind. Unrecognised answers
    /// are `Other`.
    #[must_use]
    pub fn classify(answer: &str) -> Self {
        let answer = answer.to_lowercase();
        if answer.contains("syllabus") {
            DocumentKind::Syllabus
        } else if answer.contains("notes") || answer.contains("lecture") {
            DocumentKind::LectureNotes
        } else if answer.contains("text") || answer.contains("book") {
            DocumentKind::Textbook
        } else {
            DocumentKind::Other
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            DocumentKind::Syllabus => "syllabus",
            DocumentKind::LectureNotes => "lecture_notes",
            DocumentKind::Textbook => "textbook",
            DocumentKind::Other => "other",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One named unit of a syllabus and the topics it lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyllabusUnit {
    pub name: String,
    pub topics: Vec<String>,
}

/// Where a topic sits relative to an uploaded syllabus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyllabusScope<'a> {
    /// The documents are not a syllabus; nothing is restricted.
    NotSyllabus,
    /// A syllabus whose units list no topics, so scope cannot be checked.
    Unstructured,
    /// The topic matches a syllabus entry, in `unit` when one was found.
    InScope { unit: Option<&'a str> },
    OutOfScope,
}

/// Classification and topic structure of the current documents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentOutline {
    kind: DocumentKind,
    topics: Vec<String>,
    units: Vec<SyllabusUnit>,
}

impl DocumentOutline {
    /// A flat topic list for a non-syllabus document.
    #[must_use]
    pub fn new(kind: DocumentKind, topics: Vec<String>) -> Self {
        Self {
            kind,
            topics,
            units: Vec::new(),
        }
    }

    /// A syllabus grouped into units; the flat topic list follows unit order.
    #[must_use]
    pub fn syllabus(units: Vec<SyllabusUnit>) -> Self {
        let topics = units
            .iter()
            .flat_map(|unit| unit.topics.iter().cloned())
            .collect();
        Self {
            kind: DocumentKind::Syllabus,
            topics,
            units,
        }
    }

    #[must_use]
    pub fn kind(&self) -> DocumentKind {
        self.kind
    }

    #[must_use]
    pub fn topics(&self) -> &[String] {
        &self.topics
    }

    #[must_use]
    pub fn units(&self) -> &[SyllabusUnit] {
        &self.units
    }

    /// Check `topic` against the syllabus units.
    ///
    /// A topic matches an entry when either one contains the other as whole
    /// words. An empty topic is never rejected.
    #[must_use]
    pub fn scope_of(&self, topic: &str) -> SyllabusScope<'_> {
        if self.kind != DocumentKind::Syllabus {
            return SyllabusScope::NotSyllabus;
        }
        if self.topics.is_empty() {
            return SyllabusScope::Unstructured;
        }
        let asked = words(topic);
        if asked.is_empty() {
            return SyllabusScope::InScope { unit: None };
        }

        self.units
            .iter()
            .find(|unit| {
                unit.topics.iter().any(|entry| {
                    let entry = words(entry);
                    contains_phrase(&asked, &entry) || contains_phrase(&entry, &asked)
                })
            })
            .map_or(SyllabusScope::OutOfScope, |unit| SyllabusScope::InScope {
                unit: Some(unit.name.as_str()),
            })
    }
}
