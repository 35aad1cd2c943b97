//! Prompt templates per mode.
//!
//! Everything here is a pure mapping from inputs to a [`Prompt`]; nothing
//! reads or writes session state.

use std::fmt::Write as _;

use study_core::model::{Mode, QUESTIONS_PER_TEST};

use crate::generation::Prompt;

/// Longest document excerpt sent for topic extraction, in characters.
pub const TOPIC_EXTRACTION_MAX_CHARS: usize = 20_000;

/// Longest document excerpt sent for classification, in characters.
pub const CLASSIFICATION_MAX_CHARS: usize = 2_000;

const TEACH_SYSTEM: &str = "You are an elite exam preparation assistant. \
Your purpose is to help students score maximum marks in exams.

For every topic:
1. Give a structured, exam-oriented explanation.
2. Clearly highlight important formulae.
3. Provide step-by-step derivations if mathematical.
4. Mention common mistakes students make.
5. Add 2-3 exam-style questions at the end.
6. Keep explanations concise but structured, using headings and bullet points.

Follow this format exactly:
### Concept Overview
### Key Formulae
### Important Derivation
### Common Mistakes
### Exam Practice Questions";

const PRACTICE_SYSTEM: &str = "You are an elite exam preparation assistant. \
Generate exactly 5 exam-level practice problems on the requested topic. \
Number them 1 to 5 and follow each problem with a complete worked solution.";

const TEST_SYSTEM: &str = "You write multiple-choice exam questions. \
You respond with a single JSON array and nothing else: no markdown, no commentary.";

const TOPIC_SYSTEM: &str = "You extract syllabus topics from academic content. \
You respond with a JSON array of strings and nothing else.";

const UNITS_SYSTEM: &str = "You extract the structure of a syllabus. \
You respond with a single JSON object and nothing else.";

const CLASSIFY_SYSTEM: &str = "You are a classifier. Respond with one word only.";

/// Reply sent instead of a generated answer when a syllabus does not cover the topic.
pub const OUT_OF_SYLLABUS_ANSWER: &str = "This topic does not appear in your uploaded syllabus.";

/// How the uploaded documents constrain a teach or practice answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DocumentContext<'a> {
    #[default]
    NoDocuments,
    /// Notes, a textbook or anything else used as reference material.
    Reference,
    /// A syllabus with topics; `unit` names the unit the topic belongs to.
    Syllabus { unit: Option<&'a str> },
    /// A syllabus that lists no topics to check against.
    UnstructuredSyllabus,
}

/// Inputs for a teach or practice turn.
#[derive(Debug, Clone, Copy)]
pub struct PromptContext<'a> {
    pub message: &'a str,
    /// Topic the conversation is locked to.
    pub topic: Option<&'a str>,
    /// Retrieved document chunks, most relevant first.
    pub chunks: &'a [String],
    /// A topic with enough recorded failures to warrant reinforcement.
    pub weak_topic: Option<&'a str>,
    pub documents: DocumentContext<'a>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PromptBuilder;

impl PromptBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Template selection over every mode.
    ///
    /// Test mode yields the question-generation prompt for the locked topic
    /// (or the message itself when no topic is locked).
    #[must_use]
    pub fn build(&self, mode: Mode, ctx: &PromptContext<'_>) -> Prompt {
        match mode {
            Mode::Teach => self.teach(ctx),
            Mode::Practice => self.practice(ctx),
            Mode::Test => self.test_generation(ctx.topic.unwrap_or(ctx.message), ctx.chunks),
        }
    }

    fn teach(&self, ctx: &PromptContext<'_>) -> Prompt {
        let mut system = String::from(TEACH_SYSTEM);
        push_topic_lock(&mut system, ctx.topic);
        if let Some(weak) = ctx.weak_topic {
            let _ = write!(
                system,
                "\n\nThe student is struggling with {weak}. Reinforce the fundamentals first, \
                 go slowly and clarify common misconceptions before moving on."
            );
        }
        push_document_instruction(&mut system, ctx.documents);

        Prompt {
            system,
            user: user_turn(ctx.message, ctx.chunks),
        }
    }

    fn practice(&self, ctx: &PromptContext<'_>) -> Prompt {
        let mut system = String::from(PRACTICE_SYSTEM);
        push_topic_lock(&mut system, ctx.topic);
        push_document_instruction(&mut system, ctx.documents);

        Prompt {
            system,
            user: user_turn(ctx.message, ctx.chunks),
        }
    }

    /// Prompt asking for the test's questions in the strict JSON shape the
    /// question parser accepts.
    #[must_use]
    pub fn test_generation(&self, topic: &str, chunks: &[String]) -> Prompt {
        let mut user = format!(
            "Write exactly {QUESTIONS_PER_TEST} multiple-choice questions on the topic: {topic}\n\n\
             Rules:\n\
             - Every question is about this topic only.\n\
             - Every question has exactly four choices labeled \"a\", \"b\", \"c\" and \"d\".\n\
             - Exactly one choice is correct; give its label in \"answer\".\n\
             - Do not reveal answers anywhere else.\n\n\
             Return ONLY a JSON array in this shape:\n\
             [{{\"question\": \"...\", \"choices\": [\
             {{\"label\": \"a\", \"text\": \"...\"}}, \
             {{\"label\": \"b\", \"text\": \"...\"}}, \
             {{\"label\": \"c\", \"text\": \"...\"}}, \
             {{\"label\": \"d\", \"text\": \"...\"}}], \
             \"answer\": \"a\"}}]"
        );
        if !chunks.is_empty() {
            user.push_str("\n\nBase the questions on this material:\n");
            push_chunks(&mut user, chunks);
        }

        Prompt {
            system: TEST_SYSTEM.to_string(),
            user,
        }
    }

    /// Prompt asking whether an uploaded document is a syllabus, lecture
    /// notes, a textbook or something else.
    #[must_use]
    pub fn document_classification(&self, text: &str) -> Prompt {
        let excerpt = excerpt(text, CLASSIFICATION_MAX_CHARS);
        Prompt {
            system: CLASSIFY_SYSTEM.to_string(),
            user: format!(
                "Classify this document as one of:\n\
                 1. syllabus\n\
                 2. lecture notes\n\
                 3. textbook\n\
                 4. other\n\n\
                 Return only one word.\n\n\
                 Text:\n{excerpt}"
            ),
        }
    }

    /// Prompt asking for the topics of an uploaded document.
    #[must_use]
    pub fn topic_extraction(&self, text: &str) -> Prompt {
        let excerpt = excerpt(text, TOPIC_EXTRACTION_MAX_CHARS);
        Prompt {
            system: TOPIC_SYSTEM.to_string(),
            user: format!(
                "Extract a clean list of syllabus topics from this academic content.\n\
                 Return ONLY a JSON array of topic strings.\n\n\
                 Content:\n{excerpt}"
            ),
        }
    }

    /// Prompt asking for a syllabus grouped by unit.
    #[must_use]
    pub fn syllabus_units(&self, text: &str) -> Prompt {
        let excerpt = excerpt(text, TOPIC_EXTRACTION_MAX_CHARS);
        Prompt {
            system: UNITS_SYSTEM.to_string(),
            user: format!(
                "Extract structured topics from this syllabus.\n\
                 Return ONLY a JSON object mapping each unit to its topics, in syllabus order:\n\
                 {{\"Unit I\": [\"topic1\", \"topic2\"], \
                 \"Unit II\": [\"topic1\", \"topic2\"]}}\n\n\
                 Content:\n{excerpt}"
            ),
        }
    }
}

fn excerpt(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

fn push_topic_lock(system: &mut String, topic: Option<&str>) {
    if let Some(topic) = topic {
        let _ = write!(
            system,
            "\n\nYou are currently covering ONLY the topic: {topic}. \
             Do not change the subject or introduce unrelated topics."
        );
    }
}

fn push_document_instruction(system: &mut String, documents: DocumentContext<'_>) {
    match documents {
        DocumentContext::NoDocuments => {
            system.push_str("\n\nNo document was uploaded. Answer from general knowledge.");
        }
        DocumentContext::Reference => system.push_str(
            "\n\nUse the uploaded document excerpts as the primary source. \
             Do not introduce unrelated content.",
        ),
        DocumentContext::Syllabus { unit } => {
            system.push_str("\n\nTeach strictly within the scope of the uploaded syllabus.");
            if let Some(unit) = unit {
                let _ = write!(system, " This topic belongs to {unit}.");
            }
            system.push_str(" Do not introduce unrelated topics.");
        }
        DocumentContext::UnstructuredSyllabus => system.push_str(
            "\n\nThe uploaded syllabus lists no explanations. Use general knowledge, \
             but frame the answer strictly inside the syllabus structure.",
        ),
    }
}

fn user_turn(message: &str, chunks: &[String]) -> String {
    if chunks.is_empty() {
        return message.trim().to_string();
    }
    let mut user = String::from("Relevant excerpts from the uploaded documents:\n");
    push_chunks(&mut user, chunks);
    let _ = write!(user, "\nRequest: {}", message.trim());
    user
}

fn push_chunks(out: &mut String, chunks: &[String]) {
    for (idx, chunk) in chunks.iter().enumerate() {
        let _ = writeln!(out, "[{}] {}", idx + 1, chunk.trim());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx<'a>(chunks: &'a [String], weak_topic: Option<&'a str>) -> PromptContext<'a> {
        PromptContext {
            message: "Explain Fourier Series",
            topic: Some("Explain Fourier Series"),
            chunks,
            weak_topic,
            documents: if chunks.is_empty() {
                DocumentContext::NoDocuments
            } else {
                DocumentContext::Reference
            },
        }
    }

    #[test]
    fn teach_prompt_includes_chunks_and_sections() {
        let chunks = vec!["Fourier series expand periodic functions.".to_string()];
        let prompt = PromptBuilder::new().build(Mode::Teach, &ctx(&chunks, None));

        assert!(prompt.system.contains("### Concept Overview"));
        assert!(prompt.system.contains("primary source"));
        assert!(prompt.user.contains("[1] Fourier series expand periodic functions."));
        assert!(prompt.user.contains("Request: Explain Fourier Series"));
        assert!(!prompt.system.contains("struggling"));
    }

    #[test]
    fn teach_prompt_reinforces_weak_topic() {
        let prompt = PromptBuilder::new().build(Mode::Teach, &ctx(&[], Some("Fourier Series")));
        assert!(prompt.system.contains("struggling with Fourier Series"));
        assert!(prompt.system.contains("fundamentals"));
        assert!(prompt.system.contains("general knowledge"));
    }

    #[test]
    fn practice_prompt_asks_for_five_solved_problems() {
        let prompt = PromptBuilder::new().build(Mode::Practice, &ctx(&[], Some("ignored")));
        assert!(prompt.system.contains("exactly 5"));
        assert!(prompt.system.contains("worked solution"));
        assert!(!prompt.system.contains("struggling"));
        assert_eq!(prompt.user, "Explain Fourier Series");
    }

    #[test]
    fn test_prompt_demands_strict_json() {
        let prompt = PromptBuilder::new().test_generation("Fourier Series", &[]);
        assert!(prompt.user.contains("exactly 5 multiple-choice questions"));
        assert!(prompt.user.contains("topic: Fourier Series"));
        assert!(prompt.user.contains("\"answer\""));
        assert!(prompt.system.contains("JSON array"));
    }

    #[test]
    fn every_mode_has_a_template() {
        let builder = PromptBuilder::new();
        for mode in [Mode::Teach, Mode::Practice, Mode::Test] {
            let prompt = builder.build(mode, &ctx(&[], None));
            assert!(!prompt.system.is_empty());
            assert!(!prompt.user.is_empty());
        }
    }

    #[test]
    fn topic_extraction_truncates_input() {
        let text = "x".repeat(TOPIC_EXTRACTION_MAX_CHARS + 500);
        let prompt = PromptBuilder::new().topic_extraction(&text);
        let excerpt = prompt.user.split("Content:\n").nth(1).unwrap();
        assert_eq!(excerpt.chars().count(), TOPIC_EXTRACTION_MAX_CHARS);
    }

    #[test]
    fn syllabus_context_names_the_unit() {
        let chunks = vec!["Unit II: Laplace Transform".to_string()];
        let ctx = PromptContext {
            documents: DocumentContext::Syllabus {
                unit: Some("Unit II"),
            },
            ..ctx(&chunks, None)
        };
        let prompt = PromptBuilder::new().build(Mode::Teach, &ctx);
        assert!(prompt.system.contains("scope of the uploaded syllabus"));
        assert!(prompt.system.contains("This topic belongs to Unit II."));
        assert!(!prompt.system.contains("primary source"));

        let ctx = PromptContext {
            documents: DocumentContext::UnstructuredSyllabus,
            ..ctx
        };
        let prompt = PromptBuilder::new().build(Mode::Practice, &ctx);
        assert!(prompt.system.contains("syllabus structure"));
    }

    #[test]
    fn classification_prompt_lists_kinds() {
        let text = "y".repeat(CLASSIFICATION_MAX_CHARS * 2);
        let prompt = PromptBuilder::new().document_classification(&text);
        assert!(prompt.user.contains("2. lecture notes"));
        assert!(prompt.system.contains("one word"));
        let excerpt = prompt.user.split("Text:\n").nth(1).unwrap();
        assert_eq!(excerpt.chars().count(), CLASSIFICATION_MAX_CHARS);
    }
}
