use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use study_core::model::{DocumentKind, DocumentOutline, SyllabusUnit};

use crate::generation::GenerationClient;
use crate::prompts::PromptBuilder;

/// Cap on topics kept from a plain-text (non-JSON) answer.
const MAX_FALLBACK_TOPICS: usize = 30;

/// Asks the model what an uploaded document is and which topics it covers.
///
/// Best effort: a failed classification yields the default outline, a failed
/// extraction keeps the kind with no topics. Ingestion never fails here.
#[derive(Clone)]
pub struct TopicExtractor {
    generation: Arc<dyn GenerationClient>,
    prompts: PromptBuilder,
}

impl TopicExtractor {
    #[must_use]
    pub fn new(generation: Arc<dyn GenerationClient>) -> Self {
        Self {
            generation,
            prompts: PromptBuilder::new(),
        }
    }

    pub async fn extract(&self, text: &str) -> DocumentOutline {
        if text.trim().is_empty() {
            return DocumentOutline::default();
        }

        let prompt = self.prompts.document_classification(text);
        let kind = match self.generation.generate(&prompt).await {
            Ok(raw) => DocumentKind::classify(&raw),
            Err(err) => {
                warn!(error = %err, "document classification failed");
                return DocumentOutline::default();
            }
        };

        let prompt = match kind {
            DocumentKind::Syllabus => self.prompts.syllabus_units(text),
            _ => self.prompts.topic_extraction(text),
        };
        let raw = match self.generation.generate(&prompt).await {
            Ok(raw) => raw,
            Err(err) => {
                warn!(error = %err, %kind, "topic extraction failed");
                return DocumentOutline::new(kind, Vec::new());
            }
        };

        let outline = match kind {
            DocumentKind::Syllabus => DocumentOutline::syllabus(parse_units(&raw)),
            _ => DocumentOutline::new(kind, parse_topics(&raw)),
        };
        debug!(
            %kind,
            topics = outline.topics().len(),
            units = outline.units().len(),
            "document outline extracted"
        );
        outline
    }
}

/// Syllabus units from a JSON object of `unit -> [topic]`, kept in the order
/// the model wrote them. Non-array values are skipped.
#[must_use]
pub fn parse_units(raw: &str) -> Vec<SyllabusUnit> {
    let raw = raw.trim();
    let object = match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Some(map),
        Ok(_) => None,
        Err(_) => embedded_object(raw),
    };

    object
        .map(|map| {
            map.into_iter()
                .filter_map(|(name, value)| match value {
                    Value::Array(items) => Some(SyllabusUnit {
                        name: name.trim().to_string(),
                        topics: clean(items),
                    }),
                    _ => None,
                })
                .filter(|unit| !unit.name.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

fn embedded_object(raw: &str) -> Option<Map<String, Value>> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str::<Value>(&raw[start..=end]) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Lenient topic list parsing: a JSON array, the first array inside a JSON
/// object (in the order the keys were written), an array embedded in prose,
/// then one topic per line.
#[must_use]
pub fn parse_topics(raw: &str) -> Vec<String> {
    let raw = raw.trim();
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Array(items)) => return clean(items),
        Ok(Value::Object(map)) => {
            return map
                .into_iter()
                .find_map(|(_, value)| match value {
                    Value::Array(items) => Some(clean(items)),
                    _ => None,
                })
                .unwrap_or_default();
        }
        Ok(_) => return Vec::new(),
        Err(_) => {}
    }

    if let (Some(start), Some(end)) = (raw.find('['), raw.rfind(']')) {
        if end > start {
            if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(&raw[start..=end]) {
                return clean(items);
            }
        }
    }

    raw.replace("- ", "\n")
        .lines()
        .map(|line| {
            line.trim()
                .trim_matches(|c| matches!(c, '-' | '*' | '•'))
                .trim()
                .trim_matches(|c| c == '"' || c == '\'')
                .to_string()
        })
        .filter(|line| line.chars().count() > 2)
        .take(MAX_FALLBACK_TOPICS)
        .collect()
}

fn clean(items: Vec<Value>) -> Vec<String> {
    items
        .into_iter()
        .map(|item| match item {
            Value::String(s) => s.trim().to_string(),
            other => other.to_string().trim().to_string(),
        })
        .filter(|topic| !topic.is_empty())
        .collect()
}
