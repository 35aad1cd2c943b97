use serde::Serialize;
use std::collections::BTreeMap;

use crate::model::text::{contains_phrase, words};

/// Failure count at which a topic is considered weak.
pub const WEAK_TOPIC_THRESHOLD: u32 = 2;

/// Per-session memory of topics the student keeps failing.
///
/// Counts only ever grow. Topic labels compare case-insensitively; the first
/// spelling recorded is the one kept as the key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct WeakTopicTracker {
    counts: BTreeMap<String, u32>,
}

impl WeakTopicTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment the failure count for `topic`, creating it at 1. Returns the new count.
    pub fn record(&mut self, topic: &str) -> u32 {
        let topic = topic.trim();
        let key = self
            .find_key(topic)
            .map_or_else(|| topic.to_string(), str::to_string);
        let count = self.counts.entry(key).or_insert(0);
        *count = count.saturating_add(1);
        *count
    }

    #[must_use]
    pub fn count(&self, topic: &str) -> u32 {
        self.find_key(topic.trim())
            .and_then(|key| self.counts.get(key))
            .copied()
            .unwrap_or(0)
    }

    /// True once `topic` has at least `WEAK_TOPIC_THRESHOLD` recorded failures.
    #[must_use]
    pub fn hint(&self, topic: &str) -> bool {
        self.count(topic) >= WEAK_TOPIC_THRESHOLD
    }

    /// First weak topic whose label appears in `text` as whole words, if any.
    #[must_use]
    pub fn weak_topic_in(&self, text: &str) -> Option<&str> {
        let haystack = words(text);
        self.counts
            .iter()
            .filter(|(_, count)| **count >= WEAK_TOPIC_THRESHOLD)
            .map(|(topic, _)| topic.as_str())
            .find(|topic| contains_phrase(&haystack, &words(topic)))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    #[must_use]
    pub fn to_map(&self) -> BTreeMap<String, u32> {
        self.counts.clone()
    }

    fn find_key(&self, topic: &str) -> Option<&str> {
        let wanted = topic.to_lowercase();
        self.counts
            .keys()
            .find(|key| key.to_lowercase() == wanted)
            .map(String::as_str)
    }
}
