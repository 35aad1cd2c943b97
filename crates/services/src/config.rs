use std::env;

use chrono::Duration;
use tracing::warn;

use study_core::retrieval::{ChunkConfig, DEFAULT_TOP_K};

const DEFAULT_SESSION_TTL_SECS: i64 = 6 * 60 * 60;

/// Tunables for `SessionEngine`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Chunks retrieved per teach/practice/test turn.
    pub retrieval_top_k: usize,
    /// Idle time after which a session may be purged.
    pub session_ttl: Duration,
    /// Splitting used for raw-text ingestion.
    pub chunk: ChunkConfig,
    /// Ask the model for syllabus topics after each ingestion.
    pub extract_topics: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retrieval_top_k: DEFAULT_TOP_K,
            session_ttl: Duration::seconds(DEFAULT_SESSION_TTL_SECS),
            chunk: ChunkConfig::default(),
            extract_topics: true,
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `STUDY_TOP_K` and `STUDY_SESSION_TTL_SECS`.
    ///
    /// Unparseable values are logged and ignored.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(top_k) = read_var::<usize>("STUDY_TOP_K").filter(|k| *k > 0) {
            config.retrieval_top_k = top_k;
        }
        if let Some(secs) = read_var::<i64>("STUDY_SESSION_TTL_SECS").filter(|s| *s > 0) {
            config.session_ttl = Duration::seconds(secs);
        }
        config
    }
}

fn read_var<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "ignoring unparseable setting");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = EngineConfig::default();
        assert_eq!(config.retrieval_top_k, 3);
        assert_eq!(config.session_ttl, Duration::hours(6));
        assert_eq!(config.chunk, ChunkConfig { size: 500, overlap: 50 });
        assert!(config.extract_topics);
    }

    #[test]
    fn missing_variable_reads_as_none() {
        assert_eq!(read_var::<usize>("STUDY_TEST_DEFINITELY_UNSET_VARIABLE"), None);
    }
}
