//! Per-session similarity search over document chunks.
//!
//! The engine only depends on [`RetrievalIndex`]; [`KeywordIndex`] is the
//! built-in lexical implementation (TF-IDF weighted cosine similarity).
//! Embedding-backed indexes can implement the same trait.

use std::collections::HashMap;
use std::fmt;

/// Default number of chunks retrieved per query.
pub const DEFAULT_TOP_K: usize = 3;

const STOPWORDS: &[&str] = &[
    "an", "and", "are", "as", "at", "be", "by", "for", "from", "how", "in", "is", "it", "of",
    "on", "or", "that", "the", "this", "to", "was", "what", "with",
];

/// Similarity search over the chunks of one session's documents.
pub trait RetrievalIndex: Send + Sync {
    /// Up to `k` chunks ranked by similarity to `text`, most similar first.
    fn query(&self, text: &str, k: usize) -> Vec<String>;

    /// Number of indexed chunks.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

//
// ─── KEYWORD INDEX ─────────────────────────────────────────────────────────────
//

struct IndexedChunk {
    text: String,
    weights: HashMap<String, f64>,
    norm: f64,
}

/// Lexical index: TF-IDF vectors over lowercase alphanumeric terms.
pub struct KeywordIndex {
    chunks: Vec<IndexedChunk>,
    idf: HashMap<String, f64>,
}

impl KeywordIndex {
    /// Index the given chunks. Blank chunks are skipped.
    #[must_use]
    pub fn build<I, S>(chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let raw: Vec<(String, HashMap<String, f64>)> = chunks
            .into_iter()
            .map(Into::into)
            .filter(|text: &String| !text.trim().is_empty())
            .map(|text| {
                let tf = term_frequencies(&text);
                (text, tf)
            })
            .collect();

        let mut document_frequency: HashMap<String, usize> = HashMap::new();
        for (_, tf) in &raw {
            for term in tf.keys() {
                *document_frequency.entry(term.clone()).or_insert(0) += 1;
            }
        }

        #[allow(clippy::cast_precision_loss)]
        let total = raw.len() as f64;
        let idf: HashMap<String, f64> = document_frequency
            .into_iter()
            .map(|(term, df)| {
                #[allow(clippy::cast_precision_loss)]
                let weight = ((total + 1.0) / (df as f64 + 1.0)).ln() + 1.0;
                (term, weight)
            })
            .collect();

        let chunks = raw
            .into_iter()
            .map(|(text, tf)| {
                let weights = weigh(tf, &idf);
                let norm = norm(&weights);
                IndexedChunk {
                    text,
                    weights,
                    norm,
                }
            })
            .collect();

        Self { chunks, idf }
    }
}

impl RetrievalIndex for KeywordIndex {
    fn query(&self, text: &str, k: usize) -> Vec<String> {
        if k == 0 || self.chunks.is_empty() {
            return Vec::new();
        }
        let query = weigh(term_frequencies(text), &self.idf);
        let query_norm = norm(&query);
        if query_norm == 0.0 {
            return Vec::new();
        }

        let mut scored: Vec<(usize, f64)> = self
            .chunks
            .iter()
            .enumerate()
            .filter(|(_, chunk)| chunk.norm > 0.0)
            .map(|(idx, chunk)| {
                let dot: f64 = query
                    .iter()
                    .filter_map(|(term, w)| chunk.weights.get(term).map(|cw| w * cw))
                    .sum();
                (idx, dot / (query_norm * chunk.norm))
            })
            .filter(|(_, score)| *score > 0.0)
            .collect();

        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored
            .into_iter()
            .take(k)
            .map(|(idx, _)| self.chunks[idx].text.clone())
            .collect()
    }

    fn len(&self) -> usize {
        self.chunks.len()
    }
}

impl fmt::Debug for KeywordIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeywordIndex")
            .field("chunks_len", &self.chunks.len())
            .field("terms_len", &self.idf.len())
            .finish()
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| token.chars().count() >= 2)
        .map(str::to_lowercase)
        .filter(|token| !STOPWORDS.contains(&token.as_str()))
}

fn term_frequencies(text: &str) -> HashMap<String, f64> {
    let mut tf = HashMap::new();
    for token in tokenize(text) {
        *tf.entry(token).or_insert(0.0) += 1.0;
    }
    tf
}

fn weigh(tf: HashMap<String, f64>, idf: &HashMap<String, f64>) -> HashMap<String, f64> {
    tf.into_iter()
        .filter_map(|(term, count)| idf.get(&term).map(|w| (term, count * w)))
        .collect()
}

fn norm(weights: &HashMap<String, f64>) -> f64 {
    weights.values().map(|w| w * w).sum::<f64>().sqrt()
}

//
// ─── CHUNKING ──────────────────────────────────────────────────────────────────
//

/// Size limits for [`split_text`], in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkConfig {
    pub size: usize,
    pub overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            size: 500,
            overlap: 50,
        }
    }
}

const SEPARATORS: [&str; 4] = ["\n\n", "\n", ". ", " "];

/// Split extracted document text into overlapping chunks.
///
/// Prefers paragraph, then line, sentence and word boundaries; words longer
/// than a chunk are cut at character boundaries. Each new chunk starts with up
/// to `overlap` characters of the previous one.
#[must_use]
pub fn split_text(text: &str, config: ChunkConfig) -> Vec<String> {
    let size = config.size.max(1);
    if text.trim().is_empty() {
        return Vec::new();
    }

    let mut pieces = Vec::new();
    collect_pieces(text, size, &SEPARATORS, &mut pieces);

    let mut chunks = Vec::new();
    let mut current = String::new();
    for piece in pieces {
        if !current.is_empty() && char_len(&current) + char_len(piece) > size {
            let finished = current.trim();
            if !finished.is_empty() {
                chunks.push(finished.to_string());
            }
            current = overlap_tail(&current, config.overlap.min(size - 1));
            if char_len(&current) + char_len(piece) > size {
                current.clear();
            }
        }
        current.push_str(piece);
    }
    let last = current.trim();
    if !last.is_empty() {
        chunks.push(last.to_string());
    }
    chunks
}

fn collect_pieces<'a>(text: &'a str, size: usize, separators: &[&str], out: &mut Vec<&'a str>) {
    if char_len(text) <= size {
        out.push(text);
        return;
    }
    match separators.split_first() {
        Some((sep, rest)) if text.contains(sep) => {
            for part in text.split_inclusive(sep) {
                collect_pieces(part, size, rest, out);
            }
        }
        Some((_, rest)) => collect_pieces(text, size, rest, out),
        None => {
            let mut start = 0;
            for (count, (idx, _)) in text.char_indices().enumerate() {
                if count > 0 && count % size == 0 {
                    out.push(&text[start..idx]);
                    start = idx;
                }
            }
            out.push(&text[start..]);
        }
    }
}

fn overlap_tail(text: &str, overlap: usize) -> String {
    if overlap == 0 {
        return String::new();
    }
    let len = char_len(text);
    if len <= overlap {
        return text.to_string();
    }
    let start = text
        .char_indices()
        .nth(len - overlap)
        .map_or(0, |(idx, _)| idx);
    let tail = &text[start..];
    match tail.find(char::is_whitespace) {
        Some(ws) => tail[ws..].trim_start().to_string(),
        None => tail.to_string(),
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
