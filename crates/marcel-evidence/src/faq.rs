//! Nearest-FAQ lookup. A query close enough to a curated question resolves to the
//! documents that answer it.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{EvidenceError, Result};
use crate::lexical::tokenize;
use crate::store::EmbedFn;
use crate::types::FaqEntry;

const STOPWORDS: &[&str] = &[
    "a", "about", "am", "an", "and", "are", "as", "at", "be", "by", "can", "could", "do",
    "does", "for", "from", "have", "how", "i", "if", "in", "is", "it", "me", "my", "of", "on",
    "or", "should", "so", "that", "the", "there", "this", "to", "was", "what", "when",
    "where", "which", "who", "will", "with", "would", "you", "your",
];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FaqBackend {
    /// Cosine over term-frequency vectors. Deterministic, no model needed.
    #[default]
    Lexical,
    /// Cosine over question embeddings from the configured provider.
    Embedding,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FaqConfig {
    pub backend: FaqBackend,
    /// Minimum similarity for a question to count as a match.
    pub min_similarity: f64,
    /// Score assigned to documents reached through a matching FAQ.
    pub faq_score: f64,
}

impl Default for FaqConfig {
    fn default() -> Self {
        Self {
            backend: FaqBackend::default(),
            min_similarity: 0.4,
            faq_score: 1.0,
        }
    }
}

enum Matcher {
    Lexical(Vec<HashMap<String, f64>>),
    Embedding {
        vectors: Vec<Option<Vec<f32>>>,
        embed: EmbedFn,
    },
}

pub struct FaqIndex {
    entries: Vec<FaqEntry>,
    matcher: Matcher,
    config: FaqConfig,
}

impl std::fmt::Debug for FaqIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let backend = match self.matcher {
            Matcher::Lexical(_) => "lexical",
            Matcher::Embedding { .. } => "embedding",
        };
        f.debug_struct("FaqIndex")
            .field("entries", &self.entries.len())
            .field("backend", &backend)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl FaqIndex {
    /// Build the index. The embedding backend embeds every question once; questions
    /// whose embedding fails are kept but never match.
    ///
    /// # Errors
    ///
    /// Returns `EvidenceError::MissingEmbedder` if the embedding backend is selected
    /// without an embedder.
    pub async fn build(
        entries: Vec<FaqEntry>,
        config: FaqConfig,
        embedder: Option<EmbedFn>,
    ) -> Result<Self> {
        let matcher = match config.backend {
            FaqBackend::Lexical => Matcher::Lexical(
                entries
                    .iter()
                    .map(|e| term_vector(&e.question))
                    .collect(),
            ),
            FaqBackend::Embedding => {
                let embed = embedder.ok_or(EvidenceError::MissingEmbedder)?;
                let mut vectors = Vec::with_capacity(entries.len());
                for entry in &entries {
                    match embed(&entry.question).await {
                        Ok(v) => vectors.push(Some(v)),
                        Err(e) => {
                            tracing::warn!(question = %entry.question, "failed to embed faq: {e:#}");
                            vectors.push(None);
                        }
                    }
                }
                Matcher::Embedding { vectors, embed }
            }
        };

        tracing::info!(entries = entries.len(), backend = ?config.backend, "faq index built");
        Ok(Self {
            entries,
            matcher,
            config,
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn config(&self) -> &FaqConfig {
        &self.config
    }

    /// Up to `top_k` entries at or above `min_similarity`, best first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query embedding fails.
    pub async fn best_matches(&self, query: &str, top_k: usize) -> Result<Vec<(&FaqEntry, f64)>> {
        if top_k == 0 || self.entries.is_empty() || query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let similarities: Vec<f64> = match &self.matcher {
            Matcher::Lexical(vectors) => {
                let q = term_vector(query);
                vectors.iter().map(|v| sparse_cosine(&q, v)).collect()
            }
            Matcher::Embedding { vectors, embed } => {
                let q = embed(query).await?;
                vectors
                    .iter()
                    .map(|v| v.as_deref().map_or(0.0, |v| f64::from(cosine_similarity(&q, v))))
                    .collect()
            }
        };

        let mut scored: Vec<(usize, f64)> = similarities
            .into_iter()
            .enumerate()
            .filter(|(_, s)| *s >= self.config.min_similarity)
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored.truncate(top_k);

        Ok(scored
            .into_iter()
            .filter_map(|(idx, s)| self.entries.get(idx).map(|e| (e, s)))
            .collect())
    }
}

fn term_vector(text: &str) -> HashMap<String, f64> {
    let mut tf = HashMap::new();
    for token in tokenize(text) {
        if STOPWORDS.contains(&token.as_str()) {
            continue;
        }
        *tf.entry(token).or_insert(0.0) += 1.0;
    }
    tf
}

fn sparse_cosine(a: &HashMap<String, f64>, b: &HashMap<String, f64>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let dot: f64 = a
        .iter()
        .filter_map(|(term, x)| b.get(term).map(|y| x * y))
        .sum();
    let norm_a = a.values().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b = b.values().map(|x| x * x).sum::<f64>().sqrt();
    dot / (norm_a * norm_b)
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0_f32;
    let mut norm_a = 0.0_f32;
    let mut norm_b = 0.0_f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::Arc;

    use marcel_llm::LlmError;
    use marcel_llm::provider::EmbedFuture;

    use super::*;
    use crate::types::Fingerprint;

    fn entry(question: &str, fp: &str) -> FaqEntry {
        FaqEntry {
            question: question.into(),
            linked_document_fingerprints: BTreeSet::from([Fingerprint::new(fp)]),
        }
    }

    fn entries() -> Vec<FaqEntry> {
        vec![
            entry("What is the deadline for the application?", "deadline"),
            entry("What fruits are good for my health?", "fruit"),
        ]
    }

    #[tokio::test]
    async fn lexical_match_above_threshold() {
        let index = FaqIndex::build(entries(), FaqConfig::default(), None)
            .await
            .unwrap();
        let hits = index
            .best_matches("What fruits are healthy? Are fruits good?", 1)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert!(
            hits[0]
                .0
                .linked_document_fingerprints
                .contains(&Fingerprint::new("fruit"))
        );
    }

    #[tokio::test]
    async fn lexical_below_threshold_is_empty() {
        let index = FaqIndex::build(entries(), FaqConfig::default(), None)
            .await
            .unwrap();
        assert!(index.best_matches("tuition fees", 1).await.unwrap().is_empty());
        assert!(index.best_matches("   ", 1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn embedding_backend_requires_embedder() {
        let config = FaqConfig {
            backend: FaqBackend::Embedding,
            ..FaqConfig::default()
        };
        let err = FaqIndex::build(entries(), config, None).await.unwrap_err();
        assert!(matches!(err, EvidenceError::MissingEmbedder));
    }

    #[tokio::test]
    async fn embedding_backend_uses_cosine() {
        let embed: EmbedFn = Arc::new(|text: &str| -> EmbedFuture {
            let v = if text.contains("fruit") {
                vec![0.0, 1.0]
            } else {
                vec![1.0, 0.0]
            };
            Box::pin(async move { Ok(v) })
        });
        let config = FaqConfig {
            backend: FaqBackend::Embedding,
            ..FaqConfig::default()
        };
        let index = FaqIndex::build(entries(), config, Some(embed)).await.unwrap();
        let hits = index.best_matches("any fruit advice?", 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!((hits[0].1 - 1.0).abs() < 1e-6);
        assert_eq!(hits[0].0.question, "What fruits are good for my health?");
    }

    #[tokio::test]
    async fn embedding_query_failure_is_error() {
        let embed: EmbedFn = Arc::new(|text: &str| -> EmbedFuture {
            let fail = text.starts_with("boom");
            Box::pin(async move {
                if fail {
                    Err(LlmError::Other("embed down".into()))
                } else {
                    Ok(vec![1.0, 0.0])
                }
            })
        });
        let config = FaqConfig {
            backend: FaqBackend::Embedding,
            ..FaqConfig::default()
        };
        let index = FaqIndex::build(entries(), config, Some(embed)).await.unwrap();
        assert!(index.best_matches("boom", 1).await.is_err());
    }

    #[test]
    fn cosine_similarity_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_mismatched_lengths() {
        assert!(cosine_similarity(&[1.0], &[1.0, 0.0]).abs() < f32::EPSILON);
    }

    #[test]
    fn term_vector_skips_stopwords() {
        let tf = term_vector("What is the deadline for the application?");
        assert!(!tf.contains_key("the"));
        assert_eq!(tf.get("deadline"), Some(&1.0));
    }
}
