//! BM25 ranking over the document corpus.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use regex::Regex;

use crate::types::{Document, Origin, RetrievalResult};

const K1: f64 = 1.5;
const B: f64 = 0.75;

static TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\w\w+").expect("token regex is valid"));

/// Lowercased word tokens of at least two characters.
#[must_use]
pub fn tokenize(text: &str) -> Vec<String> {
    TOKEN_RE
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

/// Inverted index with BM25 scoring. Built once, read-only afterwards.
#[derive(Debug, Default)]
pub struct LexicalIndex {
    documents: Vec<Arc<Document>>,
    postings: HashMap<String, Vec<(usize, u32)>>,
    doc_lens: Vec<usize>,
    avg_doc_len: f64,
}

impl LexicalIndex {
    /// Index title and content of every document.
    #[must_use]
    pub fn build(documents: &[Arc<Document>]) -> Self {
        let mut postings: HashMap<String, Vec<(usize, u32)>> = HashMap::new();
        let mut doc_lens = Vec::with_capacity(documents.len());

        for (idx, doc) in documents.iter().enumerate() {
            let tokens = tokenize(&format!("{}\n{}", doc.title, doc.content));
            doc_lens.push(tokens.len());

            let mut freqs: HashMap<String, u32> = HashMap::new();
            for token in tokens {
                *freqs.entry(token).or_default() += 1;
            }
            for (term, tf) in freqs {
                postings.entry(term).or_default().push((idx, tf));
            }
        }

        #[allow(clippy::cast_precision_loss)]
        let avg_doc_len = if doc_lens.is_empty() {
            0.0
        } else {
            (doc_lens.iter().sum::<usize>() as f64 / doc_lens.len() as f64).max(1.0)
        };

        tracing::debug!(
            documents = documents.len(),
            terms = postings.len(),
            avg_doc_len,
            "lexical index built"
        );

        Self {
            documents: documents.to_vec(),
            postings,
            doc_lens,
            avg_doc_len,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Rank documents against `query`, returning at most `top_k` results.
    ///
    /// Scores are divided by the best score so the top result is exactly 1.0. Documents
    /// sharing no term with the query are never returned.
    #[must_use]
    pub fn search(&self, query: &str, top_k: usize) -> Vec<RetrievalResult> {
        if top_k == 0 || self.documents.is_empty() {
            return Vec::new();
        }

        #[allow(clippy::cast_precision_loss)]
        let n = self.documents.len() as f64;
        let mut scores: HashMap<usize, f64> = HashMap::new();

        for term in tokenize(query) {
            let Some(posting) = self.postings.get(&term) else {
                continue;
            };
            #[allow(clippy::cast_precision_loss)]
            let df = posting.len() as f64;
            let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();
            for &(idx, tf) in posting {
                #[allow(clippy::cast_precision_loss)]
                let dl = self.doc_lens[idx] as f64;
                let tf = f64::from(tf);
                let norm = tf + K1 * (1.0 - B + B * dl / self.avg_doc_len);
                *scores.entry(idx).or_default() += idf * tf * (K1 + 1.0) / norm;
            }
        }

        let mut ranked: Vec<(usize, f64)> = scores.into_iter().filter(|(_, s)| *s > 0.0).collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        ranked.truncate(top_k);

        let Some(&(_, best)) = ranked.first() else {
            return Vec::new();
        };

        ranked
            .into_iter()
            .map(|(idx, score)| RetrievalResult {
                document: Arc::clone(&self.documents[idx]),
                relevance_score: score / best,
                origin: Origin::Lexical,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn corpus() -> Vec<Arc<Document>> {
        vec![
            Arc::new(Document::new("https://a", "Residents", "Jean lives in Paris.")),
            Arc::new(Document::new("https://b", "Residents", "Anna lives in Berlin.")),
            Arc::new(Document::new(
                "https://c",
                "Admission",
                "The application deadline for the MSc Data Science is 15 July.",
            )),
        ]
    }

    #[test]
    fn tokenize_drops_single_chars_and_lowercases() {
        assert_eq!(tokenize("A Big-Deal, x y OK!"), vec!["big", "deal", "ok"]);
    }

    #[test]
    fn search_ranks_matching_document_first() {
        let index = LexicalIndex::build(&corpus());
        let results = index.search("Who lives in Paris?", 3);
        assert!(!results.is_empty());
        assert_eq!(results[0].document.url, "https://a");
        assert!((results[0].relevance_score - 1.0).abs() < f64::EPSILON);
        assert!(results.iter().all(|r| r.origin == Origin::Lexical));
    }

    #[test]
    fn search_excludes_documents_without_shared_terms() {
        let index = LexicalIndex::build(&corpus());
        let results = index.search("deadline", 5);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].document.url, "https://c");
    }

    #[test]
    fn blank_and_unknown_queries_return_empty() {
        let index = LexicalIndex::build(&corpus());
        assert!(index.search("", 5).is_empty());
        assert!(index.search("   ", 5).is_empty());
        assert!(index.search("zzzz qqqq", 5).is_empty());
    }

    #[test]
    fn top_k_limits_results() {
        let index = LexicalIndex::build(&corpus());
        assert_eq!(index.search("lives", 1).len(), 1);
        assert!(index.search("lives", 0).is_empty());
    }

    #[test]
    fn empty_index_returns_empty() {
        let index = LexicalIndex::build(&[]);
        assert!(index.is_empty());
        assert!(index.search("anything", 3).is_empty());
    }

    proptest! {
        #[test]
        fn scores_are_in_unit_range_and_sorted(query in "[a-zA-Z ]{0,40}") {
            let index = LexicalIndex::build(&corpus());
            let results = index.search(&query, 5);
            for pair in results.windows(2) {
                prop_assert!(pair[0].relevance_score >= pair[1].relevance_score);
            }
            for r in &results {
                prop_assert!(r.relevance_score > 0.0 && r.relevance_score <= 1.0);
            }
            if let Some(first) = results.first() {
                prop_assert!((first.relevance_score - 1.0).abs() < 1e-12);
            }
        }
    }
}
