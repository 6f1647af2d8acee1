use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::Arc;

use marcel_llm::LlmProvider;
use marcel_llm::provider::{EmbedFuture, embed_fn};

use crate::domain::DomainMap;
use crate::error::{EvidenceError, Result};
use crate::faq::{FaqBackend, FaqConfig, FaqIndex};
use crate::lexical::LexicalIndex;
use crate::types::{Document, FaqEntry, FaqRecord, Fingerprint, Origin, RetrievalResult};

/// Shared embed function for the FAQ embedding backend.
pub type EmbedFn = Arc<dyn Fn(&str) -> EmbedFuture + Send + Sync>;

/// Embed function the FAQ `backend` needs from `provider`, `None` for the lexical backend.
///
/// # Errors
///
/// Returns [`EvidenceError::MissingEmbedder`] if the embedding backend is selected and
/// `provider` cannot embed.
pub fn faq_embedder<P>(provider: &Arc<P>, backend: FaqBackend) -> Result<Option<EmbedFn>>
where
    P: LlmProvider + 'static,
{
    match backend {
        FaqBackend::Lexical => Ok(None),
        FaqBackend::Embedding if provider.supports_embeddings() => {
            let embed: EmbedFn = Arc::new(embed_fn(Arc::clone(provider)));
            Ok(Some(embed))
        }
        FaqBackend::Embedding => Err(EvidenceError::MissingEmbedder),
    }
}

/// Read-only retrieval capability the pipeline runs against.
pub trait EvidenceSource: Send + Sync {
    /// Lexically ranked documents, scores rescaled to `(0, 1]`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing index cannot be queried.
    fn lexical_search(
        &self,
        query: &str,
        top_k: usize,
    ) -> impl Future<Output = Result<Vec<RetrievalResult>>> + Send;

    /// Parent documents of the closest FAQ questions, if any clears the threshold.
    ///
    /// # Errors
    ///
    /// Returns an error if the query cannot be matched (e.g. the embedding call fails).
    fn faq_search(
        &self,
        query: &str,
        top_k: usize,
    ) -> impl Future<Output = Result<Vec<RetrievalResult>>> + Send;

    fn domain_map(&self) -> &DomainMap;
}

/// In-memory corpus with a BM25 index and an FAQ index, built once per process.
#[derive(Debug)]
pub struct EvidenceStore {
    documents: HashMap<Fingerprint, Arc<Document>>,
    lexical: LexicalIndex,
    faq: FaqIndex,
    domains: DomainMap,
}

impl EvidenceStore {
    /// Index `documents` and resolve `faqs` against them.
    ///
    /// Documents with a duplicate fingerprint are dropped. FAQ sources may name a
    /// document URL or fingerprint; an FAQ with no resolvable source is skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the FAQ index cannot be built.
    pub async fn build(
        documents: Vec<Document>,
        faqs: Vec<FaqRecord>,
        faq_config: FaqConfig,
        domains: DomainMap,
        embedder: Option<EmbedFn>,
    ) -> Result<Self> {
        let mut ordered = Vec::with_capacity(documents.len());
        let mut by_fingerprint = HashMap::with_capacity(documents.len());
        let mut by_url: HashMap<String, Fingerprint> = HashMap::new();

        for doc in documents {
            if by_fingerprint.contains_key(&doc.fingerprint) {
                tracing::warn!(fingerprint = %doc.fingerprint, url = %doc.url, "duplicate document skipped");
                continue;
            }
            by_url
                .entry(doc.url.trim_end_matches('/').to_owned())
                .or_insert_with(|| doc.fingerprint.clone());
            let doc = Arc::new(doc);
            by_fingerprint.insert(doc.fingerprint.clone(), Arc::clone(&doc));
            ordered.push(doc);
        }

        let entries: Vec<FaqEntry> = faqs
            .into_iter()
            .filter_map(|record| {
                let linked: BTreeSet<Fingerprint> = record
                    .sources
                    .iter()
                    .filter_map(|source| {
                        let fp = Fingerprint::new(source.as_str());
                        if by_fingerprint.contains_key(&fp) {
                            Some(fp)
                        } else {
                            by_url.get(source.trim_end_matches('/')).cloned()
                        }
                    })
                    .collect();
                if linked.is_empty() {
                    tracing::warn!(question = %record.question, "no parent for faq");
                    return None;
                }
                Some(FaqEntry {
                    question: record.question,
                    linked_document_fingerprints: linked,
                })
            })
            .collect();

        let lexical = LexicalIndex::build(&ordered);
        let faq = FaqIndex::build(entries, faq_config, embedder).await?;

        tracing::info!(
            documents = by_fingerprint.len(),
            faqs = faq.len(),
            "evidence store ready"
        );

        Ok(Self {
            documents: by_fingerprint,
            lexical,
            faq,
            domains,
        })
    }

    #[must_use]
    pub fn document_count(&self) -> usize {
        self.documents.len()
    }

    #[must_use]
    pub fn faq_count(&self) -> usize {
        self.faq.len()
    }
}

impl EvidenceSource for EvidenceStore {
    async fn lexical_search(&self, query: &str, top_k: usize) -> Result<Vec<RetrievalResult>> {
        Ok(self.lexical.search(query, top_k))
    }

    async fn faq_search(&self, query: &str, top_k: usize) -> Result<Vec<RetrievalResult>> {
        let matches = self.faq.best_matches(query, top_k).await?;
        let score = self.faq.config().faq_score;

        let mut seen = BTreeSet::new();
        let mut results = Vec::new();
        for (entry, similarity) in matches {
            tracing::debug!(question = %entry.question, similarity, "faq matched");
            for fp in &entry.linked_document_fingerprints {
                if !seen.insert(fp.clone()) {
                    continue;
                }
                if let Some(doc) = self.documents.get(fp) {
                    results.push(RetrievalResult {
                        document: Arc::clone(doc),
                        relevance_score: score,
                        origin: Origin::Faq,
                    });
                }
            }
        }
        Ok(results)
    }

    fn domain_map(&self) -> &DomainMap {
        &self.domains
    }
}
