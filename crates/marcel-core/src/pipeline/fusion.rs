//! Merges lexical and FAQ results into one normalized evidence list.

use std::collections::HashMap;

use marcel_evidence::links::normalize_links;
use marcel_evidence::{EvidenceSource, Fingerprint, RetrievalResult};

use crate::config::RetrievalConfig;

/// Both branch outputs plus the fused evidence, kept for debug snapshots.
#[derive(Debug, Default)]
pub struct Retrieval {
    pub lexical: Vec<RetrievalResult>,
    pub faq: Vec<RetrievalResult>,
    pub errors: Vec<String>,
    pub evidence: Vec<RetrievalResult>,
}

/// Run both retrieval branches concurrently and fuse them. A failing branch counts as
/// empty; if both fail the evidence is empty.
pub async fn retrieve<S: EvidenceSource>(
    source: &S,
    query: &str,
    config: &RetrievalConfig,
) -> Retrieval {
    let (lexical, faq) = tokio::join!(
        source.lexical_search(query, config.lexical_top_k),
        source.faq_search(query, config.faq_top_k),
    );

    let mut errors = Vec::new();
    let mut failed = 0;
    let lexical = lexical.unwrap_or_else(|e| {
        tracing::warn!(branch = "lexical", "retrieval branch failed: {e:#}");
        errors.push(format!("lexical: {e}"));
        failed += 1;
        Vec::new()
    });
    let faq = faq.unwrap_or_else(|e| {
        tracing::warn!(branch = "faq", "retrieval branch failed: {e:#}");
        errors.push(format!("faq: {e}"));
        failed += 1;
        Vec::new()
    });
    if failed == 2 {
        tracing::warn!("all retrieval branches failed, answering without evidence");
    }

    let fused = fuse(&lexical, &faq, config);
    let evidence = normalize_links(fused, source.domain_map());
    tracing::debug!(
        lexical = lexical.len(),
        faq = faq.len(),
        evidence = evidence.len(),
        "retrieval fused"
    );

    Retrieval {
        lexical,
        faq,
        errors,
        evidence,
    }
}

/// Weight, deduplicate by fingerprint and rank.
///
/// FAQ results come first so that on equal scores they rank ahead of lexical ones. A
/// duplicate keeps the position of its first occurrence and the highest weighted score.
#[must_use]
pub fn fuse(
    lexical: &[RetrievalResult],
    faq: &[RetrievalResult],
    config: &RetrievalConfig,
) -> Vec<RetrievalResult> {
    let weighted = faq
        .iter()
        .map(|r| (r, config.faq_weight))
        .chain(lexical.iter().map(|r| (r, config.lexical_weight)));

    let mut fused: Vec<RetrievalResult> = Vec::new();
    let mut positions: HashMap<Fingerprint, usize> = HashMap::new();

    for (result, weight) in weighted {
        let score = result.relevance_score * weight;
        if let Some(&pos) = positions.get(result.fingerprint()) {
            if score > fused[pos].relevance_score {
                fused[pos] = RetrievalResult {
                    relevance_score: score,
                    ..result.clone()
                };
            }
            continue;
        }
        positions.insert(result.fingerprint().clone(), fused.len());
        fused.push(RetrievalResult {
            relevance_score: score,
            ..result.clone()
        });
    }

    fused.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));
    fused.truncate(config.max_evidence);
    fused
}
