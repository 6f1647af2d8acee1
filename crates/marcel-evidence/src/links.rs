//! Reference-link normalization across an evidence set.
//!
//! Documents cite with `[text][n]` markers resolved through their own `links` map, so
//! two documents can both use label 1 for different targets. Before evidence is shown to
//! the model the labels are made unique across the set and every target is rewritten to
//! its canonical domain, so citations in the answer resolve against one merged map.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, LazyLock};

use regex::{Captures, Regex};

use crate::domain::DomainMap;
use crate::types::{Document, RetrievalResult};

static MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\[\]]*)\]\[(\d+)\]").expect("marker regex is valid"));

/// Canonicalize link targets and renumber labels so each label is unique across
/// `evidence`. A label keeps its number unless an earlier document already claimed it;
/// a target already labelled earlier reuses that label. Markers in the content follow
/// the new labels. Order and scores are untouched.
#[must_use]
pub fn normalize_links(evidence: Vec<RetrievalResult>, domains: &DomainMap) -> Vec<RetrievalResult> {
    let mut next_free = evidence
        .iter()
        .filter_map(|r| r.document.links.keys().max().copied())
        .max()
        .unwrap_or(0)
        + 1;
    let mut claimed: BTreeMap<u32, String> = BTreeMap::new();
    let mut by_target: HashMap<String, u32> = HashMap::new();

    evidence
        .into_iter()
        .map(|result| {
            if result.document.links.is_empty() {
                return result;
            }

            let mut relabel: HashMap<u32, u32> = HashMap::new();
            let mut links = BTreeMap::new();
            for (&label, target) in &result.document.links {
                let target = domains.canonicalize(target);
                let new_label = if let Some(&existing) = by_target.get(&target) {
                    existing
                } else {
                    let label = if claimed.contains_key(&label) {
                        let fresh = next_free;
                        next_free += 1;
                        fresh
                    } else {
                        label
                    };
                    claimed.insert(label, target.clone());
                    by_target.insert(target.clone(), label);
                    label
                };
                relabel.insert(label, new_label);
                links.insert(new_label, target);
            }

            let content = rewrite_markers(&result.document.content, &relabel);
            if content == result.document.content && links == result.document.links {
                return result;
            }

            let document = Document {
                content,
                links,
                ..(*result.document).clone()
            };
            RetrievalResult {
                document: Arc::new(document),
                ..result
            }
        })
        .collect()
}

fn rewrite_markers(content: &str, relabel: &HashMap<u32, u32>) -> String {
    MARKER_RE
        .replace_all(content, |caps: &Captures<'_>| {
            let mapped = caps[2]
                .parse::<u32>()
                .ok()
                .and_then(|old| relabel.get(&old));
            match mapped {
                Some(new) => format!("[{}][{new}]", &caps[1]),
                None => caps[0].to_owned(),
            }
        })
        .into_owned()
}

/// Union of the link maps of `evidence`. After [`normalize_links`] labels do not
/// collide; otherwise the first document to use a label wins.
#[must_use]
pub fn merged_links(evidence: &[RetrievalResult]) -> BTreeMap<u32, String> {
    let mut merged = BTreeMap::new();
    for result in evidence {
        for (label, target) in &result.document.links {
            merged.entry(*label).or_insert_with(|| target.clone());
        }
    }
    merged
}
