//! Answer post-processing: citation links and non-answer detection.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

static CITATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[.*?\]\[(\d+)\]").expect("citation regex is valid"));

static NON_ANSWER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(I (do not|don't) have (any )?(knowledge|information)|The text doesn't provide information|I do not have this information|the documents do not specify)",
    )
    .expect("non-answer regex is valid")
});

/// Labels cited in `text` that have a target in `links`, deduplicated, in order of
/// first occurrence.
#[must_use]
pub fn find_links(text: &str, links: &BTreeMap<u32, String>) -> Vec<u32> {
    let mut found = Vec::new();
    for caps in CITATION_RE.captures_iter(text) {
        let Ok(label) = caps[1].parse::<u32>() else {
            continue;
        };
        if links.contains_key(&label) && !found.contains(&label) {
            found.push(label);
        }
    }
    found
}

/// Reference block for `labels`, one `[n]: url` line each.
#[must_use]
pub fn format_links(labels: &[u32], links: &BTreeMap<u32, String>) -> String {
    labels
        .iter()
        .filter_map(|label| links.get(label).map(|url| format!("[{label}]: {url}")))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Append the reference block for the known labels cited in `text`.
///
/// Returns the formatted answer and the block alone (empty when nothing resolved). The
/// answer text itself is never altered; an answer that already ends with the block is
/// returned as is.
#[must_use]
pub fn format_known_links(text: &str, links: &BTreeMap<u32, String>) -> (String, String) {
    let body = text.trim();
    let labels = find_links(body, links);
    if labels.is_empty() {
        return (body.to_owned(), String::new());
    }
    let block = format_links(&labels, links);
    let already_formatted = body
        .strip_suffix(block.as_str())
        .is_some_and(|head| head.ends_with("\n\n"));
    if already_formatted {
        return (body.to_owned(), block);
    }
    (format!("{body}\n\n{block}"), block)
}

/// Whether `text` is a deflection rather than an answer. Only short replies qualify.
#[must_use]
pub fn detect_non_answer(text: &str, max_words: usize) -> bool {
    NON_ANSWER_RE.is_match(text) && text.split(' ').count() < max_words
}
