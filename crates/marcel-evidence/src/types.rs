use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Stable content hash identifying a document across rebuilds.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// BLAKE3 hex digest over url, title and content.
    #[must_use]
    pub fn compute(url: &str, title: &str, content: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(url.as_bytes());
        hasher.update(&[0]);
        hasher.update(title.as_bytes());
        hasher.update(&[0]);
        hasher.update(content.as_bytes());
        Self(hasher.finalize().to_hex().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A unit of retrievable text. `links` holds the reference-style link targets used by
/// the `[text][n]` markers inside `content`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub content: String,
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub favicon: String,
    pub fingerprint: Fingerprint,
    #[serde(default)]
    pub links: BTreeMap<u32, String>,
}

impl Document {
    /// Build a document, computing its fingerprint and using it as the id.
    #[must_use]
    pub fn new(url: impl Into<String>, title: impl Into<String>, content: impl Into<String>) -> Self {
        let url = url.into();
        let title = title.into();
        let content = content.into();
        let fingerprint = Fingerprint::compute(&url, &title, &content);
        Self {
            id: fingerprint.to_string(),
            content,
            title,
            url,
            favicon: String::new(),
            fingerprint,
            links: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_links(mut self, links: BTreeMap<u32, String>) -> Self {
        self.links = links;
        self
    }

    #[must_use]
    pub fn with_favicon(mut self, favicon: impl Into<String>) -> Self {
        self.favicon = favicon.into();
        self
    }
}

/// FAQ record as stored on disk: `sources` may hold document URLs or fingerprints.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaqRecord {
    pub question: String,
    #[serde(default)]
    pub sources: Vec<String>,
}

impl FaqRecord {
    #[must_use]
    pub fn new(question: impl Into<String>, sources: Vec<String>) -> Self {
        Self {
            question: question.into(),
            sources,
        }
    }
}

/// A curated question resolved against the document set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FaqEntry {
    pub question: String,
    pub linked_document_fingerprints: BTreeSet<Fingerprint>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Lexical,
    Faq,
}

#[derive(Clone, Debug)]
pub struct RetrievalResult {
    pub document: Arc<Document>,
    pub relevance_score: f64,
    pub origin: Origin,
}

impl RetrievalResult {
    #[must_use]
    pub fn fingerprint(&self) -> &Fingerprint {
        &self.document.fingerprint
    }
}
