//! JSON Lines corpus loading for documents and FAQs.

use std::collections::BTreeMap;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::error::{EvidenceError, Result};
use crate::types::{Document, FaqRecord, Fingerprint};

static LINK_DEF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*\[(\d+)\]:\s*(\S+)\s*$").expect("link definition regex is valid")
});

#[derive(Deserialize)]
struct RawDocument {
    url: String,
    content: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    favicon: String,
    #[serde(default)]
    fingerprint: Option<String>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    og: BTreeMap<String, serde_json::Value>,
}

impl From<RawDocument> for Document {
    fn from(raw: RawDocument) -> Self {
        let title = if raw.title.trim().is_empty() {
            raw.og
                .get("og:title")
                .and_then(serde_json::Value::as_str)
                .unwrap_or_default()
                .to_owned()
        } else {
            raw.title
        };
        let (content, links) = extract_links(&raw.content);
        let fingerprint = raw
            .fingerprint
            .filter(|fp| !fp.is_empty())
            .map_or_else(|| Fingerprint::compute(&raw.url, &title, &raw.content), Fingerprint::new);
        let id = raw.id.unwrap_or_else(|| fingerprint.to_string());

        Self {
            id,
            content,
            title,
            url: raw.url,
            favicon: raw.favicon,
            fingerprint,
            links,
        }
    }
}

/// Split trailing `[n]: url` reference definitions off `content`.
///
/// Only the trailing block is considered; definitions followed by prose stay in place.
#[must_use]
pub fn extract_links(content: &str) -> (String, BTreeMap<u32, String>) {
    let lines: Vec<&str> = content.lines().collect();
    let mut links = BTreeMap::new();
    let mut body_end = lines.len();

    for (idx, line) in lines.iter().enumerate().rev() {
        if line.trim().is_empty() {
            body_end = idx;
            continue;
        }
        let Some(caps) = LINK_DEF_RE.captures(line) else {
            break;
        };
        let Ok(label) = caps[1].parse::<u32>() else {
            break;
        };
        links.entry(label).or_insert_with(|| caps[2].to_owned());
        body_end = idx;
    }

    if links.is_empty() {
        return (content.to_owned(), links);
    }
    let body = lines[..body_end].join("\n").trim_end().to_owned();
    (body, links)
}

fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let file = std::fs::File::open(path).map_err(|source| EvidenceError::Io {
        path: path.to_owned(),
        source,
    })?;
    parse_jsonl(BufReader::new(file), path)
}

fn parse_jsonl<T: DeserializeOwned>(reader: impl BufRead, path: &Path) -> Result<Vec<T>> {
    let mut records = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line.map_err(|source| EvidenceError::Io {
            path: path.to_owned(),
            source,
        })?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line).map_err(|source| EvidenceError::Parse {
            path: path.to_owned(),
            line: idx + 1,
            source,
        })?;
        records.push(record);
    }
    Ok(records)
}

/// Load documents from a JSON Lines file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or a line is not a valid document.
pub fn load_documents(path: &Path) -> Result<Vec<Document>> {
    let raw: Vec<RawDocument> = read_jsonl(path)?;
    let documents: Vec<Document> = raw.into_iter().map(Document::from).collect();
    tracing::info!(path = %path.display(), count = documents.len(), "documents loaded");
    Ok(documents)
}

/// Load FAQ records from a JSON Lines file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or a line is not a valid FAQ record.
pub fn load_faqs(path: &Path) -> Result<Vec<FaqRecord>> {
    let faqs: Vec<FaqRecord> = read_jsonl(path)?;
    tracing::info!(path = %path.display(), count = faqs.len(), "faqs loaded");
    Ok(faqs)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn extract_trailing_definitions() {
        let content = "Apply [online][1] or by [mail][2].\n\n[1]: https://a\n[2]: https://b\n";
        let (body, links) = extract_links(content);
        assert_eq!(body, "Apply [online][1] or by [mail][2].");
        assert_eq!(links.len(), 2);
        assert_eq!(links[&1], "https://a");
        assert_eq!(links[&2], "https://b");
    }

    #[test]
    fn definitions_followed_by_prose_are_kept() {
        let content = "[1]: https://a\nMore text.";
        let (body, links) = extract_links(content);
        assert_eq!(body, content);
        assert!(links.is_empty());
    }

    #[test]
    fn content_without_links_is_unchanged() {
        let (body, links) = extract_links("Jean lives in Paris.");
        assert_eq!(body, "Jean lives in Paris.");
        assert!(links.is_empty());
    }

    #[test]
    fn load_documents_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{"url":"https://a","content":"Jean lives in Paris.\n\n[1]: https://b","og":{{"og:title":"People"}}}}"#
        )
        .unwrap();
        writeln!(file).unwrap();
        writeln!(
            file,
            r#"{{"url":"https://c","content":"x","title":"T","fingerprint":"abc","id":"7","favicon":"f.ico"}}"#
        )
        .unwrap();

        let docs = load_documents(file.path()).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].title, "People");
        assert_eq!(docs[0].content, "Jean lives in Paris.");
        assert_eq!(docs[0].links[&1], "https://b");
        assert_eq!(docs[0].id, docs[0].fingerprint.as_str());
        assert_eq!(docs[1].fingerprint, Fingerprint::new("abc"));
        assert_eq!(docs[1].id, "7");
        assert_eq!(docs[1].favicon, "f.ico");
    }

    #[test]
    fn malformed_line_reports_position() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"question":"ok","sources":[]}}"#).unwrap();
        writeln!(file, "not json").unwrap();

        let err = load_faqs(file.path()).unwrap_err();
        match err {
            EvidenceError::Parse { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_documents(Path::new("/nonexistent/docs.jsonl")).unwrap_err();
        assert!(matches!(err, EvidenceError::Io { .. }));
    }
}
