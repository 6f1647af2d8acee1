use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use url::Url;

/// Domain equivalences: each key is an alias host that is rewritten to its canonical
/// value. Subdomains of an alias are rewritten too.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DomainMap(BTreeMap<String, String>);

impl Default for DomainMap {
    fn default() -> Self {
        Self(BTreeMap::from([(
            "studierendenwerk-marburg.de".to_owned(),
            "studentenwerk-marburg.de".to_owned(),
        )]))
    }
}

impl DomainMap {
    #[must_use]
    pub fn empty() -> Self {
        Self(BTreeMap::new())
    }

    fn canonical_host(&self, host: &str) -> Option<String> {
        let host = host.to_ascii_lowercase();
        self.0.iter().find_map(|(alias, canonical)| {
            if host == *alias {
                Some(canonical.clone())
            } else {
                host.strip_suffix(alias.as_str())
                    .filter(|prefix| prefix.ends_with('.'))
                    .map(|prefix| format!("{prefix}{canonical}"))
            }
        })
    }

    /// Rewrite `url` to its canonical domain. Unparseable URLs and URLs on unmapped
    /// hosts come back unchanged.
    #[must_use]
    pub fn canonicalize(&self, url: &str) -> String {
        let Ok(mut parsed) = Url::parse(url) else {
            return url.to_owned();
        };
        let Some(canonical) = parsed.host_str().and_then(|h| self.canonical_host(h)) else {
            return url.to_owned();
        };
        if parsed.set_host(Some(&canonical)).is_err() {
            tracing::debug!(url, canonical, "cannot rewrite host");
            return url.to_owned();
        }
        parsed.into()
    }
}
