//! Evidence store: the document corpus, its lexical index, the FAQ matcher and the
//! link normalization applied to retrieved evidence.

pub mod domain;
pub mod error;
pub mod faq;
pub mod lexical;
pub mod links;
pub mod loader;
pub mod store;
pub mod types;

pub use domain::DomainMap;
pub use error::EvidenceError;
pub use faq::{FaqBackend, FaqConfig};
pub use store::{EmbedFn, EvidenceSource, EvidenceStore, faq_embedder};
pub use types::{Document, FaqEntry, FaqRecord, Fingerprint, Origin, RetrievalResult};
