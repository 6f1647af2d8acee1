use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum EvidenceError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}:{line}: invalid record: {source}")]
    Parse {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("LLM error: {0}")]
    Llm(#[from] marcel_llm::LlmError),

    #[error("embedding FAQ backend requires an embedder")]
    MissingEmbedder,

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, EvidenceError>;
