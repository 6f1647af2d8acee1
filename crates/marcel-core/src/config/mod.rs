mod env;
mod types;

#[cfg(test)]
mod tests;

pub use types::*;

use std::path::Path;

use anyhow::{Context, bail};
use marcel_evidence::FaqBackend;

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed, or if the
    /// resulting configuration is invalid.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str::<Self>(&content).context("failed to parse config file")?
        } else {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            Self::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the pipeline cannot run with.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first offending setting.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.llm.base_url.trim().is_empty() {
            bail!("llm.base_url must not be empty");
        }
        if self.llm.model.trim().is_empty() {
            bail!("llm.model must not be empty");
        }
        if self.classifier.timeout_ms == 0 {
            bail!("classifier.timeout_ms must be greater than 0");
        }
        if self.classifier.max_tokens == 0 {
            bail!("classifier.max_tokens must be greater than 0");
        }
        if self.retrieval.max_evidence == 0 {
            bail!("retrieval.max_evidence must be greater than 0");
        }
        for (name, weight) in [
            ("retrieval.lexical_weight", self.retrieval.lexical_weight),
            ("retrieval.faq_weight", self.retrieval.faq_weight),
            ("retrieval.faq.faq_score", self.retrieval.faq.faq_score),
        ] {
            if !weight.is_finite() || weight < 0.0 {
                bail!("{name} must be a non-negative number, got {weight}");
            }
        }
        let min_similarity = self.retrieval.faq.min_similarity;
        if !(0.0..=1.0).contains(&min_similarity) {
            bail!("retrieval.faq.min_similarity must be within [0, 1], got {min_similarity}");
        }
        if self.retrieval.faq.backend == FaqBackend::Embedding && self.llm.embedding_model.is_none()
        {
            bail!("retrieval.faq.backend = \"embedding\" requires llm.embedding_model");
        }
        Ok(())
    }
}
