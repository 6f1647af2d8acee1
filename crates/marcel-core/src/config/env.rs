use std::path::PathBuf;
use std::str::FromStr;

use super::{Config, Secret};

fn parse_env<T: FromStr>(key: &str) -> Option<T> {
    let v = std::env::var(key).ok()?;
    if let Ok(parsed) = v.trim().parse::<T>() {
        Some(parsed)
    } else {
        tracing::warn!("ignoring invalid {key} value: {v}");
        None
    }
}

impl Config {
    pub(crate) fn apply_env_overrides(&mut self) {
        self.apply_env_overrides_llm();
        self.apply_env_overrides_pipeline();
    }

    fn apply_env_overrides_llm(&mut self) {
        if let Ok(v) = std::env::var("MARCEL_LLM_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Ok(v) = std::env::var("MARCEL_LLM_MODEL") {
            self.llm.model = v;
        }
        if let Ok(v) = std::env::var("MARCEL_LLM_EMBEDDING_MODEL") {
            self.llm.embedding_model = Some(v).filter(|m| !m.is_empty());
        }
        if let Some(n) = parse_env::<u32>("MARCEL_LLM_MAX_TOKENS") {
            self.llm.max_tokens = Some(n);
        }
        if let Some(secs) = parse_env::<u64>("MARCEL_LLM_REQUEST_TIMEOUT_SECS") {
            self.llm.request_timeout_secs = secs;
        }
        if let Ok(v) = std::env::var("MARCEL_LLM_API_KEY")
            && !v.is_empty()
        {
            self.secrets.llm_api_key = Some(Secret::new(v));
        }
    }

    fn apply_env_overrides_pipeline(&mut self) {
        if let Some(enabled) = parse_env::<bool>("MARCEL_CLASSIFIER_ENABLED") {
            self.classifier.enabled = enabled;
        }
        if let Some(ms) = parse_env::<u64>("MARCEL_CLASSIFIER_TIMEOUT_MS") {
            self.classifier.timeout_ms = ms;
        }
        if let Some(n) = parse_env::<u32>("MARCEL_CLASSIFIER_MAX_RETRIES") {
            self.classifier.max_retries = n;
        }
        if let Some(k) = parse_env::<usize>("MARCEL_RETRIEVAL_LEXICAL_TOP_K") {
            self.retrieval.lexical_top_k = k;
        }
        if let Some(w) = parse_env::<f64>("MARCEL_RETRIEVAL_FAQ_WEIGHT") {
            self.retrieval.faq_weight = w;
        }
        if let Some(n) = parse_env::<usize>("MARCEL_RETRIEVAL_MAX_EVIDENCE") {
            self.retrieval.max_evidence = n;
        }
        if let Ok(v) = std::env::var("MARCEL_FAQ_BACKEND") {
            if let Ok(backend) = serde_json::from_value(serde_json::Value::String(v.clone())) {
                self.retrieval.faq.backend = backend;
            } else {
                tracing::warn!("ignoring invalid MARCEL_FAQ_BACKEND value: {v}");
            }
        }
        if let Some(s) = parse_env::<f64>("MARCEL_FAQ_MIN_SIMILARITY") {
            self.retrieval.faq.min_similarity = s;
        }
        if let Some(n) = parse_env::<usize>("MARCEL_ANSWER_NON_ANSWER_MAX_WORDS") {
            self.answer.non_answer_max_words = n;
        }
        if let Ok(v) = std::env::var("MARCEL_ASSISTANT_NAME") {
            self.assistant.name = v;
        }
        if let Ok(v) = std::env::var("MARCEL_DATA_DOCUMENTS_PATH") {
            self.data.documents_path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("MARCEL_DATA_FAQS_PATH") {
            self.data.faqs_path = Some(v).filter(|p| !p.is_empty()).map(PathBuf::from);
        }
    }
}
