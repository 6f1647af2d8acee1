use std::fmt;
use std::path::PathBuf;

use marcel_evidence::{DomainMap, FaqConfig};
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub answer: AnswerConfig,
    #[serde(default)]
    pub assistant: AssistantConfig,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(skip)]
    pub secrets: ResolvedSecrets,
}

/// A secret string that never shows up in `Debug` or `Display` output.
#[derive(Clone)]
pub struct Secret(String);

impl Secret {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

#[derive(Debug, Default, Clone)]
pub struct ResolvedSecrets {
    pub llm_api_key: Option<Secret>,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}

fn default_model() -> String {
    "gpt-4o-mini".into()
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_llm_max_retries() -> u32 {
    2
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Upper bound for a whole request, streamed body included. 0 disables it.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Retries on HTTP 429.
    #[serde(default = "default_llm_max_retries")]
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            embedding_model: None,
            max_tokens: None,
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            max_retries: default_llm_max_retries(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_classifier_max_retries() -> u32 {
    1
}

fn default_classifier_timeout_ms() -> u64 {
    2000
}

fn default_classifier_max_tokens() -> u32 {
    5
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClassifierConfig {
    /// When disabled every query is retrieved for.
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_classifier_max_retries")]
    pub max_retries: u32,
    /// Per-attempt deadline.
    #[serde(default = "default_classifier_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_classifier_max_tokens")]
    pub max_tokens: u32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: default_classifier_max_retries(),
            timeout_ms: default_classifier_timeout_ms(),
            temperature: 0.0,
            max_tokens: default_classifier_max_tokens(),
        }
    }
}

fn default_lexical_top_k() -> usize {
    5
}

fn default_faq_top_k() -> usize {
    1
}

fn default_lexical_weight() -> f64 {
    1.0
}

fn default_faq_weight() -> f64 {
    2.0
}

fn default_max_evidence() -> usize {
    5
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_lexical_top_k")]
    pub lexical_top_k: usize,
    #[serde(default = "default_faq_top_k")]
    pub faq_top_k: usize,
    #[serde(default = "default_lexical_weight")]
    pub lexical_weight: f64,
    #[serde(default = "default_faq_weight")]
    pub faq_weight: f64,
    #[serde(default = "default_max_evidence")]
    pub max_evidence: usize,
    #[serde(default)]
    pub faq: FaqConfig,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            lexical_top_k: default_lexical_top_k(),
            faq_top_k: default_faq_top_k(),
            lexical_weight: default_lexical_weight(),
            faq_weight: default_faq_weight(),
            max_evidence: default_max_evidence(),
            faq: FaqConfig::default(),
        }
    }
}

fn default_non_answer_max_words() -> usize {
    30
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AnswerConfig {
    /// Answers with this many words or more are never flagged as non-answers.
    #[serde(default = "default_non_answer_max_words")]
    pub non_answer_max_words: usize,
}

impl Default for AnswerConfig {
    fn default() -> Self {
        Self {
            non_answer_max_words: default_non_answer_max_words(),
        }
    }
}

fn default_assistant_name() -> String {
    "Marcel".into()
}

fn default_institution() -> String {
    "Marburg University".into()
}

fn default_program() -> String {
    "MSc Data Science".into()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AssistantConfig {
    #[serde(default = "default_assistant_name")]
    pub name: String,
    #[serde(default = "default_institution")]
    pub institution: String,
    #[serde(default = "default_program")]
    pub program: String,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            name: default_assistant_name(),
            institution: default_institution(),
            program: default_program(),
        }
    }
}

fn default_documents_path() -> PathBuf {
    PathBuf::from("data/documents.jsonl")
}

fn default_faqs_path() -> Option<PathBuf> {
    Some(PathBuf::from("data/faqs.jsonl"))
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DataConfig {
    #[serde(default = "default_documents_path")]
    pub documents_path: PathBuf,
    #[serde(default = "default_faqs_path")]
    pub faqs_path: Option<PathBuf>,
    #[serde(default)]
    pub domain_map: DomainMap,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            documents_path: default_documents_path(),
            faqs_path: default_faqs_path(),
            domain_map: DomainMap::default(),
        }
    }
}
