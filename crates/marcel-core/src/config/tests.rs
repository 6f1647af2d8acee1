use std::io::Write;
use std::path::Path;

use marcel_evidence::FaqBackend;
use serial_test::serial;

use super::*;

const ENV_KEYS: [&str; 20] = [
    "MARCEL_LLM_BASE_URL",
    "MARCEL_LLM_MODEL",
    "MARCEL_LLM_EMBEDDING_MODEL",
    "MARCEL_LLM_MAX_TOKENS",
    "MARCEL_LLM_REQUEST_TIMEOUT_SECS",
    "MARCEL_LLM_API_KEY",
    "MARCEL_CLASSIFIER_ENABLED",
    "MARCEL_CLASSIFIER_TIMEOUT_MS",
    "MARCEL_CLASSIFIER_MAX_RETRIES",
    "MARCEL_RETRIEVAL_LEXICAL_TOP_K",
    "MARCEL_RETRIEVAL_FAQ_WEIGHT",
    "MARCEL_RETRIEVAL_MAX_EVIDENCE",
    "MARCEL_FAQ_BACKEND",
    "MARCEL_FAQ_MIN_SIMILARITY",
    "MARCEL_ANSWER_NON_ANSWER_MAX_WORDS",
    "MARCEL_ASSISTANT_NAME",
    "MARCEL_DATA_DOCUMENTS_PATH",
    "MARCEL_DATA_FAQS_PATH",
    "MARCEL_CONFIG",
    "RUST_LOG",
];

fn clear_env() {
    for key in ENV_KEYS {
        unsafe { std::env::remove_var(key) };
    }
}

fn write_config(dir: &tempfile::TempDir, body: &str) -> std::path::PathBuf {
    let path = dir.path().join("config.toml");
    let mut f = std::fs::File::create(&path).unwrap();
    write!(f, "{body}").unwrap();
    path
}

#[test]
fn defaults_match_documented_values() {
    let config = Config::default();
    assert_eq!(config.llm.base_url, "https://api.openai.com/v1");
    assert!(config.llm.embedding_model.is_none());
    assert!(config.classifier.enabled);
    assert_eq!(config.classifier.max_retries, 1);
    assert_eq!(config.classifier.timeout_ms, 2000);
    assert_eq!(config.classifier.max_tokens, 5);
    assert!(config.classifier.temperature.abs() < f32::EPSILON);
    assert_eq!(config.retrieval.lexical_top_k, 5);
    assert_eq!(config.retrieval.faq_top_k, 1);
    assert!((config.retrieval.faq_weight - 2.0).abs() < f64::EPSILON);
    assert!((config.retrieval.lexical_weight - 1.0).abs() < f64::EPSILON);
    assert_eq!(config.retrieval.max_evidence, 5);
    assert_eq!(config.retrieval.faq.backend, FaqBackend::Lexical);
    assert_eq!(config.answer.non_answer_max_words, 30);
    assert_eq!(config.assistant.name, "Marcel");
    assert_eq!(config.assistant.institution, "Marburg University");
    assert!(config.secrets.llm_api_key.is_none());
    assert!(config.validate().is_ok());
}

#[test]
#[serial]
fn missing_file_falls_back_to_defaults() {
    clear_env();
    let config = Config::load(Path::new("/nonexistent/marcel.toml")).unwrap();
    assert_eq!(config.llm.model, "gpt-4o-mini");
    assert_eq!(config.retrieval.max_evidence, 5);
}

#[test]
#[serial]
fn shipped_default_config_matches_defaults() {
    clear_env();
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config/default.toml");
    let config = Config::load(&path).unwrap();
    let defaults = Config::default();
    assert_eq!(config.llm.model, defaults.llm.model);
    assert_eq!(config.classifier.timeout_ms, defaults.classifier.timeout_ms);
    assert_eq!(config.retrieval.max_evidence, defaults.retrieval.max_evidence);
    assert_eq!(config.retrieval.faq.backend, defaults.retrieval.faq.backend);
    assert_eq!(config.data.faqs_path, defaults.data.faqs_path);
    assert_eq!(
        config.data.domain_map.canonicalize("https://www.studierendenwerk-marburg.de/"),
        "https://www.studentenwerk-marburg.de/"
    );
}

#[test]
#[serial]
fn parse_partial_toml() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        &dir,
        r#"
[llm]
base_url = "http://localhost:8000/v1"
model = "local-model"

[retrieval]
faq_weight = 3.0

[retrieval.faq]
min_similarity = 0.6

[data]
documents_path = "corpus/docs.jsonl"

[data.domain_map]
"old-host.de" = "new-host.de"
"#,
    );

    clear_env();
    let config = Config::load(&path).unwrap();
    assert_eq!(config.llm.base_url, "http://localhost:8000/v1");
    assert_eq!(config.llm.model, "local-model");
    assert!((config.retrieval.faq_weight - 3.0).abs() < f64::EPSILON);
    assert_eq!(config.retrieval.lexical_top_k, 5);
    assert!((config.retrieval.faq.min_similarity - 0.6).abs() < f64::EPSILON);
    assert_eq!(config.data.documents_path, Path::new("corpus/docs.jsonl"));
    assert_eq!(
        config.data.domain_map.canonicalize("https://old-host.de/x"),
        "https://new-host.de/x"
    );
    assert_eq!(config.classifier.timeout_ms, 2000);
}

#[test]
#[serial]
fn invalid_toml_is_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, "[llm\nmodel = ");
    clear_env();
    assert!(Config::load(&path).is_err());
}

#[test]
#[serial]
fn env_overrides_apply() {
    clear_env();
    unsafe {
        std::env::set_var("MARCEL_LLM_MODEL", "env-model");
        std::env::set_var("MARCEL_LLM_API_KEY", "sk-env");
        std::env::set_var("MARCEL_CLASSIFIER_ENABLED", "false");
        std::env::set_var("MARCEL_RETRIEVAL_MAX_EVIDENCE", "3");
        std::env::set_var("MARCEL_DATA_FAQS_PATH", "");
    }

    let config = Config::load(Path::new("/nonexistent/marcel.toml")).unwrap();
    clear_env();

    assert_eq!(config.llm.model, "env-model");
    assert_eq!(config.secrets.llm_api_key.as_ref().unwrap().expose(), "sk-env");
    assert!(!config.classifier.enabled);
    assert_eq!(config.retrieval.max_evidence, 3);
    assert!(config.data.faqs_path.is_none());
}

#[test]
#[serial]
fn invalid_env_values_are_ignored() {
    clear_env();
    unsafe {
        std::env::set_var("MARCEL_CLASSIFIER_TIMEOUT_MS", "soon");
        std::env::set_var("MARCEL_FAQ_BACKEND", "telepathy");
    }

    let config = Config::load(Path::new("/nonexistent/marcel.toml")).unwrap();
    clear_env();

    assert_eq!(config.classifier.timeout_ms, 2000);
    assert_eq!(config.retrieval.faq.backend, FaqBackend::Lexical);
}

#[test]
#[serial]
fn embedding_backend_without_model_fails_validation() {
    clear_env();
    unsafe {
        std::env::set_var("MARCEL_FAQ_BACKEND", "embedding");
    }
    let result = Config::load(Path::new("/nonexistent/marcel.toml"));
    clear_env();

    let err = result.unwrap_err();
    assert!(err.to_string().contains("embedding_model"));
}

#[test]
fn validate_rejects_bad_values() {
    let mut config = Config::default();
    config.retrieval.max_evidence = 0;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.retrieval.faq_weight = -1.0;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.retrieval.faq.min_similarity = 1.5;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.classifier.timeout_ms = 0;
    assert!(config.validate().is_err());
}

#[test]
fn secret_is_redacted() {
    let secret = Secret::new("sk-very-secret");
    assert_eq!(format!("{secret:?}"), "[REDACTED]");
    assert_eq!(format!("{secret}"), "[REDACTED]");
    assert_eq!(secret.expose(), "sk-very-secret");
}
