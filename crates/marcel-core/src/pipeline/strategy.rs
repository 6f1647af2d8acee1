//! Decides whether an utterance needs document retrieval.

use std::time::Duration;

use marcel_llm::{ChatOptions, LlmProvider, Message};
use serde::Serialize;

use crate::config::ClassifierConfig;

/// Outcome of the retrieval classifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    RequiresRetrieval,
    NoRetrieval,
    /// Unparseable answer, request failure or timeout.
    Indeterminate,
}

#[must_use]
pub fn classifier_prompt(utterance: &str) -> String {
    format!(
        "Please determine if the following user utterance is a question. \
         Respond with 'YES' if it is a genuine question. \
         Respond with 'NO' if it is chit-chat or if the user asks the chatbot what kind of \
         information it could provide, unrelated to earlier conversation. \
         Only respond with the label YES or NO.\n\nMessage: {utterance}"
    )
}

/// Map the raw completion to a verdict. `YES` anywhere wins; otherwise a standalone
/// `NO` word means no retrieval.
#[must_use]
pub fn parse_verdict(content: &str) -> Verdict {
    let upper = content.trim().to_uppercase();
    if upper.is_empty() {
        return Verdict::Indeterminate;
    }
    if upper.contains("YES") {
        return Verdict::RequiresRetrieval;
    }
    if upper
        .split(|c: char| !c.is_alphanumeric())
        .any(|word| word == "NO")
    {
        return Verdict::NoRetrieval;
    }
    Verdict::Indeterminate
}

/// Ask the model whether `utterance` needs retrieval. Never fails: errors and timeouts
/// after `max_retries` retries come back as [`Verdict::Indeterminate`].
pub async fn classify<P: LlmProvider>(
    provider: &P,
    utterance: &str,
    config: &ClassifierConfig,
) -> Verdict {
    let messages = [Message::user(classifier_prompt(utterance))];
    let options = ChatOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
    };
    let timeout = Duration::from_millis(config.timeout_ms);

    for attempt in 0..=config.max_retries {
        match tokio::time::timeout(timeout, provider.chat_with_options(&messages, options)).await {
            Ok(Ok(content)) => {
                let verdict = parse_verdict(&content);
                tracing::debug!(?verdict, raw = %content.trim(), "classifier answered");
                return verdict;
            }
            Ok(Err(e)) => {
                tracing::debug!(attempt, provider = provider.name(), "classifier request failed: {e:#}");
            }
            Err(_) => {
                tracing::debug!(attempt, timeout_ms = config.timeout_ms, "classifier timed out");
            }
        }
    }

    Verdict::Indeterminate
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use marcel_llm::mock::MockProvider;
    use tracing::Level;
    use tracing_subscriber::Layer;
    use tracing_subscriber::layer::{Context, SubscriberExt};

    use super::*;

    /// Records the level of every event.
    #[derive(Clone, Default)]
    struct Levels(Arc<Mutex<Vec<Level>>>);

    impl<S: tracing::Subscriber> Layer<S> for Levels {
        fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
            self.0.lock().unwrap().push(*event.metadata().level());
        }
    }

    #[test]
    fn parse_yes_variants() {
        assert_eq!(parse_verdict("YES"), Verdict::RequiresRetrieval);
        assert_eq!(parse_verdict(" yes."), Verdict::RequiresRetrieval);
        assert_eq!(parse_verdict("Label: Yes"), Verdict::RequiresRetrieval);
    }

    #[test]
    fn parse_no_variants() {
        assert_eq!(parse_verdict("NO"), Verdict::NoRetrieval);
        assert_eq!(parse_verdict("no."), Verdict::NoRetrieval);
        assert_eq!(parse_verdict("'No'"), Verdict::NoRetrieval);
    }

    #[test]
    fn parse_other_is_indeterminate() {
        assert_eq!(parse_verdict(""), Verdict::Indeterminate);
        assert_eq!(parse_verdict("   "), Verdict::Indeterminate);
        assert_eq!(parse_verdict("maybe"), Verdict::Indeterminate);
        assert_eq!(parse_verdict("NOTHING"), Verdict::Indeterminate);
    }

    #[test]
    fn prompt_embeds_message() {
        let prompt = classifier_prompt("Thank you!");
        assert!(prompt.starts_with("Please determine if the following user utterance"));
        assert!(prompt.ends_with("\n\nMessage: Thank you!"));
    }

    #[tokio::test]
    async fn classify_uses_model_answer() {
        let mock = MockProvider::with_responses(vec!["NO".into()]);
        let verdict = classify(&mock, "Thank you!", &ClassifierConfig::default()).await;
        assert_eq!(verdict, Verdict::NoRetrieval);
        assert_eq!(mock.chat_calls(), 1);
    }

    #[tokio::test]
    async fn classify_retries_then_gives_up() {
        let mock = MockProvider::failing();
        let config = ClassifierConfig {
            max_retries: 2,
            ..ClassifierConfig::default()
        };
        let verdict = classify(&mock, "Who lives in Paris?", &config).await;
        assert_eq!(verdict, Verdict::Indeterminate);
        assert_eq!(mock.chat_calls(), 3);
    }

    #[tokio::test]
    async fn classify_timeout_is_indeterminate() {
        let mock = MockProvider::with_responses(vec!["YES".into()]).with_delay(200);
        let config = ClassifierConfig {
            max_retries: 0,
            timeout_ms: 20,
            ..ClassifierConfig::default()
        };
        let verdict = classify(&mock, "Who lives in Paris?", &config).await;
        assert_eq!(verdict, Verdict::Indeterminate);
    }

    #[tokio::test]
    async fn classify_empty_answer_is_indeterminate() {
        let mock = MockProvider::with_responses(vec![String::new()]);
        let verdict = classify(&mock, "hm", &ClassifierConfig::default()).await;
        assert_eq!(verdict, Verdict::Indeterminate);
    }

    #[tokio::test]
    async fn classify_failures_log_below_warn() {
        let levels = Levels::default();
        let _guard =
            tracing::subscriber::set_default(tracing_subscriber::registry().with(levels.clone()));

        let failing = MockProvider::failing();
        let config = ClassifierConfig {
            max_retries: 1,
            ..ClassifierConfig::default()
        };
        assert_eq!(classify(&failing, "hi", &config).await, Verdict::Indeterminate);

        let slow = MockProvider::with_responses(vec!["YES".into()]).with_delay(200);
        let config = ClassifierConfig {
            max_retries: 0,
            timeout_ms: 20,
            ..ClassifierConfig::default()
        };
        assert_eq!(classify(&slow, "hi", &config).await, Verdict::Indeterminate);

        let seen = levels.0.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert!(seen.iter().all(|level| *level == Level::DEBUG), "got: {seen:?}");
    }
}
