//! Message assembly for both answer strategies.

use std::fmt::Write as _;

use marcel_evidence::RetrievalResult;
use marcel_llm::Message;

use crate::config::AssistantConfig;
use crate::pipeline::{AnswerStrategy, ConversationTurn};

/// Instructions for grounded answers.
#[must_use]
pub fn system_prompt_rag(assistant: &AssistantConfig) -> String {
    format!(
        "You are a helpful and engaging chatbot called {name}. If someone asks you, your name \
         is {name} and you are employed at the {institution}. You answer questions of \
         students around their studies. Please answer the questions based on the provided \
         documents only. Ignore your own knowledge. Don't say that you are looking at a set \
         of documents. If you cannot find the answer to a given question in the documents you \
         must apologize and say that you don't have any information about the topic (e.g., \
         \"Unfortunately, I do not have any knowledge about <rephrase the question>\").",
        name = assistant.name,
        institution = assistant.institution,
    )
}

/// Persona instructions for conversational turns without retrieval.
#[must_use]
pub fn system_prompt_general(assistant: &AssistantConfig) -> String {
    format!(
        "You are a helpful and engaging chatbot called {name}. Your name is {name} and you are \
         employed at the {institution}. You help students with questions regarding admission \
         and enrolment to the {program} Program. Only engage in topics related to admission \
         and enrolment. Do not engage in other discussions.",
        name = assistant.name,
        institution = assistant.institution,
        program = assistant.program,
    )
}

/// User turn carrying the evidence and the question. Content newlines are written as the
/// two characters `\n` so each document stays one block.
#[must_use]
pub fn documents_prompt(query: &str, evidence: &[RetrievalResult]) -> String {
    let mut out = String::from("Given these documents, answer the question.\n\n## Documents\n");
    for result in evidence {
        let doc = &result.document;
        let _ = write!(
            out,
            "### {}\n{}\n\n",
            doc.title,
            doc.content.replace('\n', "\\n")
        );
    }
    let _ = write!(out, "\n## Question\n{query}");
    out
}

/// Full message list for the generation call.
#[must_use]
pub fn build_messages(
    strategy: AnswerStrategy,
    query: &str,
    history: &[ConversationTurn],
    evidence: &[RetrievalResult],
    assistant: &AssistantConfig,
) -> Vec<Message> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    let (system, user) = match strategy {
        AnswerStrategy::Retrieve => (
            system_prompt_rag(assistant),
            documents_prompt(query, evidence),
        ),
        AnswerStrategy::GenerateWithHistory => (system_prompt_general(assistant), query.to_owned()),
    };
    messages.push(Message::system(system));
    messages.extend(history.iter().map(ConversationTurn::to_message));
    messages.push(Message::user(user));
    messages
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use marcel_evidence::{Document, Origin};
    use marcel_llm::Role;

    use super::*;

    fn evidence() -> Vec<RetrievalResult> {
        vec![RetrievalResult {
            document: Arc::new(Document::new("https://a", "People", "Jean lives\nin Paris.")),
            relevance_score: 1.0,
            origin: Origin::Lexical,
        }]
    }

    #[test]
    fn documents_prompt_layout() {
        let prompt = documents_prompt("Who lives in Paris?", &evidence());
        assert_eq!(
            prompt,
            "Given these documents, answer the question.\n\n## Documents\n\
             ### People\nJean lives\\nin Paris.\n\n\n## Question\nWho lives in Paris?"
        );
    }

    #[test]
    fn retrieve_messages_wrap_history() {
        let history = vec![
            ConversationTurn::user("Hi"),
            ConversationTurn::assistant("Hello! How can I help?"),
        ];
        let messages = build_messages(
            AnswerStrategy::Retrieve,
            "Who lives in Paris?",
            &history,
            &evidence(),
            &AssistantConfig::default(),
        );
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, Role::System);
        assert!(messages[0].content.contains("based on the provided documents only"));
        assert_eq!(messages[1].role, Role::User);
        assert_eq!(messages[2].role, Role::Assistant);
        assert!(messages[3].content.contains("### People"));
        assert!(messages[3].content.ends_with("## Question\nWho lives in Paris?"));
    }

    #[test]
    fn general_messages_pass_query_verbatim() {
        let messages = build_messages(
            AnswerStrategy::GenerateWithHistory,
            "Thank you!",
            &[],
            &[],
            &AssistantConfig::default(),
        );
        assert_eq!(messages.len(), 2);
        assert!(messages[0].content.contains("MSc Data Science Program"));
        assert_eq!(messages[1].content, "Thank you!");
    }

    #[test]
    fn persona_is_configurable() {
        let assistant = AssistantConfig {
            name: "Ada".into(),
            institution: "Example University".into(),
            program: "MSc Physics".into(),
        };
        let prompt = system_prompt_general(&assistant);
        assert!(prompt.contains("called Ada"));
        assert!(prompt.contains("Example University"));
        assert!(prompt.contains("MSc Physics Program"));
        assert!(system_prompt_rag(&assistant).contains("Unfortunately, I do not have any knowledge"));
    }
}
