//! Prompt assembly
//!
//! The model sees a system persona, a one-turn greeting example and a single
//! user message with three sections: retrieved context, the formatted
//! conversation so far and the question.

use crate::history::{ChatMessage, Role};
use crate::llm::PromptMessage;
use crate::retrieval::Document;

pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are a senior software engineer and technical lead helping a developer.
Think step by step about the question and the provided context before answering.

- Ground your answer in the questions and answers from the context when they are relevant.
- If the context is insufficient, say so and answer from general knowledge.
- If the question is unrelated to the context, ignore the context.
- Use the conversation history to resolve follow-up questions.
- Format tables as GitHub-flavored Markdown and put code in fenced blocks.
- When a diagram helps, emit a single ```mermaid block with alphanumeric node ids \
and quoted node labels, grouping related steps into subgraphs.

Answer in Markdown without HTML tags.";

const GREETING_EXAMPLE: (&str, &str) = ("hello there", "Hello there! How can I help you today?");

const BLOCK_SEPARATOR_WIDTH: usize = 50;

const NO_CONTEXT: &str = "No relevant context was found in the knowledge graph.";

/// Render documents as CONTENT / METADATA blocks
pub fn format_docs_with_metadata(docs: &[Document]) -> String {
    let separator = format!("\n\n{}\n\n", "=".repeat(BLOCK_SEPARATOR_WIDTH));
    docs.iter()
        .map(|doc| {
            let metadata = serde_json::to_string_pretty(&doc.metadata)
                .unwrap_or_else(|_| "{}".to_string());
            format!(
                "--------- CONTENT ---------\n{}\n--------- METADATA ---------\n{}",
                doc.text, metadata
            )
        })
        .collect::<Vec<_>>()
        .join(&separator)
}

/// One `User:` / `Assistant:` line per message
pub fn format_chat_history(history: &[ChatMessage]) -> String {
    history
        .iter()
        .map(|m| match m.role {
            Role::User => format!("User: {}", m.content),
            Role::Assistant => format!("Assistant: {}", m.content),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Full message list for one turn
pub fn build_messages(
    system_prompt: &str,
    question: &str,
    context: &[Document],
    history: &[ChatMessage],
) -> Vec<PromptMessage> {
    let context = if context.is_empty() {
        NO_CONTEXT.to_string()
    } else {
        format_docs_with_metadata(context)
    };
    let body = format!(
        "### CONTEXT:\n{}\n\n### CONVERSATION HISTORY:\n{}\n\n### QUESTION:\n{}\n",
        context,
        format_chat_history(history),
        question
    );

    vec![
        PromptMessage::system(system_prompt),
        PromptMessage::user(GREETING_EXAMPLE.0),
        PromptMessage::assistant(GREETING_EXAMPLE.1),
        PromptMessage::user(body),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::PromptRole;
    use serde_json::json;

    fn doc(text: &str, id: i64) -> Document {
        Document::new(text, json!({"id": id}).as_object().cloned().unwrap(), 0.9)
    }

    #[test]
    fn test_format_docs_with_metadata() {
        let text = format_docs_with_metadata(&[doc("first", 1), doc("second", 2)]);
        assert!(text.starts_with("--------- CONTENT ---------\nfirst\n--------- METADATA ---------\n{\n  \"id\": 1\n}"));
        assert_eq!(text.matches(&"=".repeat(50)).count(), 1);
        assert!(text.ends_with("{\n  \"id\": 2\n}"));
        assert_eq!(format_docs_with_metadata(&[]), "");
    }

    #[test]
    fn test_format_chat_history() {
        let history = vec![ChatMessage::user("hi"), ChatMessage::assistant("hello", None)];
        assert_eq!(format_chat_history(&history), "User: hi\nAssistant: hello");
        assert_eq!(format_chat_history(&[]), "");
    }

    #[test]
    fn test_build_messages_sections() {
        let messages = build_messages(
            DEFAULT_SYSTEM_PROMPT,
            "What is Flask?",
            &[doc("Flask is a micro framework", 1)],
            &[ChatMessage::user("earlier")],
        );
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, PromptRole::System);
        assert_eq!(messages[2].role, PromptRole::Assistant);

        let body = &messages[3].content;
        let context = body.find("### CONTEXT:").unwrap();
        let history = body.find("### CONVERSATION HISTORY:\nUser: earlier").unwrap();
        let question = body.find("### QUESTION:\nWhat is Flask?").unwrap();
        assert!(context < history && history < question);
    }

    #[test]
    fn test_empty_context_is_called_out() {
        let messages = build_messages("system", "Anything?", &[], &[]);
        assert!(messages[3].content.starts_with(&format!("### CONTEXT:\n{}\n", NO_CONTEXT)));
    }
}
