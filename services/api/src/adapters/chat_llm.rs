//! services/api/src/adapters/chat_llm.rs
//!
//! This module contains the adapter for the advisor chat LLM.
//! It implements the `AdvisorChat` port from the `core` crate.

const SYSTEM_INSTRUCTIONS: &str = r#"You are an experienced small-business coach helping an owner understand their own company.

The context you receive contains excerpts of documents the owner uploaded (pitch decks, plans, financial notes). Use it as your primary source.

Style:
- Be direct and practical. Recommend concrete next steps when the question invites it.
- Keep answers to a few short paragraphs unless the owner asks for detail.
- If the documents do not contain what is needed, say so plainly and answer from general business knowledge, marking it as such.
- Never invent figures that are not in the documents."#;

const USER_INPUT_TEMPLATE: &str = r#"DOCUMENTS:
---
{context}
---

QUESTION:
{question}"#;

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use coaching_core::domain::{ChatRole, ChatTurn};
use coaching_core::ports::{AdvisorChat, PortError, PortResult};
use tracing::debug;

/// Only the most recent turns are replayed to the model.
const MAX_HISTORY_TURNS: usize = 10;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `AdvisorChat` using an OpenAI-compatible LLM.
#[derive(Clone)]
pub struct OpenAiChatAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiChatAdapter {
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }

    fn build_messages(
        question: &str,
        context: &str,
        history: &[ChatTurn],
    ) -> PortResult<Vec<ChatCompletionRequestMessage>> {
        let mut messages = vec![ChatCompletionRequestSystemMessageArgs::default()
            .content(SYSTEM_INSTRUCTIONS)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?
            .into()];

        let skip = history.len().saturating_sub(MAX_HISTORY_TURNS);
        for turn in &history[skip..] {
            let message: ChatCompletionRequestMessage = match turn.role {
                ChatRole::User => ChatCompletionRequestUserMessageArgs::default()
                    .content(turn.content.clone())
                    .build()
                    .map_err(|e| PortError::Unexpected(e.to_string()))?
                    .into(),
                ChatRole::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                    .content(turn.content.clone())
                    .build()
                    .map_err(|e| PortError::Unexpected(e.to_string()))?
                    .into(),
            };
            messages.push(message);
        }

        let user_input = USER_INPUT_TEMPLATE
            .replace("{context}", context)
            .replace("{question}", question);
        messages.push(
            ChatCompletionRequestUserMessageArgs::default()
                .content(user_input)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
        );
        Ok(messages)
    }
}

//=========================================================================================
// `AdvisorChat` Trait Implementation
//=========================================================================================

#[async_trait]
impl AdvisorChat for OpenAiChatAdapter {
    async fn answer(
        &self,
        question: &str,
        context: &str,
        history: &[ChatTurn],
    ) -> PortResult<String> {
        debug!(question_chars = question.len(), context_chars = context.len(), turns = history.len(), "Advisor chat request");
        let messages = Self::build_messages(question, context, history)?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .n(1)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e: OpenAIError| PortError::Unexpected(e.to_string()))?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .ok_or_else(|| PortError::Unexpected("Advisor chat LLM returned no answer.".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_is_capped_and_question_comes_last() {
        let history: Vec<ChatTurn> = (0..15)
            .map(|i| ChatTurn {
                role: if i % 2 == 0 { ChatRole::User } else { ChatRole::Assistant },
                content: format!("turn {}", i),
            })
            .collect();
        let messages = OpenAiChatAdapter::build_messages("What next?", "deck", &history).unwrap();
        // system + capped history + question
        assert_eq!(messages.len(), 1 + MAX_HISTORY_TURNS + 1);
        assert!(matches!(messages.last(), Some(ChatCompletionRequestMessage::User(_))));
    }
}
