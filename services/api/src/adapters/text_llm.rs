//! services/api/src/adapters/text_llm.rs
//!
//! This module contains the adapter for the story-writing LLM.
//! It implements the `TextGenerationService` port from the `core` crate using
//! any OpenAI-compatible chat completions endpoint with structured output.

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs, ResponseFormat, ResponseFormatJsonSchema,
    },
    Client,
};
use async_trait::async_trait;
use storybook_core::ports::{OutputSchema, PortError, PortResult, TextGenerationService};
use tracing::{info, warn};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `TextGenerationService` using an OpenAI-compatible LLM.
#[derive(Clone)]
pub struct OpenAiTextAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiTextAdapter {
    /// Creates a new `OpenAiTextAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }
}

//=========================================================================================
// `TextGenerationService` Trait Implementation
//=========================================================================================

#[async_trait]
impl TextGenerationService for OpenAiTextAdapter {
    async fn generate_structured(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        schema: &OutputSchema,
    ) -> PortResult<Option<serde_json::Value>> {
        let messages = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(system_prompt)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(user_prompt)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .n(1)
            .response_format(ResponseFormat::JsonSchema {
                json_schema: ResponseFormatJsonSchema {
                    description: None,
                    name: schema.name.clone(),
                    schema: Some(schema.schema.clone()),
                    strict: None,
                },
            })
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        info!(
            "Calling text model {} (system prompt {} chars, user prompt {} chars)",
            self.model,
            system_prompt.len(),
            user_prompt.len()
        );

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(classify_error)?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content);
        let Some(content) = content else {
            warn!("Text model {} returned no content.", self.model);
            return Ok(None);
        };

        let record = parse_record(&content);
        match &record {
            Some(_) => info!("Text model {} returned a structured record.", self.model),
            None => warn!(
                "Text model {} returned content that is not a JSON object ({} chars).",
                self.model,
                content.len()
            ),
        }
        Ok(record)
    }
}

//=========================================================================================
// Helpers
//=========================================================================================

/// Parses the model output as a JSON object, tolerating a Markdown code fence.
fn parse_record(content: &str) -> Option<serde_json::Value> {
    let trimmed = content.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.trim_end().strip_suffix("```"))
        .unwrap_or(trimmed);

    match serde_json::from_str::<serde_json::Value>(unfenced.trim()) {
        Ok(value) if value.is_object() => Some(value),
        _ => None,
    }
}

/// Maps client failures onto the retryable / non-retryable split of the port.
fn classify_error(e: OpenAIError) -> PortError {
    match e {
        e @ OpenAIError::Reqwest(..) => {
            PortError::Transient(format!("Text model request failed: {}", e))
        }
        OpenAIError::ApiError(api) => {
            let kind = api.r#type.clone().unwrap_or_default();
            let code = api.code.clone().unwrap_or_default();
            if is_transient_api_error(&kind, &code, &api.message) {
                PortError::Transient(format!("Text model unavailable: {}", api.message))
            } else {
                PortError::Fatal(format!("Text model rejected the request: {}", api.message))
            }
        }
        e @ OpenAIError::JSONDeserialize(..) => {
            PortError::Fatal(format!("Text model response could not be decoded: {}", e))
        }
        other => PortError::Unexpected(other.to_string()),
    }
}

fn is_transient_api_error(kind: &str, code: &str, message: &str) -> bool {
    const MARKERS: [&str; 6] = [
        "rate_limit",
        "resource_exhausted",
        "unavailable",
        "overloaded",
        "server_error",
        "internal",
    ];
    let haystack = format!("{} {} {}", kind, code, message).to_ascii_lowercase();
    MARKERS.iter().any(|marker| haystack.contains(marker))
        || ["429", "500", "502", "503", "504"]
            .iter()
            .any(|status| code == *status)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_json_objects() {
        let value = parse_record(r#"{"title": "Luna"}"#).unwrap();
        assert_eq!(value["title"], "Luna");
    }

    #[test]
    fn parses_fenced_json_objects() {
        let value = parse_record("```json\n{\"title\": \"Luna\"}\n```").unwrap();
        assert_eq!(value["title"], "Luna");
        let value = parse_record("```\n{\"title\": \"Hoot\"}\n```\n").unwrap();
        assert_eq!(value["title"], "Hoot");
    }

    #[test]
    fn rejects_non_objects_and_prose() {
        assert!(parse_record("Once upon a time").is_none());
        assert!(parse_record("[1, 2, 3]").is_none());
        assert!(parse_record("").is_none());
    }

    #[test]
    fn rate_limits_and_outages_are_transient() {
        assert!(is_transient_api_error("", "429", "Too many requests"));
        assert!(is_transient_api_error("RESOURCE_EXHAUSTED", "", "quota"));
        assert!(is_transient_api_error("", "", "The model is overloaded."));
        assert!(!is_transient_api_error(
            "invalid_request_error",
            "400",
            "Invalid schema"
        ));
    }
}
