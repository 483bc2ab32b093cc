use tracing::debug;

use crate::client::GeminiClient;
use crate::error::{GeminiError, Result};
use crate::types::{Content, GenerateRequest, GenerationConfig};

/// Reply from one chat turn, with token accounting for cost tracking.
#[derive(Debug, Clone)]
pub struct Reply {
    pub text: String,
    pub prompt_tokens: u64,
    pub output_tokens: u64,
}

/// A running conversation: every `send` includes the full prior history, so
/// the model can correlate across turns (e.g. assign the same incident id to
/// articles about one story).
pub struct ChatSession {
    client: GeminiClient,
    model: String,
    system_instruction: String,
    config: GenerationConfig,
    history: Vec<Content>,
}

impl ChatSession {
    pub(crate) fn new(
        client: GeminiClient,
        model: &str,
        system_instruction: String,
        config: GenerationConfig,
    ) -> Self {
        Self {
            client,
            model: model.to_string(),
            system_instruction,
            config,
            history: Vec::new(),
        }
    }

    /// Send one user message and append both it and the model reply to the
    /// session history.
    pub async fn send(&mut self, text: impl Into<String>) -> Result<Reply> {
        self.history.push(Content::user(text));

        let request = GenerateRequest {
            system_instruction: Some(Content::system(self.system_instruction.clone())),
            contents: self.history.clone(),
            generation_config: Some(self.config.clone()),
        };

        let response = self.client.generate(&self.model, &request).await?;

        let candidate = response
            .candidates
            .into_iter()
            .next()
            .ok_or(GeminiError::EmptyResponse)?;
        let text = candidate.content.text();
        self.history.push(Content::model(text.clone()));

        let usage = response.usage_metadata.unwrap_or_default();
        debug!(
            model = %self.model,
            prompt_tokens = usage.prompt_token_count,
            output_tokens = usage.candidates_token_count,
            "Chat turn complete"
        );

        Ok(Reply {
            text,
            prompt_tokens: usage.prompt_token_count,
            output_tokens: usage.candidates_token_count,
        })
    }

    /// Number of turns (user + model messages) accumulated so far.
    pub fn history_len(&self) -> usize {
        self.history.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn session_accumulates_history_across_turns() {
        let mut server = mockito::Server::new_async().await;
        let body = r#"{
            "candidates": [{"content": {"role": "model", "parts": [{"text": "fine"}]}}],
            "usageMetadata": {"promptTokenCount": 10, "candidatesTokenCount": 2}
        }"#;
        let mock = server
            .mock("POST", "/models/test-model:generateContent")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body)
            .expect(2)
            .create_async()
            .await;

        let client = GeminiClient::new("test-key").with_base_url(&server.url());
        let mut session = client.chat("test-model", "system prompt", GenerationConfig::text());

        let reply = session.send("first").await.unwrap();
        assert_eq!(reply.text, "fine");
        assert_eq!(reply.prompt_tokens, 10);
        assert_eq!(session.history_len(), 2);

        session.send("second").await.unwrap();
        assert_eq!(session.history_len(), 4);

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn api_errors_surface_status_and_message() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/models/test-model:generateContent")
            .match_query(mockito::Matcher::Any)
            .with_status(429)
            .with_body("quota exceeded")
            .create_async()
            .await;

        let client = GeminiClient::new("test-key").with_base_url(&server.url());
        let mut session = client.chat("test-model", "system prompt", GenerationConfig::text());

        match session.send("hello").await {
            Err(GeminiError::Api { status, message }) => {
                assert_eq!(status, 429);
                assert_eq!(message, "quota exceeded");
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }
}
