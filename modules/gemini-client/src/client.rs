use std::time::Duration;

use tracing::debug;

use crate::error::{GeminiError, Result};
use crate::session::ChatSession;
use crate::types::{GenerateRequest, GenerateResponse, GenerationConfig};

const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: &str) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .expect("Failed to build HTTP client");
        Self {
            http,
            api_key: api_key.to_string(),
            base_url: GEMINI_API_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    /// Start a stateful chat session against `model`.
    pub fn chat(
        &self,
        model: &str,
        system_instruction: impl Into<String>,
        config: GenerationConfig,
    ) -> ChatSession {
        ChatSession::new(self.clone(), model, system_instruction.into(), config)
    }

    pub(crate) async fn generate(
        &self,
        model: &str,
        request: &GenerateRequest,
    ) -> Result<GenerateResponse> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, model, self.api_key
        );

        debug!(model, turns = request.contents.len(), "Gemini generate request");

        let response = self.http.post(&url).json(request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(GeminiError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json().await?)
    }
}
