use std::time::Duration;

use anyhow::{anyhow, Result};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use tracing::debug;

use crate::schema::StructuredOutput;
use crate::types::{
    ChatMessage, ChatRequest, ChatResponse, JsonSchemaFormat, ResponseFormat, StructuredRequest,
};
use crate::util::strip_code_blocks;

const OPENAI_API_URL: &str = "https://api.openai.com/v1";

/// Chat-completion client. Holds a borrowed connection pool so every caller
/// in the process shares one set of sockets.
#[derive(Clone)]
pub struct LlmClient {
    api_key: String,
    model: String,
    http: reqwest::Client,
    base_url: String,
}

impl LlmClient {
    pub fn new(api_key: &str, model: &str, http: reqwest::Client) -> Self {
        Self {
            api_key: api_key.to_string(),
            model: model.to_string(),
            http,
            base_url: OPENAI_API_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.to_string();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.api_key))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    /// One chat-completion round trip. Returns the first choice's text.
    pub async fn complete(
        &self,
        system: &str,
        user: &str,
        temperature: f32,
        max_tokens: u32,
        timeout: Duration,
    ) -> Result<String> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage::system(system), ChatMessage::user(user)],
            temperature,
            max_tokens,
        };

        let url = format!("{}/chat/completions", self.base_url);

        debug!(model = %request.model, "chat completion request");

        let response = self
            .http
            .post(&url)
            .headers(self.headers()?)
            .timeout(timeout)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            return Err(anyhow!("LLM API error ({}): {}", status, error_text));
        }

        let chat_response: ChatResponse = response.json().await?;

        chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| anyhow!("No content in LLM response"))
    }

    /// Chat completion forced through the type's strict schema via
    /// `response_format`, then decoded. Fenced ```json blocks around the
    /// payload are tolerated and stripped before parsing.
    pub async fn extract<T: StructuredOutput>(
        &self,
        system: &str,
        user: &str,
        timeout: Duration,
    ) -> Result<T> {
        let request = StructuredRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage::system(system), ChatMessage::user(user)],
            temperature: if self.model.starts_with("gpt-5") {
                None
            } else {
                Some(0.0)
            },
            response_format: ResponseFormat {
                format_type: "json_schema".to_string(),
                json_schema: JsonSchemaFormat {
                    name: "structured_response".to_string(),
                    strict: true,
                    schema: T::strict_schema(),
                },
            },
        };

        let url = format!("{}/chat/completions", self.base_url);

        debug!(model = %request.model, response_type = %T::type_name(), "structured request");

        let response = self
            .http
            .post(&url)
            .headers(self.headers()?)
            .timeout(timeout)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            return Err(anyhow!("LLM API error ({}): {}", status, error_text));
        }

        let chat_response: ChatResponse = response.json().await?;

        let text = chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| anyhow!("No content in LLM response"))?;

        let stripped = strip_code_blocks(&text);
        serde_json::from_str(stripped)
            .map_err(|e| anyhow!("LLM returned invalid JSON: {e}; body: {stripped}"))
    }
}
