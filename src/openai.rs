// OpenAI API client: chat completions (blocking and streaming) and embeddings

use futures::stream::{Stream, StreamExt};
use std::sync::Arc;

use crate::error::ApiError;
use crate::http_client::UpstreamClient;
use crate::models::openai::{
    ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse, ChatMessage,
    EmbeddingsRequest, EmbeddingsResponse,
};
use crate::sse::{SseParser, DONE_SENTINEL};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Client for the OpenAI REST API
#[derive(Clone)]
pub struct OpenAiClient {
    http: Arc<UpstreamClient>,
    api_key: String,
    base_url: String,
}

impl OpenAiClient {
    pub fn new(http: Arc<UpstreamClient>, api_key: String) -> Self {
        Self {
            http,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Override the base URL (used by tests against a mock server)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn auth_header(&self) -> String {
        format!("Bearer {}", self.api_key)
    }

    /// Run a non-streaming chat completion and return the assistant content
    pub async fn chat_completion(
        &self,
        model: &str,
        messages: Vec<ChatMessage>,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, ApiError> {
        let payload = ChatCompletionRequest {
            model: model.to_string(),
            messages,
            temperature,
            max_tokens,
            stream: false,
        };

        let req = self
            .http
            .client()
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", self.auth_header())
            .json(&payload)
            .build()
            .map_err(|e| ApiError::Internal(anyhow::anyhow!("Failed to build request: {}", e)))?;

        let response = self.http.request_with_retry(req).await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ApiError::OpenAiError {
                status: status.as_u16(),
                message,
            });
        }

        let completion: ChatCompletionResponse = response.json().await.map_err(|e| {
            ApiError::UpstreamError(format!("Invalid chat completion response: {}", e))
        })?;

        completion
            .content()
            .map(|s| s.to_string())
            .ok_or_else(|| ApiError::UpstreamError("Chat completion returned no choices".into()))
    }

    /// Run a streaming chat completion, yielding content deltas as they arrive.
    ///
    /// Malformed chunks are skipped with a warning rather than terminating the
    /// stream; the stream ends at the `[DONE]` sentinel or upstream EOF.
    pub async fn chat_completion_stream(
        &self,
        model: &str,
        messages: Vec<ChatMessage>,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<impl Stream<Item = Result<String, ApiError>>, ApiError> {
        let payload = ChatCompletionRequest {
            model: model.to_string(),
            messages,
            temperature,
            max_tokens,
            stream: true,
        };

        let req = self
            .http
            .client()
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", self.auth_header())
            .json(&payload)
            .build()
            .map_err(|e| ApiError::Internal(anyhow::anyhow!("Failed to build request: {}", e)))?;

        let response = self.http.request_with_retry(req).await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ApiError::OpenAiError {
                status: status.as_u16(),
                message,
            });
        }

        let mut bytes = response.bytes_stream();

        let stream = async_stream::stream! {
            let mut parser = SseParser::new();

            'outer: while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        yield Err(ApiError::UpstreamError(format!("Stream read error: {}", e)));
                        break;
                    }
                };

                for payload in parser.feed(&chunk) {
                    if payload == DONE_SENTINEL {
                        break 'outer;
                    }
                    match serde_json::from_str::<ChatCompletionChunk>(&payload) {
                        Ok(parsed) => {
                            if let Some(content) = parsed.delta_content() {
                                yield Ok(content.to_string());
                            }
                        }
                        Err(e) => {
                            tracing::warn!("Error processing chunk: {}", e);
                        }
                    }
                }
            }
        };

        Ok(stream)
    }

    /// Generate embeddings for a batch of texts, returned in input order
    pub async fn embed(&self, model: &str, texts: Vec<String>) -> Result<Vec<Vec<f32>>, ApiError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let count = texts.len();
        let payload = EmbeddingsRequest {
            model: model.to_string(),
            input: texts,
        };

        let req = self
            .http
            .client()
            .post(format!("{}/embeddings", self.base_url))
            .header("Authorization", self.auth_header())
            .json(&payload)
            .build()
            .map_err(|e| ApiError::Internal(anyhow::anyhow!("Failed to build request: {}", e)))?;

        let response = self.http.request_with_retry(req).await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ApiError::OpenAiError {
                status: status.as_u16(),
                message,
            });
        }

        let mut parsed: EmbeddingsResponse = response
            .json()
            .await
            .map_err(|e| ApiError::UpstreamError(format!("Invalid embeddings response: {}", e)))?;

        if parsed.data.len() != count {
            return Err(ApiError::UpstreamError(format!(
                "Embeddings response size mismatch: expected {}, got {}",
                count,
                parsed.data.len()
            )));
        }

        // The API documents input order but also tags each item with an index
        parsed.data.sort_by_key(|d| d.index);
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}
