//! OpenRouter client: embeddings and chat completions.
//!
//! Thin reqwest wrapper over the OpenAI-compatible endpoints. Classifies
//! failures into [`ProviderError`] at the HTTP boundary; retry policy (the
//! single payment-required fallback) lives in the caller.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::types::ChatMessage;

pub const EMBEDDING_MODEL: &str = "text-embedding-3-small";
const PROVIDER_TIMEOUT: Duration = Duration::from_secs(60);

/// Classified failure of a single provider call.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Non-2xx response. `detail` carries the upstream body verbatim.
    #[error("provider returned HTTP {status}: {detail}")]
    Status { status: u16, detail: String },
    /// 2xx response missing the expected field.
    #[error("provider response missing expected field: {0}")]
    InvalidResponse(&'static str),
    /// Connection failure or timeout before a response arrived.
    #[error("provider request failed: {0}")]
    Transport(String),
}

impl ProviderError {
    pub fn is_payment_required(&self) -> bool {
        matches!(self, ProviderError::Status { status: 402, .. })
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Transport(format!("timed out after {}s", PROVIDER_TIMEOUT.as_secs()))
        } else {
            ProviderError::Transport(err.to_string())
        }
    }
}

#[derive(Clone)]
pub struct OpenRouterClient {
    base_url: String,
    api_key: String,
    client: Client,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Option<Vec<EmbeddingData>>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Option<Vec<f32>>,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Option<Vec<CompletionChoice>>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: Option<CompletionMessage>,
}

#[derive(Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

impl OpenRouterClient {
    pub fn new(base_url: &str, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client: Client::new(),
        }
    }

    /// Embed a single text. Fails when the call errors, times out, or the
    /// response lacks the vector field. No retries here.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let url = format!("{}/embeddings", self.base_url);
        let body = EmbeddingRequest {
            model: EMBEDDING_MODEL,
            input: text,
        };

        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .timeout(PROVIDER_TIMEOUT)
            .json(&body)
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let detail = res.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                detail,
            });
        }

        let payload: EmbeddingResponse = res
            .json()
            .await
            .map_err(|_| ProviderError::InvalidResponse("data[0].embedding"))?;

        payload
            .data
            .and_then(|mut data| data.drain(..).next())
            .and_then(|first| first.embedding)
            .filter(|emb| !emb.is_empty())
            .ok_or(ProviderError::InvalidResponse("data[0].embedding"))
    }

    /// Run a non-streaming chat completion and return the generated text.
    pub async fn chat(
        &self,
        model: &str,
        messages: &[ChatMessage],
    ) -> Result<String, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = CompletionRequest { model, messages };

        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .timeout(PROVIDER_TIMEOUT)
            .json(&body)
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let detail = res.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                detail,
            });
        }

        let payload: CompletionResponse = res
            .json()
            .await
            .map_err(|_| ProviderError::InvalidResponse("choices[0].message.content"))?;

        payload
            .choices
            .and_then(|mut choices| choices.drain(..).next())
            .and_then(|choice| choice.message)
            .and_then(|message| message.content)
            .filter(|content| !content.is_empty())
            .ok_or(ProviderError::InvalidResponse("choices[0].message.content"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn embed_returns_vector() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(json!({
                "model": EMBEDDING_MODEL,
                "input": "hello"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{ "embedding": [0.1, 0.2, 0.3] }]
            })))
            .mount(&server)
            .await;

        let client = OpenRouterClient::new(&server.uri(), "test-key");
        let emb = client.embed("hello").await.unwrap();
        assert_eq!(emb, vec![0.1, 0.2, 0.3]);
    }

    #[tokio::test]
    async fn embed_missing_vector_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
            .mount(&server)
            .await;

        let client = OpenRouterClient::new(&server.uri(), "test-key");
        let err = client.embed("hello").await.unwrap_err();
        assert!(matches!(err, ProviderError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn embed_non_2xx_carries_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let client = OpenRouterClient::new(&server.uri(), "test-key");
        match client.embed("hello").await.unwrap_err() {
            ProviderError::Status { status, detail } => {
                assert_eq!(status, 429);
                assert_eq!(detail, "rate limited");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn chat_returns_reply_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(json!({ "model": "openai/gpt-4o-mini" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "role": "assistant", "content": "olá" } }]
            })))
            .mount(&server)
            .await;

        let client = OpenRouterClient::new(&server.uri(), "test-key");
        let reply = client
            .chat("openai/gpt-4o-mini", &[ChatMessage::user("oi")])
            .await
            .unwrap();
        assert_eq!(reply, "olá");
    }

    #[tokio::test]
    async fn chat_missing_content_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
            .mount(&server)
            .await;

        let client = OpenRouterClient::new(&server.uri(), "test-key");
        let err = client
            .chat("openai/gpt-4o-mini", &[ChatMessage::user("oi")])
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidResponse(_)));
    }

    #[test]
    fn payment_required_detection() {
        let err = ProviderError::Status {
            status: 402,
            detail: String::new(),
        };
        assert!(err.is_payment_required());

        let err = ProviderError::Status {
            status: 500,
            detail: String::new(),
        };
        assert!(!err.is_payment_required());
    }
}
