// SPDX-FileCopyrightText: 2026 memlayer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for OpenAI-compatible APIs.
//!
//! Provides [`OpenAiClient`] which handles authentication and JSON request
//! construction for the embeddings and chat completions endpoints. Every
//! call is a single attempt; the memory layer decides what may be retried.

use std::time::Duration;

use memlayer_core::MemlayerError;
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::types::{
    ApiErrorResponse, ChatRequest, ChatResponse, EmbeddingRequest, EmbeddingResponse,
};

/// HTTP client for OpenAI-compatible API communication.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    client: reqwest::Client,
    base_url: String,
}

impl OpenAiClient {
    /// Creates a client for the API rooted at `base_url`
    /// (e.g. `https://api.openai.com/v1`).
    pub fn new(api_key: &str, base_url: &str) -> Result<Self, MemlayerError> {
        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {api_key}"))
            .map_err(|e| MemlayerError::Config(format!("invalid API key header value: {e}")))?;
        headers.insert("authorization", bearer);
        headers.insert("content-type", HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| MemlayerError::Provider {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Sends a `POST /embeddings` request.
    pub async fn embeddings(
        &self,
        request: &EmbeddingRequest,
    ) -> Result<EmbeddingResponse, MemlayerError> {
        self.post("embeddings", request).await
    }

    /// Sends a non-streaming `POST /chat/completions` request.
    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, MemlayerError> {
        self.post("chat/completions", request).await
    }

    async fn post<Req, Resp>(&self, endpoint: &str, body: &Req) -> Result<Resp, MemlayerError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let url = format!("{}/{endpoint}", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| MemlayerError::Provider {
                message: format!("HTTP request failed: {e}"),
                source: Some(Box::new(e)),
            })?;

        let status = response.status();
        debug!(status = %status, endpoint, "response received");

        if status.is_success() {
            let text = response.text().await.map_err(|e| MemlayerError::Provider {
                message: format!("failed to read response body: {e}"),
                source: Some(Box::new(e)),
            })?;
            return serde_json::from_str(&text).map_err(|e| MemlayerError::Provider {
                message: format!("failed to parse API response: {e}"),
                source: Some(Box::new(e)),
            });
        }

        let text = response.text().await.unwrap_or_default();
        if is_transient_error(status) {
            warn!(status = %status, endpoint, "transient provider error, not retried");
        }
        Err(MemlayerError::provider(error_message(status, &text)))
    }
}

/// Prefers the API's own error message over the raw body.
fn error_message(status: StatusCode, body: &str) -> String {
    match serde_json::from_str::<ApiErrorResponse>(body) {
        Ok(api_err) => match api_err.error.type_ {
            Some(kind) => format!("API error {status} ({kind}): {}", api_err.error.message),
            None => format!("API error {status}: {}", api_err.error.message),
        },
        Err(_) => format!("API returned {status}: {body}"),
    }
}

/// Rate limiting and upstream outages, logged louder than other failures.
fn is_transient_error(status: StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 500 | 502 | 503)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChatMessage;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(base_url: &str) -> OpenAiClient {
        OpenAiClient::new("test-api-key", base_url).unwrap()
    }

    fn chat_request() -> ChatRequest {
        ChatRequest {
            model: "gpt-4o-mini".into(),
            messages: vec![ChatMessage {
                role: "user".into(),
                content: "Hello".into(),
            }],
            max_tokens: 64,
            temperature: Some(0.0),
        }
    }

    fn chat_body(text: &str) -> serde_json::Value {
        serde_json::json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "model": "gpt-4o-mini",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": text},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 9, "completion_tokens": 3, "total_tokens": 12}
        })
    }

    #[test]
    fn transient_statuses() {
        assert!(is_transient_error(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_transient_error(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(is_transient_error(StatusCode::BAD_GATEWAY));
        assert!(is_transient_error(StatusCode::SERVICE_UNAVAILABLE));
        assert!(!is_transient_error(StatusCode::BAD_REQUEST));
        assert!(!is_transient_error(StatusCode::UNAUTHORIZED));
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let client = OpenAiClient::new("k", "http://localhost:8080/v1/").unwrap();
        assert_eq!(client.base_url(), "http://localhost:8080/v1");
    }

    #[tokio::test]
    async fn chat_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(serde_json::json!({"model": "gpt-4o-mini", "max_tokens": 64})))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_body("Hi there!")))
            .mount(&server)
            .await;

        let resp = test_client(&server.uri()).chat(&chat_request()).await.unwrap();
        assert_eq!(resp.choices[0].message.content.as_deref(), Some("Hi there!"));
        assert_eq!(resp.usage.unwrap().prompt_tokens, 9);
    }

    #[tokio::test]
    async fn chat_429_is_not_retried() {
        let server = MockServer::start().await;
        let error_body = serde_json::json!({
            "error": {"type": "rate_limit_exceeded", "message": "Rate limited"}
        });

        // A second request would succeed; it must never be sent.
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_json(&error_body))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_body("too late")))
            .expect(0)
            .mount(&server)
            .await;

        let err = test_client(&server.uri())
            .chat(&chat_request())
            .await
            .unwrap_err();
        assert!(matches!(err, MemlayerError::Provider { .. }));
        assert!(err.to_string().contains("Rate limited"), "got: {err}");
    }

    #[tokio::test]
    async fn chat_fails_on_400() {
        let server = MockServer::start().await;
        let error_body = serde_json::json!({
            "error": {"type": "invalid_request_error", "message": "max_tokens is too large"}
        });
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(400).set_body_json(&error_body))
            .expect(1)
            .mount(&server)
            .await;

        let err = test_client(&server.uri())
            .chat(&chat_request())
            .await
            .unwrap_err();
        assert!(matches!(err, MemlayerError::Provider { .. }));
        let msg = err.to_string();
        assert!(msg.contains("max_tokens is too large"), "got: {msg}");
        assert!(msg.contains("invalid_request_error"), "got: {msg}");
    }

    #[tokio::test]
    async fn embeddings_503_is_single_attempt() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(503).set_body_string("upstream overloaded"))
            .expect(1)
            .mount(&server)
            .await;

        let request = EmbeddingRequest {
            model: "text-embedding-3-small".into(),
            input: vec!["x".into()],
        };
        let err = test_client(&server.uri())
            .embeddings(&request)
            .await
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("503"), "got: {msg}");
        assert!(msg.contains("upstream overloaded"), "got: {msg}");
    }

    #[tokio::test]
    async fn unparseable_success_body_is_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = test_client(&server.uri())
            .chat(&chat_request())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("failed to parse API response"));
    }

    #[tokio::test]
    async fn client_sends_bearer_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer test-api-key"))
            .and(header("content-type", "application/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_body("ok")))
            .mount(&server)
            .await;

        let result = test_client(&server.uri()).chat(&chat_request()).await;
        assert!(result.is_ok(), "headers should match: {result:?}");
    }
}
