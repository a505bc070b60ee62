// SPDX-FileCopyrightText: 2026 memlayer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! OpenAI-compatible provider adapters for memlayer.
//!
//! [`OpenAiEmbedder`] implements `EmbeddingAdapter` over `POST /embeddings`
//! and [`OpenAiCompletion`] implements `CompletionAdapter` over
//! `POST /chat/completions`. Any server speaking the same wire format
//! (vLLM, Ollama, LiteLLM) works by pointing `base_url` at it.

pub mod client;
pub mod types;

use async_trait::async_trait;
use memlayer_config::model::{EmbeddingConfig, LlmConfig};
use memlayer_core::{
    AdapterType, CompletionAdapter, CompletionRequest, CompletionResponse, EmbeddingAdapter,
    EmbeddingInput, EmbeddingOutput, MemlayerError, PluginAdapter, TokenUsage,
};
use tracing::{debug, info};

use crate::client::OpenAiClient;
use crate::types::{ChatMessage, ChatRequest, EmbeddingRequest};

/// Environment variable consulted when no key is configured.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Embedding adapter for OpenAI-compatible `/embeddings` endpoints.
pub struct OpenAiEmbedder {
    client: OpenAiClient,
    model: String,
    dimensions: usize,
}

impl OpenAiEmbedder {
    /// Creates an embedder from configuration.
    ///
    /// The API key comes from `embedding.api_key`, falling back to
    /// `OPENAI_API_KEY`.
    pub fn new(config: &EmbeddingConfig) -> Result<Self, MemlayerError> {
        let api_key = resolve_api_key(config.api_key.as_deref())?;
        let client = OpenAiClient::new(&api_key, &config.base_url)?;
        info!(
            model = config.model.as_str(),
            dimensions = config.dimensions,
            "OpenAI embedder initialized"
        );
        Ok(Self::with_client(client, &config.model, config.dimensions))
    }

    pub fn with_client(client: OpenAiClient, model: &str, dimensions: usize) -> Self {
        Self {
            client,
            model: model.to_string(),
            dimensions,
        }
    }
}

#[async_trait]
impl PluginAdapter for OpenAiEmbedder {
    fn name(&self) -> &str {
        "openai-embedding"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Embedding
    }
}

#[async_trait]
impl EmbeddingAdapter for OpenAiEmbedder {
    async fn embed(&self, input: EmbeddingInput) -> Result<EmbeddingOutput, MemlayerError> {
        if input.texts.is_empty() {
            return Ok(EmbeddingOutput {
                embeddings: Vec::new(),
                dimensions: self.dimensions,
            });
        }

        let expected = input.texts.len();
        let request = EmbeddingRequest {
            model: self.model.clone(),
            input: input.texts,
        };
        let mut response = self.client.embeddings(&request).await?;

        if response.data.len() != expected {
            return Err(MemlayerError::provider(format!(
                "embedding API returned {} vectors for {expected} inputs",
                response.data.len()
            )));
        }
        response.data.sort_by_key(|d| d.index);

        let mut embeddings = Vec::with_capacity(expected);
        for data in response.data {
            if data.embedding.len() != self.dimensions {
                return Err(MemlayerError::provider(format!(
                    "embedding has {} dimensions, expected {}",
                    data.embedding.len(),
                    self.dimensions
                )));
            }
            embeddings.push(data.embedding);
        }

        debug!(count = expected, model = self.model.as_str(), "texts embedded");
        Ok(EmbeddingOutput {
            embeddings,
            dimensions: self.dimensions,
        })
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Completion adapter for OpenAI-compatible `/chat/completions` endpoints.
pub struct OpenAiCompletion {
    client: OpenAiClient,
}

impl OpenAiCompletion {
    /// Creates a completion adapter from configuration, with the same key
    /// fallback as [`OpenAiEmbedder::new`].
    pub fn new(config: &LlmConfig) -> Result<Self, MemlayerError> {
        let api_key = resolve_api_key(config.api_key.as_deref())?;
        let client = OpenAiClient::new(&api_key, &config.base_url)?;
        info!(model = config.model.as_str(), "OpenAI completion adapter initialized");
        Ok(Self::with_client(client))
    }

    pub fn with_client(client: OpenAiClient) -> Self {
        Self { client }
    }

    fn to_chat_request(request: CompletionRequest) -> ChatRequest {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(system) = request.system_prompt {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: system,
            });
        }
        messages.extend(request.messages.into_iter().map(|m| ChatMessage {
            role: m.role.to_string(),
            content: m.content,
        }));

        ChatRequest {
            model: request.model,
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        }
    }
}

#[async_trait]
impl PluginAdapter for OpenAiCompletion {
    fn name(&self) -> &str {
        "openai-completion"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Completion
    }
}

#[async_trait]
impl CompletionAdapter for OpenAiCompletion {
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, MemlayerError> {
        let chat = Self::to_chat_request(request);
        let requested_model = chat.model.clone();
        let response = self.client.chat(&chat).await?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| MemlayerError::provider("chat completion returned no choices"))?;
        let content = choice.message.content.ok_or_else(|| {
            MemlayerError::provider(format!(
                "chat completion returned no content (finish_reason: {})",
                choice.finish_reason.as_deref().unwrap_or("unknown")
            ))
        })?;

        Ok(CompletionResponse {
            content,
            model: response.model.unwrap_or(requested_model),
            usage: response.usage.map(|u| TokenUsage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            }),
        })
    }
}

/// Resolves the API key from config or environment.
fn resolve_api_key(config_key: Option<&str>) -> Result<String, MemlayerError> {
    pick_api_key(config_key, std::env::var(API_KEY_ENV).ok())
}

fn pick_api_key(config_key: Option<&str>, env_key: Option<String>) -> Result<String, MemlayerError> {
    if let Some(key) = config_key
        && !key.is_empty()
    {
        return Ok(key.to_string());
    }

    env_key.filter(|k| !k.is_empty()).ok_or_else(|| {
        MemlayerError::Config(format!(
            "API key not found. Set embedding.api_key / llm.api_key in config or the {API_KEY_ENV} environment variable."
        ))
    })
}
