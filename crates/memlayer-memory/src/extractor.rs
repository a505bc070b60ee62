// SPDX-FileCopyrightText: 2026 memlayer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! LLM-based fact extraction from conversations.
//!
//! Asks a chat completion model for a JSON array of standalone facts. The
//! response parser is tolerant: code fences and surrounding prose are
//! stripped, and malformed output yields no facts instead of an error.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use memlayer_core::{
    AdapterType, CompletionAdapter, CompletionRequest, ExtractedFact, ExtractionAdapter,
    MemlayerError, Message, Metadata, PluginAdapter, Role,
};

/// System prompt for fact extraction.
const EXTRACTION_PROMPT: &str = r#"Extract factual information from this conversation that would be useful to remember for future conversations. Output as JSON array.

For each fact:
- "content": The fact as a standalone statement (e.g., "The user's dog is named Max")
- "category": One of: personal, preference, project, decision, instruction, outcome

Only include facts that are:
1. Stated by the user (not the assistant)
2. Specific and factual (not opinions unless explicitly stated as preferences)
3. Likely to be relevant in future conversations

If no memorable facts, return an empty array: []

Conversation:
{conversation}

Output JSON array only, no explanation:"#;

/// Extracts facts by prompting a completion model.
pub struct LlmExtractor {
    completion: Arc<dyn CompletionAdapter>,
    model: String,
    max_tokens: u32,
}

impl LlmExtractor {
    pub fn new(completion: Arc<dyn CompletionAdapter>, model: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            completion,
            model: model.into(),
            max_tokens,
        }
    }
}

#[async_trait]
impl PluginAdapter for LlmExtractor {
    fn name(&self) -> &str {
        "llm-extractor"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Extraction
    }
}

#[async_trait]
impl ExtractionAdapter for LlmExtractor {
    async fn extract(&self, messages: &[Message]) -> Result<Vec<ExtractedFact>, MemlayerError> {
        let request = CompletionRequest {
            model: self.model.clone(),
            system_prompt: None,
            messages: vec![Message::user(build_extraction_prompt(messages))],
            max_tokens: self.max_tokens,
            temperature: Some(0.0),
        };
        let response = self.completion.complete(request).await?;
        let facts = parse_extraction_response(&response.content);
        debug!(facts = facts.len(), model = %response.model, "extraction complete");
        Ok(facts)
    }
}

/// Build the extraction prompt by formatting conversation messages.
pub fn build_extraction_prompt(conversation: &[Message]) -> String {
    let mut conversation_text = String::new();
    for msg in conversation {
        let content = msg.content.trim();
        if content.is_empty() {
            continue;
        }
        let role = match msg.role {
            Role::User => "User",
            Role::Assistant => "Assistant",
            Role::System => "System",
        };
        conversation_text.push_str(&format!("{role}: {content}\n"));
    }

    EXTRACTION_PROMPT.replace("{conversation}", &conversation_text)
}

/// One element of the model's array: either a bare string or an object.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawFact {
    Text(String),
    Object {
        #[serde(alias = "fact", alias = "text")]
        content: String,
        #[serde(default)]
        category: Option<String>,
    },
}

impl RawFact {
    fn into_fact(self) -> Option<ExtractedFact> {
        let (content, category) = match self {
            RawFact::Text(content) => (content, None),
            RawFact::Object { content, category } => (content, category),
        };
        let content = content.trim();
        if content.is_empty() {
            return None;
        }
        let mut metadata = Metadata::new();
        if let Some(category) = category.filter(|c| !c.trim().is_empty()) {
            metadata.insert("category".to_string(), Value::String(category.trim().to_string()));
        }
        Some(ExtractedFact {
            content: content.to_string(),
            metadata,
        })
    }
}

/// Parse the LLM extraction response into structured facts.
///
/// Accepts a JSON array, optionally fenced in a markdown code block or
/// surrounded by prose, or an object wrapping the array under `"facts"`.
/// Returns an empty Vec on parse failure.
pub fn parse_extraction_response(response: &str) -> Vec<ExtractedFact> {
    let trimmed = response.trim();

    if let Ok(wrapped) = serde_json::from_str::<Value>(trimmed)
        && let Some(facts) = wrapped.get("facts")
    {
        return match serde_json::from_value::<Vec<RawFact>>(facts.clone()) {
            Ok(raw) => raw.into_iter().filter_map(RawFact::into_fact).collect(),
            Err(e) => {
                warn!("Failed to parse extraction response: {e}");
                Vec::new()
            }
        };
    }

    let json_str = match (trimmed.find('['), trimmed.rfind(']')) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => trimmed,
    };

    match serde_json::from_str::<Vec<RawFact>>(json_str) {
        Ok(raw) => raw.into_iter().filter_map(RawFact::into_fact).collect(),
        Err(e) => {
            warn!("Failed to parse extraction response: {e}");
            debug!("Raw response: {response}");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use memlayer_core::CompletionResponse;

    use super::*;

    #[test]
    fn parse_valid_json_array() {
        let response = r#"[
            {"content": "User's dog is named Max", "category": "personal"},
            {"content": "User prefers dark mode", "category": "preference"}
        ]"#;
        let facts = parse_extraction_response(response);
        assert_eq!(facts.len(), 2);
        assert_eq!(facts[0].content, "User's dog is named Max");
        assert_eq!(facts[0].metadata["category"], "personal");
        assert_eq!(facts[1].content, "User prefers dark mode");
    }

    #[test]
    fn parse_empty_array() {
        assert!(parse_extraction_response("[]").is_empty());
    }

    #[test]
    fn parse_malformed_json_returns_empty() {
        let facts = parse_extraction_response("This is not JSON at all.");
        assert!(facts.is_empty(), "Malformed JSON should return empty Vec");
        assert!(parse_extraction_response("[{\"content\": ").is_empty());
    }

    #[test]
    fn parse_markdown_code_block() {
        let response = r#"```json
[
    {"content": "User lives in Berlin", "category": "personal"}
]
```"#;
        let facts = parse_extraction_response(response);
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].content, "User lives in Berlin");
    }

    #[test]
    fn parse_with_surrounding_text() {
        let response = r#"Here are the extracted facts:
[{"content": "User uses Rust", "category": "project"}]
Those are the facts."#;
        let facts = parse_extraction_response(response);
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].content, "User uses Rust");
    }

    #[test]
    fn parse_plain_strings_and_facts_wrapper() {
        let facts = parse_extraction_response(r#"["Likes tea", "  ", "Owns a bike"]"#);
        let contents: Vec<&str> = facts.iter().map(|f| f.content.as_str()).collect();
        assert_eq!(contents, vec!["Likes tea", "Owns a bike"]);
        assert!(facts[0].metadata.is_empty());

        let facts = parse_extraction_response(r#"{"facts": [{"fact": "Works at Acme"}]}"#);
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].content, "Works at Acme");
    }

    #[test]
    fn build_prompt_formats_conversation() {
        let conversation = vec![
            Message::user("My dog's name is Max."),
            Message::assistant("That's a great name!"),
            Message::user("   "),
        ];

        let prompt = build_extraction_prompt(&conversation);
        assert!(prompt.contains("User: My dog's name is Max.\nAssistant: That's a great name!\n"));
        assert!(!prompt.contains("User:    "));
        assert!(prompt.contains("Output JSON array only"));
    }

    struct CannedCompletion {
        reply: String,
        seen: Mutex<Vec<CompletionRequest>>,
    }

    #[async_trait]
    impl PluginAdapter for CannedCompletion {
        fn name(&self) -> &str {
            "canned"
        }
        fn version(&self) -> semver::Version {
            semver::Version::new(0, 1, 0)
        }
        fn adapter_type(&self) -> AdapterType {
            AdapterType::Completion
        }
    }

    #[async_trait]
    impl CompletionAdapter for CannedCompletion {
        async fn complete(
            &self,
            request: CompletionRequest,
        ) -> Result<CompletionResponse, MemlayerError> {
            let model = request.model.clone();
            self.seen.lock().unwrap().push(request);
            Ok(CompletionResponse {
                content: self.reply.clone(),
                model,
                usage: None,
            })
        }
    }

    #[tokio::test]
    async fn extractor_prompts_configured_model() {
        let completion = Arc::new(CannedCompletion {
            reply: r#"[{"content": "User lives in Berlin", "category": "personal"}]"#.into(),
            seen: Mutex::new(Vec::new()),
        });
        let extractor = LlmExtractor::new(completion.clone(), "extract-model", 512);

        let facts = extractor
            .extract(&[Message::user("I moved to Berlin last year")])
            .await
            .unwrap();
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].content, "User lives in Berlin");

        let seen = completion.seen.lock().unwrap();
        assert_eq!(seen[0].model, "extract-model");
        assert_eq!(seen[0].max_tokens, 512);
        assert!(seen[0].messages[0].content.contains("User: I moved to Berlin last year"));
    }
}
