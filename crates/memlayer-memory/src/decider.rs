// SPDX-FileCopyrightText: 2026 memlayer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Decision step implementations.
//!
//! [`LlmDecider`] asks a completion model to pick one action for a fact given
//! its nearest existing memories. [`SimilarityDecider`] decides from cosine
//! scores alone and needs no model.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use memlayer_core::{
    AdapterType, Candidate, CompletionAdapter, CompletionRequest, Decision, DecisionAdapter,
    MemlayerError, Message, PluginAdapter,
};

const DECISION_INSTRUCTIONS: &str = r#"You manage a user's long-term memory. Compare the new fact with the existing memories and choose exactly one event:
- "ADD": the fact is new information not covered by any existing memory
- "UPDATE": the fact refines or corrects one existing memory; give the merged statement in "text"
- "DELETE": the fact means one existing memory is no longer true
- "NONE": the fact is already captured by an existing memory"#;

const DECISION_RESPONSE_FORMAT: &str = r#"Respond with a single JSON object only, for example {"event": "UPDATE", "id": 0, "text": "merged statement"}.
"id" is the number of the existing memory and is required for UPDATE and DELETE."#;

/// Decides by prompting a completion model.
pub struct LlmDecider {
    completion: Arc<dyn CompletionAdapter>,
    model: String,
    max_tokens: u32,
}

impl LlmDecider {
    pub fn new(completion: Arc<dyn CompletionAdapter>, model: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            completion,
            model: model.into(),
            max_tokens,
        }
    }
}

#[async_trait]
impl PluginAdapter for LlmDecider {
    fn name(&self) -> &str {
        "llm-decider"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Decision
    }
}

#[async_trait]
impl DecisionAdapter for LlmDecider {
    async fn decide(&self, fact: &str, candidates: &[Candidate]) -> Result<Decision, MemlayerError> {
        let request = CompletionRequest {
            model: self.model.clone(),
            system_prompt: None,
            messages: vec![Message::user(build_decision_prompt(fact, candidates))],
            max_tokens: self.max_tokens,
            temperature: Some(0.0),
        };
        let response = self.completion.complete(request).await?;
        parse_decision_response(&response.content, candidates)
    }
}

/// Render the decision prompt with numbered candidates.
pub fn build_decision_prompt(fact: &str, candidates: &[Candidate]) -> String {
    let listing = if candidates.is_empty() {
        "(none)".to_string()
    } else {
        candidates
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{i}. {}", c.content))
            .collect::<Vec<_>>()
            .join("\n")
    };
    // Stored text is user data; it is never scanned for placeholders.
    format!(
        "{DECISION_INSTRUCTIONS}\n\nExisting memories:\n{listing}\n\nNew fact: {fact}\n\n{DECISION_RESPONSE_FORMAT}"
    )
}

/// Parse a model decision.
///
/// The JSON object may be fenced or surrounded by prose. A numeric `id` (or
/// numeric string) within range is mapped to the candidate's record id; any
/// other string is passed through for the caller to validate. Unparsable
/// output is a provider error.
pub fn parse_decision_response(
    response: &str,
    candidates: &[Candidate],
) -> Result<Decision, MemlayerError> {
    let trimmed = response.trim();
    let json_str = match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => trimmed,
    };

    let value: Value = serde_json::from_str(json_str).map_err(|e| {
        debug!("Raw decision response: {response}");
        MemlayerError::provider(format!("unparsable decision response: {e}"))
    })?;

    let event = value
        .get("event")
        .and_then(Value::as_str)
        .ok_or_else(|| MemlayerError::provider("decision response has no \"event\""))?;

    match event.trim().to_ascii_uppercase().as_str() {
        "ADD" => Ok(Decision::Add),
        "NONE" | "NOOP" => Ok(Decision::Noop),
        "UPDATE" => {
            let target_id = resolve_target(value.get("id"), candidates)?;
            let content = value
                .get("text")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string);
            Ok(Decision::Update { target_id, content })
        }
        "DELETE" => Ok(Decision::Delete {
            target_id: resolve_target(value.get("id"), candidates)?,
        }),
        other => Err(MemlayerError::provider(format!(
            "unknown decision event \"{other}\""
        ))),
    }
}

fn resolve_target(id: Option<&Value>, candidates: &[Candidate]) -> Result<String, MemlayerError> {
    let index = match id {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    if let Some(index) = index {
        return usize::try_from(index)
            .ok()
            .and_then(|i| candidates.get(i))
            .map(|c| c.id.clone())
            .ok_or_else(|| {
                MemlayerError::provider(format!("decision names candidate {index}, which does not exist"))
            });
    }
    match id {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        _ => Err(MemlayerError::provider("decision response has no target \"id\"")),
    }
}

/// Model-free decisions from the best candidate's similarity.
#[derive(Debug, Clone, Copy)]
pub struct SimilarityDecider {
    dedup_threshold: f32,
    update_threshold: f32,
}

impl SimilarityDecider {
    pub fn new(dedup_threshold: f32, update_threshold: f32) -> Self {
        Self {
            dedup_threshold,
            update_threshold,
        }
    }
}

#[async_trait]
impl PluginAdapter for SimilarityDecider {
    fn name(&self) -> &str {
        "similarity-decider"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Decision
    }
}

#[async_trait]
impl DecisionAdapter for SimilarityDecider {
    async fn decide(&self, _fact: &str, candidates: &[Candidate]) -> Result<Decision, MemlayerError> {
        // Candidates arrive ranked; on a score tie the earlier one wins.
        let Some(best) = candidates
            .iter()
            .reduce(|best, c| if c.score > best.score { c } else { best })
        else {
            return Ok(Decision::Add);
        };

        if best.score >= self.dedup_threshold {
            debug!(target_id = %best.id, score = best.score, "fact duplicates existing memory");
            Ok(Decision::Noop)
        } else if best.score >= self.update_threshold {
            // Newer wins: the fact text replaces the old content.
            Ok(Decision::Update {
                target_id: best.id.clone(),
                content: None,
            })
        } else {
            Ok(Decision::Add)
        }
    }
}

impl Default for SimilarityDecider {
    fn default() -> Self {
        Self::new(0.9, 0.7)
    }
}
