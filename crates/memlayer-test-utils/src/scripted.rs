// SPDX-FileCopyrightText: 2026 memlayer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scripted extraction and decision doubles.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use memlayer_core::{
    AdapterType, Candidate, Decision, DecisionAdapter, ExtractedFact, ExtractionAdapter,
    MemlayerError, Message, PluginAdapter, Role,
};

fn locked<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Extractor returning queued fact lists.
///
/// With an empty queue every non-empty line of every user message becomes
/// one fact, which keeps simple tests free of scripting.
#[derive(Debug, Default)]
pub struct ScriptedExtractor {
    script: Mutex<VecDeque<Result<Vec<ExtractedFact>, String>>>,
    calls: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the facts returned by the next call.
    pub fn push_facts(&self, facts: &[&str]) {
        locked(&self.script).push_back(Ok(facts.iter().map(|f| ExtractedFact::new(*f)).collect()));
    }

    /// Queue fully specified facts, metadata included.
    pub fn push_extracted(&self, facts: Vec<ExtractedFact>) {
        locked(&self.script).push_back(Ok(facts));
    }

    /// Queue a provider failure for the next call.
    pub fn push_failure(&self, message: &str) {
        locked(&self.script).push_back(Err(message.to_string()));
    }

    /// Messages of every call so far.
    pub fn calls(&self) -> Vec<Vec<Message>> {
        locked(&self.calls).clone()
    }
}

#[async_trait]
impl PluginAdapter for ScriptedExtractor {
    fn name(&self) -> &str {
        "scripted-extractor"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Extraction
    }
}

#[async_trait]
impl ExtractionAdapter for ScriptedExtractor {
    async fn extract(&self, messages: &[Message]) -> Result<Vec<ExtractedFact>, MemlayerError> {
        locked(&self.calls).push(messages.to_vec());
        let next = locked(&self.script).pop_front();
        match next {
            Some(Ok(facts)) => Ok(facts),
            Some(Err(message)) => Err(MemlayerError::provider(message)),
            None => Ok(messages
                .iter()
                .filter(|m| m.role == Role::User)
                .flat_map(|m| m.content.lines())
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(ExtractedFact::new)
                .collect()),
        }
    }
}

/// One observed `decide` call.
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionCall {
    pub fact: String,
    pub candidates: Vec<Candidate>,
}

/// Decider returning queued decisions, ADD once the queue is empty.
#[derive(Debug, Default)]
pub struct ScriptedDecider {
    script: Mutex<VecDeque<Result<Decision, String>>>,
    calls: Mutex<Vec<DecisionCall>>,
    delay: Option<Duration>,
}

impl ScriptedDecider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep for `delay` before answering, to exercise decision timeouts.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push(&self, decision: Decision) {
        locked(&self.script).push_back(Ok(decision));
    }

    pub fn push_failure(&self, message: &str) {
        locked(&self.script).push_back(Err(message.to_string()));
    }

    pub fn calls(&self) -> Vec<DecisionCall> {
        locked(&self.calls).clone()
    }
}

#[async_trait]
impl PluginAdapter for ScriptedDecider {
    fn name(&self) -> &str {
        "scripted-decider"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Decision
    }
}

#[async_trait]
impl DecisionAdapter for ScriptedDecider {
    async fn decide(&self, fact: &str, candidates: &[Candidate]) -> Result<Decision, MemlayerError> {
        locked(&self.calls).push(DecisionCall {
            fact: fact.to_string(),
            candidates: candidates.to_vec(),
        });
        let next = locked(&self.script).pop_front();
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match next {
            Some(Ok(decision)) => Ok(decision),
            Some(Err(message)) => Err(MemlayerError::provider(message)),
            None => Ok(Decision::Add),
        }
    }
}

type DecideFn = dyn Fn(&str, &[Candidate]) -> Result<Decision, MemlayerError> + Send + Sync;

/// Decider backed by a closure, for decisions that depend on candidates.
pub struct FnDecider {
    decide: Box<DecideFn>,
}

impl FnDecider {
    pub fn new(
        decide: impl Fn(&str, &[Candidate]) -> Result<Decision, MemlayerError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            decide: Box::new(decide),
        }
    }

    /// Deletes the best candidate, or adds when there is none.
    pub fn delete_best() -> Self {
        Self::new(|_, candidates| {
            Ok(candidates
                .first()
                .map_or(Decision::Add, |best| Decision::Delete {
                    target_id: best.id.clone(),
                }))
        })
    }
}

#[async_trait]
impl PluginAdapter for FnDecider {
    fn name(&self) -> &str {
        "fn-decider"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Decision
    }
}

#[async_trait]
impl DecisionAdapter for FnDecider {
    async fn decide(&self, fact: &str, candidates: &[Candidate]) -> Result<Decision, MemlayerError> {
        (self.decide)(fact, candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn extractor_falls_back_to_user_lines() {
        let extractor = ScriptedExtractor::new();
        let facts = extractor
            .extract(&[
                Message::user("I live in Berlin\n\nI like tea"),
                Message::assistant("Nice!"),
            ])
            .await
            .unwrap();
        let contents: Vec<&str> = facts.iter().map(|f| f.content.as_str()).collect();
        assert_eq!(contents, vec!["I live in Berlin", "I like tea"]);
    }

    #[tokio::test]
    async fn extractor_replays_script_then_failures() {
        let extractor = ScriptedExtractor::new();
        extractor.push_facts(&["User owns a cat"]);
        extractor.push_failure("boom");

        let facts = extractor.extract(&[Message::user("x")]).await.unwrap();
        assert_eq!(facts[0].content, "User owns a cat");
        assert!(extractor.extract(&[Message::user("x")]).await.is_err());
        assert_eq!(extractor.calls().len(), 2);
    }

    #[tokio::test]
    async fn decider_replays_script_then_adds() {
        let decider = ScriptedDecider::new();
        decider.push(Decision::Noop);

        assert_eq!(decider.decide("a", &[]).await.unwrap(), Decision::Noop);
        assert_eq!(decider.decide("b", &[]).await.unwrap(), Decision::Add);
        let calls = decider.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].fact, "b");
    }

    #[tokio::test]
    async fn delete_best_targets_first_candidate() {
        let decider = FnDecider::delete_best();
        let candidates = vec![Candidate {
            id: "m1".into(),
            content: "likes tea".into(),
            score: 0.8,
        }];
        assert_eq!(
            decider.decide("quit tea", &candidates).await.unwrap(),
            Decision::Delete {
                target_id: "m1".into()
            }
        );
        assert_eq!(decider.decide("x", &[]).await.unwrap(), Decision::Add);
    }
}
