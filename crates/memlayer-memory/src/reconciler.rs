// SPDX-FileCopyrightText: 2026 memlayer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reconciliation of new facts against a user's existing memories.
//!
//! Each fact is embedded, matched against its top-k nearest memories, handed
//! to the decision step and resolved into exactly one of ADD, UPDATE, DELETE
//! or NOOP.
//!
//! In snapshot mode every fact is embedded, queried and decided before the
//! first mutation, so siblings do not see each other. In sequential mode each
//! fact is applied before the next one is queried.
//!
//! Decision failures and stale targets are isolated to their fact and
//! reported in [`AddSummary::failures`]. Embedding and index errors abort the
//! call.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, info, warn};

use memlayer_config::ReconcileMode;
use memlayer_core::{
    Candidate, Decision, DecisionAdapter, IndexPatch, MemlayerError, MemoryItem,
    MemoryType, Metadata, VectorIndex, VectorQuery,
};

use crate::recording;
use crate::resilience::{ResilientEmbedder, with_timeout};
use crate::types::{ActionRecord, AddSummary, FactFailure};

/// A fact ready for reconciliation, with its final metadata.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PendingFact {
    pub content: String,
    pub metadata: Metadata,
}

#[derive(Debug, Clone)]
pub(crate) struct ReconcileSettings {
    pub top_k: usize,
    pub mode: ReconcileMode,
    pub append_only_types: Vec<MemoryType>,
    pub decision_timeout: Duration,
}

/// A fact with its embedding and the candidates it was compared against.
struct Snapshot {
    fact: PendingFact,
    embedding: Vec<f32>,
    candidates: Vec<Candidate>,
}

/// A snapshot with its decision, ready to apply.
struct Plan {
    snapshot: Snapshot,
    decision: Result<Decision, String>,
    /// Embedding of the decider's merged text when it differs from the fact.
    merged_embedding: Option<Vec<f32>>,
}

impl Plan {
    fn merged_text(&self) -> Option<&str> {
        match &self.decision {
            Ok(Decision::Update {
                content: Some(text),
                ..
            }) if *text != self.snapshot.fact.content => Some(text),
            _ => None,
        }
    }
}

pub(crate) struct Reconciler {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<ResilientEmbedder>,
    decider: Arc<dyn DecisionAdapter>,
    settings: ReconcileSettings,
}

impl Reconciler {
    pub fn new(
        index: Arc<dyn VectorIndex>,
        embedder: Arc<ResilientEmbedder>,
        decider: Arc<dyn DecisionAdapter>,
        settings: ReconcileSettings,
    ) -> Self {
        Self {
            index,
            embedder,
            decider,
            settings,
        }
    }

    /// Reconcile `facts` for `user_id`. The caller holds the user's lock.
    pub async fn reconcile(
        &self,
        user_id: &str,
        facts: Vec<PendingFact>,
        memory_type: MemoryType,
    ) -> Result<AddSummary, MemlayerError> {
        let mut summary = AddSummary::default();
        match self.settings.mode {
            ReconcileMode::Snapshot => {
                for plan in self.plan_snapshot(user_id, facts, memory_type).await? {
                    self.apply(user_id, memory_type, plan, &mut summary).await?;
                }
            }
            ReconcileMode::Sequential => {
                for fact in facts {
                    let embedding = self.embedder.embed_one(&fact.content).await?;
                    let snapshot = self.snapshot(user_id, fact, embedding).await?;
                    let decision = self.decide(&snapshot, memory_type).await;
                    let mut plans = [Plan {
                        snapshot,
                        decision,
                        merged_embedding: None,
                    }];
                    self.embed_merged(&mut plans).await?;
                    let [plan] = plans;
                    self.apply(user_id, memory_type, plan, &mut summary).await?;
                }
            }
        }

        info!(
            user_id,
            added = summary.added(),
            updated = summary.updated(),
            deleted = summary.deleted(),
            unchanged = summary.unchanged(),
            failed = summary.failures.len(),
            "reconciliation complete"
        );
        Ok(summary)
    }

    /// Embed, query and decide every fact without mutating the index.
    async fn plan_snapshot(
        &self,
        user_id: &str,
        facts: Vec<PendingFact>,
        memory_type: MemoryType,
    ) -> Result<Vec<Plan>, MemlayerError> {
        let texts = facts.iter().map(|f| f.content.clone()).collect();
        let embeddings = self.embedder.embed_many(texts).await?;

        let mut snapshots = Vec::with_capacity(facts.len());
        for (fact, embedding) in facts.into_iter().zip(embeddings) {
            snapshots.push(self.snapshot(user_id, fact, embedding).await?);
        }

        // Decisions against a fixed snapshot are independent of each other.
        let decisions = join_all(snapshots.iter().map(|s| self.decide(s, memory_type))).await;
        let mut plans: Vec<Plan> = snapshots
            .into_iter()
            .zip(decisions)
            .map(|(snapshot, decision)| Plan {
                snapshot,
                decision,
                merged_embedding: None,
            })
            .collect();

        self.embed_merged(&mut plans).await?;
        Ok(plans)
    }

    async fn snapshot(
        &self,
        user_id: &str,
        fact: PendingFact,
        embedding: Vec<f32>,
    ) -> Result<Snapshot, MemlayerError> {
        let query = VectorQuery::similar(user_id, embedding.clone(), self.settings.top_k);
        let candidates = self
            .index
            .query(query)
            .await?
            .into_iter()
            .map(|item| Candidate {
                score: item.score.unwrap_or_default(),
                id: item.id,
                content: item.content,
            })
            .collect();
        Ok(Snapshot {
            fact,
            embedding,
            candidates,
        })
    }

    /// Run the decision step for one fact. The error string becomes the
    /// fact's failure reason.
    async fn decide(&self, snapshot: &Snapshot, memory_type: MemoryType) -> Result<Decision, String> {
        if self.settings.append_only_types.contains(&memory_type) {
            return Ok(Decision::Add);
        }

        let decision = with_timeout(
            "decision",
            self.settings.decision_timeout,
            self.decider.decide(&snapshot.fact.content, &snapshot.candidates),
        )
        .await
        .map_err(|e| format!("decision failed: {e}"))?;

        if let Some(target) = decision.target_id()
            && !snapshot.candidates.iter().any(|c| c.id == target)
        {
            return Err(format!(
                "decision targets {target}, which is not among the candidates"
            ));
        }

        debug!(
            fact = %snapshot.fact.content,
            action = decision.action().as_str(),
            target_id = decision.target_id(),
            candidates = snapshot.candidates.len(),
            "fact decided"
        );
        Ok(decision)
    }

    /// Embed merged UPDATE texts in one batch.
    async fn embed_merged(&self, plans: &mut [Plan]) -> Result<(), MemlayerError> {
        let pending: Vec<(usize, String)> = plans
            .iter()
            .enumerate()
            .filter_map(|(i, plan)| plan.merged_text().map(|text| (i, text.to_string())))
            .collect();
        if pending.is_empty() {
            return Ok(());
        }

        let texts = pending.iter().map(|(_, text)| text.clone()).collect();
        let vectors = self.embedder.embed_many(texts).await?;
        for ((i, _), vector) in pending.into_iter().zip(vectors) {
            plans[i].merged_embedding = Some(vector);
        }
        Ok(())
    }

    async fn apply(
        &self,
        user_id: &str,
        memory_type: MemoryType,
        plan: Plan,
        summary: &mut AddSummary,
    ) -> Result<(), MemlayerError> {
        let Plan {
            snapshot,
            decision,
            merged_embedding,
        } = plan;
        let Snapshot {
            fact,
            embedding,
            candidates,
        } = snapshot;

        let decision = match decision {
            Ok(decision) => decision,
            Err(reason) => {
                fail(summary, fact.content, reason);
                return Ok(());
            }
        };
        let action = decision.action();
        let previous_content = decision.target_id().and_then(|target| {
            candidates
                .iter()
                .find(|c| c.id == target)
                .map(|c| c.content.clone())
        });

        let id = match decision {
            Decision::Add => {
                let item = MemoryItem::new(
                    user_id,
                    fact.content.clone(),
                    memory_type,
                    fact.metadata,
                    embedding,
                );
                let id = item.id.clone();
                self.index.insert(item).await?;
                info!(user_id, memory_id = %id, "memory added");
                Some(id)
            }
            Decision::Update { target_id, content } => {
                let (content, embedding) = match (content, merged_embedding) {
                    (Some(text), Some(vector)) => (text, vector),
                    _ => (fact.content.clone(), embedding),
                };
                let patch = IndexPatch {
                    content: Some(content),
                    embedding: Some(embedding),
                    metadata: (!fact.metadata.is_empty()).then_some(fact.metadata),
                    memory_type: Some(memory_type),
                };
                match self.index.update(&target_id, patch).await {
                    Ok(_) => info!(user_id, memory_id = %target_id, "memory updated"),
                    Err(MemlayerError::NotFound { id }) => {
                        fail(summary, fact.content, format!("target {id} no longer exists"));
                        return Ok(());
                    }
                    Err(e) => return Err(e),
                }
                Some(target_id)
            }
            Decision::Delete { target_id } => {
                match self.index.delete(&target_id).await {
                    Ok(()) => info!(user_id, memory_id = %target_id, "memory deleted"),
                    Err(MemlayerError::NotFound { id }) => {
                        fail(summary, fact.content, format!("target {id} no longer exists"));
                        return Ok(());
                    }
                    Err(e) => return Err(e),
                }
                Some(target_id)
            }
            Decision::Noop => None,
        };

        recording::record_action(action);
        summary.actions.push(ActionRecord {
            action,
            id,
            fact: fact.content,
            previous_content,
        });
        Ok(())
    }
}

fn fail(summary: &mut AddSummary, fact: String, reason: String) {
    warn!(fact = %fact, reason = %reason, "fact skipped");
    recording::record_failure();
    summary.failures.push(FactFailure { fact, reason });
}
