//! Batched, strictly sequential mutation of many entities.

use crate::auth::AccessToken;
use crate::config::BatchConfig;
use crate::errors::OfscResult;
use crate::observability::Metrics;
use crate::resilience::{ApiCall, Authorized, ResilientRequester};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::time::sleep;

/// Whether a mutation was issued or skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationStatus {
    /// A mutation call was issued and succeeded.
    Applied,
    /// An entity rule decided no call was needed.
    Skipped,
}

/// Outcome of mutating one entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationResult {
    /// Entity identifier, when the entity has one.
    pub id: Option<String>,
    /// Applied or skipped.
    pub status: MutationStatus,
    /// Why the entity was skipped, or other remarks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// Mutation-specific fields, flattened into exports.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl MutationResult {
    /// An applied result.
    pub fn applied(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            status: MutationStatus::Applied,
            comment: None,
            fields: Map::new(),
        }
    }

    /// A skipped result.
    pub fn skipped(id: Option<String>, reason: impl Into<String>) -> Self {
        Self {
            id,
            status: MutationStatus::Skipped,
            comment: Some(reason.into()),
            fields: Map::new(),
        }
    }

    /// Adds a mutation-specific field.
    pub fn with_field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    /// Returns true if the entity was skipped.
    pub fn is_skipped(&self) -> bool {
        self.status == MutationStatus::Skipped
    }
}

/// What to do with one entity.
#[derive(Debug, Clone)]
pub enum MutationPlan {
    /// Record this result and issue nothing.
    Skip(MutationResult),
    /// Issue this call.
    Apply(ApiCall),
}

/// A per-entity mutation with its skip rules.
pub trait Mutation<E>: Send + Sync {
    /// Decides whether `entity` needs a call, applying skip rules first.
    fn plan(&self, entity: &E) -> OfscResult<MutationPlan>;

    /// Builds the result of an applied call from the backend response.
    fn applied(&self, entity: &E, response: Value) -> MutationResult;
}

/// Applies a mutation in fixed-size batches with a cooldown between them.
pub struct BatchMutator<'a> {
    requester: &'a ResilientRequester,
    config: BatchConfig,
    metrics: Arc<Metrics>,
}

impl<'a> BatchMutator<'a> {
    /// Creates a mutator.
    pub fn new(requester: &'a ResilientRequester, config: BatchConfig, metrics: Arc<Metrics>) -> Self {
        Self {
            requester,
            config,
            metrics,
        }
    }

    /// Mutates `entities` batch by batch, one entity at a time.
    ///
    /// Results are pushed into `results` as they are produced, so on failure
    /// the entries before the failing entity stay visible to the caller. The
    /// token returned by each call is used for the next one; the last token
    /// (or the one passed in, when every entity was skipped) is returned.
    pub async fn apply_in_batches<E, M>(
        &self,
        entities: &[E],
        mutation: &M,
        token: Option<AccessToken>,
        results: &mut Vec<MutationResult>,
    ) -> OfscResult<Option<AccessToken>>
    where
        M: Mutation<E>,
    {
        let batch_size = self.config.batch_size.max(1);
        let batch_count = entities.len().div_ceil(batch_size);
        let mut token = token;

        for (index, batch) in entities.chunks(batch_size).enumerate() {
            if index > 0 {
                tracing::warn!(
                    batch = index + 1,
                    batches = batch_count,
                    cooldown_secs = self.config.cooldown.as_secs(),
                    "Cooling down before next batch to stay under server rate limits"
                );
                sleep(self.config.cooldown).await;
            }

            tracing::info!(
                batch = index + 1,
                batches = batch_count,
                size = batch.len(),
                done = results.len(),
                "Processing batch"
            );

            for entity in batch {
                match mutation.plan(entity)? {
                    MutationPlan::Skip(result) => {
                        self.metrics.record_mutation_skipped();
                        results.push(result);
                    }
                    MutationPlan::Apply(call) => {
                        let response: Authorized<Value> =
                            self.requester.execute(&call, token.take()).await?;
                        self.metrics.record_mutation_applied();
                        results.push(mutation.applied(entity, response.data));
                        token = Some(response.token);
                    }
                }
            }
        }

        Ok(token)
    }
}
