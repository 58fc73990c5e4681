//! Trust Score Manager - event intake for verified farmers
//!
//! Each marketplace event becomes an atomic counter increment in the store,
//! followed by a recomputation of the contributions from the returned
//! counters. Concurrent events never lose increments; a recomputation based
//! on older counters never overwrites a newer one.

use std::sync::Arc;
use tracing::debug;

use crate::clock::Clock;
use crate::database::Store;
use crate::error::{WorkflowError, WorkflowResult};
use crate::reputation::{score_counters, CounterDelta, ScoringParams, TrustScore};

/// Marketplace events that move a farmer's trust score
#[derive(Debug, Clone, PartialEq)]
pub enum TrustEvent {
    OrderCompleted { volume: f64 },
    Rated { stars: u8 },
    DeliveryConfirmed { on_time: bool },
    DisputeRuledAgainst,
}

impl TrustEvent {
    fn to_delta(&self) -> WorkflowResult<CounterDelta> {
        match self {
            TrustEvent::OrderCompleted { volume } => {
                if !volume.is_finite() || *volume < 0.0 {
                    return Err(WorkflowError::ValidationFailed(format!(
                        "order volume must be a non-negative amount, got {}",
                        volume
                    )));
                }
                Ok(CounterDelta::order_completed(*volume))
            }
            TrustEvent::Rated { stars } => {
                if !(1..=5).contains(stars) {
                    return Err(WorkflowError::ValidationFailed(format!(
                        "rating must be between 1 and 5, got {}",
                        stars
                    )));
                }
                Ok(CounterDelta::rating(*stars))
            }
            TrustEvent::DeliveryConfirmed { on_time } => Ok(CounterDelta::confirmation(*on_time)),
            TrustEvent::DisputeRuledAgainst => Ok(CounterDelta::dispute_ruled_against()),
        }
    }
}

pub struct TrustScoreManager {
    store: Arc<dyn Store>,
    params: ScoringParams,
    clock: Arc<dyn Clock>,
}

impl TrustScoreManager {
    pub fn new(store: Arc<dyn Store>, params: ScoringParams, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            params,
            clock,
        }
    }

    pub fn params(&self) -> &ScoringParams {
        &self.params
    }

    pub async fn get_score(&self, farmer_id: &str) -> WorkflowResult<TrustScore> {
        self.store
            .get_trust_score(farmer_id)
            .await?
            .ok_or_else(|| WorkflowError::not_found("trust score", farmer_id))
    }

    /// Apply an event and return the farmer's current score
    pub async fn record_event(&self, farmer_id: &str, event: TrustEvent) -> WorkflowResult<TrustScore> {
        let delta = event.to_delta()?;

        let updated = self
            .store
            .increment_trust_counters(farmer_id, &delta)
            .await?
            .ok_or_else(|| WorkflowError::not_found("trust score", farmer_id))?;

        let score = self.rescore(updated).await?;

        debug!(
            farmer_id = %farmer_id,
            event = ?event,
            composite = score.composite_score,
            tier = score.tier().as_str(),
            "Recorded trust event"
        );

        Ok(score)
    }

    /// Recompute contributions from the stored counters
    pub async fn recompute(&self, farmer_id: &str) -> WorkflowResult<TrustScore> {
        let current = self.get_score(farmer_id).await?;
        self.rescore(current).await
    }

    async fn rescore(&self, mut score: TrustScore) -> WorkflowResult<TrustScore> {
        let breakdown = score_counters(score.verification_score, &score.counters, &self.params);
        let revision = score.revision;
        score.apply(&breakdown, revision, self.clock.now());

        if self.store.save_trust_contributions(&score).await? {
            return Ok(score);
        }

        // A newer revision was scored first
        debug!(farmer_id = %score.farmer_id, revision, "Skipped stale trust recomputation");
        self.get_score(&score.farmer_id).await
    }
}
