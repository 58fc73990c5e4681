//! Peer Reviewer Routing
//!
//! Picks one reviewer for a submitted engagement:
//!
//! ```text
//! submitter tier ──► eligible tiers (same or higher)
//!        │
//!        ▼
//! directory query (not the submitter, shares a tech-stack tag)
//!        │
//!        ▼
//! random sample of at most N ──► uniform random pick ──► reviewer | waive
//! ```
//!
//! Selection ignores ordering and recency entirely. The randomness source is
//! injected so tests can replay a selection.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{RngCore, SeedableRng};
use std::sync::{Arc, Mutex};
use tracing::info;

use crate::database::{CandidateQuery, ReviewerCandidate, Store};
use crate::error::WorkflowResult;
use crate::identity::normalize_tags;
use crate::review::ProjectEngagement;

pub const DEFAULT_PEER_SAMPLE_SIZE: usize = 10;

pub struct ReviewerRouter {
    store: Arc<dyn Store>,
    rng: Mutex<Box<dyn RngCore + Send>>,
    sample_size: usize,
}

impl ReviewerRouter {
    /// Router seeded from the operating system
    pub fn new(store: Arc<dyn Store>, sample_size: usize) -> Self {
        Self::with_rng(store, sample_size, StdRng::from_entropy())
    }

    pub fn with_rng(
        store: Arc<dyn Store>,
        sample_size: usize,
        rng: impl RngCore + Send + 'static,
    ) -> Self {
        Self {
            store,
            rng: Mutex::new(Box::new(rng)),
            sample_size: sample_size.max(1),
        }
    }

    pub fn candidate_query(engagement: &ProjectEngagement) -> CandidateQuery {
        CandidateQuery {
            eligible_tiers: engagement.tier.eligible_reviewer_tiers(),
            exclude_user_id: engagement.student_id.clone(),
            tech_stack: normalize_tags(&engagement.tech_stack),
        }
    }

    /// Returns `None` when nobody is eligible; the caller waives peer review
    pub async fn assign_reviewer(&self, engagement: &ProjectEngagement) -> WorkflowResult<Option<String>> {
        let query = Self::candidate_query(engagement);
        let candidates = self.store.find_reviewer_candidates(&query).await?;
        let pool_size = candidates.len();

        match self.pick(&candidates) {
            Some(candidate) => {
                info!(
                    engagement_id = %engagement.engagement_id,
                    reviewer_id = %candidate.user_id,
                    reviewer_tier = candidate.tier.as_str(),
                    pool_size,
                    "Peer reviewer selected"
                );
                Ok(Some(candidate.user_id.clone()))
            }
            None => {
                info!(
                    engagement_id = %engagement.engagement_id,
                    submitter_tier = engagement.tier.as_str(),
                    "No eligible peer reviewer, review will be waived"
                );
                Ok(None)
            }
        }
    }

    fn pick<'a>(&self, candidates: &'a [ReviewerCandidate]) -> Option<&'a ReviewerCandidate> {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        let sample: Vec<&ReviewerCandidate> = candidates
            .choose_multiple(&mut **rng, self.sample_size)
            .collect();
        sample.choose(&mut **rng).copied()
    }
}
