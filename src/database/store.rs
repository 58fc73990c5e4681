//! Storage abstraction shared by every engine
//!
//! All transitions go through conditional writes: the write names the status
//! it expects to replace and reports `false` when the record has moved on.
//! Counter updates are atomic increments performed by the store itself.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::identity::UserProfile;
use crate::portfolio::StudentPortfolioStatus;
use crate::reputation::{
    CounterDelta, TrustScore, VerificationDecision, VerificationRequest, VerificationStatus,
};
use crate::review::{
    EngagementStatus, EngagementTransition, LecturerReview, PeerFeedback, PeerReview,
    ProjectEngagement, StudentTier,
};

/// Runs while the student's portfolio is exclusively held by the store
pub type PortfolioMutation = Box<dyn FnOnce(&mut StudentPortfolioStatus) + Send>;

/// Filter for peer-reviewer candidates
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateQuery {
    pub eligible_tiers: Vec<StudentTier>,
    pub exclude_user_id: String,

    /// Lowercase tags; empty means no tech-stack filter
    pub tech_stack: Vec<String>,
}

impl CandidateQuery {
    pub fn matches(&self, user_id: &str, tier: StudentTier, tech_stack: &[String]) -> bool {
        user_id != self.exclude_user_id
            && self.eligible_tiers.contains(&tier)
            && (self.tech_stack.is_empty()
                || tech_stack.iter().any(|tag| self.tech_stack.contains(tag)))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReviewerCandidate {
    pub user_id: String,
    pub tier: StudentTier,
    pub tech_stack: Vec<String>,
}

#[async_trait]
pub trait Store: Send + Sync {
    // ---- user directory ----

    async fn upsert_user(&self, profile: &UserProfile) -> Result<()>;

    async fn get_user(&self, user_id: &str) -> Result<Option<UserProfile>>;

    /// Students matching the query, tier taken from their portfolio
    /// (BEGINNER when none exists). Ordered by user id.
    async fn find_reviewer_candidates(&self, query: &CandidateQuery)
        -> Result<Vec<ReviewerCandidate>>;

    // ---- farmer verification ----

    /// Enter PENDING: creates the request, or re-opens a REJECTED one.
    /// Returns `false` when a request is already PENDING or APPROVED.
    async fn submit_verification(
        &self,
        farmer_id: &str,
        documents: &[String],
        at: DateTime<Utc>,
    ) -> Result<bool>;

    async fn get_verification(&self, farmer_id: &str) -> Result<Option<VerificationRequest>>;

    /// Conditional on the current status equaling `expected`
    async fn transition_verification(
        &self,
        farmer_id: &str,
        expected: VerificationStatus,
        decision: &VerificationDecision,
    ) -> Result<bool>;

    // ---- trust scores ----

    /// Returns `false` when the farmer already has a score
    async fn insert_trust_score(&self, score: &TrustScore) -> Result<bool>;

    async fn get_trust_score(&self, farmer_id: &str) -> Result<Option<TrustScore>>;

    /// Atomically add `delta` to the counters and bump the revision.
    /// Returns the updated record, or `None` when the farmer has no score.
    async fn increment_trust_counters(
        &self,
        farmer_id: &str,
        delta: &CounterDelta,
    ) -> Result<Option<TrustScore>>;

    /// Write the contributions of `score` unless the stored contributions were
    /// computed from a newer revision
    async fn save_trust_contributions(&self, score: &TrustScore) -> Result<bool>;

    // ---- engagements ----

    async fn insert_engagement(&self, engagement: &ProjectEngagement) -> Result<()>;

    async fn get_engagement(&self, engagement_id: &str) -> Result<Option<ProjectEngagement>>;

    /// Conditional on the current status equaling `expected`
    async fn transition_engagement(
        &self,
        engagement_id: &str,
        expected: EngagementStatus,
        transition: &EngagementTransition,
    ) -> Result<bool>;

    // ---- reviews ----

    /// Apply `transition` and create `review` as one atomic step. Returns
    /// `false`, writing neither, when the engagement is no longer in `expected`.
    async fn open_peer_review(
        &self,
        engagement_id: &str,
        expected: EngagementStatus,
        transition: &EngagementTransition,
        review: &PeerReview,
    ) -> Result<bool>;

    async fn get_peer_review(&self, review_id: &str) -> Result<Option<PeerReview>>;

    /// ASSIGNED -> SUBMITTED, conditional on the review still being ASSIGNED
    async fn complete_peer_review(
        &self,
        review_id: &str,
        feedback: &PeerFeedback,
        at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Reviews in ASSIGNED status for a reviewer, oldest first
    async fn list_assigned_reviews(&self, reviewer_id: &str) -> Result<Vec<PeerReview>>;

    /// Apply the verdict `transition` and store `review` as one atomic step,
    /// conditional on the engagement being in `expected`
    async fn record_lecturer_verdict(
        &self,
        engagement_id: &str,
        expected: EngagementStatus,
        transition: &EngagementTransition,
        review: &LecturerReview,
    ) -> Result<bool>;

    async fn get_lecturer_review(&self, engagement_id: &str) -> Result<Option<LecturerReview>>;

    // ---- portfolios ----

    async fn get_portfolio(&self, student_id: &str) -> Result<Option<StudentPortfolioStatus>>;

    /// Create the portfolio if missing, then apply `mutate` while no other
    /// writer can touch the same student. Returns the stored result.
    async fn upsert_portfolio(
        &self,
        student_id: &str,
        at: DateTime<Utc>,
        mutate: PortfolioMutation,
    ) -> Result<StudentPortfolioStatus>;
}
