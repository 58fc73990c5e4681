//! In-process store backed by concurrent hash maps
//!
//! Used by tests and by deployments without PostgreSQL. Conditional writes
//! hold the entry's shard lock for the compare and the write, which gives the
//! same guarantees as the row-level checks in the SQL store.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::database::{CandidateQuery, PortfolioMutation, ReviewerCandidate, Store};
use crate::identity::{Role, UserProfile};
use crate::portfolio::StudentPortfolioStatus;
use crate::reputation::{
    CounterDelta, TrustScore, VerificationDecision, VerificationRequest, VerificationStatus,
};
use crate::review::{
    EngagementStatus, EngagementTransition, LecturerReview, PeerFeedback, PeerReview,
    PeerReviewStatus, ProjectEngagement, StudentTier,
};

#[derive(Default)]
pub struct MemoryStore {
    users: DashMap<String, UserProfile>,
    verifications: DashMap<String, VerificationRequest>,
    trust_scores: DashMap<String, TrustScore>,
    engagements: DashMap<String, ProjectEngagement>,
    peer_reviews: DashMap<String, PeerReview>,
    /// Keyed by engagement id
    lecturer_reviews: DashMap<String, LecturerReview>,
    portfolios: DashMap<String, StudentPortfolioStatus>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn upsert_user(&self, profile: &UserProfile) -> Result<()> {
        self.users.insert(profile.user_id.clone(), profile.clone());
        Ok(())
    }

    async fn get_user(&self, user_id: &str) -> Result<Option<UserProfile>> {
        Ok(self.users.get(user_id).map(|u| u.clone()))
    }

    async fn find_reviewer_candidates(
        &self,
        query: &CandidateQuery,
    ) -> Result<Vec<ReviewerCandidate>> {
        let students: Vec<UserProfile> = self
            .users
            .iter()
            .filter(|u| u.role == Role::Student)
            .map(|u| u.clone())
            .collect();

        let mut candidates: Vec<ReviewerCandidate> = students
            .into_iter()
            .filter_map(|user| {
                let tier = self
                    .portfolios
                    .get(&user.user_id)
                    .map(|p| p.current_tier)
                    .unwrap_or(StudentTier::Beginner);
                query
                    .matches(&user.user_id, tier, &user.tech_stack)
                    .then(|| ReviewerCandidate {
                        user_id: user.user_id,
                        tier,
                        tech_stack: user.tech_stack,
                    })
            })
            .collect();
        candidates.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        Ok(candidates)
    }

    async fn submit_verification(
        &self,
        farmer_id: &str,
        documents: &[String],
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let request = VerificationRequest::pending(farmer_id.to_string(), documents.to_vec(), at);
        match self.verifications.entry(farmer_id.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(request);
                Ok(true)
            }
            Entry::Occupied(mut slot) => {
                if slot.get().status != VerificationStatus::Rejected {
                    return Ok(false);
                }
                slot.insert(request);
                Ok(true)
            }
        }
    }

    async fn get_verification(&self, farmer_id: &str) -> Result<Option<VerificationRequest>> {
        Ok(self.verifications.get(farmer_id).map(|v| v.clone()))
    }

    async fn transition_verification(
        &self,
        farmer_id: &str,
        expected: VerificationStatus,
        decision: &VerificationDecision,
    ) -> Result<bool> {
        match self.verifications.get_mut(farmer_id) {
            Some(mut request) if request.status == expected => {
                request.apply(decision);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn insert_trust_score(&self, score: &TrustScore) -> Result<bool> {
        match self.trust_scores.entry(score.farmer_id.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(score.clone());
                Ok(true)
            }
            Entry::Occupied(_) => Ok(false),
        }
    }

    async fn get_trust_score(&self, farmer_id: &str) -> Result<Option<TrustScore>> {
        Ok(self.trust_scores.get(farmer_id).map(|s| s.clone()))
    }

    async fn increment_trust_counters(
        &self,
        farmer_id: &str,
        delta: &CounterDelta,
    ) -> Result<Option<TrustScore>> {
        Ok(self.trust_scores.get_mut(farmer_id).map(|mut score| {
            score.counters.apply(delta);
            score.revision += 1;
            score.clone()
        }))
    }

    async fn save_trust_contributions(&self, score: &TrustScore) -> Result<bool> {
        match self.trust_scores.get_mut(&score.farmer_id) {
            Some(mut stored) if stored.scored_revision <= score.scored_revision => {
                stored.apply(&score.breakdown(), score.scored_revision, score.updated_at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn insert_engagement(&self, engagement: &ProjectEngagement) -> Result<()> {
        self.engagements
            .insert(engagement.engagement_id.clone(), engagement.clone());
        Ok(())
    }

    async fn get_engagement(&self, engagement_id: &str) -> Result<Option<ProjectEngagement>> {
        Ok(self.engagements.get(engagement_id).map(|e| e.clone()))
    }

    async fn transition_engagement(
        &self,
        engagement_id: &str,
        expected: EngagementStatus,
        transition: &EngagementTransition,
    ) -> Result<bool> {
        match self.engagements.get_mut(engagement_id) {
            Some(mut engagement) if engagement.status == expected => {
                engagement.apply(transition);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn open_peer_review(
        &self,
        engagement_id: &str,
        expected: EngagementStatus,
        transition: &EngagementTransition,
        review: &PeerReview,
    ) -> Result<bool> {
        // The review lands while the engagement shard is still held
        match self.engagements.get_mut(engagement_id) {
            Some(mut engagement) if engagement.status == expected => {
                self.peer_reviews
                    .insert(review.review_id.clone(), review.clone());
                engagement.apply(transition);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn get_peer_review(&self, review_id: &str) -> Result<Option<PeerReview>> {
        Ok(self.peer_reviews.get(review_id).map(|r| r.clone()))
    }

    async fn complete_peer_review(
        &self,
        review_id: &str,
        feedback: &PeerFeedback,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        match self.peer_reviews.get_mut(review_id) {
            Some(mut review) if review.status == PeerReviewStatus::Assigned => {
                review.complete(feedback, at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_assigned_reviews(&self, reviewer_id: &str) -> Result<Vec<PeerReview>> {
        let mut reviews: Vec<PeerReview> = self
            .peer_reviews
            .iter()
            .filter(|r| {
                r.status == PeerReviewStatus::Assigned
                    && r.reviewer_id.as_deref() == Some(reviewer_id)
            })
            .map(|r| r.clone())
            .collect();
        reviews.sort_by(|a, b| {
            a.assigned_at
                .cmp(&b.assigned_at)
                .then_with(|| a.review_id.cmp(&b.review_id))
        });
        Ok(reviews)
    }

    async fn record_lecturer_verdict(
        &self,
        engagement_id: &str,
        expected: EngagementStatus,
        transition: &EngagementTransition,
        review: &LecturerReview,
    ) -> Result<bool> {
        match self.engagements.get_mut(engagement_id) {
            Some(mut engagement) if engagement.status == expected => {
                self.lecturer_reviews
                    .insert(engagement_id.to_string(), review.clone());
                engagement.apply(transition);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn get_lecturer_review(&self, engagement_id: &str) -> Result<Option<LecturerReview>> {
        Ok(self.lecturer_reviews.get(engagement_id).map(|r| r.clone()))
    }

    async fn get_portfolio(&self, student_id: &str) -> Result<Option<StudentPortfolioStatus>> {
        Ok(self.portfolios.get(student_id).map(|p| p.clone()))
    }

    async fn upsert_portfolio(
        &self,
        student_id: &str,
        at: DateTime<Utc>,
        mutate: PortfolioMutation,
    ) -> Result<StudentPortfolioStatus> {
        let mut portfolio = self
            .portfolios
            .entry(student_id.to_string())
            .or_insert_with(|| StudentPortfolioStatus::new(student_id.to_string(), at));
        mutate(portfolio.value_mut());
        Ok(portfolio.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::review::Track;

    fn engagement(id: &str) -> ProjectEngagement {
        ProjectEngagement {
            engagement_id: id.to_string(),
            student_id: "student_1".to_string(),
            title: "Market price bot".to_string(),
            track: Track::AiBrief,
            tier: StudentTier::Beginner,
            tech_stack: Vec::new(),
            status: EngagementStatus::InProgress,
            peer_review_id: None,
            submission: None,
            created_at: Utc::now(),
            submitted_at: None,
            completed_at: None,
        }
    }

    #[tokio::test]
    async fn test_engagement_transition_is_conditional() {
        let store = MemoryStore::new();
        store.insert_engagement(&engagement("e1")).await.unwrap();
        let to_lecturer = EngagementTransition::to(EngagementStatus::UnderLecturerReview, Utc::now());

        assert!(store
            .transition_engagement("e1", EngagementStatus::InProgress, &to_lecturer)
            .await
            .unwrap());
        assert!(!store
            .transition_engagement("e1", EngagementStatus::InProgress, &to_lecturer)
            .await
            .unwrap());
        assert!(!store
            .transition_engagement("missing", EngagementStatus::InProgress, &to_lecturer)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_verification_resubmission_only_after_rejection() {
        let store = MemoryStore::new();
        let docs = vec!["national_id.jpg".to_string()];
        assert!(store.submit_verification("farmer_1", &docs, Utc::now()).await.unwrap());
        assert!(!store.submit_verification("farmer_1", &docs, Utc::now()).await.unwrap());

        let rejection = VerificationDecision {
            status: VerificationStatus::Rejected,
            reviewed_by: "admin_1".to_string(),
            reviewed_at: Utc::now(),
            rejection_reason: Some("blurry scan".to_string()),
        };
        assert!(store
            .transition_verification("farmer_1", VerificationStatus::Pending, &rejection)
            .await
            .unwrap());
        assert!(store.submit_verification("farmer_1", &docs, Utc::now()).await.unwrap());

        let request = store.get_verification("farmer_1").await.unwrap().unwrap();
        assert_eq!(request.status, VerificationStatus::Pending);
        assert_eq!(request.rejection_reason, None);
    }

    #[tokio::test]
    async fn test_stale_contributions_are_not_saved() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store
            .insert_trust_score(&TrustScore::new_verified("farmer_1".to_string(), now))
            .await
            .unwrap();

        let first = store
            .increment_trust_counters("farmer_1", &CounterDelta::order_completed(100.0))
            .await
            .unwrap()
            .unwrap();
        let second = store
            .increment_trust_counters("farmer_1", &CounterDelta::order_completed(100.0))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.revision, 2);

        let mut newer = second.clone();
        newer.scored_revision = second.revision;
        newer.transaction_contribution = 5;
        assert!(store.save_trust_contributions(&newer).await.unwrap());

        let mut older = first.clone();
        older.scored_revision = first.revision;
        older.transaction_contribution = 3;
        assert!(!store.save_trust_contributions(&older).await.unwrap());

        let stored = store.get_trust_score("farmer_1").await.unwrap().unwrap();
        assert_eq!(stored.transaction_contribution, 5);
        assert_eq!(stored.counters.completed_orders, 2);
    }

    async fn open(store: &MemoryStore, review: PeerReview) -> bool {
        store
            .insert_engagement(&engagement(&review.engagement_id))
            .await
            .unwrap();
        let transition = EngagementTransition {
            peer_review_id: Some(review.review_id.clone()),
            ..EngagementTransition::to(EngagementStatus::UnderPeerReview, review.assigned_at)
        };
        store
            .open_peer_review(&review.engagement_id, EngagementStatus::InProgress, &transition, &review)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_open_peer_review_writes_both_or_neither() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let review = PeerReview::assigned("r1".to_string(), "e1".to_string(), "peer_1".to_string(), now);
        assert!(open(&store, review).await);

        let stored = store.get_engagement("e1").await.unwrap().unwrap();
        assert_eq!(stored.status, EngagementStatus::UnderPeerReview);
        assert_eq!(stored.peer_review_id.as_deref(), Some("r1"));
        assert!(store.get_peer_review("r1").await.unwrap().is_some());

        // Engagement has moved on, so the second review is never stored
        let late = PeerReview::assigned("r2".to_string(), "e1".to_string(), "peer_2".to_string(), now);
        let transition = EngagementTransition {
            peer_review_id: Some("r2".to_string()),
            ..EngagementTransition::to(EngagementStatus::UnderPeerReview, now)
        };
        assert!(!store
            .open_peer_review("e1", EngagementStatus::InProgress, &transition, &late)
            .await
            .unwrap());
        assert!(store.get_peer_review("r2").await.unwrap().is_none());
        assert_eq!(
            store.get_engagement("e1").await.unwrap().unwrap().peer_review_id.as_deref(),
            Some("r1")
        );
    }

    #[tokio::test]
    async fn test_assigned_reviews_oldest_first() {
        let store = MemoryStore::new();
        let start = Utc::now();
        for (i, id) in ["r_b", "r_a", "r_c"].iter().enumerate() {
            assert!(
                open(
                    &store,
                    PeerReview::assigned(
                        id.to_string(),
                        format!("e_{}", id),
                        "peer_1".to_string(),
                        start + chrono::Duration::minutes(i as i64),
                    ),
                )
                .await
            );
        }
        assert!(open(&store, PeerReview::waived("r_w".to_string(), "e_w".to_string(), start)).await);

        let ids: Vec<String> = store
            .list_assigned_reviews("peer_1")
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.review_id)
            .collect();
        assert_eq!(ids, vec!["r_b", "r_a", "r_c"]);
    }
}
