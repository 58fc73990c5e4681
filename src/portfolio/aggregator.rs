//! Portfolio Aggregator
//!
//! The only writer of student portfolios. Every change runs inside the
//! store's per-student upsert so concurrent verdicts for the same student
//! are applied one after the other.

use std::sync::Arc;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::database::Store;
use crate::error::{WorkflowError, WorkflowResult};
use crate::identity::normalize_tags;
use crate::portfolio::{StudentPortfolioStatus, TierThresholds, VerifiedProject};
use crate::review::{LecturerReview, ProjectEngagement};

pub struct PortfolioAggregator {
    store: Arc<dyn Store>,
    thresholds: TierThresholds,
    clock: Arc<dyn Clock>,
}

impl PortfolioAggregator {
    pub fn new(store: Arc<dyn Store>, thresholds: TierThresholds, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            thresholds,
            clock,
        }
    }

    pub fn thresholds(&self) -> &TierThresholds {
        &self.thresholds
    }

    pub async fn get_portfolio(&self, student_id: &str) -> WorkflowResult<StudentPortfolioStatus> {
        self.store
            .get_portfolio(student_id)
            .await?
            .ok_or_else(|| WorkflowError::not_found("portfolio", student_id))
    }

    /// Creates the portfolio on a student's first engagement
    pub async fn record_engagement_started(
        &self,
        student_id: &str,
    ) -> WorkflowResult<StudentPortfolioStatus> {
        let now = self.clock.now();
        let portfolio = self
            .store
            .upsert_portfolio(
                student_id,
                now,
                Box::new(move |p| {
                    p.stats.engagements_started += 1;
                    p.updated_at = now;
                }),
            )
            .await?;
        Ok(portfolio)
    }

    pub async fn record_rejection(&self, student_id: &str) -> WorkflowResult<StudentPortfolioStatus> {
        let now = self.clock.now();
        let portfolio = self
            .store
            .upsert_portfolio(
                student_id,
                now,
                Box::new(move |p| {
                    p.stats.rejected_count += 1;
                    p.updated_at = now;
                }),
            )
            .await?;
        Ok(portfolio)
    }

    /// Fold a VERIFIED engagement into its student's portfolio
    pub async fn record_verification(
        &self,
        engagement: &ProjectEngagement,
        review: &LecturerReview,
    ) -> WorkflowResult<StudentPortfolioStatus> {
        let project = VerifiedProject {
            engagement_id: engagement.engagement_id.clone(),
            title: engagement.title.clone(),
            tier: engagement.tier,
            track: engagement.track,
            tech_stack: normalize_tags(&engagement.tech_stack),
            average_score: review.average_score,
            institution: review.institution.clone(),
            verified_at: review.reviewed_at,
        };
        let thresholds = self.thresholds.clone();
        let engagement_id = engagement.engagement_id.clone();

        let portfolio = self
            .store
            .upsert_portfolio(
                &engagement.student_id,
                self.clock.now(),
                Box::new(move |p| {
                    p.add_verified_project(project, &thresholds);
                }),
            )
            .await?;

        if !portfolio.has_project(&engagement_id) {
            return Err(WorkflowError::Internal(anyhow::anyhow!(
                "portfolio for {} missing verified engagement {} after upsert",
                engagement.student_id,
                engagement_id
            )));
        }

        let unlocked = portfolio
            .tier_progression_timeline
            .last()
            .filter(|unlock| unlock.unlocked_at == review.reviewed_at && unlock.tier == portfolio.current_tier);
        if let Some(unlock) = unlocked {
            info!(
                student_id = %engagement.student_id,
                tier = unlock.tier.as_str(),
                "Student tier unlocked"
            );
        }

        debug!(
            student_id = %engagement.student_id,
            engagement_id = %engagement.engagement_id,
            verified_projects = portfolio.verified_projects.len(),
            strength = portfolio.portfolio_strength.as_str(),
            "Portfolio updated"
        );

        Ok(portfolio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::database::MemoryStore;
    use crate::review::{
        EngagementStatus, Rubric, RubricEntry, StudentTier, Track, Verdict,
    };
    use chrono::Utc;

    fn engagement(id: &str, student: &str) -> ProjectEngagement {
        ProjectEngagement {
            engagement_id: id.to_string(),
            student_id: student.to_string(),
            title: format!("Project {}", id),
            track: Track::OpenSource,
            tier: StudentTier::Beginner,
            tech_stack: vec!["Rust".to_string(), "Postgres".to_string()],
            status: EngagementStatus::Verified,
            peer_review_id: None,
            submission: None,
            created_at: Utc::now(),
            submitted_at: None,
            completed_at: None,
        }
    }

    fn review(engagement_id: &str) -> LecturerReview {
        let entry = RubricEntry::new(4, "fine");
        LecturerReview {
            review_id: format!("lr_{}", engagement_id),
            engagement_id: engagement_id.to_string(),
            lecturer_id: "lecturer_1".to_string(),
            institution: Some("University of Nairobi".to_string()),
            rubric: Rubric {
                technical_quality: entry.clone(),
                problem_solving: entry.clone(),
                documentation: entry.clone(),
                professionalism: entry,
            },
            verdict: Verdict::Verified,
            overall_comments: None,
            average_score: 4.0,
            reviewed_at: Utc::now(),
        }
    }

    fn aggregator() -> PortfolioAggregator {
        PortfolioAggregator::new(
            Arc::new(MemoryStore::new()),
            TierThresholds::default(),
            Arc::new(SystemClock),
        )
    }

    #[tokio::test]
    async fn test_sequential_verifications_accumulate() {
        let aggregator = aggregator();

        aggregator
            .record_verification(&engagement("e1", "student_1"), &review("e1"))
            .await
            .unwrap();
        let portfolio = aggregator
            .record_verification(&engagement("e2", "student_1"), &review("e2"))
            .await
            .unwrap();

        assert_eq!(portfolio.verified_projects.len(), 2);
        assert_eq!(portfolio.stats.verified_count, 2);
        assert_eq!(portfolio.current_tier, StudentTier::Intermediate);
        assert_eq!(
            portfolio.verified_projects[0].institution.as_deref(),
            Some("University of Nairobi")
        );
        let skills: Vec<&str> = portfolio.verified_skills.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(skills, vec!["rust", "postgres"]);
    }

    #[tokio::test]
    async fn test_replayed_verification_does_not_duplicate() {
        let aggregator = aggregator();
        let e1 = engagement("e1", "student_1");

        aggregator.record_verification(&e1, &review("e1")).await.unwrap();
        let portfolio = aggregator.record_verification(&e1, &review("e1")).await.unwrap();
        assert_eq!(portfolio.verified_projects.len(), 1);
    }

    #[tokio::test]
    async fn test_counters_upsert_portfolio() {
        let aggregator = aggregator();
        assert!(matches!(
            aggregator.get_portfolio("student_9").await,
            Err(WorkflowError::NotFound { .. })
        ));

        aggregator.record_engagement_started("student_9").await.unwrap();
        aggregator.record_engagement_started("student_9").await.unwrap();
        let portfolio = aggregator.record_rejection("student_9").await.unwrap();

        assert_eq!(portfolio.stats.engagements_started, 2);
        assert_eq!(portfolio.stats.rejected_count, 1);
        assert!(portfolio.verified_projects.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_verifications_keep_every_project() {
        let aggregator = Arc::new(aggregator());

        let mut handles = Vec::new();
        for i in 0..16 {
            let aggregator = aggregator.clone();
            handles.push(tokio::spawn(async move {
                let id = format!("e{}", i);
                aggregator
                    .record_verification(&engagement(&id, "student_1"), &review(&id))
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let portfolio = aggregator.get_portfolio("student_1").await.unwrap();
        assert_eq!(portfolio.verified_projects.len(), 16);
        assert_eq!(portfolio.stats.verified_count, 16);
        for i in 0..16 {
            assert!(portfolio.has_project(&format!("e{}", i)));
        }
    }
}
