//! Engagement Review Workflow
//!
//! ```text
//! IN_PROGRESS ──submit──► UNDER_PEER_REVIEW ──peer review──► UNDER_LECTURER_REVIEW
//!      │                                                          │
//!      └──submit, no eligible reviewer (waived)──────────────────►│
//!                                                                 ▼
//!                                                     VERIFIED | REJECTED
//! ```
//!
//! Every transition checks the source status up front and then writes
//! conditionally on it, so a racing request either sees the wrong status
//! (`InvalidStateTransition`) or loses the write (`Conflict`).

use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::database::Store;
use crate::error::{WorkflowError, WorkflowResult};
use crate::identity::{normalize_tags, Actor, Role};
use crate::notify::Notifier;
use crate::portfolio::{PortfolioAggregator, StudentPortfolioStatus};
use crate::review::{
    EngagementStatus, EngagementTransition, LecturerDecision, LecturerReview, PeerFeedback,
    PeerReview, PeerReviewStatus, ProjectBrief, ProjectEngagement, ReviewerRouter, Submission,
};

pub const MIN_RUBRIC_COMMENT_WORDS: usize = 50;

/// Result of a student submission
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionOutcome {
    pub engagement: ProjectEngagement,
    pub peer_review: PeerReview,
}

impl SubmissionOutcome {
    pub fn waived(&self) -> bool {
        self.peer_review.status == PeerReviewStatus::Waived
    }
}

/// Result of a lecturer decision
#[derive(Debug, Clone, PartialEq)]
pub struct VerdictOutcome {
    pub engagement: ProjectEngagement,
    pub review: LecturerReview,
    pub portfolio: StudentPortfolioStatus,
}

pub struct EngagementWorkflow {
    store: Arc<dyn Store>,
    router: ReviewerRouter,
    portfolio: Arc<PortfolioAggregator>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    min_comment_words: usize,
}

impl EngagementWorkflow {
    pub fn new(
        store: Arc<dyn Store>,
        router: ReviewerRouter,
        portfolio: Arc<PortfolioAggregator>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            router,
            portfolio,
            notifier,
            clock,
            min_comment_words: MIN_RUBRIC_COMMENT_WORDS,
        }
    }

    pub fn with_min_comment_words(mut self, words: usize) -> Self {
        self.min_comment_words = words;
        self
    }

    pub fn portfolio(&self) -> &PortfolioAggregator {
        &self.portfolio
    }

    pub async fn get_engagement(&self, engagement_id: &str) -> WorkflowResult<ProjectEngagement> {
        self.store
            .get_engagement(engagement_id)
            .await?
            .ok_or_else(|| WorkflowError::not_found("engagement", engagement_id))
    }

    /// Peer review attached to an engagement, if it has been submitted
    pub async fn get_peer_review(&self, engagement_id: &str) -> WorkflowResult<Option<PeerReview>> {
        let engagement = self.get_engagement(engagement_id).await?;
        match engagement.peer_review_id {
            Some(review_id) => Ok(self.store.get_peer_review(&review_id).await?),
            None => Ok(None),
        }
    }

    pub async fn get_lecturer_review(&self, engagement_id: &str) -> WorkflowResult<Option<LecturerReview>> {
        Ok(self.store.get_lecturer_review(engagement_id).await?)
    }

    /// Reviews waiting on the calling reviewer
    pub async fn assigned_reviews(&self, actor: &Actor) -> WorkflowResult<Vec<PeerReview>> {
        Ok(self.store.list_assigned_reviews(&actor.user_id).await?)
    }

    /// A student opens a new engagement at their current tier
    pub async fn start_engagement(
        &self,
        actor: &Actor,
        brief: ProjectBrief,
    ) -> WorkflowResult<ProjectEngagement> {
        if actor.role != Role::Student {
            return Err(WorkflowError::Forbidden(format!(
                "user {} is not a student",
                actor.user_id
            )));
        }
        let title = brief.title.trim();
        if title.is_empty() {
            return Err(WorkflowError::ValidationFailed(
                "project title must not be empty".to_string(),
            ));
        }

        let portfolio = self.portfolio.record_engagement_started(&actor.user_id).await?;
        let engagement = ProjectEngagement {
            engagement_id: Uuid::new_v4().to_string(),
            student_id: actor.user_id.clone(),
            title: title.to_string(),
            track: brief.track,
            tier: portfolio.current_tier,
            tech_stack: normalize_tags(&brief.tech_stack),
            status: EngagementStatus::InProgress,
            peer_review_id: None,
            submission: None,
            created_at: self.clock.now(),
            submitted_at: None,
            completed_at: None,
        };
        self.store.insert_engagement(&engagement).await?;

        info!(
            engagement_id = %engagement.engagement_id,
            student_id = %engagement.student_id,
            tier = engagement.tier.as_str(),
            track = engagement.track.as_str(),
            "Engagement started"
        );
        Ok(engagement)
    }

    /// IN_PROGRESS -> UNDER_PEER_REVIEW, or straight to UNDER_LECTURER_REVIEW
    /// when no reviewer is eligible
    pub async fn submit_for_review(
        &self,
        actor: &Actor,
        engagement_id: &str,
        submission: Submission,
    ) -> WorkflowResult<SubmissionOutcome> {
        if submission.repository_url.trim().is_empty() {
            return Err(WorkflowError::ValidationFailed(
                "repository url must not be empty".to_string(),
            ));
        }

        let mut engagement = self.get_engagement(engagement_id).await?;
        if !actor.is(&engagement.student_id) {
            return Err(WorkflowError::Forbidden(format!(
                "only the owning student may submit engagement {}",
                engagement_id
            )));
        }
        expect_status(&engagement, EngagementStatus::InProgress)?;

        let reviewer = self.router.assign_reviewer(&engagement).await?;
        let now = self.clock.now();
        let review_id = Uuid::new_v4().to_string();

        let (target, peer_review) = match reviewer {
            Some(reviewer_id) => (
                EngagementStatus::UnderPeerReview,
                PeerReview::assigned(review_id.clone(), engagement_id.to_string(), reviewer_id, now),
            ),
            None => (
                EngagementStatus::UnderLecturerReview,
                PeerReview::waived(review_id.clone(), engagement_id.to_string(), now),
            ),
        };

        let transition = EngagementTransition {
            to: target,
            peer_review_id: Some(review_id),
            submission: Some(submission),
            at: now,
        };
        if !self
            .store
            .open_peer_review(engagement_id, EngagementStatus::InProgress, &transition, &peer_review)
            .await?
        {
            return Err(WorkflowError::conflict("engagement", engagement_id));
        }
        engagement.apply(&transition);

        info!(
            engagement_id = %engagement_id,
            status = engagement.status.as_str(),
            peer_review = peer_review.status.as_str(),
            "Engagement submitted for review"
        );

        if let Some(reviewer_id) = &peer_review.reviewer_id {
            self.notify_user(
                reviewer_id,
                &format!("You have been asked to peer review \"{}\".", engagement.title),
            )
            .await;
        }

        Ok(SubmissionOutcome {
            engagement,
            peer_review,
        })
    }

    /// UNDER_PEER_REVIEW -> UNDER_LECTURER_REVIEW by the assigned reviewer
    pub async fn submit_peer_review(
        &self,
        actor: &Actor,
        engagement_id: &str,
        feedback: PeerFeedback,
    ) -> WorkflowResult<PeerReview> {
        let engagement = self.get_engagement(engagement_id).await?;
        if actor.is(&engagement.student_id) {
            return Err(WorkflowError::Forbidden(
                "students may not peer review their own engagement".to_string(),
            ));
        }
        expect_status(&engagement, EngagementStatus::UnderPeerReview)?;

        let mut review = match &engagement.peer_review_id {
            Some(review_id) => self.store.get_peer_review(review_id).await?,
            None => None,
        }
        .filter(|review| review.status == PeerReviewStatus::Assigned)
        .ok_or_else(|| WorkflowError::not_found("assigned peer review", engagement_id))?;

        if review.reviewer_id.as_deref() != Some(actor.user_id.as_str()) {
            return Err(WorkflowError::Forbidden(format!(
                "user {} is not the assigned reviewer for engagement {}",
                actor.user_id, engagement_id
            )));
        }
        feedback.validate().map_err(WorkflowError::ValidationFailed)?;

        let now = self.clock.now();
        self.transition(
            &engagement,
            EngagementStatus::UnderPeerReview,
            &EngagementTransition::to(EngagementStatus::UnderLecturerReview, now),
        )
        .await?;

        if !self
            .store
            .complete_peer_review(&review.review_id, &feedback, now)
            .await?
        {
            warn!(
                engagement_id = %engagement_id,
                review_id = %review.review_id,
                "Peer review changed after engagement advanced"
            );
            return Err(WorkflowError::conflict("peer review", review.review_id));
        }
        review.complete(&feedback, now);

        info!(
            engagement_id = %engagement_id,
            reviewer_id = %actor.user_id,
            "Peer review submitted"
        );
        Ok(review)
    }

    /// UNDER_LECTURER_REVIEW -> VERIFIED | REJECTED
    ///
    /// Calling again on a VERIFIED engagement whose portfolio update failed
    /// completes that update from the stored review.
    pub async fn submit_lecturer_review(
        &self,
        actor: &Actor,
        engagement_id: &str,
        decision: LecturerDecision,
    ) -> WorkflowResult<VerdictOutcome> {
        if actor.role != Role::Lecturer {
            return Err(WorkflowError::Forbidden(format!(
                "user {} is not a lecturer",
                actor.user_id
            )));
        }

        let mut engagement = self.get_engagement(engagement_id).await?;
        if engagement.status == EngagementStatus::Verified {
            if let Some(outcome) = self.resume_verification(engagement.clone()).await? {
                return Ok(outcome);
            }
        }
        expect_status(&engagement, EngagementStatus::UnderLecturerReview)?;
        decision
            .rubric
            .validate(self.min_comment_words)
            .map_err(WorkflowError::ValidationFailed)?;

        let institution = self
            .store
            .get_user(&actor.user_id)
            .await?
            .and_then(|lecturer| lecturer.institution);
        let now = self.clock.now();
        let target = decision.verdict.status();

        let review = LecturerReview {
            review_id: Uuid::new_v4().to_string(),
            engagement_id: engagement_id.to_string(),
            lecturer_id: actor.user_id.clone(),
            institution,
            average_score: decision.rubric.average_score(),
            rubric: decision.rubric,
            verdict: decision.verdict,
            overall_comments: decision.overall_comments,
            reviewed_at: now,
        };
        let transition = EngagementTransition::to(target, now);
        if !self
            .store
            .record_lecturer_verdict(
                engagement_id,
                EngagementStatus::UnderLecturerReview,
                &transition,
                &review,
            )
            .await?
        {
            return Err(WorkflowError::conflict("engagement", engagement_id));
        }
        engagement.apply(&transition);

        let portfolio = match target {
            EngagementStatus::Verified => {
                self.portfolio
                    .record_verification(&engagement, &review)
                    .await?
            }
            _ => self.portfolio.record_rejection(&engagement.student_id).await?,
        };

        info!(
            engagement_id = %engagement_id,
            lecturer_id = %actor.user_id,
            verdict = target.as_str(),
            average_score = review.average_score,
            "Lecturer review recorded"
        );

        self.notify_verdict(&engagement).await;

        Ok(VerdictOutcome {
            engagement,
            review,
            portfolio,
        })
    }

    /// A VERIFIED engagement whose portfolio update never landed is finished
    /// from the stored lecturer review. `None` when there is nothing to replay.
    async fn resume_verification(
        &self,
        engagement: ProjectEngagement,
    ) -> WorkflowResult<Option<VerdictOutcome>> {
        let review = match self.store.get_lecturer_review(&engagement.engagement_id).await? {
            Some(review) => review,
            None => return Ok(None),
        };
        let recorded = self
            .store
            .get_portfolio(&engagement.student_id)
            .await?
            .map_or(false, |p| p.has_project(&engagement.engagement_id));
        if recorded {
            return Ok(None);
        }

        let portfolio = self.portfolio.record_verification(&engagement, &review).await?;
        warn!(
            engagement_id = %engagement.engagement_id,
            student_id = %engagement.student_id,
            "Replayed portfolio update for verified engagement"
        );
        self.notify_verdict(&engagement).await;

        Ok(Some(VerdictOutcome {
            engagement,
            review,
            portfolio,
        }))
    }

    async fn notify_verdict(&self, engagement: &ProjectEngagement) {
        self.notify_user(
            &engagement.student_id,
            &format!(
                "Your project \"{}\" was {}.",
                engagement.title,
                engagement.status.as_str().to_lowercase()
            ),
        )
        .await;
    }

    async fn transition(
        &self,
        engagement: &ProjectEngagement,
        expected: EngagementStatus,
        transition: &EngagementTransition,
    ) -> WorkflowResult<()> {
        if self
            .store
            .transition_engagement(&engagement.engagement_id, expected, transition)
            .await?
        {
            Ok(())
        } else {
            Err(WorkflowError::conflict(
                "engagement",
                engagement.engagement_id.clone(),
            ))
        }
    }

    /// Notification failures never surface to the caller
    async fn notify_user(&self, user_id: &str, message: &str) {
        match self.store.get_user(user_id).await {
            Ok(Some(user)) => {
                if let Some(contact) = user.contact {
                    self.notifier.send(&contact, message);
                }
            }
            Ok(None) => {}
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Skipping notification, user lookup failed");
            }
        }
    }
}

fn expect_status(engagement: &ProjectEngagement, expected: EngagementStatus) -> WorkflowResult<()> {
    if engagement.status == expected {
        Ok(())
    } else {
        Err(WorkflowError::invalid_transition(
            "engagement",
            engagement.engagement_id.clone(),
            expected,
            engagement.status,
        ))
    }
}
