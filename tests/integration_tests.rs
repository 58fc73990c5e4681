//! Integration tests for TrustBridge
//!
//! These tests drive the engines end to end over the in-memory store:
//! farmer verification, trust events, the engagement review workflow,
//! portfolio progression and concurrent transitions.

use chrono::{Duration, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use trustbridge::identity::UserProfile;
use trustbridge::notify::RecordingNotifier;
use trustbridge::review::{
    LecturerDecision, PeerFeedback, PeerReviewStatus, PeerScores, Rubric, RubricEntry, Track,
    Verdict,
};
use trustbridge::{
    Actor, Clock, EngagementStatus, EngagementWorkflow, FarmerTier, ManualClock, MemoryStore,
    PortfolioAggregator, PortfolioStrength, ProjectBrief, ReviewerRouter, Role, ScoringParams,
    Store, StudentPortfolioStatus, StudentTier, Submission, TierThresholds, TrustEvent,
    TrustScoreManager, VerificationGate, VerificationStatus, WorkflowError,
};

// ============================================================================
// Test Helpers
// ============================================================================

struct Platform {
    store: Arc<MemoryStore>,
    clock: Arc<ManualClock>,
    notifier: Arc<RecordingNotifier>,
    gate: VerificationGate,
    trust: TrustScoreManager,
    workflow: EngagementWorkflow,
}

/// Build every engine over one shared in-memory store
fn create_platform(seed: u64) -> Platform {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let notifier = Arc::new(RecordingNotifier::default());

    let gate = VerificationGate::new(store.clone(), notifier.clone(), clock.clone());
    let trust = TrustScoreManager::new(store.clone(), ScoringParams::default(), clock.clone());
    let portfolio = Arc::new(PortfolioAggregator::new(
        store.clone(),
        TierThresholds::default(),
        clock.clone(),
    ));
    let router = ReviewerRouter::with_rng(store.clone(), 10, StdRng::seed_from_u64(seed));
    let workflow = EngagementWorkflow::new(
        store.clone(),
        router,
        portfolio,
        notifier.clone(),
        clock.clone(),
    );

    Platform {
        store,
        clock,
        notifier,
        gate,
        trust,
        workflow,
    }
}

fn admin() -> Actor {
    Actor::new("admin_1", Role::Admin)
}

fn lecturer() -> Actor {
    Actor::new("lecturer_1", Role::Lecturer)
}

async fn register_farmer(platform: &Platform, farmer_id: &str) {
    platform
        .store
        .upsert_user(
            &UserProfile::new(farmer_id, Role::Farmer, "Amina Njoroge").with_contact("+254700000001"),
        )
        .await
        .unwrap();
    assert!(platform
        .store
        .submit_verification(farmer_id, &["national_id".to_string()], platform.clock.now())
        .await
        .unwrap());
}

async fn register_student(platform: &Platform, student_id: &str, stack: &[&str]) {
    platform
        .store
        .upsert_user(
            &UserProfile::new(student_id, Role::Student, student_id)
                .with_contact(format!("{}@students.example.com", student_id))
                .with_tech_stack(stack),
        )
        .await
        .unwrap();
}

async fn register_lecturer(platform: &Platform) {
    platform
        .store
        .upsert_user(
            &UserProfile::new("lecturer_1", Role::Lecturer, "Dr. Kamau")
                .with_institution("Kenyatta University"),
        )
        .await
        .unwrap();
}

fn brief(title: &str) -> ProjectBrief {
    ProjectBrief {
        title: title.to_string(),
        track: Track::OpenSource,
        tech_stack: vec!["rust".to_string()],
    }
}

fn submission() -> Submission {
    Submission {
        repository_url: "https://git.example.com/student/project".to_string(),
        summary: "Working prototype with tests".to_string(),
    }
}

fn peer_feedback() -> PeerFeedback {
    PeerFeedback {
        scores: PeerScores {
            code_quality: 5,
            documentation: 4,
        },
        comments: "Clean module boundaries and a useful README.".to_string(),
    }
}

fn words(n: usize) -> String {
    vec!["detailed"; n].join(" ")
}

fn lecturer_decision(verdict: Verdict, score: u8, comment_words: usize) -> LecturerDecision {
    LecturerDecision {
        rubric: Rubric {
            technical_quality: RubricEntry::new(score, words(comment_words)),
            problem_solving: RubricEntry::new(score, words(comment_words)),
            documentation: RubricEntry::new(score, words(comment_words)),
            professionalism: RubricEntry::new(score, words(comment_words)),
        },
        verdict,
        overall_comments: Some("Good work overall".to_string()),
    }
}

/// Drive one engagement from start to a lecturer verdict
async fn complete_engagement(
    platform: &Platform,
    student: &Actor,
    title: &str,
    verdict: Verdict,
) -> trustbridge::review::VerdictOutcome {
    let engagement = platform
        .workflow
        .start_engagement(student, brief(title))
        .await
        .unwrap();
    let outcome = platform
        .workflow
        .submit_for_review(student, &engagement.engagement_id, submission())
        .await
        .unwrap();

    if let Some(reviewer_id) = outcome.peer_review.reviewer_id.clone() {
        platform
            .workflow
            .submit_peer_review(
                &Actor::new(reviewer_id, Role::Student),
                &engagement.engagement_id,
                peer_feedback(),
            )
            .await
            .unwrap();
    }

    platform
        .workflow
        .submit_lecturer_review(
            &lecturer(),
            &engagement.engagement_id,
            lecturer_decision(verdict, 4, 50),
        )
        .await
        .unwrap()
}

// ============================================================================
// Farmer Verification Tests
// ============================================================================

mod farmer_verification {
    use super::*;

    #[tokio::test]
    async fn test_approval_seeds_established_score() {
        let platform = create_platform(1);
        register_farmer(&platform, "farmer_1").await;

        let score = platform.gate.approve(&admin(), "farmer_1").await.unwrap();
        assert_eq!(score.verification_score, 40);
        assert_eq!(score.composite_score, 40);
        assert_eq!(score.tier(), FarmerTier::Established);

        let request = platform
            .store
            .get_verification("farmer_1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(request.status, VerificationStatus::Approved);
        assert_eq!(request.reviewed_by.as_deref(), Some("admin_1"));

        let sent = platform.notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "+254700000001");
    }

    #[tokio::test]
    async fn test_second_approval_is_invalid_transition() {
        let platform = create_platform(1);
        register_farmer(&platform, "farmer_1").await;

        platform.gate.approve(&admin(), "farmer_1").await.unwrap();
        let second = platform.gate.approve(&admin(), "farmer_1").await;
        assert!(matches!(
            second,
            Err(WorkflowError::InvalidStateTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_rejection_then_resubmission() {
        let platform = create_platform(1);
        register_farmer(&platform, "farmer_1").await;

        let empty = platform.gate.reject(&admin(), "farmer_1", "   ").await;
        assert!(matches!(empty, Err(WorkflowError::ValidationFailed(_))));

        let rejected = platform
            .gate
            .reject(&admin(), "farmer_1", "ID photo unreadable")
            .await
            .unwrap();
        assert_eq!(rejected.status, VerificationStatus::Rejected);
        assert!(platform.store.get_trust_score("farmer_1").await.unwrap().is_none());

        // Re-entry to PENDING happens through the store, then the gate can approve
        assert!(platform
            .store
            .submit_verification("farmer_1", &["national_id".to_string()], platform.clock.now())
            .await
            .unwrap());
        let score = platform.gate.approve(&admin(), "farmer_1").await.unwrap();
        assert_eq!(score.composite_score, 40);
    }

    #[tokio::test]
    async fn test_non_admin_and_unknown_farmer() {
        let platform = create_platform(1);
        register_farmer(&platform, "farmer_1").await;

        let buyer = Actor::new("buyer_1", Role::Buyer);
        assert!(matches!(
            platform.gate.approve(&buyer, "farmer_1").await,
            Err(WorkflowError::Forbidden(_))
        ));
        assert!(matches!(
            platform.gate.approve(&admin(), "farmer_404").await,
            Err(WorkflowError::NotFound { .. })
        ));
    }
}

// ============================================================================
// Trust Event Tests
// ============================================================================

mod trust_events {
    use super::*;

    async fn verified_platform() -> Platform {
        let platform = create_platform(1);
        register_farmer(&platform, "farmer_1").await;
        platform.gate.approve(&admin(), "farmer_1").await.unwrap();
        platform
    }

    #[tokio::test]
    async fn test_events_raise_composite() {
        let platform = verified_platform().await;

        let mut last = 40;
        for _ in 0..5 {
            platform
                .trust
                .record_event("farmer_1", TrustEvent::OrderCompleted { volume: 2_500.0 })
                .await
                .unwrap();
            let score = platform
                .trust
                .record_event("farmer_1", TrustEvent::DeliveryConfirmed { on_time: true })
                .await
                .unwrap();
            assert!(score.composite_score >= last);
            last = score.composite_score;
        }

        let score = platform
            .trust
            .record_event("farmer_1", TrustEvent::Rated { stars: 5 })
            .await
            .unwrap();
        assert_eq!(
            score.composite_score,
            score.verification_score
                + score.transaction_contribution
                + score.rating_contribution
                + score.reliability_contribution
        );
        assert_eq!(score.reliability_contribution, 15);
        assert!(score.rating_contribution < 20);
        assert!(score.tier() >= FarmerTier::Established);
    }

    #[tokio::test]
    async fn test_disputes_reduce_reliability() {
        let platform = verified_platform().await;
        platform
            .trust
            .record_event("farmer_1", TrustEvent::DeliveryConfirmed { on_time: true })
            .await
            .unwrap();

        let before = platform.trust.get_score("farmer_1").await.unwrap();
        let after = platform
            .trust
            .record_event("farmer_1", TrustEvent::DisputeRuledAgainst)
            .await
            .unwrap();
        assert!(after.reliability_contribution < before.reliability_contribution);
    }

    #[tokio::test]
    async fn test_events_require_a_score() {
        let platform = create_platform(1);
        let result = platform
            .trust
            .record_event("farmer_unverified", TrustEvent::Rated { stars: 4 })
            .await;
        assert!(matches!(result, Err(WorkflowError::NotFound { .. })));

        let platform = verified_platform().await;
        let bad = platform
            .trust
            .record_event("farmer_1", TrustEvent::Rated { stars: 6 })
            .await;
        assert!(matches!(bad, Err(WorkflowError::ValidationFailed(_))));
    }

    #[tokio::test]
    async fn test_recompute_is_idempotent() {
        let platform = verified_platform().await;
        platform
            .trust
            .record_event("farmer_1", TrustEvent::OrderCompleted { volume: 900.0 })
            .await
            .unwrap();

        let first = platform.trust.recompute("farmer_1").await.unwrap();
        let second = platform.trust.recompute("farmer_1").await.unwrap();
        assert_eq!(first.breakdown(), second.breakdown());
    }
}

// ============================================================================
// Engagement Workflow Tests
// ============================================================================

mod engagement_workflow {
    use super::*;

    async fn two_students() -> Platform {
        let platform = create_platform(11);
        register_student(&platform, "student_a", &["rust"]).await;
        register_student(&platform, "student_b", &["rust", "python"]).await;
        register_lecturer(&platform).await;
        platform
    }

    #[tokio::test]
    async fn test_verified_engagement_reaches_portfolio() {
        let platform = two_students().await;
        let student = Actor::new("student_a", Role::Student);

        let outcome = complete_engagement(&platform, &student, "Farm ledger", Verdict::Verified).await;
        assert_eq!(outcome.engagement.status, EngagementStatus::Verified);
        assert!(outcome.engagement.completed_at.is_some());
        assert_eq!(outcome.review.average_score, 4.0);

        let portfolio = platform.workflow.portfolio().get_portfolio("student_a").await.unwrap();
        assert_eq!(portfolio.verified_projects.len(), 1);
        assert_eq!(
            portfolio.verified_projects[0].institution.as_deref(),
            Some("Kenyatta University")
        );
        assert_eq!(portfolio.portfolio_strength, PortfolioStrength::Solid);
        assert_eq!(portfolio.stats.engagements_started, 1);
    }

    #[tokio::test]
    async fn test_peer_review_submitted_by_assigned_reviewer() {
        let platform = two_students().await;
        let student = Actor::new("student_a", Role::Student);
        let reviewer = Actor::new("student_b", Role::Student);

        let engagement = platform
            .workflow
            .start_engagement(&student, brief("Soil sensor dashboard"))
            .await
            .unwrap();
        let outcome = platform
            .workflow
            .submit_for_review(&student, &engagement.engagement_id, submission())
            .await
            .unwrap();
        assert_eq!(outcome.peer_review.reviewer_id.as_deref(), Some("student_b"));

        let queue = platform.workflow.assigned_reviews(&reviewer).await.unwrap();
        assert_eq!(queue.len(), 1);

        let own = platform
            .workflow
            .submit_peer_review(&student, &engagement.engagement_id, peer_feedback())
            .await;
        assert!(matches!(own, Err(WorkflowError::Forbidden(_))));

        let invalid = PeerFeedback {
            scores: PeerScores {
                code_quality: 0,
                documentation: 4,
            },
            comments: "ok".to_string(),
        };
        assert!(matches!(
            platform
                .workflow
                .submit_peer_review(&reviewer, &engagement.engagement_id, invalid)
                .await,
            Err(WorkflowError::ValidationFailed(_))
        ));

        platform.clock.advance(Duration::hours(2));
        let review = platform
            .workflow
            .submit_peer_review(&reviewer, &engagement.engagement_id, peer_feedback())
            .await
            .unwrap();
        assert_eq!(review.status, PeerReviewStatus::Submitted);
        assert!(platform.workflow.assigned_reviews(&reviewer).await.unwrap().is_empty());

        let current = platform
            .workflow
            .get_engagement(&engagement.engagement_id)
            .await
            .unwrap();
        assert_eq!(current.status, EngagementStatus::UnderLecturerReview);
        let stored = platform
            .workflow
            .get_peer_review(&engagement.engagement_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.scores.map(|s| s.code_quality), Some(5));
    }

    #[tokio::test]
    async fn test_short_rubric_leaves_engagement_unchanged() {
        let platform = two_students().await;
        let student = Actor::new("student_b", Role::Student);
        let engagement = platform
            .workflow
            .start_engagement(&student, brief("Price alerts"))
            .await
            .unwrap();
        let outcome = platform
            .workflow
            .submit_for_review(&student, &engagement.engagement_id, submission())
            .await
            .unwrap();
        platform
            .workflow
            .submit_peer_review(
                &Actor::new(outcome.peer_review.reviewer_id.unwrap(), Role::Student),
                &engagement.engagement_id,
                peer_feedback(),
            )
            .await
            .unwrap();

        let result = platform
            .workflow
            .submit_lecturer_review(
                &lecturer(),
                &engagement.engagement_id,
                lecturer_decision(Verdict::Verified, 5, 49),
            )
            .await;
        assert!(matches!(result, Err(WorkflowError::ValidationFailed(_))));

        let current = platform
            .workflow
            .get_engagement(&engagement.engagement_id)
            .await
            .unwrap();
        assert_eq!(current.status, EngagementStatus::UnderLecturerReview);
        assert!(platform.store.get_portfolio("student_b").await.unwrap().unwrap().verified_projects.is_empty());
    }

    #[tokio::test]
    async fn test_rejected_engagement_counts_rejection() {
        let platform = two_students().await;
        let student = Actor::new("student_a", Role::Student);

        let outcome = complete_engagement(&platform, &student, "Weather bot", Verdict::Rejected).await;
        assert_eq!(outcome.engagement.status, EngagementStatus::Rejected);
        assert_eq!(outcome.portfolio.stats.rejected_count, 1);
        assert!(outcome.portfolio.verified_projects.is_empty());

        let student_notices: Vec<_> = platform
            .notifier
            .sent()
            .into_iter()
            .filter(|(to, _)| to == "student_a@students.example.com")
            .collect();
        assert_eq!(student_notices.len(), 1);
    }
}

// ============================================================================
// Peer Review Waiver Tests
// ============================================================================

mod waiver {
    use super::*;

    #[tokio::test]
    async fn test_lone_student_is_waived() {
        let platform = create_platform(5);
        register_student(&platform, "student_a", &["rust"]).await;
        register_lecturer(&platform).await;
        let student = Actor::new("student_a", Role::Student);

        let engagement = platform
            .workflow
            .start_engagement(&student, brief("Solo project"))
            .await
            .unwrap();
        let outcome = platform
            .workflow
            .submit_for_review(&student, &engagement.engagement_id, submission())
            .await
            .unwrap();

        assert!(outcome.waived());
        assert_eq!(outcome.engagement.status, EngagementStatus::UnderLecturerReview);
        assert_eq!(outcome.peer_review.status, PeerReviewStatus::Waived);
        assert_eq!(outcome.peer_review.reviewer_id, None);

        let peer = platform
            .workflow
            .submit_peer_review(
                &Actor::new("someone", Role::Student),
                &engagement.engagement_id,
                peer_feedback(),
            )
            .await;
        assert!(matches!(
            peer,
            Err(WorkflowError::InvalidStateTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_beginner_cannot_review_advanced_work() {
        let platform = create_platform(5);
        register_student(&platform, "senior", &["rust"]).await;
        register_student(&platform, "junior", &["rust"]).await;
        platform
            .store
            .upsert_portfolio(
                "senior",
                Utc::now(),
                Box::new(|p: &mut StudentPortfolioStatus| {
                    p.current_tier = StudentTier::Advanced
                }),
            )
            .await
            .unwrap();

        let senior = Actor::new("senior", Role::Student);
        let engagement = platform
            .workflow
            .start_engagement(&senior, brief("Distributed cache"))
            .await
            .unwrap();
        assert_eq!(engagement.tier, StudentTier::Advanced);

        let outcome = platform
            .workflow
            .submit_for_review(&senior, &engagement.engagement_id, submission())
            .await
            .unwrap();
        assert!(outcome.waived());
    }
}

// ============================================================================
// Portfolio Progression Tests
// ============================================================================

mod portfolio_progression {
    use super::*;

    #[tokio::test]
    async fn test_two_verifications_unlock_intermediate() {
        let platform = create_platform(3);
        register_student(&platform, "student_a", &["rust"]).await;
        register_lecturer(&platform).await;
        let student = Actor::new("student_a", Role::Student);

        complete_engagement(&platform, &student, "First", Verdict::Verified).await;
        platform.clock.advance(Duration::days(7));
        let outcome = complete_engagement(&platform, &student, "Second", Verdict::Verified).await;

        let portfolio = outcome.portfolio;
        assert_eq!(portfolio.verified_projects.len(), 2);
        assert_eq!(portfolio.current_tier, StudentTier::Intermediate);
        let tiers: Vec<StudentTier> = portfolio
            .tier_progression_timeline
            .iter()
            .map(|u| u.tier)
            .collect();
        assert_eq!(tiers, vec![StudentTier::Beginner, StudentTier::Intermediate]);
        assert_eq!(portfolio.verified_skills.len(), 1);
        assert_eq!(portfolio.verified_skills[0].project_count, 2);

        // New engagements carry the unlocked tier
        let next = platform
            .workflow
            .start_engagement(&student, brief("Third"))
            .await
            .unwrap();
        assert_eq!(next.tier, StudentTier::Intermediate);
    }
}

// ============================================================================
// Concurrency Tests
// ============================================================================

mod concurrency {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_submissions_one_wins() {
        let platform = Arc::new(create_platform(9));
        register_student(&platform, "student_a", &["rust"]).await;
        register_student(&platform, "student_b", &["rust"]).await;
        let student = Actor::new("student_a", Role::Student);

        let engagement = platform
            .workflow
            .start_engagement(&student, brief("Race"))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let platform = platform.clone();
            let student = student.clone();
            let id = engagement.engagement_id.clone();
            handles.push(tokio::spawn(async move {
                platform.workflow.submit_for_review(&student, &id, submission()).await
            }));
        }

        let mut wins = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => wins += 1,
                Err(WorkflowError::Conflict { .. })
                | Err(WorkflowError::InvalidStateTransition { .. }) => {}
                Err(e) => panic!("unexpected error: {}", e),
            }
        }
        assert_eq!(wins, 1);

        let reviews = platform
            .workflow
            .assigned_reviews(&Actor::new("student_b", Role::Student))
            .await
            .unwrap();
        assert_eq!(reviews.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_approvals_one_wins() {
        let platform = Arc::new(create_platform(1));
        register_farmer(&platform, "farmer_1").await;

        let mut handles = Vec::new();
        for _ in 0..6 {
            let platform = platform.clone();
            handles.push(tokio::spawn(async move {
                platform.gate.approve(&admin(), "farmer_1").await
            }));
        }

        let mut wins = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                wins += 1;
            }
        }
        assert_eq!(wins, 1);
        let score = platform.trust.get_score("farmer_1").await.unwrap();
        assert_eq!(score.composite_score, 40);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_verifications_keep_every_project() {
        let platform = Arc::new(create_platform(2));
        register_student(&platform, "student_a", &[]).await;
        register_lecturer(&platform).await;
        let student = Actor::new("student_a", Role::Student);

        let mut ids = Vec::new();
        for i in 0..6 {
            let engagement = platform
                .workflow
                .start_engagement(&student, brief(&format!("Project {}", i)))
                .await
                .unwrap();
            let outcome = platform
                .workflow
                .submit_for_review(&student, &engagement.engagement_id, submission())
                .await
                .unwrap();
            assert!(outcome.waived());
            ids.push(engagement.engagement_id);
        }

        let mut handles = Vec::new();
        for id in ids.clone() {
            let platform = platform.clone();
            handles.push(tokio::spawn(async move {
                platform
                    .workflow
                    .submit_lecturer_review(&lecturer(), &id, lecturer_decision(Verdict::Verified, 5, 50))
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let portfolio = platform.workflow.portfolio().get_portfolio("student_a").await.unwrap();
        assert_eq!(portfolio.verified_projects.len(), 6);
        for id in &ids {
            assert!(portfolio.has_project(id));
        }
        assert_eq!(portfolio.portfolio_strength, PortfolioStrength::Exceptional);
        assert_eq!(portfolio.current_tier, StudentTier::Advanced);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_trust_events_lose_nothing() {
        let platform = Arc::new(create_platform(1));
        register_farmer(&platform, "farmer_1").await;
        platform.gate.approve(&admin(), "farmer_1").await.unwrap();

        let mut handles = Vec::new();
        for i in 0..20 {
            let platform = platform.clone();
            handles.push(tokio::spawn(async move {
                let event = if i % 2 == 0 {
                    TrustEvent::OrderCompleted { volume: 100.0 }
                } else {
                    TrustEvent::Rated { stars: 4 }
                };
                platform.trust.record_event("farmer_1", event).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let score = platform.trust.get_score("farmer_1").await.unwrap();
        assert_eq!(score.counters.completed_orders, 10);
        assert_eq!(score.counters.rating_count, 10);
        assert_eq!(score.revision, 20);
        assert_eq!(score.scored_revision, 20);
    }
}
