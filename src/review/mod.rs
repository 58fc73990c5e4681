//! Student Project Review
//!
//! Engagements move through a peer review and a lecturer review before they
//! count toward a student's portfolio:
//!
//! ```text
//! ┌──────────────┐   ┌──────────────────┐   ┌───────────────────┐
//! │ Engagement   │──►│ ReviewerRouter   │──►│ Peer review       │
//! │ (student)    │   │ (tier + stack)   │   │ (or waived)       │
//! └──────────────┘   └──────────────────┘   └─────────┬─────────┘
//!                                                     │
//!                                                     ▼
//! ┌──────────────┐   ┌──────────────────┐   ┌───────────────────┐
//! │ Portfolio    │◄──│ Verdict          │◄──│ Lecturer rubric   │
//! │ aggregator   │   │ VERIFIED|REJECTED│   │ (4 dimensions)    │
//! └──────────────┘   └──────────────────┘   └───────────────────┘
//! ```

mod models;
mod router;
mod workflow;

pub use models::{
    word_count, EngagementStatus, EngagementTransition, LecturerDecision, LecturerReview,
    PeerFeedback, PeerReview, PeerReviewStatus, PeerScores, ProjectBrief, ProjectEngagement,
    Rubric, RubricEntry, StudentTier, Submission, Track, Verdict,
};
pub use router::{ReviewerRouter, DEFAULT_PEER_SAMPLE_SIZE};
pub use workflow::{EngagementWorkflow, SubmissionOutcome, VerdictOutcome, MIN_RUBRIC_COMMENT_WORDS};
