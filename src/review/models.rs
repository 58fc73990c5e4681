//! Engagement and review records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Student skill classification, also used for reviewer eligibility
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StudentTier {
    Beginner,
    Intermediate,
    Advanced,
}

impl StudentTier {
    pub const ALL: [StudentTier; 3] = [
        StudentTier::Beginner,
        StudentTier::Intermediate,
        StudentTier::Advanced,
    ];

    /// Reviewers must be at or above the submitter's tier
    pub fn eligible_reviewer_tiers(&self) -> Vec<StudentTier> {
        Self::ALL.into_iter().filter(|tier| tier >= self).collect()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StudentTier::Beginner => "BEGINNER",
            StudentTier::Intermediate => "INTERMEDIATE",
            StudentTier::Advanced => "ADVANCED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "BEGINNER" => Some(StudentTier::Beginner),
            "INTERMEDIATE" => Some(StudentTier::Intermediate),
            "ADVANCED" => Some(StudentTier::Advanced),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Track {
    OpenSource,
    AiBrief,
}

impl Track {
    pub fn as_str(&self) -> &'static str {
        match self {
            Track::OpenSource => "OPEN_SOURCE",
            Track::AiBrief => "AI_BRIEF",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "OPEN_SOURCE" => Some(Track::OpenSource),
            "AI_BRIEF" => Some(Track::AiBrief),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EngagementStatus {
    InProgress,
    UnderPeerReview,
    UnderLecturerReview,
    Verified,
    Rejected,
}

impl EngagementStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, EngagementStatus::Verified | EngagementStatus::Rejected)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EngagementStatus::InProgress => "IN_PROGRESS",
            EngagementStatus::UnderPeerReview => "UNDER_PEER_REVIEW",
            EngagementStatus::UnderLecturerReview => "UNDER_LECTURER_REVIEW",
            EngagementStatus::Verified => "VERIFIED",
            EngagementStatus::Rejected => "REJECTED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "IN_PROGRESS" => Some(EngagementStatus::InProgress),
            "UNDER_PEER_REVIEW" => Some(EngagementStatus::UnderPeerReview),
            "UNDER_LECTURER_REVIEW" => Some(EngagementStatus::UnderLecturerReview),
            "VERIFIED" => Some(EngagementStatus::Verified),
            "REJECTED" => Some(EngagementStatus::Rejected),
            _ => None,
        }
    }
}

/// What the student chose to build
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectBrief {
    pub title: String,
    pub track: Track,

    /// Empty when the brief does not constrain the stack
    pub tech_stack: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub repository_url: String,
    pub summary: String,
}

/// One student's attempt at a project, tracked to a verdict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectEngagement {
    pub engagement_id: String,
    pub student_id: String,
    pub title: String,
    pub track: Track,

    /// Student tier when the engagement was created
    pub tier: StudentTier,

    pub tech_stack: Vec<String>,
    pub status: EngagementStatus,
    pub peer_review_id: Option<String>,
    pub submission: Option<Submission>,

    pub created_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ProjectEngagement {
    pub fn apply(&mut self, transition: &EngagementTransition) {
        self.status = transition.to;
        if let Some(review_id) = &transition.peer_review_id {
            self.peer_review_id = Some(review_id.clone());
        }
        if let Some(submission) = &transition.submission {
            self.submission = Some(submission.clone());
            self.submitted_at = Some(transition.at);
        }
        if transition.to.is_terminal() {
            self.completed_at = Some(transition.at);
        }
    }
}

/// Payload of a conditional engagement transition
#[derive(Debug, Clone, PartialEq)]
pub struct EngagementTransition {
    pub to: EngagementStatus,
    pub peer_review_id: Option<String>,
    pub submission: Option<Submission>,
    pub at: DateTime<Utc>,
}

impl EngagementTransition {
    pub fn to(status: EngagementStatus, at: DateTime<Utc>) -> Self {
        Self {
            to: status,
            peer_review_id: None,
            submission: None,
            at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PeerReviewStatus {
    Assigned,
    Submitted,
    Waived,
}

impl PeerReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PeerReviewStatus::Assigned => "ASSIGNED",
            PeerReviewStatus::Submitted => "SUBMITTED",
            PeerReviewStatus::Waived => "WAIVED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ASSIGNED" => Some(PeerReviewStatus::Assigned),
            "SUBMITTED" => Some(PeerReviewStatus::Submitted),
            "WAIVED" => Some(PeerReviewStatus::Waived),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerScores {
    pub code_quality: u8,
    pub documentation: u8,
}

/// What an assigned reviewer submits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerFeedback {
    pub scores: PeerScores,
    pub comments: String,
}

impl PeerFeedback {
    pub fn validate(&self) -> Result<(), String> {
        check_score("code_quality", self.scores.code_quality)?;
        check_score("documentation", self.scores.documentation)?;
        if self.comments.trim().is_empty() {
            return Err("peer review comments must not be empty".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerReview {
    pub review_id: String,
    pub engagement_id: String,

    /// Absent when the review was waived
    pub reviewer_id: Option<String>,

    pub status: PeerReviewStatus,
    pub scores: Option<PeerScores>,
    pub comments: Option<String>,
    pub assigned_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
}

impl PeerReview {
    pub fn assigned(
        review_id: String,
        engagement_id: String,
        reviewer_id: String,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            review_id,
            engagement_id,
            reviewer_id: Some(reviewer_id),
            status: PeerReviewStatus::Assigned,
            scores: None,
            comments: None,
            assigned_at: at,
            submitted_at: None,
        }
    }

    pub fn waived(review_id: String, engagement_id: String, at: DateTime<Utc>) -> Self {
        Self {
            review_id,
            engagement_id,
            reviewer_id: None,
            status: PeerReviewStatus::Waived,
            scores: None,
            comments: None,
            assigned_at: at,
            submitted_at: None,
        }
    }

    pub fn complete(&mut self, feedback: &PeerFeedback, at: DateTime<Utc>) {
        self.status = PeerReviewStatus::Submitted;
        self.scores = Some(feedback.scores);
        self.comments = Some(feedback.comments.clone());
        self.submitted_at = Some(at);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RubricEntry {
    pub score: u8,
    pub comment: String,
}

impl RubricEntry {
    pub fn new(score: u8, comment: impl Into<String>) -> Self {
        Self {
            score,
            comment: comment.into(),
        }
    }
}

/// Fixed four-dimension lecturer rubric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rubric {
    pub technical_quality: RubricEntry,
    pub problem_solving: RubricEntry,
    pub documentation: RubricEntry,
    pub professionalism: RubricEntry,
}

impl Rubric {
    pub fn dimensions(&self) -> [(&'static str, &RubricEntry); 4] {
        [
            ("technical_quality", &self.technical_quality),
            ("problem_solving", &self.problem_solving),
            ("documentation", &self.documentation),
            ("professionalism", &self.professionalism),
        ]
    }

    pub fn average_score(&self) -> f64 {
        let total: u32 = self
            .dimensions()
            .iter()
            .map(|(_, entry)| entry.score as u32)
            .sum();
        total as f64 / 4.0
    }

    /// Every score in 1-5 and every comment at least `min_comment_words` long.
    /// Reports all offending dimensions at once.
    pub fn validate(&self, min_comment_words: usize) -> Result<(), String> {
        let mut problems = Vec::new();
        for (name, entry) in self.dimensions() {
            if let Err(e) = check_score(name, entry.score) {
                problems.push(e);
            }
            let words = word_count(&entry.comment);
            if words < min_comment_words {
                problems.push(format!(
                    "{} comment has {} words, at least {} required",
                    name, words, min_comment_words
                ));
            }
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(problems.join("; "))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Verified,
    Rejected,
}

impl Verdict {
    pub fn status(&self) -> EngagementStatus {
        match self {
            Verdict::Verified => EngagementStatus::Verified,
            Verdict::Rejected => EngagementStatus::Rejected,
        }
    }

    pub fn as_str(&self) -> &'static str {
        self.status().as_str()
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "VERIFIED" => Some(Verdict::Verified),
            "REJECTED" => Some(Verdict::Rejected),
            _ => None,
        }
    }
}

/// What a lecturer submits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LecturerDecision {
    pub rubric: Rubric,
    pub verdict: Verdict,
    pub overall_comments: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LecturerReview {
    pub review_id: String,
    pub engagement_id: String,
    pub lecturer_id: String,
    pub institution: Option<String>,
    pub rubric: Rubric,
    pub verdict: Verdict,
    pub overall_comments: Option<String>,
    pub average_score: f64,
    pub reviewed_at: DateTime<Utc>,
}

fn check_score(name: &str, score: u8) -> Result<(), String> {
    if (1..=5).contains(&score) {
        Ok(())
    } else {
        Err(format!("{} score must be between 1 and 5, got {}", name, score))
    }
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}
