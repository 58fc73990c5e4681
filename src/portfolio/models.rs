//! Student portfolio snapshot and the rules that grow it

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::review::{StudentTier, Track};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PortfolioStrength {
    Building,
    Solid,
    Strong,
    Exceptional,
}

impl PortfolioStrength {
    /// Monotonic in both inputs: more projects or a higher average never
    /// yields a lower class
    pub fn classify(verified_projects: usize, average_score: f64) -> Self {
        if verified_projects >= 6 && average_score >= 4.5 {
            PortfolioStrength::Exceptional
        } else if verified_projects >= 3 && average_score >= 4.0 {
            PortfolioStrength::Strong
        } else if verified_projects >= 1 && average_score >= 3.0 {
            PortfolioStrength::Solid
        } else {
            PortfolioStrength::Building
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PortfolioStrength::Building => "BUILDING",
            PortfolioStrength::Solid => "SOLID",
            PortfolioStrength::Strong => "STRONG",
            PortfolioStrength::Exceptional => "EXCEPTIONAL",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "BUILDING" => Some(PortfolioStrength::Building),
            "SOLID" => Some(PortfolioStrength::Solid),
            "STRONG" => Some(PortfolioStrength::Strong),
            "EXCEPTIONAL" => Some(PortfolioStrength::Exceptional),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifiedProject {
    pub engagement_id: String,
    pub title: String,
    pub tier: StudentTier,
    pub track: Track,
    pub tech_stack: Vec<String>,

    /// Mean of the four lecturer rubric scores
    pub average_score: f64,

    /// Institution of the verifying lecturer
    pub institution: Option<String>,

    pub verified_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifiedSkill {
    pub name: String,
    pub first_verified_at: DateTime<Utc>,
    pub project_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierUnlock {
    pub tier: StudentTier,
    pub unlocked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortfolioStats {
    pub engagements_started: u32,
    pub verified_count: u32,
    pub rejected_count: u32,
    pub average_verified_score: f64,
}

/// Requirement for unlocking a student tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierRequirement {
    pub tier: StudentTier,
    pub min_verified_projects: usize,
    pub min_strength: PortfolioStrength,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierThresholds {
    pub requirements: Vec<TierRequirement>,
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self {
            requirements: vec![
                TierRequirement {
                    tier: StudentTier::Intermediate,
                    min_verified_projects: 2,
                    min_strength: PortfolioStrength::Solid,
                },
                TierRequirement {
                    tier: StudentTier::Advanced,
                    min_verified_projects: 5,
                    min_strength: PortfolioStrength::Strong,
                },
            ],
        }
    }
}

impl TierThresholds {
    /// Highest tier whose requirements are met; BEGINNER needs nothing
    pub fn qualified_tier(&self, verified_projects: usize, strength: PortfolioStrength) -> StudentTier {
        self.requirements
            .iter()
            .filter(|req| {
                verified_projects >= req.min_verified_projects && strength >= req.min_strength
            })
            .map(|req| req.tier)
            .max()
            .unwrap_or(StudentTier::Beginner)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentPortfolioStatus {
    pub student_id: String,
    pub current_tier: StudentTier,
    pub portfolio_strength: PortfolioStrength,
    pub verified_projects: Vec<VerifiedProject>,
    pub verified_skills: Vec<VerifiedSkill>,

    /// Append-only
    pub tier_progression_timeline: Vec<TierUnlock>,

    pub stats: PortfolioStats,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StudentPortfolioStatus {
    pub fn new(student_id: String, at: DateTime<Utc>) -> Self {
        Self {
            student_id,
            current_tier: StudentTier::Beginner,
            portfolio_strength: PortfolioStrength::Building,
            verified_projects: Vec::new(),
            verified_skills: Vec::new(),
            tier_progression_timeline: vec![TierUnlock {
                tier: StudentTier::Beginner,
                unlocked_at: at,
            }],
            stats: PortfolioStats::default(),
            created_at: at,
            updated_at: at,
        }
    }

    pub fn has_project(&self, engagement_id: &str) -> bool {
        self.verified_projects
            .iter()
            .any(|p| p.engagement_id == engagement_id)
    }

    /// Fold a newly verified project into the portfolio. Returns `false` if the
    /// engagement was already recorded.
    pub fn add_verified_project(&mut self, project: VerifiedProject, thresholds: &TierThresholds) -> bool {
        if self.has_project(&project.engagement_id) {
            return false;
        }
        let at = project.verified_at;

        for tag in &project.tech_stack {
            match self.verified_skills.iter_mut().find(|s| &s.name == tag) {
                Some(skill) => skill.project_count += 1,
                None => self.verified_skills.push(VerifiedSkill {
                    name: tag.clone(),
                    first_verified_at: at,
                    project_count: 1,
                }),
            }
        }

        self.verified_projects.push(project);

        let count = self.verified_projects.len();
        let total: f64 = self.verified_projects.iter().map(|p| p.average_score).sum();
        self.stats.verified_count = count as u32;
        self.stats.average_verified_score = total / count as f64;
        self.portfolio_strength =
            PortfolioStrength::classify(count, self.stats.average_verified_score);

        self.advance_tier(thresholds, at);
        self.updated_at = at;
        true
    }

    /// Unlock every tier between the current one and the qualified one
    fn advance_tier(&mut self, thresholds: &TierThresholds, at: DateTime<Utc>) {
        let target = thresholds.qualified_tier(self.verified_projects.len(), self.portfolio_strength);
        if target <= self.current_tier {
            return;
        }
        for tier in StudentTier::ALL {
            if tier > self.current_tier && tier <= target {
                self.tier_progression_timeline.push(TierUnlock {
                    tier,
                    unlocked_at: at,
                });
            }
        }
        self.current_tier = target;
    }
}
