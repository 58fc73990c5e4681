//! Student Portfolios
//!
//! Verified projects, verified skills and the tier progression timeline,
//! rebuilt incrementally each time one of the student's engagements is
//! verified.

mod aggregator;
mod models;

pub use aggregator::PortfolioAggregator;
pub use models::{
    PortfolioStats, PortfolioStrength, StudentPortfolioStatus, TierRequirement, TierThresholds,
    TierUnlock, VerifiedProject, VerifiedSkill,
};
