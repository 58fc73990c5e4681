//! Farmer Trust System
//!
//! Converts verification decisions and marketplace events into a bounded
//! composite trust score and its tier.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐   approve    ┌──────────────────┐
//! │ VerificationGate │─────────────►│ TrustScore       │
//! │ (PENDING → ...)  │   seeds 40   │ (store-owned)    │
//! └──────────────────┘              └──────────────────┘
//!                                            ▲
//!                                            │ increment + rescore
//!                                   ┌──────────────────┐
//!   orders, ratings, confirmations ►│ TrustScoreManager│
//!   disputes ruled against          └──────────────────┘
//!                                            │
//!                                            ▼
//!                                   ┌──────────────────┐
//!                                   │ score.rs (pure)  │
//!                                   └──────────────────┘
//! ```
//!
//! ## Score Model
//!
//! - Verification: 40 points, granted once at approval
//! - Transaction: up to 25, diminishing returns in orders and volume
//! - Rating: up to 20, average rating damped by rating count
//! - Reliability: up to 15, reduced by late confirmations and lost disputes
//! - Tiers: NEW < 40 ≤ ESTABLISHED < 65 ≤ TRUSTED < 85 ≤ ELITE

mod manager;
mod score;
mod verification;

pub use manager::{TrustEvent, TrustScoreManager};
pub use score::{
    compute_composite, rating_contribution, reliability_contribution, score_counters,
    transaction_contribution, CompositeScore, CounterDelta, FarmerTier, ScoringParams,
    TrustCounters, TrustScore, COMPOSITE_MAX, RATING_CAP, RELIABILITY_CAP, TRANSACTION_CAP,
    VERIFICATION_CAP,
};
pub use verification::{
    VerificationDecision, VerificationGate, VerificationRequest, VerificationStatus,
};
