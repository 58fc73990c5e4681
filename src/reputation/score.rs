//! Trust Score Types and Calculator
//!
//! A farmer's composite score is the sum of four capped contributions:
//!
//! | contribution | cap | source                                   |
//! |--------------|-----|------------------------------------------|
//! | verification | 40  | identity check, set once at approval     |
//! | transaction  | 25  | completed orders and cumulative volume   |
//! | rating       | 20  | average rating weighted by rating count  |
//! | reliability  | 15  | on-time confirmations, disputes lost     |
//!
//! Everything here is pure. The tier is always derived from the composite
//! score and never stored on its own.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const VERIFICATION_CAP: u32 = 40;
pub const TRANSACTION_CAP: u32 = 25;
pub const RATING_CAP: u32 = 20;
pub const RELIABILITY_CAP: u32 = 15;
pub const COMPOSITE_MAX: u32 = 100;

/// Share of the transaction cap earned from order count; the rest comes from volume
const ORDER_COUNT_WEIGHT: f64 = 15.0;
const ORDER_VOLUME_WEIGHT: f64 = 10.0;

/// Trust classification derived from the composite score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FarmerTier {
    New,
    Established,
    Trusted,
    Elite,
}

impl FarmerTier {
    /// Inclusive lower bounds: ESTABLISHED at 40, TRUSTED at 65, ELITE at 85
    pub fn from_score(composite: u32) -> Self {
        match composite {
            0..=39 => FarmerTier::New,
            40..=64 => FarmerTier::Established,
            65..=84 => FarmerTier::Trusted,
            _ => FarmerTier::Elite,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FarmerTier::New => "NEW",
            FarmerTier::Established => "ESTABLISHED",
            FarmerTier::Trusted => "TRUSTED",
            FarmerTier::Elite => "ELITE",
        }
    }
}

/// Governance-tunable curve parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringParams {
    /// Order count at which the order share reaches ~63% of its weight
    pub order_saturation: f64,

    /// Cumulative volume at which the volume share saturates
    pub volume_ceiling: f64,

    /// Pseudo-count damping the rating contribution for few ratings
    pub rating_confidence_k: f64,

    /// On-time rate below which reliability is scaled down
    pub on_time_threshold: f64,

    /// Multiplier applied per dispute ruled against the farmer
    pub dispute_penalty: f64,
}

impl Default for ScoringParams {
    fn default() -> Self {
        Self {
            order_saturation: 10.0,
            volume_ceiling: 100_000.0,
            rating_confidence_k: 5.0,
            on_time_threshold: 0.8,
            dispute_penalty: 0.75,
        }
    }
}

/// Raw event counters a trust score is derived from
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrustCounters {
    pub completed_orders: u64,
    pub total_volume: f64,
    pub rating_sum: u64,
    pub rating_count: u64,
    pub confirmations: u64,
    pub on_time_confirmations: u64,
    pub disputes_ruled_against: u32,
}

impl TrustCounters {
    pub fn average_rating(&self) -> f64 {
        if self.rating_count == 0 {
            return 0.0;
        }
        self.rating_sum as f64 / self.rating_count as f64
    }

    /// On-time confirmation rate (0.0 - 1.0), 1.0 with no history
    pub fn on_time_rate(&self) -> f64 {
        if self.confirmations == 0 {
            return 1.0;
        }
        self.on_time_confirmations as f64 / self.confirmations as f64
    }

    pub fn apply(&mut self, delta: &CounterDelta) {
        self.completed_orders += delta.completed_orders;
        self.total_volume += delta.volume;
        self.rating_sum += delta.rating_sum;
        self.rating_count += delta.rating_count;
        self.confirmations += delta.confirmations;
        self.on_time_confirmations += delta.on_time_confirmations;
        self.disputes_ruled_against += delta.disputes_ruled_against;
    }
}

/// Increment applied atomically by the store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CounterDelta {
    pub completed_orders: u64,
    pub volume: f64,
    pub rating_sum: u64,
    pub rating_count: u64,
    pub confirmations: u64,
    pub on_time_confirmations: u64,
    pub disputes_ruled_against: u32,
}

impl CounterDelta {
    pub fn order_completed(volume: f64) -> Self {
        Self {
            completed_orders: 1,
            volume: volume.max(0.0),
            ..Default::default()
        }
    }

    pub fn rating(stars: u8) -> Self {
        Self {
            rating_sum: stars as u64,
            rating_count: 1,
            ..Default::default()
        }
    }

    pub fn confirmation(on_time: bool) -> Self {
        Self {
            confirmations: 1,
            on_time_confirmations: u64::from(on_time),
            ..Default::default()
        }
    }

    pub fn dispute_ruled_against() -> Self {
        Self {
            disputes_ruled_against: 1,
            ..Default::default()
        }
    }
}

/// Result of a composite computation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositeScore {
    pub verification: u32,
    pub transaction: u32,
    pub rating: u32,
    pub reliability: u32,
    pub composite: u32,
    pub tier: FarmerTier,
}

/// Clamp each contribution to its cap and sum them
pub fn compute_composite(
    verification: u32,
    transaction: u32,
    rating: u32,
    reliability: u32,
) -> CompositeScore {
    let verification = verification.min(VERIFICATION_CAP);
    let transaction = transaction.min(TRANSACTION_CAP);
    let rating = rating.min(RATING_CAP);
    let reliability = reliability.min(RELIABILITY_CAP);
    let composite = (verification + transaction + rating + reliability).min(COMPOSITE_MAX);

    CompositeScore {
        verification,
        transaction,
        rating,
        reliability,
        composite,
        tier: FarmerTier::from_score(composite),
    }
}

fn to_points(value: f64, cap: u32) -> u32 {
    if !value.is_finite() || value <= 0.0 {
        return 0;
    }
    (value.round() as u32).min(cap)
}

/// Saturating exponential in order count plus capped log of volume
pub fn transaction_contribution(completed_orders: u64, volume: f64, params: &ScoringParams) -> u32 {
    let saturation = params.order_saturation.max(f64::EPSILON);
    let order_share = 1.0 - (-(completed_orders as f64) / saturation).exp();

    let ceiling = params.volume_ceiling.max(1.0);
    let volume = if volume.is_finite() { volume.max(0.0) } else { 0.0 };
    let volume_share = ((1.0 + volume).ln() / (1.0 + ceiling).ln()).min(1.0);

    to_points(
        ORDER_COUNT_WEIGHT * order_share + ORDER_VOLUME_WEIGHT * volume_share,
        TRANSACTION_CAP,
    )
}

/// `average x confidence`, where confidence is `n / (n + k)`
pub fn rating_contribution(average_rating: f64, rating_count: u64, params: &ScoringParams) -> u32 {
    if rating_count == 0 {
        return 0;
    }
    let n = rating_count as f64;
    let confidence = n / (n + params.rating_confidence_k.max(0.0));
    let normalized = (average_rating / 5.0).clamp(0.0, 1.0);

    to_points(RATING_CAP as f64 * normalized * confidence, RATING_CAP)
}

/// Earned once confirmations exist, then scaled down by late confirmations and lost disputes
pub fn reliability_contribution(
    confirmations: u64,
    on_time_rate: f64,
    disputes_ruled_against: u32,
    params: &ScoringParams,
) -> u32 {
    if confirmations == 0 {
        return 0;
    }
    let threshold = params.on_time_threshold.clamp(f64::EPSILON, 1.0);
    let punctuality = (on_time_rate / threshold).clamp(0.0, 1.0);
    let penalty = params
        .dispute_penalty
        .clamp(0.0, 1.0)
        .powi(i32::try_from(disputes_ruled_against).unwrap_or(i32::MAX));

    to_points(
        RELIABILITY_CAP as f64 * punctuality * penalty,
        RELIABILITY_CAP,
    )
}

/// Full recomputation from counters
pub fn score_counters(
    verification_score: u32,
    counters: &TrustCounters,
    params: &ScoringParams,
) -> CompositeScore {
    compute_composite(
        verification_score,
        transaction_contribution(counters.completed_orders, counters.total_volume, params),
        rating_contribution(counters.average_rating(), counters.rating_count, params),
        reliability_contribution(
            counters.confirmations,
            counters.on_time_rate(),
            counters.disputes_ruled_against,
            params,
        ),
    )
}

/// Persisted trust score for a verified farmer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustScore {
    pub farmer_id: String,

    pub verification_score: u32,
    pub transaction_contribution: u32,
    pub rating_contribution: u32,
    pub reliability_contribution: u32,
    pub composite_score: u32,

    pub counters: TrustCounters,

    /// Bumped by every counter increment
    pub revision: u64,

    /// Counter revision the contributions were computed from
    pub scored_revision: u64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TrustScore {
    /// Starting score for a freshly approved farmer
    pub fn new_verified(farmer_id: String, at: DateTime<Utc>) -> Self {
        let initial = compute_composite(VERIFICATION_CAP, 0, 0, 0);
        Self {
            farmer_id,
            verification_score: initial.verification,
            transaction_contribution: 0,
            rating_contribution: 0,
            reliability_contribution: 0,
            composite_score: initial.composite,
            counters: TrustCounters::default(),
            revision: 0,
            scored_revision: 0,
            created_at: at,
            updated_at: at,
        }
    }

    pub fn tier(&self) -> FarmerTier {
        FarmerTier::from_score(self.composite_score)
    }

    /// Replace all contributions with a fresh computation
    pub fn apply(&mut self, score: &CompositeScore, scored_revision: u64, at: DateTime<Utc>) {
        self.verification_score = score.verification;
        self.transaction_contribution = score.transaction;
        self.rating_contribution = score.rating;
        self.reliability_contribution = score.reliability;
        self.composite_score = score.composite;
        self.scored_revision = scored_revision;
        self.updated_at = at;
    }

    pub fn breakdown(&self) -> CompositeScore {
        compute_composite(
            self.verification_score,
            self.transaction_contribution,
            self.rating_contribution,
            self.reliability_contribution,
        )
    }
}
