use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

use crate::portfolio::{PortfolioStrength, TierRequirement, TierThresholds};
use crate::reputation::ScoringParams;
use crate::review::{StudentTier, DEFAULT_PEER_SAMPLE_SIZE, MIN_RUBRIC_COMMENT_WORDS};

/// Configuration for the TrustBridge engines
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrustBridgeConfig {
    /// Database configuration
    pub database: DatabaseConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Trust score curve parameters
    pub scoring: ScoringConfig,
    /// Engagement review settings
    pub review: ReviewConfig,
    /// Student tier thresholds
    pub portfolio: PortfolioConfig,
    /// Notification queue settings
    pub notifications: NotificationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection string
    pub postgres_url: String,
    /// Enable PostgreSQL (if false, uses the in-memory store)
    pub postgres_enabled: bool,
    /// Pool size
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            postgres_url: "postgresql://localhost:5432/trustbridge".to_string(),
            postgres_enabled: false,
            max_connections: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    pub level: String,
    /// Emit span open/close events
    pub log_spans: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_spans: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    pub order_saturation: f64,
    pub volume_ceiling: f64,
    pub rating_confidence_k: f64,
    pub on_time_threshold: f64,
    pub dispute_penalty: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        let params = ScoringParams::default();
        Self {
            order_saturation: params.order_saturation,
            volume_ceiling: params.volume_ceiling,
            rating_confidence_k: params.rating_confidence_k,
            on_time_threshold: params.on_time_threshold,
            dispute_penalty: params.dispute_penalty,
        }
    }
}

impl ScoringConfig {
    /// Convert to ScoringParams for use by TrustScoreManager
    pub fn to_params(&self) -> ScoringParams {
        ScoringParams {
            order_saturation: self.order_saturation,
            volume_ceiling: self.volume_ceiling,
            rating_confidence_k: self.rating_confidence_k,
            on_time_threshold: self.on_time_threshold,
            dispute_penalty: self.dispute_penalty,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewConfig {
    /// Candidates sampled before the uniform pick
    pub peer_sample_size: usize,
    /// Minimum words in each lecturer rubric comment
    pub min_rubric_comment_words: usize,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            peer_sample_size: DEFAULT_PEER_SAMPLE_SIZE,
            min_rubric_comment_words: MIN_RUBRIC_COMMENT_WORDS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioConfig {
    pub intermediate_min_projects: usize,
    pub intermediate_min_strength: PortfolioStrength,
    pub advanced_min_projects: usize,
    pub advanced_min_strength: PortfolioStrength,
}

impl Default for PortfolioConfig {
    fn default() -> Self {
        Self {
            intermediate_min_projects: 2,
            intermediate_min_strength: PortfolioStrength::Solid,
            advanced_min_projects: 5,
            advanced_min_strength: PortfolioStrength::Strong,
        }
    }
}

impl PortfolioConfig {
    /// Convert to TierThresholds for use by PortfolioAggregator
    pub fn to_thresholds(&self) -> TierThresholds {
        TierThresholds {
            requirements: vec![
                TierRequirement {
                    tier: StudentTier::Intermediate,
                    min_verified_projects: self.intermediate_min_projects,
                    min_strength: self.intermediate_min_strength,
                },
                TierRequirement {
                    tier: StudentTier::Advanced,
                    min_verified_projects: self.advanced_min_projects,
                    min_strength: self.advanced_min_strength,
                },
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Bounded queue size; sends beyond it are dropped with a warning
    pub queue_capacity: usize,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
        }
    }
}

impl TrustBridgeConfig {
    /// Load configuration from environment variables and validate it
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as `from_env`, reading variables through `lookup`
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        // Database configuration
        if let Some(url) = lookup("TRUSTBRIDGE_POSTGRES_URL") {
            config.database.postgres_url = url;
        }
        override_parsed(&lookup, "TRUSTBRIDGE_POSTGRES_ENABLED", &mut config.database.postgres_enabled)?;
        override_parsed(&lookup, "TRUSTBRIDGE_POSTGRES_MAX_CONNECTIONS", &mut config.database.max_connections)?;

        // Logging configuration
        if let Some(level) = lookup("TRUSTBRIDGE_LOG_LEVEL") {
            config.logging.level = level;
        }
        override_parsed(&lookup, "TRUSTBRIDGE_LOG_SPANS", &mut config.logging.log_spans)?;

        // Scoring configuration
        override_parsed(&lookup, "TRUSTBRIDGE_SCORING_ORDER_SATURATION", &mut config.scoring.order_saturation)?;
        override_parsed(&lookup, "TRUSTBRIDGE_SCORING_VOLUME_CEILING", &mut config.scoring.volume_ceiling)?;
        override_parsed(&lookup, "TRUSTBRIDGE_SCORING_RATING_CONFIDENCE_K", &mut config.scoring.rating_confidence_k)?;
        override_parsed(&lookup, "TRUSTBRIDGE_SCORING_ON_TIME_THRESHOLD", &mut config.scoring.on_time_threshold)?;
        override_parsed(&lookup, "TRUSTBRIDGE_SCORING_DISPUTE_PENALTY", &mut config.scoring.dispute_penalty)?;

        // Review configuration
        override_parsed(&lookup, "TRUSTBRIDGE_REVIEW_PEER_SAMPLE_SIZE", &mut config.review.peer_sample_size)?;
        override_parsed(&lookup, "TRUSTBRIDGE_REVIEW_MIN_COMMENT_WORDS", &mut config.review.min_rubric_comment_words)?;

        // Portfolio configuration
        override_parsed(&lookup, "TRUSTBRIDGE_TIER_INTERMEDIATE_MIN_PROJECTS", &mut config.portfolio.intermediate_min_projects)?;
        override_parsed(&lookup, "TRUSTBRIDGE_TIER_ADVANCED_MIN_PROJECTS", &mut config.portfolio.advanced_min_projects)?;
        if let Some(strength) = lookup("TRUSTBRIDGE_TIER_INTERMEDIATE_MIN_STRENGTH") {
            config.portfolio.intermediate_min_strength = parse_strength(&strength)
                .context("Invalid TRUSTBRIDGE_TIER_INTERMEDIATE_MIN_STRENGTH value")?;
        }
        if let Some(strength) = lookup("TRUSTBRIDGE_TIER_ADVANCED_MIN_STRENGTH") {
            config.portfolio.advanced_min_strength = parse_strength(&strength)
                .context("Invalid TRUSTBRIDGE_TIER_ADVANCED_MIN_STRENGTH value")?;
        }

        // Notification configuration
        override_parsed(&lookup, "TRUSTBRIDGE_NOTIFICATION_QUEUE_CAPACITY", &mut config.notifications.queue_capacity)?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration for consistency
    pub fn validate(&self) -> Result<()> {
        if self.database.postgres_enabled && self.database.postgres_url.is_empty() {
            return Err(anyhow::anyhow!(
                "PostgreSQL is enabled but no connection string is configured"
            ));
        }

        if self.database.max_connections == 0 {
            return Err(anyhow::anyhow!("Database max_connections must be non-zero"));
        }

        let scoring = &self.scoring;
        if scoring.order_saturation <= 0.0
            || scoring.volume_ceiling <= 0.0
            || scoring.rating_confidence_k < 0.0
        {
            return Err(anyhow::anyhow!(
                "Scoring curve parameters must be positive: {:?}",
                scoring
            ));
        }

        if !(scoring.on_time_threshold > 0.0 && scoring.on_time_threshold <= 1.0) {
            return Err(anyhow::anyhow!(
                "On-time threshold must be in (0, 1], got {}",
                scoring.on_time_threshold
            ));
        }

        if !(0.0..=1.0).contains(&scoring.dispute_penalty) {
            return Err(anyhow::anyhow!(
                "Dispute penalty must be in [0, 1], got {}",
                scoring.dispute_penalty
            ));
        }

        if self.review.peer_sample_size == 0 {
            return Err(anyhow::anyhow!("Peer sample size must be at least 1"));
        }

        let portfolio = &self.portfolio;
        if portfolio.advanced_min_projects < portfolio.intermediate_min_projects
            || portfolio.advanced_min_strength < portfolio.intermediate_min_strength
        {
            return Err(anyhow::anyhow!(
                "ADVANCED tier requirements must not be lower than INTERMEDIATE"
            ));
        }

        if self.notifications.queue_capacity == 0 {
            return Err(anyhow::anyhow!("Notification queue capacity must be non-zero"));
        }

        Ok(())
    }
}

fn override_parsed<F, T>(lookup: &F, key: &str, target: &mut T) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    if let Some(raw) = lookup(key) {
        *target = raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid {} value", key))?;
    }
    Ok(())
}

fn parse_strength(raw: &str) -> Result<PortfolioStrength> {
    PortfolioStrength::parse(&raw.trim().to_uppercase())
        .ok_or_else(|| anyhow::anyhow!("Unknown portfolio strength: {}", raw))
}

/// Mask the password in a connection string for logging
pub fn redact_url(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    let Some((credentials, host)) = rest.rsplit_once('@') else {
        return url.to_string();
    };
    match credentials.split_once(':') {
        Some((user, _)) => format!("{}://{}:***@{}", scheme, user, host),
        None => url.to_string(),
    }
}
