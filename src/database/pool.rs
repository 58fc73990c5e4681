//! Database Connection Pool using sqlx

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::migrate::MigrateDatabase;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Postgres;
use tracing::info;

use crate::config::DatabaseConfig;
use crate::database::engagements::EngagementRepository;
use crate::database::farmers::FarmerRepository;
use crate::database::portfolios::PortfolioRepository;
use crate::database::users::UserRepository;
use crate::database::{CandidateQuery, PortfolioMutation, ReviewerCandidate, Store};
use crate::identity::UserProfile;
use crate::portfolio::StudentPortfolioStatus;
use crate::reputation::{
    CounterDelta, TrustScore, VerificationDecision, VerificationRequest, VerificationStatus,
};
use crate::review::{
    EngagementStatus, EngagementTransition, LecturerReview, PeerFeedback, PeerReview,
    ProjectEngagement,
};

pub struct DatabasePool {
    pool: PgPool,
    users: UserRepository,
    farmers: FarmerRepository,
    engagements: EngagementRepository,
    portfolios: PortfolioRepository,
}

impl DatabasePool {
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        if !Postgres::database_exists(&config.postgres_url)
            .await
            .context("Failed to check PostgreSQL database")?
        {
            Postgres::create_database(&config.postgres_url)
                .await
                .context("Failed to create PostgreSQL database")?;
            info!("Created PostgreSQL database");
        }

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.postgres_url)
            .await
            .context("Failed to connect to PostgreSQL")?;

        info!(max_connections = config.max_connections, "Connected to PostgreSQL");

        Ok(Self {
            users: UserRepository::new(pool.clone()),
            farmers: FarmerRepository::new(pool.clone()),
            engagements: EngagementRepository::new(pool.clone()),
            portfolios: PortfolioRepository::new(pool.clone()),
            pool,
        })
    }

    /// Portfolios before users: candidate lookup joins across both schemas
    pub async fn init_schema(&self) -> Result<()> {
        info!("Initializing database schema...");

        self.portfolios.init_schema().await?;
        self.users.init_schema().await?;
        self.farmers.init_schema().await?;
        self.engagements.init_schema().await?;

        info!("Database schema initialized");
        Ok(())
    }

    pub fn users(&self) -> &UserRepository {
        &self.users
    }

    pub fn farmers(&self) -> &FarmerRepository {
        &self.farmers
    }

    pub fn engagements(&self) -> &EngagementRepository {
        &self.engagements
    }

    pub fn portfolios(&self) -> &PortfolioRepository {
        &self.portfolios
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for DatabasePool {
    async fn upsert_user(&self, profile: &UserProfile) -> Result<()> {
        self.users.upsert(profile).await
    }

    async fn get_user(&self, user_id: &str) -> Result<Option<UserProfile>> {
        self.users.get(user_id).await
    }

    async fn find_reviewer_candidates(
        &self,
        query: &CandidateQuery,
    ) -> Result<Vec<ReviewerCandidate>> {
        self.users.find_reviewer_candidates(query).await
    }

    async fn submit_verification(
        &self,
        farmer_id: &str,
        documents: &[String],
        at: DateTime<Utc>,
    ) -> Result<bool> {
        self.farmers.submit_verification(farmer_id, documents, at).await
    }

    async fn get_verification(&self, farmer_id: &str) -> Result<Option<VerificationRequest>> {
        self.farmers.get_verification(farmer_id).await
    }

    async fn transition_verification(
        &self,
        farmer_id: &str,
        expected: VerificationStatus,
        decision: &VerificationDecision,
    ) -> Result<bool> {
        self.farmers
            .transition_verification(farmer_id, expected, decision)
            .await
    }

    async fn insert_trust_score(&self, score: &TrustScore) -> Result<bool> {
        self.farmers.insert_trust_score(score).await
    }

    async fn get_trust_score(&self, farmer_id: &str) -> Result<Option<TrustScore>> {
        self.farmers.get_trust_score(farmer_id).await
    }

    async fn increment_trust_counters(
        &self,
        farmer_id: &str,
        delta: &CounterDelta,
    ) -> Result<Option<TrustScore>> {
        self.farmers.increment_counters(farmer_id, delta).await
    }

    async fn save_trust_contributions(&self, score: &TrustScore) -> Result<bool> {
        self.farmers.save_contributions(score).await
    }

    async fn insert_engagement(&self, engagement: &ProjectEngagement) -> Result<()> {
        self.engagements.insert_engagement(engagement).await
    }

    async fn get_engagement(&self, engagement_id: &str) -> Result<Option<ProjectEngagement>> {
        self.engagements.get_engagement(engagement_id).await
    }

    async fn transition_engagement(
        &self,
        engagement_id: &str,
        expected: EngagementStatus,
        transition: &EngagementTransition,
    ) -> Result<bool> {
        self.engagements
            .transition_engagement(engagement_id, expected, transition)
            .await
    }

    async fn open_peer_review(
        &self,
        engagement_id: &str,
        expected: EngagementStatus,
        transition: &EngagementTransition,
        review: &PeerReview,
    ) -> Result<bool> {
        self.engagements
            .open_peer_review(engagement_id, expected, transition, review)
            .await
    }

    async fn get_peer_review(&self, review_id: &str) -> Result<Option<PeerReview>> {
        self.engagements.get_peer_review(review_id).await
    }

    async fn complete_peer_review(
        &self,
        review_id: &str,
        feedback: &PeerFeedback,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        self.engagements
            .complete_peer_review(review_id, feedback, at)
            .await
    }

    async fn list_assigned_reviews(&self, reviewer_id: &str) -> Result<Vec<PeerReview>> {
        self.engagements.list_assigned_reviews(reviewer_id).await
    }

    async fn record_lecturer_verdict(
        &self,
        engagement_id: &str,
        expected: EngagementStatus,
        transition: &EngagementTransition,
        review: &LecturerReview,
    ) -> Result<bool> {
        self.engagements
            .record_lecturer_verdict(engagement_id, expected, transition, review)
            .await
    }

    async fn get_lecturer_review(&self, engagement_id: &str) -> Result<Option<LecturerReview>> {
        self.engagements.get_lecturer_review(engagement_id).await
    }

    async fn get_portfolio(&self, student_id: &str) -> Result<Option<StudentPortfolioStatus>> {
        self.portfolios.get(student_id).await
    }

    async fn upsert_portfolio(
        &self,
        student_id: &str,
        at: DateTime<Utc>,
        mutate: PortfolioMutation,
    ) -> Result<StudentPortfolioStatus> {
        self.portfolios.upsert(student_id, at, mutate).await
    }
}
