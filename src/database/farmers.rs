//! Farmer Repository - verification requests and trust scores
//!
//! Counter updates are single `UPDATE ... SET x = x + $n` statements so
//! concurrent events never overwrite each other. Contribution writes are
//! guarded by `scored_revision` so an older computation cannot replace a
//! newer one.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::{debug, info};

use crate::database::parse_column;
use crate::reputation::{
    CounterDelta, TrustCounters, TrustScore, VerificationDecision, VerificationRequest,
    VerificationStatus,
};

const TRUST_SCORE_COLUMNS: &str = r#"
    farmer_id, verification_score, transaction_contribution, rating_contribution,
    reliability_contribution, composite_score, completed_orders, total_volume,
    rating_sum, rating_count, confirmations, on_time_confirmations,
    disputes_ruled_against, revision, scored_revision, created_at, updated_at
"#;

pub struct FarmerRepository {
    pool: PgPool,
}

impl FarmerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query("CREATE SCHEMA IF NOT EXISTS farmers")
            .execute(&self.pool)
            .await
            .context("Failed to create farmers schema")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS farmers.verifications (
                farmer_id VARCHAR(255) PRIMARY KEY,
                status VARCHAR(20) NOT NULL,
                documents TEXT[] NOT NULL DEFAULT '{}',
                submitted_at TIMESTAMP WITH TIME ZONE NOT NULL,
                reviewed_at TIMESTAMP WITH TIME ZONE,
                reviewed_by VARCHAR(255),
                rejection_reason TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create verifications table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS farmers.trust_scores (
                farmer_id VARCHAR(255) PRIMARY KEY,
                verification_score INTEGER NOT NULL DEFAULT 0,
                transaction_contribution INTEGER NOT NULL DEFAULT 0,
                rating_contribution INTEGER NOT NULL DEFAULT 0,
                reliability_contribution INTEGER NOT NULL DEFAULT 0,
                composite_score INTEGER NOT NULL DEFAULT 0,
                completed_orders BIGINT NOT NULL DEFAULT 0,
                total_volume DOUBLE PRECISION NOT NULL DEFAULT 0.0,
                rating_sum BIGINT NOT NULL DEFAULT 0,
                rating_count BIGINT NOT NULL DEFAULT 0,
                confirmations BIGINT NOT NULL DEFAULT 0,
                on_time_confirmations BIGINT NOT NULL DEFAULT 0,
                disputes_ruled_against INTEGER NOT NULL DEFAULT 0,
                revision BIGINT NOT NULL DEFAULT 0,
                scored_revision BIGINT NOT NULL DEFAULT 0,
                created_at TIMESTAMP WITH TIME ZONE NOT NULL,
                updated_at TIMESTAMP WITH TIME ZONE NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create trust_scores table")?;

        info!("Farmers schema initialized");
        Ok(())
    }

    /// Creates a PENDING request or re-opens a REJECTED one
    pub async fn submit_verification(
        &self,
        farmer_id: &str,
        documents: &[String],
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO farmers.verifications (farmer_id, status, documents, submitted_at)
            VALUES ($1, 'PENDING', $2, $3)
            ON CONFLICT (farmer_id) DO UPDATE SET
                status = 'PENDING',
                documents = EXCLUDED.documents,
                submitted_at = EXCLUDED.submitted_at,
                reviewed_at = NULL,
                reviewed_by = NULL,
                rejection_reason = NULL
            WHERE farmers.verifications.status = 'REJECTED'
            "#,
        )
        .bind(farmer_id)
        .bind(documents)
        .bind(at)
        .execute(&self.pool)
        .await
        .context("Failed to submit verification")?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn get_verification(&self, farmer_id: &str) -> Result<Option<VerificationRequest>> {
        let row = sqlx::query(
            r#"
            SELECT farmer_id, status, documents, submitted_at, reviewed_at, reviewed_by, rejection_reason
            FROM farmers.verifications
            WHERE farmer_id = $1
            "#,
        )
        .bind(farmer_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to get verification")?;

        row.map(verification_from_row).transpose()
    }

    pub async fn transition_verification(
        &self,
        farmer_id: &str,
        expected: VerificationStatus,
        decision: &VerificationDecision,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE farmers.verifications
            SET status = $2, reviewed_at = $3, reviewed_by = $4, rejection_reason = $5
            WHERE farmer_id = $1 AND status = $6
            "#,
        )
        .bind(farmer_id)
        .bind(decision.status.as_str())
        .bind(decision.reviewed_at)
        .bind(&decision.reviewed_by)
        .bind(&decision.rejection_reason)
        .bind(expected.as_str())
        .execute(&self.pool)
        .await
        .context("Failed to transition verification")?;

        debug!(
            farmer_id = %farmer_id,
            to = decision.status.as_str(),
            applied = result.rows_affected() == 1,
            "Verification transition"
        );
        Ok(result.rows_affected() == 1)
    }

    pub async fn insert_trust_score(&self, score: &TrustScore) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO farmers.trust_scores
                (farmer_id, verification_score, transaction_contribution, rating_contribution,
                 reliability_contribution, composite_score, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (farmer_id) DO NOTHING
            "#,
        )
        .bind(&score.farmer_id)
        .bind(score.verification_score as i32)
        .bind(score.transaction_contribution as i32)
        .bind(score.rating_contribution as i32)
        .bind(score.reliability_contribution as i32)
        .bind(score.composite_score as i32)
        .bind(score.created_at)
        .bind(score.updated_at)
        .execute(&self.pool)
        .await
        .context("Failed to insert trust score")?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn get_trust_score(&self, farmer_id: &str) -> Result<Option<TrustScore>> {
        let sql = format!(
            "SELECT {} FROM farmers.trust_scores WHERE farmer_id = $1",
            TRUST_SCORE_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(farmer_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get trust score")?;

        row.map(trust_score_from_row).transpose()
    }

    pub async fn increment_counters(
        &self,
        farmer_id: &str,
        delta: &CounterDelta,
    ) -> Result<Option<TrustScore>> {
        let sql = format!(
            r#"
            UPDATE farmers.trust_scores SET
                completed_orders = completed_orders + $2,
                total_volume = total_volume + $3,
                rating_sum = rating_sum + $4,
                rating_count = rating_count + $5,
                confirmations = confirmations + $6,
                on_time_confirmations = on_time_confirmations + $7,
                disputes_ruled_against = disputes_ruled_against + $8,
                revision = revision + 1
            WHERE farmer_id = $1
            RETURNING {}
            "#,
            TRUST_SCORE_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(farmer_id)
            .bind(delta.completed_orders as i64)
            .bind(delta.volume)
            .bind(delta.rating_sum as i64)
            .bind(delta.rating_count as i64)
            .bind(delta.confirmations as i64)
            .bind(delta.on_time_confirmations as i64)
            .bind(delta.disputes_ruled_against as i32)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to increment trust counters")?;

        row.map(trust_score_from_row).transpose()
    }

    pub async fn save_contributions(&self, score: &TrustScore) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE farmers.trust_scores SET
                verification_score = $2,
                transaction_contribution = $3,
                rating_contribution = $4,
                reliability_contribution = $5,
                composite_score = $6,
                scored_revision = $7,
                updated_at = $8
            WHERE farmer_id = $1 AND scored_revision <= $7
            "#,
        )
        .bind(&score.farmer_id)
        .bind(score.verification_score as i32)
        .bind(score.transaction_contribution as i32)
        .bind(score.rating_contribution as i32)
        .bind(score.reliability_contribution as i32)
        .bind(score.composite_score as i32)
        .bind(score.scored_revision as i64)
        .bind(score.updated_at)
        .execute(&self.pool)
        .await
        .context("Failed to save trust contributions")?;

        Ok(result.rows_affected() == 1)
    }
}

fn verification_from_row(row: PgRow) -> Result<VerificationRequest> {
    let status: String = row.get("status");
    Ok(VerificationRequest {
        farmer_id: row.get("farmer_id"),
        status: parse_column(&status, "verification status", VerificationStatus::parse)?,
        documents: row.get("documents"),
        submitted_at: row.get("submitted_at"),
        reviewed_at: row.get("reviewed_at"),
        reviewed_by: row.get("reviewed_by"),
        rejection_reason: row.get("rejection_reason"),
    })
}

fn trust_score_from_row(row: PgRow) -> Result<TrustScore> {
    let verification_score: i32 = row.get("verification_score");
    let transaction_contribution: i32 = row.get("transaction_contribution");
    let rating_contribution: i32 = row.get("rating_contribution");
    let reliability_contribution: i32 = row.get("reliability_contribution");
    let composite_score: i32 = row.get("composite_score");
    let completed_orders: i64 = row.get("completed_orders");
    let rating_sum: i64 = row.get("rating_sum");
    let rating_count: i64 = row.get("rating_count");
    let confirmations: i64 = row.get("confirmations");
    let on_time_confirmations: i64 = row.get("on_time_confirmations");
    let disputes_ruled_against: i32 = row.get("disputes_ruled_against");
    let revision: i64 = row.get("revision");
    let scored_revision: i64 = row.get("scored_revision");

    Ok(TrustScore {
        farmer_id: row.get("farmer_id"),
        verification_score: verification_score as u32,
        transaction_contribution: transaction_contribution as u32,
        rating_contribution: rating_contribution as u32,
        reliability_contribution: reliability_contribution as u32,
        composite_score: composite_score as u32,
        counters: TrustCounters {
            completed_orders: completed_orders as u64,
            total_volume: row.get("total_volume"),
            rating_sum: rating_sum as u64,
            rating_count: rating_count as u64,
            confirmations: confirmations as u64,
            on_time_confirmations: on_time_confirmations as u64,
            disputes_ruled_against: disputes_ruled_against as u32,
        },
        revision: revision as u64,
        scored_revision: scored_revision as u64,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}
