//! Portfolio Repository - one JSONB document per student
//!
//! `current_tier` is duplicated into its own column so reviewer routing can
//! filter on it without decoding documents.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use tracing::{debug, info};

use crate::database::PortfolioMutation;
use crate::portfolio::StudentPortfolioStatus;

pub struct PortfolioRepository {
    pool: PgPool,
}

impl PortfolioRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query("CREATE SCHEMA IF NOT EXISTS portfolio")
            .execute(&self.pool)
            .await
            .context("Failed to create portfolio schema")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS portfolio.portfolios (
                student_id VARCHAR(255) PRIMARY KEY,
                current_tier VARCHAR(20) NOT NULL DEFAULT 'BEGINNER',
                document JSONB NOT NULL,
                updated_at TIMESTAMP WITH TIME ZONE NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create portfolios table")?;

        info!("Portfolio schema initialized");
        Ok(())
    }

    pub async fn get(&self, student_id: &str) -> Result<Option<StudentPortfolioStatus>> {
        let row = sqlx::query("SELECT document FROM portfolio.portfolios WHERE student_id = $1")
            .bind(student_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get portfolio")?;

        Ok(row.map(|row| {
            let document: Json<StudentPortfolioStatus> = row.get("document");
            document.0
        }))
    }

    /// Create if missing, then read-modify-write under a row lock
    pub async fn upsert(
        &self,
        student_id: &str,
        at: DateTime<Utc>,
        mutate: PortfolioMutation,
    ) -> Result<StudentPortfolioStatus> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin portfolio transaction")?;

        let initial = StudentPortfolioStatus::new(student_id.to_string(), at);
        sqlx::query(
            r#"
            INSERT INTO portfolio.portfolios (student_id, current_tier, document, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (student_id) DO NOTHING
            "#,
        )
        .bind(student_id)
        .bind(initial.current_tier.as_str())
        .bind(Json(&initial))
        .bind(at)
        .execute(&mut *tx)
        .await
        .context("Failed to create portfolio")?;

        let row = sqlx::query(
            "SELECT document FROM portfolio.portfolios WHERE student_id = $1 FOR UPDATE",
        )
        .bind(student_id)
        .fetch_one(&mut *tx)
        .await
        .context("Failed to lock portfolio")?;
        let document: Json<StudentPortfolioStatus> = row.get("document");
        let mut portfolio = document.0;

        mutate(&mut portfolio);

        sqlx::query(
            r#"
            UPDATE portfolio.portfolios
            SET current_tier = $2, document = $3, updated_at = $4
            WHERE student_id = $1
            "#,
        )
        .bind(student_id)
        .bind(portfolio.current_tier.as_str())
        .bind(Json(&portfolio))
        .bind(portfolio.updated_at)
        .execute(&mut *tx)
        .await
        .context("Failed to write portfolio")?;

        tx.commit()
            .await
            .context("Failed to commit portfolio transaction")?;

        debug!(
            student_id = %student_id,
            tier = portfolio.current_tier.as_str(),
            verified_projects = portfolio.verified_projects.len(),
            "Portfolio written"
        );
        Ok(portfolio)
    }
}
