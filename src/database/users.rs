//! User Repository - platform directory and reviewer candidate lookup

use anyhow::{Context, Result};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::{debug, info};

use crate::database::{parse_column, CandidateQuery, ReviewerCandidate};
use crate::identity::{normalize_tags, Role, UserProfile};
use crate::review::StudentTier;

pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query("CREATE SCHEMA IF NOT EXISTS directory")
            .execute(&self.pool)
            .await
            .context("Failed to create directory schema")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS directory.users (
                user_id VARCHAR(255) PRIMARY KEY,
                role VARCHAR(20) NOT NULL,
                display_name VARCHAR(255) NOT NULL,
                contact VARCHAR(255),
                institution VARCHAR(255),
                tech_stack TEXT[] NOT NULL DEFAULT '{}'
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create users table")?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_users_role ON directory.users(role)")
            .execute(&self.pool)
            .await
            .context("Failed to create users role index")?;

        info!("Directory schema initialized");
        Ok(())
    }

    pub async fn upsert(&self, profile: &UserProfile) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO directory.users (user_id, role, display_name, contact, institution, tech_stack)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (user_id) DO UPDATE SET
                role = EXCLUDED.role,
                display_name = EXCLUDED.display_name,
                contact = EXCLUDED.contact,
                institution = EXCLUDED.institution,
                tech_stack = EXCLUDED.tech_stack
            "#,
        )
        .bind(&profile.user_id)
        .bind(profile.role.as_str())
        .bind(&profile.display_name)
        .bind(&profile.contact)
        .bind(&profile.institution)
        .bind(normalize_tags(&profile.tech_stack))
        .execute(&self.pool)
        .await
        .context("Failed to upsert user")?;

        debug!(user_id = %profile.user_id, role = profile.role.as_str(), "User upserted");
        Ok(())
    }

    pub async fn get(&self, user_id: &str) -> Result<Option<UserProfile>> {
        let row = sqlx::query(
            r#"
            SELECT user_id, role, display_name, contact, institution, tech_stack
            FROM directory.users
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to get user")?;

        row.map(user_from_row).transpose()
    }

    /// Students with their portfolio tier, filtered in SQL
    pub async fn find_reviewer_candidates(
        &self,
        query: &CandidateQuery,
    ) -> Result<Vec<ReviewerCandidate>> {
        let tiers: Vec<String> = query
            .eligible_tiers
            .iter()
            .map(|t| t.as_str().to_string())
            .collect();

        let rows = sqlx::query(
            r#"
            SELECT u.user_id, u.tech_stack, COALESCE(p.current_tier, 'BEGINNER') AS tier
            FROM directory.users u
            LEFT JOIN portfolio.portfolios p ON p.student_id = u.user_id
            WHERE u.role = 'STUDENT'
              AND u.user_id <> $1
              AND COALESCE(p.current_tier, 'BEGINNER') = ANY($2)
              AND (cardinality($3::text[]) = 0 OR u.tech_stack && $3::text[])
            ORDER BY u.user_id
            "#,
        )
        .bind(&query.exclude_user_id)
        .bind(&tiers)
        .bind(&query.tech_stack)
        .fetch_all(&self.pool)
        .await
        .context("Failed to query reviewer candidates")?;

        rows.into_iter()
            .map(|row| -> Result<ReviewerCandidate> {
                let tier: String = row.get("tier");
                Ok(ReviewerCandidate {
                    user_id: row.get("user_id"),
                    tier: parse_column(&tier, "current_tier", StudentTier::parse)?,
                    tech_stack: row.get("tech_stack"),
                })
            })
            .collect()
    }
}

fn user_from_row(row: PgRow) -> Result<UserProfile> {
    let role: String = row.get("role");
    Ok(UserProfile {
        user_id: row.get("user_id"),
        role: parse_column(&role, "role", Role::parse)?,
        display_name: row.get("display_name"),
        contact: row.get("contact"),
        institution: row.get("institution"),
        tech_stack: row.get("tech_stack"),
    })
}
