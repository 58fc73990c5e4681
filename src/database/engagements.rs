//! Engagement Repository - engagements, peer reviews and lecturer reviews

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool, Row};
use tracing::{debug, info};

use crate::database::parse_column;
use crate::review::{
    EngagementStatus, EngagementTransition, LecturerReview, PeerFeedback, PeerReview,
    PeerReviewStatus, PeerScores, ProjectEngagement, Rubric, StudentTier, Submission, Track,
    Verdict,
};

/// One peer review row per engagement
const PEER_REVIEW_ENGAGEMENT_INDEX: &str =
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_peer_reviews_engagement ON review.peer_reviews(engagement_id)";

pub struct EngagementRepository {
    pool: PgPool,
}

impl EngagementRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query("CREATE SCHEMA IF NOT EXISTS review")
            .execute(&self.pool)
            .await
            .context("Failed to create review schema")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS review.engagements (
                engagement_id VARCHAR(255) PRIMARY KEY,
                student_id VARCHAR(255) NOT NULL,
                title TEXT NOT NULL,
                track VARCHAR(20) NOT NULL,
                tier VARCHAR(20) NOT NULL,
                tech_stack TEXT[] NOT NULL DEFAULT '{}',
                status VARCHAR(30) NOT NULL,
                peer_review_id VARCHAR(255),
                submission JSONB,
                created_at TIMESTAMP WITH TIME ZONE NOT NULL,
                submitted_at TIMESTAMP WITH TIME ZONE,
                completed_at TIMESTAMP WITH TIME ZONE
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create engagements table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS review.peer_reviews (
                review_id VARCHAR(255) PRIMARY KEY,
                engagement_id VARCHAR(255) NOT NULL REFERENCES review.engagements(engagement_id),
                reviewer_id VARCHAR(255),
                status VARCHAR(20) NOT NULL,
                code_quality SMALLINT,
                documentation SMALLINT,
                comments TEXT,
                assigned_at TIMESTAMP WITH TIME ZONE NOT NULL,
                submitted_at TIMESTAMP WITH TIME ZONE
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create peer_reviews table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS review.lecturer_reviews (
                review_id VARCHAR(255) PRIMARY KEY,
                engagement_id VARCHAR(255) NOT NULL UNIQUE REFERENCES review.engagements(engagement_id),
                lecturer_id VARCHAR(255) NOT NULL,
                institution VARCHAR(255),
                rubric JSONB NOT NULL,
                verdict VARCHAR(20) NOT NULL,
                overall_comments TEXT,
                average_score DOUBLE PRECISION NOT NULL,
                reviewed_at TIMESTAMP WITH TIME ZONE NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create lecturer_reviews table")?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_engagements_student ON review.engagements(student_id)")
            .execute(&self.pool)
            .await
            .context("Failed to create engagements student index")?;

        sqlx::query(PEER_REVIEW_ENGAGEMENT_INDEX)
            .execute(&self.pool)
            .await
            .context("Failed to create peer_reviews engagement index")?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_peer_reviews_reviewer ON review.peer_reviews(reviewer_id, status)")
            .execute(&self.pool)
            .await
            .context("Failed to create peer_reviews reviewer index")?;

        info!("Review schema initialized");
        Ok(())
    }

    pub async fn insert_engagement(&self, engagement: &ProjectEngagement) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO review.engagements
                (engagement_id, student_id, title, track, tier, tech_stack, status,
                 peer_review_id, submission, created_at, submitted_at, completed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(&engagement.engagement_id)
        .bind(&engagement.student_id)
        .bind(&engagement.title)
        .bind(engagement.track.as_str())
        .bind(engagement.tier.as_str())
        .bind(&engagement.tech_stack)
        .bind(engagement.status.as_str())
        .bind(&engagement.peer_review_id)
        .bind(engagement.submission.as_ref().map(Json))
        .bind(engagement.created_at)
        .bind(engagement.submitted_at)
        .bind(engagement.completed_at)
        .execute(&self.pool)
        .await
        .context("Failed to insert engagement")?;

        debug!(engagement_id = %engagement.engagement_id, "Engagement inserted");
        Ok(())
    }

    pub async fn get_engagement(&self, engagement_id: &str) -> Result<Option<ProjectEngagement>> {
        let row = sqlx::query(
            r#"
            SELECT engagement_id, student_id, title, track, tier, tech_stack, status,
                   peer_review_id, submission, created_at, submitted_at, completed_at
            FROM review.engagements
            WHERE engagement_id = $1
            "#,
        )
        .bind(engagement_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to get engagement")?;

        row.map(engagement_from_row).transpose()
    }

    pub async fn transition_engagement(
        &self,
        engagement_id: &str,
        expected: EngagementStatus,
        transition: &EngagementTransition,
    ) -> Result<bool> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .context("Failed to acquire connection")?;
        update_engagement_status(&mut conn, engagement_id, expected, transition).await
    }

    /// Transition the engagement and create its peer review in one transaction
    pub async fn open_peer_review(
        &self,
        engagement_id: &str,
        expected: EngagementStatus,
        transition: &EngagementTransition,
        review: &PeerReview,
    ) -> Result<bool> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin submission transaction")?;

        if !update_engagement_status(&mut tx, engagement_id, expected, transition).await? {
            return Ok(false);
        }
        insert_peer_review_row(&mut tx, review).await?;

        tx.commit()
            .await
            .context("Failed to commit submission transaction")?;

        debug!(
            engagement_id = %engagement_id,
            review_id = %review.review_id,
            status = review.status.as_str(),
            "Peer review opened"
        );
        Ok(true)
    }

    pub async fn get_peer_review(&self, review_id: &str) -> Result<Option<PeerReview>> {
        let row = sqlx::query(
            r#"
            SELECT review_id, engagement_id, reviewer_id, status, code_quality, documentation,
                   comments, assigned_at, submitted_at
            FROM review.peer_reviews
            WHERE review_id = $1
            "#,
        )
        .bind(review_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to get peer review")?;

        row.map(peer_review_from_row).transpose()
    }

    pub async fn complete_peer_review(
        &self,
        review_id: &str,
        feedback: &PeerFeedback,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE review.peer_reviews
            SET status = 'SUBMITTED', code_quality = $2, documentation = $3,
                comments = $4, submitted_at = $5
            WHERE review_id = $1 AND status = 'ASSIGNED'
            "#,
        )
        .bind(review_id)
        .bind(feedback.scores.code_quality as i16)
        .bind(feedback.scores.documentation as i16)
        .bind(&feedback.comments)
        .bind(at)
        .execute(&self.pool)
        .await
        .context("Failed to complete peer review")?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn list_assigned_reviews(&self, reviewer_id: &str) -> Result<Vec<PeerReview>> {
        let rows = sqlx::query(
            r#"
            SELECT review_id, engagement_id, reviewer_id, status, code_quality, documentation,
                   comments, assigned_at, submitted_at
            FROM review.peer_reviews
            WHERE reviewer_id = $1 AND status = 'ASSIGNED'
            ORDER BY assigned_at ASC, review_id ASC
            "#,
        )
        .bind(reviewer_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list assigned reviews")?;

        rows.into_iter().map(peer_review_from_row).collect()
    }

    /// Finalize the engagement and store the lecturer review in one transaction
    pub async fn record_lecturer_verdict(
        &self,
        engagement_id: &str,
        expected: EngagementStatus,
        transition: &EngagementTransition,
        review: &LecturerReview,
    ) -> Result<bool> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin verdict transaction")?;

        if !update_engagement_status(&mut tx, engagement_id, expected, transition).await? {
            return Ok(false);
        }
        insert_lecturer_review_row(&mut tx, review).await?;

        tx.commit()
            .await
            .context("Failed to commit verdict transaction")?;

        debug!(
            engagement_id = %engagement_id,
            verdict = review.verdict.as_str(),
            "Lecturer verdict recorded"
        );
        Ok(true)
    }

    pub async fn get_lecturer_review(&self, engagement_id: &str) -> Result<Option<LecturerReview>> {
        let row = sqlx::query(
            r#"
            SELECT review_id, engagement_id, lecturer_id, institution, rubric, verdict,
                   overall_comments, average_score, reviewed_at
            FROM review.lecturer_reviews
            WHERE engagement_id = $1
            "#,
        )
        .bind(engagement_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to get lecturer review")?;

        row.map(lecturer_review_from_row).transpose()
    }
}


async fn update_engagement_status(
    conn: &mut PgConnection,
    engagement_id: &str,
    expected: EngagementStatus,
    transition: &EngagementTransition,
) -> Result<bool> {
    let submitted_at = transition.submission.as_ref().map(|_| transition.at);
    let completed_at = transition.to.is_terminal().then_some(transition.at);

    let result = sqlx::query(
        r#"
        UPDATE review.engagements SET
            status = $2,
            peer_review_id = COALESCE($3, peer_review_id),
            submission = COALESCE($4, submission),
            submitted_at = COALESCE($5, submitted_at),
            completed_at = COALESCE($6, completed_at)
        WHERE engagement_id = $1 AND status = $7
        "#,
    )
    .bind(engagement_id)
    .bind(transition.to.as_str())
    .bind(&transition.peer_review_id)
    .bind(transition.submission.as_ref().map(Json))
    .bind(submitted_at)
    .bind(completed_at)
    .bind(expected.as_str())
    .execute(&mut *conn)
    .await
    .context("Failed to transition engagement")?;

    Ok(result.rows_affected() == 1)
}

async fn insert_peer_review_row(conn: &mut PgConnection, review: &PeerReview) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO review.peer_reviews
            (review_id, engagement_id, reviewer_id, status, code_quality, documentation,
             comments, assigned_at, submitted_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(&review.review_id)
    .bind(&review.engagement_id)
    .bind(&review.reviewer_id)
    .bind(review.status.as_str())
    .bind(review.scores.map(|s| s.code_quality as i16))
    .bind(review.scores.map(|s| s.documentation as i16))
    .bind(&review.comments)
    .bind(review.assigned_at)
    .bind(review.submitted_at)
    .execute(&mut *conn)
    .await
    .context("Failed to insert peer review")?;

    Ok(())
}

async fn insert_lecturer_review_row(conn: &mut PgConnection, review: &LecturerReview) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO review.lecturer_reviews
            (review_id, engagement_id, lecturer_id, institution, rubric, verdict,
             overall_comments, average_score, reviewed_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(&review.review_id)
    .bind(&review.engagement_id)
    .bind(&review.lecturer_id)
    .bind(&review.institution)
    .bind(Json(&review.rubric))
    .bind(review.verdict.as_str())
    .bind(&review.overall_comments)
    .bind(review.average_score)
    .bind(review.reviewed_at)
    .execute(&mut *conn)
    .await
    .context("Failed to insert lecturer review")?;

    Ok(())
}

fn engagement_from_row(row: PgRow) -> Result<ProjectEngagement> {
    let track: String = row.get("track");
    let tier: String = row.get("tier");
    let status: String = row.get("status");
    let submission: Option<Json<Submission>> = row.get("submission");

    Ok(ProjectEngagement {
        engagement_id: row.get("engagement_id"),
        student_id: row.get("student_id"),
        title: row.get("title"),
        track: parse_column(&track, "track", Track::parse)?,
        tier: parse_column(&tier, "tier", StudentTier::parse)?,
        tech_stack: row.get("tech_stack"),
        status: parse_column(&status, "engagement status", EngagementStatus::parse)?,
        peer_review_id: row.get("peer_review_id"),
        submission: submission.map(|s| s.0),
        created_at: row.get("created_at"),
        submitted_at: row.get("submitted_at"),
        completed_at: row.get("completed_at"),
    })
}

fn peer_review_from_row(row: PgRow) -> Result<PeerReview> {
    let status: String = row.get("status");
    let code_quality: Option<i16> = row.get("code_quality");
    let documentation: Option<i16> = row.get("documentation");
    let scores = match (code_quality, documentation) {
        (Some(code_quality), Some(documentation)) => Some(PeerScores {
            code_quality: code_quality as u8,
            documentation: documentation as u8,
        }),
        _ => None,
    };

    Ok(PeerReview {
        review_id: row.get("review_id"),
        engagement_id: row.get("engagement_id"),
        reviewer_id: row.get("reviewer_id"),
        status: parse_column(&status, "peer review status", PeerReviewStatus::parse)?,
        scores,
        comments: row.get("comments"),
        assigned_at: row.get("assigned_at"),
        submitted_at: row.get("submitted_at"),
    })
}

fn lecturer_review_from_row(row: PgRow) -> Result<LecturerReview> {
    let verdict: String = row.get("verdict");
    let rubric: Json<Rubric> = row.get("rubric");

    Ok(LecturerReview {
        review_id: row.get("review_id"),
        engagement_id: row.get("engagement_id"),
        lecturer_id: row.get("lecturer_id"),
        institution: row.get("institution"),
        rubric: rubric.0,
        verdict: parse_column(&verdict, "verdict", Verdict::parse)?,
        overall_comments: row.get("overall_comments"),
        average_score: row.get("average_score"),
        reviewed_at: row.get("reviewed_at"),
    })
}
