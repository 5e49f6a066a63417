use chrono::{DateTime, TimeDelta, Utc};
use sqlx::PgPool;
use std::sync::Arc;
use tokio::time::{Duration, interval};
use uuid::Uuid;

use crate::{
    config::Config,
    error::{AppError, Result},
    models::Tally,
    scoring::CommentScores,
};

#[derive(sqlx::FromRow)]
struct ScoreRefreshRow {
    upvotes: i32,
    downvotes: i32,
    created_at: DateTime<Utc>,
}

/// Start of the refresh window, or `None` if it falls outside the
/// representable time range.
fn refresh_window_start(now: DateTime<Utc>, window_hours: u32) -> Option<DateTime<Utc>> {
    TimeDelta::try_hours(i64::from(window_hours))
        .and_then(|window| now.checked_sub_signed(window))
}

#[derive(Clone)]
pub struct BackgroundJobsService {
    db: PgPool,
    config: Arc<Config>,
}

impl BackgroundJobsService {
    pub fn new(db: PgPool, config: Arc<Config>) -> Self {
        Self { db, config }
    }

    /// Start all background jobs
    pub fn start_all_jobs(&self) {
        let period = self.config.score_refresh_interval_secs;
        if period == 0 {
            tracing::info!("Comment score refresh disabled");
            return;
        }

        let jobs_service = self.clone();

        // Time-decayed scores only move on votes; keep recent comments fresh
        tokio::spawn(async move {
            let mut interval = interval(Duration::from_secs(period));
            loop {
                interval.tick().await;
                if let Err(e) = jobs_service.refresh_comment_scores().await {
                    tracing::error!("Failed to refresh comment scores: {}", e);
                }
            }
        });

        tracing::info!("Background jobs started successfully");
    }

    /// Recompute the scores of voted-on comments inside the refresh window.
    ///
    /// Each comment is re-read under its row lock and rewritten in the same
    /// transaction. Comments locked by an in-flight vote are skipped; that
    /// vote stores fresh scores itself.
    pub async fn refresh_comment_scores(&self) -> Result<u64> {
        let window_hours = self.config.score_refresh_window_hours;
        let since = refresh_window_start(Utc::now(), window_hours).ok_or_else(|| {
            AppError::Internal(format!(
                "score refresh window of {} hours is out of range",
                window_hours
            ))
        })?;

        let ids = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT id
            FROM comments
            WHERE created_at > $1 AND upvotes + downvotes > 0
            "#,
        )
        .bind(since)
        .fetch_all(&self.db)
        .await?;

        let mut refreshed = 0;
        for id in ids {
            let mut tx = self.db.begin().await?;

            let row = sqlx::query_as::<_, ScoreRefreshRow>(
                r#"
                SELECT upvotes, downvotes, created_at
                FROM comments
                WHERE id = $1
                FOR UPDATE SKIP LOCKED
                "#,
            )
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;

            // Locked by a vote, or deleted since the id scan
            let Some(row) = row else {
                continue;
            };

            let tally = Tally::new(row.upvotes, row.downvotes);
            let scores = CommentScores::compute(tally, row.created_at, Utc::now());

            sqlx::query(
                r#"
                UPDATE comments
                SET main_score = $2, hot_score = $3, top_score = $4, controversial_score = $5
                WHERE id = $1
                "#,
            )
            .bind(id)
            .bind(scores.main_score)
            .bind(scores.hot_score)
            .bind(scores.top_score)
            .bind(scores.controversial_score)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            refreshed += 1;
        }

        tracing::debug!("Refreshed scores of {} comments", refreshed);
        Ok(refreshed)
    }
}
