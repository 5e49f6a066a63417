use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::{CommentSnapshot, Tally, VoteDirection, VoteWrite},
    scoring::CommentScores,
    store::{VoteStore, VoteTransaction},
};

#[derive(Clone)]
pub struct PgVoteStore {
    db: PgPool,
}

impl PgVoteStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

pub struct PgVoteTransaction {
    tx: Transaction<'static, Postgres>,
}

#[derive(sqlx::FromRow)]
struct CommentTallyRow {
    upvotes: i32,
    downvotes: i32,
    created_at: DateTime<Utc>,
}

fn transaction_failed(step: &'static str) -> impl FnOnce(sqlx::Error) -> AppError {
    move |e| {
        tracing::warn!("Vote transaction failed at {}: {:?}", step, e);
        AppError::TransactionFailed(format!("{}: {}", step, e))
    }
}

#[async_trait]
impl VoteStore for PgVoteStore {
    async fn begin(&self) -> Result<Box<dyn VoteTransaction>> {
        let tx = self.db.begin().await.map_err(transaction_failed("begin"))?;
        Ok(Box::new(PgVoteTransaction { tx }))
    }
}

#[async_trait]
impl VoteTransaction for PgVoteTransaction {
    async fn read_comment(&mut self, comment_id: Uuid) -> Result<Option<CommentSnapshot>> {
        // Row lock: concurrent votes on this comment wait here until we commit.
        let row = sqlx::query_as::<_, CommentTallyRow>(
            "SELECT upvotes, downvotes, created_at FROM comments WHERE id = $1 FOR UPDATE",
        )
        .bind(comment_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(transaction_failed("read comment"))?;

        Ok(row.map(|row| CommentSnapshot {
            tally: Tally::new(row.upvotes, row.downvotes),
            created_at: row.created_at,
        }))
    }

    async fn read_vote(
        &mut self,
        user_id: Uuid,
        comment_id: Uuid,
    ) -> Result<Option<VoteDirection>> {
        sqlx::query_scalar::<_, VoteDirection>(
            "SELECT vote_type FROM comment_votes WHERE user_id = $1 AND comment_id = $2",
        )
        .bind(user_id)
        .bind(comment_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(transaction_failed("read vote"))
    }

    async fn write_vote(
        &mut self,
        user_id: Uuid,
        comment_id: Uuid,
        write: VoteWrite,
    ) -> Result<()> {
        let query = match write {
            VoteWrite::Create(direction) => sqlx::query(
                r#"
                INSERT INTO comment_votes (user_id, comment_id, vote_type, created_at, updated_at)
                VALUES ($1, $2, $3, NOW(), NOW())
                "#,
            )
            .bind(user_id)
            .bind(comment_id)
            .bind(direction),
            VoteWrite::Update(direction) => sqlx::query(
                r#"
                UPDATE comment_votes
                SET vote_type = $3, updated_at = NOW()
                WHERE user_id = $1 AND comment_id = $2
                "#,
            )
            .bind(user_id)
            .bind(comment_id)
            .bind(direction),
            VoteWrite::Delete => {
                sqlx::query("DELETE FROM comment_votes WHERE user_id = $1 AND comment_id = $2")
                    .bind(user_id)
                    .bind(comment_id)
            }
        };

        let result = query
            .execute(&mut *self.tx)
            .await
            .map_err(transaction_failed("write vote"))?;

        if result.rows_affected() != 1 {
            return Err(AppError::TransactionFailed(format!(
                "write vote: expected one row for {:?}, got {}",
                write,
                result.rows_affected()
            )));
        }

        Ok(())
    }

    async fn write_comment_tallies_and_scores(
        &mut self,
        comment_id: Uuid,
        tally: Tally,
        scores: &CommentScores,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE comments
            SET upvotes = $2, downvotes = $3,
                main_score = $4, hot_score = $5, top_score = $6, controversial_score = $7,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(comment_id)
        .bind(tally.upvotes)
        .bind(tally.downvotes)
        .bind(scores.main_score)
        .bind(scores.hot_score)
        .bind(scores.top_score)
        .bind(scores.controversial_score)
        .execute(&mut *self.tx)
        .await
        .map_err(transaction_failed("write comment"))?;

        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await.map_err(transaction_failed("commit"))
    }
}
