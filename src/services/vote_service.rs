use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::{VoteDirection, VoteTransition},
    scoring::CommentScores,
    store::VoteStore,
};

/// Casts `direction` on a comment for a user and re-derives the comment's
/// tallies and scores, all in one store transaction.
///
/// Casting the direction the user already holds removes the vote. Nothing
/// is persisted unless every step succeeds.
pub async fn cast_vote(
    store: &dyn VoteStore,
    user_id: Uuid,
    comment_id: Uuid,
    direction: VoteDirection,
) -> Result<()> {
    cast_vote_at(store, user_id, comment_id, direction, Utc::now()).await
}

pub async fn cast_vote_at(
    store: &dyn VoteStore,
    user_id: Uuid,
    comment_id: Uuid,
    direction: VoteDirection,
    now: DateTime<Utc>,
) -> Result<()> {
    let mut tx = store.begin().await?;

    let comment = tx
        .read_comment(comment_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Comment not found".to_string()))?;

    let existing = tx.read_vote(user_id, comment_id).await?;
    let transition = VoteTransition::resolve(existing, direction);

    tx.write_vote(user_id, comment_id, transition.write).await?;

    let tally = comment.tally.apply(&transition);
    let scores = CommentScores::compute(tally, comment.created_at, now);

    tx.write_comment_tallies_and_scores(comment_id, tally, &scores)
        .await?;
    tx.commit().await?;

    tracing::debug!(
        %user_id,
        %comment_id,
        ?existing,
        new_state = ?transition.new_state,
        upvotes = tally.upvotes,
        downvotes = tally.downvotes,
        "Vote updated"
    );

    Ok(())
}

/// [`cast_vote`], re-run from scratch while the store reports a retryable
/// failure, at most `max_attempts` times.
pub async fn cast_vote_with_retry(
    store: &dyn VoteStore,
    user_id: Uuid,
    comment_id: Uuid,
    direction: VoteDirection,
    max_attempts: u32,
) -> Result<()> {
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match cast_vote(store, user_id, comment_id, direction).await {
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                tracing::warn!(
                    %comment_id,
                    attempt,
                    max_attempts,
                    "Retrying vote after transaction failure: {}",
                    e
                );
                attempt += 1;
            }
            result => return result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::Tally,
        store::{FailPoint, InMemoryVoteStore},
    };
    use chrono::Duration;
    use crate::models::VoteDirection::{Down, Up};

    async fn store_with_comment(created_at: DateTime<Utc>) -> (InMemoryVoteStore, Uuid) {
        let store = InMemoryVoteStore::new();
        let comment_id = Uuid::new_v4();
        store.insert_comment(comment_id, created_at).await;
        (store, comment_id)
    }

    #[tokio::test]
    async fn first_upvote_creates_vote_and_scores() {
        let now = Utc::now();
        let (store, comment_id) = store_with_comment(now - Duration::hours(1)).await;
        let user_id = Uuid::new_v4();

        cast_vote_at(&store, user_id, comment_id, Up, now)
            .await
            .unwrap();

        let comment = store.comment(comment_id).await.unwrap();
        assert_eq!(comment.tally, Tally::new(1, 0));
        assert_eq!(store.vote(user_id, comment_id).await, Some(Up));
        assert_eq!(
            comment.scores,
            CommentScores::compute(Tally::new(1, 0), comment.created_at, now)
        );
        assert_eq!(comment.scores.top_score, 1.0);
    }

    #[tokio::test]
    async fn up_down_down_walk_from_existing_tallies() {
        let (store, comment_id) = store_with_comment(Utc::now()).await;
        for direction in [Up, Up, Up, Down] {
            store.seed_vote(Uuid::new_v4(), comment_id, direction).await;
        }
        let user_id = Uuid::new_v4();

        cast_vote(&store, user_id, comment_id, Up).await.unwrap();
        assert_eq!(store.comment(comment_id).await.unwrap().tally, Tally::new(4, 1));
        assert_eq!(store.vote(user_id, comment_id).await, Some(Up));

        cast_vote(&store, user_id, comment_id, Down).await.unwrap();
        assert_eq!(store.comment(comment_id).await.unwrap().tally, Tally::new(3, 2));
        assert_eq!(store.vote(user_id, comment_id).await, Some(Down));

        cast_vote(&store, user_id, comment_id, Down).await.unwrap();
        assert_eq!(store.comment(comment_id).await.unwrap().tally, Tally::new(3, 1));
        assert_eq!(store.vote(user_id, comment_id).await, None);

        assert_eq!(
            store.count_votes(comment_id).await,
            store.comment(comment_id).await.unwrap().tally
        );
    }

    #[tokio::test]
    async fn double_upvote_is_a_no_op() {
        let (store, comment_id) = store_with_comment(Utc::now()).await;
        let user_id = Uuid::new_v4();

        cast_vote(&store, user_id, comment_id, Up).await.unwrap();
        cast_vote(&store, user_id, comment_id, Up).await.unwrap();

        let comment = store.comment(comment_id).await.unwrap();
        assert_eq!(comment.tally, Tally::default());
        assert_eq!(comment.scores, CommentScores::default());
        assert_eq!(store.vote(user_id, comment_id).await, None);
    }

    #[tokio::test]
    async fn missing_comment_is_not_found() {
        let store = InMemoryVoteStore::new();

        let err = cast_vote(&store, Uuid::new_v4(), Uuid::new_v4(), Down)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn failure_at_any_step_persists_nothing() {
        for point in [
            FailPoint::Begin,
            FailPoint::ReadComment,
            FailPoint::ReadVote,
            FailPoint::WriteVote,
            FailPoint::WriteComment,
            FailPoint::Commit,
        ] {
            let (store, comment_id) = store_with_comment(Utc::now()).await;
            let user_id = Uuid::new_v4();
            store.fail_next(point).await;

            let err = cast_vote(&store, user_id, comment_id, Up).await.unwrap_err();
            assert!(matches!(err, AppError::TransactionFailed(_)), "{point:?}");

            let comment = store.comment(comment_id).await.unwrap();
            assert_eq!(comment.tally, Tally::default(), "{point:?}");
            assert_eq!(store.vote(user_id, comment_id).await, None, "{point:?}");
        }
    }

    #[tokio::test]
    async fn retry_recovers_from_one_failure() {
        let (store, comment_id) = store_with_comment(Utc::now()).await;
        let user_id = Uuid::new_v4();
        store.fail_next(FailPoint::Commit).await;

        cast_vote_with_retry(&store, user_id, comment_id, Down, 3)
            .await
            .unwrap();

        assert_eq!(store.comment(comment_id).await.unwrap().tally, Tally::new(0, 1));
        assert_eq!(store.vote(user_id, comment_id).await, Some(Down));
    }

    #[tokio::test]
    async fn retry_gives_up_after_max_attempts() {
        let (store, comment_id) = store_with_comment(Utc::now()).await;
        store.fail_next(FailPoint::WriteVote).await;

        let err = cast_vote_with_retry(&store, Uuid::new_v4(), comment_id, Up, 1)
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn retry_does_not_repeat_not_found() {
        let store = InMemoryVoteStore::new();
        let missing = Uuid::new_v4();
        store.fail_next(FailPoint::Commit).await;

        let err = cast_vote_with_retry(&store, Uuid::new_v4(), missing, Up, 5)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
