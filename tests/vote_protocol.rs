use blog_comments::{
    models::{Tally, VoteDirection},
    scoring::CommentScores,
    services::vote_service,
    store::InMemoryVoteStore,
};
use chrono::{Duration, Utc};
use tokio::task::JoinSet;
use uuid::Uuid;

async fn fresh_comment(store: &InMemoryVoteStore) -> Uuid {
    let comment_id = Uuid::new_v4();
    store
        .insert_comment(comment_id, Utc::now() - Duration::minutes(10))
        .await;
    comment_id
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_upvotes_are_never_lost() {
    const VOTERS: i32 = 200;

    let store = InMemoryVoteStore::new();
    let comment_id = fresh_comment(&store).await;

    let mut tasks = JoinSet::new();
    for _ in 0..VOTERS {
        let store = store.clone();
        tasks.spawn(async move {
            vote_service::cast_vote(&store, Uuid::new_v4(), comment_id, VoteDirection::Up).await
        });
    }
    while let Some(result) = tasks.join_next().await {
        result.expect("task panicked").expect("vote failed");
    }

    let comment = store.comment(comment_id).await.unwrap();
    assert_eq!(comment.tally, Tally::new(VOTERS, 0));
    assert_eq!(store.count_votes(comment_id).await, comment.tally);
    assert_eq!(comment.scores.top_score, f64::from(VOTERS));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_mixed_votes_match_vote_rows() {
    let store = InMemoryVoteStore::new();
    let comment_id = fresh_comment(&store).await;

    let mut tasks = JoinSet::new();
    for i in 0..120 {
        let store = store.clone();
        let user_id = Uuid::new_v4();
        // every third user flips their vote, every fifth toggles it off
        let casts = match i % 15 {
            0 => vec![VoteDirection::Up, VoteDirection::Up],
            n if n % 3 == 0 => vec![VoteDirection::Up, VoteDirection::Down],
            n if n % 5 == 0 => vec![VoteDirection::Down, VoteDirection::Down],
            n if n % 2 == 0 => vec![VoteDirection::Up],
            _ => vec![VoteDirection::Down],
        };
        tasks.spawn(async move {
            for direction in casts {
                vote_service::cast_vote(&store, user_id, comment_id, direction).await?;
            }
            Ok::<_, blog_comments::error::AppError>(())
        });
    }
    while let Some(result) = tasks.join_next().await {
        result.expect("task panicked").expect("vote failed");
    }

    let comment = store.comment(comment_id).await.unwrap();
    assert_eq!(store.count_votes(comment_id).await, comment.tally);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn votes_on_different_comments_proceed_independently() {
    let store = InMemoryVoteStore::new();
    let mut comments = Vec::new();
    for _ in 0..8 {
        comments.push(fresh_comment(&store).await);
    }

    let mut tasks = JoinSet::new();
    for (index, comment_id) in comments.iter().copied().enumerate() {
        for _ in 0..=index {
            let store = store.clone();
            tasks.spawn(async move {
                vote_service::cast_vote(&store, Uuid::new_v4(), comment_id, VoteDirection::Down)
                    .await
            });
        }
    }
    while let Some(result) = tasks.join_next().await {
        result.expect("task panicked").expect("vote failed");
    }

    for (index, comment_id) in comments.into_iter().enumerate() {
        let comment = store.comment(comment_id).await.unwrap();
        assert_eq!(comment.tally, Tally::new(0, index as i32 + 1));
    }
}

#[tokio::test]
async fn stored_scores_match_a_direct_computation() {
    let store = InMemoryVoteStore::new();
    let comment_id = Uuid::new_v4();
    let created_at = Utc::now() - Duration::hours(1);
    store.insert_comment(comment_id, created_at).await;

    for _ in 0..5 {
        store
            .seed_vote(Uuid::new_v4(), comment_id, VoteDirection::Down)
            .await;
    }
    for _ in 0..4 {
        store
            .seed_vote(Uuid::new_v4(), comment_id, VoteDirection::Up)
            .await;
    }

    let now = Utc::now();
    vote_service::cast_vote_at(&store, Uuid::new_v4(), comment_id, VoteDirection::Up, now)
        .await
        .unwrap();

    let comment = store.comment(comment_id).await.unwrap();
    assert_eq!(comment.tally, Tally::new(5, 5));
    assert_eq!(
        comment.scores,
        CommentScores::compute(Tally::new(5, 5), created_at, now)
    );
    assert!((comment.scores.controversial_score - 1.0).abs() < 1e-9);
    assert_eq!(comment.scores.main_score, 0.0);
}
