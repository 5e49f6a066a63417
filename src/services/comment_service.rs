use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    error::Result,
    models::{
        Comment, CommentResponse, CommentSort, CreateCommentRequest, UpdateCommentRequest,
        VoteDetails,
    },
};

const VIEWER_COMMENT_COLUMNS: &str = r#"
    c.*,
    cv.vote_type AS user_vote,
    COALESCE(c.author_id = $1, false) AS is_author
"#;

pub async fn get_comment_by_id_raw(db: &PgPool, comment_id: Uuid) -> Result<Option<Comment>> {
    let comment = sqlx::query_as::<_, Comment>("SELECT * FROM comments WHERE id = $1")
        .bind(comment_id)
        .fetch_optional(db)
        .await?;

    Ok(comment)
}

pub async fn create_comment(
    db: &PgPool,
    author_id: Uuid,
    request: &CreateCommentRequest,
) -> Result<Comment> {
    let now = Utc::now();

    let comment = sqlx::query_as::<_, Comment>(
        r#"
        INSERT INTO comments (id, post_id, author_id, parent_comment_id, message, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $6)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(request.post_id)
    .bind(author_id)
    .bind(request.parent_comment_id)
    .bind(&request.message)
    .bind(now)
    .fetch_one(db)
    .await?;

    tracing::debug!(comment_id = %comment.id, post_id = %comment.post_id, "Comment created");
    Ok(comment)
}

pub async fn update_comment(
    db: &PgPool,
    comment_id: Uuid,
    request: &UpdateCommentRequest,
) -> Result<Comment> {
    let comment = sqlx::query_as::<_, Comment>(
        r#"
        UPDATE comments
        SET message = $1, updated_at = NOW()
        WHERE id = $2
        RETURNING *
        "#,
    )
    .bind(&request.message)
    .bind(comment_id)
    .fetch_one(db)
    .await?;

    Ok(comment)
}

/// Deletes a comment together with its replies. Votes on either go with
/// them through the foreign keys.
pub async fn delete_comment(db: &PgPool, comment_id: Uuid) -> Result<()> {
    let mut tx = db.begin().await?;

    let replies = sqlx::query("DELETE FROM comments WHERE parent_comment_id = $1")
        .bind(comment_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    sqlx::query("DELETE FROM comments WHERE id = $1")
        .bind(comment_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    tracing::debug!(%comment_id, replies, "Comment deleted");
    Ok(())
}

/// Top-level comments of a post in the requested order.
pub async fn get_post_comments(
    db: &PgPool,
    post_id: Uuid,
    viewer_id: Option<Uuid>,
    sort: CommentSort,
) -> Result<Vec<CommentResponse>> {
    let query = format!(
        r#"
        SELECT {}
        FROM comments c
        LEFT JOIN comment_votes cv ON cv.comment_id = c.id AND cv.user_id = $1
        WHERE c.post_id = $2 AND c.parent_comment_id IS NULL
        ORDER BY {}
        "#,
        VIEWER_COMMENT_COLUMNS,
        sort.order_clause()
    );

    let comments = sqlx::query_as::<_, CommentResponse>(&query)
        .bind(viewer_id)
        .bind(post_id)
        .fetch_all(db)
        .await?;

    Ok(comments)
}

/// Direct replies to a comment, newest first.
pub async fn get_comment_replies(
    db: &PgPool,
    parent_comment_id: Uuid,
    viewer_id: Option<Uuid>,
) -> Result<Vec<CommentResponse>> {
    let query = format!(
        r#"
        SELECT {}
        FROM comments c
        LEFT JOIN comment_votes cv ON cv.comment_id = c.id AND cv.user_id = $1
        WHERE c.parent_comment_id = $2
        ORDER BY {}
        "#,
        VIEWER_COMMENT_COLUMNS,
        CommentSort::New.order_clause()
    );

    let replies = sqlx::query_as::<_, CommentResponse>(&query)
        .bind(viewer_id)
        .bind(parent_comment_id)
        .fetch_all(db)
        .await?;

    Ok(replies)
}

pub async fn get_vote_details(
    db: &PgPool,
    user_id: Uuid,
    comment_id: Uuid,
) -> Result<Option<VoteDetails>> {
    let details = sqlx::query_as::<_, VoteDetails>(
        r#"
        SELECT c.id AS comment_id, cv.vote_type, c.upvotes, c.downvotes
        FROM comments c
        LEFT JOIN comment_votes cv ON cv.comment_id = c.id AND cv.user_id = $1
        WHERE c.id = $2
        "#,
    )
    .bind(user_id)
    .bind(comment_id)
    .fetch_optional(db)
    .await?;

    Ok(details)
}
