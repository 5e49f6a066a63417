use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;
use validator::Validate;

use crate::{
    AppState,
    auth::{AuthUser, OptionalAuthUser},
    error::{AppError, Result},
    models::{
        Comment, CommentSort, CreateCommentRequest, UpdateCommentRequest, VoteDetails,
        VoteRequest,
    },
    services::{comment_service, vote_service},
    store::PgVoteStore,
};

#[derive(Debug, Deserialize)]
pub struct GetCommentsQuery {
    pub sort: Option<CommentSort>,
}

async fn require_author(state: &AppState, comment_id: Uuid, user_id: Uuid) -> Result<Comment> {
    let comment = comment_service::get_comment_by_id_raw(&state.db, comment_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Comment not found".to_string()))?;

    if comment.author_id != user_id {
        return Err(AppError::Authorization(
            "You can only change your own comments".to_string(),
        ));
    }

    Ok(comment)
}

pub async fn create_comment(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(payload): Json<CreateCommentRequest>,
) -> Result<Json<Value>> {
    payload.validate()?;

    // Check rate limiting
    let rate_limit_key = format!("comment_create:user:{}", auth_user.user_id);
    if !state
        .redis
        .check_rate_limit(&rate_limit_key, 10, 60)
        .await?
    {
        return Err(AppError::RateLimit);
    }

    // If replying to a comment, verify parent comment exists
    if let Some(parent_id) = payload.parent_comment_id {
        let parent_comment = comment_service::get_comment_by_id_raw(&state.db, parent_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Parent comment not found".to_string()))?;

        if parent_comment.post_id != payload.post_id {
            return Err(AppError::BadRequest(
                "Parent comment is not on the same post".to_string(),
            ));
        }
    }

    let comment = comment_service::create_comment(&state.db, auth_user.user_id, &payload).await?;

    Ok(Json(json!({
        "comment": comment,
        "message": "Comment added!"
    })))
}

pub async fn get_post_comments(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
    Query(params): Query<GetCommentsQuery>,
    auth_user: OptionalAuthUser,
) -> Result<Json<Value>> {
    let sort = params.sort.unwrap_or_default();

    let comments =
        comment_service::get_post_comments(&state.db, post_id, auth_user.user_id(), sort).await?;

    Ok(Json(json!({
        "comments": comments,
        "post_id": post_id
    })))
}

pub async fn get_comment_replies(
    State(state): State<AppState>,
    Path(comment_id): Path<Uuid>,
    auth_user: OptionalAuthUser,
) -> Result<Json<Value>> {
    let replies =
        comment_service::get_comment_replies(&state.db, comment_id, auth_user.user_id()).await?;

    Ok(Json(json!({
        "comments": replies,
        "parent_comment_id": comment_id
    })))
}

pub async fn update_comment(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(comment_id): Path<Uuid>,
    Json(payload): Json<UpdateCommentRequest>,
) -> Result<Json<Value>> {
    payload.validate()?;

    require_author(&state, comment_id, auth_user.user_id).await?;

    let comment = comment_service::update_comment(&state.db, comment_id, &payload).await?;

    Ok(Json(json!({
        "comment": comment,
        "message": "Comment updated successfully!"
    })))
}

pub async fn delete_comment(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(comment_id): Path<Uuid>,
) -> Result<Json<Value>> {
    require_author(&state, comment_id, auth_user.user_id).await?;

    comment_service::delete_comment(&state.db, comment_id).await?;

    Ok(Json(json!({
        "message": "Comment deleted successfully!"
    })))
}

pub async fn vote_comment(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(comment_id): Path<Uuid>,
    Json(payload): Json<VoteRequest>,
) -> Result<Json<Value>> {
    // Check rate limiting
    let rate_limit_key = format!("comment_vote:user:{}", auth_user.user_id);
    if !state
        .redis
        .check_rate_limit(&rate_limit_key, 30, 60)
        .await?
    {
        return Err(AppError::RateLimit);
    }

    let store = PgVoteStore::new(state.db.clone());
    vote_service::cast_vote_with_retry(
        &store,
        auth_user.user_id,
        comment_id,
        payload.vote_type,
        state.config.vote_max_attempts,
    )
    .await?;

    Ok(Json(json!({
        "message": "Vote updated successfully"
    })))
}

pub async fn get_vote_details(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(comment_id): Path<Uuid>,
) -> Result<Json<VoteDetails>> {
    let details = comment_service::get_vote_details(&state.db, auth_user.user_id, comment_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Comment not found".to_string()))?;

    Ok(Json(details))
}
