use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use crate::models::{Tally, VoteDirection};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Comment {
    pub id: Uuid,
    pub post_id: Uuid,
    pub author_id: Uuid,
    pub parent_comment_id: Option<Uuid>,
    pub message: String,
    pub upvotes: i32,
    pub downvotes: i32,
    pub main_score: f64,
    pub hot_score: f64,
    pub top_score: f64,
    pub controversial_score: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The part of a comment the vote protocol reads: its tallies and the
/// immutable creation time the time-dependent scores decay from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CommentSnapshot {
    pub tally: Tally,
    pub created_at: DateTime<Utc>,
}

// Create comment request
#[derive(Debug, Validate, Deserialize)]
pub struct CreateCommentRequest {
    #[validate(length(min = 1, max = 10000, message = "Message is required"))]
    pub message: String,
    pub post_id: Uuid,
    pub parent_comment_id: Option<Uuid>,
}

// Update comment request
#[derive(Debug, Validate, Deserialize)]
pub struct UpdateCommentRequest {
    #[validate(length(min = 1, max = 10000, message = "Message is required"))]
    pub message: String,
}

// Comment as seen by a particular viewer
#[derive(Debug, Serialize, FromRow)]
pub struct CommentResponse {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub comment: Comment,
    pub user_vote: Option<VoteDirection>,
    pub is_author: bool,
}

// Comment sorting options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommentSort {
    #[default]
    All,
    Hot,
    Top,
    Controversial,
    New,
}

impl CommentSort {
    pub fn order_clause(self) -> &'static str {
        match self {
            CommentSort::All => "c.main_score DESC, c.created_at DESC",
            CommentSort::Hot => "c.hot_score DESC, c.created_at DESC",
            CommentSort::Top => "c.top_score DESC, c.created_at DESC",
            CommentSort::Controversial => "c.controversial_score DESC, c.created_at DESC",
            CommentSort::New => "c.created_at DESC",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[test]
    fn sort_parses_from_lowercase_names() {
        let parsed: CommentSort = serde_json::from_str("\"controversial\"").unwrap();
        assert_eq!(parsed, CommentSort::Controversial);
        assert!(serde_json::from_str::<CommentSort>("\"best\"").is_err());
    }

    #[test]
    fn each_sort_orders_by_its_own_score() {
        assert!(CommentSort::All.order_clause().starts_with("c.main_score"));
        assert!(CommentSort::Hot.order_clause().starts_with("c.hot_score"));
        assert!(CommentSort::Top.order_clause().starts_with("c.top_score"));
        assert!(
            CommentSort::Controversial
                .order_clause()
                .starts_with("c.controversial_score")
        );
        assert_eq!(CommentSort::New.order_clause(), "c.created_at DESC");
        assert_eq!(CommentSort::default(), CommentSort::All);
    }

    #[test]
    fn empty_message_is_rejected() {
        let request = UpdateCommentRequest {
            message: String::new(),
        };
        assert!(request.validate().is_err());

        let request = UpdateCommentRequest {
            message: "fair point".to_string(),
        };
        assert!(request.validate().is_ok());
    }
}
