use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "vote_type", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum VoteDirection {
    Up,
    Down,
}

/// Vote counts of a single comment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub upvotes: i32,
    pub downvotes: i32,
}

impl Tally {
    pub fn new(upvotes: i32, downvotes: i32) -> Self {
        Self { upvotes, downvotes }
    }

    pub fn apply(self, transition: &VoteTransition) -> Self {
        Self {
            upvotes: self.upvotes + transition.upvotes_delta,
            downvotes: self.downvotes + transition.downvotes_delta,
        }
    }
}

/// What has to happen to the vote row of a (user, comment) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteWrite {
    Create(VoteDirection),
    Update(VoteDirection),
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteTransition {
    pub new_state: Option<VoteDirection>,
    pub write: VoteWrite,
    pub upvotes_delta: i32,
    pub downvotes_delta: i32,
}

impl VoteTransition {
    /// Resolves a cast of `requested` against the vote the user currently
    /// holds. Re-casting the held direction removes the vote.
    pub fn resolve(existing: Option<VoteDirection>, requested: VoteDirection) -> Self {
        use VoteDirection::{Down, Up};

        let (new_state, write, upvotes_delta, downvotes_delta) = match (existing, requested) {
            (None, Up) => (Some(Up), VoteWrite::Create(Up), 1, 0),
            (None, Down) => (Some(Down), VoteWrite::Create(Down), 0, 1),
            (Some(Up), Up) => (None, VoteWrite::Delete, -1, 0),
            (Some(Down), Down) => (None, VoteWrite::Delete, 0, -1),
            (Some(Up), Down) => (Some(Down), VoteWrite::Update(Down), -1, 1),
            (Some(Down), Up) => (Some(Up), VoteWrite::Update(Up), 1, -1),
        };

        Self {
            new_state,
            write,
            upvotes_delta,
            downvotes_delta,
        }
    }
}

// Vote request
#[derive(Debug, Deserialize)]
pub struct VoteRequest {
    pub vote_type: VoteDirection,
}

// The viewer's vote on a comment together with its current tallies
#[derive(Debug, Serialize, FromRow)]
pub struct VoteDetails {
    pub comment_id: Uuid,
    pub vote_type: Option<VoteDirection>,
    pub upvotes: i32,
    pub downvotes: i32,
}
