use chrono::{DateTime, Utc};

use crate::models::Tally;

/// Comments need at least this many votes before `main_score` moves off zero.
const MIN_VOTE_THRESHOLD: i32 = 1;

const DECAY_OFFSET_HOURS: f64 = 2.0;
const DECAY_EXPONENT: f64 = 1.5;

/// Age of a comment in seconds. A creation time in the future (clock skew)
/// counts as age zero.
fn age_seconds(created_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let age = (now - created_at).num_milliseconds() as f64 / 1000.0;
    age.max(0.0)
}

/// Vote difference scaled by a decay that starts at `2^-1.5` and falls
/// toward zero as the comment ages.
pub fn main_score(
    upvotes: i32,
    downvotes: i32,
    created_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> f64 {
    let diff = f64::from(upvotes) - f64::from(downvotes);
    let total = i64::from(upvotes) + i64::from(downvotes);

    if total < i64::from(MIN_VOTE_THRESHOLD) {
        return 0.0;
    }

    let age_hours = age_seconds(created_at, now) / 3600.0;
    let decay = 1.0 / (age_hours + DECAY_OFFSET_HOURS).powf(DECAY_EXPONENT);

    diff * decay
}

/// `main_score` with a second, per-second recency factor on top, so hot
/// comments fall off much faster than in the default ordering.
pub fn hot_score(
    upvotes: i32,
    downvotes: i32,
    created_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> f64 {
    let base = main_score(upvotes, downvotes, created_at, now);
    let recency = 1.0 / (age_seconds(created_at, now) + 1.0);

    base * recency
}

pub fn top_score(upvotes: i32, downvotes: i32) -> f64 {
    f64::from(upvotes) - f64::from(downvotes)
}

/// Highest when both sides have many votes and are evenly split.
pub fn controversial_score(upvotes: i32, downvotes: i32) -> f64 {
    let total = f64::from(upvotes) + f64::from(downvotes);

    if total == 0.0 {
        return 0.0;
    }

    let high = upvotes.max(downvotes);
    let low = upvotes.min(downvotes);
    let balance = f64::from(low) / f64::from(high);
    let magnitude = total.log10();

    balance * magnitude
}

/// All four scores of a comment, computed against a single clock reading.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CommentScores {
    pub main_score: f64,
    pub hot_score: f64,
    pub top_score: f64,
    pub controversial_score: f64,
}

impl CommentScores {
    pub fn compute(tally: Tally, created_at: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        let Tally { upvotes, downvotes } = tally;

        Self {
            main_score: main_score(upvotes, downvotes, created_at, now),
            hot_score: hot_score(upvotes, downvotes, created_at, now),
            top_score: top_score(upvotes, downvotes),
            controversial_score: controversial_score(upvotes, downvotes),
        }
    }
}
