use std::{
    collections::HashMap,
    sync::{Arc, Mutex as SyncMutex, PoisonError},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::{CommentSnapshot, Tally, VoteDirection, VoteWrite},
    scoring::CommentScores,
    store::{VoteStore, VoteTransaction},
};

/// Transaction step at which [`InMemoryVoteStore::fail_next`] injects a
/// store failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    Begin,
    ReadComment,
    ReadVote,
    WriteVote,
    WriteComment,
    Commit,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredComment {
    pub tally: Tally,
    pub scores: CommentScores,
    pub created_at: DateTime<Utc>,
}

#[derive(Default)]
struct Tables {
    comments: HashMap<Uuid, StoredComment>,
    votes: HashMap<(Uuid, Uuid), VoteDirection>,
}

/// Vote store kept in process memory.
///
/// Each existing comment gets an async lock, taken by `read_comment` and
/// held until the transaction commits or is dropped. The lock entry is
/// removed once no transaction holds or waits on it. Writes are buffered in
/// the transaction and become visible together at commit.
#[derive(Clone, Default)]
pub struct InMemoryVoteStore {
    tables: Arc<RwLock<Tables>>,
    row_locks: Arc<SyncMutex<HashMap<Uuid, Arc<Mutex<()>>>>>,
    fail_point: Arc<Mutex<Option<FailPoint>>>,
}

impl InMemoryVoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_comment(&self, comment_id: Uuid, created_at: DateTime<Utc>) {
        let mut tables = self.tables.write().await;
        tables.comments.insert(
            comment_id,
            StoredComment {
                tally: Tally::default(),
                scores: CommentScores::default(),
                created_at,
            },
        );
    }

    /// Adds a vote row and counts it in the comment's tally, bypassing the
    /// vote protocol. Returns false if the comment is unknown or the user
    /// already voted on it.
    pub async fn seed_vote(
        &self,
        user_id: Uuid,
        comment_id: Uuid,
        direction: VoteDirection,
    ) -> bool {
        let mut tables = self.tables.write().await;
        let Tables { comments, votes } = &mut *tables;

        let Some(comment) = comments.get_mut(&comment_id) else {
            return false;
        };
        if votes.contains_key(&(user_id, comment_id)) {
            return false;
        }

        votes.insert((user_id, comment_id), direction);
        match direction {
            VoteDirection::Up => comment.tally.upvotes += 1,
            VoteDirection::Down => comment.tally.downvotes += 1,
        }
        true
    }

    pub async fn comment(&self, comment_id: Uuid) -> Option<StoredComment> {
        self.tables.read().await.comments.get(&comment_id).cloned()
    }

    pub async fn vote(&self, user_id: Uuid, comment_id: Uuid) -> Option<VoteDirection> {
        self.tables
            .read()
            .await
            .votes
            .get(&(user_id, comment_id))
            .copied()
    }

    /// Number of vote rows on a comment, per direction.
    pub async fn count_votes(&self, comment_id: Uuid) -> Tally {
        let tables = self.tables.read().await;
        tables
            .votes
            .iter()
            .filter(|((_, voted_on), _)| *voted_on == comment_id)
            .fold(Tally::default(), |mut tally, (_, direction)| {
                match direction {
                    VoteDirection::Up => tally.upvotes += 1,
                    VoteDirection::Down => tally.downvotes += 1,
                }
                tally
            })
    }

    /// Makes the next transaction step matching `point` fail once.
    pub async fn fail_next(&self, point: FailPoint) {
        *self.fail_point.lock().await = Some(point);
    }

    async fn trip(&self, point: FailPoint) -> Result<()> {
        let mut armed = self.fail_point.lock().await;
        if *armed == Some(point) {
            armed.take();
            return Err(AppError::TransactionFailed(format!(
                "injected failure at {:?}",
                point
            )));
        }
        Ok(())
    }

    fn row_lock(&self, comment_id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.row_locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(comment_id).or_default().clone()
    }

    /// Drops the lock entries of `comment_ids` nobody else holds a handle to.
    fn release_row_locks(&self, comment_ids: impl IntoIterator<Item = Uuid>) {
        let mut locks = self.row_locks.lock().unwrap_or_else(PoisonError::into_inner);
        for comment_id in comment_ids {
            if locks
                .get(&comment_id)
                .is_some_and(|lock| Arc::strong_count(lock) == 1)
            {
                locks.remove(&comment_id);
            }
        }
    }
}

pub struct InMemoryTransaction {
    store: InMemoryVoteStore,
    row_guards: HashMap<Uuid, OwnedMutexGuard<()>>,
    vote_writes: HashMap<(Uuid, Uuid), Option<VoteDirection>>,
    comment_writes: HashMap<Uuid, (Tally, CommentScores)>,
}

#[async_trait]
impl VoteStore for InMemoryVoteStore {
    async fn begin(&self) -> Result<Box<dyn VoteTransaction>> {
        self.trip(FailPoint::Begin).await?;

        Ok(Box::new(InMemoryTransaction {
            store: self.clone(),
            row_guards: HashMap::new(),
            vote_writes: HashMap::new(),
            comment_writes: HashMap::new(),
        }))
    }
}

impl InMemoryTransaction {
    async fn current_vote(&self, key: (Uuid, Uuid)) -> Option<VoteDirection> {
        match self.vote_writes.get(&key) {
            Some(pending) => *pending,
            None => self.store.tables.read().await.votes.get(&key).copied(),
        }
    }
}

#[async_trait]
impl VoteTransaction for InMemoryTransaction {
    async fn read_comment(&mut self, comment_id: Uuid) -> Result<Option<CommentSnapshot>> {
        self.store.trip(FailPoint::ReadComment).await?;

        // Unknown ids never get a lock entry.
        if !self.store.tables.read().await.comments.contains_key(&comment_id) {
            return Ok(None);
        }

        if !self.row_guards.contains_key(&comment_id) {
            let lock = self.store.row_lock(comment_id);
            let guard = lock.lock_owned().await;
            self.row_guards.insert(comment_id, guard);
        }

        let tables = self.store.tables.read().await;
        let Some(stored) = tables.comments.get(&comment_id) else {
            return Ok(None);
        };

        let tally = self
            .comment_writes
            .get(&comment_id)
            .map(|(tally, _)| *tally)
            .unwrap_or(stored.tally);

        Ok(Some(CommentSnapshot {
            tally,
            created_at: stored.created_at,
        }))
    }

    async fn read_vote(
        &mut self,
        user_id: Uuid,
        comment_id: Uuid,
    ) -> Result<Option<VoteDirection>> {
        self.store.trip(FailPoint::ReadVote).await?;
        Ok(self.current_vote((user_id, comment_id)).await)
    }

    async fn write_vote(
        &mut self,
        user_id: Uuid,
        comment_id: Uuid,
        write: VoteWrite,
    ) -> Result<()> {
        self.store.trip(FailPoint::WriteVote).await?;

        let key = (user_id, comment_id);
        let current = self.current_vote(key).await;

        let next = match (current, write) {
            (None, VoteWrite::Create(direction)) => Some(direction),
            (Some(_), VoteWrite::Update(direction)) => Some(direction),
            (Some(_), VoteWrite::Delete) => None,
            (current, write) => {
                return Err(AppError::TransactionFailed(format!(
                    "write vote: {:?} conflicts with stored vote {:?}",
                    write, current
                )));
            }
        };

        self.vote_writes.insert(key, next);
        Ok(())
    }

    async fn write_comment_tallies_and_scores(
        &mut self,
        comment_id: Uuid,
        tally: Tally,
        scores: &CommentScores,
    ) -> Result<()> {
        self.store.trip(FailPoint::WriteComment).await?;

        if !self.row_guards.contains_key(&comment_id) {
            return Err(AppError::TransactionFailed(
                "write comment: comment was not read in this transaction".to_string(),
            ));
        }
        if !self.store.tables.read().await.comments.contains_key(&comment_id) {
            return Err(AppError::TransactionFailed(
                "write comment: comment no longer exists".to_string(),
            ));
        }

        self.comment_writes.insert(comment_id, (tally, *scores));
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.store.trip(FailPoint::Commit).await?;

        let mut tables = self.store.tables.write().await;

        for (key, vote) in &self.vote_writes {
            match vote {
                Some(direction) => {
                    tables.votes.insert(*key, *direction);
                }
                None => {
                    tables.votes.remove(key);
                }
            }
        }

        for (comment_id, (tally, scores)) in &self.comment_writes {
            if let Some(stored) = tables.comments.get_mut(comment_id) {
                stored.tally = *tally;
                stored.scores = *scores;
            }
        }

        // Row guards are released when `self` drops, after the writes above.
        drop(tables);
        Ok(())
    }
}

impl Drop for InMemoryTransaction {
    fn drop(&mut self) {
        let comment_ids: Vec<Uuid> = self.row_guards.keys().copied().collect();
        self.row_guards.clear();
        self.store.release_row_locks(comment_ids);
    }
}
