pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    error::Result,
    models::{CommentSnapshot, Tally, VoteDirection, VoteWrite},
    scoring::CommentScores,
};

pub use memory::{FailPoint, InMemoryVoteStore};
pub use postgres::PgVoteStore;

#[async_trait]
pub trait VoteStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn VoteTransaction>>;
}

/// One atomic unit of work. Dropping a transaction without calling
/// [`VoteTransaction::commit`] discards every write made through it.
///
/// `read_comment` must lock the comment until the transaction ends, so two
/// transactions on the same comment never both see the same tallies.
#[async_trait]
pub trait VoteTransaction: Send {
    async fn read_comment(&mut self, comment_id: Uuid) -> Result<Option<CommentSnapshot>>;

    async fn read_vote(
        &mut self,
        user_id: Uuid,
        comment_id: Uuid,
    ) -> Result<Option<VoteDirection>>;

    async fn write_vote(
        &mut self,
        user_id: Uuid,
        comment_id: Uuid,
        write: VoteWrite,
    ) -> Result<()>;

    async fn write_comment_tallies_and_scores(
        &mut self,
        comment_id: Uuid,
        tally: Tally,
        scores: &CommentScores,
    ) -> Result<()>;

    async fn commit(self: Box<Self>) -> Result<()>;
}
