use async_trait::async_trait;

use crate::{Comment, CommentId, CommentOrder, CommentRead, NewComment, Target, Time};

/// Storage seen by the write protocol.
///
/// All the calls made for one write are expected to run inside a single
/// transaction, started before `increase_comment_count` and committed only
/// once the protocol returned `Ok(Ok(_))`.
#[async_trait]
pub trait Db: Send {
    /// Bumps the comment counter of the target article, holding its row lock
    /// until the end of the transaction. Returns false if there is no such
    /// article.
    async fn increase_comment_count(&mut self, target: Target) -> anyhow::Result<bool>;

    /// 0 when the target has no comment yet
    async fn find_max_comment_order(&mut self, target: Target) -> anyhow::Result<i32>;

    async fn find_comment(&mut self, id: CommentId) -> anyhow::Result<Option<Comment>>;

    /// Like `find_comment`, but also locks the row until the end of the transaction
    async fn lock_comment(&mut self, id: CommentId) -> anyhow::Result<Option<Comment>>;

    /// Adds 1 to the sort number of every comment of the thread whose sort
    /// number is strictly greater than `threshold`, returning how many moved
    async fn increment_sort_numbers_above(
        &mut self,
        target: Target,
        comment_order: i32,
        threshold: i32,
    ) -> anyhow::Result<u64>;

    async fn insert_comment(
        &mut self,
        c: &NewComment,
        order: CommentOrder,
        now: Time,
    ) -> anyhow::Result<Comment>;

    /// Returns the parent of the updated comment
    async fn increment_child_count(&mut self, id: CommentId) -> anyhow::Result<Option<CommentId>>;

    /// Persists content, hidden flag and update time; never the position
    async fn update_comment(&mut self, c: &Comment) -> anyhow::Result<()>;

    /// In display order, with author nicknames and hidden contents masked
    async fn find_comments_on(&mut self, target: Target) -> anyhow::Result<Vec<CommentRead>>;
}
