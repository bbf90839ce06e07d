use std::{str::FromStr, time::Duration};

use anyhow::Context;
use chrono::Utc;
use remark_api::{
    AuthToken, Comment, CommentId, CommentOrder, CommentRead, NewComment, Target, TargetType,
    Time, UserId,
};
use sqlx::Connection;

use crate::Error;

const COMMENT_COLUMNS: &str = "
    c.id, c.user_id, c.content, c.target_type, c.target_id, c.parent_id,
    c.comment_order, c.level, c.sort_number, c.child_count, c.is_hidden,
    c.created_at, c.updated_at
";

#[derive(sqlx::FromRow)]
struct CommentRow {
    id: i64,
    user_id: i64,
    content: String,
    target_type: String,
    target_id: i64,
    parent_id: Option<i64>,
    comment_order: i32,
    level: i32,
    sort_number: i32,
    child_count: i32,
    is_hidden: bool,
    created_at: Time,
    updated_at: Time,
}

impl TryFrom<CommentRow> for Comment {
    type Error = anyhow::Error;

    fn try_from(r: CommentRow) -> anyhow::Result<Comment> {
        Ok(Comment {
            id: CommentId(r.id),
            owner: UserId(r.user_id),
            content: r.content,
            target: Target::new(
                TargetType::from_str(&r.target_type)
                    .with_context(|| format!("parsing target type of comment {}", r.id))?,
                r.target_id,
            ),
            order: CommentOrder {
                comment_order: r.comment_order,
                level: r.level,
                sort_number: r.sort_number,
                parent_id: r.parent_id.map(CommentId),
                child_count: r.child_count,
            },
            hidden: r.is_hidden,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct CommentReadRow {
    #[sqlx(flatten)]
    comment: CommentRow,
    nickname: Option<String>,
}

impl TryFrom<CommentReadRow> for CommentRead {
    type Error = anyhow::Error;

    fn try_from(r: CommentReadRow) -> anyhow::Result<CommentRead> {
        Ok(CommentRead::new(Comment::try_from(r.comment)?, r.nickname))
    }
}

pub async fn recover_session(
    conn: &mut sqlx::PgConnection,
    token: AuthToken,
) -> Result<UserId, Error> {
    let user = sqlx::query_scalar::<_, i64>("SELECT user_id FROM sessions WHERE token = $1")
        .bind(token.0)
        .fetch_optional(conn)
        .await
        .context("recovering session")?;
    match user {
        Some(u) => Ok(UserId(u)),
        None => Err(Error::unauthenticated()),
    }
}

pub async fn fetch_comment(
    conn: &mut sqlx::PgConnection,
    id: CommentId,
) -> anyhow::Result<Option<CommentRead>> {
    sqlx::query_as::<_, CommentReadRow>(&format!(
        "
            SELECT {COMMENT_COLUMNS}, u.nickname
                FROM comments c
            LEFT JOIN users u
                ON u.id = c.user_id
            WHERE c.id = $1
        "
    ))
    .bind(id.0)
    .fetch_optional(conn)
    .await
    .with_context(|| format!("querying comment {id:?}"))?
    .map(CommentRead::try_from)
    .transpose()
}

async fn begin(
    conn: &mut sqlx::PgConnection,
    lock_timeout: Duration,
) -> anyhow::Result<sqlx::Transaction<'_, sqlx::Postgres>> {
    let mut tx = conn.begin().await.context("starting transaction")?;
    // Postgres does not take bind parameters in SET
    sqlx::query(&format!(
        "SET LOCAL lock_timeout = {}",
        lock_timeout.as_millis()
    ))
    .execute(&mut *tx)
    .await
    .context("setting lock timeout")?;
    Ok(tx)
}

async fn finish<T>(
    tx: sqlx::Transaction<'_, sqlx::Postgres>,
    res: Result<T, remark_api::Error>,
) -> Result<T, Error> {
    match res {
        Ok(v) => {
            tx.commit().await.context("committing transaction")?;
            Ok(v)
        }
        Err(e) => {
            tx.rollback().await.context("rolling back transaction")?;
            Err(Error::Api(e))
        }
    }
}

/// Writes `c` in its own transaction.
///
/// `lock_timeout` bounds how long the transaction waits on another writer
/// of the same target; running out rolls everything back and surfaces as
/// an internal error.
pub async fn submit_comment(
    conn: &mut sqlx::PgConnection,
    lock_timeout: Duration,
    c: NewComment,
) -> Result<Comment, Error> {
    let mut tx = begin(conn, lock_timeout).await?;
    let res = remark_api::write_comment(&mut PostgresDb { conn: &mut *tx }, c, Utc::now()).await?;
    finish(tx, res).await
}

pub async fn submit_content_update(
    conn: &mut sqlx::PgConnection,
    lock_timeout: Duration,
    user: UserId,
    id: CommentId,
    content: String,
) -> Result<Comment, Error> {
    let mut tx = begin(conn, lock_timeout).await?;
    let res = remark_api::update_content(
        &mut PostgresDb { conn: &mut *tx },
        user,
        id,
        content,
        Utc::now(),
    )
    .await?;
    finish(tx, res).await
}

pub async fn submit_visibility(
    conn: &mut sqlx::PgConnection,
    lock_timeout: Duration,
    user: UserId,
    id: CommentId,
    hidden: bool,
) -> Result<Comment, Error> {
    let mut tx = begin(conn, lock_timeout).await?;
    let mut db = PostgresDb { conn: &mut *tx };
    let res = match hidden {
        true => remark_api::hide_comment(&mut db, user, id, Utc::now()).await?,
        false => remark_api::show_comment(&mut db, user, id, Utc::now()).await?,
    };
    finish(tx, res).await
}

pub struct PostgresDb<'a> {
    pub conn: &'a mut sqlx::PgConnection,
}

#[async_trait::async_trait]
impl<'a> remark_api::Db for PostgresDb<'a> {
    async fn increase_comment_count(&mut self, target: Target) -> anyhow::Result<bool> {
        // This takes the row lock that serializes every writer on the target
        let query = match target.kind {
            TargetType::Job => "UPDATE jobs SET comment_count = comment_count + 1 WHERE id = $1",
            TargetType::CommunityPost => {
                "UPDATE community_posts SET comment_count = comment_count + 1 WHERE id = $1"
            }
        };
        let res = sqlx::query(query)
            .bind(target.id)
            .execute(&mut *self.conn)
            .await?;
        Ok(res.rows_affected() == 1)
    }

    async fn find_max_comment_order(&mut self, target: Target) -> anyhow::Result<i32> {
        Ok(sqlx::query_scalar::<_, i32>(
            "
                SELECT COALESCE(MAX(comment_order), 0)
                    FROM comments
                WHERE target_type = $1
                AND target_id = $2
            ",
        )
        .bind(target.kind.as_str())
        .bind(target.id)
        .fetch_one(&mut *self.conn)
        .await?)
    }

    async fn find_comment(&mut self, id: CommentId) -> anyhow::Result<Option<Comment>> {
        sqlx::query_as::<_, CommentRow>(&format!(
            "SELECT {COMMENT_COLUMNS} FROM comments c WHERE c.id = $1"
        ))
        .bind(id.0)
        .fetch_optional(&mut *self.conn)
        .await?
        .map(Comment::try_from)
        .transpose()
    }

    async fn lock_comment(&mut self, id: CommentId) -> anyhow::Result<Option<Comment>> {
        sqlx::query_as::<_, CommentRow>(&format!(
            "SELECT {COMMENT_COLUMNS} FROM comments c WHERE c.id = $1 FOR UPDATE"
        ))
        .bind(id.0)
        .fetch_optional(&mut *self.conn)
        .await?
        .map(Comment::try_from)
        .transpose()
    }

    async fn increment_sort_numbers_above(
        &mut self,
        target: Target,
        comment_order: i32,
        threshold: i32,
    ) -> anyhow::Result<u64> {
        Ok(sqlx::query(
            "
                UPDATE comments
                    SET sort_number = sort_number + 1
                WHERE target_type = $1
                AND target_id = $2
                AND comment_order = $3
                AND sort_number > $4
            ",
        )
        .bind(target.kind.as_str())
        .bind(target.id)
        .bind(comment_order)
        .bind(threshold)
        .execute(&mut *self.conn)
        .await?
        .rows_affected())
    }

    async fn insert_comment(
        &mut self,
        c: &NewComment,
        order: CommentOrder,
        now: Time,
    ) -> anyhow::Result<Comment> {
        let row = sqlx::query_as::<_, CommentRow>(
            "
                INSERT INTO comments AS c (
                    user_id, content, target_type, target_id, parent_id,
                    comment_order, level, sort_number, child_count, is_hidden,
                    created_at, updated_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, false, $10, $10)
                RETURNING
                    c.id, c.user_id, c.content, c.target_type, c.target_id, c.parent_id,
                    c.comment_order, c.level, c.sort_number, c.child_count, c.is_hidden,
                    c.created_at, c.updated_at
            ",
        )
        .bind(c.owner.0)
        .bind(&c.content)
        .bind(c.target.kind.as_str())
        .bind(c.target.id)
        .bind(order.parent_id.map(|p| p.0))
        .bind(order.comment_order)
        .bind(order.level)
        .bind(order.sort_number)
        .bind(order.child_count)
        .bind(now)
        .fetch_one(&mut *self.conn)
        .await?;
        Comment::try_from(row)
    }

    async fn increment_child_count(&mut self, id: CommentId) -> anyhow::Result<Option<CommentId>> {
        let parent = sqlx::query_scalar::<_, Option<i64>>(
            "
                UPDATE comments
                    SET child_count = child_count + 1
                WHERE id = $1
                RETURNING parent_id
            ",
        )
        .bind(id.0)
        .fetch_optional(&mut *self.conn)
        .await?
        .ok_or_else(|| anyhow::anyhow!("ancestor {id:?} vanished during propagation"))?;
        Ok(parent.map(CommentId))
    }

    async fn update_comment(&mut self, c: &Comment) -> anyhow::Result<()> {
        let res = sqlx::query(
            "
                UPDATE comments
                    SET content = $2, is_hidden = $3, updated_at = $4
                WHERE id = $1
            ",
        )
        .bind(c.id.0)
        .bind(&c.content)
        .bind(c.hidden)
        .bind(c.updated_at)
        .execute(&mut *self.conn)
        .await?;
        anyhow::ensure!(
            res.rows_affected() == 1,
            "update of comment {:?} affected {} rows",
            c.id,
            res.rows_affected()
        );
        Ok(())
    }

    async fn find_comments_on(&mut self, target: Target) -> anyhow::Result<Vec<CommentRead>> {
        sqlx::query_as::<_, CommentReadRow>(&format!(
            "
                SELECT {COMMENT_COLUMNS}, u.nickname
                    FROM comments c
                LEFT JOIN users u
                    ON u.id = c.user_id
                WHERE c.target_type = $1
                AND c.target_id = $2
                ORDER BY c.comment_order, c.sort_number
            "
        ))
        .bind(target.kind.as_str())
        .bind(target.id)
        .fetch_all(&mut *self.conn)
        .await
        .with_context(|| format!("querying comments on {target}"))?
        .into_iter()
        .map(CommentRead::try_from)
        .collect()
    }
}
