use anyhow::Context;
use remark_api::{Target, UserId};

use crate::extractors::PgPool;

/// Side effects of a committed write, run off the request path
#[derive(Clone)]
pub struct Notifier {
    db: PgPool,
}

impl Notifier {
    pub fn new(db: PgPool) -> Notifier {
        Notifier { db }
    }

    /// Bumps the author's counter and queues a change event for `target`.
    ///
    /// Never fails: errors are logged and dropped.
    pub fn comment_written(&self, user: UserId, target: Target) -> tokio::task::JoinHandle<()> {
        let db = self.db.clone();
        tokio::spawn(async move {
            if let Err(err) = notify(&db, user, target).await {
                tracing::error!(
                    ?err,
                    ?user,
                    article = %target,
                    "failed sending comment notifications"
                );
            }
        })
    }
}

async fn notify(db: &PgPool, user: UserId, target: Target) -> anyhow::Result<()> {
    let mut conn = db
        .acquire()
        .await
        .map_err(|e| anyhow::anyhow!("acquiring notification connection: {e}"))?;
    sqlx::query("UPDATE users SET comment_count = comment_count + 1 WHERE id = $1")
        .bind(user.0)
        .execute(&mut *conn)
        .await
        .with_context(|| format!("bumping comment count of {user:?}"))?;
    sqlx::query(
        "
            INSERT INTO outbox_events (target_type, target_id, update_type, status)
            VALUES ($1, $2, 'UPDATED', 'WAIT')
        ",
    )
    .bind(target.kind.as_str())
    .bind(target.id)
    .execute(&mut *conn)
    .await
    .with_context(|| format!("queuing outbox event for {target}"))?;
    tracing::debug!(?user, article = %target, "comment notifications sent");
    Ok(())
}
