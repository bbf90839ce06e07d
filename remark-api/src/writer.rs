use anyhow::Context;

use crate::{
    comment::validate_content, Comment, CommentId, CommentOrder, Db, Error, NewComment, Time,
    UserId,
};

/// Turns a rejection into an early `Ok(Err(_))`
macro_rules! reject {
    ($e:expr) => {
        match $e {
            Ok(v) => v,
            Err(e) => return Ok(Err(e)),
        }
    };
}

/// Writes a root comment or a reply, depending on `c.parent`.
///
/// Must run inside one transaction: the first write takes the lock of the
/// target article, which linearizes the position computations of every
/// concurrent writer on the same target.
pub async fn write_comment<D: Db>(
    db: &mut D,
    c: NewComment,
    now: Time,
) -> anyhow::Result<Result<Comment, Error>> {
    reject!(c.validate());

    if !db
        .increase_comment_count(c.target)
        .await
        .with_context(|| format!("locking target {}", c.target))?
    {
        return Ok(Err(Error::TargetNotFound(c.target)));
    }

    let order = match c.parent {
        None => {
            let max = db
                .find_max_comment_order(c.target)
                .await
                .with_context(|| format!("fetching max comment order of {}", c.target))?;
            CommentOrder::new_root(max + 1)
        }
        Some(parent_id) => {
            let parent = match db
                .find_comment(parent_id)
                .await
                .with_context(|| format!("fetching parent comment {parent_id:?}"))?
            {
                Some(p) if p.target == c.target => p.order,
                _ => return Ok(Err(Error::CommentNotFound(parent_id))),
            };
            let sort_number = parent.next_reply_sort_number();
            let shifted = db
                .increment_sort_numbers_above(c.target, parent.comment_order, sort_number - 1)
                .await
                .with_context(|| {
                    format!(
                        "shifting thread {} of {} from {sort_number}",
                        parent.comment_order, c.target
                    )
                })?;
            tracing::debug!(?parent_id, sort_number, shifted, "made room for reply");
            CommentOrder::new_reply(parent.comment_order, parent.level + 1, sort_number, parent_id)
        }
    };

    let comment = db
        .insert_comment(&c, order, now)
        .await
        .with_context(|| format!("inserting comment on {}", c.target))?;

    if let Some(parent_id) = c.parent {
        increment_ancestors_child_count(db, parent_id).await?;
    }

    tracing::info!(
        comment = ?comment.id,
        article = %comment.target,
        parent = ?comment.order.parent_id,
        comment_order = comment.order.comment_order,
        level = comment.order.level,
        sort_number = comment.order.sort_number,
        "comment written"
    );
    Ok(Ok(comment))
}

async fn increment_ancestors_child_count<D: Db>(
    db: &mut D,
    parent_id: CommentId,
) -> anyhow::Result<()> {
    let mut next = Some(parent_id);
    while let Some(id) = next {
        next = db
            .increment_child_count(id)
            .await
            .with_context(|| format!("incrementing child count of {id:?}"))?;
    }
    Ok(())
}

async fn owned_comment<D: Db>(
    db: &mut D,
    requester: UserId,
    id: CommentId,
) -> anyhow::Result<Result<Comment, Error>> {
    let c = db
        .lock_comment(id)
        .await
        .with_context(|| format!("fetching comment {id:?}"))?;
    let c = reject!(c.ok_or(Error::CommentNotFound(id)));
    if c.owner != requester {
        return Ok(Err(Error::Unauthorized));
    }
    Ok(Ok(c))
}

pub async fn update_content<D: Db>(
    db: &mut D,
    requester: UserId,
    id: CommentId,
    content: String,
    now: Time,
) -> anyhow::Result<Result<Comment, Error>> {
    reject!(validate_content(&content));
    let mut c = reject!(owned_comment(db, requester, id).await?);
    c.content = content;
    c.updated_at = now;
    db.update_comment(&c)
        .await
        .with_context(|| format!("updating content of {id:?}"))?;
    tracing::info!(comment = ?id, "comment content updated");
    Ok(Ok(c))
}

pub async fn hide_comment<D: Db>(
    db: &mut D,
    requester: UserId,
    id: CommentId,
    now: Time,
) -> anyhow::Result<Result<Comment, Error>> {
    set_hidden(db, requester, id, true, now).await
}

pub async fn show_comment<D: Db>(
    db: &mut D,
    requester: UserId,
    id: CommentId,
    now: Time,
) -> anyhow::Result<Result<Comment, Error>> {
    set_hidden(db, requester, id, false, now).await
}

async fn set_hidden<D: Db>(
    db: &mut D,
    requester: UserId,
    id: CommentId,
    hidden: bool,
    now: Time,
) -> anyhow::Result<Result<Comment, Error>> {
    let mut c = reject!(owned_comment(db, requester, id).await?);
    if c.hidden == hidden {
        return Ok(Err(Error::InvalidState(String::from(match hidden {
            true => "already hidden comment",
            false => "already shown comment",
        }))));
    }
    c.hidden = hidden;
    c.updated_at = now;
    db.update_comment(&c)
        .await
        .with_context(|| format!("setting hidden={hidden} on {id:?}"))?;
    tracing::info!(comment = ?id, hidden, "comment visibility changed");
    Ok(Ok(c))
}
