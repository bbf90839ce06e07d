use std::collections::{BTreeMap, HashMap};

use anyhow::{anyhow, ensure, Context};

use crate::{Comment, CommentId, CommentRead, Db, Error, Target};

/// Comments of `target`, as served to readers
pub async fn list_comments<D: Db>(
    db: &mut D,
    target: Target,
) -> anyhow::Result<Result<Vec<CommentRead>, Error>> {
    if let Err(e) = crate::validate_id(target.id) {
        return Ok(Err(e));
    }
    let comments = db
        .find_comments_on(target)
        .await
        .with_context(|| format!("listing comments on {target}"))?;
    tracing::debug!(article = %target, count = comments.len(), "listed comments");
    Ok(Ok(comments))
}

pub fn sort_for_display(comments: &mut [Comment]) {
    comments.sort_by_key(|c| c.order.display_key());
}

/// `comments` must be in display order. Returns the comment `id` followed by
/// all its descendants.
pub fn subtree(comments: &[Comment], id: CommentId) -> Option<&[Comment]> {
    let start = comments.iter().position(|c| c.id == id)?;
    let len = comments[start].order.child_count as usize + 1;
    comments.get(start..start + len)
}

/// Checks that the comments of one target, in display order, form a forest
/// correctly encoded by their `CommentOrder`s
pub fn check_invariants(comments: &[Comment]) -> anyhow::Result<()> {
    let by_id = comments
        .iter()
        .map(|c| (c.id, c))
        .collect::<HashMap<CommentId, &Comment>>();
    ensure!(by_id.len() == comments.len(), "duplicate comment ids");
    if let Some(first) = comments.first() {
        ensure!(
            comments.iter().all(|c| c.target == first.target),
            "comments span multiple targets"
        );
    }
    ensure!(
        comments
            .windows(2)
            .all(|w| w[0].order.display_key() < w[1].order.display_key()),
        "comments are not in display order or share a position"
    );

    let mut threads = BTreeMap::<i32, Vec<&Comment>>::new();
    for c in comments {
        threads.entry(c.order.comment_order).or_default().push(c);
    }
    ensure!(
        threads.keys().copied().eq(1..=threads.len() as i32),
        "thread numbers are not 1..={}: {:?}",
        threads.len(),
        threads.keys().collect::<Vec<_>>()
    );

    let mut descendants = HashMap::<CommentId, i32>::new();
    for c in comments {
        match c.order.parent_id {
            None => ensure!(
                c.order.level == 0 && c.order.sort_number == 0,
                "root {:?} is not at level 0, position 0",
                c.id
            ),
            Some(parent_id) => {
                let parent = by_id
                    .get(&parent_id)
                    .ok_or_else(|| anyhow!("parent {parent_id:?} of {:?} is missing", c.id))?;
                ensure!(
                    parent.order.comment_order == c.order.comment_order,
                    "{:?} is not in the thread of its parent",
                    c.id
                );
                ensure!(
                    c.order.level == parent.order.level + 1,
                    "{:?} is at level {} under a parent at level {}",
                    c.id,
                    c.order.level,
                    parent.order.level
                );
            }
        }
        let mut ancestor = c.order.parent_id;
        while let Some(a) = ancestor {
            *descendants.entry(a).or_default() += 1;
            ancestor = by_id.get(&a).and_then(|a| a.order.parent_id);
        }
    }

    for (comment_order, thread) in threads {
        ensure!(
            thread
                .iter()
                .map(|c| c.order.sort_number)
                .eq(0..thread.len() as i32),
            "sort numbers of thread {comment_order} are not contiguous from 0"
        );
        for (i, c) in thread.iter().enumerate() {
            let expected = descendants.get(&c.id).copied().unwrap_or(0);
            ensure!(
                c.order.child_count == expected,
                "{:?} claims {} descendants but has {expected}",
                c.id,
                c.order.child_count
            );
            let range = thread
                .get(i..=i + c.order.child_count as usize)
                .ok_or_else(|| anyhow!("subtree of {:?} runs past its thread", c.id))?;
            for d in range {
                ensure!(
                    is_ancestor_or_self(&by_id, c.id, d),
                    "{:?} sits in the subtree range of {:?} without descending from it",
                    d.id,
                    c.id
                );
            }
        }
    }
    Ok(())
}

fn is_ancestor_or_self(
    by_id: &HashMap<CommentId, &Comment>,
    ancestor: CommentId,
    c: &Comment,
) -> bool {
    let mut cur = Some(c.id);
    while let Some(id) = cur {
        if id == ancestor {
            return true;
        }
        cur = by_id.get(&id).and_then(|c| c.order.parent_id);
    }
    false
}
