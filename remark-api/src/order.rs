use crate::CommentId;

/// Position of a comment in the forest of threads attached to a target.
///
/// Ordering all the comments of a target by `(comment_order, sort_number)`
/// yields, for each thread, a pre-order traversal where the subtree of every
/// node is the contiguous run right after it:
///
/// ```text
/// A     (comment_order: 1, level: 0, sort_number: 0, child_count: 4)
///   R1  (comment_order: 1, level: 1, sort_number: 1, child_count: 1)
///     R3(comment_order: 1, level: 2, sort_number: 2, child_count: 0)
///   R2  (comment_order: 1, level: 1, sort_number: 3, child_count: 0)
///   R4  (comment_order: 1, level: 1, sort_number: 4, child_count: 0)
/// B     (comment_order: 2, level: 0, sort_number: 0, child_count: 0)
/// ```
///
/// Values are never mutated in place: every transition returns a new one.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct CommentOrder {
    /// Thread number, allocated once per root comment of a target
    pub comment_order: i32,

    /// Depth in the thread, 0 for root comments
    pub level: i32,

    /// Position inside the thread
    pub sort_number: i32,

    /// None iff level is 0
    pub parent_id: Option<CommentId>,

    /// Number of descendants, not only direct children
    pub child_count: i32,
}

impl CommentOrder {
    pub fn new_root(comment_order: i32) -> CommentOrder {
        CommentOrder {
            comment_order,
            level: 0,
            sort_number: 0,
            parent_id: None,
            child_count: 0,
        }
    }

    pub fn new_reply(
        comment_order: i32,
        level: i32,
        sort_number: i32,
        parent_id: CommentId,
    ) -> CommentOrder {
        CommentOrder {
            comment_order,
            level,
            sort_number,
            parent_id: Some(parent_id),
            child_count: 0,
        }
    }

    #[must_use]
    pub fn increment_child_count(self) -> CommentOrder {
        CommentOrder {
            child_count: self.child_count + 1,
            ..self
        }
    }

    #[must_use]
    pub fn increment_sort_number(self) -> CommentOrder {
        CommentOrder {
            sort_number: self.sort_number + 1,
            ..self
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Sort number a new reply to this comment gets: right after the last
    /// currently-known descendant, or right after this comment if it has none
    pub fn next_reply_sort_number(&self) -> i32 {
        self.sort_number + self.child_count + 1
    }

    pub fn display_key(&self) -> (i32, i32) {
        (self.comment_order, self.sort_number)
    }

    /// Returns true if `other` is this comment or one of its descendants
    pub fn contains(&self, other: &CommentOrder) -> bool {
        self.comment_order == other.comment_order
            && self.sort_number <= other.sort_number
            && other.sort_number <= self.sort_number + self.child_count
    }
}
