use crate::{CommentOrder, Error, Target, Time, UserId};

pub const MAX_CONTENT_LENGTH: usize = 2000;

pub const HIDDEN_CONTENT: &str = "this comment has been hidden";

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
pub struct CommentId(pub i64);

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Comment {
    pub id: CommentId,
    pub owner: UserId,
    pub content: String,
    pub target: Target,
    pub order: CommentOrder,
    pub hidden: bool,
    pub created_at: Time,
    pub updated_at: Time,
}

/// Write command: a root comment when `parent` is None, a reply otherwise
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct NewComment {
    pub owner: UserId,
    pub content: String,
    pub target: Target,
    pub parent: Option<CommentId>,
}

impl NewComment {
    pub fn root(owner: UserId, content: String, target: Target) -> NewComment {
        NewComment {
            owner,
            content,
            target,
            parent: None,
        }
    }

    pub fn reply(owner: UserId, content: String, target: Target, parent: CommentId) -> NewComment {
        NewComment {
            owner,
            content,
            target,
            parent: Some(parent),
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        crate::validate_id(self.owner.0)?;
        crate::validate_id(self.target.id)?;
        if let Some(parent) = self.parent {
            crate::validate_id(parent.0)?;
        }
        validate_content(&self.content)
    }
}

pub fn validate_content(content: &str) -> Result<(), Error> {
    crate::validate_string(content)?;
    if content.trim().is_empty() {
        return Err(Error::InvalidContent(String::from("content cannot be empty")));
    }
    if content.chars().count() > MAX_CONTENT_LENGTH {
        return Err(Error::InvalidContent(format!(
            "content too long (max {MAX_CONTENT_LENGTH} characters)"
        )));
    }
    Ok(())
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ContentUpdate {
    pub content: String,
}

/// Comment as returned to readers, with the author's nickname
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct CommentRead {
    #[serde(flatten)]
    pub comment: Comment,
    pub nickname: Option<String>,
}

impl CommentRead {
    /// Replaces the content of hidden comments
    pub fn new(mut comment: Comment, nickname: Option<String>) -> CommentRead {
        if comment.hidden {
            comment.content = String::from(HIDDEN_CONTENT);
        }
        CommentRead { comment, nickname }
    }
}
